//! Request parameters and JSON bodies for the authentication endpoints.
//! Passwords stay wrapped in `SecretString` until the body is built.

use crate::api::types::FactorType;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};

/// Parameters of the primary authentication call that opens a transaction.
#[derive(Clone, Debug)]
pub struct PrimaryAuthentication {
    pub username: String,
    pub password: SecretString,
    pub audience: Option<String>,
    pub relay_state: Option<String>,
    pub multi_optional_factor_enroll: bool,
    pub warn_before_password_expired: bool,
    pub token: Option<String>,
    pub device_token: Option<String>,
    pub device_fingerprint: Option<String>,
}

impl PrimaryAuthentication {
    #[must_use]
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
            audience: None,
            relay_state: None,
            multi_optional_factor_enroll: true,
            warn_before_password_expired: true,
            token: None,
            device_token: None,
            device_fingerprint: None,
        }
    }

    #[must_use]
    pub fn with_device_fingerprint(mut self, fingerprint: Option<String>) -> Self {
        self.device_fingerprint = fingerprint;
        self
    }

    #[must_use]
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    #[must_use]
    pub fn with_relay_state(mut self, relay_state: impl Into<String>) -> Self {
        self.relay_state = Some(relay_state.into());
        self
    }

    #[must_use]
    pub fn with_device_token(mut self, device_token: impl Into<String>) -> Self {
        self.device_token = Some(device_token.into());
        self
    }

    #[must_use]
    pub fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert("username".into(), json!(self.username));
        body.insert("password".into(), json!(self.password.expose_secret()));
        insert_optional(&mut body, "audience", self.audience.as_deref());
        insert_optional(&mut body, "relayState", self.relay_state.as_deref());
        body.insert(
            "options".into(),
            json!({
                "multiOptionalFactorEnroll": self.multi_optional_factor_enroll,
                "warnBeforePasswordExpired": self.warn_before_password_expired,
            }),
        );
        let mut context = Map::new();
        insert_optional(&mut context, "deviceToken", self.device_token.as_deref());
        body.insert("context".into(), Value::Object(context));
        insert_optional(&mut body, "token", self.token.as_deref());
        Value::Object(body)
    }
}

/// Optional payload of a factor verification.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyFactor {
    pub answer: Option<String>,
    pub pass_code: Option<String>,
    pub remember_device: Option<bool>,
    pub auto_push: Option<bool>,
}

impl VerifyFactor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = Some(answer.into());
        self
    }

    #[must_use]
    pub fn with_pass_code(mut self, pass_code: impl Into<String>) -> Self {
        self.pass_code = Some(pass_code.into());
        self
    }

    #[must_use]
    pub fn with_remember_device(mut self, remember_device: bool) -> Self {
        self.remember_device = Some(remember_device);
        self
    }

    #[must_use]
    pub fn with_auto_push(mut self, auto_push: bool) -> Self {
        self.auto_push = Some(auto_push);
        self
    }

    /// Query parameters, present only when the caller supplied them.
    #[must_use]
    pub fn query(&self) -> Vec<(&'static str, &'static str)> {
        let mut query = Vec::new();
        if let Some(remember_device) = self.remember_device {
            query.push(("rememberDevice", bool_param(remember_device)));
        }
        if let Some(auto_push) = self.auto_push {
            query.push(("autoPush", bool_param(auto_push)));
        }
        query
    }

    #[must_use]
    pub fn body(&self, state_token: &str) -> Value {
        let mut body = Map::new();
        body.insert("stateToken".into(), json!(state_token));
        insert_optional(&mut body, "answer", self.answer.as_deref());
        insert_optional(&mut body, "passCode", self.pass_code.as_deref());
        Value::Object(body)
    }
}

pub(crate) fn state_token_body(state_token: &str) -> Value {
    json!({ "stateToken": state_token })
}

pub(crate) fn change_password_body(
    state_token: &str,
    old_password: &SecretString,
    new_password: &SecretString,
) -> Value {
    json!({
        "stateToken": state_token,
        "oldPassword": old_password.expose_secret(),
        "newPassword": new_password.expose_secret(),
    })
}

pub(crate) fn unlock_body(username: &str, factor_type: FactorType) -> Value {
    json!({
        "username": username,
        "factorType": factor_type.as_str(),
    })
}

fn insert_optional(map: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        map.insert(key.to_string(), json!(value));
    }
}

const fn bool_param(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}
