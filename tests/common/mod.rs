//! Scripted transport and recording hooks shared by the orchestrator tests.

#![allow(dead_code)]

use async_trait::async_trait;
use authn_flow::{
    api::{
        request::{PrimaryAuthentication, VerifyFactor},
        types::{ApiErrorResponse, Factor, FactorResult, FactorType, Link},
        ApiResult, AuthnApi,
    },
    authn::{AuthDelegate, AuthError, AuthStatus, Authenticator, MfaHandler, PasswordChange, StatusHandler},
};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    sync::{mpsc, oneshot},
    time::timeout,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    PrimaryAuthentication {
        username: String,
        device_fingerprint: Option<String>,
    },
    ChangePassword {
        state_token: String,
        old_password: String,
        new_password: String,
    },
    ChangePasswordWithLink {
        href: String,
        state_token: String,
        old_password: String,
        new_password: String,
    },
    TransactionState {
        state_token: String,
    },
    Cancel {
        state_token: String,
    },
    Verify {
        factor_id: String,
        state_token: String,
        pass_code: Option<String>,
        answer: Option<String>,
    },
    VerifyWithLink {
        href: String,
        state_token: String,
    },
    Unlock {
        username: String,
        factor_type: FactorType,
    },
    Perform {
        href: String,
        state_token: Option<String>,
    },
}

enum Reply {
    Ready(ApiResult),
    Gated(oneshot::Receiver<ApiResult>),
}

/// Transport double: records every call and answers from a queue.
#[derive(Default)]
pub struct MockApi {
    calls: Mutex<Vec<Call>>,
    replies: Mutex<VecDeque<Reply>>,
}

impl MockApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, result: ApiResult) {
        self.replies.lock().unwrap().push_back(Reply::Ready(result));
    }

    /// The next call waits until the returned sender resolves it.
    pub fn push_gated(&self) -> oneshot::Sender<ApiResult> {
        let (tx, rx) = oneshot::channel();
        self.replies.lock().unwrap().push_back(Reply::Gated(rx));
        tx
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn respond(&self, call: Call) -> ApiResult {
        self.calls.lock().unwrap().push(call);
        let reply = self.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Ready(result)) => result,
            Some(Reply::Gated(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(AuthError::UnexpectedResponse("gate dropped".into()))),
            None => Err(AuthError::UnexpectedResponse("no scripted reply".into())),
        }
    }
}

#[async_trait]
impl AuthnApi for MockApi {
    async fn primary_authentication(&self, request: &PrimaryAuthentication) -> ApiResult {
        self.respond(Call::PrimaryAuthentication {
            username: request.username.clone(),
            device_fingerprint: request.device_fingerprint.clone(),
        })
        .await
    }

    async fn change_password(
        &self,
        state_token: &str,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> ApiResult {
        self.respond(Call::ChangePassword {
            state_token: state_token.to_string(),
            old_password: old_password.expose_secret().to_string(),
            new_password: new_password.expose_secret().to_string(),
        })
        .await
    }

    async fn change_password_with_link(
        &self,
        link: &Link,
        state_token: &str,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> ApiResult {
        self.respond(Call::ChangePasswordWithLink {
            href: link.href.to_string(),
            state_token: state_token.to_string(),
            old_password: old_password.expose_secret().to_string(),
            new_password: new_password.expose_secret().to_string(),
        })
        .await
    }

    async fn transaction_state(&self, state_token: &str) -> ApiResult {
        self.respond(Call::TransactionState {
            state_token: state_token.to_string(),
        })
        .await
    }

    async fn cancel_transaction(&self, state_token: &str) -> ApiResult {
        self.respond(Call::Cancel {
            state_token: state_token.to_string(),
        })
        .await
    }

    async fn verify_factor(
        &self,
        factor_id: &str,
        state_token: &str,
        params: &VerifyFactor,
    ) -> ApiResult {
        self.respond(Call::Verify {
            factor_id: factor_id.to_string(),
            state_token: state_token.to_string(),
            pass_code: params.pass_code.clone(),
            answer: params.answer.clone(),
        })
        .await
    }

    async fn verify_factor_with_link(
        &self,
        link: &Link,
        state_token: &str,
        _params: &VerifyFactor,
    ) -> ApiResult {
        self.respond(Call::VerifyWithLink {
            href: link.href.to_string(),
            state_token: state_token.to_string(),
        })
        .await
    }

    async fn unlock_account(&self, username: &str, factor_type: FactorType) -> ApiResult {
        self.respond(Call::Unlock {
            username: username.to_string(),
            factor_type,
        })
        .await
    }

    async fn perform(&self, link: &Link, state_token: Option<&str>) -> ApiResult {
        self.respond(Call::Perform {
            href: link.href.to_string(),
            state_token: state_token.map(str::to_string),
        })
        .await
    }
}

/// Everything the hooks observed, in order.
#[derive(Debug)]
pub enum Event {
    Success(String),
    Cancelled,
    Error(AuthError),
    ChangePasswordRequested { can_skip: bool },
    FactorsOffered(Vec<Factor>),
    PushState(FactorResult),
    TotpRequested,
    SmsRequested(Option<String>),
    QuestionAsked(String),
    StatusChanged(AuthStatus),
}

pub type Events = mpsc::UnboundedReceiver<Event>;

/// How the recording hooks answer interactive prompts.
#[derive(Clone)]
pub enum PasswordAnswer {
    Change { old: &'static str, new: &'static str },
    Skip,
    Never,
}

#[derive(Clone)]
pub struct Recorder {
    events: mpsc::UnboundedSender<Event>,
    password: PasswordAnswer,
    factor_choice: usize,
    code: &'static str,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, Events) {
        Self::with_password(PasswordAnswer::Never)
    }

    pub fn with_password(password: PasswordAnswer) -> (Arc<Self>, Events) {
        let (events, rx) = mpsc::unbounded_channel();
        let recorder = Self {
            events,
            password,
            factor_choice: 0,
            code: "123456",
        };
        (Arc::new(recorder), rx)
    }

    pub fn choosing(password: PasswordAnswer, factor_choice: usize) -> (Arc<Self>, Events) {
        let (events, rx) = mpsc::unbounded_channel();
        let recorder = Self {
            events,
            password,
            factor_choice,
            code: "123456",
        };
        (Arc::new(recorder), rx)
    }

    fn record(&self, event: Event) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl AuthDelegate for Recorder {
    fn handle_success(&self, session_token: &str) {
        self.record(Event::Success(session_token.to_string()));
    }

    async fn handle_change_password(&self, can_skip: bool) -> PasswordChange {
        self.record(Event::ChangePasswordRequested { can_skip });
        match &self.password {
            PasswordAnswer::Change { old, new } => PasswordChange::Change {
                old_password: SecretString::from(*old),
                new_password: SecretString::from(*new),
            },
            PasswordAnswer::Skip => PasswordChange::Skip,
            PasswordAnswer::Never => std::future::pending().await,
        }
    }

    fn transaction_cancelled(&self) {
        self.record(Event::Cancelled);
    }

    fn handle_error(&self, error: AuthError) {
        self.record(Event::Error(error));
    }
}

#[async_trait]
impl MfaHandler for Recorder {
    async fn select_factor(&self, factors: &[Factor]) -> Factor {
        self.record(Event::FactorsOffered(factors.to_vec()));
        factors[self.factor_choice].clone()
    }

    fn push_state_updated(&self, result: FactorResult) {
        self.record(Event::PushState(result));
    }

    async fn request_totp(&self) -> String {
        self.record(Event::TotpRequested);
        self.code.to_string()
    }

    async fn request_sms_code(&self, phone_number: Option<&str>) -> String {
        self.record(Event::SmsRequested(phone_number.map(str::to_string)));
        self.code.to_string()
    }

    async fn security_question(&self, question: &str) -> String {
        self.record(Event::QuestionAsked(question.to_string()));
        "blue".to_string()
    }
}

impl StatusHandler for Recorder {
    fn handle_status_change(&self, status: &AuthStatus, _client: &Authenticator) {
        self.record(Event::StatusChanged(status.clone()));
    }
}

/// Next hook event, failing the test if none arrives in time.
pub async fn next_event(events: &mut Events) -> Event {
    timeout(Duration::from_secs(60), events.recv())
        .await
        .expect("timed out waiting for a hook event")
        .expect("event channel closed")
}

/// Let spawned tasks run until they are all idle.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

pub fn response(value: Value) -> ApiResult {
    Ok(serde_json::from_value(value).expect("valid response fixture"))
}

pub fn link(href: &str) -> Value {
    json!({ "href": href })
}

pub fn password_expired(state_token: &str) -> ApiResult {
    response(json!({
        "status": "PASSWORD_EXPIRED",
        "stateToken": state_token,
        "_links": {
            "next": link("https://idp.example.com/api/v1/authn/credentials/change_password"),
            "cancel": link("https://idp.example.com/api/v1/authn/cancel")
        }
    }))
}

pub fn password_warning(state_token: &str) -> ApiResult {
    response(json!({
        "status": "PASSWORD_WARN",
        "stateToken": state_token,
        "_links": {
            "skip": link("https://idp.example.com/api/v1/authn/skip"),
            "cancel": link("https://idp.example.com/api/v1/authn/cancel")
        }
    }))
}

pub fn mfa_required(state_token: &str) -> ApiResult {
    response(json!({
        "status": "MFA_REQUIRED",
        "stateToken": state_token,
        "_embedded": {
            "factors": [
                { "id": "opf1", "factorType": "push", "provider": "OKTA" },
                { "id": "ost1", "factorType": "token:software:totp", "provider": "OKTA" },
                {
                    "id": "ufs1",
                    "factorType": "question",
                    "profile": { "question": "favorite_color", "questionText": "What is your favorite color?" }
                }
            ]
        }
    }))
}

pub fn push_challenge(state_token: &str, factor_result: &str) -> ApiResult {
    response(json!({
        "status": "MFA_CHALLENGE",
        "stateToken": state_token,
        "factorResult": factor_result,
        "_embedded": {
            "factor": { "id": "opf1", "factorType": "push", "provider": "OKTA" }
        }
    }))
}

pub fn sms_challenge(state_token: &str) -> ApiResult {
    response(json!({
        "status": "MFA_CHALLENGE",
        "stateToken": state_token,
        "_embedded": {
            "factor": {
                "id": "sms1",
                "factorType": "sms",
                "profile": { "phoneNumber": "+1 XXX-XXX-1337" }
            }
        }
    }))
}

pub fn locked_out() -> ApiResult {
    response(json!({ "status": "LOCKED_OUT" }))
}

pub fn success(session_token: &str) -> ApiResult {
    response(json!({
        "status": "SUCCESS",
        "sessionToken": session_token
    }))
}

pub fn unauthenticated() -> ApiResult {
    response(json!({ "status": "UNAUTHENTICATED" }))
}

pub fn authentication_failed() -> ApiResult {
    Err(AuthError::ServerRespondedWithError(ApiErrorResponse::new(
        "E0000004",
        "Authentication failed",
    )))
}

pub fn password(value: &'static str) -> SecretString {
    SecretString::from(value)
}
