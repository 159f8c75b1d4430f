//! Wire types for the authentication API. Success bodies decode into
//! [`ApiSuccessResponse`], which is only a transport shape: the orchestrator
//! validates it into an [`crate::authn::AuthStatus`] before anything is applied.
//! These payloads carry state, session and recovery tokens, so they must never
//! be logged whole.

use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};
use url::Url;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiSuccessResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor_result: Option<FactorResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor_type: Option<FactorType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_type: Option<String>,
    #[serde(rename = "_links", default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
    #[serde(rename = "_embedded", default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<Embedded>,
}

/// Resources embedded in a response: the factor candidates for
/// `MFA_REQUIRED`/`MFA_ENROLL`, or the single factor under challenge.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Embedded {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factors: Option<Vec<Factor>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factor: Option<Factor>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Factor {
    /// Absent on enrollment candidates, which have no instance yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub factor_type: FactorType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<FactorProfile>,
    #[serde(rename = "_links", default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

impl Factor {
    #[must_use]
    pub fn new(id: impl Into<String>, factor_type: FactorType) -> Self {
        Self {
            id: Some(id.into()),
            factor_type,
            provider: None,
            vendor_name: None,
            profile: None,
            links: None,
        }
    }

    #[must_use]
    pub fn with_profile(mut self, profile: FactorProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    #[must_use]
    pub fn phone_number(&self) -> Option<&str> {
        self.profile.as_ref()?.phone_number.as_deref()
    }

    #[must_use]
    pub fn question_text(&self) -> Option<&str> {
        self.profile.as_ref()?.question_text.as_deref()
    }

    /// The factor's own `verify` link, when the provider sent one.
    #[must_use]
    pub fn verify_link(&self) -> Option<&Link> {
        self.links.as_ref()?.get("verify")
    }
}

impl fmt::Display for Factor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.id {
            Some(id) => write!(formatter, "{} ({id})", self.factor_type),
            None => write!(formatter, "{}", self.factor_type),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FactorType {
    #[serde(rename = "token:software:totp")]
    Totp,
    #[serde(rename = "push")]
    Push,
    #[serde(rename = "sms")]
    Sms,
    #[serde(rename = "call")]
    Call,
    #[serde(rename = "question")]
    Question,
    #[serde(rename = "email")]
    Email,
    #[serde(rename = "token")]
    Token,
    #[serde(rename = "token:hardware")]
    HardwareToken,
    #[serde(rename = "web")]
    Web,
    #[serde(rename = "u2f")]
    U2f,
    #[serde(rename = "webauthn")]
    Webauthn,
    #[serde(other)]
    Unknown,
}

impl FactorType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Totp => "token:software:totp",
            Self::Push => "push",
            Self::Sms => "sms",
            Self::Call => "call",
            Self::Question => "question",
            Self::Email => "email",
            Self::Token => "token",
            Self::HardwareToken => "token:hardware",
            Self::Web => "web",
            Self::U2f => "u2f",
            Self::Webauthn => "webauthn",
            Self::Unknown => "unknown",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "token:software:totp" | "totp" => Some(Self::Totp),
            "push" => Some(Self::Push),
            "sms" => Some(Self::Sms),
            "call" => Some(Self::Call),
            "question" => Some(Self::Question),
            "email" => Some(Self::Email),
            "token" => Some(Self::Token),
            "token:hardware" => Some(Self::HardwareToken),
            "web" => Some(Self::Web),
            "u2f" => Some(Self::U2f),
            "webauthn" => Some(Self::Webauthn),
            _ => None,
        }
    }
}

impl fmt::Display for FactorType {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Outcome of the last verification of an asynchronous factor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FactorResult {
    Waiting,
    Success,
    Timeout,
    Rejected,
    Cancelled,
    Error,
    PasscodeReplayed,
    TimeWindowExceeded,
    #[serde(other)]
    Unknown,
}

impl FactorResult {
    /// `true` while the provider is still waiting on the out-of-band answer.
    #[must_use]
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Waiting)
    }
}

impl fmt::Display for FactorResult {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Waiting => "waiting",
            Self::Success => "success",
            Self::Timeout => "timeout",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
            Self::PasscodeReplayed => "passcode replayed",
            Self::TimeWindowExceeded => "time window exceeded",
            Self::Unknown => "unknown",
        };
        formatter.write_str(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub href: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hints: Option<LinkHints>,
}

impl Link {
    #[must_use]
    pub fn new(href: Url) -> Self {
        Self {
            name: None,
            href,
            hints: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkHints {
    #[serde(default)]
    pub allow: Vec<String>,
}

/// A relation maps to one link, or to several (`resend` is sent as an array).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LinkEntry {
    One(Link),
    Many(Vec<Link>),
}

impl LinkEntry {
    #[must_use]
    pub fn first(&self) -> Option<&Link> {
        match self {
            Self::One(link) => Some(link),
            Self::Many(links) => links.first(),
        }
    }

    #[must_use]
    pub fn all(&self) -> &[Link] {
        match self {
            Self::One(link) => std::slice::from_ref(link),
            Self::Many(links) => links,
        }
    }
}

/// Named follow-up actions offered by the provider for the current status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Links(BTreeMap<String, LinkEntry>);

impl Links {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, relation: impl Into<String>, link: Link) -> Self {
        self.0.insert(relation.into(), LinkEntry::One(link));
        self
    }

    #[must_use]
    pub fn get(&self, relation: &str) -> Option<&Link> {
        self.0.get(relation).and_then(LinkEntry::first)
    }

    #[must_use]
    pub fn get_all(&self, relation: &str) -> &[Link] {
        self.0.get(relation).map_or(&[], LinkEntry::all)
    }

    #[must_use]
    pub fn next(&self) -> Option<&Link> {
        self.get("next")
    }

    #[must_use]
    pub fn prev(&self) -> Option<&Link> {
        self.get("prev")
    }

    #[must_use]
    pub fn skip(&self) -> Option<&Link> {
        self.get("skip")
    }

    #[must_use]
    pub fn cancel(&self) -> Option<&Link> {
        self.get("cancel")
    }

    pub fn relations(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Structured error body returned with non-2xx responses.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorResponse {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_summary: Option<String>,
    #[serde(default)]
    pub error_link: Option<String>,
    #[serde(default)]
    pub error_id: Option<String>,
    #[serde(default)]
    pub error_causes: Vec<ErrorCause>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorCause {
    #[serde(default)]
    pub error_summary: Option<String>,
}

impl ApiErrorResponse {
    #[must_use]
    pub fn new(error_code: impl Into<String>, error_summary: impl Into<String>) -> Self {
        Self {
            error_code: Some(error_code.into()),
            error_summary: Some(error_summary.into()),
            ..Self::default()
        }
    }

    /// A body counts as an error document only if it names a code or a summary.
    #[must_use]
    pub fn is_error_document(&self) -> bool {
        self.error_code.is_some() || self.error_summary.is_some()
    }
}

impl fmt::Display for ApiErrorResponse {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let summary = self.error_summary.as_deref().unwrap_or("unknown error");
        match &self.error_code {
            Some(code) => write!(formatter, "{code}: {summary}")?,
            None => formatter.write_str(summary)?,
        }
        let causes: Vec<&str> = self
            .error_causes
            .iter()
            .filter_map(|cause| cause.error_summary.as_deref())
            .collect();
        if !causes.is_empty() {
            write!(formatter, " ({})", causes.join("; "))?;
        }
        Ok(())
    }
}
