use crate::{
    api::types::{ApiErrorResponse, Factor},
    authn::status::StatusKind,
};
use thiserror::Error;

/// Everything an authentication transaction can fail with.
///
/// Precondition failures (`AlreadyInProgress`, `WrongState`) are returned
/// directly by the [`crate::authn::Authenticator`] call and never reach the
/// network. The rest are reported once, asynchronously, through
/// [`crate::authn::AuthDelegate::handle_error`]. None of them change the held
/// snapshot, so the same call can be retried.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("another request is already in progress")]
    AlreadyInProgress,
    #[error("wrong state: {0}")]
    WrongState(String),
    #[error("authentication status {0} is not supported")]
    AuthenticationStateNotSupported(StatusKind),
    #[error("factor {0} is not supported")]
    FactorNotSupported(Box<Factor>),
    #[error("server responded with error: {0}")]
    ServerRespondedWithError(ApiErrorResponse),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("unexpected HTTP status {status}")]
    UnexpectedStatus { status: u16 },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid json: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("authentication client is shut down")]
    Shutdown,
}

impl AuthError {
    pub(crate) fn wrong_state(message: impl Into<String>) -> Self {
        Self::WrongState(message.into())
    }

    pub(crate) fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedResponse(message.into())
    }

    /// `true` for the conditions produced locally, before any request.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::AlreadyInProgress | Self::WrongState(_))
    }
}
