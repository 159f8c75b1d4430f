//! Capability traits an application implements to take part in a transaction.
//!
//! Notification methods (`handle_success`, `handle_error`,
//! `transaction_cancelled`, `push_state_updated`) are called on the
//! orchestrator task and must return quickly. Interactive methods are `async`
//! and run on their own task; whatever they return is sent back to the
//! orchestrator as the next protocol call. An interactive hook that is still
//! pending when the transaction moves on is dropped.

use crate::{
    api::types::{Factor, FactorResult},
    authn::{error::AuthError, orchestrator::Authenticator, status::AuthStatus},
};
use async_trait::async_trait;
use secrecy::SecretString;

/// Answer to a password change request.
#[derive(Clone, Debug)]
pub enum PasswordChange {
    Change {
        old_password: SecretString,
        new_password: SecretString,
    },
    /// Only honoured when the hook was told skipping is allowed.
    Skip,
}

#[async_trait]
pub trait AuthDelegate: Send + Sync {
    fn handle_success(&self, session_token: &str);

    async fn handle_change_password(&self, can_skip: bool) -> PasswordChange;

    fn transaction_cancelled(&self);

    fn handle_error(&self, error: AuthError);
}

#[async_trait]
pub trait MfaHandler: Send + Sync {
    async fn select_factor(&self, factors: &[Factor]) -> Factor;

    fn push_state_updated(&self, result: FactorResult);

    async fn request_totp(&self) -> String;

    async fn request_sms_code(&self, phone_number: Option<&str>) -> String;

    async fn security_question(&self, question: &str) -> String;
}

/// Replaces the default dispatch entirely: every status change is handed here
/// and none of the [`AuthDelegate`]/[`MfaHandler`] interaction hooks fire.
/// Errors and cancellation are still reported to the delegate.
pub trait StatusHandler: Send + Sync {
    fn handle_status_change(&self, status: &AuthStatus, client: &Authenticator);
}
