//! Status dispatch.
//!
//! [`plan`] maps a snapshot to the single [`Interaction`] it calls for. It
//! does no I/O and touches no state, which keeps the per-status rules in one
//! exhaustive match. The orchestrator executes the plan: notifications and
//! poll scheduling happen on the orchestrator task, interactive hooks run
//! through the `run_*` functions below on an interaction task that calls back
//! into the [`Authenticator`].

use crate::{
    api::{
        request::VerifyFactor,
        types::{Factor, FactorResult, FactorType, Link},
    },
    authn::{
        error::AuthError,
        hooks::{AuthDelegate, MfaHandler, PasswordChange, StatusHandler},
        orchestrator::Authenticator,
        status::{AuthStatus, StatusKind},
    },
};
use std::{fmt, sync::Arc};
use tracing::{debug, warn};

/// How status changes are handled, fixed when the orchestrator is built.
#[derive(Clone)]
pub enum DispatchMode {
    /// Built-in per-status handling through the delegate and MFA hooks.
    Builtin {
        mfa_handler: Option<Arc<dyn MfaHandler>>,
    },
    /// Every status change goes to the custom handler.
    Custom(Arc<dyn StatusHandler>),
}

impl Default for DispatchMode {
    fn default() -> Self {
        Self::Builtin { mfa_handler: None }
    }
}

impl fmt::Debug for DispatchMode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Builtin { mfa_handler } => formatter
                .debug_struct("Builtin")
                .field("mfa_handler", &mfa_handler.is_some())
                .finish(),
            Self::Custom(_) => formatter.write_str("Custom"),
        }
    }
}

/// What the current snapshot asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Interaction {
    Idle,
    ChangePassword { can_skip: bool, skip: Option<Link> },
    SelectFactor { factors: Vec<Factor> },
    PushResult { factor: Factor, result: FactorResult },
    SmsCode { factor: Factor },
    Success { session_token: String },
    StatusNotSupported(StatusKind),
    FactorNotSupported(Factor),
}

#[must_use]
pub fn plan(status: &AuthStatus, has_mfa_handler: bool) -> Interaction {
    match status {
        AuthStatus::Unauthenticated => Interaction::Idle,

        AuthStatus::PasswordWarning { links, .. } => Interaction::ChangePassword {
            can_skip: true,
            skip: links.skip().cloned(),
        },

        AuthStatus::PasswordExpired { .. } => Interaction::ChangePassword {
            can_skip: false,
            skip: None,
        },

        AuthStatus::MfaRequired { factors, .. } => {
            if has_mfa_handler {
                Interaction::SelectFactor {
                    factors: factors.clone(),
                }
            } else {
                Interaction::StatusNotSupported(StatusKind::MfaRequired)
            }
        }

        AuthStatus::MfaChallenge {
            factor,
            factor_result,
            ..
        } => match factor.factor_type {
            FactorType::Push => factor_result.map_or(Interaction::Idle, |result| {
                Interaction::PushResult {
                    factor: factor.clone(),
                    result,
                }
            }),
            FactorType::Sms if has_mfa_handler => Interaction::SmsCode {
                factor: factor.clone(),
            },
            FactorType::Sms => Interaction::StatusNotSupported(StatusKind::MfaChallenge),
            _ => Interaction::FactorNotSupported(factor.clone()),
        },

        AuthStatus::Success { session_token } => Interaction::Success {
            session_token: session_token.clone(),
        },

        AuthStatus::PasswordReset { .. }
        | AuthStatus::MfaEnroll { .. }
        | AuthStatus::MfaEnrollActivate { .. }
        | AuthStatus::Recovery { .. }
        | AuthStatus::RecoveryChallenge { .. }
        | AuthStatus::LockedOut { .. } => Interaction::StatusNotSupported(status.kind()),
    }
}

fn report(delegate: &dyn AuthDelegate, result: Result<(), AuthError>) {
    if let Err(error) = result {
        warn!("interaction follow-up failed: {error}");
        delegate.handle_error(error);
    }
}

pub(crate) async fn run_password_change(
    delegate: Arc<dyn AuthDelegate>,
    client: Authenticator,
    can_skip: bool,
    skip: Option<Link>,
) {
    let choice = delegate.handle_change_password(can_skip).await;

    let result = match choice {
        PasswordChange::Change {
            old_password,
            new_password,
        } => client.change_password(old_password, new_password).await,
        PasswordChange::Skip if !can_skip => Err(AuthError::wrong_state(
            "password change cannot be skipped",
        )),
        PasswordChange::Skip => match skip {
            Some(link) => {
                debug!("skipping password change");
                client.perform(link).await
            }
            None => Err(AuthError::wrong_state("Can't find 'skip' link in response")),
        },
    };

    report(delegate.as_ref(), result);
}

pub(crate) async fn run_factor_selection(
    delegate: Arc<dyn AuthDelegate>,
    mfa_handler: Arc<dyn MfaHandler>,
    client: Authenticator,
    factors: Vec<Factor>,
) {
    let factor = mfa_handler.select_factor(&factors).await;
    debug!(factor_type = %factor.factor_type, "factor selected");

    let result = match factor.factor_type {
        FactorType::Totp => {
            let code = mfa_handler.request_totp().await;
            client
                .verify(factor, VerifyFactor::new().with_pass_code(code))
                .await
        }
        FactorType::Question => match factor.question_text().map(str::to_owned) {
            Some(question) => {
                let answer = mfa_handler.security_question(&question).await;
                client
                    .verify(factor, VerifyFactor::new().with_answer(answer))
                    .await
            }
            None => Err(AuthError::wrong_state(
                "Can't find 'question' object in response",
            )),
        },
        _ => client.verify(factor, VerifyFactor::new()).await,
    };

    report(delegate.as_ref(), result);
}

pub(crate) async fn run_sms_challenge(
    delegate: Arc<dyn AuthDelegate>,
    mfa_handler: Arc<dyn MfaHandler>,
    client: Authenticator,
    factor: Factor,
) {
    let code = mfa_handler.request_sms_code(factor.phone_number()).await;
    let result = client
        .verify(factor, VerifyFactor::new().with_pass_code(code))
        .await;

    report(delegate.as_ref(), result);
}
