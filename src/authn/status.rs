//! The transaction snapshot.
//!
//! Each variant of [`AuthStatus`] carries only the fields the provider sends
//! for that status, so a `Success` without a session token or an
//! `MfaChallenge` without its factor cannot be represented. Responses are
//! validated while converting from [`ApiSuccessResponse`]; anything
//! incomplete is rejected as `UnexpectedResponse` and never applied.

use crate::{
    api::types::{ApiSuccessResponse, Factor, FactorResult, FactorType, Links},
    authn::error::AuthError,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusKind {
    Unauthenticated,
    #[serde(rename = "PASSWORD_WARN")]
    PasswordWarning,
    PasswordExpired,
    PasswordReset,
    MfaEnroll,
    MfaEnrollActivate,
    MfaRequired,
    MfaChallenge,
    Recovery,
    RecoveryChallenge,
    LockedOut,
    Success,
}

impl StatusKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::PasswordWarning => "PASSWORD_WARN",
            Self::PasswordExpired => "PASSWORD_EXPIRED",
            Self::PasswordReset => "PASSWORD_RESET",
            Self::MfaEnroll => "MFA_ENROLL",
            Self::MfaEnrollActivate => "MFA_ENROLL_ACTIVATE",
            Self::MfaRequired => "MFA_REQUIRED",
            Self::MfaChallenge => "MFA_CHALLENGE",
            Self::Recovery => "RECOVERY",
            Self::RecoveryChallenge => "RECOVERY_CHALLENGE",
            Self::LockedOut => "LOCKED_OUT",
            Self::Success => "SUCCESS",
        }
    }

    #[must_use]
    pub fn from_str(value: &str) -> Option<Self> {
        match value.trim() {
            "UNAUTHENTICATED" => Some(Self::Unauthenticated),
            "PASSWORD_WARN" => Some(Self::PasswordWarning),
            "PASSWORD_EXPIRED" => Some(Self::PasswordExpired),
            "PASSWORD_RESET" => Some(Self::PasswordReset),
            "MFA_ENROLL" => Some(Self::MfaEnroll),
            "MFA_ENROLL_ACTIVATE" => Some(Self::MfaEnrollActivate),
            "MFA_REQUIRED" => Some(Self::MfaRequired),
            "MFA_CHALLENGE" => Some(Self::MfaChallenge),
            "RECOVERY" => Some(Self::Recovery),
            "RECOVERY_CHALLENGE" => Some(Self::RecoveryChallenge),
            "LOCKED_OUT" => Some(Self::LockedOut),
            "SUCCESS" => Some(Self::Success),
            _ => None,
        }
    }
}

impl fmt::Display for StatusKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Snapshot of the authentication transaction at one point in time.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AuthStatus {
    #[default]
    Unauthenticated,
    PasswordWarning {
        state_token: String,
        links: Links,
    },
    PasswordExpired {
        state_token: String,
        links: Links,
    },
    PasswordReset {
        state_token: String,
        links: Links,
    },
    MfaEnroll {
        state_token: String,
        links: Links,
        factors: Vec<Factor>,
    },
    MfaEnrollActivate {
        state_token: String,
        links: Links,
        factor: Factor,
    },
    MfaRequired {
        state_token: String,
        links: Links,
        factors: Vec<Factor>,
    },
    MfaChallenge {
        state_token: String,
        links: Links,
        factor: Factor,
        factor_result: Option<FactorResult>,
    },
    Recovery {
        state_token: String,
        links: Links,
        recovery_token: Option<String>,
    },
    RecoveryChallenge {
        state_token: String,
        links: Links,
        factor_type: Option<FactorType>,
        factor_result: Option<FactorResult>,
    },
    /// The provider does not always hand out a state token with a lockout.
    LockedOut {
        state_token: Option<String>,
        links: Links,
    },
    Success {
        session_token: String,
    },
}

impl AuthStatus {
    #[must_use]
    pub fn kind(&self) -> StatusKind {
        match self {
            Self::Unauthenticated => StatusKind::Unauthenticated,
            Self::PasswordWarning { .. } => StatusKind::PasswordWarning,
            Self::PasswordExpired { .. } => StatusKind::PasswordExpired,
            Self::PasswordReset { .. } => StatusKind::PasswordReset,
            Self::MfaEnroll { .. } => StatusKind::MfaEnroll,
            Self::MfaEnrollActivate { .. } => StatusKind::MfaEnrollActivate,
            Self::MfaRequired { .. } => StatusKind::MfaRequired,
            Self::MfaChallenge { .. } => StatusKind::MfaChallenge,
            Self::Recovery { .. } => StatusKind::Recovery,
            Self::RecoveryChallenge { .. } => StatusKind::RecoveryChallenge,
            Self::LockedOut { .. } => StatusKind::LockedOut,
            Self::Success { .. } => StatusKind::Success,
        }
    }

    #[must_use]
    pub fn state_token(&self) -> Option<&str> {
        match self {
            Self::PasswordWarning { state_token, .. }
            | Self::PasswordExpired { state_token, .. }
            | Self::PasswordReset { state_token, .. }
            | Self::MfaEnroll { state_token, .. }
            | Self::MfaEnrollActivate { state_token, .. }
            | Self::MfaRequired { state_token, .. }
            | Self::MfaChallenge { state_token, .. }
            | Self::Recovery { state_token, .. }
            | Self::RecoveryChallenge { state_token, .. } => Some(state_token),
            Self::LockedOut { state_token, .. } => state_token.as_deref(),
            Self::Unauthenticated | Self::Success { .. } => None,
        }
    }

    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        match self {
            Self::Success { session_token } => Some(session_token),
            _ => None,
        }
    }

    #[must_use]
    pub fn recovery_token(&self) -> Option<&str> {
        match self {
            Self::Recovery { recovery_token, .. } => recovery_token.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn links(&self) -> Option<&Links> {
        match self {
            Self::PasswordWarning { links, .. }
            | Self::PasswordExpired { links, .. }
            | Self::PasswordReset { links, .. }
            | Self::MfaEnroll { links, .. }
            | Self::MfaEnrollActivate { links, .. }
            | Self::MfaRequired { links, .. }
            | Self::MfaChallenge { links, .. }
            | Self::Recovery { links, .. }
            | Self::RecoveryChallenge { links, .. }
            | Self::LockedOut { links, .. } => Some(links),
            Self::Unauthenticated | Self::Success { .. } => None,
        }
    }

    #[must_use]
    pub fn factors(&self) -> &[Factor] {
        match self {
            Self::MfaEnroll { factors, .. } | Self::MfaRequired { factors, .. } => factors,
            _ => &[],
        }
    }

    #[must_use]
    pub fn factor(&self) -> Option<&Factor> {
        match self {
            Self::MfaChallenge { factor, .. } | Self::MfaEnrollActivate { factor, .. } => {
                Some(factor)
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn factor_result(&self) -> Option<FactorResult> {
        match self {
            Self::MfaChallenge { factor_result, .. }
            | Self::RecoveryChallenge { factor_result, .. } => *factor_result,
            _ => None,
        }
    }

    /// Factor type the current status refers to.
    #[must_use]
    pub fn factor_type(&self) -> Option<FactorType> {
        match self {
            Self::MfaChallenge { factor, .. } | Self::MfaEnrollActivate { factor, .. } => {
                Some(factor.factor_type)
            }
            Self::RecoveryChallenge { factor_type, .. } => *factor_type,
            _ => None,
        }
    }

    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Unauthenticated | Self::Success { .. })
    }
}

impl TryFrom<ApiSuccessResponse> for AuthStatus {
    type Error = AuthError;

    fn try_from(response: ApiSuccessResponse) -> Result<Self, Self::Error> {
        let raw_status = response
            .status
            .as_deref()
            .ok_or_else(|| AuthError::unexpected("response has no status"))?;
        let kind = StatusKind::from_str(raw_status)
            .ok_or_else(|| AuthError::unexpected(format!("unknown status '{raw_status}'")))?;

        let links = response.links.unwrap_or_default();
        let embedded = response.embedded.unwrap_or_default();
        let state_token = response.state_token;
        let required_token = || {
            state_token
                .clone()
                .ok_or_else(|| AuthError::unexpected(format!("{kind} response has no state token")))
        };

        let status = match kind {
            StatusKind::Unauthenticated => Self::Unauthenticated,
            StatusKind::PasswordWarning => Self::PasswordWarning {
                state_token: required_token()?,
                links,
            },
            StatusKind::PasswordExpired => Self::PasswordExpired {
                state_token: required_token()?,
                links,
            },
            StatusKind::PasswordReset => Self::PasswordReset {
                state_token: required_token()?,
                links,
            },
            StatusKind::MfaEnroll => Self::MfaEnroll {
                state_token: required_token()?,
                links,
                factors: embedded.factors.unwrap_or_default(),
            },
            StatusKind::MfaEnrollActivate => Self::MfaEnrollActivate {
                state_token: required_token()?,
                links,
                factor: embedded
                    .factor
                    .ok_or_else(|| AuthError::unexpected("MFA_ENROLL_ACTIVATE response has no factor"))?,
            },
            StatusKind::MfaRequired => {
                let factors = embedded
                    .factors
                    .filter(|factors| !factors.is_empty())
                    .ok_or_else(|| AuthError::unexpected("MFA_REQUIRED response has no factors"))?;
                Self::MfaRequired {
                    state_token: required_token()?,
                    links,
                    factors,
                }
            }
            StatusKind::MfaChallenge => Self::MfaChallenge {
                state_token: required_token()?,
                links,
                factor: embedded
                    .factor
                    .ok_or_else(|| AuthError::unexpected("MFA_CHALLENGE response has no factor"))?,
                factor_result: response.factor_result,
            },
            StatusKind::Recovery => Self::Recovery {
                state_token: required_token()?,
                links,
                recovery_token: response.recovery_token,
            },
            StatusKind::RecoveryChallenge => Self::RecoveryChallenge {
                state_token: required_token()?,
                links,
                factor_type: response.factor_type,
                factor_result: response.factor_result,
            },
            StatusKind::LockedOut => Self::LockedOut {
                state_token: state_token.clone(),
                links,
            },
            StatusKind::Success => Self::Success {
                session_token: response
                    .session_token
                    .ok_or_else(|| AuthError::unexpected("SUCCESS response has no session token"))?,
            },
        };

        Ok(status)
    }
}
