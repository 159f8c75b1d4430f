pub mod dispatch;
pub mod error;
pub mod hooks;
pub mod orchestrator;
pub mod poll;
pub mod status;

pub use dispatch::{plan, DispatchMode, Interaction};
pub use error::AuthError;
pub use hooks::{AuthDelegate, MfaHandler, PasswordChange, StatusHandler};
pub use orchestrator::{Authenticator, AuthenticatorBuilder, AuthenticatorConfig, TransactionState};
pub use poll::DEFAULT_POLL_INTERVAL;
pub use status::{AuthStatus, StatusKind};
