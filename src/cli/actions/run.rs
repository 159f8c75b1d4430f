use crate::cli::{
    actions::{login, unlock, Action},
    telemetry,
};
use anyhow::Result;

/// Single dispatch point for all CLI actions.
/// # Errors
/// Returns an error if the action fails.
pub async fn execute(action: Action) -> Result<()> {
    let result = match action {
        Action::Login(args) => login::execute(args).await,
        Action::Unlock(args) => unlock::execute(args).await,
    };

    telemetry::shutdown_tracer();

    result
}
