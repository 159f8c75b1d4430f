use crate::{
    api::{types::FactorType, ApiConfig, HttpApi},
    authn::{AuthStatus, Authenticator},
    cli::{
        actions::console::{Outcome, StatusReporter},
        globals::GlobalArgs,
    },
};
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub username: String,
    pub factor_type: FactorType,
}

/// Request an account unlock and report what the provider answered.
/// # Errors
/// Returns an error if the provider rejects the request.
pub async fn execute(args: Args) -> Result<()> {
    let (outcomes_tx, mut outcomes) = mpsc::unbounded_channel();
    let reporter = Arc::new(StatusReporter::new(outcomes_tx));

    let api = HttpApi::new(ApiConfig::new(args.globals.url.clone()))
        .context("failed to build HTTP client")?;
    let client = Authenticator::builder(Arc::new(api), reporter.clone())
        .status_handler(reporter)
        .spawn();

    info!(url = %args.globals.url, username = %args.username, factor = %args.factor_type, "requesting unlock");
    client
        .unlock_account(args.username, args.factor_type)
        .await?;

    match outcomes.recv().await {
        Some(Outcome::StatusChanged(AuthStatus::RecoveryChallenge { factor_type, .. })) => {
            let channel = factor_type.unwrap_or(args.factor_type);
            println!("Unlock instructions sent via {channel}");
            Ok(())
        }
        Some(Outcome::StatusChanged(status)) => {
            println!("Unlock request accepted, status {}", status.kind());
            Ok(())
        }
        Some(Outcome::Failed(error)) => Err(anyhow::Error::new(error).context("unlock failed")),
        _ => Err(anyhow!("unlock ended without an answer")),
    }
}
