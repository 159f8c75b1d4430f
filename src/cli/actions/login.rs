use crate::{
    api::{ApiConfig, HttpApi},
    authn::Authenticator,
    cli::{
        actions::console::{Console, ConsoleHooks, Outcome},
        globals::GlobalArgs,
    },
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub username: String,
    pub password: Option<SecretString>,
    pub device_fingerprint: Option<String>,
}

/// Run one transaction on the terminal and print the session token.
/// # Errors
/// Returns an error if the transaction fails, is cancelled, or stdin closes.
pub async fn execute(args: Args) -> Result<()> {
    let (outcomes_tx, mut outcomes) = mpsc::unbounded_channel();
    let console = Console::new(outcomes_tx);

    let password = match args.password {
        Some(password) => password,
        None => console
            .read_line("Password: ")
            .await?
            .map(SecretString::from)
            .context("standard input closed before a password was entered")?,
    };

    let api = HttpApi::new(ApiConfig::new(args.globals.url.clone()))
        .context("failed to build HTTP client")?;
    let hooks = Arc::new(ConsoleHooks::new(console));

    let client = Authenticator::builder(Arc::new(api), hooks.clone())
        .mfa_handler(hooks)
        .poll_interval(args.globals.poll_interval)
        .spawn();

    info!(url = %args.globals.url, username = %args.username, "starting authentication");
    client
        .authenticate(args.username, password, args.device_fingerprint)
        .await?;

    loop {
        tokio::select! {
            outcome = outcomes.recv() => {
                return match outcome {
                    Some(Outcome::Success(session_token)) => {
                        println!("{session_token}");
                        Ok(())
                    }
                    Some(Outcome::Cancelled) => Err(anyhow!("authentication cancelled")),
                    Some(Outcome::PushEnded(result)) => {
                        Err(anyhow!("push verification ended: {result}"))
                    }
                    Some(Outcome::StatusChanged(status)) => {
                        Err(anyhow!("unexpected status {}", status.kind()))
                    }
                    Some(Outcome::Failed(error)) => {
                        Err(anyhow::Error::new(error).context("authentication failed"))
                    }
                    Some(Outcome::InputClosed) | None => Err(anyhow!("standard input closed")),
                };
            }

            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("interrupted, cancelling transaction");
                if let Err(error) = client.cancel_transaction().await {
                    debug!("nothing to cancel: {error}");
                    client.reset().await?;
                    return Err(anyhow!("interrupted"));
                }
            }
        }
    }
}
