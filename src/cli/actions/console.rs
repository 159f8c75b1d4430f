//! Terminal implementation of the interaction hooks.
//!
//! Prompts read lines from stdin through one shared reader. Terminal events
//! (success, cancellation, errors, a push that will not complete) are sent to
//! the waiting action over a channel.

use crate::{
    api::types::{Factor, FactorResult},
    authn::{AuthDelegate, AuthError, AuthStatus, Authenticator, MfaHandler, PasswordChange, StatusHandler},
};
use async_trait::async_trait;
use secrecy::SecretString;
use std::{
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin},
    sync::{mpsc, Mutex},
};
use tracing::warn;

#[derive(Debug)]
pub(crate) enum Outcome {
    Success(String),
    Cancelled,
    PushEnded(FactorResult),
    StatusChanged(AuthStatus),
    Failed(AuthError),
    InputClosed,
}

#[derive(Clone)]
pub(crate) struct Console {
    lines: Arc<Mutex<Lines<BufReader<Stdin>>>>,
    outcomes: mpsc::UnboundedSender<Outcome>,
}

impl Console {
    pub(crate) fn new(outcomes: mpsc::UnboundedSender<Outcome>) -> Self {
        Self {
            lines: Arc::new(Mutex::new(BufReader::new(tokio::io::stdin()).lines())),
            outcomes,
        }
    }

    pub(crate) fn report(&self, outcome: Outcome) {
        let _ = self.outcomes.send(outcome);
    }

    /// One raw line, `None` once stdin is closed.
    pub(crate) async fn read_line(&self, label: &str) -> io::Result<Option<String>> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(label.as_bytes()).await?;
        stdout.flush().await?;

        let mut lines = self.lines.lock().await;
        lines.next_line().await
    }

    /// Trimmed answer. Hooks have no error path, so a closed stdin is reported
    /// as an outcome and the hook never resolves.
    async fn prompt(&self, label: &str) -> String {
        match self.read_line(label).await {
            Ok(Some(line)) => line.trim().to_string(),
            Ok(None) => self.abandon().await,
            Err(error) => {
                warn!("failed to read from terminal: {error}");
                self.abandon().await
            }
        }
    }

    async fn prompt_secret(&self, label: &str) -> SecretString {
        match self.read_line(label).await {
            Ok(Some(line)) => SecretString::from(line),
            Ok(None) => self.abandon().await,
            Err(error) => {
                warn!("failed to read from terminal: {error}");
                self.abandon().await
            }
        }
    }

    async fn abandon<T>(&self) -> T {
        self.report(Outcome::InputClosed);
        std::future::pending().await
    }
}

fn describe(factor: &Factor) -> String {
    let vendor = factor
        .vendor_name
        .as_deref()
        .or(factor.provider.as_deref());
    let hint = factor
        .phone_number()
        .or_else(|| factor.question_text());

    match (vendor, hint) {
        (Some(vendor), Some(hint)) => format!("{} ({vendor}, {hint})", factor.factor_type),
        (Some(vendor), None) => format!("{} ({vendor})", factor.factor_type),
        (None, Some(hint)) => format!("{} ({hint})", factor.factor_type),
        (None, None) => factor.factor_type.to_string(),
    }
}

/// Parses a 1-based menu choice.
fn choose<'a>(factors: &'a [Factor], answer: &str) -> Option<&'a Factor> {
    answer
        .parse::<usize>()
        .ok()
        .and_then(|choice| choice.checked_sub(1))
        .and_then(|index| factors.get(index))
}

/// Delegate and MFA handler for `authn login`.
pub(crate) struct ConsoleHooks {
    console: Console,
    waiting_announced: AtomicBool,
}

impl ConsoleHooks {
    pub(crate) fn new(console: Console) -> Self {
        Self {
            console,
            waiting_announced: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl AuthDelegate for ConsoleHooks {
    fn handle_success(&self, session_token: &str) {
        self.console
            .report(Outcome::Success(session_token.to_string()));
    }

    async fn handle_change_password(&self, can_skip: bool) -> PasswordChange {
        if can_skip {
            println!("Your password will expire soon.");
            let answer = self.console.prompt("Change it now? [y/N] ").await;
            if !matches!(answer.to_lowercase().as_str(), "y" | "yes") {
                return PasswordChange::Skip;
            }
        } else {
            println!("Your password has expired and must be changed.");
        }

        let old_password = self.console.prompt_secret("Current password: ").await;
        let new_password = self.console.prompt_secret("New password: ").await;
        PasswordChange::Change {
            old_password,
            new_password,
        }
    }

    fn transaction_cancelled(&self) {
        self.console.report(Outcome::Cancelled);
    }

    fn handle_error(&self, error: AuthError) {
        self.console.report(Outcome::Failed(error));
    }
}

#[async_trait]
impl MfaHandler for ConsoleHooks {
    async fn select_factor(&self, factors: &[Factor]) -> Factor {
        println!("Select a verification factor:");
        for (index, factor) in factors.iter().enumerate() {
            println!("  {}) {}", index + 1, describe(factor));
        }

        loop {
            let answer = self.console.prompt("Factor: ").await;
            if let Some(factor) = choose(factors, &answer) {
                return factor.clone();
            }
            println!("Enter a number between 1 and {}", factors.len());
        }
    }

    fn push_state_updated(&self, result: FactorResult) {
        match result {
            FactorResult::Waiting => {
                if !self.waiting_announced.swap(true, Ordering::Relaxed) {
                    println!("Push notification sent, waiting for approval...");
                }
            }
            FactorResult::Success => {}
            other => self.console.report(Outcome::PushEnded(other)),
        }
    }

    async fn request_totp(&self) -> String {
        self.console.prompt("Verification code: ").await
    }

    async fn request_sms_code(&self, phone_number: Option<&str>) -> String {
        if let Some(phone_number) = phone_number {
            println!("A verification code was sent to {phone_number}");
        }
        self.console.prompt("SMS code: ").await
    }

    async fn security_question(&self, question: &str) -> String {
        self.console.prompt(&format!("{question} ")).await
    }
}

/// Custom status handler for `authn unlock`: every status is an outcome.
pub(crate) struct StatusReporter {
    outcomes: mpsc::UnboundedSender<Outcome>,
}

impl StatusReporter {
    pub(crate) fn new(outcomes: mpsc::UnboundedSender<Outcome>) -> Self {
        Self { outcomes }
    }
}

impl StatusHandler for StatusReporter {
    fn handle_status_change(&self, status: &AuthStatus, _client: &Authenticator) {
        let _ = self.outcomes.send(Outcome::StatusChanged(status.clone()));
    }
}

#[async_trait]
impl AuthDelegate for StatusReporter {
    fn handle_success(&self, session_token: &str) {
        let _ = self
            .outcomes
            .send(Outcome::Success(session_token.to_string()));
    }

    async fn handle_change_password(&self, _can_skip: bool) -> PasswordChange {
        PasswordChange::Skip
    }

    fn transaction_cancelled(&self) {
        let _ = self.outcomes.send(Outcome::Cancelled);
    }

    fn handle_error(&self, error: AuthError) {
        let _ = self.outcomes.send(Outcome::Failed(error));
    }
}
