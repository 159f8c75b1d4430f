//! The transaction orchestrator.
//!
//! All mutable transaction state lives in a single tokio task. [`Authenticator`]
//! is a handle that sends commands to it and waits for the precondition
//! outcome, so two requests can never be in flight at once and a cancel issued
//! from any task is serialised with network completions.
//!
//! Flow Overview:
//! - A command is checked against the held snapshot (in-flight request, state
//!   token, status kind). Failures are returned to the caller; nothing is sent.
//! - Accepted commands spawn the transport call and record its request id.
//! - The completion comes back as an event. A stale id is dropped. Errors go to
//!   the delegate and leave the snapshot alone; a valid response replaces the
//!   snapshot, invalidates the poll and the pending interaction, and dispatches.

use crate::{
    api::{
        request::{PrimaryAuthentication, VerifyFactor},
        types::{Factor, FactorResult, FactorType, Link, Links},
        ApiResult, AuthnApi,
    },
    authn::{
        dispatch::{
            plan, run_factor_selection, run_password_change, run_sms_challenge, DispatchMode,
            Interaction,
        },
        error::AuthError,
        hooks::{AuthDelegate, MfaHandler, StatusHandler},
        poll::{PollScheduler, DEFAULT_POLL_INTERVAL},
        status::AuthStatus,
    },
};
use secrecy::SecretString;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, info_span, warn, Instrument};

type Reply = oneshot::Sender<Result<(), AuthError>>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatorConfig {
    pub poll_interval: Duration,
}

impl Default for AuthenticatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl AuthenticatorConfig {
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Point-in-time view of the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionState {
    pub status: AuthStatus,
    pub request_in_flight: bool,
    pub poll_pending: bool,
}

pub struct AuthenticatorBuilder {
    api: Arc<dyn AuthnApi>,
    delegate: Arc<dyn AuthDelegate>,
    mode: DispatchMode,
    config: AuthenticatorConfig,
}

impl AuthenticatorBuilder {
    /// Enable the built-in MFA flow. Replaces a custom status handler.
    #[must_use]
    pub fn mfa_handler(mut self, handler: Arc<dyn MfaHandler>) -> Self {
        self.mode = DispatchMode::Builtin {
            mfa_handler: Some(handler),
        };
        self
    }

    /// Route every status change to `handler` instead of the built-in flow.
    /// Replaces an MFA handler.
    #[must_use]
    pub fn status_handler(mut self, handler: Arc<dyn StatusHandler>) -> Self {
        self.mode = DispatchMode::Custom(handler);
        self
    }

    #[must_use]
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.config.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn config(mut self, config: AuthenticatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the orchestrator task. Must be called inside a tokio runtime.
    #[must_use]
    pub fn spawn(self) -> Authenticator {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let orchestrator = Orchestrator {
            api: self.api,
            delegate: self.delegate,
            mode: self.mode,
            status: AuthStatus::Unauthenticated,
            in_flight: None,
            next_request_id: 0,
            poll: PollScheduler::new(self.config.poll_interval),
            interaction: None,
            events: events_tx,
            handle: commands_tx.downgrade(),
        };

        tokio::spawn(orchestrator.run(commands_rx, events_rx));

        Authenticator {
            commands: commands_tx,
        }
    }
}

/// Handle to a running orchestrator. Clones share the same transaction.
///
/// Every method resolves once the orchestrator has accepted or rejected the
/// call. `Ok(())` means the request was issued; its outcome arrives later
/// through the hooks. `Err` is a precondition failure and nothing was sent.
#[derive(Clone, Debug)]
pub struct Authenticator {
    commands: mpsc::UnboundedSender<Command>,
}

impl Authenticator {
    #[must_use]
    pub fn builder(api: Arc<dyn AuthnApi>, delegate: Arc<dyn AuthDelegate>) -> AuthenticatorBuilder {
        AuthenticatorBuilder {
            api,
            delegate,
            mode: DispatchMode::default(),
            config: AuthenticatorConfig::default(),
        }
    }

    /// # Errors
    /// `AlreadyInProgress`, or `WrongState` unless the status is `Unauthenticated`.
    pub async fn authenticate(
        &self,
        username: impl Into<String>,
        password: SecretString,
        device_fingerprint: Option<String>,
    ) -> Result<(), AuthError> {
        let request =
            PrimaryAuthentication::new(username, password).with_device_fingerprint(device_fingerprint);
        self.authenticate_with(request).await
    }

    /// Like [`Self::authenticate`], with full control over the request.
    ///
    /// # Errors
    /// `AlreadyInProgress`, or `WrongState` unless the status is `Unauthenticated`.
    pub async fn authenticate_with(&self, request: PrimaryAuthentication) -> Result<(), AuthError> {
        self.call(|reply| Command::Authenticate { request, reply })
            .await
    }

    /// Abandon the transaction. Safe to call from any task, also while a
    /// request is in flight: that request is dropped and the cancel is sent.
    ///
    /// # Errors
    /// `WrongState` without a state token.
    pub async fn cancel_transaction(&self) -> Result<(), AuthError> {
        self.call(|reply| Command::CancelTransaction { reply }).await
    }

    /// # Errors
    /// `AlreadyInProgress`, or `WrongState` without a state token.
    pub async fn fetch_transaction_state(&self) -> Result<(), AuthError> {
        self.call(|reply| Command::FetchTransactionState { reply })
            .await
    }

    /// Posts to the snapshot's `next` link when it has one, otherwise to the
    /// fixed change-password endpoint.
    ///
    /// # Errors
    /// `AlreadyInProgress`, or `WrongState` without a state token or outside
    /// `PasswordExpired`/`PasswordWarning`.
    pub async fn change_password(
        &self,
        old_password: SecretString,
        new_password: SecretString,
    ) -> Result<(), AuthError> {
        self.call(|reply| Command::ChangePassword {
            old_password,
            new_password,
            reply,
        })
        .await
    }

    /// Verify `factor` by id, or through its `verify` link when it has no id.
    ///
    /// # Errors
    /// `AlreadyInProgress`, or `WrongState` without a state token or when the
    /// factor has neither an id nor a `verify` link.
    pub async fn verify(&self, factor: Factor, params: VerifyFactor) -> Result<(), AuthError> {
        self.call(|reply| Command::Verify {
            factor,
            params,
            reply,
        })
        .await
    }

    /// Follow a link from the current snapshot, such as `skip` or `next`.
    ///
    /// # Errors
    /// `AlreadyInProgress`, or `WrongState` without a state token.
    pub async fn perform(&self, link: Link) -> Result<(), AuthError> {
        self.call(|reply| Command::Perform { link, reply }).await
    }

    /// # Errors
    /// `AlreadyInProgress`, or `WrongState` unless the status is
    /// `Unauthenticated` or `LockedOut`.
    pub async fn unlock_account(
        &self,
        username: impl Into<String>,
        factor_type: FactorType,
    ) -> Result<(), AuthError> {
        let username = username.into();
        self.call(|reply| Command::UnlockAccount {
            username,
            factor_type,
            reply,
        })
        .await
    }

    /// Drop the in-flight request, if any. The snapshot is kept.
    ///
    /// # Errors
    /// `Shutdown` if the orchestrator is gone.
    pub async fn cancel_request(&self) -> Result<(), AuthError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::CancelRequest { reply })?;
        response.await.map_err(|_| AuthError::Shutdown)
    }

    /// Drop everything and go back to `Unauthenticated`.
    ///
    /// # Errors
    /// `Shutdown` if the orchestrator is gone.
    pub async fn reset(&self) -> Result<(), AuthError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::Reset { reply })?;
        response.await.map_err(|_| AuthError::Shutdown)
    }

    /// # Errors
    /// `Shutdown` if the orchestrator is gone.
    pub async fn state(&self) -> Result<TransactionState, AuthError> {
        let (reply, response) = oneshot::channel();
        self.send(Command::State { reply })?;
        response.await.map_err(|_| AuthError::Shutdown)
    }

    fn send(&self, command: Command) -> Result<(), AuthError> {
        self.commands.send(command).map_err(|_| AuthError::Shutdown)
    }

    async fn call<F>(&self, command: F) -> Result<(), AuthError>
    where
        F: FnOnce(Reply) -> Command,
    {
        let (reply, response) = oneshot::channel();
        self.send(command(reply))?;
        response.await.map_err(|_| AuthError::Shutdown)?
    }
}

#[derive(Debug)]
enum Command {
    Authenticate {
        request: PrimaryAuthentication,
        reply: Reply,
    },
    CancelTransaction {
        reply: Reply,
    },
    FetchTransactionState {
        reply: Reply,
    },
    ChangePassword {
        old_password: SecretString,
        new_password: SecretString,
        reply: Reply,
    },
    Verify {
        factor: Factor,
        params: VerifyFactor,
        reply: Reply,
    },
    Perform {
        link: Link,
        reply: Reply,
    },
    UnlockAccount {
        username: String,
        factor_type: FactorType,
        reply: Reply,
    },
    CancelRequest {
        reply: oneshot::Sender<()>,
    },
    Reset {
        reply: oneshot::Sender<()>,
    },
    State {
        reply: oneshot::Sender<TransactionState>,
    },
}

enum Event {
    Completed { id: u64, result: ApiResult },
    PollDue { generation: u64, factor: Factor },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Operation {
    Authenticate,
    CancelTransaction,
    TransactionState,
    ChangePassword,
    Verify,
    Perform,
    UnlockAccount,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Self::Authenticate => "authenticate",
            Self::CancelTransaction => "cancel_transaction",
            Self::TransactionState => "transaction_state",
            Self::ChangePassword => "change_password",
            Self::Verify => "verify",
            Self::Perform => "perform",
            Self::UnlockAccount => "unlock_account",
        }
    }
}

struct InFlight {
    id: u64,
    operation: Operation,
    task: JoinHandle<()>,
}

struct Orchestrator {
    api: Arc<dyn AuthnApi>,
    delegate: Arc<dyn AuthDelegate>,
    mode: DispatchMode,
    status: AuthStatus,
    in_flight: Option<InFlight>,
    next_request_id: u64,
    poll: PollScheduler,
    interaction: Option<JoinHandle<()>>,
    events: mpsc::UnboundedSender<Event>,
    handle: mpsc::WeakUnboundedSender<Command>,
}

impl Orchestrator {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        debug!(
            poll_interval = ?self.poll.interval(),
            mode = ?self.mode,
            "authenticator started"
        );

        loop {
            tokio::select! {
                biased;

                Some(event) = events.recv() => self.on_event(event),

                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
            }
        }

        self.abort_in_flight();
        self.abort_interaction();
        self.poll.invalidate();
        debug!("authenticator stopped");
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Authenticate { request, reply } => {
                let _ = reply.send(self.authenticate(request));
            }
            Command::CancelTransaction { reply } => {
                let _ = reply.send(self.cancel_transaction());
            }
            Command::FetchTransactionState { reply } => {
                let _ = reply.send(self.fetch_transaction_state());
            }
            Command::ChangePassword {
                old_password,
                new_password,
                reply,
            } => {
                let _ = reply.send(self.change_password(old_password, new_password));
            }
            Command::Verify {
                factor,
                params,
                reply,
            } => {
                let _ = reply.send(self.verify(factor, params));
            }
            Command::Perform { link, reply } => {
                let _ = reply.send(self.perform(link));
            }
            Command::UnlockAccount {
                username,
                factor_type,
                reply,
            } => {
                let _ = reply.send(self.unlock_account(username, factor_type));
            }
            Command::CancelRequest { reply } => {
                if self.abort_in_flight() {
                    debug!("in-flight request cancelled");
                }
                let _ = reply.send(());
            }
            Command::Reset { reply } => {
                self.reset();
                let _ = reply.send(());
            }
            Command::State { reply } => {
                let _ = reply.send(TransactionState {
                    status: self.status.clone(),
                    request_in_flight: self.in_flight.is_some(),
                    poll_pending: self.poll.is_pending(),
                });
            }
        }
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Completed { id, result } => self.on_completed(id, result),
            Event::PollDue { generation, factor } => self.on_poll_due(generation, factor),
        }
    }

    fn ensure_idle(&self) -> Result<(), AuthError> {
        if self.in_flight.is_some() {
            return Err(AuthError::AlreadyInProgress);
        }
        Ok(())
    }

    fn require_state_token(&self) -> Result<String, AuthError> {
        self.status
            .state_token()
            .map(str::to_owned)
            .ok_or_else(|| AuthError::wrong_state("No state token"))
    }

    fn authenticate(&mut self, request: PrimaryAuthentication) -> Result<(), AuthError> {
        self.ensure_idle()?;
        if self.status != AuthStatus::Unauthenticated {
            return Err(AuthError::wrong_state(format!(
                "cannot authenticate while {}",
                self.status.kind()
            )));
        }

        let api = Arc::clone(&self.api);
        self.issue(Operation::Authenticate, async move {
            api.primary_authentication(&request).await
        });
        Ok(())
    }

    fn cancel_transaction(&mut self) -> Result<(), AuthError> {
        let state_token = self.require_state_token()?;

        self.poll.invalidate();
        self.abort_interaction();
        if self.abort_in_flight() {
            debug!("in-flight request dropped by cancel");
        }

        let api = Arc::clone(&self.api);
        self.issue(Operation::CancelTransaction, async move {
            api.cancel_transaction(&state_token).await
        });
        Ok(())
    }

    fn fetch_transaction_state(&mut self) -> Result<(), AuthError> {
        self.ensure_idle()?;
        let state_token = self.require_state_token()?;

        let api = Arc::clone(&self.api);
        self.issue(Operation::TransactionState, async move {
            api.transaction_state(&state_token).await
        });
        Ok(())
    }

    fn change_password(
        &mut self,
        old_password: SecretString,
        new_password: SecretString,
    ) -> Result<(), AuthError> {
        self.ensure_idle()?;
        let state_token = self.require_state_token()?;
        if !matches!(
            self.status,
            AuthStatus::PasswordExpired { .. } | AuthStatus::PasswordWarning { .. }
        ) {
            return Err(AuthError::wrong_state(format!(
                "cannot change password while {}",
                self.status.kind()
            )));
        }

        let next = self.status.links().and_then(Links::next).cloned();
        let api = Arc::clone(&self.api);
        self.issue(Operation::ChangePassword, async move {
            match next {
                Some(link) => {
                    api.change_password_with_link(&link, &state_token, &old_password, &new_password)
                        .await
                }
                None => {
                    api.change_password(&state_token, &old_password, &new_password)
                        .await
                }
            }
        });
        Ok(())
    }

    fn verify(&mut self, factor: Factor, params: VerifyFactor) -> Result<(), AuthError> {
        self.ensure_idle()?;
        let state_token = self.require_state_token()?;
        let api = Arc::clone(&self.api);

        if let Some(factor_id) = factor.id.clone() {
            self.issue(Operation::Verify, async move {
                api.verify_factor(&factor_id, &state_token, &params).await
            });
        } else if let Some(link) = factor.verify_link().cloned() {
            self.issue(Operation::Verify, async move {
                api.verify_factor_with_link(&link, &state_token, &params)
                    .await
            });
        } else {
            return Err(AuthError::wrong_state(format!(
                "factor {factor} has neither an id nor a verify link"
            )));
        }
        Ok(())
    }

    fn perform(&mut self, link: Link) -> Result<(), AuthError> {
        self.ensure_idle()?;
        let state_token = self.require_state_token()?;

        let api = Arc::clone(&self.api);
        self.issue(Operation::Perform, async move {
            api.perform(&link, Some(&state_token)).await
        });
        Ok(())
    }

    fn unlock_account(&mut self, username: String, factor_type: FactorType) -> Result<(), AuthError> {
        self.ensure_idle()?;
        if !matches!(
            self.status,
            AuthStatus::Unauthenticated | AuthStatus::LockedOut { .. }
        ) {
            return Err(AuthError::wrong_state(format!(
                "cannot unlock account while {}",
                self.status.kind()
            )));
        }

        let api = Arc::clone(&self.api);
        self.issue(Operation::UnlockAccount, async move {
            api.unlock_account(&username, factor_type).await
        });
        Ok(())
    }

    fn reset(&mut self) {
        self.abort_in_flight();
        self.poll.invalidate();
        self.abort_interaction();
        self.status = AuthStatus::Unauthenticated;
        debug!("transaction reset");
        self.dispatch();
    }

    fn issue<F>(&mut self, operation: Operation, request: F)
    where
        F: Future<Output = ApiResult> + Send + 'static,
    {
        self.next_request_id += 1;
        let id = self.next_request_id;
        let events = self.events.clone();
        let span = info_span!("authn.operation", operation = operation.as_str(), request.id = id);

        let task = tokio::spawn(
            async move {
                let result = request.await;
                let _ = events.send(Event::Completed { id, result });
            }
            .instrument(span),
        );

        debug!(operation = operation.as_str(), request.id = id, "request issued");
        self.in_flight = Some(InFlight {
            id,
            operation,
            task,
        });
    }

    fn abort_in_flight(&mut self) -> bool {
        match self.in_flight.take() {
            Some(in_flight) => {
                in_flight.task.abort();
                true
            }
            None => false,
        }
    }

    fn abort_interaction(&mut self) {
        if let Some(interaction) = self.interaction.take() {
            interaction.abort();
        }
    }

    fn on_completed(&mut self, id: u64, result: ApiResult) {
        let in_flight = match self.in_flight.take() {
            Some(in_flight) if in_flight.id == id => in_flight,
            other => {
                self.in_flight = other;
                debug!(request.id = id, "stale completion ignored");
                return;
            }
        };
        let operation = in_flight.operation;

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                warn!(operation = operation.as_str(), "request failed: {error}");
                self.delegate.handle_error(error);
                return;
            }
        };

        if operation == Operation::CancelTransaction {
            info!("transaction cancelled");
            self.status = AuthStatus::Unauthenticated;
            self.dispatch();
            self.delegate.transaction_cancelled();
            return;
        }

        match AuthStatus::try_from(response) {
            Ok(status) => self.apply(status),
            Err(error) => {
                warn!(operation = operation.as_str(), "response rejected: {error}");
                self.delegate.handle_error(error);
            }
        }
    }

    fn apply(&mut self, status: AuthStatus) {
        self.poll.invalidate();
        self.abort_interaction();
        debug!(from = %self.status.kind(), to = %status.kind(), "status changed");
        self.status = status;
        self.dispatch();
    }

    fn on_poll_due(&mut self, generation: u64, factor: Factor) {
        if !self.poll.take_due(generation) {
            debug!(generation, "stale poll ignored");
            return;
        }

        if self.in_flight.is_some() {
            debug!(%factor, "request in flight, poll re-armed");
            self.schedule_poll(factor);
            return;
        }

        debug!(%factor, "polling push factor");
        if let Err(error) = self.verify(factor, VerifyFactor::new()) {
            warn!("poll verify rejected: {error}");
            self.delegate.handle_error(error);
        }
    }

    fn client(&self) -> Option<Authenticator> {
        self.handle
            .upgrade()
            .map(|commands| Authenticator { commands })
    }

    fn dispatch(&mut self) {
        let mfa_handler = match &self.mode {
            DispatchMode::Custom(handler) => {
                if let Some(client) = self.client() {
                    handler.handle_status_change(&self.status, &client);
                }
                return;
            }
            DispatchMode::Builtin { mfa_handler } => mfa_handler.clone(),
        };

        match plan(&self.status, mfa_handler.is_some()) {
            Interaction::Idle => {}

            Interaction::ChangePassword { can_skip, skip } => {
                let delegate = Arc::clone(&self.delegate);
                self.spawn_interaction(move |client| {
                    run_password_change(delegate, client, can_skip, skip)
                });
            }

            Interaction::SelectFactor { factors } => {
                if let Some(mfa_handler) = mfa_handler {
                    let delegate = Arc::clone(&self.delegate);
                    self.spawn_interaction(move |client| {
                        run_factor_selection(delegate, mfa_handler, client, factors)
                    });
                }
            }

            Interaction::SmsCode { factor } => {
                if let Some(mfa_handler) = mfa_handler {
                    let delegate = Arc::clone(&self.delegate);
                    self.spawn_interaction(move |client| {
                        run_sms_challenge(delegate, mfa_handler, client, factor)
                    });
                }
            }

            Interaction::PushResult { factor, result } => {
                if let Some(mfa_handler) = &mfa_handler {
                    mfa_handler.push_state_updated(result);
                }
                if result == FactorResult::Waiting {
                    self.schedule_poll(factor);
                }
            }

            Interaction::Success { session_token } => {
                info!("authentication succeeded");
                self.delegate.handle_success(&session_token);
            }

            Interaction::StatusNotSupported(kind) => {
                warn!(status = %kind, "no handler for status");
                self.delegate
                    .handle_error(AuthError::AuthenticationStateNotSupported(kind));
            }

            Interaction::FactorNotSupported(factor) => {
                warn!(%factor, "no handler for factor challenge");
                self.delegate
                    .handle_error(AuthError::FactorNotSupported(Box::new(factor)));
            }
        }
    }

    fn spawn_interaction<F, Fut>(&mut self, interaction: F)
    where
        F: FnOnce(Authenticator) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let Some(client) = self.client() else {
            return;
        };
        self.abort_interaction();

        let span = info_span!("authn.interaction", status = %self.status.kind());
        self.interaction = Some(tokio::spawn(interaction(client).instrument(span)));
    }

    fn schedule_poll(&mut self, factor: Factor) {
        let events = self.events.clone();
        self.poll.schedule(move |generation| {
            let _ = events.send(Event::PollDue { generation, factor });
        });
    }
}
