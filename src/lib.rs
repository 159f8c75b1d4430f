//! # authn-flow
//!
//! Client-side orchestration of a multi-step authentication transaction against
//! an identity provider that exposes an `/api/v1/authn` style API.
//!
//! The provider owns the state machine. Every response carries a status
//! (`PASSWORD_EXPIRED`, `MFA_REQUIRED`, `MFA_CHALLENGE`, `SUCCESS`, ...) plus the
//! state token that correlates the next request. This crate keeps the latest
//! snapshot, allows a single request in flight, routes each new status to the
//! matching interaction hook and polls push factors until they resolve.
//!
//! ## Layout
//!
//! - [`api`]: the HTTP transport ([`api::AuthnApi`], [`api::HttpApi`]) and the
//!   wire types it decodes.
//! - [`authn`]: the orchestrator ([`authn::Authenticator`]), the status
//!   snapshot, the dispatcher, the push poll scheduler and the hook traits an
//!   application implements.
//! - [`cli`]: the `authn` terminal front end.
//!
//! ## Concurrency
//!
//! The orchestrator is a tokio task. [`authn::Authenticator`] is a cheap handle
//! that sends commands to it, so every mutation of the transaction goes through
//! one place and `cancel_transaction` is safe to call from anywhere.

pub mod api;
pub mod authn;
pub mod cli;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));
