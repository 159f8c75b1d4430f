//! Transport for the authentication API.
//!
//! The orchestrator only sees [`AuthnApi`]; [`HttpApi`] is the reqwest
//! implementation, tests substitute their own.

mod http;
pub mod request;
pub mod types;

pub use http::{ApiConfig, HttpApi};

use crate::{
    api::{
        request::{PrimaryAuthentication, VerifyFactor},
        types::{ApiSuccessResponse, FactorType, Link},
    },
    authn::AuthError,
};
use async_trait::async_trait;
use secrecy::SecretString;

pub type ApiResult = Result<ApiSuccessResponse, AuthError>;

/// One method per protocol endpoint. Every call resolves to either a decoded
/// success document or an [`AuthError`]; implementations must not retry.
#[async_trait]
pub trait AuthnApi: Send + Sync {
    async fn primary_authentication(&self, request: &PrimaryAuthentication) -> ApiResult;

    async fn change_password(
        &self,
        state_token: &str,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> ApiResult;

    async fn change_password_with_link(
        &self,
        link: &Link,
        state_token: &str,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> ApiResult;

    async fn transaction_state(&self, state_token: &str) -> ApiResult;

    async fn cancel_transaction(&self, state_token: &str) -> ApiResult;

    async fn verify_factor(
        &self,
        factor_id: &str,
        state_token: &str,
        params: &VerifyFactor,
    ) -> ApiResult;

    async fn verify_factor_with_link(
        &self,
        link: &Link,
        state_token: &str,
        params: &VerifyFactor,
    ) -> ApiResult;

    async fn unlock_account(&self, username: &str, factor_type: FactorType) -> ApiResult;

    /// POST the state token to an arbitrary link from a previous response.
    async fn perform(&self, link: &Link, state_token: Option<&str>) -> ApiResult;
}
