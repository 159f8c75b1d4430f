//! reqwest implementation of [`AuthnApi`].
//!
//! Every endpoint is a JSON `POST`. A 2xx body is decoded as
//! [`ApiSuccessResponse`]; anything else is decoded as the provider's error
//! document when possible and reported as `ServerRespondedWithError`, or as
//! `UnexpectedStatus` when the body is not an error document.

use crate::{
    api::{
        request::{
            change_password_body, state_token_body, unlock_body, PrimaryAuthentication,
            VerifyFactor,
        },
        types::{ApiErrorResponse, ApiSuccessResponse, FactorType, Link},
        ApiResult, AuthnApi,
    },
    authn::AuthError,
    APP_USER_AGENT,
};
use async_trait::async_trait;
use reqwest::{
    header::{ACCEPT, CONTENT_TYPE},
    Client,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info_span, Instrument};
use url::Url;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const DEVICE_FINGERPRINT_HEADER: &str = "X-Device-Fingerprint";

// Relative, so they resolve under the base URL's path.
const AUTHN_PATH: &str = "api/v1/authn";
const CHANGE_PASSWORD_PATH: &str = "api/v1/authn/credentials/change_password";
const CANCEL_PATH: &str = "api/v1/authn/cancel";
const UNLOCK_PATH: &str = "api/v1/authn/recovery/unlock";

#[derive(Clone, Debug)]
pub struct ApiConfig {
    pub base_url: Url,
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl ApiConfig {
    #[must_use]
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            user_agent: APP_USER_AGENT.to_string(),
            connect_timeout: CONNECT_TIMEOUT,
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Clone, Debug)]
pub struct HttpApi {
    client: Client,
    base_url: Url,
}

impl HttpApi {
    /// # Errors
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: ApiConfig) -> Result<Self, AuthError> {
        let client = Client::builder()
            .user_agent(config.user_agent)
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: with_trailing_slash(config.base_url),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        Ok(self.base_url.join(path)?)
    }

    async fn post(&self, url: Url, body: &Value, fingerprint: Option<&str>) -> ApiResult {
        let span = info_span!("authn.request", http.method = "POST", url.path = %url.path());

        async move {
            let mut request = self
                .client
                .post(url.clone())
                .header(ACCEPT, "application/json")
                .header(CONTENT_TYPE, "application/json")
                .json(body);
            if let Some(fingerprint) = fingerprint {
                request = request.header(DEVICE_FINGERPRINT_HEADER, fingerprint);
            }

            let response = request.send().await?;
            let status = response.status();
            let bytes = response.bytes().await?;

            if status.is_success() {
                let document: ApiSuccessResponse = serde_json::from_slice(&bytes)?;
                debug!(
                    http.status = status.as_u16(),
                    status = document.status.as_deref().unwrap_or("-"),
                    "response received"
                );
                return Ok(document);
            }

            debug!(http.status = status.as_u16(), "request rejected");
            match serde_json::from_slice::<ApiErrorResponse>(&bytes) {
                Ok(error) if error.is_error_document() => {
                    Err(AuthError::ServerRespondedWithError(error))
                }
                _ => Err(AuthError::UnexpectedStatus {
                    status: status.as_u16(),
                }),
            }
        }
        .instrument(span)
        .await
    }

    fn verify_url(&self, factor_id: &str, params: &VerifyFactor) -> Result<Url, AuthError> {
        let mut url = self.endpoint(&format!("{AUTHN_PATH}/factors/{factor_id}/verify"))?;
        append_query(&mut url, params);
        Ok(url)
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn append_query(url: &mut Url, params: &VerifyFactor) {
    let query = params.query();
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
}

#[async_trait]
impl AuthnApi for HttpApi {
    async fn primary_authentication(&self, request: &PrimaryAuthentication) -> ApiResult {
        let url = self.endpoint(AUTHN_PATH)?;
        self.post(url, &request.body(), request.device_fingerprint.as_deref())
            .await
    }

    async fn change_password(
        &self,
        state_token: &str,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> ApiResult {
        let url = self.endpoint(CHANGE_PASSWORD_PATH)?;
        let body = change_password_body(state_token, old_password, new_password);
        self.post(url, &body, None).await
    }

    async fn change_password_with_link(
        &self,
        link: &Link,
        state_token: &str,
        old_password: &SecretString,
        new_password: &SecretString,
    ) -> ApiResult {
        let body = change_password_body(state_token, old_password, new_password);
        self.post(link.href.clone(), &body, None).await
    }

    async fn transaction_state(&self, state_token: &str) -> ApiResult {
        let url = self.endpoint(AUTHN_PATH)?;
        self.post(url, &state_token_body(state_token), None).await
    }

    async fn cancel_transaction(&self, state_token: &str) -> ApiResult {
        let url = self.endpoint(CANCEL_PATH)?;
        self.post(url, &state_token_body(state_token), None).await
    }

    async fn verify_factor(
        &self,
        factor_id: &str,
        state_token: &str,
        params: &VerifyFactor,
    ) -> ApiResult {
        let url = self.verify_url(factor_id, params)?;
        self.post(url, &params.body(state_token), None).await
    }

    async fn verify_factor_with_link(
        &self,
        link: &Link,
        state_token: &str,
        params: &VerifyFactor,
    ) -> ApiResult {
        let mut url = link.href.clone();
        append_query(&mut url, params);
        self.post(url, &params.body(state_token), None).await
    }

    async fn unlock_account(&self, username: &str, factor_type: FactorType) -> ApiResult {
        let url = self.endpoint(UNLOCK_PATH)?;
        self.post(url, &unlock_body(username, factor_type), None)
            .await
    }

    async fn perform(&self, link: &Link, state_token: Option<&str>) -> ApiResult {
        let body = state_token.map_or_else(|| json!({}), state_token_body);
        self.post(link.href.clone(), &body, None).await
    }
}
