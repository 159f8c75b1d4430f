mod common;

use anyhow::{bail, Context, Result};
use authn_flow::{
    api::{
        request::{PrimaryAuthentication, VerifyFactor},
        types::{FactorType, Link},
        ApiConfig, AuthnApi, HttpApi,
    },
    authn::{AuthError, Authenticator, StatusKind},
};
use common::{next_event, password, Event, PasswordAnswer, Recorder};
use serde_json::json;
use std::{net::TcpListener, sync::Arc};
use url::Url;
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

fn api(server: &MockServer) -> Result<HttpApi> {
    let base_url = Url::parse(&server.uri())?;
    Ok(HttpApi::new(ApiConfig::new(base_url))?)
}

#[tokio::test]
async fn primary_authentication_posts_credentials() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/authn"))
        .and(header("Accept", "application/json"))
        .and(header("X-Device-Fingerprint", "fp-1"))
        .and(body_json(json!({
            "username": "alice",
            "password": "hunter2",
            "options": {
                "multiOptionalFactorEnroll": true,
                "warnBeforePasswordExpired": true
            },
            "context": {}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "PASSWORD_EXPIRED",
            "stateToken": "T1",
            "expiresAt": "2026-10-19T10:00:00.000Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let request = PrimaryAuthentication::new("alice", password("hunter2"))
        .with_device_fingerprint(Some("fp-1".into()));
    let response = api(&server)?.primary_authentication(&request).await?;

    assert_eq!(response.status.as_deref(), Some("PASSWORD_EXPIRED"));
    assert_eq!(response.state_token.as_deref(), Some("T1"));
    Ok(())
}

#[tokio::test]
async fn state_token_endpoints_post_the_token() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    for endpoint in ["/api/v1/authn", "/api/v1/authn/cancel"] {
        Mock::given(method("POST"))
            .and(path(endpoint))
            .and(body_json(json!({ "stateToken": "T1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "UNAUTHENTICATED"
            })))
            .expect(1)
            .mount(&server)
            .await;
    }

    let api = api(&server)?;
    api.transaction_state("T1").await?;
    let response = api.cancel_transaction("T1").await?;
    assert_eq!(response.status.as_deref(), Some("UNAUTHENTICATED"));
    Ok(())
}

#[tokio::test]
async fn change_password_and_unlock_bodies() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/authn/credentials/change_password"))
        .and(body_json(json!({
            "stateToken": "T1",
            "oldPassword": "old",
            "newPassword": "new"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "SUCCESS",
            "sessionToken": "S"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/authn/recovery/unlock"))
        .and(body_json(json!({
            "username": "alice",
            "factorType": "sms"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "RECOVERY_CHALLENGE",
            "stateToken": "R1",
            "factorType": "sms",
            "recoveryType": "UNLOCK"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server)?;
    let response = api
        .change_password("T1", &password("old"), &password("new"))
        .await?;
    assert_eq!(response.session_token.as_deref(), Some("S"));

    let response = api.unlock_account("alice", FactorType::Sms).await?;
    assert_eq!(response.factor_type, Some(FactorType::Sms));
    assert_eq!(response.recovery_type.as_deref(), Some("UNLOCK"));
    Ok(())
}

#[tokio::test]
async fn change_password_posts_to_next_link() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/custom/credentials/change_password"))
        .and(body_json(json!({
            "stateToken": "T1",
            "oldPassword": "old",
            "newPassword": "new"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "SUCCESS",
            "sessionToken": "S"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let next = Link::new(Url::parse(&format!(
        "{}/custom/credentials/change_password",
        server.uri()
    ))?);
    let response = api(&server)?
        .change_password_with_link(&next, "T1", &password("old"), &password("new"))
        .await?;
    assert_eq!(response.session_token.as_deref(), Some("S"));
    Ok(())
}

#[tokio::test]
async fn base_url_path_is_kept() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/tenant1/api/v1/authn/cancel"))
        .and(body_json(json!({ "stateToken": "T1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "UNAUTHENTICATED"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let base_url = Url::parse(&format!("{}/tenant1", server.uri()))?;
    let api = HttpApi::new(ApiConfig::new(base_url))?;
    let response = api.cancel_transaction("T1").await?;
    assert_eq!(response.status.as_deref(), Some("UNAUTHENTICATED"));
    Ok(())
}

#[tokio::test]
async fn verify_factor_sends_code_and_query() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/authn/factors/ost1/verify"))
        .and(query_param("rememberDevice", "true"))
        .and(body_json(json!({
            "stateToken": "T1",
            "passCode": "123456"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "SUCCESS",
            "sessionToken": "S"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let params = VerifyFactor::new()
        .with_pass_code("123456")
        .with_remember_device(true);
    let response = api(&server)?.verify_factor("ost1", "T1", &params).await?;
    assert_eq!(response.session_token.as_deref(), Some("S"));
    Ok(())
}

#[tokio::test]
async fn links_are_followed_verbatim() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/authn/skip"))
        .and(body_json(json!({ "stateToken": "T1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "SUCCESS",
            "sessionToken": "S"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/authn/factors/opf1/verify"))
        .and(body_json(json!({ "stateToken": "T1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "MFA_CHALLENGE",
            "stateToken": "T1",
            "factorResult": "WAITING",
            "_embedded": { "factor": { "id": "opf1", "factorType": "push" } }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let api = api(&server)?;
    let skip = Link::new(Url::parse(&format!("{}/api/v1/authn/skip", server.uri()))?);
    api.perform(&skip, Some("T1")).await?;

    let verify = Link::new(Url::parse(&format!(
        "{}/api/v1/authn/factors/opf1/verify",
        server.uri()
    ))?);
    let response = api
        .verify_factor_with_link(&verify, "T1", &VerifyFactor::new())
        .await?;
    assert_eq!(response.status.as_deref(), Some("MFA_CHALLENGE"));
    Ok(())
}

#[tokio::test]
async fn error_document_is_surfaced() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/authn"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "errorCode": "E0000004",
            "errorSummary": "Authentication failed",
            "errorLink": "E0000004",
            "errorId": "oae1",
            "errorCauses": []
        })))
        .mount(&server)
        .await;

    let request = PrimaryAuthentication::new("alice", password("wrong"));
    match api(&server)?.primary_authentication(&request).await {
        Err(AuthError::ServerRespondedWithError(error)) => {
            assert_eq!(error.error_code.as_deref(), Some("E0000004"));
            assert_eq!(error.error_summary.as_deref(), Some("Authentication failed"));
        }
        other => bail!("expected an error document, got {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn non_document_failure_reports_http_status() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/authn/cancel"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let result = api(&server)?.cancel_transaction("T1").await;
    assert!(
        matches!(result, Err(AuthError::UnexpectedStatus { status: 502 })),
        "{result:?}"
    );
    Ok(())
}

#[tokio::test]
async fn malformed_success_body_is_a_decode_error() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/authn"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let result = api(&server)?.transaction_state("T1").await;
    assert!(matches!(result, Err(AuthError::Decode(_))), "{result:?}");
    Ok(())
}

#[tokio::test]
async fn expired_password_flow_over_http() -> Result<()> {
    if !can_bind_localhost() {
        eprintln!("Skipping test: cannot bind localhost");
        return Ok(());
    }
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v1/authn"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "PASSWORD_EXPIRED",
            "stateToken": "T1",
            "_links": {
                "next": { "href": format!("{}/api/v1/authn/credentials/change_password", server.uri()) }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/v1/authn/credentials/change_password"))
        .and(body_json(json!({
            "stateToken": "T1",
            "oldPassword": "hunter2",
            "newPassword": "correct horse"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "SUCCESS",
            "sessionToken": "S"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (recorder, mut events) = Recorder::with_password(PasswordAnswer::Change {
        old: "hunter2",
        new: "correct horse",
    });
    let client = Authenticator::builder(Arc::new(api(&server)?), recorder).spawn();
    client
        .authenticate("alice", password("hunter2"), None)
        .await
        .context("authenticate rejected")?;

    match next_event(&mut events).await {
        Event::ChangePasswordRequested { can_skip: false } => {}
        other => bail!("unexpected event {other:?}"),
    }
    match next_event(&mut events).await {
        Event::Success(token) => assert_eq!(token, "S"),
        other => bail!("unexpected event {other:?}"),
    }

    let state = client.state().await?;
    assert_eq!(state.status.kind(), StatusKind::Success);
    Ok(())
}
