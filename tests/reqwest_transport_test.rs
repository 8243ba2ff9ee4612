#![cfg(feature = "reqwest")]

use std::time::Duration;

use oauth42::{AuthError, AuthorizationCodeClient, ProviderConfig, ReqwestHttpClient};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer, timeout: Duration) -> ProviderConfig {
    ProviderConfig::builder("42")
        .authorize_url(format!("{}/oauth/authorize", server.uri()))
        .token_url(format!("{}/oauth/token", server.uri()))
        .profile_url(format!("{}/v2/me", server.uri()))
        .client_id("client1")
        .client_secret("secret")
        .callback_url("http://localhost:8000/accounts/42/login/callback/")
        .allow_insecure_loopback(true)
        .timeout(timeout)
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_reqwest_exchange_and_profile() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok1",
            "token_type": "bearer",
            "expires_in": 7200
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/me"))
        .and(header("authorization", "Bearer tok1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 42, "login": "marvin"})))
        .expect(1)
        .mount(&server)
        .await;

    let http = ReqwestHttpClient::new().unwrap();
    let client = AuthorizationCodeClient::new(config(&server, Duration::from_secs(5)), http);
    let token = client.exchange_code("abc", "st", "st").await.unwrap();
    let identity = client.fetch_profile(&token).await.unwrap();
    assert_eq!(identity.external_id, "42");
    assert_eq!(identity.username.as_deref(), Some("marvin"));
}

#[tokio::test]
async fn test_reqwest_invalid_grant() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = AuthorizationCodeClient::new(
        config(&server, Duration::from_secs(5)),
        ReqwestHttpClient::new().unwrap(),
    );
    let err = client.exchange_code("abc", "st", "st").await.unwrap_err();
    assert!(matches!(err, AuthError::ProviderRejected { status: 400, .. }));
}

#[tokio::test]
async fn test_reqwest_redirects_are_not_followed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/me"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "https://evil.example/steal"))
        .mount(&server)
        .await;

    let client = AuthorizationCodeClient::new(
        config(&server, Duration::from_secs(5)),
        ReqwestHttpClient::new().unwrap(),
    );
    let token = oauth42::TokenResult {
        access_token: "tok1".into(),
        token_type: "Bearer".into(),
        expires_in_seconds: None,
        refresh_token: None,
        scope: None,
    };
    let err = client.fetch_profile(&token).await.unwrap_err();
    assert!(matches!(err, AuthError::ProviderRejected { status: 302, .. }));
}

#[tokio::test]
async fn test_reqwest_timeout_is_transport_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok1"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let client = AuthorizationCodeClient::new(
        config(&server, Duration::from_millis(100)),
        ReqwestHttpClient::new().unwrap(),
    );
    let err = client.exchange_code("abc", "st", "st").await.unwrap_err();
    assert!(matches!(err, AuthError::TransportFailure(_)));
}
