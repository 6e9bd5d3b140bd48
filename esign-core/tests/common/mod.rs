//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use chrono::{Duration, Utc};
use esign_core::{AuthEndpoints, OAuth2Config, Token};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const EMAIL: &str = "pat@example.com";

/// OAuth2 config whose account server is the mock server.
pub fn oauth_config(server: &MockServer) -> OAuth2Config {
    OAuth2Config::new("integrator-key", "client-secret", "https://example.com/callback")
        .with_endpoints(AuthEndpoints::with_base(&server.uri()))
}

/// A token that is good for another hour.
pub fn valid_token(access: &str) -> Token {
    Token::new(access)
        .with_expiry(Utc::now() + Duration::hours(1))
        .with_refresh_token("refresh-1")
}

/// A token that expired an hour ago.
pub fn expired_token(access: &str) -> Token {
    Token::new(access)
        .with_expiry(Utc::now() - Duration::hours(1))
        .with_refresh_token("refresh-1")
}

/// User info listing account A (default) and account B, both served from `base_uri`.
pub fn user_info_body(base_uri: &str, other_base_uri: &str) -> serde_json::Value {
    json!({
        "sub": "user-guid",
        "name": "Pat Signer",
        "email": EMAIL,
        "accounts": [
            {"account_id": "A", "is_default": true, "account_name": "Main", "base_uri": base_uri},
            {"account_id": "B", "is_default": false, "account_name": "Side", "base_uri": other_base_uri}
        ]
    })
}

/// Mount the user info endpoint, expecting exactly `calls` requests.
pub async fn mount_user_info(server: &MockServer, base_uri: &str, calls: u64) {
    Mock::given(method("GET"))
        .and(path("/oauth/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_info_body(base_uri, base_uri)))
        .expect(calls)
        .mount(server)
        .await;
}

/// Mount an API endpoint under account A that requires `bearer`.
pub async fn mount_api(server: &MockServer, api_path: &str, bearer: &str, calls: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/restapi/v2.1/accounts/A/{}", api_path)))
        .and(header("authorization", format!("Bearer {}", bearer).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(calls)
        .mount(server)
        .await;
}

pub fn token_body(access: &str) -> serde_json::Value {
    json!({
        "access_token": access,
        "token_type": "Bearer",
        "expires_in": 3600
    })
}
