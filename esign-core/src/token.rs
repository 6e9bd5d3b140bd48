//! Access tokens and their lifecycle.
//!
//! This module provides:
//! - [`Token`] - an access token with its optional refresh token and expiry
//! - [`TokenState`] - where a credential's token sits in its lifecycle
//! - [`TokenError`] - failures obtaining or refreshing a token

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::secret::Secret;

/// Error type for token operations.
#[derive(Debug, Error)]
pub enum TokenError {
    /// No token is available and none can be obtained.
    #[error("no token available: {message}")]
    NotFound { message: String },

    /// The token has expired and there is no way to refresh it.
    #[error("token expired: {message}")]
    Expired { message: String },

    /// A previous refresh was rejected; the credential can no longer be used.
    #[error("credential is no longer usable: {message}")]
    Terminated { message: String },

    /// The JWT assertion could not be signed.
    #[error("failed to sign assertion: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

/// An access token with its metadata.
///
/// Tokens are replaced, never mutated, when a credential refreshes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The bearer value sent in the `Authorization` header.
    pub access_token: Secret,

    /// Token type (usually "Bearer").
    pub token_type: String,

    /// Refresh token, when the grant issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<Secret>,

    /// When this token expires (None if unknown or non-expiring).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Token {
    /// Create a new bearer token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            token_type: "Bearer".to_string(),
            refresh_token: None,
            expires_at: None,
        }
    }

    /// Set the expiration time.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set the expiration relative to now.
    pub fn expires_in(self, seconds: i64) -> Self {
        self.with_expiry(Utc::now() + Duration::seconds(seconds))
    }

    /// Attach a refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(Secret::new(refresh_token));
        self
    }

    /// Set the token type.
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    /// Check if this token has expired.
    ///
    /// Returns `false` if no expiration is set.
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| exp < Utc::now()).unwrap_or(false)
    }

    /// Check if this token will expire within the given duration.
    pub fn expires_within(&self, duration: Duration) -> bool {
        self.expires_at
            .map(|exp| exp < Utc::now() + duration)
            .unwrap_or(false)
    }

    /// The `Authorization` header value for this token.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token.expose())
    }
}

/// Token endpoint response body.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl From<TokenResponse> for Token {
    fn from(response: TokenResponse) -> Self {
        let mut token = Token::new(response.access_token);
        if let Some(token_type) = response.token_type.filter(|t| !t.is_empty()) {
            token = token.with_token_type(token_type);
        }
        if let Some(seconds) = response.expires_in {
            token = token.expires_in(seconds);
        }
        if let Some(refresh) = response.refresh_token.filter(|r| !r.is_empty()) {
            token = token.with_refresh_token(refresh);
        }
        token
    }
}

/// Lifecycle state of a credential's token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    /// A token is present but has not been used yet.
    Unvalidated,
    /// The token has been used successfully and user info is loaded.
    Valid,
    /// The token is past its validity window.
    Expired,
    /// A refresh was rejected. A new credential must be constructed.
    Failed,
}
