//! Top-level error types.

use bytes::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::token::TokenError;

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Top-level error type for every call made through this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A required setting is missing or invalid. Raised before any network call.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Connection, DNS, TLS or timeout failure from the HTTP client.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote service answered with a non-success status.
    #[error(transparent)]
    Api(#[from] ResponseError),

    /// The requested account is not linked to the authenticated user.
    #[error("account {account_id} is not available to user {user}")]
    AccountNotFound { account_id: String, user: String },

    /// Error from token operations.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// The request payload could not be encoded as JSON.
    #[error("failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    /// A success response could not be decoded into the result type.
    #[error("failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),

    /// I/O failure while streaming a body.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A URL could not be parsed or resolved.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error came from the HTTP transport rather than the service.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// The remote error body, if the service rejected the call.
    pub fn api_error(&self) -> Option<&ResponseError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }

    /// Whether the token endpoint refused the grant, as opposed to the call
    /// failing in transit or the server failing.
    pub(crate) fn is_rejection(&self) -> bool {
        matches!(self, Self::Api(err) if err.status.is_client_error())
    }
}

/// A non-success response from the remote service.
#[derive(Debug, Clone, Error)]
#[error("{status}: {}", describe(.error_code.as_deref(), .message))]
pub struct ResponseError {
    /// HTTP status code.
    pub status: StatusCode,

    /// Remote error code such as `ENVELOPE_NOT_FOUND` or `invalid_grant`.
    pub error_code: Option<String>,

    /// Human readable message.
    pub message: String,

    /// The response body exactly as received.
    pub raw: Bytes,
}

fn describe(code: Option<&str>, message: &str) -> String {
    match code {
        Some(code) if message.is_empty() => code.to_string(),
        Some(code) => format!("{}: {}", code, message),
        None => message.to_string(),
    }
}

/// Error bodies come in two shapes: the REST API's and the OAuth endpoints'.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
    message: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl ResponseError {
    /// Decode an error body, falling back to the raw text as the message.
    pub fn from_body(status: StatusCode, raw: Bytes) -> Self {
        let parsed = serde_json::from_slice::<ErrorBody>(&raw)
            .ok()
            .filter(|b| b.error_code.is_some() || b.error.is_some() || b.message.is_some());

        match parsed {
            Some(body) => Self {
                status,
                error_code: body.error_code.or(body.error),
                message: body
                    .message
                    .or(body.error_description)
                    .unwrap_or_default(),
                raw,
            },
            None => Self {
                status,
                error_code: None,
                message: String::from_utf8_lossy(&raw).into_owned(),
                raw,
            },
        }
    }
}
