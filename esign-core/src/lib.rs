//! # eSign Core
//!
//! Core library for calling the eSignature REST APIs.
//!
//! This crate provides:
//! - [`Operation`] - a description of one remote call (method, path, query, payload, files)
//! - [`ApiRequest`] - the transport-level request built from an operation
//! - [`Credential`] - trait for authorizing and sending requests
//! - [`OAuth2Credential`] and [`JwtCredential`] - authorization code and service-account credentials
//! - [`Download`] - a streamed binary response
//! - [`ApiVersion`] - URL resolution rules for each API family
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use esign_core::{Operation, OAuth2Config, Token, ESIGN_V21};
//!
//! async fn list_envelopes(config: &OAuth2Config, token: Token) -> esign_core::Result<serde_json::Value> {
//!     let credential = config.credential(token)?;
//!     Operation::get("envelopes", &ESIGN_V21)
//!         .query("status", "sent")
//!         .count(50)
//!         .execute(&credential)
//!         .await
//! }
//! ```

pub mod api_version;
pub mod config;
pub mod credential;
pub mod error;
pub mod operation;
pub mod request;
pub mod response;
pub mod secret;
pub mod token;
pub mod user_info;

// Re-export commonly used types at crate root
pub use api_version::{
    ApiVersion,
    ADMIN_V21,
    CLICK_V1,
    ESIGN_V2,
    ESIGN_V21,
    MONITOR_V2,
    ROOMS_V2,
};

pub use config::{
    AuthEndpoints,
    Environment,
    HttpClientConfig,
    JwtConfig,
    OAuth2Config,
};

pub use credential::{
    CallLog,
    Credential,
    JwtCredential,
    LoggedCredential,
    OAuth2Credential,
    RequestLogger,
    TokenCredential,
    TokenSource,
    TracingLogger,
    generate_state,
};

pub use error::{Error, ResponseError, Result};

pub use operation::{Operation, UploadFile};

pub use request::{ApiRequest, RequestBody};

pub use response::Download;

pub use secret::Secret;

pub use token::{Token, TokenError, TokenState};

pub use user_info::{UserAccount, UserInfo};
