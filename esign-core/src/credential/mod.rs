//! Credentials authorize requests and send them.
//!
//! This module provides:
//! - [`Credential`] - trait for authorizing and executing an [`ApiRequest`]
//! - [`TokenSource`] - trait for obtaining replacement tokens
//! - [`TokenCredential`] - a credential backed by a cached token and user info
//! - [`OAuth2Credential`] / [`JwtCredential`] - the two concrete grants
//! - [`LoggedCredential`] - decorator that records every call
//!
//! # Token cache
//!
//! Each credential owns one token, the cached user info and the lifecycle
//! [`TokenState`], all behind a single async mutex. The lock is held across a
//! refresh, so callers racing on an expired token queue up and all see the
//! one replacement. If the refreshing future is dropped, nothing is stored
//! and the previous token stays in place.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use tokio::sync::Mutex;
use url::Url;

use crate::api_version::HostSelection;
use crate::config::{AuthEndpoints, CredentialSettings, Environment};
use crate::error::Result;
use crate::request::ApiRequest;
use crate::token::{Token, TokenError, TokenState};
use crate::user_info::{self, UserInfo};

mod code_grant;
mod jwt;
mod logged;

pub use code_grant::{OAuth2Credential, RefreshTokenSource, generate_state};
pub use jwt::{JwtAssertionSource, JwtCredential};
pub use logged::{CallLog, LoggedCredential, RequestLogger, TracingLogger};

/// Something that can authorize and send requests.
///
/// Decorators wrap another credential and override [`execute`](Credential::execute)
/// or [`authorize`](Credential::authorize).
#[async_trait]
pub trait Credential: Send + Sync {
    /// Ensure a valid token, set the bearer header and resolve the request URL.
    async fn authorize(&self, request: &mut ApiRequest) -> Result<()>;

    /// The HTTP client calls are sent through.
    fn http_client(&self) -> &reqwest::Client;

    /// Send an authorized request.
    async fn execute(&self, request: ApiRequest) -> Result<reqwest::Response> {
        let request = request.into_reqwest(self.http_client())?;
        Ok(self.http_client().execute(request).await?)
    }

    /// Authorize and send.
    async fn send(&self, mut request: ApiRequest) -> Result<reqwest::Response> {
        self.authorize(&mut request).await?;
        self.execute(request).await
    }
}

/// Obtains a replacement token when the cached one is missing or expired.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Fetch a new token. `current` is the token being replaced, if any.
    async fn fetch_token(
        &self,
        client: &reqwest::Client,
        endpoints: &AuthEndpoints,
        current: Option<&Token>,
    ) -> Result<Token>;

    /// Client id and optional secret used to authenticate revocation.
    fn client_credentials(&self) -> (&str, Option<&str>);
}

/// Mutable per-credential state.
#[derive(Debug)]
struct CacheState {
    token: Option<Token>,
    user_info: Option<Arc<UserInfo>>,
    state: TokenState,
}

struct Shared<S> {
    source: S,
    cache: Mutex<CacheState>,
    http: reqwest::Client,
    endpoints: AuthEndpoints,
    environment: Environment,
    host_override: Option<Url>,
    expiry_buffer: Duration,
}

/// A credential backed by a cached token.
///
/// Clones and [`with_account_id`](TokenCredential::with_account_id) copies
/// share the token cache.
pub struct TokenCredential<S> {
    shared: Arc<Shared<S>>,
    account_id: Option<String>,
}

impl<S> Clone for TokenCredential<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            account_id: self.account_id.clone(),
        }
    }
}

impl<S> std::fmt::Debug for TokenCredential<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCredential")
            .field("environment", &self.shared.environment)
            .field("account_id", &self.account_id)
            .finish_non_exhaustive()
    }
}

impl<S: TokenSource> TokenCredential<S> {
    pub(crate) fn new(source: S, settings: CredentialSettings, token: Option<Token>) -> Self {
        let state = if token.is_some() {
            TokenState::Unvalidated
        } else {
            TokenState::Expired
        };
        Self {
            shared: Arc::new(Shared {
                source,
                cache: Mutex::new(CacheState {
                    token,
                    user_info: None,
                    state,
                }),
                http: settings.http,
                endpoints: settings.endpoints,
                environment: settings.environment,
                host_override: settings.host_override,
                expiry_buffer: settings.expiry_buffer,
            }),
            account_id: settings.account_id,
        }
    }

    /// A copy that acts on a different account. No network call is made
    /// until the copy is used.
    pub fn with_account_id(&self, account_id: impl Into<String>) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            account_id: Some(account_id.into()),
        }
    }

    /// Account this credential acts on, if pinned.
    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    pub fn environment(&self) -> Environment {
        self.shared.environment
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> TokenState {
        let cache = self.shared.cache.lock().await;
        match (cache.state, &cache.token) {
            (TokenState::Failed, _) => TokenState::Failed,
            (_, Some(token)) if token.expires_within(self.shared.expiry_buffer) => {
                TokenState::Expired
            }
            (state, _) => state,
        }
    }

    /// The cached token, for persisting between runs.
    pub async fn current_token(&self) -> Option<Token> {
        self.shared.cache.lock().await.token.clone()
    }

    /// A token that is valid now, refreshing first if necessary.
    pub async fn valid_token(&self) -> Result<Token> {
        let mut cache = self.shared.cache.lock().await;
        self.ensure_token(&mut cache).await
    }

    /// The authenticated user's info, fetched once and then cached.
    pub async fn user_info(&self) -> Result<Arc<UserInfo>> {
        let mut cache = self.shared.cache.lock().await;
        let token = self.ensure_token(&mut cache).await?;
        self.ensure_user_info(&mut cache, &token).await
    }

    /// Drop the cached user info so the next call fetches it again.
    pub async fn invalidate_user_info(&self) {
        let mut cache = self.shared.cache.lock().await;
        cache.user_info = None;
        if cache.state == TokenState::Valid {
            cache.state = TokenState::Unvalidated;
        }
    }

    /// Revoke the access token and retire the credential.
    pub async fn revoke(&self) -> Result<()> {
        let mut cache = self.shared.cache.lock().await;
        let Some(token) = cache.token.clone() else {
            return Err(TokenError::NotFound {
                message: "nothing to revoke".to_string(),
            }
            .into());
        };

        let (client_id, client_secret) = self.shared.source.client_credentials();
        let response = self
            .shared
            .http
            .post(&self.shared.endpoints.revoke)
            .basic_auth(client_id, client_secret)
            .form(&[("token", token.access_token.expose())])
            .send()
            .await?;
        crate::response::discard(response).await?;

        cache.token = None;
        cache.user_info = None;
        cache.state = TokenState::Failed;
        tracing::info!("Revoked access token");
        Ok(())
    }

    async fn ensure_token(&self, cache: &mut CacheState) -> Result<Token> {
        if cache.state == TokenState::Failed {
            return Err(TokenError::Terminated {
                message: "an earlier refresh was rejected".to_string(),
            }
            .into());
        }

        let needs_refresh = cache
            .token
            .as_ref()
            .map(|t| t.expires_within(self.shared.expiry_buffer))
            .unwrap_or(true);

        if needs_refresh {
            tracing::info!("Access token missing or expired, requesting a new one");
            let fetched = self
                .shared
                .source
                .fetch_token(&self.shared.http, &self.shared.endpoints, cache.token.as_ref())
                .await;

            match fetched {
                Ok(token) => {
                    cache.token = Some(token);
                    cache.state = if cache.user_info.is_some() {
                        TokenState::Valid
                    } else {
                        TokenState::Unvalidated
                    };
                    tracing::info!("Obtained new access token");
                }
                Err(e) => {
                    if e.is_rejection() {
                        tracing::error!("Token request rejected: {}", e);
                        cache.state = TokenState::Failed;
                    } else {
                        tracing::warn!("Token request failed: {}", e);
                        cache.state = TokenState::Expired;
                    }
                    return Err(e);
                }
            }
        } else {
            tracing::debug!("Using cached access token");
        }

        cache
            .token
            .clone()
            .ok_or_else(|| TokenError::NotFound {
                message: "token source returned nothing".to_string(),
            }
            .into())
    }

    async fn ensure_user_info(&self, cache: &mut CacheState, token: &Token) -> Result<Arc<UserInfo>> {
        if let Some(info) = &cache.user_info {
            return Ok(Arc::clone(info));
        }

        let info = Arc::new(
            user_info::fetch(&self.shared.http, &self.shared.endpoints.userinfo, token).await?,
        );
        tracing::debug!(
            "Loaded user info for {} ({} accounts)",
            info.display_id(),
            info.accounts.len()
        );
        cache.user_info = Some(Arc::clone(&info));
        cache.state = TokenState::Valid;
        Ok(info)
    }
}

#[async_trait]
impl<S: TokenSource + 'static> Credential for TokenCredential<S> {
    async fn authorize(&self, request: &mut ApiRequest) -> Result<()> {
        let (token, info) = {
            let mut cache = self.shared.cache.lock().await;
            let token = self.ensure_token(&mut cache).await?;
            let info = self.ensure_user_info(&mut cache, &token).await?;
            (token, info)
        };

        let account = info.account(self.account_id.as_deref())?;
        let base_uri = account.base_url()?;
        let hosts = HostSelection {
            override_url: self.shared.host_override.as_ref(),
            demo: self.shared.environment.is_demo(),
            base_uri: Some(&base_uri),
        };

        request.set_bearer(&token)?;
        let url = request.version.resolve_url(
            &request.path,
            request.query.as_deref(),
            &account.account_id,
            &hosts,
        )?;
        tracing::debug!("{} {}", request.method, url);
        request.url = Some(url);
        Ok(())
    }

    fn http_client(&self) -> &reqwest::Client {
        &self.shared.http
    }
}
