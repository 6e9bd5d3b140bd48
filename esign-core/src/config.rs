//! Credential configuration.
//!
//! This module provides:
//! - [`Environment`] - production or demo account servers
//! - [`AuthEndpoints`] - the OAuth endpoints of an account server
//! - [`HttpClientConfig`] - settings for the HTTP client used by credentials
//! - [`OAuth2Config`] - authorization code grant settings
//! - [`JwtConfig`] - service-account (JWT bearer grant) settings
//!
//! Configs deserialize from TOML or JSON. Validation happens before any
//! network call and yields [`Error::Config`].

use chrono::Duration;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::secret::Secret;

/// Tokens within this many seconds of expiry are refreshed before use.
const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 60;

/// Lifetime requested for signed JWT assertions.
const DEFAULT_ASSERTION_LIFETIME_SECS: i64 = 3600;

const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Which account server a credential authenticates against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Demo,
}

impl Environment {
    /// Host of the account server.
    pub fn auth_host(self) -> &'static str {
        match self {
            Self::Production => "account.docusign.com",
            Self::Demo => "account-d.docusign.com",
        }
    }

    pub fn is_demo(self) -> bool {
        matches!(self, Self::Demo)
    }
}

/// OAuth endpoints of an account server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEndpoints {
    /// Consent / authorization endpoint.
    pub authorize: String,

    /// Token endpoint.
    pub token: String,

    /// User info endpoint.
    pub userinfo: String,

    /// Token revocation endpoint.
    pub revoke: String,
}

impl AuthEndpoints {
    /// Endpoints of the account server for an environment.
    pub fn for_environment(environment: Environment) -> Self {
        Self::with_base(&format!("https://{}", environment.auth_host()))
    }

    /// Endpoints rooted at an arbitrary base URL.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            authorize: format!("{}/oauth/auth", base),
            token: format!("{}/oauth/token", base),
            userinfo: format!("{}/oauth/userinfo", base),
            revoke: format!("{}/oauth/revoke", base),
        }
    }
}

/// Settings for the HTTP client shared by a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// Whole-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// `User-Agent` header value.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_user_agent() -> String {
    concat!("esign-rs/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_expiry_buffer_secs() -> i64 {
    DEFAULT_EXPIRY_BUFFER_SECS
}

fn default_assertion_lifetime_secs() -> i64 {
    DEFAULT_ASSERTION_LIFETIME_SECS
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl HttpClientConfig {
    /// Build a client from these settings.
    pub fn build(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::builder()
            .user_agent(self.user_agent.clone())
            .timeout(std::time::Duration::from_secs(self.timeout_secs))
            .build()?)
    }
}

/// Settings every credential needs once its grant-specific config is validated.
#[derive(Debug, Clone)]
pub(crate) struct CredentialSettings {
    pub http: reqwest::Client,
    pub endpoints: AuthEndpoints,
    pub environment: Environment,
    pub host_override: Option<Url>,
    pub expiry_buffer: Duration,
    pub account_id: Option<String>,
}

/// Fields shared by both grant configs.
struct CommonFields<'a> {
    environment: Environment,
    endpoints: &'a Option<AuthEndpoints>,
    account_id: &'a Option<String>,
    host_override: &'a Option<String>,
    expiry_buffer_secs: i64,
    http: &'a HttpClientConfig,
    http_client: &'a Option<reqwest::Client>,
}

impl CommonFields<'_> {
    fn settings(&self) -> Result<CredentialSettings> {
        let host_override = match self.host_override.as_deref() {
            Some(raw) if !raw.is_empty() => Some(Url::parse(raw).map_err(|e| {
                Error::config(format!("invalid host override {:?}: {}", raw, e))
            })?),
            _ => None,
        };

        let http = match self.http_client {
            Some(client) => client.clone(),
            None => self.http.build()?,
        };

        Ok(CredentialSettings {
            http,
            endpoints: self
                .endpoints
                .clone()
                .unwrap_or_else(|| AuthEndpoints::for_environment(self.environment)),
            environment: self.environment,
            host_override,
            expiry_buffer: Duration::seconds(self.expiry_buffer_secs.max(0)),
            account_id: self.account_id.clone().filter(|id| !id.is_empty()),
        })
    }
}

/// Authorization code grant settings.
///
/// # Example
///
/// ```
/// use esign_core::{Environment, OAuth2Config};
///
/// let config = OAuth2Config::new("integrator-key", "secret", "https://example.com/callback")
///     .with_environment(Environment::Demo);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct OAuth2Config {
    /// Integrator key.
    pub client_id: String,

    /// Client secret.
    pub client_secret: Secret,

    /// Redirect URI registered for the integrator key.
    pub redirect_url: String,

    #[serde(default)]
    pub environment: Environment,

    /// Replaces the environment's endpoints when set.
    #[serde(default)]
    pub endpoints: Option<AuthEndpoints>,

    /// Force the login prompt even when the user has a session.
    #[serde(default)]
    pub prompt_login: bool,

    /// Account to act on; the user's default account when unset.
    #[serde(default)]
    pub account_id: Option<String>,

    /// Send API calls to this origin instead of the resolved host.
    #[serde(default)]
    pub host_override: Option<String>,

    #[serde(default = "default_expiry_buffer_secs")]
    pub expiry_buffer_secs: i64,

    #[serde(default)]
    pub http: HttpClientConfig,

    /// Client to use instead of one built from `http`.
    #[serde(skip)]
    pub http_client: Option<reqwest::Client>,
}

impl OAuth2Config {
    /// Create a config with production defaults.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: Secret::new(client_secret),
            redirect_url: redirect_url.into(),
            environment: Environment::default(),
            endpoints: None,
            prompt_login: false,
            account_id: None,
            host_override: None,
            expiry_buffer_secs: default_expiry_buffer_secs(),
            http: HttpClientConfig::default(),
            http_client: None,
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_endpoints(mut self, endpoints: AuthEndpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_host_override(mut self, origin: impl Into<String>) -> Self {
        self.host_override = Some(origin.into());
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn with_prompt_login(mut self, prompt: bool) -> Self {
        self.prompt_login = prompt;
        self
    }

    /// Endpoints in effect for this config.
    pub fn endpoints(&self) -> AuthEndpoints {
        self.endpoints
            .clone()
            .unwrap_or_else(|| AuthEndpoints::for_environment(self.environment))
    }

    /// Check required fields.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::config("client_id is required"));
        }
        if self.client_secret.is_empty() {
            return Err(Error::config("client_secret is required"));
        }
        if self.redirect_url.trim().is_empty() {
            return Err(Error::config("redirect_url is required"));
        }
        Url::parse(&self.redirect_url).map_err(|e| {
            Error::config(format!("invalid redirect_url {:?}: {}", self.redirect_url, e))
        })?;
        Ok(())
    }

    pub(crate) fn settings(&self) -> Result<CredentialSettings> {
        self.validate()?;
        CommonFields {
            environment: self.environment,
            endpoints: &self.endpoints,
            account_id: &self.account_id,
            host_override: &self.host_override,
            expiry_buffer_secs: self.expiry_buffer_secs,
            http: &self.http,
            http_client: &self.http_client,
        }
        .settings()
    }
}

/// Service-account (JWT bearer grant) settings.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    /// Integrator key; the assertion's issuer.
    pub integrator_key: String,

    /// RSA key pair id, sent as the assertion's `kid` header.
    #[serde(default)]
    pub key_pair_id: Option<String>,

    /// PEM encoded RSA private key.
    pub private_key_pem: Secret,

    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub endpoints: Option<AuthEndpoints>,

    #[serde(default)]
    pub account_id: Option<String>,

    #[serde(default)]
    pub host_override: Option<String>,

    #[serde(default = "default_expiry_buffer_secs")]
    pub expiry_buffer_secs: i64,

    #[serde(default = "default_assertion_lifetime_secs")]
    pub assertion_lifetime_secs: i64,

    #[serde(default)]
    pub http: HttpClientConfig,

    #[serde(skip)]
    pub http_client: Option<reqwest::Client>,
}

impl JwtConfig {
    /// Create a config with production defaults.
    pub fn new(integrator_key: impl Into<String>, private_key_pem: impl Into<String>) -> Self {
        Self {
            integrator_key: integrator_key.into(),
            key_pair_id: None,
            private_key_pem: Secret::new(private_key_pem),
            environment: Environment::default(),
            endpoints: None,
            account_id: None,
            host_override: None,
            expiry_buffer_secs: default_expiry_buffer_secs(),
            assertion_lifetime_secs: default_assertion_lifetime_secs(),
            http: HttpClientConfig::default(),
            http_client: None,
        }
    }

    pub fn with_key_pair_id(mut self, key_pair_id: impl Into<String>) -> Self {
        self.key_pair_id = Some(key_pair_id.into());
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_endpoints(mut self, endpoints: AuthEndpoints) -> Self {
        self.endpoints = Some(endpoints);
        self
    }

    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn with_host_override(mut self, origin: impl Into<String>) -> Self {
        self.host_override = Some(origin.into());
        self
    }

    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Endpoints in effect for this config.
    pub fn endpoints(&self) -> AuthEndpoints {
        self.endpoints
            .clone()
            .unwrap_or_else(|| AuthEndpoints::for_environment(self.environment))
    }

    /// Check required fields.
    pub fn validate(&self) -> Result<()> {
        if self.integrator_key.trim().is_empty() {
            return Err(Error::config("integrator_key is required"));
        }
        if self.private_key_pem.is_empty() {
            return Err(Error::config("private_key_pem is required"));
        }
        if self.assertion_lifetime_secs <= 0 {
            return Err(Error::config("assertion_lifetime_secs must be positive"));
        }
        Ok(())
    }

    pub(crate) fn settings(&self) -> Result<CredentialSettings> {
        self.validate()?;
        CommonFields {
            environment: self.environment,
            endpoints: &self.endpoints,
            account_id: &self.account_id,
            host_override: &self.host_override,
            expiry_buffer_secs: self.expiry_buffer_secs,
            http: &self.http,
            http_client: &self.http_client,
        }
        .settings()
    }
}
