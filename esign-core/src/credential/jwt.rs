//! Service-account credentials using the JWT bearer grant.
//!
//! There is no refresh token. Each time the token runs out a new assertion is
//! signed with the integrator's RSA key and exchanged at the token endpoint.
//! The impersonated user must have consented once, out of band, through
//! [`JwtConfig::user_consent_url`]; until then the exchange fails with a
//! `consent_required` API error.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use url::Url;

use super::code_grant::encode_params;
use super::{TokenCredential, TokenSource};
use crate::config::{AuthEndpoints, JwtConfig};
use crate::error::{Error, Result};
use crate::response;
use crate::token::{Token, TokenError, TokenResponse};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Scopes carried by every assertion and requested by default at consent.
const IMPERSONATION_SCOPES: &[&str] = &["signature", "impersonation"];

/// Credential that impersonates a user through a signed assertion.
pub type JwtCredential = TokenCredential<JwtAssertionSource>;

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
    scope: String,
}

/// Signs assertions for one impersonated user.
pub struct JwtAssertionSource {
    integrator_key: String,
    user_id: String,
    key: EncodingKey,
    key_pair_id: Option<String>,
    audience: String,
    lifetime: Duration,
}

impl JwtAssertionSource {
    fn new(config: &JwtConfig, endpoints: &AuthEndpoints, user_id: &str) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(config.private_key_pem.expose().as_bytes())
            .map_err(|e| Error::config(format!("invalid RSA private key: {}", e)))?;

        let token_url = Url::parse(&endpoints.token)?;
        let audience = token_url
            .host_str()
            .ok_or_else(|| Error::config(format!("token URL {} has no host", token_url)))?
            .to_string();

        Ok(Self {
            integrator_key: config.integrator_key.clone(),
            user_id: user_id.to_string(),
            key,
            key_pair_id: config.key_pair_id.clone(),
            audience,
            lifetime: Duration::seconds(config.assertion_lifetime_secs),
        })
    }

    fn sign_assertion(&self) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            iss: &self.integrator_key,
            sub: &self.user_id,
            aud: &self.audience,
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
            scope: IMPERSONATION_SCOPES.join(" "),
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key_pair_id.clone();

        jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|e| TokenError::Signing(e).into())
    }
}

#[async_trait]
impl TokenSource for JwtAssertionSource {
    async fn fetch_token(
        &self,
        client: &reqwest::Client,
        endpoints: &AuthEndpoints,
        _current: Option<&Token>,
    ) -> Result<Token> {
        let assertion = self.sign_assertion()?;
        tracing::debug!("Requesting token for impersonated user {}", self.user_id);

        let response = client
            .post(&endpoints.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;

        let token: TokenResponse = response::decode_json(response).await?;
        Ok(token.into())
    }

    fn client_credentials(&self) -> (&str, Option<&str>) {
        (&self.integrator_key, None)
    }
}

impl JwtConfig {
    /// A credential impersonating `user_id`. The first call signs an
    /// assertion and fetches a token.
    pub fn credential(&self, user_id: &str) -> Result<JwtCredential> {
        if user_id.trim().is_empty() {
            return Err(Error::config("user id is required"));
        }
        let settings = self.settings()?;
        let source = JwtAssertionSource::new(self, &settings.endpoints, user_id)?;
        Ok(TokenCredential::new(source, settings, None))
    }

    /// URL where a user grants this integrator key permission to
    /// impersonate them. Scopes default to `signature impersonation`.
    pub fn user_consent_url(&self, redirect_uri: &str, scopes: &[&str]) -> Result<Url> {
        if self.integrator_key.trim().is_empty() {
            return Err(Error::config("integrator_key is required"));
        }
        let mut url = Url::parse(&self.endpoints().authorize)?;

        let scopes = if scopes.is_empty() {
            IMPERSONATION_SCOPES
        } else {
            scopes
        };
        let scope = scopes.join(" ");

        let mut params = BTreeMap::new();
        params.insert("client_id", self.integrator_key.as_str());
        params.insert("redirect_uri", redirect_uri);
        params.insert("response_type", "code");
        params.insert("scope", scope.as_str());

        url.set_query(Some(&encode_params(params)));
        Ok(url)
    }
}
