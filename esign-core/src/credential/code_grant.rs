//! Authorization code grant.
//!
//! The user approves access at the consent URL from
//! [`OAuth2Config::authorization_url`], the redirect carries a one-time code,
//! and [`OAuth2Config::exchange`] redeems it for a refreshable credential.

use std::collections::BTreeMap;

use async_trait::async_trait;
use url::{Url, form_urlencoded};

use super::{TokenCredential, TokenSource};
use crate::config::{AuthEndpoints, OAuth2Config};
use crate::error::Result;
use crate::response;
use crate::secret::Secret;
use crate::token::{Token, TokenError, TokenResponse};

/// Scopes requested when the caller names none.
const DEFAULT_SCOPES: &[&str] = &["signature"];

const STATE_LENGTH: usize = 32;

/// Credential obtained through the authorization code grant.
pub type OAuth2Credential = TokenCredential<RefreshTokenSource>;

/// Replaces expired tokens by redeeming the refresh token.
pub struct RefreshTokenSource {
    client_id: String,
    client_secret: Secret,
    redirect_url: String,
}

impl RefreshTokenSource {
    fn new(config: &OAuth2Config) -> Self {
        Self {
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_url: config.redirect_url.clone(),
        }
    }

    /// POST a grant to the token endpoint, authenticating with the client
    /// id and secret.
    async fn request_token(
        &self,
        client: &reqwest::Client,
        endpoints: &AuthEndpoints,
        params: &[(&str, &str)],
    ) -> Result<Token> {
        let response = client
            .post(&endpoints.token)
            .basic_auth(&self.client_id, Some(self.client_secret.expose()))
            .header(reqwest::header::ACCEPT, "application/json")
            .form(params)
            .send()
            .await?;

        let token: TokenResponse = response::decode_json(response).await?;
        Ok(token.into())
    }
}

#[async_trait]
impl TokenSource for RefreshTokenSource {
    async fn fetch_token(
        &self,
        client: &reqwest::Client,
        endpoints: &AuthEndpoints,
        current: Option<&Token>,
    ) -> Result<Token> {
        let refresh_token = current
            .and_then(|t| t.refresh_token.as_ref())
            .ok_or_else(|| TokenError::Expired {
                message: "token expired and no refresh token available".to_string(),
            })?;

        let mut token = self
            .request_token(
                client,
                endpoints,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token.expose()),
                ],
            )
            .await?;

        // The server may rotate the refresh token or leave it out.
        if token.refresh_token.is_none() {
            token.refresh_token = Some(refresh_token.clone());
        }
        Ok(token)
    }

    fn client_credentials(&self) -> (&str, Option<&str>) {
        (&self.client_id, Some(self.client_secret.expose()))
    }
}

impl OAuth2Config {
    /// URL of the consent page the user is sent to.
    ///
    /// Parameters appear in sorted key order. Scopes are space separated and
    /// the spaces are written as `%20`; the consent page rejects `+`.
    ///
    /// # Example
    ///
    /// ```
    /// use esign_core::OAuth2Config;
    ///
    /// let config = OAuth2Config::new("key", "secret", "https://example.com/cb");
    /// let url = config.authorization_url("xyz", &["signature", "extended"]).unwrap();
    /// assert!(url.as_str().contains("scope=signature%20extended"));
    /// ```
    pub fn authorization_url(&self, state: &str, scopes: &[&str]) -> Result<Url> {
        self.validate()?;
        let mut url = Url::parse(&self.endpoints().authorize)?;

        let scopes = if scopes.is_empty() { DEFAULT_SCOPES } else { scopes };
        let scope = scopes.join(" ");

        let mut params = BTreeMap::new();
        params.insert("client_id", self.client_id.as_str());
        if self.prompt_login {
            params.insert("prompt", "login");
        }
        params.insert("redirect_uri", self.redirect_url.as_str());
        params.insert("response_type", "code");
        params.insert("scope", scope.as_str());
        params.insert("state", state);

        url.set_query(Some(&encode_params(params)));
        Ok(url)
    }

    /// Redeem an authorization code.
    ///
    /// User info is fetched straight away so an unusable grant fails here
    /// rather than on the first API call.
    pub async fn exchange(&self, code: &str) -> Result<OAuth2Credential> {
        let settings = self.settings()?;
        let source = RefreshTokenSource::new(self);

        let token = source
            .request_token(
                &settings.http,
                &settings.endpoints,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("redirect_uri", source.redirect_url.as_str()),
                ],
            )
            .await?;
        tracing::info!("Exchanged authorization code for an access token");

        let credential = TokenCredential::new(source, settings, Some(token));
        credential.user_info().await?;
        Ok(credential)
    }

    /// Rebuild a credential from a saved token. Nothing is sent until the
    /// credential is first used.
    pub fn credential(&self, token: Token) -> Result<OAuth2Credential> {
        let settings = self.settings()?;
        Ok(TokenCredential::new(RefreshTokenSource::new(self), settings, Some(token)))
    }
}

/// Random value for the `state` parameter.
pub fn generate_state() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();

    (0..STATE_LENGTH)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

/// Form-encode consent URL parameters, writing spaces in `scope` as `%20`.
pub(crate) fn encode_params<'a>(params: impl IntoIterator<Item = (&'a str, &'a str)>) -> String {
    params
        .into_iter()
        .map(|(key, value)| {
            let mut encoded: String = form_urlencoded::byte_serialize(value.as_bytes()).collect();
            if key == "scope" {
                encoded = encoded.replace('+', "%20");
            }
            format!("{}={}", key, encoded)
        })
        .collect::<Vec<_>>()
        .join("&")
}
