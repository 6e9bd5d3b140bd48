//! Identity and account metadata returned by the user info endpoint.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::response;
use crate::token::Token;

/// The authenticated user and the accounts they can act on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Subject (user) id.
    #[serde(rename = "sub")]
    pub subject: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub given_name: Option<String>,

    #[serde(default)]
    pub family_name: Option<String>,

    #[serde(default)]
    pub email: String,

    #[serde(default)]
    pub accounts: Vec<UserAccount>,
}

/// An account linked to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub account_id: String,

    #[serde(default)]
    pub is_default: bool,

    #[serde(default)]
    pub account_name: String,

    /// Origin that serves API calls for this account.
    pub base_uri: String,
}

impl UserAccount {
    /// The parsed base URI.
    pub fn base_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.base_uri)?)
    }
}

impl UserInfo {
    /// Identifier used in error messages: the email, or the subject when
    /// the email was not released.
    pub fn display_id(&self) -> &str {
        if self.email.is_empty() {
            &self.subject
        } else {
            &self.email
        }
    }

    /// The account flagged as default, or the first one listed.
    pub fn default_account(&self) -> Option<&UserAccount> {
        self.accounts
            .iter()
            .find(|a| a.is_default)
            .or_else(|| self.accounts.first())
    }

    /// Select an account by id, or the default account when `account_id` is `None`.
    pub fn account(&self, account_id: Option<&str>) -> Result<&UserAccount> {
        let found = match account_id {
            Some(id) => self.accounts.iter().find(|a| a.account_id == id),
            None => self.default_account(),
        };

        found.ok_or_else(|| Error::AccountNotFound {
            account_id: account_id.unwrap_or("(default)").to_string(),
            user: self.display_id().to_string(),
        })
    }
}

/// Fetch user info with a bearer token.
pub(crate) async fn fetch(client: &reqwest::Client, url: &str, token: &Token) -> Result<UserInfo> {
    tracing::debug!("Fetching user info from {}", url);
    let response = client
        .get(url)
        .header(reqwest::header::AUTHORIZATION, token.authorization_header())
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await?;
    response::decode_json(response).await
}
