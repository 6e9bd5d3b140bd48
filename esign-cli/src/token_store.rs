//! Saved OAuth token persistence.
//!
//! The token from `esign exchange` is written as JSON so later commands can
//! rebuild the credential without a new consent round trip. Refreshed tokens
//! are written back after each command.

use anyhow::{Context, Result};
use esign_core::Token;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// The saved token, if any.
    pub fn load(&self) -> Result<Option<Token>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read token from {:?}", self.path))?;
        let token = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse token from {:?}", self.path))?;
        Ok(Some(token))
    }

    pub fn save(&self, token: &Token) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory {:?}", parent))?;
        }

        let contents = serde_json::to_string_pretty(token)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
            options.mode(0o600);
            // An existing file keeps its mode, so tighten it before writing.
            if self.path.exists() {
                fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
            }
        }

        let mut file = options
            .open(&self.path)
            .with_context(|| format!("Failed to open token file {:?}", self.path))?;
        file.write_all(contents.as_bytes())
            .with_context(|| format!("Failed to write token to {:?}", self.path))?;

        tracing::debug!("Saved token to {:?}", self.path);
        Ok(())
    }

    /// Remove the saved token. Succeeds if there was none.
    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to remove token file {:?}", self.path))?;
        }
        Ok(())
    }
}
