//! LZT API Authentication — Bearer Token
//!
//! Every request carries `authorization: Bearer <token>`. The token
//! comes from the `LZT_TOKEN` environment variable or is passed in
//! explicitly, and is never written to logs.

use anyhow::{Context, Result};

/// Environment variable holding the market API token.
pub const TOKEN_ENV: &str = "LZT_TOKEN";

/// Bearer token credentials for the LZT market API.
pub struct BearerAuth {
    /// App token with access to the market scope.
    token: String,
}

impl BearerAuth {
    /// Wrap an explicit token.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into().trim().to_string();
        anyhow::ensure!(!token.is_empty(), "API token must not be empty");
        Ok(Self { token })
    }

    /// Load the token from `LZT_TOKEN`.
    ///
    /// Keep it in `.env` or the service manager, never in `config.toml`.
    pub fn from_env() -> Result<Self> {
        let token = std::env::var(TOKEN_ENV).with_context(|| format!("{TOKEN_ENV} not set"))?;
        Self::new(token)
    }

    /// Value for the `authorization` header.
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl std::fmt::Debug for BearerAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuth")
            .field("token", &"<redacted>")
            .finish()
    }
}
