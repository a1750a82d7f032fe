//! Profile Fetcher Port - Authenticated Account Lookup
//!
//! Resolves the user behind the API token. Called once when an
//! account is connected; the watcher only needs the resulting id.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Identity of the authenticated user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
  pub user_id: u64,
  pub username: String,
}

/// Trait for resolving the authenticated profile.
#[async_trait]
pub trait ProfileFetcher: Send + Sync + 'static {
  async fn fetch_profile(&self) -> anyhow::Result<Profile>;
}
