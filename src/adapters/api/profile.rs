//! Profile Adapter - `GET me`
//!
//! Implements the `ProfileFetcher` port for the authenticated account.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::debug;

use super::client::LztClient;
use super::types::MeResponse;
use crate::ports::profile::{Profile, ProfileFetcher};

#[async_trait]
impl ProfileFetcher for LztClient {
    async fn fetch_profile(&self) -> Result<Profile> {
        let response: MeResponse = self
            .get_json("me", &[])
            .await
            .context("Profile request failed")?;

        let profile = Profile::from(response);
        debug!(user_id = profile.user_id, username = %profile.username, "Profile fetched");
        Ok(profile)
    }
}
