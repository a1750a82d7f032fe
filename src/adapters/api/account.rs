//! Account Facade - Connected Client with Resolved Profile
//!
//! Resolves the authenticated profile once, then exposes history
//! queries, transfer links and the payment watcher for that user.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use super::payments::payment_link;
use crate::domain::payment::Payments;
use crate::ports::handler::PaymentHandler;
use crate::ports::history::{HistoryFetcher, HistoryQuery};
use crate::ports::profile::{Profile, ProfileFetcher};
use crate::usecases::payment_watcher::{PaymentWatcher, WatcherConfig, WatcherHandle};

/// A client bound to the user behind its token.
pub struct Account<C> {
    client: Arc<C>,
    profile: Profile,
}

impl<C: HistoryFetcher + ProfileFetcher> Account<C> {
    /// Resolve the profile. Fails if the token is rejected or the remote
    /// is unreachable.
    pub async fn connect(client: Arc<C>) -> Result<Self> {
        let profile = client
            .fetch_profile()
            .await
            .context("Failed to resolve account profile")?;

        info!(
            user_id = profile.user_id,
            username = %profile.username,
            "Account connected"
        );

        Ok(Self { client, profile })
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn user_id(&self) -> u64 {
        self.profile.user_id
    }

    pub fn username(&self) -> &str {
        &self.profile.username
    }

    pub fn client(&self) -> &Arc<C> {
        &self.client
    }

    /// Payment history of this account.
    pub async fn payments_history(&self, query: &HistoryQuery) -> Result<Payments> {
        self.client.fetch_history(self.profile.user_id, query).await
    }

    /// Transfer link that pays this account.
    pub fn payment_link(&self, amount: f64, comment: &str, redirect_url: &str) -> Result<String> {
        payment_link(&self.profile.username, amount, comment, redirect_url)
    }

    /// Build a watcher for this account without starting it.
    pub fn watcher(&self, config: WatcherConfig) -> PaymentWatcher<C> {
        PaymentWatcher::new(Arc::clone(&self.client), self.profile.user_id, config)
    }

    /// Start watching for new payments; `None` uses the default config.
    pub fn watch_payments<H: PaymentHandler>(
        &self,
        handler: H,
        config: Option<WatcherConfig>,
    ) -> WatcherHandle {
        self.watcher(config.unwrap_or_default()).start(handler)
    }
}
