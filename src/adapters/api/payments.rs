//! Payments History Adapter - `user/{id}/payments` and Transfer Links
//!
//! Implements the `HistoryFetcher` port on top of `LztClient` and
//! builds the deep-link a payer follows to transfer funds to us.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Url;
use tracing::{debug, instrument};

use super::client::LztClient;
use super::types::PaymentsHistoryResponse;
use crate::domain::payment::Payments;
use crate::ports::history::{HistoryFetcher, HistoryQuery};

/// Transfer page on the market site.
pub const TRANSFER_URL: &str = "https://lzt.market/balance/transfer";

fn rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Encode the set filters of `query` as request parameters.
pub fn history_params(query: &HistoryQuery) -> Vec<(&'static str, String)> {
    let mut params = Vec::new();

    if let Some(kind) = query.operation_type.as_ref().filter(|t| !t.is_empty()) {
        params.push(("type", kind.clone()));
    }
    if let Some(min) = query.price_min {
        params.push(("pmin", min.to_string()));
    }
    if let Some(max) = query.price_max {
        params.push(("pmax", max.to_string()));
    }
    if let Some(page) = query.page {
        params.push(("page", page.to_string()));
    }
    if let Some(id) = query.operation_id_lt {
        params.push(("operation_id_lt", id.to_string()));
    }
    if let Some(receiver) = &query.receiver {
        params.push(("receiver", receiver.clone()));
    }
    if let Some(sender) = &query.sender {
        params.push(("sender", sender.clone()));
    }
    if let Some(start) = query.start_date {
        params.push(("startDate", rfc3339(start)));
    }
    if let Some(end) = query.end_date {
        params.push(("endDate", rfc3339(end)));
    }
    if let Some(wallet) = &query.wallet {
        params.push(("wallet", wallet.clone()));
    }
    if let Some(comment) = &query.comment {
        params.push(("comment", comment.clone()));
    }
    if let Some(is_hold) = query.is_hold {
        params.push(("is_hold", is_hold.to_string()));
    }
    if let Some(stats) = query.show_payment_stats {
        params.push(("show_payment_stats", stats.to_string()));
    }

    params
}

#[async_trait]
impl HistoryFetcher for LztClient {
    #[instrument(skip(self, query))]
    async fn fetch_history(&self, user_id: u64, query: &HistoryQuery) -> Result<Payments> {
        let endpoint = format!("user/{user_id}/payments");
        let response: PaymentsHistoryResponse = self
            .get_json(&endpoint, &history_params(query))
            .await
            .context("Payments history request failed")?;

        debug!(count = response.payments.len(), "Payments history fetched");
        Ok(response.payments)
    }
}

/// Link that opens a prefilled transfer of `amount` (rounded up) to `username`.
pub fn payment_link(
    username: &str,
    amount: f64,
    comment: &str,
    redirect_url: &str,
) -> Result<String> {
    anyhow::ensure!(
        amount.is_finite() && amount > 0.0,
        "Transfer amount must be positive, got {amount}"
    );
    anyhow::ensure!(!username.is_empty(), "Transfer recipient must not be empty");

    let amount = format!("{:.0}", amount.ceil());
    let url = Url::parse_with_params(
        TRANSFER_URL,
        &[
            ("username", username),
            ("hold", "0"),
            ("amount", amount.as_str()),
            ("comment", comment),
            ("redirect", redirect_url),
        ],
    )
    .context("Failed to build transfer link")?;

    Ok(url.into())
}
