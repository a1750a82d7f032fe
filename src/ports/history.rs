//! History Fetcher Port - Filtered Payment History Retrieval
//!
//! Defines the trait for retrieving a user's payment history for a
//! time window. The watcher consumes this port; the REST adapter
//! implements it against `user/{id}/payments`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::payment::Payments;

/// Operation type the watcher filters on unless told otherwise.
pub const DEFAULT_OPERATION_TYPE: &str = "receiving_money";

/// Full filter set for a payment history request.
///
/// Every field is optional; `None` leaves that dimension unfiltered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryQuery {
  /// Operation type, e.g. `receiving_money`.
  pub operation_type: Option<String>,
  /// Minimal amount (inclusive).
  pub price_min: Option<i64>,
  /// Maximal amount (inclusive).
  pub price_max: Option<i64>,
  /// Result page number.
  pub page: Option<u32>,
  /// Only operations with an id lower than this one.
  pub operation_id_lt: Option<u64>,
  /// Username of the user who received money from us.
  pub receiver: Option<String>,
  /// Username of the user who sent money to us.
  pub sender: Option<String>,
  /// Window start.
  pub start_date: Option<DateTime<Utc>>,
  /// Window end.
  pub end_date: Option<DateTime<Utc>>,
  /// Payout wallet.
  pub wallet: Option<String>,
  /// Transfer comment.
  pub comment: Option<String>,
  /// `Some(true)` only held payments, `Some(false)` only settled ones.
  pub is_hold: Option<bool>,
  /// Ask the remote to include incoming/outgoing totals for the period.
  pub show_payment_stats: Option<bool>,
}

/// The subset of filters a watcher polls with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentFilters {
  pub operation_type: String,
  pub price_min: Option<i64>,
  pub price_max: Option<i64>,
  pub sender: Option<String>,
  pub comment: Option<String>,
  pub is_hold: Option<bool>,
}

impl Default for PaymentFilters {
  fn default() -> Self {
    Self {
      operation_type: DEFAULT_OPERATION_TYPE.to_string(),
      price_min: None,
      price_max: None,
      sender: None,
      comment: None,
      is_hold: None,
    }
  }
}

impl PaymentFilters {
  /// Build the query for one poll window.
  pub fn window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> HistoryQuery {
    HistoryQuery {
      operation_type: Some(self.operation_type.clone()).filter(|t| !t.is_empty()),
      price_min: self.price_min,
      price_max: self.price_max,
      sender: self.sender.clone(),
      comment: self.comment.clone(),
      is_hold: self.is_hold,
      start_date: Some(start),
      end_date: Some(end),
      ..HistoryQuery::default()
    }
  }
}

/// Trait for payment history providers.
///
/// A single request/response call with no internal state. The returned
/// mapping may overlap with earlier windows.
#[async_trait]
pub trait HistoryFetcher: Send + Sync + 'static {
  /// Fetch payments of `user_id` matching `query`, keyed by operation id.
  async fn fetch_history(
    &self,
    user_id: u64,
    query: &HistoryQuery,
  ) -> anyhow::Result<Payments>;
}
