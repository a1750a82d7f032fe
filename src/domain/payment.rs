//! Payment history records.
//!
//! Mirrors the wire shape of the LZT market `user/{id}/payments` endpoint.
//! Every field is optional on the wire, so the structs default missing
//! values. The remote service encodes an empty keyed collection as `[]`
//! instead of `{}`, and the lenient helpers at the bottom of this module
//! normalize those shapes instead of failing the whole response.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// Lightweight operation identifier.
pub type OperationId = u64;

/// Payments keyed by operation id (as the remote returns it, a string).
///
/// Iteration order is unspecified.
pub type Payments = HashMap<String, Payment>;

/// Balance snapshot of the account that owns the operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserBalance {
    pub user_id: u64,
    pub user_balance: i64,
    pub user_hold: i64,
    pub user_balance_with_hold: i64,
}

/// Counterparty profile attached to an operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentData {
    pub user_id: u64,
    pub username: String,
    pub comment: String,
    pub is_banned: i64,
    pub display_style_group_id: i64,
    pub uniq_username_css: String,
    pub avatar_date: i64,
    pub user_group_id: i64,
}

/// A single payment history entry.
///
/// Identity is `operation_id`. The fetch layer does not enforce
/// uniqueness, so the same id may be observed by more than one poll.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Payment {
    pub operation_id: OperationId,
    /// Unix timestamp, seconds.
    pub operation_date: i64,
    /// Operation tag, e.g. `receiving_money`.
    pub operation_type: String,
    pub outgoing_sum: i64,
    pub incoming_sum: i64,
    pub item_id: u64,
    pub wallet: String,
    /// Boolean encoded as an integer.
    pub is_finished: i64,
    /// Boolean encoded as an integer.
    pub is_hold: i64,
    pub payment_system: String,
    #[serde(deserialize_with = "object_or_empty")]
    pub data: Option<PaymentData>,
    pub hold_end_date: i64,
    pub api: i64,
    pub payment_status: String,
    #[serde(deserialize_with = "object_or_empty")]
    pub user: Option<UserBalance>,
}

impl Payment {
    /// Whether the funds are still on hold.
    pub fn held(&self) -> bool {
        self.is_hold != 0
    }

    /// Whether the remote marked the operation as finished.
    pub fn finished(&self) -> bool {
        self.is_finished != 0
    }

    /// Operation date as a UTC timestamp, `None` if out of range.
    pub fn operation_time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.operation_date, 0)
    }

    /// Sender username, when the remote attached a profile.
    pub fn counterparty(&self) -> Option<&str> {
        self.data
            .as_ref()
            .map(|d| d.username.as_str())
            .filter(|name| !name.is_empty())
    }
}

// ────────────────────────────────────────────
// Lenient decoding helpers
// ────────────────────────────────────────────

/// Decode a keyed payment collection that may arrive as an object, a list,
/// or `null`.
///
/// List items are keyed by their `operation_id`.
pub fn keyed_or_empty<'de, D>(deserializer: D) -> Result<Payments, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape {
        Listed(Vec<Payment>),
        Keyed(Payments),
    }

    Ok(match Option::<Shape>::deserialize(deserializer)? {
        Some(Shape::Keyed(map)) => map,
        Some(Shape::Listed(list)) => list
            .into_iter()
            .map(|p| (p.operation_id.to_string(), p))
            .collect(),
        None => Payments::new(),
    })
}

/// Decode a nested object that the remote replaces with `[]` when empty.
pub fn object_or_empty<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Shape<T> {
        Listed(Vec<IgnoredAny>),
        Object(T),
    }

    Ok(match Option::<Shape<T>>::deserialize(deserializer)? {
        Some(Shape::Object(value)) => Some(value),
        Some(Shape::Listed(_)) | None => None,
    })
}
