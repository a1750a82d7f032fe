//! LZT API Response Types
//!
//! Envelopes around the domain records. The payment collection is
//! decoded leniently because the remote sends `[]` for an empty map.

use serde::Deserialize;

use crate::domain::payment::{Payments, keyed_or_empty};
use crate::ports::profile::Profile;

/// Response of `GET user/{id}/payments`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentsHistoryResponse {
  /// Payments keyed by operation id.
  #[serde(default, deserialize_with = "keyed_or_empty")]
  pub payments: Payments,
}

/// Response of `GET me`.
///
/// Accepts both the documented `{ "user": { … } }` envelope and a flat
/// profile object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MeResponse {
  Nested { user: Profile },
  Flat(Profile),
}

impl From<MeResponse> for Profile {
  fn from(response: MeResponse) -> Self {
    match response {
      MeResponse::Nested { user } | MeResponse::Flat(user) => user,
    }
  }
}
