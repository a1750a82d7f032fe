//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Defines the interfaces (traits) that the watcher and account use
//! cases require from the outside world. Adapters implement these traits.
//!
//! Port categories:
//! - `HistoryFetcher`: Filtered payment history for a time window
//! - `ProfileFetcher`: Authenticated user lookup
//! - `PaymentHandler`: Caller-supplied dispatch target

pub mod handler;
pub mod history;
pub mod profile;

pub use handler::PaymentHandler;
pub use history::{HistoryFetcher, HistoryQuery, PaymentFilters};
pub use profile::{Profile, ProfileFetcher};
