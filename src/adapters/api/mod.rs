//! LZT Market REST API Adapter
//!
//! Implements the HTTP side of the ports: payment history, profile
//! lookup, and transfer links.
//!
//! Sub-modules:
//! - `auth`: Bearer token credentials
//! - `client`: HTTP client with rate limiting and retries
//! - `payments`: `HistoryFetcher` implementation and transfer links
//! - `profile`: `ProfileFetcher` implementation
//! - `account`: Connected account facade
//! - `types`: API response envelopes

pub mod account;
pub mod auth;
pub mod client;
pub mod payments;
pub mod profile;
pub mod types;

pub use account::Account;
pub use auth::BearerAuth;
pub use client::{ClientConfig, LztClient};
pub use payments::payment_link;
