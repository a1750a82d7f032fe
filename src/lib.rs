//! LZT Payments — Library Root
//!
//! Client for the LZT market payment ledger plus a polling watcher that
//! turns the payment history endpoint into a stream of new payments.
//!
//! Layers follow the hexagonal layout: `domain` (records and polling
//! state), `ports` (fetcher and handler traits), `usecases` (the
//! watcher), `adapters` (REST client, metrics), `config` (TOML).

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod ports;
pub mod usecases;

pub use adapters::api::{Account, BearerAuth, ClientConfig, LztClient, payment_link};
pub use domain::{Payment, Payments, Watermark};
pub use error::ApiError;
pub use ports::{HistoryFetcher, HistoryQuery, PaymentFilters, PaymentHandler, Profile, ProfileFetcher};
pub use usecases::{PaymentWatcher, WatcherConfig, WatcherEvent, WatcherHandle, WatcherSummary};
