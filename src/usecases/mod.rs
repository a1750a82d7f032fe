//! Use Cases Layer - Application Business Logic
//!
//! Orchestrates domain types with port interfaces.
//!
//! Use cases:
//! - `PaymentWatcher`: Incremental polling + concurrent handler dispatch

pub mod payment_watcher;

pub use payment_watcher::{
    PaymentWatcher, WatcherConfig, WatcherEvent, WatcherHandle, WatcherSummary,
};
