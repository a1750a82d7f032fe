//! Configuration Module - TOML-based Watcher Configuration
//!
//! Loads and validates configuration from `config.toml`. The API token
//! is never part of the file; it comes from the `LZT_TOKEN` env var.

pub mod loader;

use std::time::Duration;

use serde::Deserialize;

use crate::adapters::api::client::{ClientConfig, DEFAULT_BASE_URL};
use crate::ports::history::{DEFAULT_OPERATION_TYPE, PaymentFilters};
use crate::usecases::payment_watcher::WatcherConfig;

/// Top-level application configuration.
///
/// Loaded from `config.toml` at startup. Every section is optional and
/// falls back to its defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
  /// Process identity and logging.
  pub app: AppSection,
  /// LZT API client settings.
  pub api: ApiConfig,
  /// Payment watcher settings.
  pub watcher: WatcherSection,
  /// Metrics and health endpoints.
  pub metrics: MetricsConfig,
}

/// Process identity configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
  /// Human-readable instance name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  pub log_level: String,
}

/// API client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
  /// REST API base URL.
  pub base_url: String,
  /// Request timeout in seconds.
  pub timeout_seconds: u64,
  /// Optional HTTP or SOCKS5 proxy URL.
  pub proxy_url: Option<String>,
  /// Maximum concurrent requests.
  pub max_concurrent: usize,
  /// Retries on transient errors.
  pub max_retries: u32,
  /// First retry delay in milliseconds (doubles per attempt).
  pub retry_base_delay_ms: u64,
  /// Outgoing request budget per minute.
  pub requests_per_minute: u32,
}

/// Payment watcher configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatcherSection {
  /// Operation type to watch.
  pub operation_type: String,
  /// Minimal amount (inclusive).
  pub price_min: Option<i64>,
  /// Maximal amount (inclusive).
  pub price_max: Option<i64>,
  /// Only payments from this username.
  pub sender: Option<String>,
  /// Only payments with this comment.
  pub comment: Option<String>,
  /// Only held (`true`) or only settled (`false`) payments.
  pub is_hold: Option<bool>,
  /// Poll period in milliseconds.
  pub period_ms: u64,
  /// Window end margin past "now", in seconds.
  pub lookahead_seconds: u64,
  /// Maximum concurrently running handlers.
  pub max_in_flight: usize,
  /// Seen-set retention in seconds; 0 disables duplicate suppression.
  pub seen_retention_seconds: u64,
  /// Backoff ceiling after repeated fetch failures, in milliseconds.
  pub max_backoff_ms: u64,
  /// Time allowed for in-flight handlers at shutdown, in seconds.
  pub shutdown_grace_seconds: u64,
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  pub enabled: bool,
  /// Metrics server bind address.
  pub bind_address: String,
  /// Health check endpoint port.
  pub health_port: u16,
}

impl Default for AppSection {
  fn default() -> Self {
    Self {
      name: "lzt-payments".to_string(),
      log_level: "info".to_string(),
    }
  }
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: DEFAULT_BASE_URL.to_string(),
      timeout_seconds: 30,
      proxy_url: None,
      max_concurrent: 10,
      max_retries: 3,
      retry_base_delay_ms: 200,
      requests_per_minute: 120,
    }
  }
}

impl Default for WatcherSection {
  fn default() -> Self {
    Self {
      operation_type: DEFAULT_OPERATION_TYPE.to_string(),
      price_min: None,
      price_max: None,
      sender: None,
      comment: None,
      is_hold: None,
      period_ms: 1_000,
      lookahead_seconds: 86_400,
      max_in_flight: 32,
      seen_retention_seconds: 300,
      max_backoff_ms: 30_000,
      shutdown_grace_seconds: 10,
    }
  }
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: "0.0.0.0:9090".to_string(),
      health_port: 8080,
    }
  }
}

impl ApiConfig {
  /// HTTP client settings.
  pub fn client_config(&self) -> ClientConfig {
    ClientConfig {
      base_url: self.base_url.clone(),
      timeout: Duration::from_secs(self.timeout_seconds),
      proxy_url: self.proxy_url.clone().filter(|p| !p.is_empty()),
      max_concurrent: self.max_concurrent,
      max_retries: self.max_retries,
      retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
      requests_per_minute: self.requests_per_minute,
    }
  }
}

impl WatcherSection {
  /// Immutable watcher snapshot.
  pub fn watcher_config(&self) -> WatcherConfig {
    WatcherConfig {
      filters: PaymentFilters {
        operation_type: self.operation_type.clone(),
        price_min: self.price_min,
        price_max: self.price_max,
        sender: self.sender.clone(),
        comment: self.comment.clone(),
        is_hold: self.is_hold,
      },
      period: Duration::from_millis(self.period_ms),
      lookahead: Duration::from_secs(self.lookahead_seconds),
      max_in_flight: self.max_in_flight,
      seen_retention: (self.seen_retention_seconds > 0)
        .then(|| Duration::from_secs(self.seen_retention_seconds)),
      max_backoff: Duration::from_millis(self.max_backoff_ms),
      shutdown_grace: Duration::from_secs(self.shutdown_grace_seconds),
    }
    .normalized()
  }
}
