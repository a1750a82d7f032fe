//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;
use crate::usecases::payment_watcher::MAX_LOOKAHEAD;

/// Load and validate configuration from a TOML file.
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config = parse_config(&content)
    .with_context(|| format!("Invalid config file: {}", path.display()))?;

  info!(
    base_url = %config.api.base_url,
    operation_type = %config.watcher.operation_type,
    period_ms = config.watcher.period_ms,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  let config: AppConfig = toml::from_str(content).context("Failed to parse config.toml")?;
  validate_config(&config)?;
  Ok(config)
}

/// Validate all configuration parameters.
fn validate_config(config: &AppConfig) -> Result<()> {
  // API validation
  anyhow::ensure!(
    !config.api.base_url.trim().is_empty(),
    "API base_url must not be empty"
  );
  anyhow::ensure!(
    config.api.timeout_seconds > 0,
    "API timeout_seconds must be positive"
  );
  anyhow::ensure!(
    config.api.requests_per_minute > 0,
    "API requests_per_minute must be positive"
  );
  anyhow::ensure!(
    config.api.max_concurrent > 0,
    "API max_concurrent must be positive"
  );

  // Watcher validation
  let watcher = &config.watcher;
  anyhow::ensure!(
    watcher.period_ms > 0,
    "Watcher period_ms must be positive"
  );
  anyhow::ensure!(
    watcher.max_in_flight > 0,
    "Watcher max_in_flight must be positive"
  );
  anyhow::ensure!(
    watcher.lookahead_seconds <= MAX_LOOKAHEAD.as_secs(),
    "Watcher lookahead_seconds ({}) must not exceed {}",
    watcher.lookahead_seconds,
    MAX_LOOKAHEAD.as_secs()
  );
  if let (Some(min), Some(max)) = (watcher.price_min, watcher.price_max) {
    anyhow::ensure!(
      min <= max,
      "Watcher price_min ({min}) must not exceed price_max ({max})"
    );
  }

  // Metrics validation
  if config.metrics.enabled {
    anyhow::ensure!(
      !config.metrics.bind_address.is_empty(),
      "Metrics bind_address must not be empty"
    );
  }

  Ok(())
}
