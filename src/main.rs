//! LZT Payments — Entry Point
//!
//! Watches the authenticated account for incoming payments and logs
//! each one. Runs until SIGINT.
//!
//! Wiring sequence:
//! 1. Load config.toml (path from the first argument) + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Load the API token from LZT_TOKEN
//! 4. Create LztClient (HTTP + auth + retry + rate limit)
//! 5. Connect the account (resolves user id and username)
//! 6. Spawn metrics and health servers fed by watcher events
//! 7. Start the payment watcher
//! 8. Wait for SIGINT → graceful shutdown (stop polling → drain handlers → exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use lzt_payments::adapters::api::{Account, BearerAuth, LztClient};
use lzt_payments::adapters::metrics::{HealthServer, HealthState, WatcherMetrics};
use lzt_payments::config;
use lzt_payments::domain::Payment;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration ───────────────────────────────
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    let config = config::loader::load_config(&config_path)
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.app.log_level)),
        )
        .json()
        .init();

    info!(
        name = %config.app.name,
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.api.base_url,
        "Starting LZT payment watcher"
    );

    // ── 3. Load API token from env ──────────────────────────
    let auth = Arc::new(BearerAuth::from_env().context("Failed to load API token from env")?);

    // ── 4. Create HTTP client with auth + retry ─────────────
    let client = Arc::new(
        LztClient::new(auth, config.api.client_config())
            .context("Failed to create LZT client")?,
    );

    // ── 5. Resolve the account behind the token ─────────────
    let account = Account::connect(client).await?;

    // ── 6. Metrics + health, driven by watcher events ───────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
    let watcher = account.watcher(config.watcher.watcher_config());

    let health = Arc::new(HealthState::new());
    tokio::spawn(Arc::clone(&health).track(watcher.subscribe()));
    let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
    let health_handle = {
        let shutdown_rx = shutdown_tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = health_server.run(shutdown_rx).await {
                error!(error = %e, "Health server failed");
            }
        })
    };

    let metrics_handle = if config.metrics.enabled {
        let metrics = Arc::new(WatcherMetrics::new().context("Failed to register metrics")?);
        tokio::spawn(Arc::clone(&metrics).track(watcher.subscribe()));
        let bind_address = config.metrics.bind_address.clone();
        let shutdown_rx = shutdown_tx.subscribe();
        Some(tokio::spawn(async move {
            if let Err(e) = metrics.serve(bind_address, shutdown_rx).await {
                error!(error = %e, "Metrics server failed");
            }
        }))
    } else {
        None
    };

    // ── 7. Start the payment watcher ────────────────────────
    let handle = watcher.start(log_payment);
    info!(user_id = account.user_id(), "Payment watcher running");

    // ── 8. Wait for SIGINT ──────────────────────────────────
    signal::ctrl_c().await.context("Failed to listen for SIGINT")?;
    info!("SIGINT received, initiating graceful shutdown");
    health.mark_stopping();

    let summary = handle.shutdown().await?;
    info!(
        cycles = summary.cycles,
        dispatched = summary.dispatched,
        fetch_failures = summary.fetch_failures,
        handler_failures = summary.handler_failures,
        abandoned = summary.abandoned_handlers,
        watermark = summary.watermark,
        "Watcher drained"
    );

    let _ = shutdown_tx.send(());
    let _ = tokio::time::timeout(Duration::from_secs(5), health_handle).await;
    if let Some(handle) = metrics_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Default handler: record the payment in the structured log.
async fn log_payment(payment: Payment) -> Result<()> {
    info!(
        operation_id = payment.operation_id,
        operation_date = payment.operation_date,
        incoming_sum = payment.incoming_sum,
        sender = payment.counterparty().unwrap_or("unknown"),
        comment = payment.data.as_ref().map_or("", |d| d.comment.as_str()),
        held = payment.held(),
        "Payment received"
    );
    Ok(())
}
