//! Prometheus Metrics Registry - Watcher Observability
//!
//! Counts fetch cycles, fetch failures, dispatches and handler failures,
//! and exposes them on `/metrics`. Fed entirely from `WatcherEvent`s, so
//! a fetch outage is distinguishable from a quiet ledger.

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, instrument, warn};

use crate::usecases::payment_watcher::WatcherEvent;

/// Centralized Prometheus metrics for the payment watcher.
///
/// All metrics follow the naming convention `lzt_watcher_*`.
pub struct WatcherMetrics {
    /// Prometheus registry.
    registry: Registry,
    /// Completed fetch cycles.
    pub cycles: IntCounter,
    /// Failed fetches, labelled `transient` or `fatal`.
    pub fetch_failures: IntCounterVec,
    /// Payments handed to the handler.
    pub dispatched: IntCounter,
    /// Payments skipped because their id was already dispatched.
    pub duplicates_skipped: IntCounter,
    /// Handler errors and panics.
    pub handler_failures: IntCounter,
    /// Current watermark (Unix seconds).
    pub watermark_seconds: IntGauge,
    /// Consecutive fetch failures at the latest cycle.
    pub consecutive_fetch_failures: IntGauge,
}

impl WatcherMetrics {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let cycles = IntCounter::new("lzt_watcher_cycles_total", "Completed fetch cycles")?;

        let fetch_failures = IntCounterVec::new(
            Opts::new(
                "lzt_watcher_fetch_failures_total",
                "Payment history fetches that failed",
            ),
            &["kind"],
        )?;

        let dispatched = IntCounter::new(
            "lzt_watcher_payments_dispatched_total",
            "Payments dispatched to the handler",
        )?;

        let duplicates_skipped = IntCounter::new(
            "lzt_watcher_duplicates_skipped_total",
            "Payments skipped as already dispatched",
        )?;

        let handler_failures = IntCounter::new(
            "lzt_watcher_handler_failures_total",
            "Handler invocations that returned an error or panicked",
        )?;

        let watermark_seconds = IntGauge::new(
            "lzt_watcher_watermark_seconds",
            "Operation date of the newest dispatched payment",
        )?;

        let consecutive_fetch_failures = IntGauge::new(
            "lzt_watcher_consecutive_fetch_failures",
            "Fetch failures since the last successful cycle",
        )?;

        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(fetch_failures.clone()))?;
        registry.register(Box::new(dispatched.clone()))?;
        registry.register(Box::new(duplicates_skipped.clone()))?;
        registry.register(Box::new(handler_failures.clone()))?;
        registry.register(Box::new(watermark_seconds.clone()))?;
        registry.register(Box::new(consecutive_fetch_failures.clone()))?;

        Ok(Self {
            registry,
            cycles,
            fetch_failures,
            dispatched,
            duplicates_skipped,
            handler_failures,
            watermark_seconds,
            consecutive_fetch_failures,
        })
    }

    /// Fold one watcher event into the metrics.
    pub fn record(&self, event: &WatcherEvent) {
        match event {
            WatcherEvent::CycleCompleted {
                dispatched,
                duplicates,
                watermark,
                ..
            } => {
                self.cycles.inc();
                self.dispatched.inc_by(*dispatched as u64);
                self.duplicates_skipped.inc_by(*duplicates as u64);
                self.watermark_seconds.set(*watermark);
                self.consecutive_fetch_failures.set(0);
            }
            WatcherEvent::FetchFailed {
                transient,
                consecutive_failures,
                ..
            } => {
                self.cycles.inc();
                let kind = if *transient { "transient" } else { "fatal" };
                self.fetch_failures.with_label_values(&[kind]).inc();
                self.consecutive_fetch_failures
                    .set(i64::from(*consecutive_failures));
            }
            WatcherEvent::HandlerFailed { .. } => self.handler_failures.inc(),
            WatcherEvent::Stopped(summary) => self.watermark_seconds.set(summary.watermark),
        }
    }

    /// Consume watcher events until the watcher stops.
    pub async fn track(self: Arc<Self>, mut events: broadcast::Receiver<WatcherEvent>) {
        loop {
            match events.recv().await {
                Ok(event) => {
                    self.record(&event);
                    if matches!(event, WatcherEvent::Stopped(_)) {
                        return;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Metrics recorder lagged behind watcher events");
                }
                Err(RecvError::Closed) => return,
            }
        }
    }

    /// Render all metrics in the Prometheus text format.
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    metrics.render().map_err(|e| {
                        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
                    })
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}
