//! Health Check Server - Liveness and Readiness Probes
//!
//! Exposes /live and /ready endpoints via axum 0.7. Readiness follows
//! the watcher: not ready while the latest fetch failed, or once the
//! watcher has stopped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, instrument};

use crate::usecases::payment_watcher::WatcherEvent;

/// Shared health state polled by readiness probes.
#[derive(Debug)]
pub struct HealthState {
    /// Whether the latest fetch succeeded.
    pub fetch_healthy: AtomicBool,
    /// Whether the watcher loop is running.
    pub watcher_running: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (healthy until told otherwise).
    pub fn new() -> Self {
        Self {
            fetch_healthy: AtomicBool::new(true),
            watcher_running: AtomicBool::new(true),
        }
    }

    /// Check if the watcher is polling successfully.
    pub fn is_ready(&self) -> bool {
        self.fetch_healthy.load(Ordering::Relaxed) && self.watcher_running.load(Ordering::Relaxed)
    }

    /// Flag the watcher as going down before its drain completes.
    pub fn mark_stopping(&self) {
        self.watcher_running.store(false, Ordering::Relaxed);
    }

    /// Fold one watcher event into the health flags.
    pub fn record(&self, event: &WatcherEvent) {
        match event {
            WatcherEvent::CycleCompleted { .. } => self.fetch_healthy.store(true, Ordering::Relaxed),
            WatcherEvent::FetchFailed { .. } => self.fetch_healthy.store(false, Ordering::Relaxed),
            WatcherEvent::HandlerFailed { .. } => {}
            WatcherEvent::Stopped(_) => self.watcher_running.store(false, Ordering::Relaxed),
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
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => {
                    self.watcher_running.store(false, Ordering::Relaxed);
                    return;
                }
            }
        }
    }
}

/// Axum-based health check HTTP server.
pub struct HealthServer {
    /// Health state shared with the event tracker.
    state: Arc<HealthState>,
    /// Bind port.
    port: u16,
}

impl HealthServer {
    /// Create a new health server.
    pub fn new(state: Arc<HealthState>, port: u16) -> Self {
        Self { state, port }
    }

    /// Serve until the shutdown signal fires.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = Self::router(Arc::clone(&self.state));

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;

        info!(address = %addr, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }

    fn router(state: Arc<HealthState>) -> Router {
        Router::new()
            .route("/live", get(Self::liveness))
            .route("/ready", get(Self::readiness))
            .with_state(state)
    }

    /// Liveness probe: always returns 200 if the process is running.
    async fn liveness() -> impl IntoResponse {
        (StatusCode::OK, "OK")
    }

    /// Readiness probe: returns 200 only while fetches succeed.
    async fn readiness(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
        if state.is_ready() {
            (StatusCode::OK, "READY")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::usecases::payment_watcher::WatcherSummary;

    #[test]
    fn test_fetch_failure_flips_readiness() {
        let state = HealthState::new();
        assert!(state.is_ready());

        state.record(&WatcherEvent::FetchFailed {
            error: "timeout".to_string(),
            transient: true,
            consecutive_failures: 1,
            retry_in: Duration::from_secs(2),
        });
        assert!(!state.is_ready());

        state.record(&WatcherEvent::CycleCompleted {
            fetched: 0,
            dispatched: 0,
            duplicates: 0,
            watermark: 1000,
        });
        assert!(state.is_ready());
    }

    #[test]
    fn test_stopped_watcher_is_not_ready() {
        let state = HealthState::new();
        state.record(&WatcherEvent::Stopped(WatcherSummary::default()));
        assert!(!state.is_ready());

        let draining = HealthState::new();
        draining.mark_stopping();
        assert!(!draining.is_ready());
    }

    #[tokio::test]
    async fn test_readiness_endpoint_status() {
        let state = Arc::new(HealthState::new());
        state.fetch_healthy.store(false, Ordering::Relaxed);
        let response = HealthServer::readiness(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
