//! Payment Watcher - Incremental Polling and Concurrent Dispatch
//!
//! Turns the request/response payment history API into a push-like
//! stream of new payments:
//! 1. Query the window `(watermark, now + lookahead]`
//! 2. Dispatch every unseen payment to the handler on its own task
//! 3. Advance the watermark as each dispatch is launched
//! 4. Sleep for the poll period (or a backoff after failures), repeat
//!
//! The loop is the only writer of the watermark and the seen-set.
//! Handler tasks are bounded by a semaphore and never block the next
//! fetch; their failures are logged and reported as events.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeDelta, Utc};
use futures_util::FutureExt;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::payment::{OperationId, Payment, Payments};
use crate::domain::seen::SeenSet;
use crate::domain::watermark::Watermark;
use crate::error::ApiError;
use crate::ports::handler::PaymentHandler;
use crate::ports::history::{HistoryFetcher, PaymentFilters};

/// Buffered watcher events per subscriber before it starts lagging.
const EVENT_CAPACITY: usize = 256;

/// Backoff exponent cap; keeps `period * 2^n` from overflowing.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Upper bound for the window end margin past "now".
pub const MAX_LOOKAHEAD: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// Immutable watcher settings, snapshotted when the watcher is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherConfig {
    /// Filters applied to every poll.
    pub filters: PaymentFilters,
    /// Pause between fetch cycles.
    pub period: Duration,
    /// How far past "now" the window end reaches (remote clock skew margin).
    pub lookahead: Duration,
    /// Maximum concurrently running handler invocations.
    pub max_in_flight: usize,
    /// How long dispatched ids are remembered below the watermark.
    /// `None` disables duplicate suppression.
    pub seen_retention: Option<Duration>,
    /// Upper bound for the sleep after consecutive fetch failures.
    pub max_backoff: Duration,
    /// How long shutdown waits for in-flight handlers before aborting them.
    pub shutdown_grace: Duration,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            filters: PaymentFilters::default(),
            period: Duration::from_secs(1),
            lookahead: Duration::from_secs(24 * 60 * 60),
            max_in_flight: 32,
            seen_retention: Some(Duration::from_secs(300)),
            max_backoff: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl WatcherConfig {
    /// Replace zero and empty values with their defaults.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let defaults = Self::default();
        if self.period.is_zero() {
            self.period = defaults.period;
        }
        if self.filters.operation_type.is_empty() {
            self.filters.operation_type = defaults.filters.operation_type;
        }
        if self.max_in_flight == 0 {
            self.max_in_flight = 1;
        }
        if self.max_backoff < self.period {
            self.max_backoff = self.period;
        }
        self.lookahead = self.lookahead.min(MAX_LOOKAHEAD);
        self
    }

    /// Sleep before the next cycle after `failures` consecutive fetch errors.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.period;
        }
        let factor = 2u32.pow(failures.min(MAX_BACKOFF_EXPONENT));
        self.period.saturating_mul(factor).min(self.max_backoff)
    }
}

/// Observable watcher activity.
#[derive(Debug, Clone)]
pub enum WatcherEvent {
    /// A fetch succeeded and its batch was dispatched.
    CycleCompleted {
        fetched: usize,
        dispatched: usize,
        duplicates: usize,
        watermark: i64,
    },
    /// A fetch failed; the batch was treated as empty.
    FetchFailed {
        error: String,
        transient: bool,
        consecutive_failures: u32,
        retry_in: Duration,
    },
    /// A handler returned an error or panicked.
    HandlerFailed {
        operation_id: OperationId,
        error: String,
    },
    /// The loop exited after a shutdown request.
    Stopped(WatcherSummary),
}

/// Counters reported when the watcher stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatcherSummary {
    pub cycles: u64,
    pub dispatched: u64,
    pub duplicates_skipped: u64,
    pub fetch_failures: u64,
    pub handler_failures: u64,
    /// Handlers still running when the shutdown grace elapsed.
    pub abandoned_handlers: usize,
    pub watermark: i64,
}

/// Polls a `HistoryFetcher` and dispatches new payments.
pub struct PaymentWatcher<F: HistoryFetcher> {
    fetcher: Arc<F>,
    user_id: u64,
    config: WatcherConfig,
    watermark: Watermark,
    seen: SeenSet,
    permits: Arc<Semaphore>,
    events: broadcast::Sender<WatcherEvent>,
    handler_failures: Arc<AtomicU64>,
    consecutive_failures: u32,
    summary: WatcherSummary,
}

impl<F: HistoryFetcher> PaymentWatcher<F> {
    /// Create a watcher for `user_id`. The watermark starts at "now", so
    /// payments made before the watcher starts are never observed.
    pub fn new(fetcher: Arc<F>, user_id: u64, config: WatcherConfig) -> Self {
        let config = config.normalized();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            fetcher,
            user_id,
            permits: Arc::new(Semaphore::new(config.max_in_flight)),
            config,
            watermark: Watermark::now(),
            seen: SeenSet::new(),
            events,
            handler_failures: Arc::new(AtomicU64::new(0)),
            consecutive_failures: 0,
            summary: WatcherSummary::default(),
        }
    }

    /// Start from an explicit watermark (Unix seconds) instead of "now".
    #[must_use]
    pub fn starting_at(mut self, watermark: i64) -> Self {
        self.watermark = Watermark::at(watermark);
        self
    }

    pub fn watermark(&self) -> Watermark {
        self.watermark
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    /// Subscribe to watcher events.
    pub fn subscribe(&self) -> broadcast::Receiver<WatcherEvent> {
        self.events.subscribe()
    }

    /// Launch the poll loop on the runtime and return its control handle.
    pub fn start<H: PaymentHandler>(self, handler: H) -> WatcherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let events = self.events.clone();
        let task = tokio::spawn(self.run(Arc::new(handler), shutdown_rx));
        WatcherHandle {
            shutdown_tx,
            events,
            task,
        }
    }

    /// Run fetch cycles until `shutdown_rx` turns true.
    ///
    /// If the sender is dropped without requesting shutdown, the loop keeps
    /// running for the lifetime of the runtime.
    #[instrument(skip_all, name = "payment_watcher", fields(user_id = self.user_id))]
    pub async fn run<H: PaymentHandler>(
        mut self,
        handler: Arc<H>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> WatcherSummary {
        let mut shutdown = ShutdownSignal::new(shutdown_rx);
        let mut tasks = JoinSet::new();

        info!(
            watermark = %self.watermark,
            period_ms = self.config.period.as_millis(),
            operation_type = %self.config.filters.operation_type,
            max_in_flight = self.config.max_in_flight,
            "Payment watcher started"
        );

        loop {
            let fetched = tokio::select! {
                biased;
                () = shutdown.requested() => break,
                fetched = self.fetch_window() => fetched,
            };

            let delay = self
                .process(fetched, &handler, &mut tasks, &mut shutdown)
                .await;

            tokio::select! {
                biased;
                () = shutdown.requested() => break,
                () = sleep(delay) => {}
            }
        }

        self.drain(&mut tasks).await;

        let summary = self.snapshot();
        info!(
            cycles = summary.cycles,
            dispatched = summary.dispatched,
            fetch_failures = summary.fetch_failures,
            handler_failures = summary.handler_failures,
            watermark = summary.watermark,
            "Payment watcher stopped"
        );
        let _ = self.events.send(WatcherEvent::Stopped(summary.clone()));
        summary
    }

    /// Fetch the window that starts one second past the watermark.
    async fn fetch_window(&self) -> Result<Payments> {
        let start = self.watermark.next_window_start();
        let lookahead = TimeDelta::from_std(self.config.lookahead)
            .unwrap_or_else(|_| TimeDelta::days(1));
        let end = Utc::now()
            .checked_add_signed(lookahead)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let query = self.config.filters.window(start, end);

        debug!(start = %start, end = %end, "Polling payment history");
        self.fetcher
            .fetch_history(self.user_id, &query)
            .await
            .context("Failed to fetch payments history")
    }

    /// Apply one fetch result. Returns how long to sleep before the next cycle.
    async fn process<H: PaymentHandler>(
        &mut self,
        fetched: Result<Payments>,
        handler: &Arc<H>,
        tasks: &mut JoinSet<()>,
        shutdown: &mut ShutdownSignal,
    ) -> Duration {
        self.summary.cycles += 1;
        reap(tasks);

        match fetched {
            Ok(payments) => {
                self.consecutive_failures = 0;
                self.dispatch_batch(payments, handler, tasks, shutdown).await;
                self.config.period
            }
            Err(e) => self.record_fetch_failure(&e),
        }
    }

    /// Dispatch unseen payments in date order. Stops early if shutdown is
    /// requested while waiting for a free handler slot.
    async fn dispatch_batch<H: PaymentHandler>(
        &mut self,
        payments: Payments,
        handler: &Arc<H>,
        tasks: &mut JoinSet<()>,
        shutdown: &mut ShutdownSignal,
    ) {
        let fetched = payments.len();
        let mut batch: Vec<Payment> = payments.into_values().collect();
        batch.sort_unstable_by_key(|p| (p.operation_date, p.operation_id));

        let mut dispatched = 0;
        let mut duplicates = 0;

        for payment in batch {
            if payment.operation_time().is_none() {
                warn!(
                    operation_id = payment.operation_id,
                    operation_date = payment.operation_date,
                    "Skipping payment with an unrepresentable operation date"
                );
                continue;
            }

            let track_seen = self.config.seen_retention.is_some();
            if track_seen && self.seen.contains(payment.operation_id) {
                debug!(
                    operation_id = payment.operation_id,
                    "Skipping already dispatched payment"
                );
                duplicates += 1;
                continue;
            }

            let permit = tokio::select! {
                biased;
                () = shutdown.requested() => {
                    info!(
                        operation_id = payment.operation_id,
                        "Shutdown requested, leaving the rest of the batch undispatched"
                    );
                    break;
                }
                permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    // The semaphore is never closed.
                    Err(_) => break,
                },
            };

            let operation_date = payment.operation_date;
            if track_seen {
                self.seen.insert(payment.operation_id, operation_date);
            }
            debug!(
                operation_id = payment.operation_id,
                operation_date, "Dispatching payment"
            );
            tasks.spawn(dispatch(
                Arc::clone(handler),
                payment,
                permit,
                self.events.clone(),
                Arc::clone(&self.handler_failures),
            ));
            self.watermark.advance(operation_date);
            dispatched += 1;
        }

        if let Some(retention) = self.config.seen_retention {
            let retention = i64::try_from(retention.as_secs()).unwrap_or(i64::MAX);
            self.seen.prune(self.watermark.get().saturating_sub(retention));
        }

        self.summary.dispatched += dispatched as u64;
        self.summary.duplicates_skipped += duplicates as u64;

        if fetched > 0 {
            info!(
                fetched,
                dispatched,
                duplicates,
                watermark = %self.watermark,
                "Payment batch dispatched"
            );
        }

        let _ = self.events.send(WatcherEvent::CycleCompleted {
            fetched,
            dispatched,
            duplicates,
            watermark: self.watermark.get(),
        });
    }

    /// The batch counts as empty: watermark untouched, next sleep backs off.
    fn record_fetch_failure(&mut self, err: &anyhow::Error) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.summary.fetch_failures += 1;

        let transient = ApiError::is_transient_chain(err);
        let retry_in = self.config.backoff(self.consecutive_failures);
        let message = format!("{err:#}");

        if transient {
            warn!(
                error = %message,
                consecutive_failures = self.consecutive_failures,
                retry_in_ms = retry_in.as_millis(),
                "Payment history fetch failed, treating batch as empty"
            );
        } else {
            error!(
                error = %message,
                consecutive_failures = self.consecutive_failures,
                retry_in_ms = retry_in.as_millis(),
                "Payment history fetch rejected, check credentials and filters"
            );
        }

        let _ = self.events.send(WatcherEvent::FetchFailed {
            error: message,
            transient,
            consecutive_failures: self.consecutive_failures,
            retry_in,
        });

        retry_in
    }

    /// Wait for in-flight handlers, aborting whatever outlives the grace period.
    async fn drain(&mut self, tasks: &mut JoinSet<()>) {
        if tasks.is_empty() {
            return;
        }

        info!(
            pending = tasks.len(),
            grace_ms = self.config.shutdown_grace.as_millis(),
            "Waiting for in-flight payment handlers"
        );

        let finished = tokio::time::timeout(self.config.shutdown_grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if finished.is_err() {
            self.summary.abandoned_handlers = tasks.len();
            warn!(
                abandoned = tasks.len(),
                "Shutdown grace elapsed, aborting payment handlers"
            );
            tasks.abort_all();
            while tasks.join_next().await.is_some() {}
        }
    }

    fn snapshot(&self) -> WatcherSummary {
        WatcherSummary {
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            watermark: self.watermark.get(),
            ..self.summary.clone()
        }
    }
}

/// Control handle for a running watcher.
///
/// Dropping the handle (or calling [`WatcherHandle::detach`]) leaves the
/// watcher running until the runtime shuts down.
pub struct WatcherHandle {
    shutdown_tx: watch::Sender<bool>,
    events: broadcast::Sender<WatcherEvent>,
    task: JoinHandle<WatcherSummary>,
}

impl WatcherHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<WatcherEvent> {
        self.events.subscribe()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop issuing fetch cycles, wait for in-flight handlers (bounded by
    /// the shutdown grace) and return the final counters.
    pub async fn shutdown(self) -> Result<WatcherSummary> {
        let _ = self.shutdown_tx.send(true);
        self.task.await.context("Payment watcher task failed")
    }

    /// Let the watcher run for the rest of the process lifetime.
    pub fn detach(self) {}
}

/// Resolves once shutdown is requested; pends forever if the sender is gone.
struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

impl ShutdownSignal {
    fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx }
    }

    async fn requested(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Invoke the handler for one payment, isolating errors and panics.
async fn dispatch<H: PaymentHandler>(
    handler: Arc<H>,
    payment: Payment,
    _permit: OwnedSemaphorePermit,
    events: broadcast::Sender<WatcherEvent>,
    failures: Arc<AtomicU64>,
) {
    let operation_id = payment.operation_id;
    let outcome = AssertUnwindSafe(handler.handle(payment)).catch_unwind().await;

    let error = match outcome {
        Ok(Ok(())) => return,
        Ok(Err(e)) => format!("{e:#}"),
        Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
    };

    failures.fetch_add(1, Ordering::Relaxed);
    error!(operation_id, error = %error, "Got error while handling payment");
    let _ = events.send(WatcherEvent::HandlerFailed {
        operation_id,
        error,
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Collect handler tasks that already finished.
fn reap(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        if let Err(e) = result {
            warn!(error = %e, "Payment handler task ended abnormally");
        }
    }
}
