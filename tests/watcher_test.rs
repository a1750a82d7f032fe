//! Integration Tests - Payment Watcher Against a Mocked Ledger
//!
//! Drives the real poll loop with a mockall ledger standing in for the
//! LZT API. Uses short poll periods and bounded waits.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use mockall::mock;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::time::timeout;

use lzt_payments::adapters::api::Account;
use lzt_payments::domain::{OperationId, Payment, Payments};
use lzt_payments::ports::{HistoryFetcher, HistoryQuery, Profile, ProfileFetcher};
use lzt_payments::usecases::{PaymentWatcher, WatcherConfig, WatcherEvent};

// ---- Mock Definitions ----

mock! {
    pub Ledger {}

    #[async_trait::async_trait]
    impl HistoryFetcher for Ledger {
        async fn fetch_history(&self, user_id: u64, query: &HistoryQuery) -> anyhow::Result<Payments>;
    }

    #[async_trait::async_trait]
    impl ProfileFetcher for Ledger {
        async fn fetch_profile(&self) -> anyhow::Result<Profile>;
    }
}

// ---- Helpers ----

const WAIT: Duration = Duration::from_secs(2);

fn payment(id: OperationId, date: i64) -> Payment {
    Payment {
        operation_id: id,
        operation_date: date,
        operation_type: "receiving_money".to_string(),
        incoming_sum: 100,
        ..Payment::default()
    }
}

fn batch(payments: &[Payment]) -> Payments {
    payments
        .iter()
        .map(|p| (p.operation_id.to_string(), p.clone()))
        .collect()
}

fn fast_config() -> WatcherConfig {
    WatcherConfig {
        period: Duration::from_millis(10),
        max_backoff: Duration::from_millis(40),
        shutdown_grace: Duration::from_millis(200),
        ..WatcherConfig::default()
    }
}

/// Ledger that serves `responses` in order, then empty batches forever.
/// Every query's window start is forwarded on the returned channel.
fn scripted_ledger(
    responses: Vec<anyhow::Result<Payments>>,
) -> (MockLedger, mpsc::UnboundedReceiver<i64>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let calls = AtomicUsize::new(0);
    let mut responses: Vec<Option<anyhow::Result<Payments>>> =
        responses.into_iter().map(Some).collect();

    let mut ledger = MockLedger::new();
    ledger
        .expect_fetch_history()
        .returning(move |_user_id, query: &HistoryQuery| {
            let start = query.start_date.map_or(0, |d| d.timestamp());
            let _ = tx.send(start);
            let call = calls.fetch_add(1, Ordering::SeqCst);
            responses
                .get_mut(call)
                .and_then(Option::take)
                .unwrap_or_else(|| Ok(Payments::new()))
        });
    (ledger, rx)
}

fn recording_handler() -> (
    impl Fn(Payment) -> std::future::Ready<anyhow::Result<()>> + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Payment>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |p: Payment| {
        let _ = tx.send(p);
        std::future::ready(Ok(()))
    };
    (handler, rx)
}

async fn next_event<F>(events: &mut broadcast::Receiver<WatcherEvent>, matches: F) -> WatcherEvent
where
    F: Fn(&WatcherEvent) -> bool,
{
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(event) if matches(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("watcher events closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for watcher event")
}

// ---- Watcher Loop ----

#[tokio::test]
async fn test_new_payment_is_delivered_and_window_advances() {
    let (ledger, mut starts) = scripted_ledger(vec![Ok(batch(&[payment(5001, 1005)]))]);
    let watcher = PaymentWatcher::new(Arc::new(ledger), 7, fast_config()).starting_at(1000);
    let (handler, mut delivered) = recording_handler();

    let handle = watcher.start(handler);

    let received = timeout(WAIT, delivered.recv()).await.unwrap().unwrap();
    assert_eq!(received.operation_id, 5001);
    assert_eq!(received.incoming_sum, 100);

    assert_eq!(timeout(WAIT, starts.recv()).await.unwrap(), Some(1001));
    assert_eq!(timeout(WAIT, starts.recv()).await.unwrap(), Some(1006));

    let summary = handle.shutdown().await.unwrap();
    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.watermark, 1005);
    assert_eq!(summary.handler_failures, 0);
}

#[tokio::test]
async fn test_quiet_ledger_keeps_the_window() {
    let (ledger, mut starts) = scripted_ledger(Vec::new());
    let watcher = PaymentWatcher::new(Arc::new(ledger), 7, fast_config()).starting_at(2000);
    let (handler, mut delivered) = recording_handler();

    let handle = watcher.start(handler);

    for _ in 0..3 {
        assert_eq!(timeout(WAIT, starts.recv()).await.unwrap(), Some(2001));
    }

    let summary = handle.shutdown().await.unwrap();
    assert!(summary.cycles >= 3);
    assert_eq!(summary.dispatched, 0);
    assert_eq!(summary.watermark, 2000);
    assert!(delivered.try_recv().is_err());
}

#[tokio::test]
async fn test_fetch_failure_keeps_watermark_then_recovers() {
    let (ledger, mut starts) = scripted_ledger(vec![
        Err(anyhow::anyhow!("connection reset by peer")),
        Ok(batch(&[payment(7, 1010)])),
    ]);
    let watcher = PaymentWatcher::new(Arc::new(ledger), 7, fast_config()).starting_at(1000);
    let mut events = watcher.subscribe();
    let (handler, mut delivered) = recording_handler();

    let handle = watcher.start(handler);

    match next_event(&mut events, |e| matches!(e, WatcherEvent::FetchFailed { .. })).await {
        WatcherEvent::FetchFailed {
            transient,
            consecutive_failures,
            retry_in,
            ..
        } => {
            assert!(transient);
            assert_eq!(consecutive_failures, 1);
            assert_eq!(retry_in, Duration::from_millis(20));
        }
        other => panic!("unexpected event {other:?}"),
    }

    let received = timeout(WAIT, delivered.recv()).await.unwrap().unwrap();
    assert_eq!(received.operation_id, 7);

    // The failed cycle and its retry query the same window.
    assert_eq!(timeout(WAIT, starts.recv()).await.unwrap(), Some(1001));
    assert_eq!(timeout(WAIT, starts.recv()).await.unwrap(), Some(1001));
    assert_eq!(timeout(WAIT, starts.recv()).await.unwrap(), Some(1011));

    let summary = handle.shutdown().await.unwrap();
    assert_eq!(summary.fetch_failures, 1);
    assert_eq!(summary.dispatched, 1);
}

#[tokio::test]
async fn test_batch_is_dispatched_in_date_order() {
    let (ledger, _starts) = scripted_ledger(vec![Ok(batch(&[
        payment(30, 1030),
        payment(10, 1010),
        payment(20, 1020),
    ]))]);
    let watcher = PaymentWatcher::new(
        Arc::new(ledger),
        7,
        WatcherConfig {
            max_in_flight: 1,
            ..fast_config()
        },
    )
    .starting_at(1000);
    let (handler, mut delivered) = recording_handler();

    let handle = watcher.start(handler);

    let mut order = Vec::new();
    for _ in 0..3 {
        order.push(timeout(WAIT, delivered.recv()).await.unwrap().unwrap().operation_id);
    }
    assert_eq!(order, vec![10, 20, 30]);

    let summary = handle.shutdown().await.unwrap();
    assert_eq!(summary.watermark, 1030);
}

#[tokio::test]
async fn test_overlapping_windows_deliver_once() {
    let repeated = batch(&[payment(88, 1005)]);
    let (ledger, _starts) = scripted_ledger(vec![Ok(repeated.clone()), Ok(repeated)]);
    let watcher = PaymentWatcher::new(Arc::new(ledger), 7, fast_config()).starting_at(1000);
    let mut events = watcher.subscribe();
    let (handler, mut delivered) = recording_handler();

    let handle = watcher.start(handler);

    next_event(&mut events, |e| {
        matches!(e, WatcherEvent::CycleCompleted { duplicates: 1, .. })
    })
    .await;

    let summary = handle.shutdown().await.unwrap();
    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.duplicates_skipped, 1);
    assert_eq!(delivered.recv().await.map(|p| p.operation_id), Some(88));
    assert!(delivered.try_recv().is_err());
}

#[tokio::test]
async fn test_failing_handler_does_not_stop_watcher() {
    let (ledger, _starts) = scripted_ledger(vec![
        Ok(batch(&[payment(1, 1001)])),
        Ok(batch(&[payment(2, 1002)])),
    ]);
    let watcher = PaymentWatcher::new(Arc::new(ledger), 7, fast_config()).starting_at(1000);
    let mut events = watcher.subscribe();
    let (tx, mut delivered) = mpsc::unbounded_channel();

    let handle = watcher.start(move |p: Payment| {
        let tx = tx.clone();
        async move {
            if p.operation_id == 1 {
                anyhow::bail!("order not found");
            }
            let _ = tx.send(p.operation_id);
            Ok(())
        }
    });

    match next_event(&mut events, |e| matches!(e, WatcherEvent::HandlerFailed { .. })).await {
        WatcherEvent::HandlerFailed {
            operation_id,
            error,
        } => {
            assert_eq!(operation_id, 1);
            assert!(error.contains("order not found"));
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(timeout(WAIT, delivered.recv()).await.unwrap(), Some(2));

    let summary = handle.shutdown().await.unwrap();
    assert_eq!(summary.handler_failures, 1);
    assert_eq!(summary.watermark, 1002);
}

#[tokio::test]
async fn test_shutdown_emits_stopped_event() {
    let (ledger, _starts) = scripted_ledger(Vec::new());
    let watcher = PaymentWatcher::new(Arc::new(ledger), 7, fast_config()).starting_at(1000);
    let (handler, _delivered) = recording_handler();

    let handle = watcher.start(handler);
    let mut events = handle.subscribe();
    let summary = handle.shutdown().await.unwrap();

    match next_event(&mut events, |e| matches!(e, WatcherEvent::Stopped(_))).await {
        WatcherEvent::Stopped(stopped) => assert_eq!(stopped, summary),
        other => panic!("unexpected event {other:?}"),
    }
}

/// Handler that reports each payment as it starts, then blocks until
/// `gate` hands out a permit.
fn gated_handler(
    gate: Arc<Semaphore>,
) -> (
    impl Fn(Payment) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync + 'static,
    mpsc::UnboundedReceiver<OperationId>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |p: Payment| {
        let tx = tx.clone();
        let gate = Arc::clone(&gate);
        async move {
            let _ = tx.send(p.operation_id);
            let _permit = gate.acquire().await?;
            Ok(())
        }
        .boxed()
    };
    (handler, rx)
}

#[tokio::test]
async fn test_full_handler_pool_holds_back_the_batch() {
    let (ledger, _starts) = scripted_ledger(vec![Ok(batch(&[
        payment(1, 1001),
        payment(2, 1002),
        payment(3, 1003),
        payment(4, 1004),
    ]))]);
    let watcher = PaymentWatcher::new(
        Arc::new(ledger),
        7,
        WatcherConfig {
            max_in_flight: 2,
            ..fast_config()
        },
    )
    .starting_at(1000);
    let gate = Arc::new(Semaphore::new(0));
    let (handler, mut started) = gated_handler(Arc::clone(&gate));

    let handle = watcher.start(handler);

    let mut first = vec![
        timeout(WAIT, started.recv()).await.unwrap().unwrap(),
        timeout(WAIT, started.recv()).await.unwrap().unwrap(),
    ];
    first.sort_unstable();
    assert_eq!(first, vec![1, 2]);
    assert!(
        timeout(Duration::from_millis(50), started.recv()).await.is_err(),
        "a third handler started while the pool was full"
    );

    gate.add_permits(4);
    let mut rest = vec![
        timeout(WAIT, started.recv()).await.unwrap().unwrap(),
        timeout(WAIT, started.recv()).await.unwrap().unwrap(),
    ];
    rest.sort_unstable();
    assert_eq!(rest, vec![3, 4]);

    let summary = timeout(WAIT, handle.shutdown()).await.unwrap().unwrap();
    assert_eq!(summary.dispatched, 4);
    assert_eq!(summary.watermark, 1004);
    assert_eq!(summary.abandoned_handlers, 0);
}

#[tokio::test]
async fn test_shutdown_is_bounded_while_pool_is_full() {
    let (ledger, _starts) =
        scripted_ledger(vec![Ok(batch(&[payment(1, 1001), payment(2, 1002)]))]);
    let watcher = PaymentWatcher::new(
        Arc::new(ledger),
        7,
        WatcherConfig {
            max_in_flight: 1,
            shutdown_grace: Duration::from_millis(50),
            ..fast_config()
        },
    )
    .starting_at(1000);
    let gate = Arc::new(Semaphore::new(0));
    let (handler, mut started) = gated_handler(gate);

    let handle = watcher.start(handler);
    assert_eq!(timeout(WAIT, started.recv()).await.unwrap(), Some(1));

    let summary = timeout(Duration::from_secs(3), handle.shutdown())
        .await
        .expect("shutdown outlived the grace period")
        .unwrap();
    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.abandoned_handlers, 1);
    assert_eq!(summary.watermark, 1001);
    assert!(started.try_recv().is_err());
}

// ---- Account Facade ----

#[tokio::test]
async fn test_account_watches_its_own_user() {
    let mut ledger = MockLedger::new();
    ledger.expect_fetch_profile().times(1).returning(|| {
        Ok(Profile {
            user_id: 42,
            username: "seller".to_string(),
        })
    });
    let calls = AtomicUsize::new(0);
    let paid_at = chrono::Utc::now().timestamp() + 5;
    ledger
        .expect_fetch_history()
        .withf(|user_id, query| {
            *user_id == 42 && query.operation_type.as_deref() == Some("receiving_money")
        })
        .returning(move |_, _| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(batch(&[payment(900, paid_at)]))
            } else {
                Ok(Payments::new())
            }
        });

    let account = Account::connect(Arc::new(ledger)).await.unwrap();
    assert_eq!(account.user_id(), 42);
    assert_eq!(account.username(), "seller");

    let link = account.payment_link(15.0, "order-9", "").unwrap();
    assert!(link.contains("username=seller"));
    assert!(link.contains("amount=15"));

    let (handler, mut delivered) = recording_handler();
    let handle = account.watch_payments(handler, Some(fast_config()));

    let received = timeout(WAIT, delivered.recv()).await.unwrap().unwrap();
    assert_eq!(received.operation_id, 900);

    let summary = handle.shutdown().await.unwrap();
    assert_eq!(summary.dispatched, 1);
}

#[tokio::test]
async fn test_account_connect_fails_on_rejected_token() {
    let mut ledger = MockLedger::new();
    ledger
        .expect_fetch_profile()
        .returning(|| Err(anyhow::anyhow!("401 invalid_token")));

    let Err(err) = Account::connect(Arc::new(ledger)).await else {
        panic!("connect should fail");
    };
    assert!(format!("{err:#}").contains("invalid_token"));
}
