use super::{
    classify, BroadcastReport, Config, DispatchOutcome, MessagePayload, ProgressSink,
    ProgressSnapshot, RateLimiter, SubscriberCursor, SubscriberStore, Transport,
};
use crate::observability::metrics::{BROADCAST_DELIVERIES_TOTAL, BROADCAST_RUNS_TOTAL};
use crate::prelude::*;
use crate::Result;
use std::sync::Arc;
use teloxide::types::ChatId;
use tokio_util::sync::CancellationToken;

/// Final state of a single recipient within a broadcast run
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum Delivery {
    Sent,
    Removed,
    Failed,
}

/// Per-recipient state machine. The only transition into [`DeliveryState::NeedsRetry`]
/// is from [`DeliveryState::Initial`], so there are at most two attempts.
#[derive(Debug)]
enum DeliveryState {
    Initial,
    NeedsRetry { retry_after: std::time::Duration },
    Settled(Delivery),
}

pub(crate) struct BroadcastEngine<T, S> {
    transport: T,
    store: S,
    limiter: Arc<RateLimiter>,
    cfg: Config,
}

impl<T: Transport, S: SubscriberStore> BroadcastEngine<T, S> {
    pub(crate) fn new(transport: T, store: S, limiter: Arc<RateLimiter>, cfg: Config) -> Self {
        Self {
            transport,
            store,
            limiter,
            cfg,
        }
    }

    /// Delivers the payload to every subscriber, one at a time, in the order
    /// they subscribed.
    ///
    /// Per-recipient failures are only counted in the report. The returned
    /// error means the subscriber store couldn't be reached. If `cancel` is
    /// triggered, the run stops before the next recipient and returns the
    /// counters accumulated so far.
    #[instrument(skip_all, fields(total))]
    pub(crate) async fn run(
        &self,
        payload: &MessagePayload,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<BroadcastReport> {
        let result = self.run_imp(payload, progress, cancel).await;

        let status = match &result {
            Ok(report) if report.cancelled => "cancelled",
            Ok(_) => "finished",
            Err(_) => "aborted",
        };

        metrics::increment_counter!(BROADCAST_RUNS_TOTAL, "status" => status);

        result
    }

    async fn run_imp(
        &self,
        payload: &MessagePayload,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<BroadcastReport> {
        let total = self.store.count().await?;

        tracing::Span::current().record("total", total);

        info!(
            rate_interval = tracing_duration(self.limiter.interval()),
            "Starting broadcast"
        );

        let mut tally = Tally::new(total);
        let mut cursor = SubscriberCursor::new(&self.store, self.cfg.batch_size);

        let cancelled = loop {
            if cancel.is_cancelled() {
                break true;
            }

            let Some(recipient) = cursor.next().await? else {
                break false;
            };

            let delivery = self.deliver(recipient, payload).await?;

            tally.record(delivery);

            let label: &'static str = delivery.into();
            metrics::increment_counter!(BROADCAST_DELIVERIES_TOTAL, "outcome" => label);

            if tally.processed % self.cfg.progress_every.get() == 0 {
                let snapshot = tally.snapshot();
                debug!(?snapshot, "Emitting broadcast progress");

                if let Err(err) = progress.emit(snapshot).await {
                    warn!(
                        err = tracing_err(&err),
                        "Failed to emit broadcast progress, ignoring..."
                    );
                }
            }
        };

        let report = tally.into_report(cancelled);

        info!(
            sent = report.sent,
            removed = report.removed,
            failed = report.failed,
            total = report.total,
            cancelled = report.cancelled,
            pages = cursor.pages_fetched(),
            "Broadcast is over"
        );

        Ok(report)
    }

    #[instrument(skip(self, payload))]
    async fn deliver(&self, recipient: ChatId, payload: &MessagePayload) -> Result<Delivery> {
        let mut state = DeliveryState::Initial;

        loop {
            state = match state {
                DeliveryState::Initial => match self.attempt(recipient, payload).await {
                    DispatchOutcome::RateLimited { retry_after } => {
                        DeliveryState::NeedsRetry { retry_after }
                    }
                    outcome => DeliveryState::Settled(self.settle(recipient, outcome).await?),
                },
                DeliveryState::NeedsRetry { retry_after } => {
                    let backoff = retry_after + self.cfg.retry_margin();

                    warn!(
                        backoff = tracing_duration(backoff),
                        "Hit flood control, retrying once after the back-off"
                    );

                    // This delay is on top of the global pace, the retry
                    // still waits for its turn in the rate limiter.
                    tokio::time::sleep(backoff).await;

                    let outcome = self.attempt(recipient, payload).await;
                    DeliveryState::Settled(self.settle(recipient, outcome).await?)
                }
                DeliveryState::Settled(delivery) => return Ok(delivery),
            };
        }
    }

    async fn attempt(&self, recipient: ChatId, payload: &MessagePayload) -> DispatchOutcome {
        self.limiter.acquire().await;

        match self.transport.dispatch(recipient, payload).await {
            Ok(()) => DispatchOutcome::Delivered,
            Err(err) => {
                let outcome = classify(&err);
                debug!(err = tracing_err(&err), ?outcome, "Dispatch failed");
                outcome
            }
        }
    }

    /// Turns the outcome of the last attempt into the final delivery state.
    /// Flood control on the retry attempt counts as a plain failure.
    async fn settle(&self, recipient: ChatId, outcome: DispatchOutcome) -> Result<Delivery> {
        Ok(match outcome {
            DispatchOutcome::Delivered => Delivery::Sent,
            DispatchOutcome::PermanentlyUnreachable => {
                let existed = self.store.remove(recipient).await?;
                info!(existed, "Removed unreachable subscriber");
                Delivery::Removed
            }
            DispatchOutcome::RateLimited { .. } | DispatchOutcome::TransientFailure => {
                Delivery::Failed
            }
        })
    }
}

/// Mutable counters of a single run. Lives only as long as the run itself.
#[derive(Debug)]
struct Tally {
    processed: u64,
    sent: u64,
    removed: u64,
    failed: u64,
    total: u64,
}

impl Tally {
    fn new(total: u64) -> Self {
        Self {
            processed: 0,
            sent: 0,
            removed: 0,
            failed: 0,
            total,
        }
    }

    fn record(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Sent => self.sent += 1,
            Delivery::Removed => self.removed += 1,
            Delivery::Failed => self.failed += 1,
        }
        self.processed += 1;
    }

    /// Subscribers who joined after the run started are visited too,
    /// so `total` grows with them instead of being exceeded.
    fn total(&self) -> u64 {
        self.total.max(self.processed)
    }

    fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            processed: self.processed,
            sent: self.sent,
            removed: self.removed,
            failed: self.failed,
            total: self.total(),
        }
    }

    fn into_report(self, cancelled: bool) -> BroadcastReport {
        BroadcastReport {
            sent: self.sent,
            removed: self.removed,
            failed: self.failed,
            total: self.total(),
            cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::testing::{FakeStore, FakeTransport, RecordingSink, Reply};
    use std::num::{NonZeroU32, NonZeroU64};
    use std::time::Duration;
    use tokio::time::Instant;

    const RATE_INTERVAL: Duration = Duration::from_millis(40);

    fn config() -> Config {
        Config {
            rate: 25.0,
            batch_size: NonZeroU32::new(1000).unwrap(),
            progress_every: NonZeroU64::new(500).unwrap(),
            retry_margin_ms: 500,
            shutdown_grace_secs: 60,
        }
    }

    fn engine(
        transport: &FakeTransport,
        store: &FakeStore,
        cfg: Config,
    ) -> BroadcastEngine<FakeTransport, FakeStore> {
        let limiter = Arc::new(RateLimiter::with_interval(RATE_INTERVAL));
        BroadcastEngine::new(transport.clone(), store.clone(), limiter, cfg)
    }

    fn payload() -> MessagePayload {
        MessagePayload::Text("Hello, subscribers!".to_owned())
    }

    fn expected(sent: u64, removed: u64, failed: u64, total: u64) -> BroadcastReport {
        BroadcastReport {
            sent,
            removed,
            failed,
            total,
            cancelled: false,
        }
    }

    async fn run(
        transport: &FakeTransport,
        store: &FakeStore,
        cfg: Config,
    ) -> Result<BroadcastReport> {
        engine(transport, store, cfg)
            .run(&payload(), &RecordingSink::default(), &CancellationToken::new())
            .await
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn all_delivered() {
        let store = FakeStore::with_recipients(1..=3);
        let transport = FakeTransport::default();

        let report = run(&transport, &store, config()).await.unwrap();

        assert_eq!(report, expected(3, 0, 0, 3));
        assert_eq!(transport.attempts_of(ChatId(2)), 1);
        assert_eq!(store.len(), 3);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn blocked_recipient_is_pruned() {
        let store = FakeStore::with_recipients(1..=3);
        let transport = FakeTransport::default();
        transport.script(ChatId(2), [Reply::Blocked]);

        let report = run(&transport, &store, config()).await.unwrap();

        assert_eq!(report, expected(2, 1, 0, 3));
        assert!(!store.contains(ChatId(2)));
        assert_eq!(store.len(), 2);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn rate_limited_then_delivered() {
        let store = FakeStore::with_recipients([1]);
        let transport = FakeTransport::default();
        transport.script(ChatId(1), [Reply::RetryAfter(Duration::from_secs(2))]);

        let start = Instant::now();
        let report = run(&transport, &store, config()).await.unwrap();

        assert_eq!(report, expected(1, 0, 0, 1));

        let attempts = transport.attempt_instants(ChatId(1));
        assert_eq!(attempts.len(), 2);
        assert!(attempts[1] - attempts[0] >= Duration::from_millis(2500));
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn rate_limited_then_blocked_is_removed() {
        let store = FakeStore::with_recipients([1]);
        let transport = FakeTransport::default();
        transport.script(
            ChatId(1),
            [Reply::RetryAfter(Duration::from_secs(2)), Reply::Blocked],
        );

        let report = run(&transport, &store, config()).await.unwrap();

        assert_eq!(report, expected(0, 1, 0, 1));
        assert!(!store.contains(ChatId(1)));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn rate_limited_twice_is_failed_without_third_attempt() {
        let store = FakeStore::with_recipients([1, 2]);
        let transport = FakeTransport::default();
        transport.script(
            ChatId(1),
            [
                Reply::RetryAfter(Duration::from_secs(1)),
                Reply::RetryAfter(Duration::from_secs(1)),
                Reply::RetryAfter(Duration::from_secs(1)),
            ],
        );

        let report = run(&transport, &store, config()).await.unwrap();

        assert_eq!(report, expected(1, 0, 1, 2));
        assert_eq!(transport.attempts_of(ChatId(1)), 2);
        assert!(store.contains(ChatId(1)));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn transient_failure_is_not_retried() {
        let store = FakeStore::with_recipients([1, 2]);
        let transport = FakeTransport::default();
        transport.script(ChatId(1), [Reply::Io]);

        let report = run(&transport, &store, config()).await.unwrap();

        assert_eq!(report, expected(1, 0, 1, 2));
        assert_eq!(transport.attempts_of(ChatId(1)), 1);
        assert!(store.contains(ChatId(1)));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn large_store_is_paged() {
        let store = FakeStore::with_recipients(1..=2500);
        let transport = FakeTransport::default();

        let report = run(&transport, &store, config()).await.unwrap();

        assert_eq!(report, expected(2500, 0, 0, 2500));
        assert_eq!(store.page_sizes(), [1000, 1000, 500]);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn dispatches_are_paced_and_ordered() {
        let store = FakeStore::with_recipients(1..=10);
        let transport = FakeTransport::default();

        run(&transport, &store, config()).await.unwrap();

        let log = transport.log();
        let order: Vec<_> = log.iter().map(|(chat_id, _)| chat_id.0).collect();
        assert_eq!(order, (1..=10).collect::<Vec<_>>());

        for pair in log.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= RATE_INTERVAL, "{pair:?}");
        }
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn recipients_are_conserved() {
        let store = FakeStore::with_recipients(1..=9);
        let transport = FakeTransport::default();
        transport.script(ChatId(2), [Reply::Blocked]);
        transport.script(ChatId(3), [Reply::Io]);
        transport.script(ChatId(4), [Reply::ChatNotFound]);
        transport.script(ChatId(5), [Reply::RetryAfter(Duration::from_secs(1))]);
        transport.script(
            ChatId(6),
            [Reply::RetryAfter(Duration::from_secs(1)), Reply::Io],
        );
        transport.script(ChatId(7), [Reply::Unknown("Bad Request: PEER_ID_INVALID")]);
        transport.script(ChatId(8), [Reply::Unknown("Bad Request: message is too long")]);

        let report = run(&transport, &store, config()).await.unwrap();

        assert_eq!(report, expected(3, 3, 3, 9));
        assert_eq!(report.processed(), report.total);
        assert_eq!(store.removed(), [ChatId(2), ChatId(4), ChatId(7)]);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn progress_is_emitted_at_fixed_cadence() {
        let store = FakeStore::with_recipients(1..=10);
        let transport = FakeTransport::default();
        transport.script(ChatId(2), [Reply::Blocked]);

        let sink = RecordingSink::default();
        let cfg = Config {
            progress_every: NonZeroU64::new(3).unwrap(),
            ..config()
        };

        engine(&transport, &store, cfg)
            .run(&payload(), &sink, &CancellationToken::new())
            .await
            .unwrap();

        let snapshots = sink.snapshots();
        let processed: Vec<_> = snapshots.iter().map(|s| s.processed).collect();
        assert_eq!(processed, [3, 6, 9]);

        for snapshot in &snapshots {
            assert_eq!(
                snapshot.sent + snapshot.removed + snapshot.failed,
                snapshot.processed
            );
            assert_eq!(snapshot.total, 10);
            assert_eq!(snapshot.removed, 1);
        }
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn broken_progress_sink_does_not_abort() {
        let store = FakeStore::with_recipients(1..=4);
        let transport = FakeTransport::default();
        let sink = RecordingSink::failing();
        let cfg = Config {
            progress_every: NonZeroU64::new(1).unwrap(),
            ..config()
        };

        let report = engine(&transport, &store, cfg)
            .run(&payload(), &sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report, expected(4, 0, 0, 4));
        assert_eq!(sink.snapshots().len(), 4);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn store_failure_aborts_the_run() {
        let store = FakeStore::with_recipients(1..=3);
        store.fail_removals();

        let transport = FakeTransport::default();
        transport.script(ChatId(2), [Reply::Blocked]);

        let err = run(&transport, &store, config()).await.unwrap_err();

        assert!(
            matches!(err.kind(), crate::error::ErrorKind::Db { .. }),
            "{err:?}"
        );
        assert_eq!(transport.attempts_of(ChatId(3)), 0);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn cancellation_returns_partial_report() {
        let store = FakeStore::with_recipients(1..=10);
        let transport = FakeTransport::default();
        let cancel = CancellationToken::new();
        let sink = RecordingSink::cancelling(cancel.clone());
        let cfg = Config {
            progress_every: NonZeroU64::new(4).unwrap(),
            ..config()
        };

        let report = engine(&transport, &store, cfg)
            .run(&payload(), &sink, &cancel)
            .await
            .unwrap();

        assert_eq!(
            report,
            BroadcastReport {
                sent: 4,
                removed: 0,
                failed: 0,
                total: 10,
                cancelled: true,
            }
        );
        assert_eq!(transport.attempts_of(ChatId(5)), 0);
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn pruning_already_unsubscribed_recipient() {
        let store = FakeStore::with_recipients(1..=3);
        let transport = FakeTransport::default();
        transport.script(ChatId(2), [Reply::Blocked]);

        // The subscriber is deleted concurrently while the dispatch is in flight
        transport.on_dispatch(ChatId(2), {
            let store = store.clone();
            move || store.remove_now(ChatId(2))
        });

        let report = run(&transport, &store, config()).await.unwrap();

        assert_eq!(report, expected(2, 1, 0, 3));
        assert!(store.removed().is_empty());
        assert!(!store.contains(ChatId(2)));
    }

    #[test_log::test(tokio::test(start_paused = true))]
    async fn late_subscribers_extend_the_total() {
        let store = FakeStore::with_recipients(1..=2);
        let transport = FakeTransport::default();

        // Subscribes while the broadcast is delivering to the first recipient
        transport.on_dispatch(ChatId(1), {
            let store = store.clone();
            move || store.add(ChatId(3))
        });

        let cfg = Config {
            batch_size: NonZeroU32::new(1).unwrap(),
            ..config()
        };

        let report = run(&transport, &store, cfg).await.unwrap();

        assert_eq!(report, expected(3, 0, 0, 3));
        assert_eq!(store.page_sizes(), [1, 1, 1, 0]);
    }
}
