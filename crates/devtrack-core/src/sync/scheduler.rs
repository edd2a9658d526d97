//! Debounced flush scheduler.
//!
//! State machine:
//!
//! ```text
//!   enqueue            timer fires / forced trigger       send done
//! Idle ──────► Pending ─────────────────────────► Flushing ─────────► Idle
//!               ▲   │ enqueue (timer reset)                │ queue not empty
//!               └───┘                                      ▼
//!                                                       Pending
//! ```
//!
//! Only one timer exists per scheduler; every enqueue aborts it and arms a
//! new one. Flushes are serialized, so an edit made while a batch is in
//! flight is sent by the next flush instead of joining the in-flight one.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::ApiError;
use crate::models::{BatchError, BatchRequest, BatchResult, ResourceKind};

use super::{MutationQueue, PendingChange};

/// Quiet period after the last edit before a batch is sent.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(2000);

/// Destination of flushed batches, normally `ApiClient`.
#[async_trait]
pub trait BatchSink: Send + Sync + 'static {
    async fn send_batch(&self, kind: ResourceKind, request: BatchRequest) -> Result<BatchResult>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    Idle,
    Pending,
    Flushing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    Timer,
    VisibilityHidden,
    Unload,
    Unmount,
    Manual,
}

impl FlushTrigger {
    fn is_forced(&self) -> bool {
        !matches!(self, FlushTrigger::Timer)
    }
}

/// Last user-visible sync status.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotice {
    Synced {
        updated: usize,
        errors: Vec<BatchError>,
    },
    /// Send failed; the changes are held for the next forced flush
    Failed(String),
    /// The server refused the whole batch; resending cannot succeed
    Rejected(String),
}

impl SyncNotice {
    pub fn is_error(&self) -> bool {
        matches!(self, SyncNotice::Failed(_) | SyncNotice::Rejected(_))
    }
}

impl fmt::Display for SyncNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncNotice::Synced { updated, errors } if errors.is_empty() => {
                write!(f, "Synced {} change(s)", updated)
            }
            SyncNotice::Synced { updated, errors } => {
                write!(f, "Synced {} change(s), {} rejected", updated, errors.len())
            }
            SyncNotice::Failed(_) => write!(f, "Sync failed, will retry"),
            SyncNotice::Rejected(reason) => write!(f, "Sync rejected: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FlushOutcome {
    /// Nothing was queued
    Empty,
    Sent(BatchResult),
    Failed(String),
}

struct Inner {
    queue: MutationQueue,
    /// Changes from a failed batch, resent only by the next forced flush
    retry: HashMap<String, PendingChange>,
    state: FlushState,
    timer: Option<JoinHandle<()>>,
    timer_generation: u64,
    last_notice: Option<SyncNotice>,
}

impl Inner {
    fn has_pending(&self) -> bool {
        !self.queue.is_empty() || !self.retry.is_empty()
    }
}

struct Shared<S> {
    kind: ResourceKind,
    sink: S,
    delay: Duration,
    inner: Mutex<Inner>,
    flush_lock: tokio::sync::Mutex<()>,
}

impl<S: BatchSink> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm_timer(self: &Arc<Self>, inner: &mut Inner) {
        if let Some(timer) = inner.timer.take() {
            timer.abort();
        }
        inner.timer_generation += 1;
        let generation = inner.timer_generation;
        let shared = Arc::clone(self);

        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(shared.delay).await;
            {
                let mut inner = shared.lock();
                if inner.timer_generation != generation {
                    return;
                }
                // Detach before flushing; a reset must never abort a send in flight
                inner.timer = None;
            }
            shared.flush(FlushTrigger::Timer).await;
        }));
    }

    async fn flush(self: &Arc<Self>, trigger: FlushTrigger) -> FlushOutcome {
        let _flushing = self.flush_lock.lock().await;

        let changes = {
            let mut inner = self.lock();
            if trigger.is_forced() {
                if let Some(timer) = inner.timer.take() {
                    timer.abort();
                }
            }

            let mut changes = inner.queue.drain();
            if trigger.is_forced() && !inner.retry.is_empty() {
                let retry = std::mem::take(&mut inner.retry);
                let still_unsent: Vec<PendingChange> = retry
                    .into_values()
                    .filter(|old| !changes.iter().any(|c| c.entity_id == old.entity_id))
                    .collect();
                changes.extend(still_unsent);
                changes.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
            }

            if changes.is_empty() {
                if inner.timer.is_none() {
                    inner.state = FlushState::Idle;
                }
                return FlushOutcome::Empty;
            }
            inner.state = FlushState::Flushing;
            changes
        };

        let count = changes.len();
        debug!(kind = %self.kind, updates = count, ?trigger, "Flushing pending changes");
        let result = self
            .sink
            .send_batch(self.kind, BatchRequest::from(changes.clone()))
            .await;

        let mut inner = self.lock();
        inner.state = if inner.queue.is_empty() {
            FlushState::Idle
        } else {
            FlushState::Pending
        };

        // Whatever was just sent supersedes any older value held for retry
        for change in &changes {
            inner.retry.remove(&change.entity_id);
        }

        match result {
            Ok(result) => {
                if !result.errors.is_empty() {
                    warn!(kind = %self.kind, rejected = result.errors.len(), "Server rejected some updates");
                }
                info!(kind = %self.kind, updated = result.updated, "Batch synced");
                inner.last_notice = Some(SyncNotice::Synced {
                    updated: result.updated,
                    errors: result.errors.clone(),
                });
                FlushOutcome::Sent(result)
            }
            Err(e) => {
                let retryable = e.downcast_ref::<ApiError>().map_or(true, ApiError::is_retryable);
                if retryable {
                    warn!(kind = %self.kind, error = %e, updates = count, "Batch sync failed");
                    for change in changes {
                        // A newer edit queued during the send replaces this one
                        if inner.queue.get(&change.entity_id).is_none() {
                            inner.retry.insert(change.entity_id.clone(), change);
                        }
                    }
                    inner.last_notice = Some(SyncNotice::Failed(e.to_string()));
                } else {
                    warn!(kind = %self.kind, error = %e, updates = count, "Batch rejected, dropping");
                    inner.last_notice = Some(SyncNotice::Rejected(e.to_string()));
                }
                FlushOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Debounces queued changes for one collection into batched sends.
///
/// Must be used from within a Tokio runtime: enqueueing spawns the timer task.
pub struct FlushScheduler<S: BatchSink> {
    shared: Arc<Shared<S>>,
}

impl<S: BatchSink> Clone for FlushScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: BatchSink> FlushScheduler<S> {
    pub fn new(kind: ResourceKind, sink: S) -> Self {
        Self::with_delay(kind, sink, DEFAULT_DEBOUNCE)
    }

    pub fn with_delay(kind: ResourceKind, sink: S, delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                kind,
                sink,
                delay,
                inner: Mutex::new(Inner {
                    queue: MutationQueue::new(),
                    retry: HashMap::new(),
                    state: FlushState::Idle,
                    timer: None,
                    timer_generation: 0,
                    last_notice: None,
                }),
                flush_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.shared.kind
    }

    /// Queue the latest state of an entity and restart the debounce timer.
    pub fn enqueue(&self, entity_id: impl Into<String>, payload: Value) {
        let entity_id = entity_id.into();
        let mut inner = self.shared.lock();
        inner.retry.remove(&entity_id);
        inner.queue.enqueue(entity_id, payload);
        if inner.state != FlushState::Flushing {
            inner.state = FlushState::Pending;
        }
        self.shared.arm_timer(&mut inner);
    }

    /// Flush immediately and wait for the outcome.
    pub async fn flush_now(&self, trigger: FlushTrigger) -> FlushOutcome {
        self.shared.flush(trigger).await
    }

    /// Flush immediately without waiting. No retry if the send fails.
    pub fn force_flush(&self, trigger: FlushTrigger) -> JoinHandle<FlushOutcome> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.flush(trigger).await })
    }

    pub fn on_visibility_change(&self, hidden: bool) {
        if hidden {
            self.force_flush(FlushTrigger::VisibilityHidden);
        }
    }

    pub fn on_unload(&self) {
        self.force_flush(FlushTrigger::Unload);
    }

    pub fn unmount(self) -> JoinHandle<FlushOutcome> {
        self.force_flush(FlushTrigger::Unmount)
    }

    pub fn state(&self) -> FlushState {
        self.shared.lock().state
    }

    /// True while any change is queued or awaiting a retry.
    pub fn has_pending(&self) -> bool {
        self.shared.lock().has_pending()
    }

    pub fn pending_len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Unsynced payloads by entity id, newest first wins.
    pub fn pending_payloads(&self) -> HashMap<String, Value> {
        let inner = self.shared.lock();
        let mut payloads: HashMap<String, Value> = inner
            .retry
            .values()
            .map(|c| (c.entity_id.clone(), c.payload.clone()))
            .collect();
        for change in inner.queue.iter() {
            payloads.insert(change.entity_id.clone(), change.payload.clone());
        }
        payloads
    }

    pub fn last_notice(&self) -> Option<SyncNotice> {
        self.shared.lock().last_notice.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    #[derive(Clone, Default)]
    struct RecordingSink {
        batches: Arc<Mutex<Vec<BatchRequest>>>,
        failing: Arc<AtomicBool>,
        gate: Option<Arc<Notify>>,
    }

    impl RecordingSink {
        fn batches(&self) -> Vec<BatchRequest> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BatchSink for RecordingSink {
        async fn send_batch(&self, _kind: ResourceKind, request: BatchRequest) -> Result<BatchResult> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            let updated = request.len();
            self.batches.lock().unwrap().push(request);
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("connection refused");
            }
            Ok(BatchResult {
                updated,
                errors: vec![],
            })
        }
    }

    fn scheduler(sink: &RecordingSink) -> FlushScheduler<RecordingSink> {
        FlushScheduler::new(ResourceKind::Skills, sink.clone())
    }

    async fn advance(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_edits_coalesce_into_one_batch() {
        let sink = RecordingSink::default();
        let sync = scheduler(&sink);

        for i in 0..5 {
            sync.enqueue("s1", json!({ "status": format!("v{}", i) }));
            advance(100).await;
        }
        assert_eq!(sync.state(), FlushState::Pending);
        assert!(sink.batches().is_empty());

        advance(2_100).await;
        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].updates.len(), 1);
        assert_eq!(batches[0].updates[0].data, json!({ "status": "v4" }));
        assert_eq!(sync.state(), FlushState::Idle);
        assert!(!sync.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_resets_timer() {
        let sink = RecordingSink::default();
        let sync = scheduler(&sink);

        sync.enqueue("s1", json!(1));
        advance(1_500).await;
        sync.enqueue("s1", json!(2));
        advance(1_500).await;
        assert!(sink.batches().is_empty(), "timer should have been reset");

        advance(600).await;
        assert_eq!(sink.batches().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edits_to_two_entities_share_a_batch() {
        let sink = RecordingSink::default();
        let sync = scheduler(&sink);

        sync.enqueue("a", json!({ "status": "learning" }));
        sync.enqueue("b", json!({ "status": "mastered" }));
        advance(2_100).await;

        let batches = sink.batches();
        assert_eq!(batches.len(), 1);
        let ids: Vec<&str> = batches[0].updates.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_flush_bypasses_timer() {
        let sink = RecordingSink::default();
        let sync = scheduler(&sink);

        sync.enqueue("s1", json!(1));
        let outcome = sync.flush_now(FlushTrigger::Unload).await;
        assert!(matches!(outcome, FlushOutcome::Sent(ref r) if r.updated == 1));

        advance(5_000).await;
        assert_eq!(sink.batches().len(), 1, "aborted timer must not send again");
        assert_eq!(sync.flush_now(FlushTrigger::Manual).await, FlushOutcome::Empty);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_not_requeued_until_forced_flush() {
        let sink = RecordingSink::default();
        sink.failing.store(true, Ordering::SeqCst);
        let sync = scheduler(&sink);

        sync.enqueue("s1", json!({ "status": "learning" }));
        advance(2_100).await;
        assert_eq!(sink.batches().len(), 1);
        assert_eq!(sync.state(), FlushState::Idle);
        assert_eq!(sync.pending_len(), 0);
        assert!(sync.has_pending());
        assert!(matches!(sync.last_notice(), Some(SyncNotice::Failed(_))));
        assert_eq!(
            sync.last_notice().map(|n| n.to_string()).as_deref(),
            Some("Sync failed, will retry")
        );

        // No automatic retry
        advance(10_000).await;
        assert_eq!(sink.batches().len(), 1);

        sink.failing.store(false, Ordering::SeqCst);
        sync.on_visibility_change(true);
        advance(10).await;

        let batches = sink.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].updates[0].id, "s1");
        assert!(!sync.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_prefers_newer_queued_value() {
        let sink = RecordingSink::default();
        sink.failing.store(true, Ordering::SeqCst);
        let sync = scheduler(&sink);

        sync.enqueue("s1", json!(1));
        sync.flush_now(FlushTrigger::Manual).await;
        sync.enqueue("s1", json!(2));
        assert_eq!(sync.pending_payloads()["s1"], json!(2));

        sink.failing.store(false, Ordering::SeqCst);
        sync.flush_now(FlushTrigger::Unmount).await;
        let batches = sink.batches();
        assert_eq!(batches[1].updates.len(), 1);
        assert_eq!(batches[1].updates[0].data, json!(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_sync_clears_held_retry() {
        let sink = RecordingSink::default();
        sink.failing.store(true, Ordering::SeqCst);
        let sync = scheduler(&sink);

        sync.enqueue("s1", json!({ "status": "learning" }));
        advance(2_100).await;
        assert!(matches!(sync.last_notice(), Some(SyncNotice::Failed(_))));

        sink.failing.store(false, Ordering::SeqCst);
        sync.enqueue("s1", json!({ "status": "mastered" }));
        advance(2_100).await;
        assert_eq!(sink.batches().len(), 2);
        assert!(!sync.has_pending());
        assert!(sync.pending_payloads().is_empty());

        // Nothing stale left to resend
        sync.on_visibility_change(true);
        advance(10).await;
        let batches = sink.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].updates[0].data, json!({ "status": "mastered" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_flush_of_other_entity_keeps_retry() {
        let sink = RecordingSink::default();
        sink.failing.store(true, Ordering::SeqCst);
        let sync = scheduler(&sink);

        sync.enqueue("a", json!(1));
        advance(2_100).await;
        sink.failing.store(false, Ordering::SeqCst);
        sync.enqueue("b", json!(2));
        advance(2_100).await;
        assert!(sync.has_pending());
        assert_eq!(sync.pending_payloads()["a"], json!(1));

        sync.flush_now(FlushTrigger::Manual).await;
        let batches = sink.batches();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[2].updates[0].id, "a");
        assert!(!sync.has_pending());
    }

    #[derive(Clone, Default)]
    struct RefusingSink;

    #[async_trait]
    impl BatchSink for RefusingSink {
        async fn send_batch(&self, _kind: ResourceKind, _request: BatchRequest) -> Result<BatchResult> {
            Err(ApiError::BadRequest("unknown resource type".to_string()).into())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_batch_is_not_held_for_retry() {
        let sync = FlushScheduler::new(ResourceKind::Skills, RefusingSink);

        sync.enqueue("s1", json!(1));
        let outcome = sync.flush_now(FlushTrigger::Manual).await;
        assert!(matches!(outcome, FlushOutcome::Failed(_)));
        assert!(!sync.has_pending());

        let notice = sync.last_notice().unwrap();
        assert!(matches!(notice, SyncNotice::Rejected(_)));
        assert!(notice.is_error());
        assert!(notice.to_string().starts_with("Sync rejected"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_during_flush_goes_to_next_cycle() {
        let gate = Arc::new(Notify::new());
        let sink = RecordingSink {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        };
        let sync = scheduler(&sink);

        sync.enqueue("s1", json!(1));
        let in_flight = sync.force_flush(FlushTrigger::Manual);
        while sync.state() != FlushState::Flushing {
            tokio::task::yield_now().await;
        }

        sync.enqueue("s1", json!(2));
        assert_eq!(sync.state(), FlushState::Flushing);
        gate.notify_one();
        in_flight.await.unwrap();

        assert_eq!(sync.state(), FlushState::Pending);
        assert_eq!(sink.batches()[0].updates[0].data, json!(1));

        gate.notify_one();
        advance(2_100).await;
        let batches = sink.batches();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[1].updates[0].data, json!(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enqueue_and_drain_loses_nothing() {
        let sink = RecordingSink::default();
        let sync = FlushScheduler::with_delay(
            ResourceKind::Projects,
            sink.clone(),
            Duration::from_millis(1),
        );

        let mut writers = Vec::new();
        for w in 0..4 {
            let sync = sync.clone();
            writers.push(tokio::spawn(async move {
                for i in 0..250 {
                    sync.enqueue(format!("w{}-{}", w, i), json!(i));
                    if i % 25 == 0 {
                        sync.flush_now(FlushTrigger::Manual).await;
                    }
                }
            }));
        }
        for writer in writers {
            writer.await.unwrap();
        }
        sync.flush_now(FlushTrigger::Manual).await;

        let sent: Vec<String> = sink
            .batches()
            .into_iter()
            .flat_map(|b| b.updates.into_iter().map(|u| u.id))
            .collect();
        let unique: HashSet<&String> = sent.iter().collect();
        assert_eq!(unique.len(), 1_000);
        assert_eq!(sent.len(), 1_000, "no entity may be sent twice");
    }
}
