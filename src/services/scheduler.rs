//! Concurrency scheduler for queued uploads
//!
//! Admits queued items into active transfer up to a mutable limit, in
//! insertion order, reacting to `start` commands and to every completion,
//! failure, or cancellation event. In-flight transfers are never
//! pre-empted when the limit is lowered; the new limit only governs
//! future admissions.
//!
//! The scheduler holds no authoritative item state, only transient
//! in-flight handles (cancel signal, abort handle, admission sequence
//! number). All status transitions go through the item store, whose
//! guards make stale transfer completions harmless.

use crate::model::transfer_event::TransferEvent;
use crate::model::upload_item::{ItemId, UploadItem};
use crate::services::item_store::ItemStore;
use crate::services::retry_policy::RetryPolicy;
use crate::services::storage_client::StorageClient;
use crate::services::transfer_client::{self, CancelSignal, TransferOutcome, TransferSpec};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;

/// Transient handle for one admitted transfer
struct InFlight {
    /// Admission sequence number, so a superseded transfer (paused then
    /// re-admitted) can never act on its successor's behalf
    seq: u64,
    cancel: CancelSignal,
    abort: AbortHandle,
}

/// Pure admission planning: the next queued ids, in insertion order, that
/// fit under the limit given the currently uploading count.
pub fn plan_admissions(items: &[UploadItem], limit: usize) -> Vec<ItemId> {
    let uploading = items.iter().filter(|i| i.status.is_uploading()).count();
    if uploading >= limit {
        return Vec::new();
    }
    items
        .iter()
        .filter(|i| i.status.is_queued())
        .take(limit - uploading)
        .map(|i| i.id)
        .collect()
}

struct SchedulerInner {
    store: Arc<ItemStore>,
    client: Arc<dyn StorageClient>,
    policy: RetryPolicy,
    chunk_size: u64,
    limit: AtomicUsize,
    next_seq: AtomicU64,
    in_flight: Mutex<HashMap<ItemId, InFlight>>,
    events_tx: UnboundedSender<TransferEvent>,
}

/// Admits items, spawns transfer tasks, and reacts to their completion.
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct UploadScheduler {
    inner: Arc<SchedulerInner>,
}

impl UploadScheduler {
    pub fn new(
        store: Arc<ItemStore>,
        client: Arc<dyn StorageClient>,
        policy: RetryPolicy,
        chunk_size: u64,
        limit: usize,
        events_tx: UnboundedSender<TransferEvent>,
    ) -> Self {
        UploadScheduler {
            inner: Arc::new(SchedulerInner {
                store,
                client,
                policy,
                chunk_size,
                limit: AtomicUsize::new(limit),
                next_seq: AtomicU64::new(1),
                in_flight: Mutex::new(HashMap::new()),
                events_tx,
            }),
        }
    }

    /// Concurrency limit for future admissions. Validation happens at the
    /// facade boundary; in-flight transfers are unaffected.
    pub fn set_limit(&self, limit: usize) {
        self.inner.limit.store(limit, Ordering::SeqCst);
    }

    pub fn limit(&self) -> usize {
        self.inner.limit.load(Ordering::SeqCst)
    }

    pub async fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().await.len()
    }

    /// Scan the store in insertion order and admit queued items while
    /// slots are free. Called on `start` and after every transfer exit.
    pub async fn fill_slots(&self) {
        if !self.inner.store.is_uploading().await {
            return;
        }
        let snapshot = self.inner.store.snapshot().await;
        for id in plan_admissions(&snapshot, self.limit()) {
            self.admit(id).await;
        }
        self.settle_if_idle().await;
    }

    /// Move one queued item to uploading and spawn its transfer task
    async fn admit(&self, id: ItemId) {
        let Some(item) = self.inner.store.get(id).await else {
            return;
        };
        // The store guard loses the race for items cancelled since the scan
        if !self.inner.store.mark_uploading(id).await {
            return;
        }

        let spec = TransferSpec::from(&item);
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        let seq = self.inner.next_seq.fetch_add(1, Ordering::SeqCst);

        // Hold the registry lock across the spawn: the task's first await
        // re-takes it, so the transfer cannot finish before its in-flight
        // entry exists.
        let mut in_flight = self.inner.in_flight.lock().await;
        let scheduler = self.clone();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            drop(scheduler.inner.in_flight.lock().await);
            let outcome = transfer_client::run(
                scheduler.inner.client.clone(),
                spec,
                scheduler.inner.chunk_size,
                scheduler.inner.policy.clone(),
                scheduler.inner.events_tx.clone(),
                task_cancel,
            )
            .await;
            scheduler.on_finished(id, seq, outcome).await;
        });
        in_flight.insert(
            id,
            InFlight {
                seq,
                cancel,
                abort: handle.abort_handle(),
            },
        );
        tracing::debug!("admitted {} (seq {})", id, seq);
    }

    /// Transfer task exit: record the outcome and refill slots
    async fn on_finished(&self, id: ItemId, seq: u64, outcome: TransferOutcome) {
        {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get(&id) {
                Some(entry) if entry.seq == seq => {
                    in_flight.remove(&id);
                }
                Some(_) => {
                    // A newer admission owns this slot now
                    return;
                }
                // Pause or clear already dropped the entry
                None => {}
            }
        }

        match outcome {
            TransferOutcome::Completed => {
                self.inner.store.finish(id, Ok(())).await;
            }
            TransferOutcome::Failed(failure) => {
                tracing::error!("{} failed: {}", id, failure);
                self.inner.store.finish(id, Err(failure)).await;
            }
            // Status was already moved by cancel or pause
            TransferOutcome::Cancelled => {}
        }

        self.fill_slots().await;
    }

    /// Clear the uploading flag once nothing is transferring or waiting
    async fn settle_if_idle(&self) {
        let snapshot = self.inner.store.snapshot().await;
        let busy = snapshot
            .iter()
            .any(|i| i.status.is_uploading() || i.status.is_queued());
        if !busy && self.inner.store.is_uploading().await {
            self.inner.store.set_uploading(false).await;
            tracing::info!("upload batch settled");
        }
    }

    /// Cancel exactly one item; an in-flight transfer is signalled and
    /// exits between chunks. Returns false for unknown or terminal items.
    pub async fn cancel(&self, id: ItemId) -> bool {
        let cancelled = self.inner.store.cancel(id).await;
        if cancelled {
            if let Some(entry) = self.inner.in_flight.lock().await.remove(&id) {
                entry.cancel.store(true, Ordering::SeqCst);
            }
            tracing::info!("{} cancelled", id);
        }
        cancelled
    }

    /// Batch-wide suspend: signal every in-flight transfer, return those
    /// items to the queue with progress reset, and stop admitting until
    /// the next `start`. A no-op when nothing is uploading.
    pub async fn pause(&self) {
        let drained: Vec<(ItemId, InFlight)> =
            self.inner.in_flight.lock().await.drain().collect();
        for (id, entry) in &drained {
            entry.cancel.store(true, Ordering::SeqCst);
            self.inner.store.requeue(*id).await;
            tracing::debug!("{} returned to queue", id);
        }
        self.inner.store.set_uploading(false).await;
        if !drained.is_empty() {
            tracing::info!("paused {} active transfer(s)", drained.len());
        }
    }

    /// Abort everything and empty the store
    pub async fn clear_all(&self) {
        {
            let mut in_flight = self.inner.in_flight.lock().await;
            for (_, entry) in in_flight.drain() {
                entry.cancel.store(true, Ordering::SeqCst);
                entry.abort.abort();
            }
        }
        self.inner.store.clear().await;
        tracing::info!("upload queue cleared");
    }
}
