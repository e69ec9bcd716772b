//! Canonical store for queued upload items
//!
//! The store is the single source of truth for item state. All mutation is
//! serialized behind a mutex and every mutation publishes a fresh
//! [`BatchSnapshot`] on a watch channel, so observers never see partial
//! updates. Transitions that would violate the status state machine
//! (e.g. finishing an item that is no longer uploading) are ignored and
//! reported to the caller via the returned bool.

use crate::model::error::UploadFailure;
use crate::model::selected_file::SelectedFile;
use crate::model::summary::{BatchSnapshot, BatchSummary};
use crate::model::upload_item::{ItemId, UploadItem};
use crate::model::upload_status::UploadStatus;
use tokio::sync::{watch, Mutex};

/// Progress reported while an item is still uploading is capped below 100
/// so that `progress == 100` holds exactly when `status == Done`.
const MAX_LIVE_PROGRESS: u8 = 99;

struct Inner {
    items: Vec<UploadItem>,
    next_id: u64,
    is_uploading: bool,
}

/// Serialized, observable store of all queued items in insertion order
pub struct ItemStore {
    inner: Mutex<Inner>,
    snapshot_tx: watch::Sender<BatchSnapshot>,
}

impl ItemStore {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(BatchSnapshot::default());
        ItemStore {
            inner: Mutex::new(Inner {
                items: Vec::new(),
                next_id: 1,
                is_uploading: false,
            }),
            snapshot_tx,
        }
    }

    /// Subscribe to the snapshot published after every mutation
    pub fn subscribe(&self) -> watch::Receiver<BatchSnapshot> {
        self.snapshot_tx.subscribe()
    }

    fn publish(&self, inner: &Inner) {
        self.snapshot_tx.send_replace(BatchSnapshot {
            items: inner.items.clone(),
            is_uploading: inner.is_uploading,
            summary: BatchSummary::from_items(&inner.items),
        });
    }

    /// Append new items with status `Queued`, returning their ids
    pub async fn add(&self, files: Vec<SelectedFile>) -> Vec<ItemId> {
        let mut inner = self.inner.lock().await;
        let mut ids = Vec::with_capacity(files.len());
        for file in files {
            let id = ItemId::new(inner.next_id);
            inner.next_id += 1;
            inner.items.push(UploadItem::new(id, file));
            ids.push(id);
        }
        if !ids.is_empty() {
            self.publish(&inner);
        }
        ids
    }

    /// Apply a partial mutation to one item and publish a change
    /// notification. Returns false if the id is unknown.
    pub async fn update<F>(&self, id: ItemId, f: F) -> bool
    where
        F: FnOnce(&mut UploadItem),
    {
        let mut inner = self.inner.lock().await;
        let found = match inner.items.iter_mut().find(|i| i.id == id) {
            Some(item) => {
                f(item);
                true
            }
            None => false,
        };
        if found {
            self.publish(&inner);
        }
        found
    }

    /// Delete one item. Returns false if the id is unknown.
    pub async fn remove(&self, id: ItemId) -> bool {
        let mut inner = self.inner.lock().await;
        let before = inner.items.len();
        inner.items.retain(|i| i.id != id);
        let removed = inner.items.len() != before;
        if removed {
            self.publish(&inner);
        }
        removed
    }

    /// Empty the store entirely and reset the uploading flag
    pub async fn clear(&self) {
        let mut inner = self.inner.lock().await;
        inner.items.clear();
        inner.is_uploading = false;
        self.publish(&inner);
    }

    /// Immutable ordered view (insertion order) of all items
    pub async fn snapshot(&self) -> Vec<UploadItem> {
        self.inner.lock().await.items.clone()
    }

    /// The full observability surface as of now
    pub async fn current(&self) -> BatchSnapshot {
        let inner = self.inner.lock().await;
        BatchSnapshot {
            items: inner.items.clone(),
            is_uploading: inner.is_uploading,
            summary: BatchSummary::from_items(&inner.items),
        }
    }

    pub async fn get(&self, id: ItemId) -> Option<UploadItem> {
        self.inner
            .lock()
            .await
            .items
            .iter()
            .find(|i| i.id == id)
            .cloned()
    }

    pub async fn is_uploading(&self) -> bool {
        self.inner.lock().await.is_uploading
    }

    pub async fn set_uploading(&self, uploading: bool) {
        let mut inner = self.inner.lock().await;
        if inner.is_uploading != uploading {
            inner.is_uploading = uploading;
            self.publish(&inner);
        }
    }

    /// Admit a queued item: `Queued → Uploading`, fresh attempt counter.
    /// Returns false if the item is not currently queued.
    pub async fn mark_uploading(&self, id: ItemId) -> bool {
        self.transition(id, |item| {
            if item.status.is_queued() {
                item.status = UploadStatus::Uploading;
                item.attempt = 0;
                item.failure = None;
                true
            } else {
                false
            }
        })
        .await
    }

    /// Record byte progress for an uploading item. Progress is monotonic:
    /// regressions are dropped, and live values cap at 99.
    pub async fn set_progress(&self, id: ItemId, percentage: u8) -> bool {
        let capped = percentage.min(MAX_LIVE_PROGRESS);
        self.transition(id, |item| {
            if item.status.is_uploading() && capped > item.progress {
                item.progress = capped;
                true
            } else {
                false
            }
        })
        .await
    }

    /// Record the attempt counter reported by the transfer client
    pub async fn set_attempt(&self, id: ItemId, attempt: u32) -> bool {
        self.transition(id, |item| {
            if item.status.is_uploading() && item.attempt != attempt {
                item.attempt = attempt;
                true
            } else {
                false
            }
        })
        .await
    }

    /// Terminal transition out of `Uploading`: `Done` (progress forced to
    /// 100) or `Error` carrying the failure. Ignored unless the item is
    /// still uploading, so a stale transfer can never clobber a
    /// cancellation or a pause that already moved the item on.
    pub async fn finish(&self, id: ItemId, result: Result<(), UploadFailure>) -> bool {
        self.transition(id, |item| {
            if !item.status.is_uploading() {
                return false;
            }
            match result {
                Ok(()) => {
                    item.status = UploadStatus::Done;
                    item.progress = 100;
                    item.failure = None;
                }
                Err(failure) => {
                    item.status = UploadStatus::Error;
                    item.failure = Some(failure);
                }
            }
            true
        })
        .await
    }

    /// Batch-pause path: return an uploading item to the queue with its
    /// progress reset; it will re-transfer from scratch when re-admitted.
    pub async fn requeue(&self, id: ItemId) -> bool {
        self.transition(id, |item| {
            if item.status.is_uploading() {
                item.status = UploadStatus::Queued;
                item.progress = 0;
                item.attempt = 0;
                true
            } else {
                false
            }
        })
        .await
    }

    /// Per-item cancel: `Queued | Uploading → Cancelled`, progress reset.
    /// A terminal item is left untouched.
    pub async fn cancel(&self, id: ItemId) -> bool {
        self.transition(id, |item| {
            if item.status.is_terminal() {
                false
            } else {
                item.status = UploadStatus::Cancelled;
                item.progress = 0;
                true
            }
        })
        .await
    }

    /// Run a guarded transition; publishes only when the guard applied it.
    async fn transition<F>(&self, id: ItemId, f: F) -> bool
    where
        F: FnOnce(&mut UploadItem) -> bool,
    {
        let mut inner = self.inner.lock().await;
        let applied = match inner.items.iter_mut().find(|i| i.id == id) {
            Some(item) => f(item),
            None => false,
        };
        if applied {
            self.publish(&inner);
        }
        applied
    }
}

impl Default for ItemStore {
    fn default() -> Self {
        Self::new()
    }
}
