//! Public entry point for the upload engine
//!
//! Composes the item store, scheduler, transfer client, and retry policy
//! behind a small command surface. Commands record intent and return
//! quickly; their effects (status transitions, progress) are observed
//! asynchronously through the snapshot watch channel.

use crate::model::error::ValidationError;
use crate::model::selected_file::SelectedFile;
use crate::model::summary::{BatchSnapshot, BatchSummary};
use crate::model::transfer_event::TransferEvent;
use crate::model::upload_item::ItemId;
use crate::services::file_collector::within_depth;
use crate::services::item_store::ItemStore;
use crate::services::retry_policy::RetryPolicy;
use crate::services::scheduler::UploadScheduler;
use crate::services::storage_client::StorageClient;
use crate::settings::config::{validate_concurrency, UploadConfig};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Result of a `start` command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// The batch is empty, fully cancelled, or fully settled: there is
    /// nothing queued. Not an error.
    NothingToUpload,
}

/// Facade over the upload orchestration engine
pub struct UploadManager {
    store: Arc<ItemStore>,
    scheduler: UploadScheduler,
    max_path_depth: usize,
}

impl UploadManager {
    /// Build the engine around a storage client. The configuration is
    /// expected to have passed validation at load time.
    pub fn new(client: Arc<dyn StorageClient>, config: &UploadConfig) -> Self {
        let store = Arc::new(ItemStore::new());
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<TransferEvent>();

        // Pump transfer events into the store; the store's guards keep
        // late events (after cancel/pause) from mutating anything.
        let pump_store = store.clone();
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                match event {
                    TransferEvent::Progress(progress) => {
                        pump_store
                            .set_progress(progress.item_id, progress.percentage())
                            .await;
                    }
                    TransferEvent::Attempt { item_id, attempt } => {
                        pump_store.set_attempt(item_id, attempt).await;
                    }
                }
            }
        });

        let scheduler = UploadScheduler::new(
            store.clone(),
            client,
            RetryPolicy::default(),
            config.chunk_size,
            config.max_concurrent_uploads,
            events_tx,
        );

        UploadManager {
            store,
            scheduler,
            max_path_depth: config.max_path_depth,
        }
    }

    /// Enqueue selected files. Folder selections are filtered by the
    /// maximum path depth before anything is enqueued; individually
    /// picked files are taken as-is. Returns the ids of accepted items.
    pub async fn add_files(&self, files: Vec<SelectedFile>, is_folder: bool) -> Vec<ItemId> {
        let accepted: Vec<SelectedFile> = if is_folder {
            let total = files.len();
            let kept: Vec<SelectedFile> = files
                .into_iter()
                .filter(|f| within_depth(&f.relative_path, self.max_path_depth))
                .collect();
            if kept.len() < total {
                tracing::info!(
                    "excluded {} file(s) deeper than {} levels",
                    total - kept.len(),
                    self.max_path_depth
                );
            }
            kept
        } else {
            files
        };

        if accepted.is_empty() {
            return Vec::new();
        }
        let ids = self.store.add(accepted).await;
        tracing::info!("{} file(s) added to upload queue", ids.len());
        ids
    }

    /// Begin (or resume) uploading. Fills admission slots before
    /// returning, so `min(limit, queued)` items are uploading immediately
    /// after a successful start.
    pub async fn start(&self) -> StartOutcome {
        let has_queued = self
            .store
            .snapshot()
            .await
            .iter()
            .any(|i| i.status.is_queued());
        if !has_queued {
            tracing::info!("start requested with nothing to upload");
            return StartOutcome::NothingToUpload;
        }
        self.store.set_uploading(true).await;
        self.scheduler.fill_slots().await;
        StartOutcome::Started
    }

    /// Batch-wide suspend: active transfers are aborted best-effort and
    /// their items return to the queue. Idempotent.
    pub async fn pause(&self) {
        self.scheduler.pause().await;
    }

    /// Cancel exactly one item, whatever it is doing. Terminal items are
    /// left untouched. Never triggers a retry.
    pub async fn cancel(&self, id: ItemId) -> bool {
        self.scheduler.cancel(id).await
    }

    /// Abort all transfers and empty the queue entirely
    pub async fn clear_all(&self) {
        self.scheduler.clear_all().await;
    }

    /// Change the concurrency limit for future admissions. Values outside
    /// 1-10 are rejected and the prior value is retained.
    pub fn set_max_concurrent(&self, limit: usize) -> Result<(), ValidationError> {
        validate_concurrency(limit)?;
        self.scheduler.set_limit(limit);
        tracing::info!("max concurrent uploads set to {}", limit);
        Ok(())
    }

    pub fn max_concurrent(&self) -> usize {
        self.scheduler.limit()
    }

    /// Watch channel delivering a fresh snapshot on every state change
    pub fn subscribe(&self) -> watch::Receiver<BatchSnapshot> {
        self.store.subscribe()
    }

    pub async fn snapshot(&self) -> BatchSnapshot {
        self.store.current().await
    }

    pub async fn summary(&self) -> BatchSummary {
        self.store.current().await.summary
    }

    pub async fn is_uploading(&self) -> bool {
        self.store.is_uploading().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::upload_status::UploadStatus;
    use crate::services::storage_client::{MockStorageClient, ResourceHandle};
    use bytes::Bytes;
    use std::time::Duration;

    fn instant_client() -> Arc<dyn StorageClient> {
        let mut mock = MockStorageClient::new();
        mock.expect_create().returning(|_| {
            Ok(ResourceHandle {
                upload_id: "up".into(),
            })
        });
        mock.expect_append().returning(|_, _, _| Ok(()));
        mock.expect_abort().returning(|_| Ok(()));
        Arc::new(mock)
    }

    fn manager() -> UploadManager {
        UploadManager::new(instant_client(), &UploadConfig::default())
    }

    fn memory_files(names: &[&str]) -> Vec<SelectedFile> {
        names
            .iter()
            .map(|n| SelectedFile::from_memory(*n, Bytes::from_static(b"bytes")))
            .collect()
    }

    async fn wait_settled(manager: &UploadManager) {
        let mut rx = manager.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                {
                    let snapshot = rx.borrow().clone();
                    if !snapshot.items.is_empty() && snapshot.is_settled() && !snapshot.is_uploading
                    {
                        break;
                    }
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .expect("batch did not settle in time");
    }

    #[tokio::test]
    async fn test_start_on_empty_batch_reports_nothing() {
        let manager = manager();
        assert_eq!(manager.start().await, StartOutcome::NothingToUpload);
        assert!(!manager.is_uploading().await);
    }

    #[tokio::test]
    async fn test_start_on_all_cancelled_batch_reports_nothing() {
        let manager = manager();
        let ids = manager.add_files(memory_files(&["a", "b"]), false).await;
        for id in ids {
            manager.cancel(id).await;
        }
        assert_eq!(manager.start().await, StartOutcome::NothingToUpload);
    }

    #[tokio::test]
    async fn test_full_batch_runs_to_completion() {
        let manager = manager();
        manager
            .add_files(memory_files(&["a", "b", "c", "d", "e"]), false)
            .await;
        manager.set_max_concurrent(2).unwrap();

        assert_eq!(manager.start().await, StartOutcome::Started);
        let uploading = manager
            .snapshot()
            .await
            .items
            .iter()
            .filter(|i| i.status == UploadStatus::Uploading)
            .count();
        assert_eq!(uploading, 2);

        wait_settled(&manager).await;
        let summary = manager.summary().await;
        assert_eq!(summary.completed_files, 5);
        assert_eq!(summary.global_progress, 100);
        assert!(!manager.is_uploading().await);
    }

    #[tokio::test]
    async fn test_folder_depth_filter_applies_before_enqueue() {
        let manager = manager();
        let mut deep = SelectedFile::from_memory("deep.txt", Bytes::from_static(b"x"));
        deep.relative_path = "root/a/b/c/deep.txt".into(); // depth 5
        let mut shallow = SelectedFile::from_memory("shallow.txt", Bytes::from_static(b"x"));
        shallow.relative_path = "root/shallow.txt".into(); // depth 2

        let ids = manager.add_files(vec![deep, shallow], true).await;
        assert_eq!(ids.len(), 1);
        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].name, "shallow.txt");
    }

    #[tokio::test]
    async fn test_individual_files_skip_depth_filter() {
        let manager = manager();
        let mut deep = SelectedFile::from_memory("deep.txt", Bytes::from_static(b"x"));
        deep.relative_path = "root/a/b/c/deep.txt".into();

        let ids = manager.add_files(vec![deep], false).await;
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn test_set_max_concurrent_rejects_out_of_range() {
        let manager = manager();
        let prior = manager.max_concurrent();

        assert!(manager.set_max_concurrent(0).is_err());
        assert!(manager.set_max_concurrent(15).is_err());
        assert_eq!(manager.max_concurrent(), prior);

        assert!(manager.set_max_concurrent(10).is_ok());
        assert_eq!(manager.max_concurrent(), 10);
    }

    #[tokio::test]
    async fn test_pause_on_idle_batch_is_noop() {
        let manager = manager();
        manager.add_files(memory_files(&["a"]), false).await;
        manager.pause().await;
        manager.pause().await;
        let snapshot = manager.snapshot().await;
        assert_eq!(snapshot.items[0].status, UploadStatus::Queued);
        assert!(!snapshot.is_uploading);
    }

    #[tokio::test]
    async fn test_clear_all_resets_everything() {
        let manager = manager();
        manager.add_files(memory_files(&["a", "b"]), false).await;
        manager.start().await;
        manager.clear_all().await;

        let snapshot = manager.snapshot().await;
        assert!(snapshot.items.is_empty());
        assert!(!snapshot.is_uploading);
        assert_eq!(snapshot.summary.global_progress, 0);
    }
}
