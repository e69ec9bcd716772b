//! Derived batch-level views over the item list
//!
//! These are pure recomputations from a store snapshot; they hold no
//! independent state.

use crate::model::upload_item::UploadItem;

/// Aggregate numbers surfaced alongside every snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    /// `round(mean(progress))` over items that are not cancelled, or 0
    /// when that set is empty
    pub global_progress: u8,
    /// Items that finished successfully
    pub completed_files: usize,
    /// Items that are not cancelled
    pub active_files: usize,
}

impl BatchSummary {
    /// Recompute the aggregate from an item list.
    ///
    /// Cancelled items are excluded from both the numerator and the
    /// denominator of the global progress, but stay visible in the list
    /// until cleared.
    pub fn from_items(items: &[UploadItem]) -> Self {
        let active: Vec<&UploadItem> = items.iter().filter(|i| i.status.is_active()).collect();
        let global_progress = if active.is_empty() {
            0
        } else {
            let sum: u64 = active.iter().map(|i| i.progress as u64).sum();
            ((sum as f64 / active.len() as f64).round()) as u8
        };
        BatchSummary {
            global_progress,
            completed_files: items.iter().filter(|i| i.status.is_done()).count(),
            active_files: active.len(),
        }
    }
}

/// The full observability surface published on every state change
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatchSnapshot {
    /// All items in insertion order
    pub items: Vec<UploadItem>,
    /// True from a successful `start` until the batch settles, pauses, or
    /// is cleared
    pub is_uploading: bool,
    pub summary: BatchSummary,
}

impl BatchSnapshot {
    /// True when no item could still make progress
    pub fn is_settled(&self) -> bool {
        self.items.iter().all(|i| i.status.is_terminal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::selected_file::SelectedFile;
    use crate::model::upload_item::{ItemId, UploadItem};
    use crate::model::upload_status::UploadStatus;
    use bytes::Bytes;

    fn item(id: u64, status: UploadStatus, progress: u8) -> UploadItem {
        let mut it = UploadItem::new(
            ItemId::from(id),
            SelectedFile::from_memory(format!("file-{}.txt", id), Bytes::from_static(b"x")),
        );
        it.status = status;
        it.progress = progress;
        it
    }

    #[test]
    fn test_empty_batch_reports_zero() {
        let summary = BatchSummary::from_items(&[]);
        assert_eq!(summary.global_progress, 0);
        assert_eq!(summary.completed_files, 0);
        assert_eq!(summary.active_files, 0);
    }

    #[test]
    fn test_mean_progress_over_active_items() {
        let items = vec![
            item(1, UploadStatus::Uploading, 50),
            item(2, UploadStatus::Queued, 0),
            item(3, UploadStatus::Done, 100),
        ];
        let summary = BatchSummary::from_items(&items);
        assert_eq!(summary.global_progress, 50);
        assert_eq!(summary.completed_files, 1);
        assert_eq!(summary.active_files, 3);
    }

    #[test]
    fn test_cancelled_items_excluded_from_aggregate() {
        let items = vec![
            item(1, UploadStatus::Done, 100),
            item(2, UploadStatus::Cancelled, 0),
        ];
        let summary = BatchSummary::from_items(&items);
        // The cancelled item neither drags the mean down nor counts as active
        assert_eq!(summary.global_progress, 100);
        assert_eq!(summary.active_files, 1);
        assert_eq!(summary.completed_files, 1);
    }

    #[test]
    fn test_all_cancelled_reports_zero() {
        let items = vec![
            item(1, UploadStatus::Cancelled, 0),
            item(2, UploadStatus::Cancelled, 0),
        ];
        let summary = BatchSummary::from_items(&items);
        assert_eq!(summary.global_progress, 0);
        assert_eq!(summary.active_files, 0);
    }

    #[test]
    fn test_mean_is_rounded() {
        let items = vec![
            item(1, UploadStatus::Uploading, 33),
            item(2, UploadStatus::Uploading, 34),
        ];
        let summary = BatchSummary::from_items(&items);
        // (33 + 34) / 2 = 33.5 rounds to 34
        assert_eq!(summary.global_progress, 34);
    }

    #[test]
    fn test_snapshot_settled() {
        let snapshot = BatchSnapshot {
            items: vec![
                item(1, UploadStatus::Done, 100),
                item(2, UploadStatus::Cancelled, 0),
            ],
            is_uploading: false,
            summary: BatchSummary::default(),
        };
        assert!(snapshot.is_settled());

        let snapshot = BatchSnapshot {
            items: vec![item(1, UploadStatus::Queued, 0)],
            is_uploading: false,
            summary: BatchSummary::default(),
        };
        assert!(!snapshot.is_settled());
    }
}
