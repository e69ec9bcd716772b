//! The canonical record for one queued upload

use crate::model::error::UploadFailure;
use crate::model::selected_file::{FileOrigin, SelectedFile};
use crate::model::upload_status::UploadStatus;

/// Unique identifier for a queued item.
///
/// Assigned from a monotonic counter at enqueue time; removing and
/// re-adding the same logical file yields a new id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(u64);

impl ItemId {
    pub(crate) fn new(id: u64) -> Self {
        ItemId(id)
    }
}

impl From<u64> for ItemId {
    fn from(id: u64) -> Self {
        ItemId(id)
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

/// One file queued for transfer.
///
/// The item store is the single source of truth for these records; the
/// scheduler and transfer client only ever hold transient in-flight
/// handles, never authoritative status.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadItem {
    pub id: ItemId,
    pub name: String,
    /// Total size in bytes
    pub size: u64,
    /// Path within the uploaded folder tree, possibly equal to `name`
    pub relative_path: String,
    /// Where the bytes are read from during transfer
    pub origin: FileOrigin,
    pub status: UploadStatus,
    /// 0-100; monotonically non-decreasing while uploading, reset to 0 on
    /// cancellation, 100 exactly when `status == Done`
    pub progress: u8,
    /// Present only when `status == Error`
    pub failure: Option<UploadFailure>,
    /// Attempts made for the current request (create or chunk append)
    pub attempt: u32,
}

impl UploadItem {
    pub(crate) fn new(id: ItemId, file: SelectedFile) -> Self {
        UploadItem {
            id,
            name: file.name,
            size: file.size,
            relative_path: file.relative_path,
            origin: file.origin,
            status: UploadStatus::Queued,
            progress: 0,
            failure: None,
            attempt: 0,
        }
    }

    /// Error message for display, if the item failed
    pub fn error_message(&self) -> Option<&str> {
        self.failure.as_ref().map(|f| f.message.as_str())
    }
}
