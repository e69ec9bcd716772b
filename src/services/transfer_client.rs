//! Chunked transfer driver for a single item
//!
//! Drives one queued item through the storage protocol: create the remote
//! resource, then append fixed-size chunks until the declared size is
//! committed. Failures are retried per request according to the
//! [`RetryPolicy`]; a cancellation signal is observed between chunks (and
//! after retry sleeps), aborting the remote resource best-effort.
//!
//! The driver never touches the item store. It reports byte progress and
//! attempt counts through an event channel and returns a single
//! [`TransferOutcome`].

use crate::model::error::UploadFailure;
use crate::model::selected_file::FileOrigin;
use crate::model::transfer_event::{ChunkProgress, TransferEvent};
use crate::model::upload_item::{ItemId, UploadItem};
use crate::services::retry_policy::RetryPolicy;
use crate::services::storage_client::{ResourceHandle, ResourceMeta, StorageClient};
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc::UnboundedSender;

/// Chunk size balancing request overhead against retry granularity:
/// a failed chunk re-sends only itself, never the whole file (6 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 6 * 1024 * 1024;

/// Signal used to cancel a running transfer between chunks
pub type CancelSignal = Arc<AtomicBool>;

/// Final result of one item's transfer
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Completed,
    Cancelled,
    Failed(UploadFailure),
}

/// Everything the driver needs to move one item, detached from the store
#[derive(Debug, Clone)]
pub struct TransferSpec {
    pub id: ItemId,
    pub name: String,
    pub size: u64,
    pub relative_path: String,
    pub origin: FileOrigin,
}

impl From<&UploadItem> for TransferSpec {
    fn from(item: &UploadItem) -> Self {
        TransferSpec {
            id: item.id,
            name: item.name.clone(),
            size: item.size,
            relative_path: item.relative_path.clone(),
            origin: item.origin.clone(),
        }
    }
}

/// Sequential reader over an item's bytes
enum ChunkSource {
    Disk(tokio::fs::File),
    Memory { data: Bytes, pos: usize },
}

impl ChunkSource {
    async fn open(origin: &FileOrigin) -> std::io::Result<Self> {
        match origin {
            FileOrigin::Disk(path) => Ok(ChunkSource::Disk(tokio::fs::File::open(path).await?)),
            FileOrigin::Memory(data) => Ok(ChunkSource::Memory {
                data: data.clone(),
                pos: 0,
            }),
        }
    }

    /// Read up to `max` bytes; returns an empty buffer at end of input.
    async fn next_chunk(&mut self, max: usize) -> std::io::Result<Bytes> {
        match self {
            ChunkSource::Disk(file) => {
                // Fill the buffer in a loop because async read() can
                // return partial data
                let mut buffer = vec![0u8; max];
                let mut total_read = 0;
                while total_read < max {
                    match file.read(&mut buffer[total_read..]).await? {
                        0 => break,
                        n => total_read += n,
                    }
                }
                buffer.truncate(total_read);
                Ok(Bytes::from(buffer))
            }
            ChunkSource::Memory { data, pos } => {
                let end = (*pos + max).min(data.len());
                let chunk = data.slice(*pos..end);
                *pos = end;
                Ok(chunk)
            }
        }
    }
}

/// Run one item's transfer to completion, cancellation, or terminal failure.
pub async fn run(
    client: Arc<dyn StorageClient>,
    spec: TransferSpec,
    chunk_size: u64,
    policy: RetryPolicy,
    events_tx: UnboundedSender<TransferEvent>,
    cancel: CancelSignal,
) -> TransferOutcome {
    if cancel.load(Ordering::SeqCst) {
        return TransferOutcome::Cancelled;
    }

    let meta = ResourceMeta {
        name: spec.name.clone(),
        size: spec.size,
        relative_path: spec.relative_path.clone(),
    };

    // Step 1: create the remote resource, retrying server errors
    let mut attempt: u32 = 1;
    let handle = loop {
        let _ = events_tx.send(TransferEvent::Attempt {
            item_id: spec.id,
            attempt,
        });
        match client.create(&meta).await {
            Ok(handle) => break handle,
            Err(e) => match policy.next_delay(&e, attempt) {
                Some(delay) => {
                    tracing::warn!(
                        "{}: create failed (attempt {}/{}): {}. Retrying in {:?}",
                        spec.id,
                        attempt,
                        policy.max_attempts(),
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    if cancel.load(Ordering::SeqCst) {
                        return TransferOutcome::Cancelled;
                    }
                    attempt += 1;
                }
                None => {
                    tracing::error!("{}: create failed terminally: {}", spec.id, e);
                    return TransferOutcome::Failed(e.into());
                }
            },
        }
    };

    let mut source = match ChunkSource::open(&spec.origin).await {
        Ok(source) => source,
        Err(e) => {
            release_remote(client.as_ref(), &handle).await;
            return TransferOutcome::Failed(UploadFailure::io(format!(
                "cannot open {}: {}",
                spec.name, e
            )));
        }
    };

    // Step 2: append chunks until the declared size is committed
    let mut offset: u64 = 0;
    while offset < spec.size {
        if cancel.load(Ordering::SeqCst) {
            release_remote(client.as_ref(), &handle).await;
            return TransferOutcome::Cancelled;
        }

        let want = (spec.size - offset).min(chunk_size) as usize;
        let chunk = match source.next_chunk(want).await {
            Ok(chunk) => chunk,
            Err(e) => {
                release_remote(client.as_ref(), &handle).await;
                return TransferOutcome::Failed(UploadFailure::io(format!(
                    "read error in {}: {}",
                    spec.name, e
                )));
            }
        };
        if chunk.is_empty() {
            release_remote(client.as_ref(), &handle).await;
            return TransferOutcome::Failed(UploadFailure::io(format!(
                "{} ended at {} bytes, expected {}",
                spec.name, offset, spec.size
            )));
        }
        let chunk_len = chunk.len() as u64;

        let mut attempt: u32 = 1;
        loop {
            let _ = events_tx.send(TransferEvent::Attempt {
                item_id: spec.id,
                attempt,
            });
            match client.append(&handle, offset, chunk.clone()).await {
                Ok(()) => break,
                Err(e) => match policy.next_delay(&e, attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            "{}: chunk at offset {} failed (attempt {}/{}): {}. Retrying in {:?}",
                            spec.id,
                            offset,
                            attempt,
                            policy.max_attempts(),
                            e,
                            delay
                        );
                        tokio::time::sleep(delay).await;
                        if cancel.load(Ordering::SeqCst) {
                            release_remote(client.as_ref(), &handle).await;
                            return TransferOutcome::Cancelled;
                        }
                        // The ack may have been lost in transit: skip the
                        // resend if the server already committed past this
                        // chunk.
                        if let Ok(committed) = client.status(&handle).await {
                            if committed >= offset + chunk_len {
                                tracing::debug!(
                                    "{}: server already holds offset {}, skipping resend",
                                    spec.id,
                                    committed
                                );
                                break;
                            }
                        }
                        attempt += 1;
                    }
                    None => {
                        // State is left on the server; incomplete resources
                        // expire there.
                        tracing::error!(
                            "{}: chunk at offset {} failed terminally: {}",
                            spec.id,
                            offset,
                            e
                        );
                        return TransferOutcome::Failed(e.into());
                    }
                },
            }
        }

        offset += chunk_len;
        let _ = events_tx.send(TransferEvent::Progress(ChunkProgress {
            item_id: spec.id,
            bytes_sent: offset,
            total_bytes: spec.size,
        }));
    }

    tracing::info!("{}: upload completed ({} bytes)", spec.id, spec.size);
    TransferOutcome::Completed
}

/// Best-effort release of a partial remote resource
async fn release_remote(client: &dyn StorageClient, handle: &ResourceHandle) {
    if let Err(e) = client.abort(handle).await {
        tracing::warn!("failed to release remote upload {}: {}", handle.upload_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::error::{FailureReason, TransferError};
    use crate::services::storage_client::MockStorageClient;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::mpsc;

    fn spec_from_memory(data: &'static [u8]) -> TransferSpec {
        TransferSpec {
            id: ItemId::from(1),
            name: "test.bin".into(),
            size: data.len() as u64,
            relative_path: "test.bin".into(),
            origin: FileOrigin::Memory(Bytes::from_static(data)),
        }
    }

    fn handle() -> ResourceHandle {
        ResourceHandle {
            upload_id: "up-1".into(),
        }
    }

    fn run_args() -> (
        UnboundedSender<TransferEvent>,
        mpsc::UnboundedReceiver<TransferEvent>,
        CancelSignal,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, rx, Arc::new(AtomicBool::new(false)))
    }

    fn drain_progress(rx: &mut mpsc::UnboundedReceiver<TransferEvent>) -> Vec<u64> {
        let mut sent = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let TransferEvent::Progress(p) = event {
                sent.push(p.bytes_sent);
            }
        }
        sent
    }

    #[tokio::test]
    async fn test_transfer_completes_in_chunks() {
        let mut mock = MockStorageClient::new();
        mock.expect_create().times(1).returning(|_| Ok(handle()));
        let offsets = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen = offsets.clone();
        mock.expect_append()
            .times(3)
            .returning(move |_, offset, chunk| {
                seen.lock().unwrap().push((offset, chunk.len()));
                Ok(())
            });

        let (tx, mut rx, cancel) = run_args();
        let spec = spec_from_memory(b"0123456789"); // 10 bytes, 4-byte chunks
        let outcome = run(Arc::new(mock), spec, 4, RetryPolicy::default(), tx, cancel).await;

        assert_eq!(outcome, TransferOutcome::Completed);
        assert_eq!(
            *offsets.lock().unwrap(),
            vec![(0, 4), (4, 4), (8, 2)]
        );
        // Progress reports are monotonically increasing bytes-sent
        assert_eq!(drain_progress(&mut rx), vec![4, 8, 10]);
    }

    #[tokio::test]
    async fn test_zero_byte_file_needs_no_appends() {
        let mut mock = MockStorageClient::new();
        mock.expect_create().times(1).returning(|_| Ok(handle()));
        mock.expect_append().times(0);

        let (tx, _rx, cancel) = run_args();
        let spec = spec_from_memory(b"");
        let outcome = run(Arc::new(mock), spec, 4, RetryPolicy::default(), tx, cancel).await;
        assert_eq!(outcome, TransferOutcome::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_persistent_503_fails_after_three_attempts() {
        let mut mock = MockStorageClient::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        mock.expect_create().times(3).returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(TransferError::from_status(503, "unavailable"))
        });

        let (tx, _rx, cancel) = run_args();
        let spec = spec_from_memory(b"data");
        let outcome = run(Arc::new(mock), spec, 4, RetryPolicy::default(), tx, cancel).await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match outcome {
            TransferOutcome::Failed(failure) => assert_eq!(failure.reason, FailureReason::Server),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_404_never_retries() {
        let mut mock = MockStorageClient::new();
        mock.expect_create()
            .times(1)
            .returning(|_| Err(TransferError::from_status(404, "no such endpoint")));

        let (tx, _rx, cancel) = run_args();
        let spec = spec_from_memory(b"data");
        let outcome = run(Arc::new(mock), spec, 4, RetryPolicy::default(), tx, cancel).await;

        match outcome {
            TransferOutcome::Failed(failure) => assert_eq!(failure.reason, FailureReason::Client),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_ack_reconciled_via_status() {
        let mut mock = MockStorageClient::new();
        mock.expect_create().times(1).returning(|_| Ok(handle()));
        // First chunk: server commits the bytes but the ack is lost (503)
        let first = Arc::new(AtomicBool::new(true));
        let flag = first.clone();
        mock.expect_append().times(2).returning(move |_, offset, _| {
            if offset == 0 && flag.swap(false, Ordering::SeqCst) {
                Err(TransferError::from_status(503, "ack lost"))
            } else {
                Ok(())
            }
        });
        // Status reveals the chunk actually landed
        mock.expect_status().times(1).returning(|_| Ok(4));

        let (tx, mut rx, cancel) = run_args();
        let spec = spec_from_memory(b"01234567"); // 8 bytes, 2 chunks of 4
        let outcome = run(Arc::new(mock), spec, 4, RetryPolicy::default(), tx, cancel).await;

        assert_eq!(outcome, TransferOutcome::Completed);
        assert_eq!(drain_progress(&mut rx), vec![4, 8]);
    }

    #[tokio::test]
    async fn test_cancel_between_chunks_aborts_remote() {
        let mut mock = MockStorageClient::new();
        mock.expect_create().times(1).returning(|_| Ok(handle()));
        let cancel: CancelSignal = Arc::new(AtomicBool::new(false));
        let trip = cancel.clone();
        // Cancellation lands while the first chunk is in flight
        mock.expect_append().times(1).returning(move |_, _, _| {
            trip.store(true, Ordering::SeqCst);
            Ok(())
        });
        mock.expect_abort().times(1).returning(|_| Ok(()));

        let (tx, _rx, _) = run_args();
        let spec = spec_from_memory(b"01234567");
        let outcome = run(Arc::new(mock), spec, 4, RetryPolicy::default(), tx, cancel).await;
        assert_eq!(outcome, TransferOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_makes_no_calls() {
        let mock = MockStorageClient::new();
        let (tx, _rx, cancel) = run_args();
        cancel.store(true, Ordering::SeqCst);

        let spec = spec_from_memory(b"data");
        let outcome = run(Arc::new(mock), spec, 4, RetryPolicy::default(), tx, cancel).await;
        assert_eq!(outcome, TransferOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_short_source_is_an_io_failure() {
        let mut mock = MockStorageClient::new();
        mock.expect_create().times(1).returning(|_| Ok(handle()));
        mock.expect_append().times(1).returning(|_, _, _| Ok(()));
        mock.expect_abort().times(1).returning(|_| Ok(()));

        let (tx, _rx, cancel) = run_args();
        // Declared size larger than the actual payload
        let mut spec = spec_from_memory(b"abcd");
        spec.size = 10;
        let outcome = run(Arc::new(mock), spec, 4, RetryPolicy::default(), tx, cancel).await;

        match outcome {
            TransferOutcome::Failed(failure) => assert_eq!(failure.reason, FailureReason::Io),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_disk_source_reads_chunks() {
        use std::io::Write;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("payload.bin");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"0123456789").unwrap();

        let mut source = ChunkSource::open(&FileOrigin::Disk(path)).await.unwrap();
        assert_eq!(source.next_chunk(4).await.unwrap().as_ref(), b"0123");
        assert_eq!(source.next_chunk(4).await.unwrap().as_ref(), b"4567");
        assert_eq!(source.next_chunk(4).await.unwrap().as_ref(), b"89");
        assert!(source.next_chunk(4).await.unwrap().is_empty());
    }
}
