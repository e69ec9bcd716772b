//! Messages emitted by in-flight transfers
//!
//! The transfer client never mutates the item store directly; it reports
//! through these events, which a pump task funnels into the store.

use crate::model::upload_item::ItemId;

/// Byte-level progress for one item's transfer.
///
/// `bytes_sent` counts acknowledged bytes only and never decreases for a
/// given transfer, even across chunk retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkProgress {
    pub item_id: ItemId,
    pub bytes_sent: u64,
    pub total_bytes: u64,
}

impl ChunkProgress {
    /// Progress as a 0-100 percentage (100 only for a fully sent payload;
    /// empty payloads report 0 until completion marks them done).
    pub fn percentage(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        ((self.bytes_sent as f64 / self.total_bytes as f64) * 100.0).floor() as u8
    }
}

/// Event stream unit flowing from a transfer task to the item store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEvent {
    Progress(ChunkProgress),
    /// Attempt counter for the current request (1-based)
    Attempt { item_id: ItemId, attempt: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_basic() {
        let progress = ChunkProgress {
            item_id: ItemId::from(1),
            bytes_sent: 50,
            total_bytes: 200,
        };
        assert_eq!(progress.percentage(), 25);
    }

    #[test]
    fn test_percentage_zero_total() {
        let progress = ChunkProgress {
            item_id: ItemId::from(1),
            bytes_sent: 0,
            total_bytes: 0,
        };
        assert_eq!(progress.percentage(), 0);
    }

    #[test]
    fn test_percentage_complete() {
        let progress = ChunkProgress {
            item_id: ItemId::from(1),
            bytes_sent: 200,
            total_bytes: 200,
        };
        assert_eq!(progress.percentage(), 100);
    }
}
