//! Retry decisions for chunk-level transfer failures
//!
//! Uploads are a bounded, user-facing interactive operation, so the
//! schedule is a fixed short sequence rather than unbounded exponential
//! backoff.

use crate::model::error::TransferError;
use std::time::Duration;

/// Default delay schedule: two retries, 500ms then 1000ms
const DEFAULT_DELAYS_MS: [u64; 2] = [500, 1000];

/// Decides whether a failed request is retried and after what delay.
///
/// Only server-side errors (HTTP 500-599) retry; client errors and
/// transport failures without a status are terminal immediately.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    delays: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(delays: Vec<Duration>) -> Self {
        RetryPolicy { delays }
    }

    /// Total attempts a single request may consume (1 original + retries)
    pub fn max_attempts(&self) -> u32 {
        self.delays.len() as u32 + 1
    }

    /// Given the error and the 1-based attempt that just failed, returns
    /// the delay before the next attempt, or None if the failure is
    /// terminal.
    pub fn next_delay(&self, error: &TransferError, attempt: u32) -> Option<Duration> {
        if !error.is_server_error() {
            return None;
        }
        if attempt == 0 || attempt as usize > self.delays.len() {
            return None;
        }
        Some(self.delays[(attempt - 1) as usize])
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            delays: DEFAULT_DELAYS_MS
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        }
    }
}
