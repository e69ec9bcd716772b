//! Structured error types for upload orchestration

use std::fmt;

/// Rejected input at a configuration boundary (no state change occurred)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        ValidationError {
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid input: {}", self.message)
    }
}

impl std::error::Error for ValidationError {}

/// A chunk-level network or protocol failure reported by the storage client.
///
/// `status_code` is the HTTP status when the server answered at all;
/// transport failures (connect, timeout) carry no status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferError {
    pub status_code: Option<u16>,
    pub message: String,
}

impl TransferError {
    /// Error from an HTTP response status
    pub fn from_status(status_code: u16, message: impl Into<String>) -> Self {
        TransferError {
            status_code: Some(status_code),
            message: message.into(),
        }
    }

    /// Transport-level error with no HTTP status (connect failure, timeout)
    pub fn network(message: impl Into<String>) -> Self {
        TransferError {
            status_code: None,
            message: message.into(),
        }
    }

    /// Server-side errors (5xx) are the only retryable class
    pub fn is_server_error(&self) -> bool {
        matches!(self.status_code, Some(code) if (500..=599).contains(&code))
    }

    /// Client errors (4xx) are never retried
    pub fn is_client_error(&self) -> bool {
        matches!(self.status_code, Some(code) if (400..=499).contains(&code))
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "Transfer failed (HTTP {}): {}", code, self.message),
            None => write!(f, "Transfer failed: {}", self.message),
        }
    }
}

impl std::error::Error for TransferError {}

/// Internal reason code attached to a terminal item failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Server-side error (5xx), retry budget exhausted
    Server,
    /// Client-side rejection (4xx)
    Client,
    /// Transport failure with no HTTP status
    Network,
    /// Local I/O failure while reading the source bytes
    Io,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Server => write!(f, "server"),
            FailureReason::Client => write!(f, "client"),
            FailureReason::Network => write!(f, "network"),
            FailureReason::Io => write!(f, "io"),
        }
    }
}

/// Terminal failure recorded on an item once no further attempt will be made
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub reason: FailureReason,
    pub message: String,
}

impl UploadFailure {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        UploadFailure {
            reason,
            message: message.into(),
        }
    }

    /// Local I/O failure while reading source bytes
    pub fn io(message: impl Into<String>) -> Self {
        UploadFailure::new(FailureReason::Io, message)
    }
}

impl fmt::Display for UploadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.reason)
    }
}

impl From<TransferError> for UploadFailure {
    fn from(e: TransferError) -> Self {
        let reason = if e.is_server_error() {
            FailureReason::Server
        } else if e.is_client_error() {
            FailureReason::Client
        } else {
            FailureReason::Network
        };
        UploadFailure::new(reason, e.to_string())
    }
}
