//! Error types for queue operations.

use crate::message::MessageId;
use chrono::Duration;
use thiserror::Error;

/// Comprehensive error type for all queue operations
///
/// A receive that waits out its timeout is not an error; it yields `Ok(None)`.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Store unavailable during {operation}: {message}")]
    StoreUnavailable { operation: String, message: String },

    #[error("Malformed message '{wire}': {reason}")]
    MalformedMessage { wire: String, reason: String },

    #[error("Batch enqueue failed at index {failed_index} after {} message(s): {source}", .enqueued.len())]
    PartialBatch {
        enqueued: Vec<MessageId>,
        failed_index: usize,
        #[source]
        source: Box<QueueError>,
    },

    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl QueueError {
    /// Wrap a store failure with the name of the operation that hit it
    pub fn store(operation: &str, error: StoreError) -> Self {
        Self::StoreUnavailable {
            operation: operation.to_string(),
            message: error.to_string(),
        }
    }

    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::StoreUnavailable { .. } => true,
            Self::MalformedMessage { .. } => false,
            Self::PartialBatch { source, .. } => source.is_transient(),
            Self::ConfigurationError(_) => false,
            Self::ValidationError(_) => false,
        }
    }

    /// Check if error should be retried
    pub fn should_retry(&self) -> bool {
        self.is_transient()
    }

    /// Get suggested retry delay
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::StoreUnavailable { .. } => Some(Duration::seconds(1)),
            Self::PartialBatch { source, .. } => source.retry_after(),
            _ => None,
        }
    }

    /// Ids that reached the store before a batch failed
    pub fn enqueued_ids(&self) -> &[MessageId] {
        match self {
            Self::PartialBatch { enqueued, .. } => enqueued,
            _ => &[],
        }
    }
}

/// Failures raised by a store adapter.
///
/// These never cross the public client API directly: the client converts them
/// into [`QueueError::StoreUnavailable`] tagged with the failing operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Command failed: {0}")]
    Command(String),

    #[error("Unexpected reply: {0}")]
    UnexpectedReply(String),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
