//! Queue Error Types

use crate::core::error_handling::ContextualError;
use crate::core::retry::RetryableError;
use crate::services::{InvalidQueueName, QueueName, Service};
use std::path::PathBuf;

/// Comment text a broker returns when a send hits the depth limit
pub const TARGET_LIMIT_MESSAGE: &str = "target limit reached";

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("target limit reached for {service}/{queue}")]
    TargetLimit { service: Service, queue: QueueName },

    #[error("no local queue supported for {service}: no relay reachable and no storage path")]
    NoLocalQueue { service: Service },

    #[error("Relay {address} refused {operation}: {comment}")]
    Relay {
        address: String,
        operation: String,
        comment: String,
    },

    #[error("HTTP request to {address} failed: {source}")]
    Http {
        address: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Queue storage error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Queue database error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Cannot encode or decode queue data: {message}")]
    Codec { message: String },

    #[error("Unknown delivery tag {tag} on {queue}")]
    UnknownDelivery { queue: QueueName, tag: u64 },

    #[error("Broker is closed")]
    Closed,

    #[error(transparent)]
    InvalidQueueName(#[from] InvalidQueueName),

    #[error("Operation failed: {message}")]
    OperationFailed { message: String },
}

impl BrokerError {
    pub fn is_target_limit(&self) -> bool {
        matches!(self, BrokerError::TargetLimit { .. })
    }

    /// Relay failures that make the broker fall back to embedded storage
    pub fn is_relay_failure(&self) -> bool {
        matches!(
            self,
            BrokerError::Http { .. } | BrokerError::Relay { .. } | BrokerError::Codec { .. }
        )
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BrokerError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn storage(path: impl Into<PathBuf>, source: rusqlite::Error) -> Self {
        BrokerError::Storage {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn poisoned(message: String) -> Self {
        BrokerError::OperationFailed { message }
    }
}

impl RetryableError for BrokerError {
    fn is_retryable(&self) -> bool {
        !matches!(
            self,
            BrokerError::TargetLimit { .. }
                | BrokerError::Closed
                | BrokerError::UnknownDelivery { .. }
                | BrokerError::InvalidQueueName(_)
        )
    }
}

impl ContextualError for BrokerError {
    fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            BrokerError::NoLocalQueue { .. } | BrokerError::InvalidQueueName(_)
        )
    }

    fn user_message(&self) -> Option<String> {
        self.is_user_actionable().then(|| match self {
            BrokerError::NoLocalQueue { .. } => format!(
                "{}. Set grid.mcp.address or grid.storage.path.",
                self
            ),
            _ => self.to_string(),
        })
    }
}

/// Result type for queue operations
pub type BrokerResult<T> = Result<T, BrokerError>;
