//! Error types for remote sync

use linkdeck_cache::PersistError;
use std::time::Duration;

/// Failures talking to the remote store
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    /// Connection or protocol failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Server answered with a non-success status
    #[error("server returned status {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },

    /// Request exceeded its deadline
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Response body could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Remote is switched off or unreachable
    #[error("remote unavailable: {0}")]
    Unavailable(String),
}

impl RemoteError {
    /// Create status error
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Check if a later attempt could succeed without changing the request
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::Unavailable(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) => false,
        }
    }
}

/// Failures of a sync round trip
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The remote call failed
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The server's answer could not be stored locally
    #[error("failed to store server state: {0}")]
    Persist(#[from] PersistError),

    /// The server answered with a revision older than the one pushed
    #[error("server revision {received} is behind base revision {base}")]
    RevisionRegressed {
        /// Revision sent as the concurrency token
        base: u64,
        /// Revision the server returned
        received: u64,
    },
}

impl SyncError {
    /// Check if the next push may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote(e) => e.is_retryable(),
            Self::Persist(_) | Self::RevisionRegressed { .. } => false,
        }
    }
}

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
