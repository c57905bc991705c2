//! Error types for the local cache
//!
//! Storage failures never escape as panics: the cache reports them as values
//! and keeps its memoized view equal to what storage actually holds.

use linkdeck_state::SliceName;

/// Errors raised by a [`crate::SliceStore`]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Storage is disabled or unreachable
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Writing would exceed the storage quota
    #[error("quota exceeded writing '{key}': need {needed} bytes, {available} available")]
    QuotaExceeded {
        /// Key being written
        key: String,
        /// Bytes the write needs
        needed: usize,
        /// Bytes left
        available: usize,
    },

    /// IO error on a file-backed store
    #[error("io error on '{key}': {source}")]
    Io {
        /// Key being accessed
        key: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Create IO error for key
    pub fn io_error(key: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            key: key.into(),
            source,
        }
    }
}

/// Errors persisting a state write
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// A slice could not be written
    #[error("failed to persist slice {slice}: {source}")]
    Storage {
        /// Slice that failed
        slice: SliceName,
        /// Storage failure
        #[source]
        source: StorageError,
    },

    /// A slice could not be serialized
    #[error("failed to serialize slice {slice}: {message}")]
    Serialize {
        /// Slice that failed
        slice: SliceName,
        /// Serializer message
        message: String,
    },
}

impl PersistError {
    /// Slice the failure refers to
    #[inline]
    #[must_use]
    pub fn slice(&self) -> SliceName {
        match self {
            Self::Storage { slice, .. } | Self::Serialize { slice, .. } => *slice,
        }
    }
}

/// Result type alias for cache writes
pub type PersistResult<T> = Result<T, PersistError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_error_display() {
        let err = StorageError::QuotaExceeded {
            key: "linkdeck.links".to_string(),
            needed: 10,
            available: 4,
        };
        assert_eq!(
            err.to_string(),
            "quota exceeded writing 'linkdeck.links': need 10 bytes, 4 available"
        );
    }

    #[test]
    fn persist_error_names_slice() {
        let err = PersistError::Storage {
            slice: SliceName::PinnedGroups,
            source: StorageError::Unavailable("disabled".to_string()),
        };
        assert_eq!(err.slice(), SliceName::PinnedGroups);
        assert!(err.to_string().contains("pinned_groups"));
    }
}
