//! Error types for the engine
//!
//! Every mutator failure is local and recoverable:
//! - validation failures leave state untouched
//! - persistence failures leave the cache equal to what storage holds
//! - undo failures mean the compensating action is gone

use crate::undo::UndoError;
use linkdeck_cache::PersistError;
use linkdeck_state::ValidationError;
use std::path::PathBuf;

/// Mutator failures
#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    /// The change was rejected before anything was written
    #[error("invalid change: {0}")]
    Validation(#[from] ValidationError),

    /// Storage refused the change
    #[error("change not saved: {0}")]
    Persist(#[from] PersistError),

    /// The undo ticket cannot be used
    #[error("undo unavailable: {0}")]
    Undo(#[from] UndoError),
}

impl MutationError {
    /// Check for a validation failure
    #[inline]
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check for a persistence failure
    #[inline]
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persist(_))
    }

    /// Validation detail, if this is a validation failure
    #[must_use]
    pub fn as_validation(&self) -> Option<&ValidationError> {
        match self {
            Self::Validation(e) => Some(e),
            _ => None,
        }
    }
}

/// Result type alias for mutators
pub type MutationResult<T> = Result<T, MutationError>;

/// Configuration failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for this schema
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid configuration for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: String,
        /// Why it was rejected
        reason: String,
    },
}

impl ConfigError {
    /// Create invalid-value error
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkdeck_state::PoolId;

    #[test]
    fn validation_classification() {
        let err: MutationError = ValidationError::capacity(PoolId::Free, 100).into();
        assert!(err.is_validation());
        assert!(!err.is_persistence());
        assert!(err.as_validation().is_some_and(ValidationError::is_capacity));
    }

    #[test]
    fn undo_error_display() {
        let err: MutationError = UndoError::Expired.into();
        assert_eq!(err.to_string(), "undo unavailable: undo window has expired");
    }
}
