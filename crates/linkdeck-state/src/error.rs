//! Validation errors
//!
//! Raised by pool operations and key checks before anything is mutated, so a
//! failed operation is always a no-op.

use std::fmt;

/// Which pool a capacity error refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PoolId {
    /// The free link pool
    Free,
    /// The list of pinned groups itself
    Groups,
    /// The links of one pinned group
    Group(String),
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => f.write_str("free links"),
            Self::Groups => f.write_str("pinned groups"),
            Self::Group(id) => write!(f, "group '{id}'"),
        }
    }
}

/// Validation failures reported to the caller
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// URL is not an absolute http(s) URL
    #[error("malformed url: '{0}'")]
    InvalidUrl(String),

    /// URL already lives somewhere in the workspace
    #[error("duplicate url: '{0}'")]
    DuplicateUrl(String),

    /// Destination pool is full
    #[error("capacity exceeded for {pool} (limit {limit})")]
    CapacityExceeded {
        /// Pool that is full
        pool: PoolId,
        /// Its ceiling
        limit: usize,
    },

    /// No link with this URL
    #[error("link not found: '{0}'")]
    LinkNotFound(String),

    /// No group with this id
    #[error("group not found: '{0}'")]
    GroupNotFound(String),

    /// A group with this id already exists
    #[error("duplicate group id: '{0}'")]
    DuplicateGroup(String),

    /// Link is already in the target group
    #[error("'{url}' is already pinned in group '{group}'")]
    AlreadyInGroup {
        /// Link URL
        url: String,
        /// Group id
        group: String,
    },

    /// Prompt key does not resolve to a known link
    #[error("unknown prompt key: '{0}'")]
    UnknownPromptKey(String),
}

impl ValidationError {
    /// Create capacity error
    #[inline]
    #[must_use]
    pub fn capacity(pool: PoolId, limit: usize) -> Self {
        Self::CapacityExceeded { pool, limit }
    }

    /// Check for a capacity error
    #[inline]
    #[must_use]
    pub fn is_capacity(&self) -> bool {
        matches!(self, Self::CapacityExceeded { .. })
    }
}

/// Result type alias for validated operations
pub type ValidationResult<T> = Result<T, ValidationError>;
