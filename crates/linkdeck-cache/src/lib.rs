//! linkdeck Local Cache
//!
//! Durable, per-slice persistence of workspace state with memoized reads.
//!
//! # Core Concepts
//!
//! - [`SliceStore`]: string storage addressed by key ([`MemoryStore`], [`FileStore`])
//! - [`LocalCache`]: normalizes on every write, persists only changed slices,
//!   and degrades a corrupt or missing slice to its empty default
//!
//! # Example
//!
//! ```rust,ignore
//! use linkdeck_cache::{LocalCache, MemoryStore, DEFAULT_KEY_PREFIX};
//! use linkdeck_state::{Limits, StatePatch};
//! use std::sync::Arc;
//!
//! let cache = LocalCache::open(Arc::new(MemoryStore::new()), DEFAULT_KEY_PREFIX, Limits::default());
//! let outcome = cache.write_state(StatePatch::default())?;
//! assert!(outcome.is_noop());
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod cache;
pub mod error;
pub mod store;

// Re-exports for convenience
pub use cache::{CacheStats, LocalCache, SliceValue, WriteOutcome, DEFAULT_KEY_PREFIX};
pub use error::{PersistError, PersistResult, StorageError};
pub use store::{FileStore, MemoryStore, SliceStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
