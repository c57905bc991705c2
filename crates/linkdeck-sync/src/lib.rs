//! linkdeck Sync
//!
//! Mirrors the local cache to a server-held canonical copy through a
//! revision-counted optimistic-concurrency protocol.
//!
//! # Core Concepts
//!
//! - [`RemoteStore`]: fetch the canonical snapshot, push full state plus `baseRevision`
//! - [`HttpRemote`]: `GET`/`PUT` against one endpoint
//! - [`MemoryRemote`]: in-process last-write-wins reference server
//! - [`SyncCoordinator`]: bootstrap reconciliation, debounce, single-flight push
//!
//! # Example
//!
//! ```rust,ignore
//! use linkdeck_sync::{MemoryRemote, SyncCoordinator, DEFAULT_DEBOUNCE};
//!
//! let sync = SyncCoordinator::new(cache, Arc::new(MemoryRemote::new()), DEFAULT_DEBOUNCE);
//! sync.bootstrap().await?;
//! sync.local_changed();
//! sync.flush().await?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod coordinator;
pub mod error;
pub mod http;
pub mod memory;
pub mod remote;

// Re-exports for convenience
pub use coordinator::{
    BootstrapOutcome, PushOutcome, SyncCoordinator, SyncPhase, SyncStatus, DEFAULT_DEBOUNCE,
};
pub use error::{RemoteError, SyncError, SyncResult};
pub use http::{HttpRemote, DEFAULT_TIMEOUT};
pub use memory::MemoryRemote;
pub use remote::{PushRequest, RemoteStore};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
