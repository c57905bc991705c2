//! linkdeck Core
//!
//! The session engine for an offline-first link workspace: validated
//! mutators over a normalized local cache, timed undo, and a debounced
//! revision-counted push to a server copy.
//!
//! # Core Concepts
//!
//! - [`SyncEngine`]: one per session; owns the cache, the coordinator and the undo slots
//! - [`MutationOutcome`]: new normalized state plus an optional [`UndoTicket`]
//! - [`UndoManager`]: one slot per [`UndoFamily`], each with a time-to-live
//! - [`EngineConfig`]: debounce, undo window, limits, storage and remote settings
//!
//! # Example
//!
//! ```rust,ignore
//! use linkdeck_core::{EngineConfig, SyncEngine};
//!
//! let engine = SyncEngine::new(EngineConfig::default(), store, remote)?;
//! engine.bootstrap().await?;
//!
//! let group = engine.create_group("Daily")?.value;
//! engine.add_link("A", "https://a.example")?;
//! let pinned = engine.promote("https://a.example", &group.id)?;
//! engine.undo(&pinned.undo.unwrap())?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod engine;
pub mod error;
pub mod undo;

// Re-exports for convenience
pub use config::{EngineConfig, RemoteConfig, StorageConfig};
pub use engine::{MutationOutcome, SyncEngine};
pub use error::{ConfigError, MutationError, MutationResult};
pub use undo::{MutationKind, UndoError, UndoFamily, UndoManager, UndoTicket};

pub use linkdeck_cache::{FileStore, MemoryStore, SliceStore};
pub use linkdeck_state::{
    AgentKind, InsertPosition, Limits, LinkProfile, LinkRecord, PinnedGroup, PromptKey,
    ValidationError, WorkspaceState,
};
pub use linkdeck_sync::{
    BootstrapOutcome, HttpRemote, MemoryRemote, PushOutcome, RemoteStore, SyncError, SyncPhase,
    SyncStatus,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
