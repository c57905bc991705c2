//! linkdeck State Model
//!
//! The canonical shape of workspace state and the rules that keep it valid
//! regardless of where it came from.
//!
//! # Core Concepts
//!
//! - [`WorkspaceState`]: the synchronized unit (links, pinned groups, keyed
//!   prompts/notes/profiles, active prompt key, revision)
//! - [`normalize`]: the single chokepoint every input passes through
//! - [`pool`]: the only legal moves between the free pool and pinned groups
//! - [`StatePatch`]: slice-level replacement, used for persistence and undo
//!
//! # Example
//!
//! ```rust,ignore
//! use linkdeck_state::{pool, InsertPosition, Limits, WorkspaceState};
//!
//! let limits = Limits::default();
//! let mut state = WorkspaceState::default();
//! pool::create_group(&mut state, "g1", "Daily", "2026-01-01T00:00:00Z", &limits)?;
//! pool::add_link(&mut state, "A", "https://a.example", InsertPosition::Head, &limits)?;
//! pool::promote(&mut state, "https://a.example", "g1", InsertPosition::Head, &limits)?;
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod key;
pub mod limits;
pub mod model;
pub mod normalize;
pub mod patch;
pub mod pool;

// Re-exports for convenience
pub use error::{PoolId, ValidationError, ValidationResult};
pub use key::{same_url, url_identity, PromptKey, PromptKeyError};
pub use limits::Limits;
pub use model::{AgentKind, LinkLocation, LinkProfile, LinkRecord, PinnedGroup, WorkspaceState};
pub use normalize::{normalize_state, NormalizationReport};
pub use patch::{SliceName, StatePatch};
pub use pool::InsertPosition;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
