//! Remote store contract
//!
//! The server holds the canonical snapshot. Clients fetch it once at bootstrap
//! and push the full state with the last revision they observed; the server
//! answers with its resulting canonical state and new revision.

use crate::error::RemoteError;
use async_trait::async_trait;
use linkdeck_state::WorkspaceState;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of a push: the full state plus its concurrency token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    /// Full local state
    #[serde(flatten)]
    pub state: WorkspaceState,
    /// Last revision observed from the server
    pub base_revision: u64,
}

impl PushRequest {
    /// Push `state` using its own revision as the base
    #[must_use]
    pub fn new(state: WorkspaceState) -> Self {
        let base_revision = state.revision;
        Self {
            state,
            base_revision,
        }
    }

    /// Override the base revision
    #[inline]
    #[must_use]
    pub fn with_base_revision(mut self, base_revision: u64) -> Self {
        self.base_revision = base_revision;
        self
    }
}

/// Server-held canonical copy of the workspace
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch the canonical snapshot, `None` when nothing was synced yet
    async fn fetch(&self) -> Result<Option<Value>, RemoteError>;

    /// Push a full state; returns the server's canonical state and revision
    async fn push(&self, request: PushRequest) -> Result<Value, RemoteError>;
}
