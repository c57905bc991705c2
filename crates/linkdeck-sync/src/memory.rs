//! In-process reference server
//!
//! [`MemoryRemote`] resolves conflicts last-write-wins by revision: every
//! accepted push replaces the canonical snapshot and advances the revision
//! past both the stored and the pushed one. It also lets tests fail calls,
//! reject stale base revisions, and hold a fetch or a push in flight.

use crate::error::RemoteError;
use crate::remote::{PushRequest, RemoteStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore};

#[derive(Debug, Default)]
struct ServerState {
    document: Option<Value>,
    revision: u64,
    pushes: Vec<PushRequest>,
    fetches: usize,
    fail_fetches: usize,
    fail_pushes: usize,
    offline: bool,
    reject_stale: bool,
}

/// Reference last-write-wins remote
#[derive(Debug, Default)]
pub struct MemoryRemote {
    state: Mutex<ServerState>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    arrived: Notify,
    fetch_gate: Mutex<Option<Arc<Semaphore>>>,
    fetch_arrived: Notify,
}

impl MemoryRemote {
    /// Create an empty server
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a server already holding `document`
    ///
    /// The document's `revision` field, when numeric, becomes the server revision.
    #[must_use]
    pub fn with_document(document: Value) -> Self {
        let revision = document.get("revision").and_then(Value::as_u64).unwrap_or(0);
        let remote = Self::default();
        {
            let mut state = remote.state.lock();
            state.document = Some(document);
            state.revision = revision;
        }
        remote
    }

    /// Fail the next `count` fetches
    pub fn fail_next_fetches(&self, count: usize) {
        self.state.lock().fail_fetches = count;
    }

    /// Fail the next `count` pushes
    pub fn fail_next_pushes(&self, count: usize) {
        self.state.lock().fail_pushes = count;
    }

    /// Fail every call until switched back
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Reject pushes whose base revision is behind the server (409)
    pub fn set_reject_stale(&self, reject: bool) {
        self.state.lock().reject_stale = reject;
    }

    /// Park every push after it is recorded until [`Self::release_pushes`]
    pub fn hold_pushes(&self) {
        *self.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let held and future pushes through
    pub fn release_pushes(&self) {
        if let Some(gate) = self.gate.lock().take() {
            gate.close();
        }
    }

    /// Wait until a push has reached the server
    pub async fn wait_for_push(&self) {
        self.arrived.notified().await;
    }

    /// Park every fetch until [`Self::release_fetches`]
    pub fn hold_fetches(&self) {
        *self.fetch_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    /// Let held and future fetches through
    pub fn release_fetches(&self) {
        if let Some(gate) = self.fetch_gate.lock().take() {
            gate.close();
        }
    }

    /// Wait until a fetch has reached the server
    pub async fn wait_for_fetch(&self) {
        self.fetch_arrived.notified().await;
    }

    /// Every push received, in arrival order
    #[must_use]
    pub fn pushes(&self) -> Vec<PushRequest> {
        self.state.lock().pushes.clone()
    }

    /// Number of pushes received
    #[must_use]
    pub fn push_count(&self) -> usize {
        self.state.lock().pushes.len()
    }

    /// Number of fetches received
    #[must_use]
    pub fn fetch_count(&self) -> usize {
        self.state.lock().fetches
    }

    /// Current canonical document
    #[must_use]
    pub fn document(&self) -> Option<Value> {
        self.state.lock().document.clone()
    }

    /// Current server revision
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.state.lock().revision
    }

    fn check_online(offline: bool, fail_next: &mut usize) -> Result<(), RemoteError> {
        if offline {
            return Err(RemoteError::Unavailable("server offline".to_string()));
        }
        if *fail_next > 0 {
            *fail_next -= 1;
            return Err(RemoteError::status(503, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn fetch(&self) -> Result<Option<Value>, RemoteError> {
        self.state.lock().fetches += 1;
        self.fetch_arrived.notify_one();

        let gate = self.fetch_gate.lock().clone();
        if let Some(gate) = gate {
            let _ = gate.acquire().await;
        }

        let mut state = self.state.lock();
        let offline = state.offline;
        Self::check_online(offline, &mut state.fail_fetches)?;
        Ok(state.document.clone())
    }

    async fn push(&self, request: PushRequest) -> Result<Value, RemoteError> {
        self.state.lock().pushes.push(request.clone());
        self.arrived.notify_one();

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            // Closed by `release_pushes`; the error just means "go ahead".
            let _ = gate.acquire().await;
        }

        let mut state = self.state.lock();
        let offline = state.offline;
        Self::check_online(offline, &mut state.fail_pushes)?;
        if state.reject_stale && request.base_revision < state.revision {
            return Err(RemoteError::status(
                409,
                format!(
                    "base revision {} is behind {}",
                    request.base_revision, state.revision
                ),
            ));
        }

        let revision = state.revision.max(request.base_revision) + 1;
        let mut canonical = request.state;
        canonical.revision = revision;
        let document = serde_json::to_value(&canonical)
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        state.revision = revision;
        state.document = Some(document.clone());
        tracing::debug!(revision, "memory remote accepted push");
        Ok(document)
    }
}
