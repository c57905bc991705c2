//! Sync coordinator
//!
//! Owns the revision handshake with the remote store for one session.
//!
//! # Phases
//!
//! `Bootstrapping` once at startup, then `Idle -> Debouncing -> Pushing -> Idle`.
//!
//! - **Bootstrap** fetches the remote snapshot once. A meaningful remote wins;
//!   an empty remote is seeded from meaningful local state with base revision 0;
//!   an unreachable remote leaves local state alone.
//! - **Debounce** restarts a quiet-period timer on every local change, so a
//!   burst of edits produces one push.
//! - **Push** holds an async lock so at most one request is in flight. The
//!   response replaces local state wholesale unless a local change landed while
//!   the request was out; then only the revision is adopted and the change goes
//!   out with the next cycle.

use crate::error::{SyncError, SyncResult};
use crate::remote::{PushRequest, RemoteStore};
use linkdeck_cache::LocalCache;
use linkdeck_state::{normalize_state, WorkspaceState};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default quiet period before a push
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Coordinator phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    /// Waiting for the one-time reconciliation
    #[default]
    Bootstrapping,
    /// Nothing scheduled
    Idle,
    /// A push is scheduled after the quiet period
    Debouncing,
    /// A push is in flight
    Pushing,
}

/// Observable sync status
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SyncStatus {
    /// Current phase
    pub phase: SyncPhase,
    /// Last revision observed from the server
    pub revision: u64,
    /// Pushes the server accepted
    pub pushes_accepted: u64,
    /// Pushes that failed
    pub pushes_failed: u64,
    /// Pushes skipped because nothing changed since the last acknowledgement
    pub pushes_skipped: u64,
    /// Last failure, cleared by the next success
    pub last_error: Option<String>,
}

/// How bootstrap reconciled local and remote state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    /// Remote unreachable; local state kept
    Offline,
    /// Remote snapshot was meaningful and replaced local state
    RemoteAdopted {
        /// Adopted revision
        revision: u64,
    },
    /// Remote was empty; local state was pushed to seed it
    Seeded {
        /// Revision the server assigned
        revision: u64,
    },
    /// Remote was empty and the seeding push failed
    SeedFailed,
    /// Both sides empty
    Empty,
    /// Bootstrap already ran this session
    AlreadyBootstrapped,
}

/// Result of one push cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Server state replaced local state
    Accepted {
        /// New revision
        revision: u64,
    },
    /// Local state changed mid-flight; only the revision was adopted
    RevisionOnly {
        /// New revision
        revision: u64,
    },
    /// Content matches the last acknowledged push
    Unchanged,
    /// Bootstrap has not run yet
    NotBootstrapped,
}

impl PushOutcome {
    /// Revision adopted by this push, if any
    #[must_use]
    pub fn revision(self) -> Option<u64> {
        match self {
            Self::Accepted { revision } | Self::RevisionOnly { revision } => Some(revision),
            Self::Unchanged | Self::NotBootstrapped => None,
        }
    }
}

/// Debounced, single-flight sync with the remote store
///
/// Cloning is cheap and every clone drives the same session.
#[derive(Clone)]
pub struct SyncCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    cache: Arc<LocalCache>,
    remote: Arc<dyn RemoteStore>,
    debounce: Duration,
    push_lock: tokio::sync::Mutex<()>,
    timer: Mutex<Option<(u64, JoinHandle<()>)>>,
    timer_seq: AtomicU64,
    generation: AtomicU64,
    last_acked: Mutex<Option<String>>,
    bootstrap_started: AtomicBool,
    bootstrapped: AtomicBool,
    status: watch::Sender<SyncStatus>,
}

impl SyncCoordinator {
    /// Create a coordinator over `cache` and `remote`
    pub fn new(cache: Arc<LocalCache>, remote: Arc<dyn RemoteStore>, debounce: Duration) -> Self {
        let (status, _) = watch::channel(SyncStatus {
            revision: cache.revision(),
            ..SyncStatus::default()
        });
        Self {
            inner: Arc::new(Inner {
                cache,
                remote,
                debounce,
                push_lock: tokio::sync::Mutex::new(()),
                timer: Mutex::new(None),
                timer_seq: AtomicU64::new(0),
                generation: AtomicU64::new(0),
                last_acked: Mutex::new(None),
                bootstrap_started: AtomicBool::new(false),
                bootstrapped: AtomicBool::new(false),
                status,
            }),
        }
    }

    /// Local cache this coordinator writes server state into
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &Arc<LocalCache> {
        &self.inner.cache
    }

    /// Quiet period before a push
    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }

    /// Current status snapshot
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.inner.status.borrow().clone()
    }

    /// Watch status changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.inner.status.subscribe()
    }

    /// Whether bootstrap has completed
    #[must_use]
    pub fn is_bootstrapped(&self) -> bool {
        self.inner.bootstrapped.load(Ordering::SeqCst)
    }

    /// Count of local changes recorded so far
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    /// Record a local change and (re)start the debounce timer
    ///
    /// Call while holding [`LocalCache::write_guard`] so the change and the
    /// generation bump are seen together by an in-flight push. Changes made
    /// before bootstrap are not pushed on their own: bootstrap seeds them, and
    /// any that land after its snapshot are pushed once it finishes.
    pub fn local_changed(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if self.is_bootstrapped() {
            self.inner.schedule();
        } else {
            tracing::debug!("local change before bootstrap, not scheduling a push");
        }
    }

    /// Run the one-time startup reconciliation
    pub async fn bootstrap(&self) -> SyncResult<BootstrapOutcome> {
        if self.inner.bootstrap_started.swap(true, Ordering::SeqCst) {
            return Ok(BootstrapOutcome::AlreadyBootstrapped);
        }
        self.inner.set_phase(SyncPhase::Bootstrapping);

        let result = self.inner.reconcile().await;
        self.inner.bootstrapped.store(true, Ordering::SeqCst);
        if self.inner.has_unacked_changes() {
            tracing::debug!("local changes landed during bootstrap, scheduling a push");
            self.inner.schedule();
        }
        self.inner.settle();

        match &result {
            Ok(outcome) => tracing::info!(?outcome, "bootstrap finished"),
            Err(e) => tracing::warn!(error = %e, "bootstrap failed"),
        }
        result
    }

    /// Cancel the pending debounce and push now
    ///
    /// Waits for an in-flight push first; there is no mid-flight cancellation.
    pub async fn flush(&self) -> SyncResult<PushOutcome> {
        if let Some((_, timer)) = self.inner.timer.lock().take() {
            timer.abort();
        }
        self.inner.push_cycle().await
    }
}

impl fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("debounce", &self.inner.debounce)
            .field("generation", &self.generation())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl Inner {
    fn set_phase(&self, phase: SyncPhase) {
        self.status.send_modify(|status| status.phase = phase);
    }

    /// Leave `Pushing`/`Bootstrapping` for whatever comes next
    fn settle(&self) {
        let pending = self.timer.lock().is_some();
        let phase = if pending {
            SyncPhase::Debouncing
        } else {
            SyncPhase::Idle
        };
        self.set_phase(phase);
    }

    fn schedule(self: &Arc<Self>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime, push deferred until the next flush");
            return;
        };

        let seq = self.timer_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = Arc::clone(self);
        let mut slot = self.timer.lock();
        if let Some((_, previous)) = slot.take() {
            previous.abort();
        }
        let task = runtime.spawn(async move {
            tokio::time::sleep(inner.debounce).await;
            inner.fire(seq).await;
        });
        *slot = Some((seq, task));
        drop(slot);

        tracing::debug!(debounce_ms = self.debounce.as_millis() as u64, "push scheduled");
        self.status.send_modify(|status| {
            if status.phase != SyncPhase::Pushing {
                status.phase = SyncPhase::Debouncing;
            }
        });
    }

    async fn fire(&self, seq: u64) {
        {
            let mut slot = self.timer.lock();
            match slot.as_ref() {
                Some((current, _)) if *current == seq => {
                    // Detach: once the push starts, a reschedule must not abort it.
                    slot.take();
                }
                _ => return,
            }
        }
        if let Err(e) = self.push_cycle().await {
            tracing::warn!(error = %e, "debounced push failed");
        }
    }

    async fn push_cycle(&self) -> SyncResult<PushOutcome> {
        if !self.bootstrapped.load(Ordering::SeqCst) {
            return Ok(PushOutcome::NotBootstrapped);
        }
        let _in_flight = self.push_lock.lock().await;

        let (generation, state) = self.snapshot();

        let fingerprint = state.fingerprint();
        if self.last_acked.lock().as_deref() == Some(fingerprint.as_str()) {
            tracing::debug!("state matches last acknowledged push, skipping");
            self.status.send_modify(|status| status.pushes_skipped += 1);
            self.settle();
            return Ok(PushOutcome::Unchanged);
        }

        self.set_phase(SyncPhase::Pushing);
        let result = self.send(PushRequest::new(state), generation).await;
        self.settle();
        result
    }

    async fn send(&self, request: PushRequest, generation: u64) -> SyncResult<PushOutcome> {
        let base = request.base_revision;
        let result = match self.remote.push(request).await {
            Ok(response) => self.adopt(&response, base, generation),
            Err(e) => Err(e.into()),
        };

        match &result {
            Ok(outcome) => {
                tracing::info!(?outcome, base_revision = base, "push accepted");
                let revision = self.cache.revision();
                self.status.send_modify(|status| {
                    status.pushes_accepted += 1;
                    status.revision = revision;
                    status.last_error = None;
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, base_revision = base, "push failed, local state kept");
                let message = e.to_string();
                self.status.send_modify(|status| {
                    status.pushes_failed += 1;
                    status.last_error = Some(message);
                });
            }
        }
        result
    }

    fn adopt(
        &self,
        response: &serde_json::Value,
        base: u64,
        generation: u64,
    ) -> SyncResult<PushOutcome> {
        let (canonical, report) = normalize_state(response, self.cache.limits());
        if !report.is_clean() {
            tracing::warn!(?report, "server state needed normalization");
        }
        if canonical.revision < base {
            tracing::warn!(base, received = canonical.revision, "server revision went backwards");
            return Err(SyncError::RevisionRegressed {
                base,
                received: canonical.revision,
            });
        }

        let _write = self.cache.write_guard();
        let revision = canonical.revision;
        let outcome = if self.generation.load(Ordering::SeqCst) == generation {
            self.cache.replace_state(&canonical)?;
            PushOutcome::Accepted { revision }
        } else {
            tracing::debug!(revision, "local change during push, adopting revision only");
            self.cache.set_revision(revision)?;
            PushOutcome::RevisionOnly { revision }
        };
        *self.last_acked.lock() = Some(canonical.fingerprint());
        Ok(outcome)
    }

    /// Local state together with the generation it reflects
    fn snapshot(&self) -> (u64, WorkspaceState) {
        let _write = self.cache.write_guard();
        (self.generation.load(Ordering::SeqCst), self.cache.state())
    }

    /// Whether the cache holds content the server has not acknowledged
    ///
    /// False until something was acknowledged at least once.
    fn has_unacked_changes(&self) -> bool {
        let acked = self.last_acked.lock().clone();
        match acked {
            Some(fingerprint) => fingerprint != self.cache.state().fingerprint(),
            None => false,
        }
    }

    async fn reconcile(&self) -> SyncResult<BootstrapOutcome> {
        let started = self.generation.load(Ordering::SeqCst);
        let fetched = match self.remote.fetch().await {
            Ok(document) => document,
            Err(e) => {
                tracing::warn!(error = %e, "remote unreachable at bootstrap, staying local");
                let message = e.to_string();
                self.status
                    .send_modify(|status| status.last_error = Some(message));
                return Ok(BootstrapOutcome::Offline);
            }
        };
        let remote = fetched.map(|document| normalize_state(&document, self.cache.limits()).0);

        match remote {
            Some(remote) if remote.is_meaningful() => self.adopt_remote(&remote, started),
            remote => {
                let remote_revision = remote.map_or(0, |state| state.revision);
                let (generation, local) = self.snapshot();
                if local.is_meaningful() {
                    Ok(self.seed(local, generation).await)
                } else {
                    if remote_revision > local.revision {
                        self.cache.set_revision(remote_revision)?;
                        self.publish_revision();
                    }
                    Ok(BootstrapOutcome::Empty)
                }
            }
        }
    }

    /// Replace local state with a meaningful server snapshot
    ///
    /// The server is authoritative here, even over a higher local revision or
    /// over edits made while the fetch was in flight.
    fn adopt_remote(&self, remote: &WorkspaceState, started: u64) -> SyncResult<BootstrapOutcome> {
        let _write = self.cache.write_guard();
        let local_revision = self.cache.revision();
        if remote.revision < local_revision {
            tracing::warn!(
                local = local_revision,
                remote = remote.revision,
                "server revision is behind local, adopting server state"
            );
        }
        let edits = self.generation.load(Ordering::SeqCst).saturating_sub(started);
        if edits > 0 {
            tracing::warn!(edits, "local changes made during bootstrap replaced by server state");
        }
        self.cache.replace_state(remote)?;
        *self.last_acked.lock() = Some(remote.fingerprint());
        self.publish_revision();
        Ok(BootstrapOutcome::RemoteAdopted {
            revision: remote.revision,
        })
    }

    async fn seed(&self, local: WorkspaceState, generation: u64) -> BootstrapOutcome {
        tracing::info!("remote is empty, seeding it from local state");
        let request = PushRequest::new(local).with_base_revision(0);
        match self.send(request, generation).await {
            Ok(outcome) => BootstrapOutcome::Seeded {
                revision: outcome.revision().unwrap_or_else(|| self.cache.revision()),
            },
            Err(_) => BootstrapOutcome::SeedFailed,
        }
    }

    fn publish_revision(&self) {
        let revision = self.cache.revision();
        self.status.send_modify(|status| status.revision = revision);
    }
}
