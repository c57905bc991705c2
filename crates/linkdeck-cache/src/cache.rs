//! Per-slice local cache
//!
//! Each slice of [`WorkspaceState`] lives under its own storage key. Reads are
//! memoized in a moka cache; a successful write stores the persisted value in
//! the memo, so storage is only read on first access or after [`LocalCache::reload`].
//! Writes re-normalize the merged state, persist only the slices that changed,
//! and roll back already-written slices when a later one fails. After a failed
//! write the memo holds the value each slice actually has in storage.

use crate::error::{PersistError, PersistResult, StorageError};
use crate::store::SliceStore;
use linkdeck_state::normalize::{
    normalize_active_prompt_key, normalize_links, normalize_notes, normalize_pinned_groups,
    normalize_profiles, normalize_prompts, normalize_revision,
};
use linkdeck_state::{
    LinkProfile, LinkRecord, Limits, NormalizationReport, PinnedGroup, PromptKey, SliceName,
    StatePatch, WorkspaceState,
};
use moka::sync::Cache;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Default storage key prefix
pub const DEFAULT_KEY_PREFIX: &str = "linkdeck.";

/// Decoded value of one slice
#[derive(Debug, Clone, PartialEq)]
pub enum SliceValue {
    /// Free links
    Links(Vec<LinkRecord>),
    /// Pinned groups
    PinnedGroups(Vec<PinnedGroup>),
    /// Prompt bodies
    Prompts(BTreeMap<PromptKey, String>),
    /// Link notes
    LinkNotes(BTreeMap<PromptKey, String>),
    /// Link profiles
    LinkProfiles(BTreeMap<PromptKey, LinkProfile>),
    /// Active prompt key
    ActivePromptKey(PromptKey),
    /// Revision
    Revision(u64),
}

impl SliceValue {
    /// Value of `slice` in `state`
    #[must_use]
    pub fn of(state: &WorkspaceState, slice: SliceName) -> Self {
        match slice {
            SliceName::Links => Self::Links(state.links.clone()),
            SliceName::PinnedGroups => Self::PinnedGroups(state.pinned_groups.clone()),
            SliceName::Prompts => Self::Prompts(state.prompts.clone()),
            SliceName::LinkNotes => Self::LinkNotes(state.link_notes.clone()),
            SliceName::LinkProfiles => Self::LinkProfiles(state.link_profiles.clone()),
            SliceName::ActivePromptKey => Self::ActivePromptKey(state.active_prompt_key.clone()),
            SliceName::Revision => Self::Revision(state.revision),
        }
    }

    /// Normalize an untrusted stored document for `slice`
    #[must_use]
    pub fn from_json(slice: SliceName, value: &Value, limits: &Limits) -> Self {
        match slice {
            SliceName::Links => Self::Links(normalize_links(value, limits)),
            SliceName::PinnedGroups => Self::PinnedGroups(normalize_pinned_groups(value, limits)),
            SliceName::Prompts => Self::Prompts(normalize_prompts(value, limits)),
            SliceName::LinkNotes => Self::LinkNotes(normalize_notes(value, limits)),
            SliceName::LinkProfiles => Self::LinkProfiles(normalize_profiles(value, limits)),
            SliceName::ActivePromptKey => Self::ActivePromptKey(normalize_active_prompt_key(value)),
            SliceName::Revision => Self::Revision(normalize_revision(value)),
        }
    }

    /// Empty default for `slice`
    #[must_use]
    pub fn empty(slice: SliceName) -> Self {
        Self::of(&WorkspaceState::default(), slice)
    }

    /// Slice this value belongs to
    #[must_use]
    pub fn slice(&self) -> SliceName {
        match self {
            Self::Links(_) => SliceName::Links,
            Self::PinnedGroups(_) => SliceName::PinnedGroups,
            Self::Prompts(_) => SliceName::Prompts,
            Self::LinkNotes(_) => SliceName::LinkNotes,
            Self::LinkProfiles(_) => SliceName::LinkProfiles,
            Self::ActivePromptKey(_) => SliceName::ActivePromptKey,
            Self::Revision(_) => SliceName::Revision,
        }
    }

    /// Serialize for storage
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        match self {
            Self::Links(links) => serde_json::to_string(links),
            Self::PinnedGroups(groups) => serde_json::to_string(groups),
            Self::Prompts(map) | Self::LinkNotes(map) => serde_json::to_string(map),
            Self::LinkProfiles(profiles) => serde_json::to_string(profiles),
            Self::ActivePromptKey(key) => serde_json::to_string(key),
            Self::Revision(revision) => serde_json::to_string(revision),
        }
    }

    /// Store this value into the matching field of `state`
    pub fn write_into(&self, state: &mut WorkspaceState) {
        match self {
            Self::Links(links) => state.links.clone_from(links),
            Self::PinnedGroups(groups) => state.pinned_groups.clone_from(groups),
            Self::Prompts(map) => state.prompts.clone_from(map),
            Self::LinkNotes(map) => state.link_notes.clone_from(map),
            Self::LinkProfiles(profiles) => state.link_profiles.clone_from(profiles),
            Self::ActivePromptKey(key) => state.active_prompt_key = key.clone(),
            Self::Revision(revision) => state.revision = *revision,
        }
    }
}

/// Statistics for cache monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Storage reads performed since the cache was opened
    pub storage_reads: u64,
    /// Slice writes performed since the cache was opened
    pub storage_writes: u64,
}

/// Result of a successful write
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome {
    /// Normalized state now held by the cache
    pub state: WorkspaceState,
    /// Slices that were persisted
    pub changed: Vec<SliceName>,
    /// What normalization altered in the merged input
    pub report: NormalizationReport,
}

impl WriteOutcome {
    /// Whether any slice was written
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Durable local cache of workspace state
#[derive(Debug)]
pub struct LocalCache {
    store: Arc<dyn SliceStore>,
    prefix: String,
    limits: Limits,
    memo: Cache<SliceName, Arc<SliceValue>>,
    write_lock: ReentrantMutex<()>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl LocalCache {
    /// Open a cache over `store`
    ///
    /// Slices are normalized together once at open; if the stored slices
    /// contradict each other (a URL both free and pinned, keyed entries for
    /// unknown links) the repaired slices are written back.
    pub fn open(store: Arc<dyn SliceStore>, prefix: impl Into<String>, limits: Limits) -> Self {
        let cache = Self {
            store,
            prefix: prefix.into(),
            limits,
            memo: Cache::new(SliceName::ALL.len() as u64 * 2),
            write_lock: ReentrantMutex::new(()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        };
        cache.repair();
        cache
    }

    /// Limits applied to every write
    #[inline]
    #[must_use]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Storage key for `slice`
    #[must_use]
    pub fn key_for(&self, slice: SliceName) -> String {
        format!("{}{}", self.prefix, slice.storage_key())
    }

    /// Hold off other writers while a read-modify-write sequence runs
    ///
    /// The lock is reentrant, so writes made while holding the guard succeed.
    pub fn write_guard(&self) -> ReentrantMutexGuard<'_, ()> {
        self.write_lock.lock()
    }

    /// Memoized value of one slice
    ///
    /// A storage read failure yields the empty default without memoizing it,
    /// so the next read retries.
    #[must_use]
    pub fn read_slice(&self, slice: SliceName) -> Arc<SliceValue> {
        match self.memo.try_get_with(slice, || self.load(slice).map(Arc::new)) {
            Ok(value) => value,
            Err(e) => {
                let key = self.key_for(slice);
                tracing::warn!(%key, error = %e, "storage read failed, using default");
                Arc::new(SliceValue::empty(slice))
            }
        }
    }

    /// Assemble the full state from the memoized slices
    #[must_use]
    pub fn state(&self) -> WorkspaceState {
        let mut state = WorkspaceState::default();
        for slice in SliceName::ALL {
            self.read_slice(slice).write_into(&mut state);
        }
        state
    }

    /// Free links
    #[must_use]
    pub fn links(&self) -> Vec<LinkRecord> {
        self.project(SliceName::Links).links
    }

    /// Pinned groups
    #[must_use]
    pub fn pinned_groups(&self) -> Vec<PinnedGroup> {
        self.project(SliceName::PinnedGroups).pinned_groups
    }

    /// Prompt bodies
    #[must_use]
    pub fn prompts(&self) -> BTreeMap<PromptKey, String> {
        self.project(SliceName::Prompts).prompts
    }

    /// Link notes
    #[must_use]
    pub fn link_notes(&self) -> BTreeMap<PromptKey, String> {
        self.project(SliceName::LinkNotes).link_notes
    }

    /// Link profiles
    #[must_use]
    pub fn link_profiles(&self) -> BTreeMap<PromptKey, LinkProfile> {
        self.project(SliceName::LinkProfiles).link_profiles
    }

    /// Active prompt key
    #[must_use]
    pub fn active_prompt_key(&self) -> PromptKey {
        self.project(SliceName::ActivePromptKey).active_prompt_key
    }

    /// Last persisted revision
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.project(SliceName::Revision).revision
    }

    /// Merge `patch` into the current state, normalize, and persist
    ///
    /// Only slices whose normalized value changed are written. On failure no
    /// slice keeps a partial value: earlier slices of the same write are
    /// restored and reads keep returning the previous state.
    pub fn write_state(&self, patch: StatePatch) -> PersistResult<WriteOutcome> {
        let _guard = self.write_lock.lock();
        let current = self.state();
        let mut merged = current.clone();
        patch.apply_to(&mut merged);
        let (next, report) = merged.normalized(&self.limits);

        let changed = StatePatch::changed_slices(&current, &next);
        self.persist(&current, &next, &changed)?;

        Ok(WriteOutcome {
            state: next,
            changed,
            report,
        })
    }

    /// Replace every slice, revision included
    pub fn replace_state(&self, state: &WorkspaceState) -> PersistResult<WriteOutcome> {
        self.write_state(StatePatch::full(state))
    }

    /// Persist a new revision without touching data slices
    pub fn set_revision(&self, revision: u64) -> PersistResult<WriteOutcome> {
        self.write_state(StatePatch {
            revision: Some(revision),
            ..StatePatch::default()
        })
    }

    /// Drop every memoized slice so the next read hits storage
    pub fn reload(&self) {
        self.memo.invalidate_all();
    }

    /// Read/write counters
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            storage_reads: self.reads.load(Ordering::Relaxed),
            storage_writes: self.writes.load(Ordering::Relaxed),
        }
    }

    fn project(&self, slice: SliceName) -> WorkspaceState {
        let mut state = WorkspaceState::default();
        self.read_slice(slice).write_into(&mut state);
        state
    }

    fn load(&self, slice: SliceName) -> Result<SliceValue, StorageError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let key = self.key_for(slice);
        let value = match self.store.read(&key)? {
            Some(text) => match serde_json::from_str::<Value>(&text) {
                Ok(value) => SliceValue::from_json(slice, &value, &self.limits),
                Err(e) => {
                    tracing::warn!(%key, error = %e, "corrupt slice in storage, using default");
                    SliceValue::empty(slice)
                }
            },
            None => SliceValue::empty(slice),
        };
        Ok(value)
    }

    fn persist(
        &self,
        current: &WorkspaceState,
        next: &WorkspaceState,
        changed: &[SliceName],
    ) -> PersistResult<()> {
        let mut encoded = Vec::with_capacity(changed.len());
        for &slice in changed {
            let text = SliceValue::of(next, slice)
                .to_json_string()
                .map_err(|e| PersistError::Serialize {
                    slice,
                    message: e.to_string(),
                })?;
            encoded.push((slice, text));
        }

        let mut written = Vec::with_capacity(encoded.len());
        for (slice, text) in &encoded {
            let key = self.key_for(*slice);
            self.writes.fetch_add(1, Ordering::Relaxed);
            if let Err(source) = self.store.write(&key, text) {
                tracing::warn!(%key, error = %source, "slice write failed, rolling back");
                let stuck = self.roll_back(current, &written);
                for &touched in changed {
                    let held = if stuck.contains(&touched) { next } else { current };
                    self.memo.insert(touched, Arc::new(SliceValue::of(held, touched)));
                }
                return Err(PersistError::Storage {
                    slice: *slice,
                    source,
                });
            }
            written.push(*slice);
        }

        for &slice in changed {
            self.memo.insert(slice, Arc::new(SliceValue::of(next, slice)));
        }
        if !changed.is_empty() {
            tracing::debug!(slices = ?changed, "persisted state slices");
        }
        Ok(())
    }

    /// Restore `written` slices to `previous`, returning those that stayed new
    fn roll_back(&self, previous: &WorkspaceState, written: &[SliceName]) -> Vec<SliceName> {
        let mut stuck = Vec::new();
        for &slice in written {
            let key = self.key_for(slice);
            let restored = SliceValue::of(previous, slice)
                .to_json_string()
                .map_err(|e| e.to_string())
                .and_then(|text| self.store.write(&key, &text).map_err(|e| e.to_string()));
            if let Err(error) = restored {
                tracing::error!(%key, %error, "rollback failed, slice left at new value");
                stuck.push(slice);
            }
        }
        stuck
    }

    fn repair(&self) {
        let _guard = self.write_lock.lock();
        let stored = self.state();
        let (repaired, report) = stored.normalized(&self.limits);
        if repaired == stored {
            return;
        }
        tracing::info!(?report, "repairing inconsistent stored slices");
        let changed = StatePatch::changed_slices(&stored, &repaired);
        if let Err(e) = self.persist(&stored, &repaired, &changed) {
            tracing::warn!(error = %e, "could not write repaired slices");
        }
    }
}
