//! The session engine
//!
//! [`SyncEngine`] owns the local cache, the sync coordinator and the undo
//! slots for one session. Every mutator follows the same path:
//!
//! 1. Take the cache write guard and read the current state
//! 2. Apply a pool operation to a draft copy (validation errors stop here)
//! 3. Persist the slices that changed after normalization
//! 4. Arm an undo with the pre-mutation value of those slices
//! 5. Tell the coordinator so the debounce timer restarts

use crate::config::EngineConfig;
use crate::error::{ConfigError, MutationResult};
use crate::undo::{MutationKind, UndoFamily, UndoManager, UndoTicket};
use chrono::{SecondsFormat, Utc};
use linkdeck_cache::{LocalCache, SliceStore};
use linkdeck_state::pool;
use linkdeck_state::{
    InsertPosition, Limits, LinkProfile, LinkRecord, NormalizationReport, PinnedGroup, PromptKey,
    SliceName, StatePatch, ValidationResult, WorkspaceState,
};
use linkdeck_sync::{
    BootstrapOutcome, PushOutcome, RemoteStore, SyncCoordinator, SyncResult, SyncStatus,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;
use ulid::Ulid;

/// Result of a successful mutator call
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome<T = ()> {
    /// Operation-specific value (the added record, the removed group, ...)
    pub value: T,
    /// Normalized state after the change
    pub state: WorkspaceState,
    /// Slices that were persisted
    pub changed: Vec<SliceName>,
    /// What normalization altered
    pub report: NormalizationReport,
    /// Compensating action, for destructive mutations
    pub undo: Option<UndoTicket>,
}

impl<T> MutationOutcome<T> {
    /// Whether the call left state as it was
    #[inline]
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}

/// One session's workspace engine
#[derive(Debug)]
pub struct SyncEngine {
    config: EngineConfig,
    cache: Arc<LocalCache>,
    sync: SyncCoordinator,
    undo: UndoManager,
}

impl SyncEngine {
    /// Create an engine over `store` and `remote`
    ///
    /// Validates `config`, then opens the local cache. Nothing is fetched
    /// until [`bootstrap`](Self::bootstrap) runs.
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn SliceStore>,
        remote: Arc<dyn RemoteStore>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache = Arc::new(LocalCache::open(
            store,
            config.storage.key_prefix.clone(),
            config.limits,
        ));
        let sync = SyncCoordinator::new(Arc::clone(&cache), remote, config.debounce());
        let undo = UndoManager::new(config.undo_ttl());
        tracing::debug!(revision = cache.revision(), "engine opened");

        Ok(Self {
            config,
            cache,
            sync,
            undo,
        })
    }

    // Accessors

    /// Engine configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Active limits
    #[inline]
    #[must_use]
    pub fn limits(&self) -> &Limits {
        self.cache.limits()
    }

    /// Underlying cache
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &Arc<LocalCache> {
        &self.cache
    }

    /// Underlying coordinator
    #[inline]
    #[must_use]
    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    /// Full normalized state
    #[must_use]
    pub fn state(&self) -> WorkspaceState {
        self.cache.state()
    }

    /// Free links
    #[must_use]
    pub fn links(&self) -> Vec<LinkRecord> {
        self.cache.links()
    }

    /// Pinned groups
    #[must_use]
    pub fn pinned_groups(&self) -> Vec<PinnedGroup> {
        self.cache.pinned_groups()
    }

    /// Prompt bodies
    #[must_use]
    pub fn prompts(&self) -> BTreeMap<PromptKey, String> {
        self.cache.prompts()
    }

    /// Prompt body for `key`, empty when none is stored
    #[must_use]
    pub fn prompt(&self, key: &PromptKey) -> String {
        self.cache.prompts().remove(key).unwrap_or_default()
    }

    /// Link notes
    #[must_use]
    pub fn link_notes(&self) -> BTreeMap<PromptKey, String> {
        self.cache.link_notes()
    }

    /// Link profiles
    #[must_use]
    pub fn link_profiles(&self) -> BTreeMap<PromptKey, LinkProfile> {
        self.cache.link_profiles()
    }

    /// Key currently being edited
    #[must_use]
    pub fn active_prompt_key(&self) -> PromptKey {
        self.cache.active_prompt_key()
    }

    /// Last revision observed from the server
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.cache.revision()
    }

    /// Current sync status
    #[must_use]
    pub fn status(&self) -> SyncStatus {
        self.sync.status()
    }

    /// Watch sync status changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.sync.subscribe()
    }

    /// Undo currently armed for `family`
    #[must_use]
    pub fn pending_undo(&self, family: UndoFamily) -> Option<UndoTicket> {
        self.undo.pending(family)
    }

    // Sync

    /// Reconcile with the server once per session
    pub async fn bootstrap(&self) -> SyncResult<BootstrapOutcome> {
        self.sync.bootstrap().await
    }

    /// Push pending changes now
    pub async fn flush(&self) -> SyncResult<PushOutcome> {
        self.sync.flush().await
    }

    // Links

    /// Add a link at the head of the free pool
    pub fn add_link(&self, label: &str, url: &str) -> MutationResult<MutationOutcome<LinkRecord>> {
        self.add_link_at(label, url, InsertPosition::Head)
    }

    /// Add a link at `position` in the free pool
    pub fn add_link_at(
        &self,
        label: &str,
        url: &str,
        position: InsertPosition,
    ) -> MutationResult<MutationOutcome<LinkRecord>> {
        self.mutate(None, |state, limits| {
            pool::add_link(state, label, url, position, limits)
        })
    }

    /// Edit a link's label and/or URL wherever it lives
    pub fn update_link(
        &self,
        url: &str,
        label: Option<&str>,
        new_url: Option<&str>,
    ) -> MutationResult<MutationOutcome<LinkRecord>> {
        self.mutate(Some(MutationKind::UpdateLink), |state, limits| {
            pool::update_link(state, url, label, new_url, limits)
        })
    }

    /// Remove a free link
    pub fn remove_link(&self, url: &str) -> MutationResult<MutationOutcome<LinkRecord>> {
        self.mutate(Some(MutationKind::RemoveLink), |state, _| {
            pool::remove_link(state, url)
        })
    }

    /// Remove a link from a pinned group
    pub fn remove_pinned_link(
        &self,
        group_id: &str,
        url: &str,
    ) -> MutationResult<MutationOutcome<LinkRecord>> {
        self.mutate(Some(MutationKind::RemovePinnedLink), |state, _| {
            pool::remove_pinned_link(state, group_id, url)
        })
    }

    /// Reorder a link inside its pool
    pub fn move_link(&self, url: &str, position: InsertPosition) -> MutationResult<MutationOutcome> {
        self.mutate(None, |state, _| pool::move_link(state, url, position))
    }

    // Groups

    /// Create an empty pinned group with a fresh id
    pub fn create_group(&self, label: &str) -> MutationResult<MutationOutcome<PinnedGroup>> {
        let id = Ulid::new().to_string();
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.mutate(None, |state, limits| {
            pool::create_group(state, &id, label, &created_at, limits)
        })
    }

    /// Rename a pinned group
    pub fn rename_group(&self, id: &str, label: &str) -> MutationResult<MutationOutcome> {
        self.mutate(None, |state, limits| pool::rename_group(state, id, label, limits))
    }

    /// Delete a group, returning its links to the free pool
    pub fn delete_group(&self, id: &str) -> MutationResult<MutationOutcome<PinnedGroup>> {
        self.mutate(Some(MutationKind::DeleteGroup), |state, limits| {
            pool::delete_group(state, id, limits)
        })
    }

    /// Pin a link into `group_id` at the head
    pub fn promote(&self, url: &str, group_id: &str) -> MutationResult<MutationOutcome> {
        self.promote_at(url, group_id, InsertPosition::Head)
    }

    /// Pin a link into `group_id` at `position`
    pub fn promote_at(
        &self,
        url: &str,
        group_id: &str,
        position: InsertPosition,
    ) -> MutationResult<MutationOutcome> {
        self.mutate(Some(MutationKind::Promote), |state, limits| {
            pool::promote(state, url, group_id, position, limits)
        })
    }

    /// Unpin a link from `group_id` to the head of the free pool
    pub fn demote(&self, url: &str, group_id: &str) -> MutationResult<MutationOutcome> {
        self.demote_at(url, group_id, InsertPosition::Head)
    }

    /// Unpin a link from `group_id` to `position` in the free pool
    pub fn demote_at(
        &self,
        url: &str,
        group_id: &str,
        position: InsertPosition,
    ) -> MutationResult<MutationOutcome> {
        self.mutate(Some(MutationKind::Demote), |state, limits| {
            pool::demote(state, url, group_id, position, limits)
        })
    }

    // Bulk

    /// Empty the free pool; returns how many links went
    pub fn clear_links(&self) -> MutationResult<MutationOutcome<usize>> {
        self.mutate(Some(MutationKind::ClearLinks), |state, _| {
            Ok(pool::clear_links(state))
        })
    }

    /// Delete every group; returns how many links went back to the free pool
    pub fn clear_groups(&self) -> MutationResult<MutationOutcome<usize>> {
        self.mutate(Some(MutationKind::ClearGroups), |state, limits| {
            pool::clear_groups(state, limits)
        })
    }

    /// Reset every data slice
    ///
    /// The returned ticket restores prompts too, so any armed prompt undo is
    /// dropped.
    pub fn clear_all(&self) -> MutationResult<MutationOutcome> {
        let _write = self.cache.write_guard();
        let outcome = self.mutate(Some(MutationKind::ClearAll), |state, _| {
            pool::clear_all(state);
            Ok(())
        })?;
        if outcome.undo.is_some() {
            self.undo.discard(UndoFamily::Prompts);
        }
        Ok(outcome)
    }

    // Prompts, notes and profiles

    /// Store a prompt body typed by the user
    ///
    /// An empty body removes the entry.
    pub fn set_prompt(&self, key: &PromptKey, body: &str) -> MutationResult<MutationOutcome> {
        self.mutate(None, |state, _| put_text(state, Text::Prompt, key, body))
    }

    /// Replace a prompt with a suggested rewrite
    pub fn apply_prompt_rewrite(
        &self,
        key: &PromptKey,
        body: &str,
    ) -> MutationResult<MutationOutcome> {
        self.mutate(Some(MutationKind::RewritePrompt), |state, _| {
            put_text(state, Text::Prompt, key, body)
        })
    }

    /// Erase a prompt
    pub fn clear_prompt(&self, key: &PromptKey) -> MutationResult<MutationOutcome> {
        self.mutate(Some(MutationKind::ClearPrompt), |state, _| {
            put_text(state, Text::Prompt, key, "")
        })
    }

    /// Store a link note; an empty note removes the entry
    pub fn set_note(&self, key: &PromptKey, note: &str) -> MutationResult<MutationOutcome> {
        self.mutate(Some(MutationKind::SetNote), |state, _| {
            put_text(state, Text::Note, key, note)
        })
    }

    /// Store a link profile; an empty profile removes the entry
    pub fn set_profile(
        &self,
        key: &PromptKey,
        profile: LinkProfile,
    ) -> MutationResult<MutationOutcome> {
        self.mutate(Some(MutationKind::SetProfile), |state, _| {
            pool::check_prompt_key(state, key)?;
            if profile.is_empty() {
                state.link_profiles.remove(key);
            } else {
                state.link_profiles.insert(key.clone(), profile);
            }
            Ok(())
        })
    }

    /// Switch the key being edited
    pub fn set_active_prompt_key(&self, key: &PromptKey) -> MutationResult<MutationOutcome> {
        self.mutate(None, |state, _| {
            pool::check_prompt_key(state, key)?;
            state.active_prompt_key = key.clone();
            Ok(())
        })
    }

    // Undo

    /// Run the compensating action behind `ticket`
    ///
    /// Restores the captured slices through the cache, which schedules a
    /// push like any other change. If storage refuses the restore the ticket
    /// stays armed.
    pub fn undo(&self, ticket: &UndoTicket) -> MutationResult<MutationOutcome> {
        let _write = self.cache.write_guard();
        let snapshot = self.undo.take(ticket)?;

        let written = match self.cache.write_state(snapshot.clone()) {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!(kind = %ticket.kind, error = %e, "undo not saved");
                self.undo.restore(ticket.clone(), snapshot);
                return Err(e.into());
            }
        };
        if !written.is_noop() {
            self.sync.local_changed();
        }
        tracing::debug!(kind = %ticket.kind, changed = ?written.changed, "undo applied");

        Ok(MutationOutcome {
            value: (),
            state: written.state,
            changed: written.changed,
            report: written.report,
            undo: None,
        })
    }

    /// Run `op` against a draft of the current state and persist the result
    fn mutate<T>(
        &self,
        kind: Option<MutationKind>,
        op: impl FnOnce(&mut WorkspaceState, &Limits) -> ValidationResult<T>,
    ) -> MutationResult<MutationOutcome<T>> {
        let _write = self.cache.write_guard();
        let before = self.cache.state();
        let mut draft = before.clone();
        let value = op(&mut draft, self.cache.limits())?;

        let patch = StatePatch::diff(&before, &draft).without_revision();
        if patch.is_empty() {
            return Ok(MutationOutcome {
                value,
                state: before,
                changed: Vec::new(),
                report: NormalizationReport::default(),
                undo: None,
            });
        }

        let written = match self.cache.write_state(patch) {
            Ok(written) => written,
            Err(e) => {
                tracing::warn!(?kind, error = %e, "change not saved");
                return Err(e.into());
            }
        };
        if written.is_noop() {
            return Ok(MutationOutcome {
                value,
                state: written.state,
                changed: written.changed,
                report: written.report,
                undo: None,
            });
        }

        let undo = kind.map(|kind| {
            let slices: Vec<SliceName> = written
                .changed
                .iter()
                .copied()
                .filter(|slice| *slice != SliceName::Revision)
                .collect();
            self.undo.arm(kind, StatePatch::capture(&before, &slices))
        });
        self.sync.local_changed();
        tracing::debug!(?kind, changed = ?written.changed, "change saved");

        Ok(MutationOutcome {
            value,
            state: written.state,
            changed: written.changed,
            report: written.report,
            undo,
        })
    }
}

#[derive(Clone, Copy)]
enum Text {
    Prompt,
    Note,
}

fn put_text(
    state: &mut WorkspaceState,
    which: Text,
    key: &PromptKey,
    body: &str,
) -> ValidationResult<()> {
    pool::check_prompt_key(state, key)?;
    let map = match which {
        Text::Prompt => &mut state.prompts,
        Text::Note => &mut state.link_notes,
    };
    if body.trim().is_empty() {
        map.remove(key);
    } else {
        map.insert(key.clone(), body.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use linkdeck_cache::MemoryStore;
    use linkdeck_state::{PoolId, ValidationError};
    use linkdeck_sync::MemoryRemote;
    use pretty_assertions::assert_eq;

    fn engine() -> (SyncEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = SyncEngine::new(
            EngineConfig::default(),
            store.clone(),
            Arc::new(MemoryRemote::new()),
        )
        .unwrap();
        (engine, store)
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = SyncEngine::new(
            EngineConfig::new().with_undo_ttl_ms(0),
            Arc::new(MemoryStore::new()),
            Arc::new(MemoryRemote::new()),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }

    #[tokio::test]
    async fn add_link_is_not_undoable() {
        let (engine, _) = engine();
        let outcome = engine.add_link("A", "https://a.example").unwrap();

        assert_eq!(outcome.value, LinkRecord::new("A", "https://a.example"));
        assert_eq!(outcome.changed, vec![SliceName::Links]);
        assert!(outcome.undo.is_none());
    }

    #[tokio::test]
    async fn validation_failure_is_a_noop() {
        let (engine, store) = engine();
        engine.add_link("A", "https://a.example").unwrap();
        let before = store.keys();

        let err = engine.add_link("again", "HTTPS://A.EXAMPLE").unwrap_err();
        assert_eq!(
            err.as_validation(),
            Some(&ValidationError::DuplicateUrl("HTTPS://A.EXAMPLE".to_string()))
        );
        assert_eq!(store.keys(), before);
        assert_eq!(engine.links().len(), 1);
    }

    #[tokio::test]
    async fn full_free_pool_rejects_add() {
        let store = Arc::new(MemoryStore::new());
        let config = EngineConfig::new().with_limits(Limits::default().with_max_links(1));
        let engine = SyncEngine::new(config, store, Arc::new(MemoryRemote::new())).unwrap();

        engine.add_link("A", "https://a.example").unwrap();
        let err = engine.add_link("B", "https://b.example").unwrap_err();
        assert_eq!(
            err.as_validation(),
            Some(&ValidationError::capacity(PoolId::Free, 1))
        );
    }

    #[tokio::test]
    async fn storage_failure_leaves_cache_unchanged() {
        let (engine, store) = engine();
        engine.add_link("A", "https://a.example").unwrap();
        store.set_disabled(true);

        let err = engine.add_link("B", "https://b.example").unwrap_err();
        assert!(err.is_persistence());
        assert_eq!(engine.links(), vec![LinkRecord::new("A", "https://a.example")]);

        store.set_disabled(false);
        engine.add_link("B", "https://b.example").unwrap();
        assert_eq!(engine.links().len(), 2);
    }

    #[tokio::test]
    async fn removing_a_link_drops_its_keyed_entries_and_undo_restores_them() {
        let (engine, _) = engine();
        engine.add_link("A", "https://a.example").unwrap();
        let key = PromptKey::for_url("https://a.example");
        engine.set_prompt(&key, "summarize").unwrap();
        engine.set_active_prompt_key(&key).unwrap();
        let before = engine.state();

        let outcome = engine.remove_link("https://a.example").unwrap();
        assert!(engine.prompts().is_empty());
        assert!(engine.active_prompt_key().is_global());

        engine.undo(&outcome.undo.unwrap()).unwrap();
        assert_eq!(engine.state(), before);
    }

    #[tokio::test]
    async fn prompt_text_is_normalized_and_empty_body_clears() {
        let (engine, _) = engine();
        engine
            .set_prompt(&PromptKey::Global, "  line one\r\nline two  ")
            .unwrap();
        assert_eq!(engine.prompt(&PromptKey::Global), "line one\nline two");

        let outcome = engine.set_prompt(&PromptKey::Global, "   ").unwrap();
        assert_eq!(outcome.changed, vec![SliceName::Prompts]);
        assert_eq!(engine.prompt(&PromptKey::Global), "");
    }

    #[tokio::test]
    async fn unknown_prompt_key_is_rejected() {
        let (engine, _) = engine();
        let err = engine
            .set_note(&PromptKey::for_url("https://nowhere.example"), "hi")
            .unwrap_err();
        assert!(matches!(
            err.as_validation(),
            Some(ValidationError::UnknownPromptKey(_))
        ));
    }

    #[tokio::test]
    async fn unchanged_result_arms_nothing() {
        let (engine, _) = engine();
        engine.add_link("A", "https://a.example").unwrap();

        let outcome = engine
            .update_link("https://a.example", Some("A"), None)
            .unwrap();
        assert!(outcome.is_noop());
        assert!(outcome.undo.is_none());
        assert_eq!(engine.pending_undo(UndoFamily::Links), None);
    }

    #[tokio::test]
    async fn created_groups_get_unique_ids() {
        let (engine, _) = engine();
        let first = engine.create_group("Daily").unwrap().value;
        let second = engine.create_group("Daily").unwrap().value;

        assert_ne!(first.id, second.id);
        assert!(first.id.parse::<Ulid>().is_ok());
        assert!(chrono::DateTime::parse_from_rfc3339(&first.created_at).is_ok());
        assert_eq!(engine.pinned_groups().len(), 2);
    }
}
