//! Pool invariant enforcer
//!
//! The only legal ways to add, move and remove link records. Every operation
//! validates first and mutates second, so an `Err` leaves the state untouched.
//!
//! # Invariants
//!
//! - A URL (case-insensitive) appears in at most one place across the free
//!   pool and all pinned groups
//! - No pool exceeds its ceiling; a full destination rejects the operation
//! - Records are normalized on every insert
//! - Deleting a group returns its links to the free pool

use crate::error::{PoolId, ValidationError, ValidationResult};
use crate::key::{same_url, url_identity, PromptKey};
use crate::limits::Limits;
use crate::model::{LinkLocation, LinkRecord, PinnedGroup, WorkspaceState};
use crate::normalize::{clean_text, normalize_record, normalize_url};
use std::collections::HashSet;

const MAX_GROUP_ID_CHARS: usize = 64;

/// Where an inserted record lands in its destination pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InsertPosition {
    /// Front of the pool
    #[default]
    Head,
    /// End of the pool
    Tail,
    /// Explicit index, clamped to the pool length
    Index(usize),
}

impl InsertPosition {
    #[inline]
    fn resolve(self, len: usize) -> usize {
        match self {
            Self::Head => 0,
            Self::Tail => len,
            Self::Index(index) => index.min(len),
        }
    }
}

fn insert_at<T>(items: &mut Vec<T>, position: InsertPosition, item: T) {
    let index = position.resolve(items.len());
    items.insert(index, item);
}

fn prepare(label: &str, url: &str, limits: &Limits) -> ValidationResult<LinkRecord> {
    normalize_record(label, url, limits)
        .ok_or_else(|| ValidationError::InvalidUrl(url.trim().to_string()))
}

fn not_found(url: &str) -> ValidationError {
    ValidationError::LinkNotFound(url.trim().to_string())
}

fn take_link(state: &mut WorkspaceState, location: LinkLocation) -> LinkRecord {
    match location {
        LinkLocation::Free { index } => state.links.remove(index),
        LinkLocation::Pinned { group, index } => state.pinned_groups[group].links.remove(index),
    }
}

fn slot_mut(state: &mut WorkspaceState, location: LinkLocation) -> &mut LinkRecord {
    match location {
        LinkLocation::Free { index } => &mut state.links[index],
        LinkLocation::Pinned { group, index } => &mut state.pinned_groups[group].links[index],
    }
}

/// Drop prompt, note and profile entries of a removed link
fn forget_keyed(state: &mut WorkspaceState, identity: &str) {
    let key = PromptKey::Link(identity.to_string());
    state.prompts.remove(&key);
    state.link_notes.remove(&key);
    state.link_profiles.remove(&key);
    if state.active_prompt_key == key {
        state.active_prompt_key = PromptKey::Global;
    }
}

/// Move keyed entries from one URL identity to another
fn rekey(state: &mut WorkspaceState, from: &str, to: &str) {
    let old = PromptKey::Link(from.to_string());
    let new = PromptKey::Link(to.to_string());
    if let Some(prompt) = state.prompts.remove(&old) {
        state.prompts.insert(new.clone(), prompt);
    }
    if let Some(note) = state.link_notes.remove(&old) {
        state.link_notes.insert(new.clone(), note);
    }
    if let Some(profile) = state.link_profiles.remove(&old) {
        state.link_profiles.insert(new.clone(), profile);
    }
    if state.active_prompt_key == old {
        state.active_prompt_key = new;
    }
}

/// Add a link to the free pool
///
/// # Errors
/// - `InvalidUrl` if the URL is not absolute http(s)
/// - `DuplicateUrl` if the URL lives anywhere in the workspace
/// - `CapacityExceeded` if the free pool is full
pub fn add_link(
    state: &mut WorkspaceState,
    label: &str,
    url: &str,
    position: InsertPosition,
    limits: &Limits,
) -> ValidationResult<LinkRecord> {
    let record = prepare(label, url, limits)?;
    if state.locate(&record.url).is_some() {
        return Err(ValidationError::DuplicateUrl(record.url));
    }
    if state.links.len() >= limits.max_links {
        return Err(ValidationError::capacity(PoolId::Free, limits.max_links));
    }

    insert_at(&mut state.links, position, record.clone());
    Ok(record)
}

/// Edit a link in place, wherever it lives
///
/// A URL change carries the link's prompt, note and profile to the new key.
pub fn update_link(
    state: &mut WorkspaceState,
    url: &str,
    label: Option<&str>,
    new_url: Option<&str>,
    limits: &Limits,
) -> ValidationResult<LinkRecord> {
    let location = state.locate(url).ok_or_else(|| not_found(url))?;
    let current = state.link_at(location).cloned().ok_or_else(|| not_found(url))?;

    let target_url = match new_url {
        Some(raw) => normalize_url(raw, limits)
            .ok_or_else(|| ValidationError::InvalidUrl(raw.trim().to_string()))?,
        None => current.url.clone(),
    };
    let url_changed = !same_url(&target_url, &current.url);
    if url_changed && state.locate(&target_url).is_some() {
        return Err(ValidationError::DuplicateUrl(target_url));
    }

    let record = prepare(label.unwrap_or(&current.label), &target_url, limits)?;
    *slot_mut(state, location) = record.clone();
    if url_changed {
        rekey(state, &current.identity(), &record.identity());
    }
    Ok(record)
}

/// Remove a link from the free pool
pub fn remove_link(state: &mut WorkspaceState, url: &str) -> ValidationResult<LinkRecord> {
    let index = state
        .links
        .iter()
        .position(|link| link.matches(url))
        .ok_or_else(|| not_found(url))?;

    let record = state.links.remove(index);
    forget_keyed(state, &record.identity());
    Ok(record)
}

/// Remove a link from a pinned group
pub fn remove_pinned_link(
    state: &mut WorkspaceState,
    group_id: &str,
    url: &str,
) -> ValidationResult<LinkRecord> {
    let group = state
        .group_index(group_id)
        .ok_or_else(|| ValidationError::GroupNotFound(group_id.to_string()))?;
    let index = state.pinned_groups[group]
        .position(url)
        .ok_or_else(|| not_found(url))?;

    let record = state.pinned_groups[group].links.remove(index);
    forget_keyed(state, &record.identity());
    Ok(record)
}

/// Reorder a link inside the pool it already lives in
pub fn move_link(
    state: &mut WorkspaceState,
    url: &str,
    position: InsertPosition,
) -> ValidationResult<()> {
    let location = state.locate(url).ok_or_else(|| not_found(url))?;
    let record = take_link(state, location);
    match location {
        LinkLocation::Free { .. } => insert_at(&mut state.links, position, record),
        LinkLocation::Pinned { group, .. } => {
            insert_at(&mut state.pinned_groups[group].links, position, record);
        }
    }
    Ok(())
}

/// Append a new, empty pinned group
///
/// An empty label becomes `Group N`.
pub fn create_group(
    state: &mut WorkspaceState,
    id: &str,
    label: &str,
    created_at: &str,
    limits: &Limits,
) -> ValidationResult<PinnedGroup> {
    if state.pinned_groups.len() >= limits.max_groups {
        return Err(ValidationError::capacity(PoolId::Groups, limits.max_groups));
    }

    let id = clean_text(id, MAX_GROUP_ID_CHARS);
    if id.is_empty() || state.group_index(&id).is_some() {
        return Err(ValidationError::DuplicateGroup(id));
    }

    let mut label = clean_text(label, limits.max_group_label_chars);
    if label.is_empty() {
        label = format!("Group {}", state.pinned_groups.len() + 1);
    }

    let group = PinnedGroup {
        id,
        label,
        links: Vec::new(),
        created_at: created_at.trim().to_string(),
    };
    state.pinned_groups.push(group.clone());
    Ok(group)
}

/// Change a group's label
pub fn rename_group(
    state: &mut WorkspaceState,
    id: &str,
    label: &str,
    limits: &Limits,
) -> ValidationResult<()> {
    let index = state
        .group_index(id)
        .ok_or_else(|| ValidationError::GroupNotFound(id.to_string()))?;

    let label = clean_text(label, limits.max_group_label_chars);
    if !label.is_empty() {
        state.pinned_groups[index].label = label;
    }
    Ok(())
}

/// Delete a group, returning its links to the head of the free pool
///
/// # Errors
/// - `GroupNotFound` if no group has this id
/// - `CapacityExceeded` if the free pool cannot absorb the group's links
pub fn delete_group(
    state: &mut WorkspaceState,
    id: &str,
    limits: &Limits,
) -> ValidationResult<PinnedGroup> {
    let index = state
        .group_index(id)
        .ok_or_else(|| ValidationError::GroupNotFound(id.to_string()))?;

    let spare = limits.max_links.saturating_sub(state.links.len());
    if state.pinned_groups[index].links.len() > spare {
        return Err(ValidationError::capacity(PoolId::Free, limits.max_links));
    }

    let group = state.pinned_groups.remove(index);
    state.links.splice(0..0, group.links.iter().cloned());
    Ok(group)
}

/// Move a link into a pinned group
///
/// The source is the free pool or another group.
///
/// # Errors
/// - `GroupNotFound` / `LinkNotFound` for unknown ids or URLs
/// - `AlreadyInGroup` if the link is already pinned in the target
/// - `CapacityExceeded` if the target group is full
pub fn promote(
    state: &mut WorkspaceState,
    url: &str,
    target_group_id: &str,
    position: InsertPosition,
    limits: &Limits,
) -> ValidationResult<()> {
    let target = state
        .group_index(target_group_id)
        .ok_or_else(|| ValidationError::GroupNotFound(target_group_id.to_string()))?;
    let location = state.locate(url).ok_or_else(|| not_found(url))?;

    if matches!(location, LinkLocation::Pinned { group, .. } if group == target) {
        return Err(ValidationError::AlreadyInGroup {
            url: url.trim().to_string(),
            group: target_group_id.to_string(),
        });
    }
    if state.pinned_groups[target].links.len() >= limits.max_group_links {
        return Err(ValidationError::capacity(
            PoolId::Group(target_group_id.to_string()),
            limits.max_group_links,
        ));
    }

    let current = state.link_at(location).cloned().ok_or_else(|| not_found(url))?;
    let record = prepare(&current.label, &current.url, limits)?;

    take_link(state, location);
    insert_at(&mut state.pinned_groups[target].links, position, record);
    Ok(())
}

/// Move a link out of a pinned group into the free pool
///
/// # Errors
/// - `GroupNotFound` / `LinkNotFound` for unknown ids or URLs
/// - `CapacityExceeded` if the free pool is full
pub fn demote(
    state: &mut WorkspaceState,
    url: &str,
    source_group_id: &str,
    position: InsertPosition,
    limits: &Limits,
) -> ValidationResult<()> {
    let source = state
        .group_index(source_group_id)
        .ok_or_else(|| ValidationError::GroupNotFound(source_group_id.to_string()))?;
    let index = state.pinned_groups[source]
        .position(url)
        .ok_or_else(|| not_found(url))?;

    if state.links.len() >= limits.max_links {
        return Err(ValidationError::capacity(PoolId::Free, limits.max_links));
    }

    let current = &state.pinned_groups[source].links[index];
    let record = prepare(&current.label, &current.url, limits)?;

    state.pinned_groups[source].links.remove(index);
    insert_at(&mut state.links, position, record);
    Ok(())
}

/// Remove every free link; returns how many were removed
pub fn clear_links(state: &mut WorkspaceState) -> usize {
    let removed: Vec<LinkRecord> = state.links.drain(..).collect();
    for record in &removed {
        forget_keyed(state, &record.identity());
    }
    removed.len()
}

/// Delete every group, returning all pinned links to the free pool
pub fn clear_groups(state: &mut WorkspaceState, limits: &Limits) -> ValidationResult<usize> {
    let pinned: usize = state.pinned_groups.iter().map(|group| group.links.len()).sum();
    let spare = limits.max_links.saturating_sub(state.links.len());
    if pinned > spare {
        return Err(ValidationError::capacity(PoolId::Free, limits.max_links));
    }

    let groups: Vec<PinnedGroup> = state.pinned_groups.drain(..).collect();
    let returned: Vec<LinkRecord> = groups.into_iter().flat_map(|group| group.links).collect();
    let count = returned.len();
    state.links.splice(0..0, returned);
    Ok(count)
}

/// Reset every data slice, keeping the revision
pub fn clear_all(state: &mut WorkspaceState) {
    *state = WorkspaceState {
        revision: state.revision,
        ..WorkspaceState::default()
    };
}

/// Reject prompt keys that do not resolve to a known link
pub fn check_prompt_key(state: &WorkspaceState, key: &PromptKey) -> ValidationResult<()> {
    if state.resolves(key) {
        Ok(())
    } else {
        Err(ValidationError::UnknownPromptKey(key.to_wire()))
    }
}

/// Describe every invariant violation in `state`
///
/// Empty for any state produced by normalization or by this module.
#[must_use]
pub fn invariant_violations(state: &WorkspaceState, limits: &Limits) -> Vec<String> {
    let mut violations = Vec::new();
    let mut seen = HashSet::new();

    for link in state.all_links() {
        if !seen.insert(url_identity(&link.url)) {
            violations.push(format!("url appears twice: {}", link.url));
        }
    }
    if state.links.len() > limits.max_links {
        violations.push(format!("free pool holds {} links", state.links.len()));
    }
    if state.pinned_groups.len() > limits.max_groups {
        violations.push(format!("{} pinned groups", state.pinned_groups.len()));
    }
    for group in &state.pinned_groups {
        if group.links.len() > limits.max_group_links {
            violations.push(format!("group {} holds {} links", group.id, group.links.len()));
        }
    }
    let keys = state
        .prompts
        .keys()
        .chain(state.link_notes.keys())
        .chain(state.link_profiles.keys())
        .chain(std::iter::once(&state.active_prompt_key));
    for key in keys {
        if !state.resolves(key) {
            violations.push(format!("dangling key: {key}"));
        }
    }
    violations
}
