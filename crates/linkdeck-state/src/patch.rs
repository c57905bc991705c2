//! Slice-level patches
//!
//! State is persisted and restored one slice at a time. A [`StatePatch`] holds
//! replacement values for some slices; it is both the write unit of the local
//! cache and the snapshot format of the undo manager.

use crate::key::PromptKey;
use crate::model::{LinkProfile, LinkRecord, PinnedGroup, WorkspaceState};
use std::collections::BTreeMap;
use std::fmt;

/// One independently persisted part of [`WorkspaceState`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SliceName {
    /// Free links
    Links,
    /// Pinned groups
    PinnedGroups,
    /// Prompt bodies
    Prompts,
    /// Link notes
    LinkNotes,
    /// Link profiles
    LinkProfiles,
    /// Active prompt key
    ActivePromptKey,
    /// Last observed server revision
    Revision,
}

impl SliceName {
    /// Every slice
    pub const ALL: [SliceName; 7] = [
        SliceName::Links,
        SliceName::PinnedGroups,
        SliceName::Prompts,
        SliceName::LinkNotes,
        SliceName::LinkProfiles,
        SliceName::ActivePromptKey,
        SliceName::Revision,
    ];

    /// Slices holding user data (everything except the revision)
    pub const DATA: [SliceName; 6] = [
        SliceName::Links,
        SliceName::PinnedGroups,
        SliceName::Prompts,
        SliceName::LinkNotes,
        SliceName::LinkProfiles,
        SliceName::ActivePromptKey,
    ];

    /// Storage key suffix for this slice
    #[must_use]
    pub fn storage_key(self) -> &'static str {
        match self {
            Self::Links => "links",
            Self::PinnedGroups => "pinned_groups",
            Self::Prompts => "prompts",
            Self::LinkNotes => "link_notes",
            Self::LinkProfiles => "link_profiles",
            Self::ActivePromptKey => "active_prompt_key",
            Self::Revision => "revision",
        }
    }

    /// Field name in the wire document
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Links => "links",
            Self::PinnedGroups => "pinnedGroups",
            Self::Prompts => "prompts",
            Self::LinkNotes => "linkNotes",
            Self::LinkProfiles => "linkProfiles",
            Self::ActivePromptKey => "activePromptKey",
            Self::Revision => "revision",
        }
    }
}

impl fmt::Display for SliceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.storage_key())
    }
}

/// Replacement values for a subset of slices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatePatch {
    /// Free links
    pub links: Option<Vec<LinkRecord>>,
    /// Pinned groups
    pub pinned_groups: Option<Vec<PinnedGroup>>,
    /// Prompt bodies
    pub prompts: Option<BTreeMap<PromptKey, String>>,
    /// Link notes
    pub link_notes: Option<BTreeMap<PromptKey, String>>,
    /// Link profiles
    pub link_profiles: Option<BTreeMap<PromptKey, LinkProfile>>,
    /// Active prompt key
    pub active_prompt_key: Option<PromptKey>,
    /// Revision
    pub revision: Option<u64>,
}

impl StatePatch {
    /// Patch that replaces every slice, revision included
    #[must_use]
    pub fn full(state: &WorkspaceState) -> Self {
        Self::capture(state, &SliceName::ALL)
    }

    /// Patch that replaces every data slice, leaving the revision alone
    #[must_use]
    pub fn data(state: &WorkspaceState) -> Self {
        Self::capture(state, &SliceName::DATA)
    }

    /// Copy the named slices out of `state`
    #[must_use]
    pub fn capture(state: &WorkspaceState, slices: &[SliceName]) -> Self {
        let mut patch = Self::default();
        for slice in slices {
            match slice {
                SliceName::Links => patch.links = Some(state.links.clone()),
                SliceName::PinnedGroups => patch.pinned_groups = Some(state.pinned_groups.clone()),
                SliceName::Prompts => patch.prompts = Some(state.prompts.clone()),
                SliceName::LinkNotes => patch.link_notes = Some(state.link_notes.clone()),
                SliceName::LinkProfiles => patch.link_profiles = Some(state.link_profiles.clone()),
                SliceName::ActivePromptKey => {
                    patch.active_prompt_key = Some(state.active_prompt_key.clone());
                }
                SliceName::Revision => patch.revision = Some(state.revision),
            }
        }
        patch
    }

    /// Slices whose values differ between two states
    #[must_use]
    pub fn changed_slices(before: &WorkspaceState, after: &WorkspaceState) -> Vec<SliceName> {
        SliceName::ALL
            .into_iter()
            .filter(|slice| match slice {
                SliceName::Links => before.links != after.links,
                SliceName::PinnedGroups => before.pinned_groups != after.pinned_groups,
                SliceName::Prompts => before.prompts != after.prompts,
                SliceName::LinkNotes => before.link_notes != after.link_notes,
                SliceName::LinkProfiles => before.link_profiles != after.link_profiles,
                SliceName::ActivePromptKey => before.active_prompt_key != after.active_prompt_key,
                SliceName::Revision => before.revision != after.revision,
            })
            .collect()
    }

    /// Patch carrying the slices of `after` that differ from `before`
    #[must_use]
    pub fn diff(before: &WorkspaceState, after: &WorkspaceState) -> Self {
        Self::capture(after, &Self::changed_slices(before, after))
    }

    /// Slices this patch replaces
    #[must_use]
    pub fn slices(&self) -> Vec<SliceName> {
        let present = [
            (SliceName::Links, self.links.is_some()),
            (SliceName::PinnedGroups, self.pinned_groups.is_some()),
            (SliceName::Prompts, self.prompts.is_some()),
            (SliceName::LinkNotes, self.link_notes.is_some()),
            (SliceName::LinkProfiles, self.link_profiles.is_some()),
            (SliceName::ActivePromptKey, self.active_prompt_key.is_some()),
            (SliceName::Revision, self.revision.is_some()),
        ];
        present
            .into_iter()
            .filter_map(|(slice, is_set)| is_set.then_some(slice))
            .collect()
    }

    /// True when no slice is set
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slices().is_empty()
    }

    /// Drop the revision slice
    #[inline]
    #[must_use]
    pub fn without_revision(mut self) -> Self {
        self.revision = None;
        self
    }

    /// Overwrite the set slices of `state`
    pub fn apply_to(self, state: &mut WorkspaceState) {
        if let Some(links) = self.links {
            state.links = links;
        }
        if let Some(groups) = self.pinned_groups {
            state.pinned_groups = groups;
        }
        if let Some(prompts) = self.prompts {
            state.prompts = prompts;
        }
        if let Some(notes) = self.link_notes {
            state.link_notes = notes;
        }
        if let Some(profiles) = self.link_profiles {
            state.link_profiles = profiles;
        }
        if let Some(key) = self.active_prompt_key {
            state.active_prompt_key = key;
        }
        if let Some(revision) = self.revision {
            state.revision = revision;
        }
    }
}
