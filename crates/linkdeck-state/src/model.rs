//! Workspace state types
//!
//! [`WorkspaceState`] is the synchronized unit. Field names follow the wire
//! format shared with the server (camelCase).

use crate::key::{same_url, url_identity, PromptKey};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;

/// A saved link
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Display label
    pub label: String,
    /// Absolute http(s) URL
    pub url: String,
}

impl LinkRecord {
    /// Create link record
    #[inline]
    #[must_use]
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }

    /// Case-insensitive URL identity
    #[inline]
    #[must_use]
    pub fn identity(&self) -> String {
        url_identity(&self.url)
    }

    /// Check if this record holds `url`
    #[inline]
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        same_url(&self.url, url)
    }

    /// Prompt key derived from this link
    #[inline]
    #[must_use]
    pub fn prompt_key(&self) -> PromptKey {
        PromptKey::for_url(&self.url)
    }
}

/// A capacity-bounded group of pinned links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PinnedGroup {
    /// Opaque group identifier
    pub id: String,
    /// Display label
    pub label: String,
    /// Pinned links, in display order
    pub links: Vec<LinkRecord>,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
}

impl PinnedGroup {
    /// Position of `url` inside this group
    #[inline]
    #[must_use]
    pub fn position(&self, url: &str) -> Option<usize> {
        self.links.iter().position(|link| link.matches(url))
    }
}

/// Assistant a link is associated with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// No assistant assigned
    #[default]
    None,
    /// ChatGPT
    ChatGpt,
    /// Claude
    Claude,
    /// Gemini
    Gemini,
    /// Copilot
    Copilot,
    /// Anything else
    Other,
}

impl AgentKind {
    /// Wire name
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ChatGpt => "chatgpt",
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::Copilot => "copilot",
            Self::Other => "other",
        }
    }
}

impl FromStr for AgentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "none" => Ok(Self::None),
            "chatgpt" => Ok(Self::ChatGpt),
            "claude" => Ok(Self::Claude),
            "gemini" => Ok(Self::Gemini),
            "copilot" => Ok(Self::Copilot),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown agent: {other}")),
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-link ownership metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkProfile {
    /// Owner name
    pub owner: String,
    /// Associated assistant
    pub agent: AgentKind,
    /// Last review date, empty when never reviewed
    #[serde(with = "date_or_empty")]
    pub reviewed_on: Option<NaiveDate>,
}

impl LinkProfile {
    /// True when every field is empty (such profiles are omitted)
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.owner.is_empty() && self.agent == AgentKind::None && self.reviewed_on.is_none()
    }
}

mod date_or_empty {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        date: &Option<NaiveDate>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => serializer.serialize_str(&date.format("%Y-%m-%d").to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDate>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok())
    }
}

/// Where a link currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLocation {
    /// In the free pool at `index`
    Free {
        /// Position in the free pool
        index: usize,
    },
    /// In pinned group number `group` at `index`
    Pinned {
        /// Position of the group
        group: usize,
        /// Position inside the group
        index: usize,
    },
}

/// The synchronized workspace state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceState {
    /// Free-floating links
    pub links: Vec<LinkRecord>,
    /// Pinned link groups
    pub pinned_groups: Vec<PinnedGroup>,
    /// Prompt bodies by key
    pub prompts: BTreeMap<PromptKey, String>,
    /// Notes by key
    pub link_notes: BTreeMap<PromptKey, String>,
    /// Profiles by key
    pub link_profiles: BTreeMap<PromptKey, LinkProfile>,
    /// Key currently being edited
    pub active_prompt_key: PromptKey,
    /// Server-owned revision
    pub revision: u64,
}

impl WorkspaceState {
    /// Locate a link across all pools
    #[must_use]
    pub fn locate(&self, url: &str) -> Option<LinkLocation> {
        if let Some(index) = self.links.iter().position(|link| link.matches(url)) {
            return Some(LinkLocation::Free { index });
        }

        self.pinned_groups
            .iter()
            .enumerate()
            .find_map(|(group, pinned)| {
                pinned
                    .position(url)
                    .map(|index| LinkLocation::Pinned { group, index })
            })
    }

    /// Record at a location
    #[must_use]
    pub fn link_at(&self, location: LinkLocation) -> Option<&LinkRecord> {
        match location {
            LinkLocation::Free { index } => self.links.get(index),
            LinkLocation::Pinned { group, index } => self
                .pinned_groups
                .get(group)
                .and_then(|pinned| pinned.links.get(index)),
        }
    }

    /// Index of the group with `id`
    #[inline]
    #[must_use]
    pub fn group_index(&self, id: &str) -> Option<usize> {
        self.pinned_groups.iter().position(|group| group.id == id)
    }

    /// Group with `id`
    #[inline]
    #[must_use]
    pub fn group(&self, id: &str) -> Option<&PinnedGroup> {
        self.pinned_groups.iter().find(|group| group.id == id)
    }

    /// Every link record in pool order: free pool first, then groups
    pub fn all_links(&self) -> impl Iterator<Item = &LinkRecord> {
        self.links
            .iter()
            .chain(self.pinned_groups.iter().flat_map(|group| group.links.iter()))
    }

    /// URL identities of every known link
    #[must_use]
    pub fn known_identities(&self) -> HashSet<String> {
        self.all_links().map(LinkRecord::identity).collect()
    }

    /// Check whether `key` resolves against the known links
    #[must_use]
    pub fn resolves(&self, key: &PromptKey) -> bool {
        match key.url_identity() {
            None => true,
            Some(identity) => self.all_links().any(|link| link.identity() == identity),
        }
    }

    /// Whether any data slice holds content
    ///
    /// Used at bootstrap to decide whether a snapshot should win. The active
    /// prompt key and revision alone do not count.
    #[must_use]
    pub fn is_meaningful(&self) -> bool {
        !self.links.is_empty()
            || !self.pinned_groups.is_empty()
            || self.prompts.values().any(|body| !body.is_empty())
            || self.link_notes.values().any(|note| !note.is_empty())
            || self.link_profiles.values().any(|profile| !profile.is_empty())
    }

    /// Content fingerprint of the data slices
    ///
    /// Independent of `revision`, so two states with identical content but
    /// different revisions share a fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();

        hasher.update(b"links");
        for link in &self.links {
            hash_link(&mut hasher, link);
        }

        hasher.update(b"groups");
        for group in &self.pinned_groups {
            hash_field(&mut hasher, &group.id);
            hash_field(&mut hasher, &group.label);
            hash_field(&mut hasher, &group.created_at);
            hasher.update((group.links.len() as u64).to_le_bytes());
            for link in &group.links {
                hash_link(&mut hasher, link);
            }
        }

        for (tag, map) in [(&b"prompts"[..], &self.prompts), (&b"notes"[..], &self.link_notes)] {
            hasher.update(tag);
            for (key, body) in map {
                hash_field(&mut hasher, &key.to_wire());
                hash_field(&mut hasher, body);
            }
        }

        hasher.update(b"profiles");
        for (key, profile) in &self.link_profiles {
            hash_field(&mut hasher, &key.to_wire());
            hash_field(&mut hasher, &profile.owner);
            hash_field(&mut hasher, profile.agent.as_str());
            hash_field(
                &mut hasher,
                &profile
                    .reviewed_on
                    .map(|date| date.to_string())
                    .unwrap_or_default(),
            );
        }

        hasher.update(b"active");
        hash_field(&mut hasher, &self.active_prompt_key.to_wire());

        hex::encode(hasher.finalize())
    }
}

fn hash_field(hasher: &mut Sha256, value: &str) {
    hasher.update(value.as_bytes());
    hasher.update([0]);
}

fn hash_link(hasher: &mut Sha256, link: &LinkRecord) {
    hash_field(hasher, &link.label);
    hash_field(hasher, &link.url);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> WorkspaceState {
        WorkspaceState {
            links: vec![LinkRecord::new("A", "https://a.example")],
            pinned_groups: vec![PinnedGroup {
                id: "g1".to_string(),
                label: "Daily".to_string(),
                links: vec![LinkRecord::new("B", "https://b.example")],
                created_at: "2026-01-01T00:00:00Z".to_string(),
            }],
            ..WorkspaceState::default()
        }
    }

    #[test]
    fn locate_finds_links_in_both_pools() {
        let state = sample();
        assert_eq!(
            state.locate("HTTPS://A.EXAMPLE"),
            Some(LinkLocation::Free { index: 0 })
        );
        assert_eq!(
            state.locate("https://b.example"),
            Some(LinkLocation::Pinned { group: 0, index: 0 })
        );
        assert_eq!(state.locate("https://c.example"), None);
    }

    #[test]
    fn resolves_only_known_link_keys() {
        let state = sample();
        assert!(state.resolves(&PromptKey::Global));
        assert!(state.resolves(&PromptKey::for_url("https://b.example")));
        assert!(!state.resolves(&PromptKey::for_url("https://c.example")));
    }

    #[test]
    fn meaningful_ignores_active_key_and_revision() {
        let mut state = WorkspaceState {
            active_prompt_key: PromptKey::for_url("https://a.example"),
            revision: 9,
            ..WorkspaceState::default()
        };
        assert!(!state.is_meaningful());

        state.link_notes.insert(PromptKey::Global, "hello".to_string());
        assert!(state.is_meaningful());
    }

    #[test]
    fn fingerprint_ignores_revision_but_tracks_content() {
        let a = sample();
        let mut b = sample();
        b.revision = 42;
        assert_eq!(a.fingerprint(), b.fingerprint());

        b.links[0].label = "Renamed".to_string();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn wire_format_is_camel_case() {
        let json = serde_json::to_value(sample()).unwrap();
        assert!(json.get("pinnedGroups").is_some());
        assert!(json.get("activePromptKey").is_some());
        assert_eq!(json["pinnedGroups"][0]["createdAt"], "2026-01-01T00:00:00Z");
    }

    #[test]
    fn profile_dates_serialize_as_date_or_empty() {
        let profile = LinkProfile {
            owner: "ops".to_string(),
            agent: AgentKind::Claude,
            reviewed_on: NaiveDate::from_ymd_opt(2026, 3, 4),
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["reviewedOn"], "2026-03-04");
        assert_eq!(json["agent"], "claude");

        let empty = serde_json::to_value(LinkProfile::default()).unwrap();
        assert_eq!(empty["reviewedOn"], "");
    }
}
