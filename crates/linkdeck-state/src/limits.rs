//! Capacity ceilings and text caps
//!
//! Every normalization function and pool operation takes a [`Limits`] so the
//! same ceilings apply to local edits and to server payloads.

use serde::{Deserialize, Serialize};

/// Default ceiling for the free link pool
pub const DEFAULT_MAX_LINKS: usize = 100;
/// Default ceiling for links inside one pinned group
pub const DEFAULT_MAX_GROUP_LINKS: usize = 6;
/// Default ceiling for the number of pinned groups
pub const DEFAULT_MAX_GROUPS: usize = 8;

/// Capacity and length limits for workspace state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum links in the free pool
    pub max_links: usize,
    /// Maximum links per pinned group
    pub max_group_links: usize,
    /// Maximum pinned groups
    pub max_groups: usize,
    /// Maximum characters in a link label
    pub max_label_chars: usize,
    /// Maximum characters in a group label
    pub max_group_label_chars: usize,
    /// Maximum characters in a URL (longer URLs are malformed, not truncated)
    pub max_url_chars: usize,
    /// Maximum characters in a link note
    pub max_note_chars: usize,
    /// Maximum characters in a prompt body
    pub max_prompt_chars: usize,
    /// Maximum characters in a profile owner
    pub max_owner_chars: usize,
}

impl Limits {
    /// Upper bound on keyed entries (prompts, notes, profiles)
    ///
    /// One per link location plus the global key.
    #[inline]
    #[must_use]
    pub fn max_keyed_entries(&self) -> usize {
        self.max_links + self.max_groups * self.max_group_links + 1
    }

    /// With free pool ceiling
    #[inline]
    #[must_use]
    pub fn with_max_links(mut self, max: usize) -> Self {
        self.max_links = max;
        self
    }

    /// With per-group ceiling
    #[inline]
    #[must_use]
    pub fn with_max_group_links(mut self, max: usize) -> Self {
        self.max_group_links = max;
        self
    }

    /// With group count ceiling
    #[inline]
    #[must_use]
    pub fn with_max_groups(mut self, max: usize) -> Self {
        self.max_groups = max;
        self
    }

    /// Names of the fields that are zero
    ///
    /// A zero ceiling makes the corresponding pool unusable.
    #[must_use]
    pub fn zero_fields(&self) -> Vec<&'static str> {
        [
            ("max_links", self.max_links),
            ("max_group_links", self.max_group_links),
            ("max_groups", self.max_groups),
            ("max_label_chars", self.max_label_chars),
            ("max_group_label_chars", self.max_group_label_chars),
            ("max_url_chars", self.max_url_chars),
            ("max_note_chars", self.max_note_chars),
            ("max_prompt_chars", self.max_prompt_chars),
            ("max_owner_chars", self.max_owner_chars),
        ]
        .into_iter()
        .filter(|(_, value)| *value == 0)
        .map(|(name, _)| name)
        .collect()
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_links: DEFAULT_MAX_LINKS,
            max_group_links: DEFAULT_MAX_GROUP_LINKS,
            max_groups: DEFAULT_MAX_GROUPS,
            max_label_chars: 80,
            max_group_label_chars: 40,
            max_url_chars: 2048,
            max_note_chars: 1000,
            max_prompt_chars: 8000,
            max_owner_chars: 80,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_limits_have_no_zero_fields() {
        assert!(Limits::default().zero_fields().is_empty());
    }

    #[test]
    fn keyed_entry_bound_covers_every_location() {
        let limits = Limits::default();
        assert_eq!(limits.max_keyed_entries(), 100 + 8 * 6 + 1);
    }

    #[test]
    fn partial_toml_style_input_keeps_defaults() {
        let limits: Limits = serde_json::from_str(r#"{"max_links": 3}"#).unwrap();
        assert_eq!(limits.max_links, 3);
        assert_eq!(limits.max_groups, DEFAULT_MAX_GROUPS);
    }

    #[test]
    fn zero_fields_are_reported() {
        let limits = Limits::default().with_max_groups(0);
        assert_eq!(limits.zero_fields(), vec!["max_groups"]);
    }
}
