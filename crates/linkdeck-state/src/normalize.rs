//! Normalization chokepoint
//!
//! Every value that enters workspace state passes through these functions:
//! local edits, server responses and whatever durable storage hands back.
//! Input is untrusted [`serde_json::Value`]; output always satisfies the
//! state invariants:
//!
//! - URLs are unique across the free pool and every pinned group
//! - Every collection respects its ceiling (overflow is counted in the
//!   [`NormalizationReport`])
//! - Keyed entries refer to the global key or to a known link
//! - The active prompt key resolves
//!
//! Malformed entries are dropped, never fatal. All functions are pure and
//! idempotent.

use crate::key::PromptKey;
use crate::limits::Limits;
use crate::model::{AgentKind, LinkProfile, LinkRecord, PinnedGroup, WorkspaceState};
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

const MAX_ID_CHARS: usize = 64;
const MAX_TIMESTAMP_CHARS: usize = 64;

/// Counts of entries altered while normalizing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NormalizationReport {
    /// Entries that could not be interpreted
    pub dropped_malformed: usize,
    /// Entries dropped because their URL or id was already present
    pub dropped_duplicates: usize,
    /// Entries cut off by a capacity ceiling
    pub truncated: usize,
    /// Keyed entries whose link no longer exists
    pub pruned_keys: usize,
}

impl NormalizationReport {
    /// Nothing was altered
    #[inline]
    #[must_use]
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }

    /// Add another report's counts
    pub fn merge(&mut self, other: Self) {
        self.dropped_malformed += other.dropped_malformed;
        self.dropped_duplicates += other.dropped_duplicates;
        self.truncated += other.truncated;
        self.pruned_keys += other.pruned_keys;
    }
}

/// Collapse runs of whitespace into single spaces and trim
#[must_use]
pub fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cut `text` to at most `max` characters
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

/// Single-line text: collapsed, capped, trimmed
#[must_use]
pub fn clean_text(raw: &str, max: usize) -> String {
    truncate_chars(&collapse_whitespace(raw), max)
        .trim_end()
        .to_string()
}

/// Multi-line text: line endings unified, trimmed, capped
///
/// Internal newlines and indentation are kept.
#[must_use]
pub fn clean_multiline(raw: &str, max: usize) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    truncate_chars(unified.trim(), max).trim_end().to_string()
}

/// Validate an absolute http(s) URL
///
/// Returns the trimmed URL with its original casing. URLs over the length cap
/// are rejected rather than cut, since a truncated URL points elsewhere.
#[must_use]
pub fn normalize_url(raw: &str, limits: &Limits) -> Option<String> {
    let url = raw.trim();
    if url.is_empty() || url.chars().count() > limits.max_url_chars {
        return None;
    }
    if url.chars().any(char::is_whitespace) {
        return None;
    }

    let host = host_of(url)?;
    if host.is_empty() {
        return None;
    }

    Some(url.to_string())
}

/// Host part of an http(s) URL, without userinfo or port
fn host_of(url: &str) -> Option<&str> {
    let (scheme, rest) = url.split_once("://")?;
    if !scheme.eq_ignore_ascii_case("https") && !scheme.eq_ignore_ascii_case("http") {
        return None;
    }

    let authority = rest
        .split(['/', '?', '#'])
        .next()
        .unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or_default();
    let host = host_port.split(':').next().unwrap_or_default();
    Some(host)
}

/// Derive a display label from a URL's host
///
/// `https://www.Example.com/a` becomes `example.com`.
#[must_use]
pub fn derive_label(url: &str) -> String {
    let host = host_of(url.trim()).unwrap_or(url).to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);
    if host.is_empty() {
        url.trim().to_string()
    } else {
        host.to_string()
    }
}

/// Build a normalized record from a raw label and URL
#[must_use]
pub fn normalize_record(label: &str, url: &str, limits: &Limits) -> Option<LinkRecord> {
    let url = normalize_url(url, limits)?;
    let mut label = clean_text(label, limits.max_label_chars);
    if label.is_empty() {
        label = clean_text(&derive_label(&url), limits.max_label_chars);
    }
    Some(LinkRecord { label, url })
}

/// Normalize one link entry
///
/// Accepts `{label, url}` objects and, leniently, bare URL strings.
#[must_use]
pub fn normalize_link(value: &Value, limits: &Limits) -> Option<LinkRecord> {
    match value {
        Value::String(url) => normalize_record("", url, limits),
        Value::Object(map) => {
            let url = map.get("url").and_then(Value::as_str)?;
            let label = map.get("label").and_then(Value::as_str).unwrap_or_default();
            normalize_record(label, url, limits)
        }
        _ => None,
    }
}

/// Normalize a sequence of links into one pool
///
/// `seen` holds URL identities already claimed elsewhere and is extended with
/// every accepted link.
fn links_into_pool(
    value: Option<&Value>,
    capacity: usize,
    limits: &Limits,
    seen: &mut HashSet<String>,
    report: &mut NormalizationReport,
) -> Vec<LinkRecord> {
    let Some(items) = value.and_then(Value::as_array) else {
        if value.is_some_and(|v| !v.is_null()) {
            report.dropped_malformed += 1;
        }
        return Vec::new();
    };

    let mut pool = Vec::with_capacity(items.len().min(capacity));
    for item in items {
        let Some(record) = normalize_link(item, limits) else {
            report.dropped_malformed += 1;
            continue;
        };
        if seen.contains(&record.identity()) {
            report.dropped_duplicates += 1;
            continue;
        }
        if pool.len() >= capacity {
            report.truncated += 1;
            continue;
        }
        seen.insert(record.identity());
        pool.push(record);
    }
    pool
}

/// Normalize the free link pool
#[must_use]
pub fn normalize_links(value: &Value, limits: &Limits) -> Vec<LinkRecord> {
    let mut report = NormalizationReport::default();
    links_into_pool(
        Some(value),
        limits.max_links,
        limits,
        &mut HashSet::new(),
        &mut report,
    )
}

fn groups_with_report(
    value: Option<&Value>,
    limits: &Limits,
    seen_urls: &mut HashSet<String>,
    report: &mut NormalizationReport,
) -> Vec<PinnedGroup> {
    let Some(items) = value.and_then(Value::as_array) else {
        if value.is_some_and(|v| !v.is_null()) {
            report.dropped_malformed += 1;
        }
        return Vec::new();
    };

    let mut groups: Vec<PinnedGroup> = Vec::new();
    let mut seen_ids = HashSet::new();
    for (position, item) in items.iter().enumerate() {
        let Some(map) = item.as_object() else {
            report.dropped_malformed += 1;
            continue;
        };
        if groups.len() >= limits.max_groups {
            report.truncated += 1;
            continue;
        }

        let raw_id = map.get("id").and_then(Value::as_str).unwrap_or_default();
        let mut id = clean_text(raw_id, MAX_ID_CHARS);
        if id.is_empty() {
            id = format!("group-{}", position + 1);
        }
        if !seen_ids.insert(id.clone()) {
            report.dropped_duplicates += 1;
            continue;
        }

        let raw_label = map.get("label").and_then(Value::as_str).unwrap_or_default();
        let mut label = clean_text(raw_label, limits.max_group_label_chars);
        if label.is_empty() {
            label = format!("Group {}", groups.len() + 1);
        }

        let created_at = map
            .get("createdAt")
            .and_then(Value::as_str)
            .map(|raw| clean_text(raw, MAX_TIMESTAMP_CHARS))
            .unwrap_or_default();

        let links = links_into_pool(
            map.get("links"),
            limits.max_group_links,
            limits,
            seen_urls,
            report,
        );

        groups.push(PinnedGroup {
            id,
            label,
            links,
            created_at,
        });
    }
    groups
}

/// Normalize pinned groups
///
/// URLs are unique across all groups; the first group claiming a URL keeps it.
#[must_use]
pub fn normalize_pinned_groups(value: &Value, limits: &Limits) -> Vec<PinnedGroup> {
    let mut report = NormalizationReport::default();
    groups_with_report(Some(value), limits, &mut HashSet::new(), &mut report)
}

fn text_map_with_report(
    value: Option<&Value>,
    max_chars: usize,
    report: &mut NormalizationReport,
) -> BTreeMap<PromptKey, String> {
    let Some(map) = value.and_then(Value::as_object) else {
        if value.is_some_and(|v| !v.is_null()) {
            report.dropped_malformed += 1;
        }
        return BTreeMap::new();
    };

    let mut out = BTreeMap::new();
    for (raw_key, raw_body) in map {
        let (Ok(key), Some(body)) = (raw_key.parse::<PromptKey>(), raw_body.as_str()) else {
            report.dropped_malformed += 1;
            continue;
        };
        let body = clean_multiline(body, max_chars);
        if body.is_empty() {
            continue;
        }
        // Keys that differ only by case collapse; the later entry wins.
        out.insert(key, body);
    }
    out
}

fn cap_entries<V>(map: &mut BTreeMap<PromptKey, V>, max: usize, report: &mut NormalizationReport) {
    while map.len() > max {
        map.pop_last();
        report.truncated += 1;
    }
}

/// Normalize the prompt map
#[must_use]
pub fn normalize_prompts(value: &Value, limits: &Limits) -> BTreeMap<PromptKey, String> {
    let mut report = NormalizationReport::default();
    let mut prompts = text_map_with_report(Some(value), limits.max_prompt_chars, &mut report);
    cap_entries(&mut prompts, limits.max_keyed_entries(), &mut report);
    prompts
}

/// Normalize the link note map
#[must_use]
pub fn normalize_notes(value: &Value, limits: &Limits) -> BTreeMap<PromptKey, String> {
    let mut report = NormalizationReport::default();
    let mut notes = text_map_with_report(Some(value), limits.max_note_chars, &mut report);
    cap_entries(&mut notes, limits.max_keyed_entries(), &mut report);
    notes
}

/// Normalize one profile
///
/// Returns `None` for malformed input and for profiles with every field empty.
#[must_use]
pub fn normalize_profile(value: &Value, limits: &Limits) -> Option<LinkProfile> {
    let map = value.as_object()?;
    let owner = map
        .get("owner")
        .and_then(Value::as_str)
        .map(|raw| clean_text(raw, limits.max_owner_chars))
        .unwrap_or_default();
    let agent = map
        .get("agent")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<AgentKind>().ok())
        .unwrap_or_default();
    let reviewed_on = map
        .get("reviewedOn")
        .and_then(Value::as_str)
        .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok());

    let profile = LinkProfile {
        owner,
        agent,
        reviewed_on,
    };
    (!profile.is_empty()).then_some(profile)
}

fn profiles_with_report(
    value: Option<&Value>,
    limits: &Limits,
    report: &mut NormalizationReport,
) -> BTreeMap<PromptKey, LinkProfile> {
    let Some(map) = value.and_then(Value::as_object) else {
        if value.is_some_and(|v| !v.is_null()) {
            report.dropped_malformed += 1;
        }
        return BTreeMap::new();
    };

    let mut out = BTreeMap::new();
    for (raw_key, raw_profile) in map {
        let Ok(key) = raw_key.parse::<PromptKey>() else {
            report.dropped_malformed += 1;
            continue;
        };
        if let Some(profile) = normalize_profile(raw_profile, limits) {
            out.insert(key, profile);
        }
    }
    out
}

/// Normalize the profile map
#[must_use]
pub fn normalize_profiles(value: &Value, limits: &Limits) -> BTreeMap<PromptKey, LinkProfile> {
    let mut report = NormalizationReport::default();
    let mut profiles = profiles_with_report(Some(value), limits, &mut report);
    cap_entries(&mut profiles, limits.max_keyed_entries(), &mut report);
    profiles
}

/// Normalize the active prompt key, defaulting to the global key
#[must_use]
pub fn normalize_active_prompt_key(value: &Value) -> PromptKey {
    value
        .as_str()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default()
}

/// Normalize a revision counter
#[must_use]
pub fn normalize_revision(value: &Value) -> u64 {
    match value {
        Value::Number(number) => number.as_u64().unwrap_or(0),
        Value::String(raw) => raw.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Normalize a full state document
///
/// Pinned groups claim URLs before the free pool, so a URL present in both
/// stays pinned. Keyed entries for unknown links are pruned and an
/// unresolvable active key falls back to the global key.
#[must_use]
pub fn normalize_state(value: &Value, limits: &Limits) -> (WorkspaceState, NormalizationReport) {
    let mut report = NormalizationReport::default();
    let empty = serde_json::Map::new();
    let map = match value {
        Value::Object(map) => map,
        Value::Null => &empty,
        _ => {
            report.dropped_malformed += 1;
            &empty
        }
    };

    let mut seen = HashSet::new();
    let pinned_groups = groups_with_report(map.get("pinnedGroups"), limits, &mut seen, &mut report);
    let links = links_into_pool(
        map.get("links"),
        limits.max_links,
        limits,
        &mut seen,
        &mut report,
    );

    let mut prompts = text_map_with_report(map.get("prompts"), limits.max_prompt_chars, &mut report);
    let mut link_notes =
        text_map_with_report(map.get("linkNotes"), limits.max_note_chars, &mut report);
    let mut link_profiles = profiles_with_report(map.get("linkProfiles"), limits, &mut report);

    // Orphans go first so they never use up the cap.
    report.pruned_keys += prune_unknown(&mut prompts, &seen);
    report.pruned_keys += prune_unknown(&mut link_notes, &seen);
    report.pruned_keys += prune_unknown(&mut link_profiles, &seen);
    let max_keyed = limits.max_keyed_entries();
    cap_entries(&mut prompts, max_keyed, &mut report);
    cap_entries(&mut link_notes, max_keyed, &mut report);
    cap_entries(&mut link_profiles, max_keyed, &mut report);

    let mut active_prompt_key = map
        .get("activePromptKey")
        .map(normalize_active_prompt_key)
        .unwrap_or_default();
    if !key_is_known(&active_prompt_key, &seen) {
        active_prompt_key = PromptKey::Global;
    }

    let revision = map.get("revision").map(normalize_revision).unwrap_or(0);

    let state = WorkspaceState {
        links,
        pinned_groups,
        prompts,
        link_notes,
        link_profiles,
        active_prompt_key,
        revision,
    };

    if !report.is_clean() {
        tracing::debug!(?report, "normalization altered state input");
    }

    (state, report)
}

fn key_is_known(key: &PromptKey, known: &HashSet<String>) -> bool {
    key.url_identity().map_or(true, |identity| known.contains(identity))
}

fn prune_unknown<V>(map: &mut BTreeMap<PromptKey, V>, known: &HashSet<String>) -> usize {
    let before = map.len();
    map.retain(|key, _| key_is_known(key, known));
    before - map.len()
}

impl WorkspaceState {
    /// Parse and normalize an untrusted document
    #[must_use]
    pub fn from_value(value: &Value, limits: &Limits) -> Self {
        normalize_state(value, limits).0
    }

    /// Re-run normalization over a typed state
    #[must_use]
    pub fn normalized(&self, limits: &Limits) -> (Self, NormalizationReport) {
        let value = serde_json::to_value(self).unwrap_or_default();
        normalize_state(&value, limits)
    }
}
