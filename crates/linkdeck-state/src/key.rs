//! Prompt keys
//!
//! A [`PromptKey`] addresses a prompt, note or profile entry. It is either the
//! global sentinel or derived from a link URL. On the wire it is a plain string:
//! `global` or `link:<url identity>`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const GLOBAL_WIRE: &str = "global";
const LINK_PREFIX: &str = "link:";

/// Case-insensitive identity of a URL
///
/// Two URLs are the same link when their identities are equal.
#[inline]
#[must_use]
pub fn url_identity(url: &str) -> String {
    url.trim().to_lowercase()
}

/// Compare two URLs by identity
#[inline]
#[must_use]
pub fn same_url(a: &str, b: &str) -> bool {
    url_identity(a) == url_identity(b)
}

/// Key of a prompt/note/profile entry
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PromptKey {
    /// The fixed sentinel key, always valid
    #[default]
    Global,
    /// Key derived from a link URL (holds the URL identity)
    Link(String),
}

impl PromptKey {
    /// Derive the key for a link URL
    #[inline]
    #[must_use]
    pub fn for_url(url: &str) -> Self {
        Self::Link(url_identity(url))
    }

    /// Check for the sentinel key
    #[inline]
    #[must_use]
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    /// URL identity for link keys
    #[inline]
    #[must_use]
    pub fn url_identity(&self) -> Option<&str> {
        match self {
            Self::Global => None,
            Self::Link(identity) => Some(identity),
        }
    }

    /// Wire representation
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self {
            Self::Global => GLOBAL_WIRE.to_string(),
            Self::Link(identity) => format!("{LINK_PREFIX}{identity}"),
        }
    }
}

impl fmt::Display for PromptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// Error parsing a prompt key
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid prompt key: '{0}'")]
pub struct PromptKeyError(pub String);

impl FromStr for PromptKey {
    type Err = PromptKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == GLOBAL_WIRE {
            return Ok(Self::Global);
        }

        match trimmed.strip_prefix(LINK_PREFIX) {
            Some(rest) if !rest.trim().is_empty() && !rest.trim().contains(char::is_whitespace) => {
                Ok(Self::for_url(rest))
            }
            _ => Err(PromptKeyError(s.to_string())),
        }
    }
}

impl TryFrom<String> for PromptKey {
    type Error = PromptKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PromptKey> for String {
    fn from(key: PromptKey) -> Self {
        key.to_wire()
    }
}
