//! The [`ChannelId`] newtype.
//!
//! Channel identity on the wire is a fixed-width string (`CH001`..`CH999`),
//! but inbound messages are inconsistent about how they spell it:
//! `STATUS` uses the canonical `CH005`, `STATUS_ALL` entries carry a bare
//! numeric suffix (`"001"`), and `REPORT` uses a lowercase prefix
//! (`"ch003"`). The constructors here centralize those normalizations so
//! lookups always run against the canonical form.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Canonical channel identifier (`CH001`-style, fixed three-digit index).
///
/// Ordering is lexicographic, which for the fixed-width form is also
/// numeric — the channel map iterates densely `CH001..CH{N}`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Wrap an already-canonical identifier verbatim (`STATUS` addressing).
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Build from a 1-based channel index: `3` → `CH003`.
    pub fn from_index(index: u32) -> Self {
        Self(format!("CH{index:03}"))
    }

    /// Build from a bare numeric wire suffix: `"003"` → `CH003`.
    ///
    /// Used for `STATUS_ALL` entries, which omit the `CH` prefix.
    pub fn from_wire_suffix(suffix: &str) -> Self {
        Self(format!("CH{suffix}"))
    }

    /// Build from a full wire identifier, normalizing a lowercase `ch`
    /// prefix: `"ch003"` → `CH003`, `"CH003"` unchanged.
    ///
    /// Anything else is passed through verbatim so an unrecognized ID
    /// fails the channel lookup instead of being silently rewritten.
    pub fn from_wire(raw: &str) -> Self {
        match raw.strip_prefix("ch") {
            Some(rest) => Self(format!("CH{rest}")),
            None => Self(raw.to_owned()),
        }
    }

    /// The canonical string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
