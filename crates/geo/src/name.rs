//! Region naming: normalized keys, synonym folding, bounded fuzzy matching.
//!
//! Boundary datasets and administrative records disagree on names
//! ("NCT of Delhi" vs "Delhi", "Orissa" vs "Odisha"). Keys are folded
//! lexically, aliases are mapped through a [`SynonymTable`], and the
//! remaining mismatches are bridged by [`RegionKey::fuzzy_matches`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Shortest key allowed to match a longer one by containment.
pub const MIN_FUZZY_LEN: usize = 4;

/// Normalized region identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionKey(String);

impl RegionKey {
    /// Lexically fold a name: lowercase, `&` becomes `and`, any other
    /// non-alphanumeric run becomes one space, ends trimmed.
    ///
    /// Synonyms are not applied here; see [`SynonymTable::normalize`].
    pub fn new(name: &str) -> Self {
        let mut folded = String::with_capacity(name.len());
        for ch in name.chars() {
            if ch == '&' {
                folded.push_str(" and ");
            } else if ch.is_alphanumeric() {
                folded.extend(ch.to_lowercase());
            } else {
                folded.push(' ');
            }
        }
        Self(folded.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Equal keys match. Otherwise the shorter key (at least
    /// [`MIN_FUZZY_LEN`] chars) must appear in the longer one as a run of
    /// whole words.
    pub fn fuzzy_matches(&self, other: &RegionKey) -> bool {
        if self == other {
            return true;
        }

        let (short, long) = if self.0.len() <= other.0.len() {
            (&self.0, &other.0)
        } else {
            (&other.0, &self.0)
        };
        if short.len() < MIN_FUZZY_LEN {
            return false;
        }

        let short_words: Vec<&str> = short.split(' ').collect();
        let long_words: Vec<&str> = long.split(' ').collect();
        long_words
            .windows(short_words.len())
            .any(|w| w == short_words.as_slice())
    }
}

impl core::fmt::Display for RegionKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RegionKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Alias → canonical name mapping, applied after lexical folding.
///
/// This is configuration data. The default table covers known aliases in
/// Indian state boundary datasets; deployments extend it with
/// [`SynonymTable::with_alias`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynonymTable {
    aliases: HashMap<RegionKey, RegionKey>,
}

impl SynonymTable {
    pub fn empty() -> Self {
        Self {
            aliases: HashMap::new(),
        }
    }

    pub fn with_alias(mut self, alias: &str, canonical: &str) -> Self {
        self.insert(alias, canonical);
        self
    }

    pub fn insert(&mut self, alias: &str, canonical: &str) {
        self.aliases.insert(RegionKey::new(alias), RegionKey::new(canonical));
    }

    /// Map an already-folded key to its canonical form.
    pub fn canonical(&self, key: &RegionKey) -> RegionKey {
        self.aliases.get(key).cloned().unwrap_or_else(|| key.clone())
    }

    /// Fold `name` and apply synonyms.
    pub fn normalize(&self, name: &str) -> RegionKey {
        self.canonical(&RegionKey::new(name))
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl Default for SynonymTable {
    fn default() -> Self {
        Self::empty()
            .with_alias("NCT of Delhi", "Delhi")
            .with_alias("National Capital Territory of Delhi", "Delhi")
            .with_alias("New Delhi", "Delhi")
            .with_alias("Orissa", "Odisha")
            .with_alias("Pondicherry", "Puducherry")
            .with_alias("Uttaranchal", "Uttarakhand")
            .with_alias("Andaman & Nicobar", "Andaman and Nicobar Islands")
            .with_alias("Dadara & Nagar Havelli", "Dadra and Nagar Haveli")
            .with_alias("Jammu & Kashmir", "Jammu and Kashmir")
            .with_alias("Telengana", "Telangana")
    }
}
