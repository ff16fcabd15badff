// ABOUTME: Key-presence diff between two whitelists
// ABOUTME: Computes which records were added and which keys were removed

use std::collections::BTreeSet;

use super::record::{ItemRecord, Whitelist};

/// Result of comparing a previously published whitelist with a new one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhitelistDiff {
    /// Records present in the new whitelist but not the old one
    pub added: Vec<ItemRecord>,
    /// Keys present in the old whitelist but not the new one
    pub removed: Vec<String>,
}

impl WhitelistDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn added_keys(&self) -> impl Iterator<Item = &str> {
        self.added.iter().map(|record| record.key.as_str())
    }

    /// Apply this diff to an old key set, yielding the new key set.
    pub fn apply_to<'k>(&self, keys: impl IntoIterator<Item = &'k str>) -> BTreeSet<String> {
        let mut result: BTreeSet<String> = keys.into_iter().map(str::to_string).collect();
        for key in self.added_keys() {
            result.insert(key.to_string());
        }
        for key in &self.removed {
            result.remove(key);
        }
        result
    }
}

/// Compare two whitelists by key presence.
///
/// Keys present in both are not reported, even when their attributes
/// differ. Output follows key order but callers must not rely on it.
pub fn diff(old: &Whitelist, new: &Whitelist) -> WhitelistDiff {
    let added = new
        .records()
        .filter(|record| !old.contains_key(&record.key))
        .cloned()
        .collect();

    let removed = old
        .keys()
        .filter(|key| !new.contains_key(key))
        .map(str::to_string)
        .collect();

    WhitelistDiff { added, removed }
}
