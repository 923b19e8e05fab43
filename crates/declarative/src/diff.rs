//! Tag set reconciliation
//!
//! Tags are the one field every resource type shares, and every provider
//! exposes them the same way: one call to remove keys, one call to add or
//! overwrite key/value pairs. [`TagDiff`] computes both sets up front so an
//! empty set suppresses its provider call entirely.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Key/value tags attached to a resource
pub type TagSet = BTreeMap<String, String>;

/// Delta between the tags a resource has and the tags it should have
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDiff {
    /// Keys present on the resource but absent from the desired tags
    pub remove: BTreeSet<String>,
    /// Desired entries that are missing or carry a different value
    pub upsert: TagSet,
}

impl TagDiff {
    /// Compute the delta from `old` (actual) to `new` (desired)
    pub fn between(old: &TagSet, new: &TagSet) -> Self {
        let remove = old
            .keys()
            .filter(|key| !new.contains_key(*key))
            .cloned()
            .collect();

        let upsert = new
            .iter()
            .filter(|(key, value)| old.get(*key) != Some(*value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Self { remove, upsert }
    }

    /// Check if the tags already match
    pub fn is_empty(&self) -> bool {
        self.remove.is_empty() && self.upsert.is_empty()
    }

    /// Keys to remove, in a form ready for an untag call
    pub fn remove_keys(&self) -> Vec<String> {
        self.remove.iter().cloned().collect()
    }
}

/// Convert `(key, value)` pairs into a tag set; later duplicates win
pub fn tag_set<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> TagSet
where
    K: Into<String>,
    V: Into<String>,
{
    pairs
        .into_iter()
        .map(|(key, value)| (key.into(), value.into()))
        .collect()
}
