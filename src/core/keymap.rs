//! Case-Insensitive Metadata Map
//!
//! Lobby and member metadata use case-insensitive key lookup but preserve
//! the casing of the first writer. Backed by a BTreeMap so iteration order
//! is deterministic across peers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Key→value string map with case-insensitive key lookup.
///
/// An empty value counts as a stored key (it is "blank", not absent).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMap {
    entries: BTreeMap<String, String>,
}

impl KeyMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the stored key matching `key` case-insensitively.
    fn canonical_key(&self, key: &str) -> Option<&str> {
        self.entries
            .keys()
            .find(|k| k.eq_ignore_ascii_case(key))
            .map(String::as_str)
    }

    /// Look up a value, case-insensitive on the key.
    pub fn get(&self, key: &str) -> Option<&str> {
        let canonical = self.canonical_key(key)?;
        self.entries.get(canonical).map(String::as_str)
    }

    /// Insert or update a value.
    ///
    /// If a key already exists under different casing, that stored casing
    /// wins and only the value changes. Returns `true` if the stored value
    /// actually changed.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        if let Some(existing) = self.canonical_key(key).map(str::to_owned) {
            if let Some(slot) = self.entries.get_mut(&existing) {
                if slot == value {
                    return false;
                }
                *slot = value.to_owned();
                return true;
            }
        }
        self.entries.insert(key.to_owned(), value.to_owned());
        true
    }

    /// Remove a key (case-insensitive). Returns `true` if a key was removed.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.canonical_key(key).map(str::to_owned) {
            Some(existing) => self.entries.remove(&existing).is_some(),
            None => false,
        }
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Key/value pair by index into the deterministic iteration order.
    pub fn get_index(&self, index: usize) -> Option<(&str, &str)> {
        self.entries
            .iter()
            .nth(index)
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate pairs in deterministic order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
