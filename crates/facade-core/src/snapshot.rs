//! Configuration snapshots
//!
//! A [`ConfigSnapshot`] is an immutable key → value view of the desired server
//! configuration at one instant. Keys are opaque to the coordinator; values are
//! JSON values so scalar and array-typed fields keep their shape until the
//! façade properties are derived.
//!
//! Equality is value-based: two snapshots holding the same keys and values are
//! the same configuration, no matter where they came from.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Immutable key → value mapping describing the desired configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigSnapshot {
    entries: BTreeMap<String, Value>,
}

impl ConfigSnapshot {
    /// Create an empty snapshot
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a snapshot from key/value pairs
    ///
    /// Later pairs win when a key is repeated.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Return a copy of this snapshot with `key` set to `value`
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set `key` to `value`
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Look up a value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Look up a string value
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Iterate entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the snapshot holds no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Layer `snapshot` over `defaults`
    ///
    /// Every key of `snapshot` replaces the same key of `defaults`; keys only
    /// present in `defaults` are kept. A `None` snapshot yields the defaults.
    pub fn overlay(defaults: &ConfigSnapshot, snapshot: Option<&ConfigSnapshot>) -> ConfigSnapshot {
        let mut merged = defaults.clone();
        if let Some(snapshot) = snapshot {
            for (key, value) in &snapshot.entries {
                merged.entries.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ConfigSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}
