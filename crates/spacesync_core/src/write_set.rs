//! Buffered entry writes.

use serde_json::Value;
use std::collections::btree_map::{self, BTreeMap};

/// A buffered write to one key.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingWrite {
    /// Insert or overwrite the key.
    Put(Value),
    /// Tombstone the key.
    Delete,
}

impl PendingWrite {
    /// Returns the value a reader sees through this write.
    #[must_use]
    pub fn visible_value(&self) -> Option<&Value> {
        match self {
            Self::Put(value) => Some(value),
            Self::Delete => None,
        }
    }
}

/// Writes buffered by a transaction or a single mutator, keyed by entry key.
///
/// A later write to the same key replaces the earlier one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteSet {
    writes: BTreeMap<String, PendingWrite>,
}

impl WriteSet {
    /// Creates an empty write set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffers a put.
    pub fn put(&mut self, key: impl Into<String>, value: Value) {
        self.writes.insert(key.into(), PendingWrite::Put(value));
    }

    /// Buffers a delete.
    pub fn delete(&mut self, key: impl Into<String>) {
        self.writes.insert(key.into(), PendingWrite::Delete);
    }

    /// Returns the buffered write for `key`, if any.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&PendingWrite> {
        self.writes.get(key)
    }

    /// Applies `other` on top of this set.
    pub fn merge(&mut self, other: WriteSet) {
        self.writes.extend(other.writes);
    }

    /// Number of keys written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    /// Returns true if nothing was written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    /// Iterates writes in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, PendingWrite> {
        self.writes.iter()
    }

    /// Iterates writes whose key starts with `prefix`, in key order.
    pub fn range_prefix<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a PendingWrite)> + 'a {
        self.writes
            .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(prefix))
    }

    /// Overlays writes under `prefix` onto a view of live values.
    pub(crate) fn overlay_prefix(&self, view: &mut BTreeMap<String, Value>, prefix: &str) {
        for (key, write) in self.range_prefix(prefix) {
            match write {
                PendingWrite::Put(value) => {
                    view.insert(key.clone(), value.clone());
                }
                PendingWrite::Delete => {
                    view.remove(key);
                }
            }
        }
    }
}

impl IntoIterator for WriteSet {
    type Item = (String, PendingWrite);
    type IntoIter = btree_map::IntoIter<String, PendingWrite>;

    fn into_iter(self) -> Self::IntoIter {
        self.writes.into_iter()
    }
}
