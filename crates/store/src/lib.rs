//! ringkv-store: a data node's in-memory tables.
//!
//! Each node keeps two fully independent key-value tables selected by
//! [`TableTag`]: `own` for the keyspace the node is primary for, `prev`
//! for the replica of its predecessor's keyspace. The tables are sharded
//! concurrent maps, so operations on distinct keys do not block one
//! another and same-key operations linearize.

use dashmap::DashMap;
use ringkv_proto::TableTag;

/// The two tables of a data node.
#[derive(Debug, Default)]
pub struct DataStore {
    own: DashMap<String, String>,
    prev: DashMap<String, String>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, tag: TableTag) -> &DashMap<String, String> {
        match tag {
            TableTag::Own => &self.own,
            TableTag::Prev => &self.prev,
        }
    }

    /// Read a key from the tagged table.
    pub fn get(&self, key: &str, tag: TableTag) -> Option<String> {
        self.table(tag).get(key).map(|entry| entry.value().clone())
    }

    /// Unconditionally install a key-value pair in the tagged table.
    pub fn put(&self, key: impl Into<String>, value: impl Into<String>, tag: TableTag) {
        self.table(tag).insert(key.into(), value.into());
    }

    /// Replace the value only if the key is present. Reports whether a
    /// replacement happened.
    pub fn update(&self, key: &str, value: impl Into<String>, tag: TableTag) -> bool {
        match self.table(tag).get_mut(key) {
            Some(mut entry) => {
                *entry = value.into();
                true
            }
            None => false,
        }
    }

    /// Remove the key if present. Reports whether anything was removed.
    pub fn delete(&self, key: &str, tag: TableTag) -> bool {
        self.table(tag).remove(key).is_some()
    }

    /// Whether the key exists in the tagged table.
    pub fn contains(&self, key: &str, tag: TableTag) -> bool {
        self.table(tag).contains_key(key)
    }

    /// Number of entries in the tagged table.
    pub fn len(&self, tag: TableTag) -> usize {
        self.table(tag).len()
    }

    pub fn is_empty(&self) -> bool {
        self.own.is_empty() && self.prev.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
