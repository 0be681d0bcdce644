//! Sector index: an ordered map from virtual sector to mapping record.
//!
//! Every binding owns exactly one index. The index records where each write
//! landed in the log and answers the ordered queries the read resolver needs:
//!
//! - `lookup(k)`: exact hit
//! - `prev(k)`: largest key strictly below `k`
//! - `next(k)`: smallest key strictly above `k`
//! - `last()`: largest key
//!
//! # Backends
//!
//! Four interchangeable backends implement [`SectorIndex`]. They must agree on
//! the result of every operation for the same sequence of mutations; they only
//! differ in cost:
//!
//! | Backend | Module | lookup | prev / next / last |
//! |---|---|---|---|
//! | Balanced binary tree (AVL) | [`avl`] | O(log n) | O(log n) |
//! | Multi-way tree | [`btree`] | O(log n) | O(log n) |
//! | Skip list | [`skiplist`] | expected O(log n) | expected O(log n) |
//! | Bucketed hash table | [`hash`] | O(bucket) | O(buckets) worst case |
//!
//! The backend is chosen once, when a binding is created, from
//! [`IndexConfig::kind`]. Nothing outside this module branches on it.
//!
//! # Ownership
//!
//! Records are plain `Copy` values owned by the entry that holds them.
//! Inserting over an existing key replaces the record; removing a key drops it.

pub mod avl;
pub mod btree;
pub mod hash;
pub mod skiplist;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::IndexConfig;
use crate::error::{Error, Result};

pub use avl::AvlTree;
pub use btree::MultiwayTree;
pub use hash::BucketedHash;
pub use skiplist::SkipList;

/// Where one write landed in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MappingRecord {
    pub physical_sector: u64,
    pub length_bytes: u32,
}

impl MappingRecord {
    pub fn new(physical_sector: u64, length_bytes: u32) -> Self {
        Self {
            physical_sector,
            length_bytes,
        }
    }

    /// Number of sectors the extent occupies, rounded up.
    pub fn sectors(&self, sector_size: u32) -> u64 {
        u64::from(self.length_bytes).div_ceil(u64::from(sector_size))
    }
}

/// Ordered map from virtual sector to [`MappingRecord`].
pub trait SectorIndex: Send + Sync {
    /// Backend identity, for diagnostics only.
    fn kind(&self) -> IndexKind;

    /// Inserts a record, replacing any record already stored under `key`.
    ///
    /// Fails only with [`Error::AllocationFailure`].
    fn insert(&mut self, key: u64, record: MappingRecord) -> Result<()>;

    /// Returns the record stored under exactly `key`.
    fn lookup(&self, key: u64) -> Option<MappingRecord>;

    /// Removes `key`. Absent keys are ignored.
    fn remove(&mut self, key: u64);

    /// Entry with the largest key strictly less than `key`.
    fn prev(&self, key: u64) -> Option<(u64, MappingRecord)>;

    /// Entry with the smallest key strictly greater than `key`.
    fn next(&self, key: u64) -> Option<(u64, MappingRecord)>;

    /// Entry with the largest key.
    fn last(&self) -> Option<(u64, MappingRecord)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexKind {
    BalancedTree,
    MultiwayTree,
    #[serde(rename = "skiplist")]
    SkipList,
    HashTable,
}

impl IndexKind {
    pub const ALL: [IndexKind; 4] = [
        IndexKind::BalancedTree,
        IndexKind::MultiwayTree,
        IndexKind::SkipList,
        IndexKind::HashTable,
    ];

    /// Administrative name.
    pub fn name(&self) -> &'static str {
        match self {
            IndexKind::BalancedTree => "balanced-tree",
            IndexKind::MultiwayTree => "multiway-tree",
            IndexKind::SkipList => "skiplist",
            IndexKind::HashTable => "hash-table",
        }
    }

    /// Two-letter tag accepted as a shorthand.
    pub fn tag(&self) -> &'static str {
        match self {
            IndexKind::BalancedTree => "rb",
            IndexKind::MultiwayTree => "bt",
            IndexKind::SkipList => "sl",
            IndexKind::HashTable => "hm",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IndexKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        IndexKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s || kind.tag() == s)
            .ok_or_else(|| Error::UnsupportedIndex(s.to_string()))
    }
}

/// Creates an empty index as described by `config`.
pub fn new_index(config: &IndexConfig) -> Box<dyn SectorIndex> {
    let inner: Box<dyn SectorIndex> = match config.kind {
        IndexKind::BalancedTree => Box::new(AvlTree::new()),
        IndexKind::MultiwayTree => Box::new(MultiwayTree::new()),
        IndexKind::SkipList => Box::new(SkipList::new()),
        IndexKind::HashTable => Box::new(BucketedHash::new(config.hash_chunk_size)),
    };

    match config.max_entries {
        Some(max_entries) => Box::new(Bounded { inner, max_entries }),
        None => inner,
    }
}

/// Enforces an entry budget on top of any backend.
struct Bounded {
    inner: Box<dyn SectorIndex>,
    max_entries: usize,
}

impl SectorIndex for Bounded {
    fn kind(&self) -> IndexKind {
        self.inner.kind()
    }

    fn insert(&mut self, key: u64, record: MappingRecord) -> Result<()> {
        if self.inner.len() >= self.max_entries && self.inner.lookup(key).is_none() {
            return Err(Error::AllocationFailure("sector index entry budget exhausted"));
        }
        self.inner.insert(key, record)
    }

    fn lookup(&self, key: u64) -> Option<MappingRecord> {
        self.inner.lookup(key)
    }

    fn remove(&mut self, key: u64) {
        self.inner.remove(key)
    }

    fn prev(&self, key: u64) -> Option<(u64, MappingRecord)> {
        self.inner.prev(key)
    }

    fn next(&self, key: u64) -> Option<(u64, MappingRecord)> {
        self.inner.next(key)
    }

    fn last(&self) -> Option<(u64, MappingRecord)> {
        self.inner.last()
    }

    fn len(&self) -> usize {
        self.inner.len()
    }
}
