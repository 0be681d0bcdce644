//! Multi-way search tree backend.
//!
//! Backed by `std::collections::BTreeMap`, whose wide nodes keep several keys
//! per allocation and cut the number of pointer chases per query compared to
//! a binary tree.

use std::collections::BTreeMap;
use std::ops::Bound;

use super::{IndexKind, MappingRecord, SectorIndex};
use crate::error::Result;

#[derive(Debug, Default)]
pub struct MultiwayTree {
    map: BTreeMap<u64, MappingRecord>,
}

impl MultiwayTree {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SectorIndex for MultiwayTree {
    fn kind(&self) -> IndexKind {
        IndexKind::MultiwayTree
    }

    fn insert(&mut self, key: u64, record: MappingRecord) -> Result<()> {
        self.map.insert(key, record);
        Ok(())
    }

    fn lookup(&self, key: u64) -> Option<MappingRecord> {
        self.map.get(&key).copied()
    }

    fn remove(&mut self, key: u64) {
        self.map.remove(&key);
    }

    fn prev(&self, key: u64) -> Option<(u64, MappingRecord)> {
        self.map
            .range(..key)
            .next_back()
            .map(|(key, record)| (*key, *record))
    }

    fn next(&self, key: u64) -> Option<(u64, MappingRecord)> {
        self.map
            .range((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(key, record)| (*key, *record))
    }

    fn last(&self) -> Option<(u64, MappingRecord)> {
        self.map
            .last_key_value()
            .map(|(key, record)| (*key, *record))
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}
