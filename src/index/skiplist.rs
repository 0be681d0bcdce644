//! Skip list backend.
//!
//! Built on `crossbeam_skiplist::SkipMap`. Nodes carry towers of random
//! height; ordered queries start at the top level of the head tower and
//! descend:
//!
//! - `prev(k)`: at each level move right while the next key is `< k`, then
//!   drop a level; the node reached on level 0 is the predecessor
//!   (`upper_bound(Excluded(k))`)
//! - `next(k)`: the mirror image (`lower_bound(Excluded(k))`)
//! - `last()`: descend the same way with an unbounded key (`back()`)
//!
//! All three are expected O(log n).

use std::ops::Bound;

use crossbeam_skiplist::{map::Entry, SkipMap};

use super::{IndexKind, MappingRecord, SectorIndex};
use crate::error::Result;

pub struct SkipList {
    map: SkipMap<u64, MappingRecord>,
}

impl SkipList {
    pub fn new() -> Self {
        Self {
            map: SkipMap::new(),
        }
    }
}

impl Default for SkipList {
    fn default() -> Self {
        Self::new()
    }
}

fn pair(entry: Entry<'_, u64, MappingRecord>) -> (u64, MappingRecord) {
    (*entry.key(), *entry.value())
}

impl SectorIndex for SkipList {
    fn kind(&self) -> IndexKind {
        IndexKind::SkipList
    }

    fn insert(&mut self, key: u64, record: MappingRecord) -> Result<()> {
        self.map.insert(key, record);
        Ok(())
    }

    fn lookup(&self, key: u64) -> Option<MappingRecord> {
        self.map.get(&key).map(|entry| *entry.value())
    }

    fn remove(&mut self, key: u64) {
        self.map.remove(&key);
    }

    fn prev(&self, key: u64) -> Option<(u64, MappingRecord)> {
        self.map.upper_bound(Bound::Excluded(&key)).map(pair)
    }

    fn next(&self, key: u64) -> Option<(u64, MappingRecord)> {
        self.map.lower_bound(Bound::Excluded(&key)).map(pair)
    }

    fn last(&self) -> Option<(u64, MappingRecord)> {
        self.map.back().map(pair)
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descending_insert_order() {
        let mut list = SkipList::new();
        for key in (0..200u64).rev() {
            list.insert(key * 10, MappingRecord::new(key, 4096)).unwrap();
        }
        assert_eq!(list.len(), 200);
        assert_eq!(list.prev(15), Some((10, MappingRecord::new(1, 4096))));
        assert_eq!(list.next(15), Some((20, MappingRecord::new(2, 4096))));
        assert_eq!(list.last(), Some((1990, MappingRecord::new(199, 4096))));
    }

    #[test]
    fn test_removed_key_is_invisible() {
        let mut list = SkipList::new();
        list.insert(1, MappingRecord::new(1, 1)).unwrap();
        list.insert(2, MappingRecord::new(2, 1)).unwrap();
        list.remove(2);

        assert_eq!(list.lookup(2), None);
        assert_eq!(list.last(), Some((1, MappingRecord::new(1, 1))));
        assert_eq!(list.next(1), None);
        assert_eq!(list.len(), 1);
    }
}
