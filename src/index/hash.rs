//! Bucketed hash table backend.
//!
//! Keys are grouped into fixed ranges of `chunk_size` sectors: a key lives in
//! bucket `key / chunk_size`, and a bucket holds its entries unsorted. Exact
//! lookups hash straight to one bucket and scan only that bucket.
//!
//! # Ordered queries are slow
//!
//! The table keeps no order between buckets. It only remembers the lowest and
//! highest occupied bucket numbers. `prev`, `next` and `last` scan the bucket
//! of the query key and, on a miss, walk bucket numbers one at a time toward
//! those bounds, checking each for occupancy. With sparse keys this is
//! O(buckets) per query, not O(log n). Pick this backend when the workload is
//! dominated by exact re-reads of written sectors; prefer a tree or the skip
//! list when reads frequently land between writes.

use std::collections::HashMap;

use super::{IndexKind, MappingRecord, SectorIndex};
use crate::error::{Error, Result};

pub struct BucketedHash {
    chunk_size: u64,
    buckets: HashMap<u64, Vec<(u64, MappingRecord)>>,
    len: usize,
    // Occupied bucket bounds; meaningful only while `len > 0`.
    lowest: u64,
    highest: u64,
}

impl BucketedHash {
    pub fn new(chunk_size: u64) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            buckets: HashMap::new(),
            len: 0,
            lowest: 0,
            highest: 0,
        }
    }

    fn bucket_of(&self, key: u64) -> u64 {
        key / self.chunk_size
    }

    /// Number of occupied buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    fn refresh_bounds(&mut self) {
        self.lowest = self.buckets.keys().copied().min().unwrap_or(0);
        self.highest = self.buckets.keys().copied().max().unwrap_or(0);
    }
}

impl SectorIndex for BucketedHash {
    fn kind(&self) -> IndexKind {
        IndexKind::HashTable
    }

    fn insert(&mut self, key: u64, record: MappingRecord) -> Result<()> {
        let bucket_no = self.bucket_of(key);

        if let Some(bucket) = self.buckets.get_mut(&bucket_no) {
            if let Some(slot) = bucket.iter_mut().find(|(k, _)| *k == key) {
                slot.1 = record;
                return Ok(());
            }
            bucket
                .try_reserve(1)
                .map_err(|_| Error::AllocationFailure("hash index entry"))?;
            bucket.push((key, record));
        } else {
            // A bucket enters the table only once it holds its first entry.
            let mut bucket = Vec::new();
            bucket
                .try_reserve(1)
                .map_err(|_| Error::AllocationFailure("hash index entry"))?;
            bucket.push((key, record));
            self.buckets
                .try_reserve(1)
                .map_err(|_| Error::AllocationFailure("hash index bucket"))?;
            self.buckets.insert(bucket_no, bucket);
        }

        if self.len == 0 {
            self.lowest = bucket_no;
            self.highest = bucket_no;
        } else {
            self.lowest = self.lowest.min(bucket_no);
            self.highest = self.highest.max(bucket_no);
        }
        self.len += 1;
        Ok(())
    }

    fn lookup(&self, key: u64) -> Option<MappingRecord> {
        self.buckets
            .get(&self.bucket_of(key))?
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, record)| *record)
    }

    fn remove(&mut self, key: u64) {
        let bucket_no = self.bucket_of(key);
        let Some(bucket) = self.buckets.get_mut(&bucket_no) else {
            return;
        };
        let Some(pos) = bucket.iter().position(|(k, _)| *k == key) else {
            return;
        };

        bucket.swap_remove(pos);
        self.len -= 1;

        if bucket.is_empty() {
            self.buckets.remove(&bucket_no);
            if bucket_no == self.lowest || bucket_no == self.highest {
                self.refresh_bounds();
            }
        }
    }

    fn prev(&self, key: u64) -> Option<(u64, MappingRecord)> {
        if self.len == 0 || self.bucket_of(key) < self.lowest {
            return None;
        }

        let mut bucket_no = self.bucket_of(key).min(self.highest);
        loop {
            if let Some(bucket) = self.buckets.get(&bucket_no) {
                let best = bucket
                    .iter()
                    .filter(|(k, _)| *k < key)
                    .max_by_key(|(k, _)| *k);
                if let Some((k, record)) = best {
                    return Some((*k, *record));
                }
            }
            if bucket_no <= self.lowest {
                return None;
            }
            bucket_no -= 1;
        }
    }

    fn next(&self, key: u64) -> Option<(u64, MappingRecord)> {
        if self.len == 0 || self.bucket_of(key) > self.highest {
            return None;
        }

        let mut bucket_no = self.bucket_of(key).max(self.lowest);
        loop {
            if let Some(bucket) = self.buckets.get(&bucket_no) {
                let best = bucket
                    .iter()
                    .filter(|(k, _)| *k > key)
                    .min_by_key(|(k, _)| *k);
                if let Some((k, record)) = best {
                    return Some((*k, *record));
                }
            }
            if bucket_no >= self.highest {
                return None;
            }
            bucket_no += 1;
        }
    }

    fn last(&self) -> Option<(u64, MappingRecord)> {
        if self.len == 0 {
            return None;
        }
        self.buckets
            .get(&self.highest)?
            .iter()
            .max_by_key(|(k, _)| *k)
            .map(|(k, record)| (*k, *record))
    }

    fn len(&self) -> usize {
        self.len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(p: u64) -> MappingRecord {
        MappingRecord::new(p, 512)
    }

    #[test]
    fn test_keys_group_into_chunks() {
        let mut table = BucketedHash::new(2048);
        for key in [0, 1, 2047, 2048, 10_000] {
            table.insert(key, rec(key)).unwrap();
        }
        assert_eq!(table.bucket_count(), 3);
        assert_eq!(table.len(), 5);
        assert_eq!(table.lookup(2047), Some(rec(2047)));
        assert_eq!(table.lookup(2046), None);
    }

    #[test]
    fn test_prev_crosses_empty_buckets() {
        let mut table = BucketedHash::new(4);
        table.insert(1, rec(1)).unwrap();
        table.insert(400, rec(400)).unwrap();

        // Bucket of 399 holds nothing below it; the walk reaches bucket 0.
        assert_eq!(table.prev(399), Some((1, rec(1))));
        assert_eq!(table.prev(1), None);
        assert_eq!(table.prev(u64::MAX), Some((400, rec(400))));
        assert_eq!(table.next(2), Some((400, rec(400))));
        assert_eq!(table.next(400), None);
    }

    #[test]
    fn test_buckets_only_exist_while_occupied() {
        let mut table = BucketedHash::new(4);
        for round in 0..3u64 {
            for key in 0..40u64 {
                table.insert(key * 3, rec(round)).unwrap();
            }
            // Replacing keeps the bucket layout unchanged.
            table.insert(0, rec(99)).unwrap();
            assert_eq!(table.bucket_count(), 30);
            for key in 0..40u64 {
                table.remove(key * 3);
            }
            assert_eq!(table.bucket_count(), 0);
            assert!(table.is_empty());
        }
    }

    #[test]
    fn test_bounds_follow_removal() {
        let mut table = BucketedHash::new(10);
        table.insert(5, rec(5)).unwrap();
        table.insert(55, rec(55)).unwrap();
        table.insert(95, rec(95)).unwrap();

        table.remove(95);
        assert_eq!(table.last(), Some((55, rec(55))));
        table.remove(5);
        assert_eq!(table.prev(55), None);
        assert_eq!(table.next(0), Some((55, rec(55))));
        table.remove(55);
        assert!(table.is_empty());
        assert_eq!(table.bucket_count(), 0);
        assert_eq!(table.last(), None);

        // Re-populating after the table drained resets both bounds.
        table.insert(300, rec(300)).unwrap();
        assert_eq!(table.prev(301), Some((300, rec(300))));
        assert_eq!(table.next(299), Some((300, rec(300))));
    }
}
