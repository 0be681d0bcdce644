use tracing::{debug, trace};

use super::Geometry;
use crate::error::{Error, Result};
use crate::index::{MappingRecord, SectorIndex};

/// Physical placement chosen for one write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalWrite {
    /// First physical sector of the extent.
    pub sector: u64,
    pub len: u32,
    /// The extent was reused instead of appended.
    pub in_place: bool,
}

/// Picks the physical extent for a write of `len` bytes at client `sector`
/// and records it in `index`.
///
/// Caller must hold the binding's writer lock for the whole call so that the
/// tail read and the tail advance are one step.
///
/// A repeat write of the same length to a key whose extent ends exactly at
/// the tail overwrites that extent in place and leaves the tail alone.
/// Otherwise the write lands at `log_tail`, overlapping entries are
/// reconciled, and the tail advances by the rounded-up sector count.
///
/// On error neither `index` nor `log_tail` is changed.
pub fn translate_write(
    index: &mut dyn SectorIndex,
    log_tail: &mut u64,
    geometry: Geometry,
    sector: u64,
    len: u32,
) -> Result<PhysicalWrite> {
    if len == 0 {
        return Err(Error::InvalidRequest("zero-length write".to_string()));
    }
    let key = geometry.key(sector)?;
    geometry.check_range(key, len)?;

    let sectors = geometry.sectors(len);
    let end_key = key + sectors;
    let existing = index.lookup(key);

    if let Some(old) = existing {
        if old.length_bytes == len && old.physical_sector + sectors == *log_tail {
            debug!(key, physical = old.physical_sector, len, "rewrite in place");
            return Ok(PhysicalWrite {
                sector: old.physical_sector,
                len,
                in_place: true,
            });
        }
    }

    let new_tail = log_tail
        .checked_add(sectors)
        .ok_or(Error::AllocationFailure("log tail exhausted"))?;
    let record = MappingRecord::new(*log_tail, len);

    let plan = plan_overlaps(index, geometry, key, end_key, existing);

    // Inserts that can claim a new slot go first so a failure leaves nothing
    // behind. The spill key is vacant: no entry overlaps its predecessor.
    if let Some(spill) = plan.spill {
        index.insert(end_key, spill)?;
    }
    if let Err(e) = index.insert(key, record) {
        if plan.spill.is_some() {
            index.remove(end_key);
        }
        return Err(e);
    }

    // Only replacements and removals from here on.
    for covered in &plan.covered {
        index.remove(*covered);
    }
    if let Some((head_key, head)) = plan.head {
        index.insert(head_key, head)?;
    }

    trace!(
        key,
        physical = record.physical_sector,
        len,
        covered = plan.covered.len(),
        trimmed = plan.head.is_some(),
        spilled = plan.spill.is_some(),
        "appended write"
    );

    *log_tail = new_tail;
    Ok(PhysicalWrite {
        sector: record.physical_sector,
        len,
        in_place: false,
    })
}

/// Entries a write to `[key, end_key)` supersedes.
struct OverlapPlan {
    /// Entry starting before `key`, cut short to end at `key`.
    head: Option<(u64, MappingRecord)>,
    /// Keys strictly inside the write, other than `key` itself.
    covered: Vec<u64>,
    /// What the last overlapping entry held past `end_key`, re-keyed there.
    spill: Option<MappingRecord>,
}

fn plan_overlaps(
    index: &dyn SectorIndex,
    geometry: Geometry,
    key: u64,
    end_key: u64,
    existing: Option<MappingRecord>,
) -> OverlapPlan {
    let ss = geometry.sector_size;
    let mut straddler = None;

    let head = index
        .prev(key)
        .filter(|(k, r)| k + r.sectors(ss) > key)
        .map(|(k, r)| {
            straddler = Some((k, r));
            let kept = geometry.bytes(key - k) as u32;
            (k, MappingRecord::new(r.physical_sector, kept))
        });

    if let Some(old) = existing {
        straddler = Some((key, old));
    }

    let mut covered = Vec::new();
    let mut cursor = key;
    while let Some((k, r)) = index.next(cursor) {
        if k >= end_key {
            break;
        }
        covered.push(k);
        straddler = Some((k, r));
        cursor = k;
    }

    let spill = straddler.and_then(|(k, r)| {
        let skip = end_key - k;
        if k + r.sectors(ss) <= end_key {
            return None;
        }
        let skipped = geometry.bytes(skip) as u32;
        Some(MappingRecord::new(
            r.physical_sector + skip,
            r.length_bytes - skipped,
        ))
    });

    OverlapPlan {
        head,
        covered,
        spill,
    }
}
