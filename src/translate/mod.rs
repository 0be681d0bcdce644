//! Translation from virtual sector ranges to physical log locations.
//!
//! # Addressing
//!
//! Client sectors are shifted by a fixed reserved region before they reach the
//! index, so client sector 0 is index key `reserved_sectors`. An entry keyed
//! at `k` holding `{ p, len }` covers virtual bytes `[k*ss, k*ss + len)` and
//! physical sectors `[p, p + ceil(len / ss))`.
//!
//! # Write Path
//!
//! Writes append at the binding's log tail. Before the new entry goes in, any
//! older entries overlapping the written sectors are reconciled: an entry that
//! starts before the write is trimmed, entries starting inside it are dropped,
//! and whatever an overlapping entry held past the end of the write is
//! re-keyed at the first sector after it. Entries therefore never overlap and
//! every byte has at most one owner, the most recent write to it.
//!
//! # Read Path
//!
//! [`resolve`] walks the request with a byte cursor and emits one [`Segment`]
//! per physically contiguous run:
//!
//! 1. Empty index, or cursor at or past the end of the last entry: the rest of
//!    the request passes through unmapped (physical == virtual).
//! 2. Cursor covered by the entry at its sector, or by the nearest entry
//!    before it: read from that entry's physical extent up to its end.
//! 3. Otherwise the cursor sits in a hole between writes: zero-fill up to the
//!    next entry.
//!
//! Resolution is pure; the dispatcher turns segments into backing I/O.

mod resolve;
mod write;

pub use resolve::{resolve, Segment, Target};
pub use write::{translate_write, PhysicalWrite};

use crate::config::EngineConfig;
use crate::error::{Error, Result};

/// Sector size and reserved-region offset shared by both paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub sector_size: u32,
    pub reserved_sectors: u64,
}

impl Geometry {
    pub fn new(sector_size: u32, reserved_sectors: u64) -> Self {
        Self {
            sector_size,
            reserved_sectors,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.sector_size, config.reserved_sectors)
    }

    /// Index key for a client sector.
    pub fn key(&self, sector: u64) -> Result<u64> {
        sector
            .checked_add(self.reserved_sectors)
            .ok_or_else(|| Error::InvalidRequest(format!("sector {} out of range", sector)))
    }

    /// Sectors needed to hold `len` bytes.
    pub fn sectors(&self, len: u32) -> u64 {
        u64::from(len).div_ceil(u64::from(self.sector_size))
    }

    /// Byte address of a sector.
    pub fn bytes(&self, sector: u64) -> u64 {
        sector * u64::from(self.sector_size)
    }

    /// Checks that `[key, key + sectors(len))` is addressable in bytes.
    pub(crate) fn check_range(&self, key: u64, len: u32) -> Result<()> {
        key.checked_add(self.sectors(len))
            .and_then(|end| end.checked_mul(u64::from(self.sector_size)))
            .map(|_| ())
            .ok_or_else(|| {
                Error::InvalidRequest(format!("range at key {} len {} overflows", key, len))
            })
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
