use itertools::Itertools;

use super::Geometry;
use crate::error::Result;
use crate::index::SectorIndex;

/// Where the bytes of one segment come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Bytes written through the log, at this physical byte address.
    Mapped(u64),
    /// Never written through the log; read at the same address unmapped.
    Passthrough(u64),
    /// Hole between writes; reads as zeros.
    Zero,
}

/// A contiguous run of a read request with a single source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Byte offset within the request.
    pub offset: u32,
    pub len: u32,
    pub target: Target,
}

impl Segment {
    /// Physical byte address, if the segment touches the backing device.
    pub fn physical(&self) -> Option<u64> {
        match self.target {
            Target::Mapped(at) | Target::Passthrough(at) => Some(at),
            Target::Zero => None,
        }
    }

    fn merge(self, next: Segment) -> std::result::Result<Segment, (Segment, Segment)> {
        let joined = match (self.target, next.target) {
            (Target::Zero, Target::Zero) => true,
            (Target::Mapped(a), Target::Mapped(b))
            | (Target::Passthrough(a), Target::Passthrough(b)) => a + u64::from(self.len) == b,
            _ => false,
        };
        if joined {
            Ok(Segment {
                len: self.len + next.len,
                ..self
            })
        } else {
            Err((self, next))
        }
    }
}

/// Splits a read of `len` bytes at client `sector` into segments.
///
/// Segments are in request order, cover the request exactly, and adjacent
/// segments with contiguous sources are merged. A zero-length read yields no
/// segments.
pub fn resolve(
    index: &dyn SectorIndex,
    geometry: Geometry,
    sector: u64,
    len: u32,
) -> Result<Vec<Segment>> {
    let key = geometry.key(sector)?;
    geometry.check_range(key, len)?;

    let ss = u64::from(geometry.sector_size);
    let start = geometry.bytes(key);
    let end = start + u64::from(len);
    let history_end = index
        .last()
        .map_or(0, |(k, r)| geometry.bytes(k) + u64::from(r.length_bytes));

    let mut segments = Vec::new();
    let mut cursor = start;

    while cursor < end {
        let offset = (cursor - start) as u32;

        if cursor >= history_end {
            segments.push(Segment {
                offset,
                len: (end - cursor) as u32,
                target: Target::Passthrough(cursor),
            });
            break;
        }

        let at = cursor / ss;
        let covering = index
            .lookup(at)
            .map(|r| (at, r))
            .or_else(|| index.prev(at))
            .filter(|(k, r)| geometry.bytes(*k) + u64::from(r.length_bytes) > cursor);

        let (seg_end, target) = match covering {
            Some((k, r)) => {
                let base = geometry.bytes(k);
                let physical = geometry.bytes(r.physical_sector) + (cursor - base);
                let seg_end = end.min(base + u64::from(r.length_bytes));
                (seg_end, Target::Mapped(physical))
            }
            None => {
                let gap_end = index.next(at).map_or(end, |(k, _)| geometry.bytes(k));
                (end.min(gap_end), Target::Zero)
            }
        };

        segments.push(Segment {
            offset,
            len: (seg_end - cursor) as u32,
            target,
        });
        cursor = seg_end;
    }

    Ok(segments.into_iter().coalesce(Segment::merge).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::index::{new_index, IndexKind, MappingRecord};
    use crate::translate::translate_write;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn seg(offset: u32, len: u32, target: Target) -> Segment {
        Segment {
            offset,
            len,
            target,
        }
    }

    fn write(index: &mut dyn SectorIndex, tail: &mut u64, geometry: Geometry, sector: u64, len: u32) {
        translate_write(index, tail, geometry, sector, len).unwrap();
    }

    #[test]
    fn test_empty_index_passes_through() {
        for kind in IndexKind::ALL {
            let index = new_index(&IndexConfig::new(kind));
            let geometry = Geometry::new(512, 32);
            let segments = resolve(index.as_ref(), geometry, 10, 4096).unwrap();
            assert_eq!(segments, vec![seg(0, 4096, Target::Passthrough(42 * 512))]);
        }
    }

    #[test]
    fn test_zero_length_read_has_no_segments() {
        let mut index = new_index(&IndexConfig::default());
        index.insert(32, MappingRecord::new(32, 512)).unwrap();
        assert!(resolve(index.as_ref(), Geometry::default(), 0, 0)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_exact_hit_reads_written_extent() {
        let mut index = new_index(&IndexConfig::default());
        let geometry = Geometry::new(512, 32);
        let mut tail = 32;
        write(index.as_mut(), &mut tail, geometry, 5, 512);
        write(index.as_mut(), &mut tail, geometry, 0, 4096);

        let segments = resolve(index.as_ref(), geometry, 0, 4096).unwrap();
        assert_eq!(segments, vec![seg(0, 4096, Target::Mapped(33 * 512))]);
    }

    #[test]
    fn test_read_inside_extent_starts_mid_record() {
        let mut index = new_index(&IndexConfig::default());
        let geometry = Geometry::new(512, 0);
        let mut tail = 100;
        write(index.as_mut(), &mut tail, geometry, 0, 4096);
        write(index.as_mut(), &mut tail, geometry, 20, 512);

        let segments = resolve(index.as_ref(), geometry, 2, 1024).unwrap();
        assert_eq!(segments, vec![seg(0, 1024, Target::Mapped(102 * 512))]);
    }

    #[test]
    fn test_fragmented_read() {
        // One-byte sectors make sectors and bytes interchangeable.
        for kind in IndexKind::ALL {
            let mut index = new_index(&IndexConfig::new(kind));
            let geometry = Geometry::new(1, 0);
            let mut tail = 1000;
            write(index.as_mut(), &mut tail, geometry, 0, 100);
            write(index.as_mut(), &mut tail, geometry, 200, 50);

            let segments = resolve(index.as_ref(), geometry, 0, 300).unwrap();
            assert_eq!(
                segments,
                vec![
                    seg(0, 100, Target::Mapped(1000)),
                    seg(100, 100, Target::Zero),
                    seg(200, 50, Target::Mapped(1100)),
                    seg(250, 50, Target::Passthrough(250)),
                ],
                "{}",
                kind
            );
        }
    }

    #[test]
    fn test_sequential_writes_coalesce() {
        let mut index = new_index(&IndexConfig::default());
        let geometry = Geometry::new(512, 32);
        let mut tail = 32;
        for sector in 0..4 {
            write(index.as_mut(), &mut tail, geometry, sector, 512);
        }

        let segments = resolve(index.as_ref(), geometry, 0, 2048).unwrap();
        assert_eq!(segments, vec![seg(0, 2048, Target::Mapped(32 * 512))]);
    }

    #[test]
    fn test_partial_last_sector_reads_zero_tail_before_next_write() {
        let mut index = new_index(&IndexConfig::default());
        let geometry = Geometry::new(512, 0);
        let mut tail = 10;
        write(index.as_mut(), &mut tail, geometry, 0, 100);
        write(index.as_mut(), &mut tail, geometry, 1, 512);

        let segments = resolve(index.as_ref(), geometry, 0, 1024).unwrap();
        assert_eq!(
            segments,
            vec![
                seg(0, 100, Target::Mapped(10 * 512)),
                seg(100, 412, Target::Zero),
                seg(512, 512, Target::Mapped(11 * 512)),
            ]
        );
    }

    #[test]
    fn test_read_after_overwrite_sees_newest_bytes() {
        // Model every virtual byte's owning write and compare against the
        // resolver after a random history of overlapping writes.
        for kind in IndexKind::ALL {
            let mut rng = StdRng::seed_from_u64(42);
            let mut index = new_index(&IndexConfig::new(kind).hash_chunk_size(16));
            let geometry = Geometry::new(4, 0);
            let mut tail = 1 << 20;
            let mut owner: Vec<Option<u64>> = vec![None; 1024];

            for _ in 0..300 {
                let sector = rng.gen_range(0..200u64);
                let len = rng.gen_range(1..48u32);
                let w = translate_write(index.as_mut(), &mut tail, geometry, sector, len).unwrap();
                let sectors = geometry.sectors(len);
                let first = geometry.bytes(sector) as usize;
                // The write owns its whole sector span; bytes past `len` become holes.
                for i in 0..geometry.bytes(sectors) as usize {
                    owner[first + i] = if (i as u32) < len {
                        Some(geometry.bytes(w.sector) + i as u64)
                    } else {
                        None
                    };
                }
            }

            let last_written = owner.iter().rposition(Option::is_some).unwrap_or(0);
            let segments = resolve(index.as_ref(), geometry, 0, 1024).unwrap();
            assert_eq!(segments.iter().map(|s| s.len).sum::<u32>(), 1024);

            for s in &segments {
                for i in 0..s.len {
                    let byte = (s.offset + i) as usize;
                    let got = match s.target {
                        Target::Mapped(at) => Some(at + u64::from(i)),
                        Target::Zero => None,
                        Target::Passthrough(at) => {
                            assert!(byte > last_written, "{}: passthrough at {}", kind, byte);
                            assert_eq!(at + u64::from(i), byte as u64);
                            continue;
                        }
                    };
                    assert_eq!(got, owner[byte], "{}: byte {}", kind, byte);
                }
            }
        }
    }
}
