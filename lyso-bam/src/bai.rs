//! BAI index model (C7) and region query engine (C8).
//!
//! The BAI layout mirrors tabix's `.tbi` (UCSC/SAM binning scheme, §5 levels,
//! widths `2^17..2^29`) minus the tabix-specific column/format header: a BAI
//! simply assumes the same reference order as its BAM's header.

use fxhash::FxHashMap;

use crate::bgzf::VirtualOffset;
use crate::cursor::Cursor;
use crate::header::ReferenceDictionary;
use crate::{BamError, BamWarning, DecodeErrorKind, ReaderConfig, ReferenceNameNormalisation, BAI_MAGIC};

const MIN_SHIFT: u32 = 14;
/// Bin 37450 carries per-reference mapped/unmapped read counts instead of chunks.
const PSEUDO_BIN: u16 = 37450;

/// Bin-number offset of each level's first bin, finest level last.
/// Derived from `t_k = (8^(6-k) - 1)/7` for `k` in `1..=5` at
/// `min_shift = 14`, `n_lvls = 5`; see `reg2bin`'s doc comment.
const LEVEL_OFFSETS: [i64; 5] = [1, 9, 73, 585, 4681];
/// Bit-shift for each level, coarsest (`1 << 26`) to finest (`1 << 14`).
const LEVEL_SHIFTS: [u32; 5] = [26, 23, 20, 17, 14];

/// Compute the bin number covering the 0-based half-open interval `[beg, end)`.
///
/// Matches `hts_reg2bin` with `min_shift = 14`, `n_lvls = 5`: the hierarchy
/// has 5 levels below the whole-sequence bin 0, each dividing its parent
/// into 8 children, so a level-`k` bin spans `2^(14 + 3*(5-k))` bases.
pub fn reg2bin(beg: i64, end: i64) -> u16 {
    let beg = beg.max(0);
    let end = (end.max(beg + 1) - 1).max(0);
    // Finest level first: the deepest bin that fully contains [beg, end) is
    // the one we want, and a coarser level always also contains it.
    for (offset, shift) in LEVEL_OFFSETS.iter().zip(LEVEL_SHIFTS).rev() {
        if (beg >> shift) == (end >> shift) {
            return (offset + (beg >> shift)) as u16;
        }
    }
    0
}

/// All bin numbers that a region at `[beg, end)` could possibly fall into,
/// across every level of the hierarchy. A superset of what actually holds
/// data; candidates with no entry in [`ReferenceIndex::bins`] are simply
/// skipped by the caller.
pub fn reg2bins(beg: i64, end: i64) -> Vec<u16> {
    let beg = beg.max(0);
    let end = (end.max(beg + 1) - 1).max(0);
    let mut bins = vec![0u16];
    for (offset, shift) in LEVEL_OFFSETS.iter().zip(LEVEL_SHIFTS) {
        let lo = offset + (beg >> shift);
        let hi = offset + (end >> shift);
        bins.extend((lo..=hi).map(|b| b as u16));
    }
    bins
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: VirtualOffset,
    pub end: VirtualOffset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReferenceStats {
    pub mapped: u64,
    pub unmapped: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    pub bins: FxHashMap<u16, Vec<Chunk>>,
    /// One entry per 16 KiB (`1 << MIN_SHIFT`) window of the reference.
    pub linear_index: Vec<VirtualOffset>,
    pub stats: Option<ReferenceStats>,
}

/// A fully-loaded BAI index: one [`ReferenceIndex`] per reference, in the
/// same order as the BAM header's reference dictionary.
#[derive(Debug, Clone, Default)]
pub struct BaiIndex {
    pub references: Vec<ReferenceIndex>,
    pub n_no_coor: Option<u64>,
}

pub fn parse_bai(input: &[u8], warnings: &mut Vec<BamWarning>) -> Result<BaiIndex, BamError> {
    let mut c = Cursor::new(input);

    let magic = c.read_bytes(4)?;
    if magic != BAI_MAGIC {
        return Err(DecodeErrorKind::BadMagic.into());
    }

    let n_ref = c.read_i32()?;
    if n_ref < 0 {
        return Err(DecodeErrorKind::BadCount(n_ref as i64).into());
    }

    let mut references = Vec::with_capacity(n_ref as usize);
    for ref_id in 0..n_ref as usize {
        let mut index = ReferenceIndex::default();

        let n_bin = c.read_i32()?;
        for _ in 0..n_bin {
            let bin = c.read_u32()? as u16;
            let n_chunk = c.read_i32()?;
            if bin == PSEUDO_BIN {
                // Bin 37450 stores per-reference mapped/unmapped read
                // counts instead of chunks: the first "chunk"'s (beg, end)
                // fields hold those two counts; any further chunk is
                // reserved and ignored.
                let mapped = c.read_u64()?;
                let unmapped = c.read_u64()?;
                for _ in 1..n_chunk {
                    c.skip(16)?;
                }
                index.stats = Some(ReferenceStats { mapped, unmapped });
                continue;
            }
            let mut chunks = Vec::with_capacity(n_chunk.max(0) as usize);
            for _ in 0..n_chunk {
                let start = VirtualOffset::from_raw(c.read_u64()?);
                let end = VirtualOffset::from_raw(c.read_u64()?);
                chunks.push(Chunk { start, end });
            }
            index.bins.insert(bin, chunks);
        }

        let n_intv = c.read_i32()?;
        let mut linear_index = Vec::with_capacity(n_intv.max(0) as usize);
        let mut prev = 0u64;
        for slot in 0..n_intv {
            let raw = c.read_u64()?;
            if raw != 0 && raw < prev {
                warnings.push(BamWarning::NonMonotonicLinearIndex {
                    reference_id: ref_id,
                    index: slot as usize,
                });
            }
            prev = raw;
            linear_index.push(VirtualOffset::from_raw(raw));
        }
        index.linear_index = linear_index;

        references.push(index);
    }

    let n_no_coor = if c.remaining() >= 8 {
        Some(c.read_u64()?)
    } else {
        None
    };

    Ok(BaiIndex {
        references,
        n_no_coor,
    })
}

/// Resolves region queries against a [`BaiIndex`] and its reference
/// dictionary: name lookup, candidate-bin enumeration, chunk merging, and
/// linear-index pruning.
pub struct RegionQuery<'a> {
    index: &'a BaiIndex,
    references: &'a ReferenceDictionary,
    config: ReaderConfig,
}

impl<'a> RegionQuery<'a> {
    pub fn new(index: &'a BaiIndex, references: &'a ReferenceDictionary, config: ReaderConfig) -> Self {
        RegionQuery {
            index,
            references,
            config,
        }
    }

    /// Resolve a region name to a reference id, applying the configured
    /// fallback normalisation (stripping a leading `chr`/`CHR`) if an exact
    /// match fails.
    pub fn resolve_reference(&self, name: &str) -> Option<i32> {
        if let Some(id) = self.references.id_of(name) {
            return Some(id);
        }
        if self.config.reference_name_normalisation == ReferenceNameNormalisation::StripChr {
            let stripped = name.strip_prefix("chr").or_else(|| name.strip_prefix("CHR"));
            if let Some(stripped) = stripped {
                return self.references.id_of(stripped);
            }
            // Also try the reverse: a dictionary using "chr1" when queried with "1".
            for entry in self.references.iter() {
                if let Some(dict_stripped) = entry
                    .name
                    .strip_prefix("chr")
                    .or_else(|| entry.name.strip_prefix("CHR"))
                {
                    if dict_stripped == name {
                        return self.references.id_of(&entry.name);
                    }
                }
            }
        }
        None
    }

    /// Chunks that might contain records overlapping `[start, end)` on
    /// `ref_id`, pruned by the linear index and merged when the compressed-byte
    /// gap between adjacent chunks is within [`ReaderConfig::chunk_merge_gap`].
    pub fn chunks(&self, ref_id: i32, start: i64, end: i64) -> Option<Vec<Chunk>> {
        let index = self.index.references.get(usize::try_from(ref_id).ok()?)?;

        let min_offset = index
            .linear_index
            .get((start.max(0) as u64 >> MIN_SHIFT) as usize)
            .copied()
            .unwrap_or(VirtualOffset::from_raw(0));

        let mut chunks: Vec<Chunk> = reg2bins(start, end)
            .into_iter()
            .filter_map(|bin| index.bins.get(&bin))
            .flatten()
            .filter(|chunk| chunk.end > min_offset)
            .copied()
            .collect();

        chunks.sort_by_key(|c| c.start);
        Some(merge_chunks(chunks, self.config.chunk_merge_gap))
    }
}

fn merge_chunks(chunks: Vec<Chunk>, gap: u64) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        match merged.last_mut() {
            Some(last) if chunk.start.coffset().saturating_sub(last.end.coffset()) <= gap => {
                if chunk.end > last.end {
                    last.end = chunk.end;
                }
            }
            _ => merged.push(chunk),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reg2bin_matches_known_values() {
        assert_eq!(reg2bin(0, 16384), 4681);
        assert_eq!(reg2bin(0, 16385), 585);
        assert_eq!(reg2bin(0, 1 << 29), 0);
    }

    #[test]
    fn reg2bin_is_deterministic_and_in_range() {
        for (beg, end) in [(100, 200), (16384, 32768), (1 << 20, (1 << 20) + 5)] {
            let a = reg2bin(beg, end);
            let b = reg2bin(beg, end);
            assert_eq!(a, b);
            assert!(a < 37450);
        }
    }

    #[test]
    fn merge_chunks_joins_within_gap_and_splits_beyond() {
        let c = |s, e| Chunk {
            start: VirtualOffset::from_raw(s),
            end: VirtualOffset::from_raw(e),
        };
        let vo_raw = |coffset: u64| VirtualOffset::new(coffset, 0).raw();
        let chunks = vec![
            c(vo_raw(0), vo_raw(100)),
            c(vo_raw(100), vo_raw(200)),
            c(vo_raw(1_000_000), vo_raw(1_000_100)),
        ];
        let merged = merge_chunks(chunks, 65536);
        assert_eq!(merged.len(), 2);
    }

    fn bai_bytes_one_reference() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&BAI_MAGIC);
        buf.extend_from_slice(&1i32.to_le_bytes()); // n_ref

        // One real bin with two chunks, plus the pseudo-bin stats entry.
        buf.extend_from_slice(&2i32.to_le_bytes()); // n_bin
        buf.extend_from_slice(&4681u32.to_le_bytes()); // bin (level 4, tile 0)
        buf.extend_from_slice(&2i32.to_le_bytes()); // n_chunk
        buf.extend_from_slice(&VirtualOffset::new(0, 0).raw().to_le_bytes());
        buf.extend_from_slice(&VirtualOffset::new(100, 0).raw().to_le_bytes());
        buf.extend_from_slice(&VirtualOffset::new(200, 0).raw().to_le_bytes());
        buf.extend_from_slice(&VirtualOffset::new(300, 0).raw().to_le_bytes());

        buf.extend_from_slice(&(PSEUDO_BIN as u32).to_le_bytes());
        buf.extend_from_slice(&1i32.to_le_bytes()); // n_chunk (mapped/unmapped pair)
        buf.extend_from_slice(&42u64.to_le_bytes()); // mapped
        buf.extend_from_slice(&7u64.to_le_bytes()); // unmapped

        buf.extend_from_slice(&2i32.to_le_bytes()); // n_intv
        buf.extend_from_slice(&VirtualOffset::new(0, 0).raw().to_le_bytes());
        buf.extend_from_slice(&VirtualOffset::new(50, 0).raw().to_le_bytes());

        buf.extend_from_slice(&123u64.to_le_bytes()); // n_no_coor
        buf
    }

    #[test]
    fn parse_bai_recovers_bins_linear_index_and_pseudo_bin_stats() {
        let bytes = bai_bytes_one_reference();
        let mut warnings = Vec::new();
        let bai = parse_bai(&bytes, &mut warnings).unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");

        assert_eq!(bai.references.len(), 1);
        let r = &bai.references[0];
        assert_eq!(r.bins.get(&4681).unwrap().len(), 2);
        assert_eq!(r.linear_index.len(), 2);
        assert_eq!(r.stats, Some(ReferenceStats { mapped: 42, unmapped: 7 }));
        assert_eq!(bai.n_no_coor, Some(123));
    }

    #[test]
    fn parse_bai_warns_on_non_monotonic_linear_index() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&BAI_MAGIC);
        buf.extend_from_slice(&1i32.to_le_bytes());
        buf.extend_from_slice(&0i32.to_le_bytes()); // n_bin
        buf.extend_from_slice(&2i32.to_le_bytes()); // n_intv
        buf.extend_from_slice(&VirtualOffset::new(100, 0).raw().to_le_bytes());
        buf.extend_from_slice(&VirtualOffset::new(50, 0).raw().to_le_bytes());

        let mut warnings = Vec::new();
        let bai = parse_bai(&buf, &mut warnings).unwrap();
        assert_eq!(bai.references[0].linear_index.len(), 2);
        assert!(matches!(
            warnings[0],
            BamWarning::NonMonotonicLinearIndex { reference_id: 0, index: 1 }
        ));
    }
}
