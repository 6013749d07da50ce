//! A streaming decoder for the BAM alignment format and its companion BAI
//! random-access index.
//!
//! The crate is organized around the data flow of a BAM file: a byte source
//! is framed into BGZF members ([`bgzf`]), a [`cursor::Cursor`] reads
//! little-endian primitives out of the inflated bytes, [`header`] recovers
//! the SAM header text and reference dictionary, [`record`] decodes
//! individual alignments, [`reader`] couples all of the above into a lazy
//! pull-based stream, and [`bai`] loads a BAI index and resolves region
//! queries into chunks of that stream.

pub mod bai;
pub mod bgzf;
pub mod cursor;
pub mod header;
pub mod reader;
pub mod record;

use std::fmt;

use thiserror::Error;

pub use bai::{BaiIndex, RegionQuery};
pub use bgzf::VirtualOffset;
pub use header::{BamHeaderInfo, ReferenceDictionary, ReferenceEntry};
pub use reader::{RecordStream, StreamItem};
pub use record::{BamAuxField, BamSeq, BamValue, Record};

pub(crate) const BAM_MAGIC: [u8; 4] = *b"BAM\x01";
pub(crate) const BAI_MAGIC: [u8; 4] = *b"BAI\x01";

/// Maximum size, in bytes, of a single BGZF member's inflated payload.
pub const BGZF_MAX_PAYLOAD: usize = 65_536;

/// Fatal error kinds for the BGZF framing layer (§4.2).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BgzfErrorKind {
    #[error("bad gzip/BGZF magic or BC subfield")]
    BadMagic,
    #[error("truncated BGZF member")]
    TruncatedMember,
    #[error("DEFLATE inflation failed")]
    InflateError,
    #[error("inflated size does not match BGZF ISIZE field")]
    SizeMismatch,
    #[error("CRC32 of inflated data does not match the BGZF footer")]
    CrcMismatch,
}

/// Fatal error kinds for within-record structural decoding (§4.5, §4.3).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeErrorKind {
    #[error("read would cross the end of the current window")]
    Truncated,
    #[error("bad BAM/BAI magic string")]
    BadMagic,
    #[error("block_size {0} is not positive")]
    NonPositiveBlockSize(i32),
    #[error("block_size {0} exceeds the configured cap")]
    BlockTooLarge(i32),
    #[error("invalid CIGAR op code {0}")]
    BadCigarOp(u8),
    #[error("invalid optional-tag type byte {0:?}")]
    BadTagType(u8),
    #[error("reference id {0} is out of range for the loaded dictionary")]
    BadReferenceId(i32),
    #[error("count field {0} is negative or exceeds the sanity cap")]
    BadCount(i64),
}

/// Every error that can terminate a record stream or index load.
#[derive(Error, Debug)]
pub enum BamError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),
    /// A BGZF `BadMagic` observed at the very first byte of the stream:
    /// downgraded from fatal so callers can try another format.
    #[error("input does not look like a BAM/BGZF stream")]
    NotBamStream,
    #[error("malformed BGZF frame: {0}")]
    Bgzf(BgzfErrorKind),
    #[error("malformed BAM record: {0}")]
    Decode(DecodeErrorKind),
    #[error("unknown reference {0:?}")]
    UnknownReference(String),
}

impl From<DecodeErrorKind> for BamError {
    fn from(kind: DecodeErrorKind) -> Self {
        BamError::Decode(kind)
    }
}

impl From<BgzfErrorKind> for BamError {
    fn from(kind: BgzfErrorKind) -> Self {
        BamError::Bgzf(kind)
    }
}

/// Non-fatal semantic inconsistencies (§7 ValidationWarning / IndexInvariantViolation).
///
/// These never terminate iteration; the record stream surfaces them as
/// `StreamItem::Warning` events and they are also logged at `warn` level.
#[derive(Debug, Clone, PartialEq)]
pub enum BamWarning {
    /// `l_seq > 0` and `query_span(cigar) != l_seq`.
    SeqCigarMismatch { l_seq: u32, query_span: u32 },
    /// An optional tag carried a type byte the decoder does not recognise;
    /// the remaining tag bytes for that record were skipped.
    UnknownTagType { tag: [u8; 2], type_byte: u8 },
    /// The record's stored `bin` field disagrees with `reg2bin(pos, pos+reference_span)`.
    BinMismatch { stored: u16, computed: u16 },
    /// Trailing bytes remained in the record-stream buffer after BGZF end-of-stream.
    TrailingBytesAtEof { bytes: usize },
    /// The BGZF stream ended without an empty end-of-stream (EOF) member.
    MissingEofMarker,
    /// A BAI linear index entry was smaller than its predecessor.
    NonMonotonicLinearIndex { reference_id: usize, index: usize },
    /// A structural error inside one alignment block; the `skip_record`
    /// policy advanced past it and resumed.
    SkippedRecord { error: String },
}

impl fmt::Display for BamWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BamWarning::SeqCigarMismatch { l_seq, query_span } => write!(
                f,
                "sequence length {l_seq} does not match CIGAR query span {query_span}"
            ),
            BamWarning::UnknownTagType { tag, type_byte } => write!(
                f,
                "unknown optional-tag type {:?} for tag {}{}",
                *type_byte as char, tag[0] as char, tag[1] as char
            ),
            BamWarning::BinMismatch { stored, computed } => {
                write!(f, "stored bin {stored} does not match computed bin {computed}")
            }
            BamWarning::TrailingBytesAtEof { bytes } => {
                write!(f, "{bytes} trailing byte(s) after BGZF end-of-stream")
            }
            BamWarning::MissingEofMarker => write!(f, "BGZF stream has no end-of-stream marker"),
            BamWarning::NonMonotonicLinearIndex { reference_id, index } => write!(
                f,
                "linear index entry {index} for reference {reference_id} is not monotonically increasing"
            ),
            BamWarning::SkippedRecord { error } => write!(f, "skipped corrupt record: {error}"),
        }
    }
}

/// The policy applied to structural errors found inside an alignment block (§4.6, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Propagate the error and terminate the stream. The default.
    #[default]
    FailFast,
    /// Advance past the corrupt block (by 4 bytes, past its `block_size`)
    /// and attempt to resynchronize. Best-effort; may cascade.
    SkipRecord,
}

/// How a region query resolves a reference name that has no exact dictionary match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceNameNormalisation {
    #[default]
    Exact,
    /// Retry after stripping a leading `"chr"`/`"CHR"`.
    StripChr,
}

/// Tunables enumerated in §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReaderConfig {
    /// Reject alignment blocks whose `block_size` exceeds this many bytes.
    pub strict_block_size_cap: usize,
    /// Compact the record-stream buffer once it exceeds this many bytes.
    pub inflated_buffer_highwater: usize,
    /// Policy for structural errors encountered inside an alignment block.
    pub error_policy: ErrorPolicy,
    /// Maximum compressed-byte gap between BAI chunks that still get merged.
    pub chunk_merge_gap: u64,
    /// Fallback matching strategy for region-query reference names.
    pub reference_name_normalisation: ReferenceNameNormalisation,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            strict_block_size_cap: 256 * 1024 * 1024,
            inflated_buffer_highwater: 1024 * 1024,
            error_policy: ErrorPolicy::FailFast,
            chunk_merge_gap: 64 * 1024,
            reference_name_normalisation: ReferenceNameNormalisation::StripChr,
        }
    }
}
