//! BGZF block framing (C2): BGZF is a sequence of independently inflatable
//! gzip members, each carrying a mandatory `BC` extra subfield whose value
//! is the member's total compressed length minus one (`BSIZE`).
//!
//! This reads; it deliberately does not write BGZF/BAM/BAI (out of scope).

use std::io::{self, Read, Seek, SeekFrom};

use flate2::read::DeflateDecoder;

use crate::{BamError, BgzfErrorKind};

/// A 64-bit address into a BGZF stream: the upper 48 bits are the
/// compressed byte offset of a member's first byte, the lower 16 bits are
/// a byte offset within that member's inflated payload.
///
/// Virtual offsets compare correctly as plain `u64`s as long as both sides
/// come from the same stream, which is all BAI indexing ever needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtualOffset(u64);

impl VirtualOffset {
    pub fn new(coffset: u64, uoffset: u16) -> Self {
        VirtualOffset((coffset << 16) | u64::from(uoffset))
    }

    pub fn from_raw(raw: u64) -> Self {
        VirtualOffset(raw)
    }

    pub fn coffset(self) -> u64 {
        self.0 >> 16
    }

    pub fn uoffset(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl From<VirtualOffset> for u64 {
    fn from(v: VirtualOffset) -> u64 {
        v.0
    }
}

const HEADER_LEN: usize = 18;
const FOOTER_LEN: usize = 8;
/// Minimum total member size: an empty DEFLATE stream's header+footer still
/// costs a few bytes, so anything smaller than this cannot be a real member.
const MIN_MEMBER_LEN: usize = HEADER_LEN + FOOTER_LEN + 2;

/// A pull-based reader over BGZF members, exposing both a plain [`Read`]
/// view of the concatenated inflated payload and the
/// [`VirtualOffset`] of the reader's current position.
pub struct BgzfReader<R> {
    inner: R,
    /// Compressed byte offset of the member currently loaded into `block`.
    cur_block_start: u64,
    /// Compressed byte offset one past `cur_block_start`'s member; i.e.
    /// where the *next* member begins.
    next_block_start: u64,
    block: Vec<u8>,
    pos: usize,
    /// Set once an empty (ISIZE=0) end-of-stream member has been read.
    pub saw_eof_marker: bool,
    /// One `(member_coffset, inflated_len)` entry per member read so far, in
    /// stream order. A lightweight GZI-style inventory useful for building
    /// an ad hoc index over a BAM that lacks a BAI; this crate never writes
    /// one, it only keeps the bookkeeping a caller would need to.
    pub block_log: Vec<(u64, u16)>,
}

impl<R: Read> BgzfReader<R> {
    pub fn new(inner: R) -> Self {
        BgzfReader {
            inner,
            cur_block_start: 0,
            next_block_start: 0,
            block: Vec::new(),
            pos: 0,
            saw_eof_marker: false,
            block_log: Vec::new(),
        }
    }

    pub fn virtual_offset(&self) -> VirtualOffset {
        VirtualOffset::new(self.cur_block_start, self.pos as u16)
    }

    /// Inflate and buffer the next member. Returns `Ok(false)` on a clean
    /// end of the underlying byte source (distinct from the BGZF EOF
    /// marker, which is a real, empty member and returns `Ok(true)`).
    fn read_member(&mut self) -> Result<bool, BamError> {
        let member_start = self.next_block_start;

        let mut header = [0u8; HEADER_LEN];
        let first = self.inner.read(&mut header[..1])?;
        if first == 0 {
            return Ok(false);
        }
        read_exact(&mut self.inner, &mut header[1..])?;

        if header[0] != 0x1f || header[1] != 0x8b || header[2] != 0x08 || header[3] & 0x04 == 0 {
            return Err(bad_magic(member_start));
        }
        // XLEN at bytes 10-11, BC subfield id at 12-13, BC length at 14-15.
        if &header[12..14] != b"BC" {
            return Err(bad_magic(member_start));
        }
        let bsize = u16::from_le_bytes([header[16], header[17]]) as usize + 1;
        let member_len = bsize
            .checked_sub(HEADER_LEN)
            .filter(|len| *len >= FOOTER_LEN)
            .ok_or(BgzfErrorKind::TruncatedMember)?;
        if bsize < MIN_MEMBER_LEN {
            return Err(BgzfErrorKind::TruncatedMember.into());
        }
        let deflate_len = member_len - FOOTER_LEN;

        let mut deflate_data = vec![0u8; deflate_len];
        read_exact(&mut self.inner, &mut deflate_data)?;

        let mut footer = [0u8; FOOTER_LEN];
        read_exact(&mut self.inner, &mut footer)?;
        let expected_crc = u32::from_le_bytes(footer[0..4].try_into().unwrap());
        let expected_isize = u32::from_le_bytes(footer[4..8].try_into().unwrap()) as usize;

        self.block.clear();
        self.block.reserve(expected_isize);
        let mut decoder = DeflateDecoder::new(&deflate_data[..]);
        decoder
            .read_to_end(&mut self.block)
            .map_err(|_| BgzfErrorKind::InflateError)?;

        if self.block.len() != expected_isize {
            return Err(BgzfErrorKind::SizeMismatch.into());
        }
        if crc32fast::hash(&self.block) != expected_crc {
            return Err(BgzfErrorKind::CrcMismatch.into());
        }

        self.cur_block_start = member_start;
        self.next_block_start = member_start + bsize as u64;
        self.pos = 0;
        self.saw_eof_marker = self.block.is_empty();
        self.block_log.push((member_start, self.block.len() as u16));

        Ok(true)
    }

    /// Ensure the current member still has unread bytes, pulling the next
    /// one if necessary. Returns `Ok(false)` only at genuine end of stream.
    fn ensure_readable(&mut self) -> Result<bool, BamError> {
        while self.pos >= self.block.len() {
            if !self.read_member()? {
                return Ok(false);
            }
            // An empty (EOF marker) member leaves pos >= block.len() (0 >= 0);
            // the loop naturally tries to pull one more member, which then
            // hits genuine end of stream and returns false. That is also how
            // a truncated stream without an EOF marker terminates.
        }
        Ok(true)
    }
}

impl<R: Read> Read for BgzfReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        match self.ensure_readable() {
            Ok(false) => Ok(0),
            Ok(true) => {
                let avail = &self.block[self.pos..];
                let take = avail.len().min(out.len());
                out[..take].copy_from_slice(&avail[..take]);
                self.pos += take;
                Ok(take)
            }
            Err(BamError::Io(e)) => Err(e),
            Err(other) => Err(io::Error::new(io::ErrorKind::InvalidData, other)),
        }
    }
}

impl<R: Read + Seek> BgzfReader<R> {
    /// Seek so that the next read starts at `offset`: seek the underlying
    /// source to `offset.coffset()`, inflate that member, and discard
    /// `offset.uoffset()` bytes of its payload.
    pub fn seek_to_virtual_offset(&mut self, offset: VirtualOffset) -> Result<(), BamError> {
        self.inner.seek(SeekFrom::Start(offset.coffset()))?;
        self.next_block_start = offset.coffset();
        self.block.clear();
        self.pos = 0;
        if !self.read_member()? {
            return Err(BgzfErrorKind::TruncatedMember.into());
        }
        let skip = offset.uoffset() as usize;
        if skip > self.block.len() {
            return Err(BgzfErrorKind::TruncatedMember.into());
        }
        self.pos = skip;
        Ok(())
    }
}

fn bad_magic(member_start: u64) -> BamError {
    if member_start == 0 {
        BamError::NotBamStream
    } else {
        BgzfErrorKind::BadMagic.into()
    }
}

fn read_exact<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<(), BamError> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..])? {
            0 => return Err(BgzfErrorKind::TruncatedMember.into()),
            n => filled += n,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor as IoCursor;

    fn write_member(out: &mut Vec<u8>, payload: &[u8]) {
        use flate2::write::DeflateEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
        enc.write_all(payload).unwrap();
        let compressed = enc.finish().unwrap();

        let total = HEADER_LEN + compressed.len() + FOOTER_LEN;
        let bsize = (total - 1) as u16;

        out.extend_from_slice(&[0x1f, 0x8b, 0x08, 0x04, 0, 0, 0, 0, 0, 0xff]);
        out.extend_from_slice(&[0x06, 0x00, b'B', b'C', 0x02, 0x00]);
        out.extend_from_slice(&bsize.to_le_bytes());
        out.extend_from_slice(&compressed);
        out.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    }

    fn eof_marker() -> Vec<u8> {
        let mut v = Vec::new();
        write_member(&mut v, &[]);
        v
    }

    #[test]
    fn reads_concatenated_members() {
        let mut bytes = Vec::new();
        write_member(&mut bytes, b"hello ");
        write_member(&mut bytes, b"world");
        bytes.extend_from_slice(&eof_marker());

        let mut reader = BgzfReader::new(IoCursor::new(bytes));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"hello world");
        assert!(reader.saw_eof_marker);
    }

    #[test]
    fn block_log_records_one_entry_per_member() {
        let mut bytes = Vec::new();
        write_member(&mut bytes, b"hello ");
        write_member(&mut bytes, b"world");
        bytes.extend_from_slice(&eof_marker());

        let mut reader = BgzfReader::new(IoCursor::new(bytes));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        assert_eq!(reader.block_log.len(), 3);
        assert_eq!(reader.block_log[0].0, 0);
        assert_eq!(reader.block_log[1].1, 5);
        assert_eq!(reader.block_log[2].1, 0, "EOF marker inflates to 0 bytes");
    }

    #[test]
    fn virtual_offset_packs_coffset_and_uoffset() {
        let vo = VirtualOffset::new(12345, 7);
        assert_eq!(vo.coffset(), 12345);
        assert_eq!(vo.uoffset(), 7);
        assert_eq!(vo.raw(), (12345u64 << 16) | 7);
    }

    #[test]
    fn bad_magic_at_start_is_not_bam_stream() {
        let bytes = vec![0u8; 20];
        let mut reader = BgzfReader::new(IoCursor::new(bytes));
        let mut out = Vec::new();
        let err = reader.read_to_end(&mut out).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn seek_to_virtual_offset_resumes_mid_member() {
        let mut bytes = Vec::new();
        write_member(&mut bytes, b"hello world");
        bytes.extend_from_slice(&eof_marker());

        let mut reader = BgzfReader::new(IoCursor::new(bytes));
        reader.seek_to_virtual_offset(VirtualOffset::new(0, 6)).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"world");
    }
}
