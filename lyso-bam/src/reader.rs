//! Record stream (C6): couples BGZF framing, header decoding and
//! per-alignment decoding into a single pull-based iterator, and (C8) lets
//! that iterator be restricted to the chunks a BAI region query names.

use std::collections::VecDeque;
use std::io::{Read, Seek};
use std::sync::Arc;

use log::warn;

use crate::bai::Chunk;
use crate::bgzf::BgzfReader;
use crate::header::{decode_header, BamHeaderInfo, ReferenceDictionary};
use crate::record::decode_record;
use crate::{BamError, BamWarning, DecodeErrorKind, ErrorPolicy, ReaderConfig, Record};

/// One event pulled from a [`RecordStream`].
#[derive(Debug)]
pub enum StreamItem {
    Header(BamHeaderInfo),
    Record(Record),
    Warning(BamWarning),
    End,
}

#[derive(PartialEq)]
enum State {
    NeedHeader,
    Streaming,
    Done,
}

/// A lazy, pull-based BAM reader: wraps a [`BgzfReader`] and yields
/// [`StreamItem`]s on demand, never holding more than one alignment block
/// (plus whatever the underlying BGZF member buffers) in memory at a time.
pub struct RecordStream<R> {
    inner: BgzfReader<R>,
    config: ReaderConfig,
    buf: Vec<u8>,
    references: Option<Arc<ReferenceDictionary>>,
    pending: VecDeque<StreamItem>,
    state: State,
}

impl<R: Read> RecordStream<R> {
    pub fn new(inner: R, config: ReaderConfig) -> Self {
        RecordStream {
            inner: BgzfReader::new(inner),
            config,
            buf: Vec::new(),
            references: None,
            pending: VecDeque::new(),
            state: State::NeedHeader,
        }
    }

    pub fn references(&self) -> Option<&Arc<ReferenceDictionary>> {
        self.references.as_ref()
    }

    /// Pull more inflated bytes until `buf` holds at least `n` bytes, or
    /// return `Ok(false)` if the underlying BGZF stream is genuinely
    /// exhausted first.
    ///
    /// Reads request exactly the number of bytes still needed rather than a
    /// fixed-size chunk: `BgzfReader::read` never over-delivers past the
    /// requested length, so `buf` never holds more than `n` bytes after this
    /// returns. That invariant is what lets [`RegionRecords`] read
    /// `self.inner.virtual_offset()` right before pulling a block and get
    /// the true start offset of that block, not of some read-ahead byte.
    fn fill_at_least(&mut self, n: usize) -> Result<bool, BamError> {
        while self.buf.len() < n {
            let mut scratch = vec![0u8; n - self.buf.len()];
            let read = self.inner.read(&mut scratch).map_err(BamError::Io)?;
            if read == 0 {
                return Ok(false);
            }
            self.buf.extend_from_slice(&scratch[..read]);
        }
        Ok(true)
    }

    fn advance_header(&mut self) -> Result<(), BamError> {
        loop {
            match decode_header(&self.buf) {
                Ok((info, consumed)) => {
                    self.buf.drain(0..consumed);
                    self.references = Some(info.references.clone());
                    self.pending.push_back(StreamItem::Header(info));
                    self.state = State::Streaming;
                    return Ok(());
                }
                Err(BamError::Decode(DecodeErrorKind::Truncated)) => {
                    let want = self.buf.len() + 4096;
                    if !self.fill_at_least(want)? {
                        return Err(DecodeErrorKind::Truncated.into());
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn next_block(&mut self) -> Result<Option<(u32, Vec<u8>)>, BamError> {
        if !self.fill_at_least(4)? {
            return Ok(None);
        }
        let block_size_signed = i32::from_le_bytes(self.buf[0..4].try_into().unwrap());
        if block_size_signed <= 0 {
            return Err(DecodeErrorKind::NonPositiveBlockSize(block_size_signed).into());
        }
        if block_size_signed as usize > self.config.strict_block_size_cap {
            return Err(DecodeErrorKind::BlockTooLarge(block_size_signed).into());
        }
        let block_size = block_size_signed as u32;
        let total = 4 + block_size as usize;
        if !self.fill_at_least(total)? {
            return Err(DecodeErrorKind::Truncated.into());
        }
        let block: Vec<u8> = self.buf[4..total].to_vec();
        self.buf.drain(0..total);
        Ok(Some((block_size, block)))
    }

    fn advance_record(&mut self) -> Result<(), BamError> {
        let references = self
            .references
            .clone()
            .expect("advance_record called before header decoded");

        loop {
            let next = match self.next_block() {
                Ok(next) => next,
                Err(e) => {
                    if self.config.error_policy == ErrorPolicy::SkipRecord {
                        // The block's header (its block_size field) was
                        // itself unusable: drain past it so the next
                        // iteration re-synchronizes on whatever follows,
                        // rather than re-reading the same bad bytes forever.
                        let n = self.buf.len().min(4);
                        self.buf.drain(0..n);
                        let w = BamWarning::SkippedRecord { error: e.to_string() };
                        warn!("{w}");
                        self.pending.push_back(StreamItem::Warning(w));
                        continue;
                    }
                    return Err(e);
                }
            };
            match next {
                None => {
                    if !self.inner.saw_eof_marker {
                        self.pending.push_back(StreamItem::Warning(BamWarning::MissingEofMarker));
                    }
                    if !self.buf.is_empty() {
                        self.pending.push_back(StreamItem::Warning(BamWarning::TrailingBytesAtEof {
                            bytes: self.buf.len(),
                        }));
                    }
                    self.pending.push_back(StreamItem::End);
                    self.state = State::Done;
                    return Ok(());
                }
                Some((block_size, block)) => {
                    let mut warnings = Vec::new();
                    match decode_record(&block, block_size, &references, &mut warnings) {
                        Ok(record) => {
                            for w in warnings {
                                warn!("{w}");
                                self.pending.push_back(StreamItem::Warning(w));
                            }
                            self.pending.push_back(StreamItem::Record(record));
                            return Ok(());
                        }
                        Err(e) => {
                            if self.config.error_policy == ErrorPolicy::SkipRecord {
                                let w = BamWarning::SkippedRecord { error: e.to_string() };
                                warn!("{w}");
                                self.pending.push_back(StreamItem::Warning(w));
                                continue;
                            }
                            return Err(e);
                        }
                    }
                }
            }
        }
    }
}

impl<R: Read> Iterator for RecordStream<R> {
    type Item = Result<StreamItem, BamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.pending.pop_front() {
            return Some(Ok(item));
        }
        if self.state == State::Done {
            return None;
        }
        let result = match self.state {
            State::NeedHeader => self.advance_header(),
            State::Streaming => self.advance_record(),
            State::Done => unreachable!(),
        };
        if let Err(e) = result {
            self.state = State::Done;
            return Some(Err(e));
        }
        self.pending.pop_front().map(Ok)
    }
}

impl<R: Read + Seek> RecordStream<R> {
    /// Restrict subsequent reads to the given BAI chunks, yielding only
    /// records whose alignment overlaps `[start, end)` on `ref_id` and
    /// skipping the duplicate records that chunk merging can produce at
    /// chunk boundaries.
    pub fn query_chunks(&mut self, chunks: Vec<Chunk>, ref_id: i32, start: i64, end: i64) -> RegionRecords<'_, R> {
        RegionRecords {
            stream: self,
            chunks: chunks.into_iter().collect(),
            current_chunk_end: None,
            last_start_offset: None,
            ref_id,
            start,
            end,
        }
    }
}

/// Iterator over the records of a region query (C8): seeks to each chunk in
/// turn, decodes records until the chunk's end virtual offset is passed,
/// filters by coordinate overlap, and suppresses the duplicate records that
/// adjacent, independently-seeked chunks can otherwise yield twice.
pub struct RegionRecords<'s, R> {
    stream: &'s mut RecordStream<R>,
    chunks: VecDeque<Chunk>,
    current_chunk_end: Option<crate::bgzf::VirtualOffset>,
    last_start_offset: Option<crate::bgzf::VirtualOffset>,
    ref_id: i32,
    start: i64,
    end: i64,
}

impl<'s, R: Read + Seek> Iterator for RegionRecords<'s, R> {
    type Item = Result<Record, BamError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_chunk_end.is_none() {
                let chunk = self.chunks.pop_front()?;
                if let Err(e) = self.stream.inner.seek_to_virtual_offset(chunk.start) {
                    return Some(Err(e));
                }
                self.stream.buf.clear();
                self.current_chunk_end = Some(chunk.end);
            }

            let record_offset = self.stream.inner.virtual_offset();
            if record_offset >= self.current_chunk_end.unwrap() {
                self.current_chunk_end = None;
                continue;
            }

            match self.stream.next_block() {
                Ok(None) => {
                    self.current_chunk_end = None;
                    continue;
                }
                Ok(Some((block_size, block))) => {
                    let mut warnings = Vec::new();
                    match decode_record(
                        &block,
                        block_size,
                        self.stream.references.as_ref().unwrap(),
                        &mut warnings,
                    ) {
                        Ok(record) => {
                            for w in warnings {
                                warn!("{w}");
                            }
                            let is_duplicate = self.last_start_offset == Some(record_offset);
                            self.last_start_offset = Some(record_offset);
                            if is_duplicate || !record.overlaps(self.ref_id, self.start, self.end) {
                                continue;
                            }
                            return Some(Ok(record));
                        }
                        Err(e) => return Some(Err(e)),
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
