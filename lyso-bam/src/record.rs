//! Alignment record decoding (C5) per the BAM binary layout: a fixed
//! 32-byte prefix, followed by the read name, packed CIGAR, packed
//! sequence, raw quality bytes, and a run of optional tags.

use std::fmt::{self, Display};

use fxhash::FxHashMap;
use lyso_common::{query_span, reference_span, CigarOp};

use crate::bai::reg2bin;
use crate::cursor::Cursor;
use crate::header::ReferenceDictionary;
use crate::{BamError, BamWarning, DecodeErrorKind};

/// One unpacked base, indexed by the BAM nibble table `=ACMGRSVTWYHKDBN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BamSeq {
    Eq,
    A,
    C,
    M,
    G,
    R,
    S,
    V,
    T,
    W,
    Y,
    H,
    K,
    D,
    B,
    N,
}

impl BamSeq {
    fn from_nibble(v: u8) -> BamSeq {
        match v & 0x0F {
            0 => BamSeq::Eq,
            1 => BamSeq::A,
            2 => BamSeq::C,
            3 => BamSeq::M,
            4 => BamSeq::G,
            5 => BamSeq::R,
            6 => BamSeq::S,
            7 => BamSeq::V,
            8 => BamSeq::T,
            9 => BamSeq::W,
            10 => BamSeq::Y,
            11 => BamSeq::H,
            12 => BamSeq::K,
            13 => BamSeq::D,
            14 => BamSeq::B,
            _ => BamSeq::N,
        }
    }
}

impl Display for BamSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            BamSeq::Eq => '=',
            BamSeq::A => 'A',
            BamSeq::C => 'C',
            BamSeq::M => 'M',
            BamSeq::G => 'G',
            BamSeq::R => 'R',
            BamSeq::S => 'S',
            BamSeq::V => 'V',
            BamSeq::T => 'T',
            BamSeq::W => 'W',
            BamSeq::Y => 'Y',
            BamSeq::H => 'H',
            BamSeq::K => 'K',
            BamSeq::D => 'D',
            BamSeq::B => 'B',
            BamSeq::N => 'N',
        };
        write!(f, "{c}")
    }
}

/// An optional-field value, collapsed to its semantic kind (SAM v1 1.5).
///
/// Integer subtypes (`c`/`C`/`s`/`S`/`i`/`I`) all widen to [`BamValue::Int`];
/// the byte-level subtype only survives inside a `B` array, where it
/// determines how the array is re-packed and so is kept as the variant tag.
#[derive(Debug, Clone, PartialEq)]
pub enum BamValue {
    Char(char),
    Int(i64),
    Float(f32),
    Str(String),
    /// Hex-digit text of a `H`-typed field, NUL-stripped but not decoded.
    Hex(String),
    IntArray(IntArray),
}

#[derive(Debug, Clone, PartialEq)]
pub enum IntArray {
    I8(Vec<i8>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    U16(Vec<u16>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
}

impl Display for BamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BamValue::Char(c) => write!(f, "A:{c}"),
            BamValue::Int(v) => write!(f, "i:{v}"),
            BamValue::Float(v) => write!(f, "f:{v}"),
            BamValue::Str(s) => write!(f, "Z:{s}"),
            BamValue::Hex(s) => write!(f, "H:{s}"),
            BamValue::IntArray(arr) => {
                write!(f, "B:")?;
                match arr {
                    IntArray::I8(v) => write_array(f, 'c', v),
                    IntArray::U8(v) => write_array(f, 'C', v),
                    IntArray::I16(v) => write_array(f, 's', v),
                    IntArray::U16(v) => write_array(f, 'S', v),
                    IntArray::I32(v) => write_array(f, 'i', v),
                    IntArray::U32(v) => write_array(f, 'I', v),
                    IntArray::F32(v) => write_array(f, 'f', v),
                }
            }
        }
    }
}

fn write_array<T: Display>(f: &mut fmt::Formatter<'_>, subtype: char, values: &[T]) -> fmt::Result {
    write!(f, "{subtype}")?;
    for v in values {
        write!(f, ",{v}")?;
    }
    Ok(())
}

/// A two-letter optional-field tag plus its decoded value.
#[derive(Debug, Clone, PartialEq)]
pub struct BamAuxField {
    pub tag: [u8; 2],
    pub value: BamValue,
}

impl Display for BamAuxField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}:{}", self.tag[0] as char, self.tag[1] as char, self.value)
    }
}

/// One decoded alignment.
///
/// `cigar`, `seq` and `qual` are eagerly unpacked: the byte budget of a
/// single alignment block is small enough (bounded by
/// [`ReaderConfig::strict_block_size_cap`](crate::ReaderConfig)) that there
/// is no benefit to a lazy/view-based representation here.
#[derive(Debug, Clone)]
pub struct Record {
    pub block_size: u32,
    pub ref_id: i32,
    pub ref_name: String,
    pub pos: i32,
    pub mapq: u8,
    pub bin: u16,
    pub flag: u16,
    pub next_ref_id: i32,
    pub next_ref_name: String,
    pub next_pos: i32,
    pub tlen: i32,
    pub qname: String,
    pub cigar: Vec<CigarOp>,
    pub seq: Vec<BamSeq>,
    /// Raw Phred-scaled quality bytes, or `None` if the whole field was
    /// the BAM "unavailable" sentinel (every byte `0xFF`).
    pub qual: Option<Vec<u8>>,
    pub tags: FxHashMap<[u8; 2], BamValue>,
    reference_span: u32,
    query_span: u32,
}

impl Record {
    /// 1-based leftmost mapping position, or 0 for an unmapped read.
    pub fn pos_1based(&self) -> i64 {
        if self.pos < 0 {
            0
        } else {
            i64::from(self.pos) + 1
        }
    }

    /// Sum of CIGAR ops that consume reference bases (M/D/N/=/X).
    pub fn reference_span(&self) -> u32 {
        self.reference_span
    }

    /// Sum of CIGAR ops that consume query bases (M/I/S/=/X).
    pub fn query_span(&self) -> u32 {
        self.query_span
    }

    /// 0-based, half-open end coordinate: `pos + reference_span()`.
    ///
    /// Meaningless for an unmapped read; callers should check `pos >= 0`
    /// (equivalently `!self.is_unmapped()`) first.
    pub fn reference_end_0based(&self) -> i64 {
        i64::from(self.pos) + i64::from(self.reference_span)
    }

    pub fn is_unmapped(&self) -> bool {
        self.flag & 0x4 != 0
    }

    pub fn is_reverse_strand(&self) -> bool {
        self.flag & 0x10 != 0
    }

    /// Whether `[pos, reference_end_0based())` overlaps the given 0-based
    /// half-open region on the same reference.
    pub fn overlaps(&self, ref_id: i32, start: i64, end: i64) -> bool {
        self.ref_id == ref_id
            && !self.is_unmapped()
            && i64::from(self.pos) < end
            && self.reference_end_0based() > start
    }

    pub fn cigar_string(&self) -> String {
        if self.cigar.is_empty() {
            "*".to_owned()
        } else {
            self.cigar.iter().map(ToString::to_string).collect()
        }
    }

    pub fn seq_string(&self) -> String {
        if self.seq.is_empty() {
            "*".to_owned()
        } else {
            self.seq.iter().map(ToString::to_string).collect()
        }
    }

    /// Quality string with the usual SAM `Phred+33` offset, or `"*"` if unavailable.
    pub fn qual_string(&self) -> String {
        match &self.qual {
            Some(q) => q.iter().map(|v| (v + 33) as char).collect(),
            None => "*".to_owned(),
        }
    }

    pub fn tag(&self, tag: &[u8; 2]) -> Option<&BamValue> {
        self.tags.get(tag)
    }

    /// Optional fields in arbitrary (hash-map) order, as SAM-style `TAG:TYPE:VALUE` entries.
    pub fn aux_fields(&self) -> impl Iterator<Item = BamAuxField> + '_ {
        self.tags.iter().map(|(&tag, value)| BamAuxField {
            tag,
            value: value.clone(),
        })
    }
}

impl Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.qname,
            self.flag,
            if self.ref_name.is_empty() { "*" } else { &self.ref_name },
            self.pos_1based(),
            self.mapq,
            self.cigar_string(),
            if self.next_ref_name.is_empty() { "*" } else { &self.next_ref_name },
            if self.next_pos < 0 { 0 } else { self.next_pos + 1 },
            self.tlen,
            self.seq_string(),
            self.qual_string(),
        )?;
        for field in self.aux_fields() {
            write!(f, "\t{field}")?;
        }
        Ok(())
    }
}

fn unknown_reference_name(id: i32, dict: &ReferenceDictionary) -> String {
    if id < 0 {
        String::from("*")
    } else {
        dict.name(id).map(str::to_owned).unwrap_or_else(|| String::from("*"))
    }
}

/// The mate's reference name per SAM convention: `"="` when it names the
/// same reference as this record's own `ref_id`, else the looked-up name
/// (or `"*"` for unmapped/out-of-range ids).
fn mate_reference_name(next_ref_id: i32, ref_id: i32, dict: &ReferenceDictionary) -> String {
    if ref_id >= 0 && next_ref_id == ref_id {
        String::from("=")
    } else {
        unknown_reference_name(next_ref_id, dict)
    }
}

/// Decode one alignment block (the bytes following its `block_size` field).
pub fn decode_record(
    block: &[u8],
    block_size: u32,
    references: &ReferenceDictionary,
    warnings: &mut Vec<BamWarning>,
) -> Result<Record, BamError> {
    let mut c = Cursor::new(block);

    let ref_id = c.read_i32()?;
    let pos = c.read_i32()?;
    let l_read_name = c.read_u8()?;
    let mapq = c.read_u8()?;
    let bin = c.read_u16()?;
    let n_cigar_op = c.read_u16()?;
    let flag = c.read_u16()?;
    let l_seq = c.read_u32()?;
    let next_ref_id = c.read_i32()?;
    let next_pos = c.read_i32()?;
    let tlen = c.read_i32()?;

    let mut qname = c.read_fixed_string(l_read_name as usize)?;
    if qname.ends_with('\0') {
        qname.pop();
    }

    let mut cigar = Vec::with_capacity(n_cigar_op as usize);
    for _ in 0..n_cigar_op {
        let word = c.read_u32()?;
        let op = CigarOp::from_packed(word)
            .ok_or_else(|| DecodeErrorKind::BadCigarOp((word & 0xF) as u8))?;
        cigar.push(op);
    }

    let n_seq_bytes = (l_seq as usize + 1) / 2;
    let packed_seq = c.read_bytes(n_seq_bytes)?;
    let mut seq = Vec::with_capacity(l_seq as usize);
    for &byte in packed_seq {
        seq.push(BamSeq::from_nibble(byte >> 4));
        seq.push(BamSeq::from_nibble(byte & 0x0F));
    }
    seq.truncate(l_seq as usize);

    let raw_qual = c.read_bytes(l_seq as usize)?.to_vec();
    let qual = if raw_qual.iter().all(|&q| q == 0xFF) {
        None
    } else {
        Some(raw_qual)
    };

    let mut tags = FxHashMap::default();
    while c.remaining() > 0 {
        match decode_aux_field(&mut c, warnings)? {
            Some((tag, value)) => {
                tags.insert(tag, value);
            }
            // An unrecognised type byte: its width is unknowable, so the
            // rest of the block can't be split into further tags. The
            // record is still emitted with whatever tags decoded so far.
            None => break,
        }
    }

    let reference_span_val = reference_span(&cigar);
    let query_span_val = query_span(&cigar);

    if l_seq > 0 && query_span_val != 0 && query_span_val != l_seq {
        warnings.push(BamWarning::SeqCigarMismatch {
            l_seq,
            query_span: query_span_val,
        });
    }

    if flag & 0x4 == 0 && pos >= 0 {
        let computed_bin = reg2bin(pos as i64, pos as i64 + i64::from(reference_span_val));
        if computed_bin != bin {
            warnings.push(BamWarning::BinMismatch {
                stored: bin,
                computed: computed_bin,
            });
        }
    }

    Ok(Record {
        block_size,
        ref_id,
        ref_name: unknown_reference_name(ref_id, references),
        pos,
        mapq,
        bin,
        flag,
        next_ref_id,
        next_ref_name: mate_reference_name(next_ref_id, ref_id, references),
        next_pos,
        tlen,
        qname,
        cigar,
        seq,
        qual,
        tags,
        reference_span: reference_span_val,
        query_span: query_span_val,
    })
}

/// Decodes one `(tag, type, value)` optional field, or `Ok(None)` if the
/// type byte is unrecognised.
///
/// An unrecognised type's width can't be known, so its value (and anything
/// after it) can't be split back into further tags: on that path the
/// cursor is advanced to the end of the block, consuming the rest as an
/// unparsed remainder, and the caller stops its tag loop.
fn decode_aux_field(
    c: &mut Cursor<'_>,
    warnings: &mut Vec<BamWarning>,
) -> Result<Option<([u8; 2], BamValue)>, BamError> {
    let tag_bytes = c.read_bytes(2)?;
    let tag = [tag_bytes[0], tag_bytes[1]];
    let type_byte = c.read_u8()?;

    let value = match type_byte {
        b'A' => BamValue::Char(c.read_u8()? as char),
        b'c' => BamValue::Int(c.read_i8()? as i64),
        b'C' => BamValue::Int(c.read_u8()? as i64),
        b's' => BamValue::Int(c.read_i16()? as i64),
        b'S' => BamValue::Int(c.read_u16()? as i64),
        b'i' => BamValue::Int(c.read_i32()? as i64),
        b'I' => BamValue::Int(c.read_u32()? as i64),
        b'f' => BamValue::Float(c.read_f32()?),
        b'Z' => BamValue::Str(c.read_c_string()?),
        b'H' => BamValue::Hex(c.read_c_string()?),
        b'B' => {
            let subtype = c.read_u8()?;
            let len = c.read_u32()? as usize;
            match subtype {
                b'c' => BamValue::IntArray(IntArray::I8(read_n(c, len, Cursor::read_i8)?)),
                b'C' => BamValue::IntArray(IntArray::U8(read_n(c, len, Cursor::read_u8)?)),
                b's' => BamValue::IntArray(IntArray::I16(read_n(c, len, Cursor::read_i16)?)),
                b'S' => BamValue::IntArray(IntArray::U16(read_n(c, len, Cursor::read_u16)?)),
                b'i' => BamValue::IntArray(IntArray::I32(read_n(c, len, Cursor::read_i32)?)),
                b'I' => BamValue::IntArray(IntArray::U32(read_n(c, len, Cursor::read_u32)?)),
                b'f' => BamValue::IntArray(IntArray::F32(read_n(c, len, Cursor::read_f32)?)),
                other => {
                    warnings.push(BamWarning::UnknownTagType { tag, type_byte: other });
                    c.skip(c.remaining())?;
                    return Ok(None);
                }
            }
        }
        other => {
            warnings.push(BamWarning::UnknownTagType { tag, type_byte: other });
            c.skip(c.remaining())?;
            return Ok(None);
        }
    };
    Ok(Some((tag, value)))
}

fn read_n<T>(
    c: &mut Cursor<'_>,
    n: usize,
    mut read_one: impl FnMut(&mut Cursor<'_>) -> Result<T, BamError>,
) -> Result<Vec<T>, BamError> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(read_one(c)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::ReferenceEntry;

    fn dict() -> ReferenceDictionary {
        ReferenceDictionary::new(vec![ReferenceEntry {
            name: "chr1".to_owned(),
            length: 1000,
        }])
    }

    fn minimal_mapped_block() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&0i32.to_le_bytes()); // ref_id
        buf.extend_from_slice(&9i32.to_le_bytes()); // pos (0-based)
        buf.push(5); // l_read_name ("r1\0" = 3... use 3)
        buf.pop();
        buf.push(3);
        buf.push(0); // mapq
        buf.extend_from_slice(&reg2bin(9, 13).to_le_bytes()); // bin
        buf.extend_from_slice(&1u16.to_le_bytes()); // n_cigar_op
        buf.extend_from_slice(&0u16.to_le_bytes()); // flag (mapped, forward)
        buf.extend_from_slice(&4u32.to_le_bytes()); // l_seq
        buf.extend_from_slice(&(-1i32).to_le_bytes()); // next_ref_id
        buf.extend_from_slice(&(-1i32).to_le_bytes()); // next_pos
        buf.extend_from_slice(&0i32.to_le_bytes()); // tlen
        buf.extend_from_slice(b"r1\0");
        buf.extend_from_slice(&((4u32 << 4) | 0).to_le_bytes()); // 4M
        buf.push(0x12); // A C
        buf.push(0x42); // G C
        buf.extend_from_slice(&[30, 30, 30, 30]); // qual
        buf
    }

    #[test]
    fn decodes_minimal_mapped_record() {
        let block = minimal_mapped_block();
        let mut warnings = Vec::new();
        let rec = decode_record(&block, block.len() as u32, &dict(), &mut warnings).unwrap();
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
        assert_eq!(rec.qname, "r1");
        assert_eq!(rec.pos_1based(), 10);
        assert_eq!(rec.cigar_string(), "4M");
        assert_eq!(rec.seq_string(), "ACGC");
        assert_eq!(rec.reference_span(), 4);
        assert_eq!(rec.reference_end_0based(), 13);
        assert!(!rec.is_unmapped());
    }

    #[test]
    fn mate_on_same_reference_renders_as_equals_sign() {
        let mut block = minimal_mapped_block();
        // next_ref_id sits right after the fixed 32-byte prefix's first
        // seven fields: ref_id, pos, l_read_name, mapq, bin, n_cigar_op,
        // flag, l_seq (4+4+1+1+2+2+2+4 = 20 bytes in), then next_ref_id.
        block[20..24].copy_from_slice(&0i32.to_le_bytes());
        let mut warnings = Vec::new();
        let rec = decode_record(&block, block.len() as u32, &dict(), &mut warnings).unwrap();
        assert_eq!(rec.next_ref_name, "=");
    }

    #[test]
    fn mate_on_different_reference_renders_its_name() {
        let two_ref_dict = ReferenceDictionary::new(vec![
            ReferenceEntry { name: "chr1".to_owned(), length: 1000 },
            ReferenceEntry { name: "chr2".to_owned(), length: 1000 },
        ]);
        let mut block = minimal_mapped_block();
        block[20..24].copy_from_slice(&1i32.to_le_bytes());
        let mut warnings = Vec::new();
        let rec = decode_record(&block, block.len() as u32, &two_ref_dict, &mut warnings).unwrap();
        assert_eq!(rec.next_ref_name, "chr2");
    }

    #[test]
    fn qual_of_all_0xff_is_unavailable() {
        let mut block = minimal_mapped_block();
        let len = block.len();
        block[len - 4..].copy_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF]);
        let mut warnings = Vec::new();
        let rec = decode_record(&block, block.len() as u32, &dict(), &mut warnings).unwrap();
        assert_eq!(rec.qual, None);
        assert_eq!(rec.qual_string(), "*");
    }

    #[test]
    fn odd_length_seq_drops_trailing_nibble() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(-1i32).to_le_bytes());
        buf.extend_from_slice(&(-1i32).to_le_bytes());
        buf.push(3);
        buf.push(0);
        buf.extend_from_slice(&4680u16.to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes());
        buf.extend_from_slice(&4u16.to_le_bytes()); // unmapped
        buf.extend_from_slice(&3u32.to_le_bytes()); // l_seq = 3
        buf.extend_from_slice(&(-1i32).to_le_bytes());
        buf.extend_from_slice(&(-1i32).to_le_bytes());
        buf.extend_from_slice(&0i32.to_le_bytes());
        buf.extend_from_slice(b"u\0");
        buf.push(0x12); // A C
        buf.push(0x40); // G <garbage>
        buf.extend_from_slice(&[20, 20, 20]);
        let mut warnings = Vec::new();
        let rec = decode_record(&buf, buf.len() as u32, &dict(), &mut warnings).unwrap();
        assert_eq!(rec.seq_string(), "ACG");
        assert!(rec.is_unmapped());
    }

    #[test]
    fn decodes_known_tags_and_emits_record_on_unknown_type() {
        let mut block = minimal_mapped_block();
        // NM:i:2
        block.extend_from_slice(b"NM");
        block.push(b'i');
        block.extend_from_slice(&2i32.to_le_bytes());
        // RG:Z:sample1
        block.extend_from_slice(b"RG");
        block.push(b'Z');
        block.extend_from_slice(b"sample1\0");
        // XX:?:<unknown type byte, followed by bytes that must not be
        // reinterpreted as a further tag>
        block.extend_from_slice(b"XX");
        block.push(b'?');
        block.extend_from_slice(b"YYi\0\0\0\0");

        let mut warnings = Vec::new();
        let rec = decode_record(&block, block.len() as u32, &dict(), &mut warnings).unwrap();

        assert_eq!(rec.tag(b"NM"), Some(&BamValue::Int(2)));
        assert_eq!(
            rec.tag(b"RG"),
            Some(&BamValue::Str("sample1".to_owned()))
        );
        assert_eq!(rec.tag(b"XX"), None);
        assert_eq!(
            warnings,
            vec![BamWarning::UnknownTagType {
                tag: [b'X', b'X'],
                type_byte: b'?',
            }]
        );
    }
}
