//! SAM header text and reference dictionary decoding (C4).

use std::sync::Arc;

use crate::cursor::Cursor;
use crate::{BamError, DecodeErrorKind, BAM_MAGIC};

/// Reject header text longer than this; a legitimate SAM header is at most
/// a few hundred KiB, and this bounds a hostile `l_text` from exhausting memory.
const MAX_HEADER_TEXT: u32 = 1 << 28;
/// Reject reference counts above this; real references dictionaries have at
/// most a few hundred thousand entries (e.g. scaffold-heavy assemblies).
const MAX_N_REF: i32 = 1 << 24;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEntry {
    pub name: String,
    pub length: u32,
}

/// An ordered, immutable name/length dictionary, built once from the BAM
/// header's reference list and shared (via [`Arc`]) between the record
/// stream and any region queries run against it.
#[derive(Debug, Clone, Default)]
pub struct ReferenceDictionary {
    entries: Vec<ReferenceEntry>,
}

impl ReferenceDictionary {
    pub fn new(entries: Vec<ReferenceEntry>) -> Self {
        ReferenceDictionary { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: i32) -> Option<&ReferenceEntry> {
        usize::try_from(id).ok().and_then(|i| self.entries.get(i))
    }

    /// The reference name for `id`, or `"*"` for an unmapped sentinel (`id < 0`)
    /// or an id outside the dictionary.
    pub fn name(&self, id: i32) -> Option<&str> {
        self.get(id).map(|e| e.name.as_str())
    }

    /// Exact-match lookup of a reference id by name.
    pub fn id_of(&self, name: &str) -> Option<i32> {
        self.entries
            .iter()
            .position(|e| e.name == name)
            .map(|i| i as i32)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReferenceEntry> {
        self.entries.iter()
    }
}

/// The decoded header text plus the reference dictionary it precedes.
#[derive(Debug, Clone)]
pub struct BamHeaderInfo {
    /// The raw SAM header text (`@HD`/`@SQ`/... lines), unparsed.
    pub text: String,
    pub references: Arc<ReferenceDictionary>,
}

/// Decode the magic string, header text, and reference dictionary from the
/// start of the first inflated BGZF member.
///
/// `input` must hold the entire header region; callers (the record stream)
/// are responsible for accumulating enough inflated bytes first.
pub fn decode_header(input: &[u8]) -> Result<(BamHeaderInfo, usize), BamError> {
    let mut c = Cursor::new(input);

    let magic = c.read_bytes(4)?;
    if magic != BAM_MAGIC {
        return Err(DecodeErrorKind::BadMagic.into());
    }

    let l_text = c.read_u32()?;
    if l_text > MAX_HEADER_TEXT {
        return Err(DecodeErrorKind::BlockTooLarge(l_text as i32).into());
    }
    let text = c.read_fixed_string(l_text as usize)?;

    let n_ref = c.read_i32()?;
    if n_ref < 0 || n_ref > MAX_N_REF {
        return Err(DecodeErrorKind::BadCount(n_ref as i64).into());
    }

    let mut entries = Vec::with_capacity(n_ref as usize);
    for _ in 0..n_ref {
        let l_name = c.read_u32()?;
        let mut name = c.read_fixed_string(l_name as usize)?;
        if name.ends_with('\0') {
            name.pop();
        }
        let length = c.read_u32()?;
        entries.push(ReferenceEntry { name, length });
    }

    Ok((
        BamHeaderInfo {
            text,
            references: Arc::new(ReferenceDictionary::new(entries)),
        },
        c.position(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(text: &str, refs: &[(&str, u32)]) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&BAM_MAGIC);
        buf.extend_from_slice(&(text.len() as u32).to_le_bytes());
        buf.extend_from_slice(text.as_bytes());
        buf.extend_from_slice(&(refs.len() as i32).to_le_bytes());
        for (name, length) in refs {
            let name_nul = format!("{name}\0");
            buf.extend_from_slice(&(name_nul.len() as u32).to_le_bytes());
            buf.extend_from_slice(name_nul.as_bytes());
            buf.extend_from_slice(&length.to_le_bytes());
        }
        buf
    }

    #[test]
    fn decodes_header_and_dictionary() {
        let bytes = header_bytes("@HD\tVN:1.6\n", &[("chr1", 1000), ("chr2", 2000)]);
        let (info, consumed) = decode_header(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(info.text, "@HD\tVN:1.6\n");
        assert_eq!(info.references.len(), 2);
        assert_eq!(info.references.name(0), Some("chr1"));
        assert_eq!(info.references.name(1), Some("chr2"));
        assert_eq!(info.references.id_of("chr2"), Some(1));
        assert_eq!(info.references.name(-1), None);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = header_bytes("", &[]);
        bytes[0] = b'X';
        assert!(matches!(
            decode_header(&bytes),
            Err(BamError::Decode(DecodeErrorKind::BadMagic))
        ));
    }
}
