//! Binary cursor (C3): a non-owning little-endian primitive reader over an
//! inflated-byte window, with bounds checks.
//!
//! Every BAM/BAI structural field is little-endian (§6), so this cursor
//! hard-codes that byte order rather than taking it as a parameter.

use byteorder::{ByteOrder, LittleEndian};

use crate::{BamError, DecodeErrorKind};

/// A cursor over a borrowed byte slice. Reads never copy more than the
/// requested primitive; any read that would cross the window end fails with
/// [`DecodeErrorKind::Truncated`] instead of panicking.
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Cursor { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], BamError> {
        if self.remaining() < n {
            return Err(DecodeErrorKind::Truncated.into());
        }
        let s = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), BamError> {
        self.take(n).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8, BamError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, BamError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, BamError> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16, BamError> {
        Ok(LittleEndian::read_i16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, BamError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32, BamError> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, BamError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_i64(&mut self) -> Result<i64, BamError> {
        Ok(LittleEndian::read_i64(self.take(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32, BamError> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn read_fixed_string(&mut self, n: usize) -> Result<String, BamError> {
        let bytes = self.take(n)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], BamError> {
        self.take(n)
    }

    /// Reads up to and including a NUL byte, returning the bytes before it
    /// decoded as UTF-8 (lossy: invalid sequences become U+FFFD).
    pub fn read_c_string(&mut self) -> Result<String, BamError> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(DecodeErrorKind::Truncated)?;
        let s = String::from_utf8_lossy(&rest[..nul]).into_owned();
        self.pos += nul + 1;
        Ok(s)
    }
}
