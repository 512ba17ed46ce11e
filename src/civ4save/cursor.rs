//! Byte cursor over the logical save buffer.
//!
//! Every record group is decoded by walking a `SaveCursor` forward, so the
//! bytes-consumed bookkeeping lives in exactly one place. All integers in the
//! save are little-endian.

use byteorder::{ByteOrder, LittleEndian};
use encoding_rs::UTF_16LE;

use super::error::{Result, SaveError};

/// Sequential little-endian reader with offset tracking.
#[derive(Debug, Clone)]
pub struct SaveCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> SaveCursor<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Start a cursor at an absolute offset into the buffer.
    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    /// Absolute offset of the next unread byte.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(SaveError::Truncated {
                field,
                offset: self.pos,
            });
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_i32(&mut self, field: &'static str) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4, field)?))
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4, field)?))
    }

    pub fn read_i16(&mut self, field: &'static str) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.take(2, field)?))
    }

    pub fn read_u16(&mut self, field: &'static str) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2, field)?))
    }

    pub fn read_i8(&mut self, field: &'static str) -> Result<i8> {
        Ok(self.take(1, field)?[0] as i8)
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8> {
        Ok(self.take(1, field)?[0])
    }

    /// One-byte boolean flag. The engine writes 0 or 1 but any non-zero
    /// byte counts as set.
    pub fn read_flag(&mut self, field: &'static str) -> Result<bool> {
        Ok(self.take(1, field)?[0] != 0)
    }

    pub fn read_i32_array(&mut self, count: usize, field: &'static str) -> Result<Vec<i32>> {
        let bytes = self.take(count * 4, field)?;
        Ok(bytes.chunks_exact(4).map(LittleEndian::read_i32).collect())
    }

    pub fn read_i16_array(&mut self, count: usize, field: &'static str) -> Result<Vec<i16>> {
        let bytes = self.take(count * 2, field)?;
        Ok(bytes.chunks_exact(2).map(LittleEndian::read_i16).collect())
    }

    pub fn read_i8_array(&mut self, count: usize, field: &'static str) -> Result<Vec<i8>> {
        Ok(self.take(count, field)?.iter().map(|&b| b as i8).collect())
    }

    pub fn read_flag_array(&mut self, count: usize, field: &'static str) -> Result<Vec<bool>> {
        Ok(self.take(count, field)?.iter().map(|&b| b != 0).collect())
    }

    /// Read a signed 32-bit length prefix and validate it as an array length.
    pub fn read_len_i32(&mut self, field: &'static str) -> Result<usize> {
        let offset = self.pos;
        let len = self.read_i32(field)?;
        if len < 0 {
            return Err(SaveError::InvalidLength {
                field,
                len: len as i64,
                offset,
            });
        }
        Ok(len as usize)
    }

    /// Read a signed 8-bit length prefix, used by the per-plot arrays.
    pub fn read_len_i8(&mut self, field: &'static str) -> Result<usize> {
        let offset = self.pos;
        let len = self.read_i8(field)?;
        if len < 0 {
            return Err(SaveError::InvalidLength {
                field,
                len: len as i64,
                offset,
            });
        }
        Ok(len as usize)
    }

    /// Read a wide string: u32 count of UTF-16 code units followed by
    /// count*2 bytes of UTF-16LE text.
    pub fn read_wide_string(&mut self, field: &'static str) -> Result<String> {
        let units = self.read_u32(field)? as usize;
        let bytes = self.take(units * 2, field)?;
        let (text, _, _) = UTF_16LE.decode(bytes);
        Ok(text.into_owned())
    }

    /// Read a narrow string: u32 byte count followed by that many bytes of
    /// single-byte text.
    pub fn read_narrow_string(&mut self, field: &'static str) -> Result<String> {
        let len = self.read_u32(field)? as usize;
        let bytes = self.take(len, field)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}
