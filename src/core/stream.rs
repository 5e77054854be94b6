//! # Binary Cursor Utilities
//!
//! Fixed-width little-endian reads and writes plus the string conventions of the
//! legacy wire format, as extension traits over [`bytes::Buf`] and [`bytes::BufMut`].
//!
//! Any `Buf` is a cursor: `&[u8]`, `Bytes`, `std::io::Cursor<&[u8]>` (which also
//! exposes its position for lookahead) or `&mut dyn Buf`.
//!
//! Reads never return short: when fewer bytes remain than requested they fail with
//! [`ProtocolError::UnexpectedEndOfData`] and leave the cursor untouched.
//!
//! ## Strings
//! - **UTF-16 string**: `u16` count of UTF-16 code units, then the units.
//!   The count is checked against a caller-supplied maximum before anything is read.
//! - **Safe string**: `u16` whose high nibble is `0xF` and whose low 12 bits are the
//!   byte length, followed by the bytes, each bit-inverted. Only ASCII is written:
//!   readers decide whether to un-invert from the first byte's high bit, which
//!   plain UTF-8 multibyte text also sets.

use bytes::{Buf, BufMut};
use uuid::Uuid;

use crate::error::{ProtocolError, Result};

/// High nibble set on every safe string length prefix.
pub const SAFE_STRING_MARK: u16 = 0xF000;

/// Largest byte length a safe string prefix can express.
pub const SAFE_STRING_MAX_LEN: usize = 0x0FFF;

/// Wire size of a UUID.
pub const UUID_SIZE: usize = 16;

/// Checked little-endian reads over any byte cursor.
pub trait StreamRead: Buf {
    /// Fail unless at least `needed` bytes remain.
    fn ensure(&self, needed: usize) -> Result<()> {
        let available = self.remaining();
        if available < needed {
            return Err(ProtocolError::UnexpectedEndOfData { needed, available });
        }
        Ok(())
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.get_u8())
    }

    fn read_i8(&mut self) -> Result<i8> {
        self.ensure(1)?;
        Ok(self.get_i8())
    }

    fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2)?;
        Ok(self.get_u16_le())
    }

    fn read_i16(&mut self) -> Result<i16> {
        self.ensure(2)?;
        Ok(self.get_i16_le())
    }

    fn read_u32(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.get_u32_le())
    }

    fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4)?;
        Ok(self.get_i32_le())
    }

    fn read_u64(&mut self) -> Result<u64> {
        self.ensure(8)?;
        Ok(self.get_u64_le())
    }

    fn read_i64(&mut self) -> Result<i64> {
        self.ensure(8)?;
        Ok(self.get_i64_le())
    }

    fn read_f32(&mut self) -> Result<f32> {
        self.ensure(4)?;
        Ok(self.get_f32_le())
    }

    fn read_f64(&mut self) -> Result<f64> {
        self.ensure(8)?;
        Ok(self.get_f64_le())
    }

    /// One byte, 0 or 1.
    fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::InvalidField {
                field: "bool",
                reason: format!("byte {other:#04x} is neither 0 nor 1"),
            }),
        }
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.ensure(len)?;
        let mut out = vec![0u8; len];
        self.copy_to_slice(&mut out);
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.ensure(N)?;
        let mut out = [0u8; N];
        self.copy_to_slice(&mut out);
        Ok(out)
    }

    /// UUID in the mixed-endian GUID layout the clients use.
    fn read_uuid(&mut self) -> Result<Uuid> {
        let raw = self.read_array::<UUID_SIZE>()?;
        Ok(Uuid::from_bytes_le(raw))
    }

    /// Length-prefixed UTF-16 string of at most `max` code units.
    fn read_string16(&mut self, max: usize) -> Result<String> {
        let length = self.read_u16()? as usize;
        if length > max {
            return Err(ProtocolError::StringTooLong { length, max });
        }
        self.ensure(length * 2)?;
        let units: Vec<u16> = (0..length).map(|_| self.get_u16_le()).collect();
        String::from_utf16(&units).map_err(|e| ProtocolError::InvalidField {
            field: "utf-16 string",
            reason: e.to_string(),
        })
    }

    /// Safe string; bytes are un-inverted when the first one has its high bit set.
    fn read_safe_string(&mut self) -> Result<String> {
        let prefix = self.read_u16()?;
        let length = (prefix & !SAFE_STRING_MARK) as usize;
        let mut raw = self.read_bytes(length)?;
        if raw.first().is_some_and(|b| b & 0x80 != 0) {
            raw.iter_mut().for_each(|b| *b = !*b);
        }
        String::from_utf8(raw).map_err(|e| ProtocolError::InvalidField {
            field: "safe string",
            reason: e.to_string(),
        })
    }
}

impl<B: Buf + ?Sized> StreamRead for B {}

/// Little-endian writes matching [`StreamRead`].
pub trait StreamWrite: BufMut {
    fn write_u8(&mut self, value: u8) {
        self.put_u8(value);
    }

    fn write_i8(&mut self, value: i8) {
        self.put_i8(value);
    }

    fn write_u16(&mut self, value: u16) {
        self.put_u16_le(value);
    }

    fn write_i16(&mut self, value: i16) {
        self.put_i16_le(value);
    }

    fn write_u32(&mut self, value: u32) {
        self.put_u32_le(value);
    }

    fn write_i32(&mut self, value: i32) {
        self.put_i32_le(value);
    }

    fn write_u64(&mut self, value: u64) {
        self.put_u64_le(value);
    }

    fn write_f32(&mut self, value: f32) {
        self.put_f32_le(value);
    }

    fn write_f64(&mut self, value: f64) {
        self.put_f64_le(value);
    }

    fn write_bool(&mut self, value: bool) {
        self.put_u8(u8::from(value));
    }

    fn write_bytes(&mut self, data: &[u8]) {
        self.put_slice(data);
    }

    fn write_uuid(&mut self, value: &Uuid) {
        self.put_slice(&value.to_bytes_le());
    }

    /// Length-prefixed UTF-16 string; the length counts code units, so a
    /// surrogate pair counts two.
    fn write_string16(&mut self, value: &str, max: usize) -> Result<()> {
        let units: Vec<u16> = value.encode_utf16().collect();
        if units.len() > max || units.len() > u16::MAX as usize {
            return Err(ProtocolError::StringTooLong {
                length: units.len(),
                max: max.min(u16::MAX as usize),
            });
        }
        self.put_u16_le(units.len() as u16);
        for unit in units {
            self.put_u16_le(unit);
        }
        Ok(())
    }

    fn write_safe_string(&mut self, value: &str) -> Result<()> {
        if !value.is_ascii() {
            return Err(ProtocolError::InvalidField {
                field: "safe string",
                reason: "only ASCII text can be inverted unambiguously".into(),
            });
        }
        let raw = value.as_bytes();
        if raw.len() > SAFE_STRING_MAX_LEN {
            return Err(ProtocolError::StringTooLong {
                length: raw.len(),
                max: SAFE_STRING_MAX_LEN,
            });
        }
        self.put_u16_le(raw.len() as u16 | SAFE_STRING_MARK);
        for b in raw {
            self.put_u8(!b);
        }
        Ok(())
    }
}

impl<B: BufMut + ?Sized> StreamWrite for B {}

/// Cut `value` to at most `max_units` UTF-16 code units without splitting a
/// surrogate pair. Used for fields the clients store in fixed-size buffers.
pub fn truncate_utf16(value: &str, max_units: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in value.chars() {
        let width = ch.len_utf16();
        if used + width > max_units {
            break;
        }
        used += width;
        out.push(ch);
    }
    out
}
