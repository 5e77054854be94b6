//! # SDL State Blobs
//!
//! Saved object state travels as SDL blobs: a record of simple variables (opaque
//! byte runs) and nested variables (arrays of child records). The wire format
//! carries no data lengths, so without the matching descriptor files the
//! structure has to be inferred from marker bytes. [`guess`] does that;
//! writing is exact.
//!
//! ## Layout
//! ```text
//! blob          := [stream_header] record
//! stream_header := u16 flags | safe_string name | u16 version | [uoid]
//! record        := u16 flags | u8 io_version | u8 n | simple_var{n} | u8 m | nested_var{m}
//! simple_var    := [u8 index] 02 00 safe_string hint | u8 save_flags | [unified_time] | data
//! nested_var    := [u8 index] 02 00 safe_string hint | u8 save_flags | [u32 array_len]
//!                  | u8 count | element{count}
//! element       := [u8 index] record
//! ```
//!
//! Index bytes are either present for every variable of a record level or for
//! none of them. Element index bytes are decided per array.
//!
//! ## Example
//! ```rust
//! use moula_server::sdl::{SdlBlob, SdlRecord, SimpleVar, save_flags};
//!
//! let blob = SdlBlob {
//!     header: None,
//!     record: SdlRecord {
//!         flags: 0,
//!         indexed: false,
//!         simple_vars: vec![SimpleVar {
//!             index: 0,
//!             hint: String::new(),
//!             save_flags: save_flags::SAME_AS_DEFAULT,
//!             timestamp: None,
//!             data: Vec::new(),
//!         }],
//!         nested_vars: Vec::new(),
//!     },
//! };
//! let bytes = blob.to_bytes().unwrap();
//! assert_eq!(SdlBlob::from_bytes(&bytes).unwrap(), blob);
//! ```

pub mod guess;

use bytes::{BufMut, Bytes, BytesMut};

use crate::core::stream::StreamWrite;
use crate::core::{UnifiedTime, Uoid};
use crate::error::{ProtocolError, Result};

pub use guess::GuessLimits;

/// Only IO version the decoder understands.
pub const IO_VERSION: u8 = 6;

/// Hints longer than this would not produce the `02 00 LL F0` marker.
pub const MAX_HINT_LEN: usize = 0xFF;

/// Per-variable save flags.
pub mod save_flags {
    pub const HAS_UOID: u8 = 0x01;
    pub const HAS_NOTIFICATION_INFO: u8 = 0x02;
    pub const HAS_TIMESTAMP: u8 = 0x04;
    pub const SAME_AS_DEFAULT: u8 = 0x08;
    pub const HAS_DIRTY_FLAG: u8 = 0x10;
    pub const WANT_TIMESTAMP: u8 = 0x20;
}

/// Stream header flags.
pub mod stream_flags {
    pub const HAS_UOID: u16 = 0x0001;
    pub const VAR_LENGTH_IO: u16 = 0x8000;
    pub const KNOWN: u16 = HAS_UOID | VAR_LENGTH_IO;
}

/// Descriptor identity that may precede a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    pub descriptor_name: String,
    pub descriptor_version: u16,
    pub uoid: Option<Uoid>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SdlBlob {
    pub header: Option<StreamHeader>,
    pub record: SdlRecord,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SdlRecord {
    pub flags: u16,
    /// Whether variables at this level carry explicit index bytes.
    pub indexed: bool,
    pub simple_vars: Vec<SimpleVar>,
    pub nested_vars: Vec<NestedVar>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleVar {
    pub index: u8,
    pub hint: String,
    pub save_flags: u8,
    pub timestamp: Option<UnifiedTime>,
    /// Raw value bytes; the element type is unknown without a descriptor.
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedVar {
    pub index: u8,
    pub hint: String,
    pub save_flags: u8,
    /// Present for variable-length arrays.
    pub array_len: Option<u32>,
    pub elements_indexed: bool,
    pub elements: Vec<NestedElement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NestedElement {
    pub index: u8,
    pub record: SdlRecord,
}

impl SimpleVar {
    pub fn is_default(&self) -> bool {
        self.save_flags & save_flags::SAME_AS_DEFAULT != 0
    }
}

impl StreamHeader {
    pub fn flags(&self) -> u16 {
        if self.uoid.is_some() {
            stream_flags::VAR_LENGTH_IO | stream_flags::HAS_UOID
        } else {
            stream_flags::VAR_LENGTH_IO
        }
    }

    pub fn write<B: BufMut + ?Sized>(&self, buf: &mut B) -> Result<()> {
        buf.write_u16(self.flags());
        buf.write_safe_string(&self.descriptor_name)?;
        buf.write_u16(self.descriptor_version);
        if let Some(uoid) = &self.uoid {
            uoid.write(buf)?;
        }
        Ok(())
    }
}

impl SdlBlob {
    /// Decode with the default lookahead windows.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Self::from_bytes_with(data, &GuessLimits::default())
    }

    pub fn from_bytes_with(data: &[u8], limits: &GuessLimits) -> Result<Self> {
        guess::decode_blob(data, limits)
    }

    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        if let Some(header) = &self.header {
            header.write(&mut buf)?;
        }
        self.record.write(&mut buf)?;
        Ok(buf.freeze())
    }
}

fn invalid(msg: String) -> ProtocolError {
    ProtocolError::InvalidRecord(msg)
}

fn count_u8(len: usize, what: &str) -> Result<u8> {
    u8::try_from(len).map_err(|_| invalid(format!("{len} {what} exceeds 255")))
}

fn write_prefix(buf: &mut BytesMut, hint: &str) -> Result<()> {
    if hint.len() > MAX_HINT_LEN {
        return Err(invalid(format!("hint of {} bytes exceeds {MAX_HINT_LEN}", hint.len())));
    }
    buf.write_u8(save_flags::HAS_NOTIFICATION_INFO);
    buf.write_u8(0);
    buf.write_safe_string(hint)
}

impl SdlRecord {
    /// Write the record, rejecting values the decoder could not reproduce.
    pub fn write(&self, buf: &mut BytesMut) -> Result<()> {
        buf.write_u16(self.flags);
        buf.write_u8(IO_VERSION);

        buf.write_u8(count_u8(self.simple_vars.len(), "simple variables")?);
        for (pos, var) in self.simple_vars.iter().enumerate() {
            self.write_index(buf, var.index, pos)?;
            write_prefix(buf, &var.hint)?;
            buf.write_u8(var.save_flags);

            let flagged = var.save_flags & save_flags::HAS_TIMESTAMP != 0;
            match (&var.timestamp, flagged) {
                (Some(ts), true) => ts.write(buf),
                (None, false) => {}
                _ => {
                    return Err(invalid(format!(
                        "variable {} timestamp does not match its save flags",
                        var.index
                    )))
                }
            }
            if var.is_default() && !var.data.is_empty() {
                return Err(invalid(format!("default variable {} carries data", var.index)));
            }
            buf.write_bytes(&var.data);
        }

        buf.write_u8(count_u8(self.nested_vars.len(), "nested variables")?);
        for (pos, var) in self.nested_vars.iter().enumerate() {
            self.write_index(buf, var.index, pos)?;
            var.write(buf)?;
        }
        Ok(())
    }

    fn write_index(&self, buf: &mut BytesMut, index: u8, pos: usize) -> Result<()> {
        if self.indexed {
            buf.write_u8(index);
        } else if usize::from(index) != pos {
            return Err(invalid(format!("implicit index {index} at position {pos}")));
        }
        Ok(())
    }
}

impl NestedVar {
    fn write(&self, buf: &mut BytesMut) -> Result<()> {
        write_prefix(buf, &self.hint)?;
        buf.write_u8(self.save_flags);

        if self.elements.is_empty() {
            return Err(invalid(format!("nested variable {} has no elements", self.index)));
        }
        let count = count_u8(self.elements.len(), "elements")?;
        if let Some(len) = self.array_len {
            if !self.elements_indexed && len != u32::from(count) {
                return Err(invalid(format!(
                    "array length {len} differs from element count {count}"
                )));
            }
            if self.elements_indexed {
                if len < u32::from(count) {
                    return Err(invalid(format!("array length {len} below element count {count}")));
                }
                if let Some(element) = self.elements.iter().find(|e| u32::from(e.index) >= len) {
                    return Err(invalid(format!(
                        "element index {} outside array length {len}",
                        element.index
                    )));
                }
            }
            buf.write_u32(len);
        }
        buf.write_u8(count);

        for (pos, element) in self.elements.iter().enumerate() {
            if self.elements_indexed {
                buf.write_u8(element.index);
            } else if usize::from(element.index) != pos {
                return Err(invalid(format!(
                    "implicit element index {} at position {pos}",
                    element.index
                )));
            }
            element.record.write(buf)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(index: u8, save_flags: u8, data: &[u8]) -> SimpleVar {
        SimpleVar {
            index,
            hint: String::new(),
            save_flags,
            timestamp: None,
            data: data.to_vec(),
        }
    }

    fn record(indexed: bool, simple_vars: Vec<SimpleVar>) -> SdlRecord {
        SdlRecord {
            flags: 0,
            indexed,
            simple_vars,
            nested_vars: Vec::new(),
        }
    }

    #[test]
    fn test_minimal_record_bytes() {
        let mut buf = BytesMut::new();
        SdlRecord::default().write(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0, IO_VERSION, 0, 0]);
    }

    #[test]
    fn test_implicit_index_must_match_position() {
        let mut buf = BytesMut::new();
        let err = record(false, vec![var(1, 0, &[1])]).write(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidRecord(_)));

        let mut buf = BytesMut::new();
        record(true, vec![var(7, 0, &[1])]).write(&mut buf).unwrap();
        assert_eq!(buf[4], 7);
    }

    #[test]
    fn test_default_variable_cannot_carry_data() {
        let mut buf = BytesMut::new();
        let rec = record(false, vec![var(0, save_flags::SAME_AS_DEFAULT, &[1])]);
        assert!(rec.write(&mut buf).is_err());
    }

    #[test]
    fn test_timestamp_must_match_flag() {
        let mut v = var(0, save_flags::HAS_TIMESTAMP, &[1]);
        assert!(record(false, vec![v.clone()]).write(&mut BytesMut::new()).is_err());

        v.timestamp = Some(UnifiedTime::new(1, 2));
        assert!(record(false, vec![v.clone()]).write(&mut BytesMut::new()).is_ok());

        v.save_flags = 0;
        assert!(record(false, vec![v]).write(&mut BytesMut::new()).is_err());
    }

    #[test]
    fn test_implicit_variable_array_length() {
        let nested = NestedVar {
            index: 0,
            hint: String::new(),
            save_flags: 0,
            array_len: Some(3),
            elements_indexed: false,
            elements: vec![NestedElement {
                index: 0,
                record: SdlRecord::default(),
            }],
        };
        let rec = SdlRecord {
            nested_vars: vec![nested],
            ..SdlRecord::default()
        };
        assert!(rec.write(&mut BytesMut::new()).is_err());
    }

    #[test]
    fn test_indexed_variable_array_bounds() {
        let nested = |array_len, index| SdlRecord {
            nested_vars: vec![NestedVar {
                index: 0,
                hint: String::new(),
                save_flags: 0,
                array_len: Some(array_len),
                elements_indexed: true,
                elements: vec![NestedElement {
                    index,
                    record: SdlRecord::default(),
                }],
            }],
            ..SdlRecord::default()
        };
        assert!(nested(10, 9).write(&mut BytesMut::new()).is_ok());
        assert!(nested(10, 10).write(&mut BytesMut::new()).is_err());
        assert!(nested(0, 0).write(&mut BytesMut::new()).is_err());
    }

    #[test]
    fn test_counts_limited_to_u8() {
        let vars = (0..256).map(|_| var(0, save_flags::SAME_AS_DEFAULT, &[])).collect();
        assert!(record(true, vars).write(&mut BytesMut::new()).is_err());
    }

    #[test]
    fn test_header_flags_follow_uoid() {
        let header = StreamHeader {
            descriptor_name: "city".into(),
            descriptor_version: 43,
            uoid: None,
        };
        assert_eq!(header.flags(), stream_flags::VAR_LENGTH_IO);
        let with_uoid = StreamHeader {
            uoid: Some(Uoid::default()),
            ..header
        };
        assert_eq!(with_uoid.flags(), 0x8001);
    }
}
