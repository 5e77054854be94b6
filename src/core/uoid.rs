//! Object references (UOIDs) and the optional key codec.
//!
//! ```text
//! key  := u8 present [uoid]
//! uoid := u8 contents | u32 sequence | u16 location flags | [u8 load mask]
//!         | u16 class type | u32 object id | safe_string name
//!         | [u16 clone id | u16 reserved | u32 clone player id]
//! ```

use bytes::{Buf, BufMut};

use super::stream::{StreamRead, StreamWrite};
use crate::error::Result;

/// Contents flags of a serialized UOID.
pub mod contents {
    pub const HAS_CLONE_IDS: u8 = 0x01;
    pub const HAS_LOAD_MASK: u8 = 0x02;
}

/// Page location of an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Location {
    pub sequence_number: u32,
    pub flags: u16,
}

/// Clone identity of a spawned object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloneIds {
    pub clone_id: u16,
    /// Word between the two ids, zero from current clients. Kept so a key
    /// re-encodes to the bytes it was read from.
    pub reserved: u16,
    pub clone_player_id: u32,
}

/// A reference to an in-world object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Uoid {
    pub location: Location,
    pub load_mask: Option<u8>,
    pub class_type: u16,
    pub object_id: u32,
    pub object_name: String,
    pub clone: Option<CloneIds>,
}

impl Uoid {
    /// Read a UOID that is known to be present.
    pub fn read<B: Buf + ?Sized>(buf: &mut B) -> Result<Self> {
        let contents = buf.read_u8()?;
        let location = Location {
            sequence_number: buf.read_u32()?,
            flags: buf.read_u16()?,
        };
        let load_mask = if contents & contents::HAS_LOAD_MASK != 0 {
            Some(buf.read_u8()?)
        } else {
            None
        };
        let class_type = buf.read_u16()?;
        let object_id = buf.read_u32()?;
        let object_name = buf.read_safe_string()?;
        let clone = if contents & contents::HAS_CLONE_IDS != 0 {
            Some(CloneIds {
                clone_id: buf.read_u16()?,
                reserved: buf.read_u16()?,
                clone_player_id: buf.read_u32()?,
            })
        } else {
            None
        };

        Ok(Self {
            location,
            load_mask,
            class_type,
            object_id,
            object_name,
            clone,
        })
    }

    pub fn write<B: BufMut + ?Sized>(&self, buf: &mut B) -> Result<()> {
        let mut flags = 0;
        if self.clone.is_some() {
            flags |= contents::HAS_CLONE_IDS;
        }
        if self.load_mask.is_some() {
            flags |= contents::HAS_LOAD_MASK;
        }
        buf.write_u8(flags);
        buf.write_u32(self.location.sequence_number);
        buf.write_u16(self.location.flags);
        if let Some(mask) = self.load_mask {
            buf.write_u8(mask);
        }
        buf.write_u16(self.class_type);
        buf.write_u32(self.object_id);
        buf.write_safe_string(&self.object_name)?;
        if let Some(clone) = self.clone {
            buf.write_u16(clone.clone_id);
            buf.write_u16(clone.reserved);
            buf.write_u32(clone.clone_player_id);
        }
        Ok(())
    }
}

/// Read an optional key: a presence byte, then the UOID when present.
pub fn read_key<B: Buf + ?Sized>(buf: &mut B) -> Result<Option<Uoid>> {
    if buf.read_bool()? {
        Ok(Some(Uoid::read(buf)?))
    } else {
        Ok(None)
    }
}

pub fn write_key<B: BufMut + ?Sized>(buf: &mut B, key: Option<&Uoid>) -> Result<()> {
    match key {
        Some(uoid) => {
            buf.write_bool(true);
            uoid.write(buf)
        }
        None => {
            buf.write_bool(false);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    fn avatar_key() -> Uoid {
        Uoid {
            location: Location {
                sequence_number: 0x0021_0010,
                flags: 0x0004,
            },
            load_mask: None,
            class_type: 0x0001,
            object_id: 5,
            object_name: "Male".to_string(),
            clone: Some(CloneIds {
                clone_id: 1,
                reserved: 0,
                clone_player_id: 12345,
            }),
        }
    }

    #[test]
    fn test_absent_key_is_one_byte() {
        let mut buf = BytesMut::new();
        write_key(&mut buf, None).unwrap();
        assert_eq!(&buf[..], &[0]);
        assert_eq!(read_key(&mut buf.freeze()).unwrap(), None);
    }

    #[test]
    fn test_clone_key_layout() {
        let mut buf = BytesMut::new();
        write_key(&mut buf, Some(&avatar_key())).unwrap();
        assert_eq!(buf[0], 1);
        assert_eq!(buf[1], contents::HAS_CLONE_IDS);
        // 1 + 1 + 6 + 2 + 4 + (2 + 4) + 8
        assert_eq!(buf.len(), 28);
        assert_eq!(read_key(&mut buf.freeze()).unwrap(), Some(avatar_key()));
    }

    #[test]
    fn test_load_mask_is_optional_field() {
        let uoid = Uoid {
            load_mask: Some(0xFF),
            clone: None,
            ..avatar_key()
        };
        let mut buf = BytesMut::new();
        uoid.write(&mut buf).unwrap();
        assert_eq!(buf[0], contents::HAS_LOAD_MASK);
        assert_eq!(Uoid::read(&mut buf.freeze()).unwrap(), uoid);
    }

    #[test]
    fn test_reserved_clone_word_survives() {
        let uoid = Uoid {
            clone: Some(CloneIds {
                clone_id: 3,
                reserved: 0xBEEF,
                clone_player_id: 7,
            }),
            ..avatar_key()
        };
        let mut buf = BytesMut::new();
        uoid.write(&mut buf).unwrap();
        let bytes = buf.freeze();
        let read = Uoid::read(&mut bytes.clone()).unwrap();
        assert_eq!(read.clone.map(|c| c.reserved), Some(0xBEEF));

        let mut again = BytesMut::new();
        read.write(&mut again).unwrap();
        assert_eq!(&again[..], &bytes[..]);
    }

    #[test]
    fn test_truncated_uoid_fails() {
        let mut buf = BytesMut::new();
        avatar_key().write(&mut buf).unwrap();
        let mut short = &buf[..buf.len() - 1];
        assert!(Uoid::read(&mut short).unwrap_err().is_premature_eof());
    }
}
