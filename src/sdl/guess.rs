//! Schema-less structure guessing for SDL records.
//!
//! Simple variable data carries no length. The decoder finds where a value ends
//! by scanning ahead for the next structural marker:
//!
//! - start of a variable: `02 00 LL F0` (notification info, then a hint prefix)
//! - start of a record body: `00 00 06` or `01 00 06` (record flags, IO version)
//!
//! The last variable of a record is the hard case because what comes next is
//! decided by the enclosing structure, so each record is decoded knowing its
//! [`Follower`]. All failures are `SdlGuess` errors: the bytes may be valid, the
//! decoder just cannot place the boundaries.

use std::io::Cursor;

use bytes::Buf;
use tracing::trace;

use super::{
    save_flags, stream_flags, NestedElement, NestedVar, SdlBlob, SdlRecord, SimpleVar, StreamHeader,
    IO_VERSION,
};
use crate::core::stream::StreamRead;
use crate::core::{UnifiedTime, Uoid};
use crate::error::constants::*;
use crate::error::{ProtocolError, Result};

/// Nested records deeper than this are refused before the stack is at risk.
pub const MAX_DEPTH: usize = 32;

/// Ambiguous boundaries resolved by trial decoding, per blob.
pub const MAX_BACKTRACKS: usize = 64;

/// Lookahead window sizes in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuessLimits {
    /// Window searched for the end of a simple variable's data.
    pub data_window: usize,
    /// Window used to infer a nested array's shape.
    pub shape_window: usize,
    /// Window used to infer simple-variable indexing.
    pub variable_window: usize,
    /// Window used to infer nested-slot indexing when a record has no simple variables.
    pub slot_window: usize,
}

impl Default for GuessLimits {
    fn default() -> Self {
        Self {
            data_window: 128,
            shape_window: 9,
            variable_window: 5,
            slot_window: 6,
        }
    }
}

/// What the enclosing structure places right after a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Follower {
    End,
    /// Another element of the same array.
    Sibling { indexed: bool },
    /// The parent record's next nested variable.
    Slot { indexed: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Variable,
    Blob,
}

fn is_variable_marker(window: &[u8], at: usize) -> bool {
    matches!(window.get(at..at + 4), Some([0x02, 0x00, _, 0xF0]))
}

fn is_blob_marker(window: &[u8], at: usize) -> bool {
    matches!(window.get(at..at + 3), Some([0x00 | 0x01, 0x00, IO_VERSION]))
}

/// Earliest marker of either kind that fits entirely inside `window`.
fn find_marker(window: &[u8]) -> Option<(Marker, usize)> {
    (0..window.len()).find_map(|p| {
        if is_variable_marker(window, p) {
            Some((Marker::Variable, p))
        } else if is_blob_marker(window, p) {
            Some((Marker::Blob, p))
        } else {
            None
        }
    })
}

/// Array layout as seen from the byte after a nested variable's save flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArrayShape {
    variable_length: bool,
    indexed: bool,
    /// Offset of the first element's record marker.
    marker_at: usize,
}

impl ArrayShape {
    const CANDIDATES: [ArrayShape; 4] = [
        ArrayShape::new(false, false),
        ArrayShape::new(false, true),
        ArrayShape::new(true, false),
        ArrayShape::new(true, true),
    ];

    const fn new(variable_length: bool, indexed: bool) -> Self {
        let length_len = if variable_length { 4 } else { 0 };
        let index_len = if indexed { 1 } else { 0 };
        Self {
            variable_length,
            indexed,
            marker_at: length_len + 1 + index_len,
        }
    }

    /// Whether `window` is consistent with this layout: a record marker where the
    /// first element starts, a nonzero count, and for variable-length arrays a
    /// length that can hold the elements.
    fn fits(&self, window: &[u8]) -> bool {
        if !is_blob_marker(window, self.marker_at) {
            return false;
        }
        if !self.variable_length {
            return window.first().is_some_and(|&count| count != 0);
        }
        let Some(&[l0, l1, l2, l3, count]) = window.get(..5) else {
            return false;
        };
        let len = u32::from_le_bytes([l0, l1, l2, l3]);
        let count = u32::from(count);
        if count == 0 {
            return false;
        }
        if !self.indexed {
            return len == count;
        }
        len >= count && window.get(5).is_some_and(|&first| u32::from(first) < len)
    }
}

struct ArrayElements {
    array_len: Option<u32>,
    indexed: bool,
    elements: Vec<NestedElement>,
}

struct Guesser<'a> {
    cursor: Cursor<&'a [u8]>,
    limits: GuessLimits,
    /// Ambiguous boundaries tried so far.
    backtracks: usize,
}

impl<'a> Guesser<'a> {
    fn new(data: &'a [u8], limits: GuessLimits) -> Self {
        Self {
            cursor: Cursor::new(data),
            limits,
            backtracks: 0,
        }
    }

    fn pos(&self) -> usize {
        self.cursor.position() as usize
    }

    fn window(&self, len: usize) -> &'a [u8] {
        let data: &'a [u8] = *self.cursor.get_ref();
        let start = self.pos().min(data.len());
        &data[start..(start + len).min(data.len())]
    }

    fn fail(&self, context: &'static str) -> ProtocolError {
        self.fail_at(context, 0)
    }

    fn fail_at(&self, context: &'static str, ahead: usize) -> ProtocolError {
        ProtocolError::SdlGuess {
            context,
            offset: self.pos() + ahead,
        }
    }

    fn header(&mut self) -> Result<StreamHeader> {
        let flags = self.cursor.read_u16()?;
        if flags & !stream_flags::KNOWN != 0 || flags & stream_flags::VAR_LENGTH_IO == 0 {
            return Err(ProtocolError::UnsupportedStreamFlags(flags));
        }
        let descriptor_name = self.cursor.read_safe_string()?;
        let descriptor_version = self.cursor.read_u16()?;
        let uoid = if flags & stream_flags::HAS_UOID != 0 {
            Some(Uoid::read(&mut self.cursor)?)
        } else {
            None
        };
        Ok(StreamHeader {
            descriptor_name,
            descriptor_version,
            uoid,
        })
    }

    fn prefix(&mut self) -> Result<String> {
        let marker = self.window(2);
        if marker != [save_flags::HAS_NOTIFICATION_INFO, 0] {
            return Err(self.fail(ERR_SDL_VARIABLE_PREFIX));
        }
        self.cursor.advance(2);
        self.cursor.read_safe_string()
    }

    fn index(&mut self, indexed: bool, position: usize) -> Result<u8> {
        if indexed {
            self.cursor.read_u8()
        } else {
            // counts are u8, so positions always fit
            Ok(position as u8)
        }
    }

    fn record(&mut self, follower: Follower, depth: usize) -> Result<SdlRecord> {
        if depth > MAX_DEPTH {
            return Err(self.fail(ERR_SDL_NESTING_DEPTH));
        }
        let flags = self.cursor.read_u16()?;
        let io_version = self.cursor.read_u8()?;
        if io_version != IO_VERSION {
            return Err(ProtocolError::UnsupportedIoVersion {
                expected: IO_VERSION,
                actual: io_version,
            });
        }

        let simple_count = self.cursor.read_u8()? as usize;
        let indexed = if simple_count == 0 {
            self.slot_indexing()?
        } else {
            self.variable_indexing()?
        };

        let mut simple_vars = Vec::with_capacity(simple_count);
        for position in 0..simple_count.saturating_sub(1) {
            simple_vars.push(self.simple_var(indexed, position)?);
        }
        let nested_vars = if simple_count == 0 {
            self.nested_vars(indexed, follower, depth)?
        } else {
            let (last, nested_vars) = self.last_simple_var(indexed, simple_count - 1, follower, depth)?;
            simple_vars.push(last);
            nested_vars
        };

        Ok(SdlRecord {
            flags,
            indexed,
            simple_vars,
            nested_vars,
        })
    }

    /// With no simple variables the window starts at the nested count.
    fn slot_indexing(&self) -> Result<bool> {
        let window = self.window(self.limits.slot_window);
        match window.first() {
            None => Err(ProtocolError::UnexpectedEndOfData {
                needed: 1,
                available: 0,
            }),
            Some(0) => Ok(false),
            Some(_) if is_variable_marker(window, 1) => Ok(false),
            Some(_) if is_variable_marker(window, 2) => Ok(true),
            Some(_) => Err(self.fail(ERR_SDL_FIRST_SLOT)),
        }
    }

    fn variable_indexing(&self) -> Result<bool> {
        let window = self.window(self.limits.variable_window);
        if is_variable_marker(window, 0) {
            Ok(false)
        } else if is_variable_marker(window, 1) {
            Ok(true)
        } else {
            Err(self.fail(ERR_SDL_FIRST_VARIABLE))
        }
    }

    fn nested_vars(&mut self, indexed: bool, follower: Follower, depth: usize) -> Result<Vec<NestedVar>> {
        let nested_count = self.cursor.read_u8()? as usize;
        let mut nested_vars = Vec::with_capacity(nested_count);
        for position in 0..nested_count {
            let index = self.index(indexed, position)?;
            let last_slot = position + 1 == nested_count;
            nested_vars.push(self.nested_var(index, indexed, last_slot, follower, depth)?);
        }
        Ok(nested_vars)
    }

    fn spend_backtrack(&mut self) -> Result<()> {
        if self.backtracks >= MAX_BACKTRACKS {
            return Err(self.fail(ERR_SDL_BACKTRACK_LIMIT));
        }
        self.backtracks += 1;
        Ok(())
    }

    /// Everything up to the data, which is left empty.
    fn simple_var_head(&mut self, indexed: bool, position: usize) -> Result<SimpleVar> {
        let index = self.index(indexed, position)?;
        let hint = self.prefix()?;
        let save_flags = self.cursor.read_u8()?;
        let timestamp = if save_flags & save_flags::HAS_TIMESTAMP != 0 {
            Some(UnifiedTime::read(&mut self.cursor)?)
        } else {
            None
        };

        Ok(SimpleVar {
            index,
            hint,
            save_flags,
            timestamp,
            data: Vec::new(),
        })
    }

    fn simple_var(&mut self, indexed: bool, position: usize) -> Result<SimpleVar> {
        let mut var = self.simple_var_head(indexed, position)?;
        if var.save_flags & save_flags::SAME_AS_DEFAULT == 0 {
            let len = self.data_len(indexed)?;
            var.data = self.cursor.read_bytes(len)?;
        }
        Ok(var)
    }

    /// The last variable's data and the record's nested variables are placed
    /// together. When the bytes read both as this record's nested count and as
    /// the end of the record, the nested count is tried first and the rest of
    /// the record must decode under it.
    fn last_simple_var(
        &mut self,
        indexed: bool,
        position: usize,
        follower: Follower,
        depth: usize,
    ) -> Result<(SimpleVar, Vec<NestedVar>)> {
        let mut var = self.simple_var_head(indexed, position)?;
        if var.save_flags & save_flags::SAME_AS_DEFAULT != 0 {
            let nested_vars = self.nested_vars(indexed, follower, depth)?;
            return Ok((var, nested_vars));
        }

        let (len, fallback) = self.last_data_len(indexed, follower)?;
        let start = self.cursor.position();
        var.data = self.cursor.read_bytes(len)?;
        let Some(fallback) = fallback else {
            let nested_vars = self.nested_vars(indexed, follower, depth)?;
            return Ok((var, nested_vars));
        };

        self.spend_backtrack()?;
        match self.nested_vars(indexed, follower, depth) {
            Ok(nested_vars) => Ok((var, nested_vars)),
            Err(e) => {
                trace!(offset = start, len, error = %e, "nested count rejected, ending record");
                self.cursor.set_position(start);
                var.data = self.cursor.read_bytes(fallback)?;
                let nested_vars = self.nested_vars(indexed, follower, depth)?;
                Ok((var, nested_vars))
            }
        }
    }

    /// Data of a non-last variable runs up to the next variable's index byte.
    fn data_len(&self, indexed: bool) -> Result<usize> {
        let index_len = usize::from(indexed);
        let window = self.window(self.limits.data_window);
        match find_marker(window) {
            Some((Marker::Variable, p)) if p >= index_len => Ok(p - index_len),
            Some((_, p)) => Err(self.fail_at(ERR_SDL_VARIABLE_END, p)),
            None => Err(self.fail(ERR_SDL_VARIABLE_END)),
        }
    }

    /// Data of the last variable runs up to this record's nested count, which
    /// is followed either by this record's first slot or by whatever the
    /// enclosing structure places next. A second length is returned when both
    /// readings fit the window.
    fn last_data_len(&self, indexed: bool, follower: Follower) -> Result<(usize, Option<usize>)> {
        let window = self.window(self.limits.data_window);
        let count_before = |p: usize, index_len: usize, nonzero: bool| -> Option<usize> {
            let d = p.checked_sub(1 + index_len)?;
            let count = *window.get(d)?;
            ((count != 0) == nonzero).then_some(d)
        };

        let found = match find_marker(window) {
            Some((Marker::Variable, p)) => {
                let own = count_before(p, usize::from(indexed), true);
                let next_slot = match follower {
                    Follower::Slot { indexed } => count_before(p, usize::from(indexed), false),
                    _ => None,
                };
                match (own, next_slot) {
                    (Some(own), next_slot) => (own, next_slot),
                    (None, Some(next_slot)) => (next_slot, None),
                    (None, None) => return Err(self.fail_at(ERR_SDL_LAST_VARIABLE_END, p)),
                }
            }
            Some((Marker::Blob, p)) => match follower {
                Follower::Sibling { indexed } => count_before(p, usize::from(indexed), false)
                    .map(|len| (len, None))
                    .ok_or_else(|| self.fail_at(ERR_SDL_LAST_VARIABLE_END, p))?,
                _ => return Err(self.fail_at(ERR_SDL_LAST_VARIABLE_END, p)),
            },
            None => {
                let rest = self.cursor.remaining();
                let ends_with_empty_count = self.cursor.get_ref().last() == Some(&0);
                if follower != Follower::End || rest == 0 || rest > window.len() || !ends_with_empty_count {
                    return Err(self.fail(ERR_SDL_LAST_VARIABLE_END));
                }
                (rest - 1, None)
            }
        };
        trace!(offset = self.pos(), len = found.0, fallback = ?found.1, "placed last variable end");
        Ok(found)
    }

    fn nested_var(
        &mut self,
        index: u8,
        slots_indexed: bool,
        last_slot: bool,
        follower: Follower,
        depth: usize,
    ) -> Result<NestedVar> {
        let hint = self.prefix()?;
        let save_flags = self.cursor.read_u8()?;

        let window = self.window(self.limits.shape_window);
        let shapes: Vec<ArrayShape> = ArrayShape::CANDIDATES
            .into_iter()
            .filter(|shape| shape.fits(window))
            .collect();

        let elements = match shapes.as_slice() {
            [] => return Err(self.fail(ERR_SDL_ARRAY_SHAPE)),
            [shape] => self.elements(*shape, slots_indexed, last_slot, follower, depth)?,
            _ => self.elements_of_any(&shapes, slots_indexed, last_slot, follower, depth)?,
        };

        Ok(NestedVar {
            index,
            hint,
            save_flags,
            array_len: elements.array_len,
            elements_indexed: elements.indexed,
            elements: elements.elements,
        })
    }

    /// Decode the array under every candidate shape; exactly one may succeed.
    fn elements_of_any(
        &mut self,
        shapes: &[ArrayShape],
        slots_indexed: bool,
        last_slot: bool,
        follower: Follower,
        depth: usize,
    ) -> Result<ArrayElements> {
        self.spend_backtrack()?;

        let start = self.cursor.position();
        let mut decoded: Option<(ArrayElements, u64)> = None;
        for shape in shapes {
            self.cursor.set_position(start);
            match self.elements(*shape, slots_indexed, last_slot, follower, depth) {
                Ok(elements) => {
                    if decoded.is_some() {
                        self.cursor.set_position(start);
                        return Err(self.fail(ERR_SDL_AMBIGUOUS_SHAPE));
                    }
                    decoded = Some((elements, self.cursor.position()));
                }
                Err(e) => trace!(offset = start, shape = ?shape, error = %e, "array shape rejected"),
            }
        }

        self.cursor.set_position(start);
        let (elements, end) = decoded.ok_or_else(|| self.fail(ERR_SDL_ARRAY_SHAPE))?;
        self.cursor.set_position(end);
        Ok(elements)
    }

    fn elements(
        &mut self,
        shape: ArrayShape,
        slots_indexed: bool,
        last_slot: bool,
        follower: Follower,
        depth: usize,
    ) -> Result<ArrayElements> {
        let array_len = if shape.variable_length {
            Some(self.cursor.read_u32()?)
        } else {
            None
        };
        let count = usize::from(self.cursor.read_u8()?);

        let mut elements = Vec::with_capacity(count);
        for position in 0..count {
            let element_index = self.index(shape.indexed, position)?;
            let element_follower = if position + 1 < count {
                Follower::Sibling {
                    indexed: shape.indexed,
                }
            } else if !last_slot {
                Follower::Slot {
                    indexed: slots_indexed,
                }
            } else {
                follower
            };
            elements.push(NestedElement {
                index: element_index,
                record: self.record(element_follower, depth + 1)?,
            });
        }

        Ok(ArrayElements {
            array_len,
            indexed: shape.indexed,
            elements,
        })
    }
}

/// Decode a blob, detecting the optional stream header from the high bit of
/// the first word.
pub fn decode_blob(data: &[u8], limits: &GuessLimits) -> Result<SdlBlob> {
    let mut guesser = Guesser::new(data, *limits);

    let has_header = matches!(data, [_, hi, ..] if hi & 0x80 != 0);
    let header = if has_header { Some(guesser.header()?) } else { None };
    let record = guesser.record(Follower::End, 0)?;

    if guesser.cursor.has_remaining() {
        return Err(guesser.fail(ERR_SDL_TRAILING_DATA));
    }
    Ok(SdlBlob { header, record })
}

/// Decode a bare record with no stream header.
pub fn decode_record(data: &[u8], limits: &GuessLimits) -> Result<SdlRecord> {
    let mut guesser = Guesser::new(data, *limits);
    let record = guesser.record(Follower::End, 0)?;
    if guesser.cursor.has_remaining() {
        return Err(guesser.fail(ERR_SDL_TRAILING_DATA));
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;

    fn decode(data: &[u8]) -> Result<SdlRecord> {
        decode_record(data, &GuessLimits::default())
    }

    fn encode(record: &SdlRecord) -> BytesMut {
        let mut buf = BytesMut::new();
        record.write(&mut buf).unwrap();
        buf
    }

    fn array(index: u8, array_len: Option<u32>, elements_indexed: bool, elements: Vec<NestedElement>) -> NestedVar {
        NestedVar {
            index,
            hint: String::new(),
            save_flags: 0,
            array_len,
            elements_indexed,
            elements,
        }
    }

    #[test]
    fn test_markers() {
        assert!(is_variable_marker(&[0x02, 0x00, 0x05, 0xF0], 0));
        assert!(!is_variable_marker(&[0x02, 0x00, 0x05], 0));
        assert!(is_blob_marker(&[0xFF, 0x01, 0x00, 0x06], 1));
        assert!(!is_blob_marker(&[0x02, 0x00, 0x06], 0));
        assert_eq!(find_marker(&[9, 0, 0, 6, 2, 0, 0, 0xF0]), Some((Marker::Blob, 1)));
    }

    #[test]
    fn test_empty_record() {
        let record = decode(&[0, 0, 6, 0, 0]).unwrap();
        assert_eq!(record, SdlRecord::default());
    }

    #[test]
    fn test_single_last_variable_reaches_end() {
        let data = [0, 0, 6, 1, 0x02, 0x00, 0x00, 0xF0, 0x00, 0xAA, 0xBB, 0x00];
        let record = decode(&data).unwrap();
        assert!(!record.indexed);
        assert_eq!(record.simple_vars[0].data, vec![0xAA, 0xBB]);
    }

    #[test]
    fn test_explicit_indices() {
        let data = [
            0, 0, 6, 2, //
            3, 0x02, 0x00, 0x00, 0xF0, 0x00, 0x11, //
            9, 0x02, 0x00, 0x00, 0xF0, 0x00, 0x22, 0x33, //
            0x00,
        ];
        let record = decode(&data).unwrap();
        assert!(record.indexed);
        let indices: Vec<u8> = record.simple_vars.iter().map(|v| v.index).collect();
        assert_eq!(indices, vec![3, 9]);
        assert_eq!(record.simple_vars[0].data, vec![0x11]);
        assert_eq!(record.simple_vars[1].data, vec![0x22, 0x33]);
    }

    #[test]
    fn test_wrong_io_version() {
        assert!(matches!(
            decode(&[0, 0, 5, 0, 0]),
            Err(ProtocolError::UnsupportedIoVersion { expected: 6, actual: 5 })
        ));
    }

    #[test]
    fn test_unguessable_first_variable() {
        let err = decode(&[0, 0, 6, 1, 0x07, 0x07, 0x07, 0x07, 0x07]).unwrap_err();
        assert!(matches!(err, ProtocolError::SdlGuess { context, offset: 4 } if context == ERR_SDL_FIRST_VARIABLE));
    }

    #[test]
    fn test_last_variable_too_long_for_window() {
        let mut data = vec![0, 0, 6, 1, 0x02, 0x00, 0x00, 0xF0, 0x00];
        data.extend(std::iter::repeat(0x55).take(200));
        data.push(0);
        let err = decode(&data).unwrap_err();
        assert!(matches!(err, ProtocolError::SdlGuess { context, .. } if context == ERR_SDL_LAST_VARIABLE_END));

        let wide = GuessLimits {
            data_window: 256,
            ..GuessLimits::default()
        };
        let record = decode_record(&data, &wide).unwrap();
        assert_eq!(record.simple_vars[0].data.len(), 200);
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let err = decode(&[0, 0, 6, 0, 0, 0xEE]).unwrap_err();
        assert!(matches!(err, ProtocolError::SdlGuess { context, offset: 5 } if context == ERR_SDL_TRAILING_DATA));
    }

    #[test]
    fn test_header_rejects_unknown_flags() {
        let data = [0x02, 0x80, 0x00, 0xF0, 0x01, 0x00, 0, 0, 6, 0, 0];
        assert!(matches!(
            decode_blob(&data, &GuessLimits::default()),
            Err(ProtocolError::UnsupportedStreamFlags(0x8002))
        ));
    }

    #[test]
    fn test_empty_array_cannot_be_guessed() {
        // one fixed-length slot with zero elements: no record marker to find
        let data = [0, 0, 6, 0, 1, 0x02, 0x00, 0x00, 0xF0, 0x00, 0x00];
        let err = decode(&data).unwrap_err();
        assert!(matches!(err, ProtocolError::SdlGuess { context, .. } if context == ERR_SDL_ARRAY_SHAPE));
    }

    #[test]
    fn test_six_element_variable_arrays() {
        // 06 00 00 00 06 also reads as a fixed indexed array of six
        for elements_indexed in [false, true] {
            let elements = (0..6)
                .map(|index| NestedElement {
                    index,
                    record: SdlRecord::default(),
                })
                .collect();
            let record = SdlRecord {
                nested_vars: vec![array(0, Some(6), elements_indexed, elements)],
                ..SdlRecord::default()
            };
            let data = encode(&record);
            assert_eq!(&data[9..14], &[6, 0, 0, 0, 6]);
            assert_eq!(decode(&data).unwrap(), record);
        }
    }

    #[test]
    fn test_last_variable_before_next_slot() {
        // the leaf's last data byte is nonzero, so it also reads as a nested count
        let leaf = SdlRecord {
            flags: 0,
            indexed: true,
            simple_vars: vec![SimpleVar {
                index: 0x7B,
                hint: String::new(),
                save_flags: 0,
                timestamp: None,
                data: b"H3Zq*".to_vec(),
            }],
            nested_vars: Vec::new(),
        };
        let record = SdlRecord {
            nested_vars: vec![
                array(0, None, true, vec![NestedElement { index: 0x41, record: leaf }]),
                array(1, None, false, vec![NestedElement { index: 0, record: SdlRecord::default() }]),
            ],
            ..SdlRecord::default()
        };
        assert_eq!(decode(&encode(&record)).unwrap(), record);
    }

    #[test]
    fn test_depth_limit() {
        // each level: record with one slot holding one implicit fixed element
        let mut data = Vec::new();
        for _ in 0..=MAX_DEPTH + 1 {
            data.extend_from_slice(&[0, 0, 6, 0, 1, 0x02, 0x00, 0x00, 0xF0, 0x00, 0x01]);
        }
        data.extend_from_slice(&[0, 0, 6, 0, 0]);
        let err = decode(&data).unwrap_err();
        assert!(matches!(err, ProtocolError::SdlGuess { context, .. } if context == ERR_SDL_NESTING_DEPTH));
    }
}
