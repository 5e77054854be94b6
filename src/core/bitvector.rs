//! Count-prefixed flag sets whose width is declared by the data.

use bytes::{Buf, BufMut};

use super::stream::{StreamRead, StreamWrite};
use crate::error::{ProtocolError, Result};

/// Upper bound on declared words; 1024 words is 32768 flags, far beyond any enum.
const MAX_WORDS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BitVector {
    words: Vec<u32>,
}

impl BitVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_words(words: Vec<u32>) -> Self {
        Self { words }
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    pub fn is_set(&self, bit: usize) -> bool {
        self.words
            .get(bit / 32)
            .is_some_and(|word| word & (1 << (bit % 32)) != 0)
    }

    /// Set a flag, growing the vector as needed.
    pub fn set(&mut self, bit: usize) {
        let word = bit / 32;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (bit % 32);
    }

    /// Clear a flag. Never shrinks, so the declared width survives re-encoding.
    pub fn clear(&mut self, bit: usize) {
        if let Some(word) = self.words.get_mut(bit / 32) {
            *word &= !(1 << (bit % 32));
        }
    }

    /// Indices of all set flags in ascending order.
    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, word)| {
            (0..32).filter(move |b| word & (1 << b) != 0).map(move |b| i * 32 + b)
        })
    }

    pub fn read<B: Buf + ?Sized>(buf: &mut B) -> Result<Self> {
        let count = buf.read_u32()? as usize;
        if count > MAX_WORDS {
            return Err(ProtocolError::BadLength {
                field: "bit vector",
                expected: MAX_WORDS,
                actual: count,
            });
        }
        buf.ensure(count * 4)?;
        let words = (0..count).map(|_| buf.get_u32_le()).collect();
        Ok(Self { words })
    }

    pub fn write<B: BufMut + ?Sized>(&self, buf: &mut B) {
        buf.write_u32(self.words.len() as u32);
        for word in &self.words {
            buf.write_u32(*word);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_set_and_query() {
        let mut bits = BitVector::new();
        bits.set(1);
        bits.set(33);
        assert_eq!(bits.words(), &[0x2, 0x2]);
        assert!(bits.is_set(33));
        assert!(!bits.is_set(2));
        assert!(!bits.is_set(500));
        assert_eq!(bits.iter_set().collect::<Vec<_>>(), vec![1, 33]);

        bits.clear(33);
        assert_eq!(bits.words(), &[0x2, 0x0]);
    }

    #[test]
    fn test_width_comes_from_data() {
        let mut data: &[u8] = &[2, 0, 0, 0, 0x01, 0, 0, 0, 0, 0, 0, 0x80];
        let bits = BitVector::read(&mut data).unwrap();
        assert_eq!(bits.iter_set().collect::<Vec<_>>(), vec![0, 63]);

        let mut out = BytesMut::new();
        bits.write(&mut out);
        assert_eq!(&out[..], &[2, 0, 0, 0, 0x01, 0, 0, 0, 0, 0, 0, 0x80]);
    }

    #[test]
    fn test_declared_words_must_be_present() {
        let mut data: &[u8] = &[3, 0, 0, 0, 1, 0, 0, 0];
        assert!(matches!(
            BitVector::read(&mut data),
            Err(ProtocolError::UnexpectedEndOfData { needed: 12, available: 4 })
        ));
    }
}
