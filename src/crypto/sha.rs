//! SHA-0 and SHA-1 over one Merkle–Damgård scaffold.
//!
//! The two functions differ only in the message schedule: SHA-1 rotates each
//! expanded word 16..80 left by one bit, SHA-0 does not. The clients still use
//! SHA-0 for login, so it cannot be swapped for a library hash.

/// Digest length in bytes.
pub const DIGEST_LEN: usize = 20;

const BLOCK_LEN: usize = 64;

const INITIAL_STATE: [u32; 5] = [0x6745_2301, 0xEFCD_AB89, 0x98BA_DCFE, 0x1032_5476, 0xC3D2_E1F0];

/// Which member of the family to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaVariant {
    Sha0,
    Sha1,
}

/// Incremental hasher for either variant.
#[derive(Debug, Clone)]
pub struct LegacySha {
    variant: ShaVariant,
    state: [u32; 5],
    block: [u8; BLOCK_LEN],
    block_len: usize,
    total_len: u64,
}

impl LegacySha {
    pub fn new(variant: ShaVariant) -> Self {
        Self {
            variant,
            state: INITIAL_STATE,
            block: [0; BLOCK_LEN],
            block_len: 0,
            total_len: 0,
        }
    }

    pub fn sha0() -> Self {
        Self::new(ShaVariant::Sha0)
    }

    pub fn sha1() -> Self {
        Self::new(ShaVariant::Sha1)
    }

    pub fn variant(&self) -> ShaVariant {
        self.variant
    }

    pub fn update(&mut self, mut data: &[u8]) {
        self.total_len = self.total_len.wrapping_add(data.len() as u64);

        if self.block_len > 0 {
            let take = (BLOCK_LEN - self.block_len).min(data.len());
            self.block[self.block_len..self.block_len + take].copy_from_slice(&data[..take]);
            self.block_len += take;
            data = &data[take..];
            if self.block_len < BLOCK_LEN {
                return;
            }
            let block = self.block;
            self.compress(&block);
            self.block_len = 0;
        }

        let mut chunks = data.chunks_exact(BLOCK_LEN);
        for chunk in &mut chunks {
            let mut block = [0u8; BLOCK_LEN];
            block.copy_from_slice(chunk);
            self.compress(&block);
        }
        let rest = chunks.remainder();
        self.block[..rest.len()].copy_from_slice(rest);
        self.block_len = rest.len();
    }

    pub fn finalize(mut self) -> [u8; DIGEST_LEN] {
        let bit_len = self.total_len.wrapping_mul(8);

        let mut tail = [0u8; BLOCK_LEN * 2];
        tail[..self.block_len].copy_from_slice(&self.block[..self.block_len]);
        tail[self.block_len] = 0x80;
        let tail_len = if self.block_len + 1 + 8 <= BLOCK_LEN {
            BLOCK_LEN
        } else {
            BLOCK_LEN * 2
        };
        tail[tail_len - 8..tail_len].copy_from_slice(&bit_len.to_be_bytes());

        for chunk in tail[..tail_len].chunks_exact(BLOCK_LEN) {
            let mut block = [0u8; BLOCK_LEN];
            block.copy_from_slice(chunk);
            self.compress(&block);
        }

        let mut digest = [0u8; DIGEST_LEN];
        for (out, word) in digest.chunks_exact_mut(4).zip(self.state) {
            out.copy_from_slice(&word.to_be_bytes());
        }
        digest
    }

    fn compress(&mut self, block: &[u8; BLOCK_LEN]) {
        let mut w = [0u32; 80];
        for (i, word) in block.chunks_exact(4).enumerate() {
            w[i] = u32::from_be_bytes([word[0], word[1], word[2], word[3]]);
        }
        for i in 16..80 {
            let expanded = w[i - 3] ^ w[i - 8] ^ w[i - 14] ^ w[i - 16];
            w[i] = match self.variant {
                ShaVariant::Sha0 => expanded,
                ShaVariant::Sha1 => expanded.rotate_left(1),
            };
        }

        let [mut a, mut b, mut c, mut d, mut e] = self.state;
        for (i, word) in w.iter().enumerate() {
            let (f, k) = match i {
                0..=19 => ((b & c) | (!b & d), 0x5A82_7999),
                20..=39 => (b ^ c ^ d, 0x6ED9_EBA1),
                40..=59 => ((b & c) | (b & d) | (c & d), 0x8F1B_BCDC),
                _ => (b ^ c ^ d, 0xCA62_C1D6),
            };
            let temp = a
                .rotate_left(5)
                .wrapping_add(f)
                .wrapping_add(e)
                .wrapping_add(k)
                .wrapping_add(*word);
            e = d;
            d = c;
            c = b.rotate_left(30);
            b = a;
            a = temp;
        }

        for (s, v) in self.state.iter_mut().zip([a, b, c, d, e]) {
            *s = s.wrapping_add(v);
        }
    }
}

/// One-shot SHA-0.
pub fn sha0(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = LegacySha::sha0();
    hasher.update(data);
    hasher.finalize()
}

/// One-shot SHA-1.
pub fn sha1(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = LegacySha::sha1();
    hasher.update(data);
    hasher.finalize()
}
