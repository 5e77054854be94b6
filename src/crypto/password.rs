//! Password digests used by the auth role.
//!
//! Two schemes exist. Older accounts, named by e-mail address, store a SHA-0
//! digest of the UTF-16 password and account name; the client proves knowledge of
//! it by hashing it again with both login challenges. Newer accounts store a
//! byte-swapped SHA-1 of the password that the client sends as-is.
//!
//! The legacy scheme reproduces a client bug: the last code unit of each string is
//! replaced by a NUL before hashing, so "secret" and "secreX" collide. Fixing this
//! would lock out every existing account.

use super::sha::{sha0, sha1, LegacySha, DIGEST_LEN};

/// Character encodings the modern hash may be computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf16Le,
    /// Characters above U+00FF become `?`.
    Latin1,
}

impl TextEncoding {
    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            TextEncoding::Latin1 => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }
}

/// Reverse the byte order of each 32-bit word of a digest. Applying it twice
/// yields the input.
pub fn byte_swap(digest: [u8; DIGEST_LEN]) -> [u8; DIGEST_LEN] {
    let mut out = digest;
    for word in out.chunks_exact_mut(4) {
        word.reverse();
    }
    out
}

fn truncated_utf16le(text: &str) -> Vec<u8> {
    let mut units: Vec<u16> = text.encode_utf16().collect();
    if let Some(last) = units.last_mut() {
        *last = 0;
    }
    units.into_iter().flat_map(u16::to_le_bytes).collect()
}

/// SHA-0 of the truncated UTF-16LE password followed by the truncated,
/// ASCII-lowercased account name.
pub fn password_hash_legacy(account_name: &str, password: &str) -> [u8; DIGEST_LEN] {
    let mut hasher = LegacySha::sha0();
    hasher.update(&truncated_utf16le(password));
    hasher.update(&truncated_utf16le(&account_name.to_ascii_lowercase()));
    hasher.finalize()
}

/// Byte-swapped SHA-1 of the encoded password.
pub fn password_hash_modern(password: &str, encoding: TextEncoding) -> [u8; DIGEST_LEN] {
    byte_swap(sha1(&encoding.encode(password)))
}

/// SHA-0 over both login challenges and a stored digest.
pub fn challenge_hash(client_challenge: u32, server_challenge: u32, digest: &[u8; DIGEST_LEN]) -> [u8; DIGEST_LEN] {
    let mut input = [0u8; 8 + DIGEST_LEN];
    input[..4].copy_from_slice(&client_challenge.to_le_bytes());
    input[4..8].copy_from_slice(&server_challenge.to_le_bytes());
    input[8..].copy_from_slice(digest);
    sha0(&input)
}
