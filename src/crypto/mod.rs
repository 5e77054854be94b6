//! # Legacy Cryptography
//!
//! Bit-exact implementations of the digests and cipher the game clients use.
//! None of these operations fail.
//!
//! ## Components
//! - [`sha`]: SHA-0 and SHA-1 sharing one scaffold
//! - [`password`]: byte swap, legacy and modern password digests, challenge hash
//! - [`rc4`]: stream cipher
//!
//! These are wire-compatibility primitives, not a security layer. SHA-0 is broken.

pub mod password;
pub mod rc4;
pub mod sha;

pub use password::{byte_swap, challenge_hash, password_hash_legacy, password_hash_modern, TextEncoding};
pub use rc4::Rc4;
pub use sha::{sha0, sha1, LegacySha, ShaVariant, DIGEST_LEN};
