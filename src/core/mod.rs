//! # Core Wire Components
//!
//! Low-level binary cursor handling shared by every higher layer.
//!
//! ## Components
//! - **Stream**: checked little-endian reads/writes, UTF-16 and safe strings, UUIDs
//! - **Uoid**: object references and the optional key codec
//! - **Time**: the two-word unified timestamp
//! - **BitVector**: count-prefixed flag sets
//!
//! ## Conventions
//! - All integers are little-endian
//! - Reads fail with `UnexpectedEndOfData` instead of returning short
//! - String lengths are validated before allocation

pub mod bitvector;
pub mod stream;
pub mod time;
pub mod uoid;

pub use bitvector::BitVector;
pub use stream::{StreamRead, StreamWrite};
pub use time::UnifiedTime;
pub use uoid::{CloneIds, Location, Uoid};
