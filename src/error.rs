//! # Error Types
//!
//! Error handling for the whole server core.
//!
//! ## Error Categories
//! - **Malformed input**: bad length fields, unsupported flag bits, unknown class
//!   indices or event tags, unsupported SDL IO versions and failed structure guesses.
//!   Always fatal to the single connection or decode call that hit them.
//! - **Premature end of data**: a cursor ran out of bytes (`UnexpectedEndOfData`)
//!   or the peer went away (`ConnectionClosed`).
//! - **Registration**: duplicate class indices found while building a registry.
//! - **Operator errors**: kick targets or log levels that do not exist.
//!
//! Semantic mismatches that are harmless (a non-zero token where zero is expected)
//! are logged with `tracing::warn!` and never become errors.
//!
//! ## Example Usage
//! ```rust
//! use moula_server::core::stream::StreamRead;
//! use moula_server::error::{ProtocolError, Result};
//!
//! fn read_build(mut data: &[u8]) -> Result<u32> {
//!     data.read_u32()
//! }
//!
//! assert!(matches!(
//!     read_build(&[1, 2]),
//!     Err(ProtocolError::UnexpectedEndOfData { needed: 4, available: 2 })
//! ));
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_KICKED: &str = "Connection kicked by operator";

    /// SDL guessing contexts
    pub const ERR_SDL_FIRST_VARIABLE: &str = "no start-of-variable marker for the first simple variable";
    pub const ERR_SDL_FIRST_SLOT: &str = "no start-of-variable marker for the first nested variable";
    pub const ERR_SDL_VARIABLE_END: &str = "no marker ends the simple variable within the lookahead window";
    pub const ERR_SDL_LAST_VARIABLE_END: &str = "cannot place the end of the last simple variable";
    pub const ERR_SDL_ARRAY_SHAPE: &str = "cannot infer the nested array shape";
    pub const ERR_SDL_AMBIGUOUS_SHAPE: &str = "more than one nested array shape fits";
    pub const ERR_SDL_BACKTRACK_LIMIT: &str = "too many ambiguous boundaries in one blob";
    pub const ERR_SDL_VARIABLE_PREFIX: &str = "variable does not start with notification info";
    pub const ERR_SDL_TRAILING_DATA: &str = "trailing bytes after the record";
    pub const ERR_SDL_NESTING_DEPTH: &str = "nested records exceed the depth limit";

    /// Registry errors
    pub const ERR_REGISTRY_LOCK: &str = "Failed to acquire connection registry lock";
}

/// Primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Unexpected end of data: needed {needed} bytes, {available} available")]
    UnexpectedEndOfData { needed: usize, available: usize },

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Bad {field} length: expected {expected}, got {actual}")]
    BadLength {
        field: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("String too long: {length} units exceeds maximum {max}")]
    StringTooLong { length: usize, max: usize },

    #[error("Unsupported connection type: {0}")]
    UnsupportedConnectionType(u8),

    #[error("Unknown message type {message_type} on {role} connection")]
    UnknownMessageType { role: &'static str, message_type: u16 },

    #[error("Unknown class index: {0:#06x}")]
    UnknownClassIndex(u16),

    #[error("Duplicate class index registration: {0:#06x}")]
    DuplicateClassIndex(u16),

    #[error("Duplicate handler registration for message type {0}")]
    DuplicateHandler(u16),

    #[error("Unknown notify event type: {0}")]
    UnknownEventType(i32),

    #[error("Unsupported message variant: {0}")]
    UnsupportedVariant(&'static str),

    #[error("Unsupported SDL IO version: expected {expected}, got {actual}")]
    UnsupportedIoVersion { expected: u8, actual: u8 },

    #[error("Unsupported SDL stream flags: {0:#06x}")]
    UnsupportedStreamFlags(u16),

    #[error("Cannot guess SDL structure at offset {offset}: {context}")]
    SdlGuess { context: &'static str, offset: usize },

    #[error("Invalid SDL record: {0}")]
    InvalidRecord(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Connection kicked by operator")]
    Kicked,

    #[error("Server shutting down")]
    ShuttingDown,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether this error means the data simply ran out, as opposed to being malformed.
    pub fn is_premature_eof(&self) -> bool {
        match self {
            ProtocolError::UnexpectedEndOfData { .. } | ProtocolError::ConnectionClosed => true,
            ProtocolError::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            _ => false,
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_premature_eof_classification() {
        assert!(ProtocolError::ConnectionClosed.is_premature_eof());
        assert!(ProtocolError::UnexpectedEndOfData {
            needed: 4,
            available: 0
        }
        .is_premature_eof());
        assert!(ProtocolError::Io(io::Error::from(io::ErrorKind::UnexpectedEof)).is_premature_eof());
        assert!(!ProtocolError::UnknownClassIndex(0x1234).is_premature_eof());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = ProtocolError::BadLength {
            field: "connect header",
            expected: 31,
            actual: 30,
        };
        assert_eq!(err.to_string(), "Bad connect header length: expected 31, got 30");
        assert_eq!(
            ProtocolError::UnknownClassIndex(0x02ED).to_string(),
            "Unknown class index: 0x02ed"
        );
    }
}
