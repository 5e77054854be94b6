//! Encryption setup.
//!
//! The client sends `u8 type | u8 total_len | payload`. Real key exchange is not
//! supported: a non-empty payload gets a dummy seed of the shape the client
//! expects, an empty one gets the bare acknowledgement. Either way the stream
//! stays in clear text.

use crate::error::{ProtocolError, Result};

/// Client-to-server setup message type.
pub const CLI_TO_SRV_CONNECT: u8 = 0;

/// Server-to-client setup message type.
pub const SRV_TO_CLI_ENCRYPT: u8 = 1;

/// Type byte plus length byte.
pub const SETUP_HEADER_LEN: usize = 2;

/// Reply to a request that carried key material.
pub const SEED_REPLY: [u8; 9] = [SRV_TO_CLI_ENCRYPT, 9, 0, 0, 0, 0, 0, 0, 0];

/// Reply to a request without key material.
pub const EMPTY_REPLY: [u8; 2] = [SRV_TO_CLI_ENCRYPT, 2];

/// Validate the setup header and return the payload length.
pub fn check_header(header: [u8; SETUP_HEADER_LEN]) -> Result<usize> {
    let [msg_type, total_len] = header;
    if msg_type != CLI_TO_SRV_CONNECT {
        return Err(ProtocolError::InvalidField {
            field: "encryption setup type",
            reason: format!("expected {CLI_TO_SRV_CONNECT}, got {msg_type}"),
        });
    }
    let total_len = total_len as usize;
    if total_len < SETUP_HEADER_LEN {
        return Err(ProtocolError::BadLength {
            field: "encryption setup",
            expected: SETUP_HEADER_LEN,
            actual: total_len,
        });
    }
    Ok(total_len - SETUP_HEADER_LEN)
}

/// The reply for a payload of `payload_len` bytes.
pub fn reply_for(payload_len: usize) -> &'static [u8] {
    if payload_len > 0 {
        &SEED_REPLY
    } else {
        &EMPTY_REPLY
    }
}
