//! # Connection Protocol
//!
//! Everything between an accepted socket and a role's message handlers.
//!
//! ## Wire Format
//! ```text
//! connect header   u8 role | u16 len (31) | u32 build_id | u32 build_type | u32 branch_id | uuid product
//! connect data     u32 len | role payload
//! setup            u8 type | u8 total_len | payload
//! message          u16 type | handler-defined body
//! ```
//! All integers are little-endian. Messages carry no length field, so each
//! handler reads exactly its own body.
//!
//! ## Roles
//! - **auth** (10): client registration, login, avatar selection
//! - **game** (11): age join, message propagation
//! - **gatekeeper** (22): server address lookup

pub mod auth;
pub mod connect;
pub mod connection;
pub mod dispatcher;
pub mod game;
pub mod gatekeeper;
pub mod setup;


pub use connect::{BuildType, ConnectHeader, ConnectionRole, RoleConnectData};
pub use connection::{AsyncStream, Connection, ConnectionState, EncryptionState, SessionData};
pub use dispatcher::{Dispatcher, Handler, HandlerFn};
