//! # moula-server
//!
//! Server core for the MOULa-family legacy game protocol.
//!
//! ## Layers
//! - [`crypto`]: bit-exact SHA-0/SHA-1, password digests, challenge hash, RC4
//! - [`core`]: little-endian cursor traits and the shared value types
//! - [`sdl`]: schema-less SDL blob decoding and exact re-encoding
//! - [`message`]: network message and notify event codecs
//! - [`protocol`]: the per-connection state machine and role handlers
//! - [`server`]: listener, connection registry and operator interface
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use moula_server::config::MoulaConfig;
//! use moula_server::server::{run_server, ServerState};
//!
//! # async fn start() -> moula_server::error::Result<()> {
//! let config = MoulaConfig::from_file("moula.toml")?;
//! config.validate_strict()?;
//! let state = Arc::new(ServerState::new(config)?);
//! run_server(state).await?;
//! # Ok(())
//! # }
//! ```

pub mod accounts;
pub mod config;
pub mod core;
pub mod crypto;
pub mod error;
pub mod message;
pub mod protocol;
pub mod sdl;
pub mod server;
pub mod utils;

pub use error::{ProtocolError, Result};
