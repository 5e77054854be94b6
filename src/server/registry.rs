//! Live-connection registry.
//!
//! Entries are added by the owning connection task once its handshake completes
//! and removed by that same task when it closes. Operator kicks never touch the
//! entry: they cancel its token, and the owner unwinds on its own.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::error::constants::ERR_REGISTRY_LOCK;
use crate::error::{ProtocolError, Result};
use crate::protocol::connect::ConnectionRole;

pub type ConnectionToken = u64;

/// What the operator sees of a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub token: ConnectionToken,
    pub peer: SocketAddr,
    /// `None` when the connection closed before its connect header was read.
    pub role: Option<ConnectionRole>,
    pub build_id: Option<u32>,
    pub account_name: Option<String>,
    pub account_id: Option<Uuid>,
    pub ki_number: Option<u32>,
    pub age_instance_id: Option<Uuid>,
}

#[derive(Debug)]
struct Entry {
    summary: ConnectionSummary,
    cancel: CancellationToken,
}

#[derive(Debug)]
pub struct ConnectionRegistry {
    next_token: AtomicU64,
    entries: RwLock<HashMap<ConnectionToken, Entry>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn lock_error<T>(_: T) -> ProtocolError {
    ProtocolError::Custom(ERR_REGISTRY_LOCK.to_string())
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            next_token: AtomicU64::new(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a token for a newly accepted connection.
    pub fn next_token(&self) -> ConnectionToken {
        self.next_token.fetch_add(1, Ordering::Relaxed)
    }

    pub fn register(&self, summary: ConnectionSummary, cancel: CancellationToken) -> Result<()> {
        let mut entries = self.entries.write().map_err(lock_error)?;
        debug!(token = summary.token, peer = %summary.peer, "Connection registered");
        entries.insert(summary.token, Entry { summary, cancel });
        Ok(())
    }

    /// Replace the summary of a registered connection.
    pub fn update(&self, summary: ConnectionSummary) -> Result<()> {
        let mut entries = self.entries.write().map_err(lock_error)?;
        match entries.get_mut(&summary.token) {
            Some(entry) => {
                entry.summary = summary;
                Ok(())
            }
            None => Err(ProtocolError::NotFound(format!("connection {}", summary.token))),
        }
    }

    pub fn remove(&self, token: ConnectionToken) -> Result<Option<ConnectionSummary>> {
        let mut entries = self.entries.write().map_err(lock_error)?;
        Ok(entries.remove(&token).map(|entry| entry.summary))
    }

    pub fn get(&self, token: ConnectionToken) -> Result<Option<ConnectionSummary>> {
        let entries = self.entries.read().map_err(lock_error)?;
        Ok(entries.get(&token).map(|entry| entry.summary.clone()))
    }

    /// Summaries ordered by token.
    pub fn list(&self) -> Result<Vec<ConnectionSummary>> {
        let entries = self.entries.read().map_err(lock_error)?;
        let mut summaries: Vec<_> = entries.values().map(|entry| entry.summary.clone()).collect();
        summaries.sort_by_key(|summary| summary.token);
        Ok(summaries)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Signal one connection to close.
    pub fn kick(&self, token: ConnectionToken) -> Result<()> {
        let entries = self.entries.read().map_err(lock_error)?;
        let entry = entries
            .get(&token)
            .ok_or_else(|| ProtocolError::NotFound(format!("connection {token}")))?;
        entry.cancel.cancel();
        Ok(())
    }

    /// Signal every connection matching `predicate`; returns how many were signalled.
    pub fn kick_where<F>(&self, predicate: F) -> Result<usize>
    where
        F: Fn(&ConnectionSummary) -> bool,
    {
        let entries = self.entries.read().map_err(lock_error)?;
        let mut kicked = 0;
        for entry in entries.values().filter(|entry| predicate(&entry.summary)) {
            entry.cancel.cancel();
            kicked += 1;
        }
        Ok(kicked)
    }
}
