//! Account lookup for the auth role.
//!
//! Persistent account storage is outside this crate. Handlers reach accounts
//! through [`AccountStore`]; [`MemoryAccountStore`] serves the accounts listed in
//! the `[shard]` configuration.

use std::collections::HashMap;

use tracing::warn;
use uuid::Uuid;

use crate::config::AccountConfig;
use crate::crypto::{challenge_hash, password_hash_legacy, password_hash_modern, TextEncoding, DIGEST_LEN};

/// Result codes carried in auth and game replies.
pub mod net_error {
    pub const SUCCESS: u32 = 0;
    pub const INTERNAL_ERROR: u32 = 1;
    pub const OLD_BUILD_ID: u32 = 8;
    pub const ACCOUNT_NOT_FOUND: u32 = 13;
    pub const PLAYER_NOT_FOUND: u32 = 14;
    pub const INVALID_PARAMETER: u32 = 15;
    pub const AUTHENTICATION_FAILED: u32 = 20;
}

/// An avatar listed to the client after login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerInfo {
    pub ki_number: u32,
    pub name: String,
    pub avatar_shape: String,
    pub explorer: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub id: Uuid,
    /// Stored digest; which scheme produced it follows from [`Account::uses_legacy_hash`].
    pub password_hash: [u8; DIGEST_LEN],
    pub flags: u32,
    pub billing_type: u32,
    pub players: Vec<PlayerInfo>,
}

impl Account {
    /// Build an account from a clear-text password.
    pub fn new(name: &str, password: &str, id: Uuid) -> Self {
        let password_hash = if uses_legacy_hash(name) {
            password_hash_legacy(name, password)
        } else {
            password_hash_modern(password, TextEncoding::Utf8)
        };
        Self {
            name: name.to_string(),
            id,
            password_hash,
            flags: 0,
            billing_type: 0,
            players: Vec::new(),
        }
    }

    pub fn uses_legacy_hash(&self) -> bool {
        uses_legacy_hash(&self.name)
    }

    /// Check the digest a client sent with its login.
    ///
    /// E-mail style accounts prove the stored digest through both challenges;
    /// others send the stored digest itself.
    pub fn verify_login(&self, client_challenge: u32, server_challenge: u32, sent: &[u8; DIGEST_LEN]) -> bool {
        if self.uses_legacy_hash() {
            challenge_hash(client_challenge, server_challenge, &self.password_hash) == *sent
        } else {
            self.password_hash == *sent
        }
    }

    pub fn player(&self, ki_number: u32) -> Option<&PlayerInfo> {
        self.players.iter().find(|p| p.ki_number == ki_number)
    }
}

fn uses_legacy_hash(name: &str) -> bool {
    name.contains('@')
}

/// Source of accounts for login.
pub trait AccountStore: Send + Sync {
    /// Look up an account by login name, ignoring ASCII case.
    fn find(&self, name: &str) -> Option<Account>;
}

/// Accounts held in memory, keyed by lower-cased name.
#[derive(Debug, Default, Clone)]
pub struct MemoryAccountStore {
    accounts: HashMap<String, Account>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any account with the same name.
    pub fn insert(&mut self, account: Account) {
        self.accounts.insert(account.name.to_ascii_lowercase(), account);
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Build the store from configuration. Accounts without a valid fixed id get a random one.
    pub fn from_config(accounts: &[AccountConfig]) -> Self {
        let mut store = Self::new();
        for entry in accounts {
            let id = match entry.id.as_deref().map(Uuid::parse_str) {
                Some(Ok(id)) => id,
                Some(Err(e)) => {
                    warn!(account = %entry.name, error = %e, "Invalid account id, assigning a random one");
                    Uuid::new_v4()
                }
                None => Uuid::new_v4(),
            };
            let mut account = Account::new(&entry.name, &entry.password, id);
            account.flags = entry.flags;
            account.billing_type = entry.billing;
            account.players = entry
                .players
                .iter()
                .map(|p| PlayerInfo {
                    ki_number: p.ki_number,
                    name: p.name.clone(),
                    avatar_shape: p.avatar_shape.clone(),
                    explorer: p.explorer,
                })
                .collect();
            store.insert(account);
        }
        store
    }
}

impl AccountStore for MemoryAccountStore {
    fn find(&self, name: &str) -> Option<Account> {
        self.accounts.get(&name.to_ascii_lowercase()).cloned()
    }
}
