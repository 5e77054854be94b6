//! # Configuration Management
//!
//! Centralized configuration for the shard server.
//!
//! ## Sections
//! - `[server]`: listen address, connection cap and the input bounds applied by handlers
//! - `[shard]`: build id, advertised file/auth addresses, status text and the account table
//! - `[sdl]`: lookahead windows of the SDL structure guesser
//! - `[logging]`: subscriber output and level
//!
//! ## Configuration Sources
//! - TOML files via [`MoulaConfig::from_file`]
//! - Environment variables prefixed `MOULA_` via [`MoulaConfig::from_env`]
//! - Direct instantiation with defaults
//!
//! Durations are written as milliseconds.

use crate::error::{ProtocolError, Result};
use crate::sdl::GuessLimits;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Default listen port of MOULa shards
pub const DEFAULT_PORT: u16 = 14617;

/// Build id of the last public client release
pub const DEFAULT_BUILD_ID: u32 = 918;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct MoulaConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub shard: ShardConfig,

    #[serde(default)]
    pub sdl: SdlConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl MoulaConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Defaults overridden by `MOULA_*` environment variables.
    ///
    /// Unparseable numbers are ignored, matching how missing variables behave.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.trim().parse().ok())
        }

        if let Some(addr) = lookup("MOULA_SERVER_ADDRESS") {
            self.server.address = addr;
        }
        if let Some(val) = parsed(lookup("MOULA_MAX_CONNECTIONS")) {
            self.server.max_connections = val;
        }
        if let Some(val) = parsed::<u64>(lookup("MOULA_DIAGNOSTIC_READ_TIMEOUT_MS")) {
            self.server.diagnostic_read_timeout = Duration::from_millis(val);
        }
        if let Some(val) = parsed(lookup("MOULA_BUILD_ID")) {
            self.shard.expected_build_id = val;
        }
        if let Some(addr) = lookup("MOULA_FILE_SERVER_ADDRESS") {
            self.shard.file_server_address = addr;
        }
        if let Some(addr) = lookup("MOULA_AUTH_SERVER_ADDRESS") {
            self.shard.auth_server_address = addr;
        }
        if let Some(status) = lookup("MOULA_STATUS_MESSAGE") {
            self.shard.status_message = status;
        }
        if let Some(level) = parsed(lookup("MOULA_LOG_LEVEL")) {
            self.logging.log_level = level;
        }
        if let Some(val) = parsed(lookup("MOULA_LOG_JSON")) {
            self.logging.json_format = val;
        }
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        let mut example = Self::default();
        example.shard.accounts.push(AccountConfig {
            name: String::from("explorer@example.com"),
            password: String::from("changeme"),
            id: None,
            flags: 0,
            billing: 1,
            players: vec![PlayerConfig {
                ki_number: 1000,
                name: String::from("Explorer"),
                avatar_shape: String::from("female"),
                explorer: 1,
            }],
        });
        toml::to_string_pretty(&example).unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.shard.validate());
        errors.extend(self.sdl.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Listener and per-connection bounds
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g., "0.0.0.0:14617")
    pub address: String,

    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// Bytes read for the log after an unknown message type
    pub diagnostic_read_bytes: usize,

    /// How long the diagnostic read waits for those bytes
    #[serde(with = "duration_serde")]
    pub diagnostic_read_timeout: Duration,

    /// Largest ping payload echoed back
    pub max_ping_payload: usize,

    /// Largest propagate buffer accepted on game connections
    pub max_propagate_buffer: usize,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: format!("0.0.0.0:{DEFAULT_PORT}"),
            max_connections: 1000,
            diagnostic_read_bytes: 64,
            diagnostic_read_timeout: timeout::DIAGNOSTIC_READ_TIMEOUT,
            max_ping_payload: 64 * 1024,
            max_propagate_buffer: 1024 * 1024,
            shutdown_timeout: timeout::SHUTDOWN_TIMEOUT,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:14617')",
                self.address
            ));
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        if self.diagnostic_read_bytes > 64 * 1024 {
            errors.push(format!(
                "Diagnostic read too large: {} bytes (maximum: 65536)",
                self.diagnostic_read_bytes
            ));
        }

        if self.diagnostic_read_timeout.as_secs() > 10 {
            errors.push("Diagnostic read timeout too long (maximum: 10s)".to_string());
        }

        if self.max_ping_payload > 16 * 1024 * 1024 {
            errors.push(format!(
                "Max ping payload too large: {} bytes (maximum: 16 MB)",
                self.max_ping_payload
            ));
        }

        if self.max_propagate_buffer == 0 {
            errors.push("Max propagate buffer must be greater than 0".to_string());
        } else if self.max_propagate_buffer > 64 * 1024 * 1024 {
            errors.push(format!(
                "Max propagate buffer too large: {} bytes (maximum: 64 MB)",
                self.max_propagate_buffer
            ));
        }

        if self.shutdown_timeout.as_millis() < 100 {
            errors.push("Shutdown timeout too short (minimum: 100ms)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Shard identity and the account table
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShardConfig {
    /// Build id clients are expected to report; others are logged, not refused
    pub expected_build_id: u32,

    /// Address handed out by the gatekeeper for file server lookups
    pub file_server_address: String,

    /// Address handed out by the gatekeeper for auth server lookups
    pub auth_server_address: String,

    /// Status text served to launchers
    pub status_message: String,

    pub accounts: Vec<AccountConfig>,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            expected_build_id: DEFAULT_BUILD_ID,
            file_server_address: String::from("127.0.0.1"),
            auth_server_address: String::from("127.0.0.1"),
            status_message: String::from("Welcome to the shard"),
            accounts: Vec::new(),
        }
    }
}

impl ShardConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (field, value) in [
            ("file_server_address", &self.file_server_address),
            ("auth_server_address", &self.auth_server_address),
        ] {
            if value.is_empty() {
                errors.push(format!("{field} cannot be empty"));
            } else if value.encode_utf16().count() > crate::protocol::gatekeeper::ADDRESS_MAX_UNITS {
                errors.push(format!(
                    "{field} longer than {} characters will be truncated",
                    crate::protocol::gatekeeper::ADDRESS_MAX_UNITS
                ));
            }
        }

        let mut seen = std::collections::HashSet::new();
        for account in &self.accounts {
            if account.name.is_empty() {
                errors.push("Account name cannot be empty".to_string());
            } else if !seen.insert(account.name.to_ascii_lowercase()) {
                errors.push(format!("Duplicate account name: '{}'", account.name));
            }
            if let Some(id) = &account.id {
                if uuid::Uuid::parse_str(id).is_err() {
                    errors.push(format!("Invalid account id for '{}': '{id}'", account.name));
                }
            }
            for player in &account.players {
                if player.name.is_empty() || player.name.encode_utf16().count() > crate::protocol::auth::PLAYER_NAME_MAX {
                    errors.push(format!(
                        "Player name for KI {} must be 1-{} characters",
                        player.ki_number,
                        crate::protocol::auth::PLAYER_NAME_MAX
                    ));
                }
            }
        }

        errors
    }
}

/// One account of the in-memory store
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
    /// Login name; names containing '@' use the legacy password digest
    pub name: String,

    pub password: String,

    /// Fixed account UUID; a random one is assigned at startup when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub flags: u32,

    #[serde(default)]
    pub billing: u32,

    #[serde(default)]
    pub players: Vec<PlayerConfig>,
}

/// One avatar owned by an account
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlayerConfig {
    pub ki_number: u32,
    pub name: String,
    #[serde(default)]
    pub avatar_shape: String,
    #[serde(default)]
    pub explorer: u32,
}

/// Lookahead windows of the SDL structure guesser
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct SdlConfig {
    pub data_window: usize,
    pub shape_window: usize,
    pub variable_window: usize,
    pub slot_window: usize,
}

impl Default for SdlConfig {
    fn default() -> Self {
        Self::from(GuessLimits::default())
    }
}

impl From<GuessLimits> for SdlConfig {
    fn from(limits: GuessLimits) -> Self {
        Self {
            data_window: limits.data_window,
            shape_window: limits.shape_window,
            variable_window: limits.variable_window,
            slot_window: limits.slot_window,
        }
    }
}

impl SdlConfig {
    pub fn limits(&self) -> GuessLimits {
        GuessLimits {
            data_window: self.data_window,
            shape_window: self.shape_window,
            variable_window: self.variable_window,
            slot_window: self.slot_window,
        }
    }

    /// Windows smaller than the patterns they search for can never match.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (field, value, minimum) in [
            ("data_window", self.data_window, 4),
            ("shape_window", self.shape_window, 9),
            ("variable_window", self.variable_window, 5),
            ("slot_window", self.slot_window, 6),
        ] {
            if value < minimum {
                errors.push(format!("SDL {field} too small: {value} (minimum: {minimum})"));
            }
        }

        if self.data_window > 64 * 1024 {
            errors.push(format!("SDL data_window too large: {} (maximum: 65536)", self.data_window));
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to log to console
    pub log_to_console: bool,

    /// Whether to log to file
    pub log_to_file: bool,

    /// Path to log file (if log_to_file is true)
    pub log_file_path: Option<String>,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("moula-server"),
            log_level: Level::INFO,
            log_to_console: true,
            log_to_file: false,
            log_file_path: None,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        if self.log_to_file {
            if let Some(ref path) = self.log_file_path {
                if let Some(parent) = Path::new(path).parent() {
                    if !parent.as_os_str().is_empty() && !parent.exists() {
                        errors.push(format!("Log file directory does not exist: {}", parent.display()));
                    }
                }
            } else {
                errors.push("log_file_path must be specified when log_to_file is true".to_string());
            }
        }

        if !self.log_to_console && !self.log_to_file {
            errors.push("At least one logging output (console or file) must be enabled".to_string());
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
