//! # Logging
//!
//! Installs the global `tracing` subscriber from [`LoggingConfig`].
//!
//! Console output is plain or JSON; an optional file sink writes the same events
//! without ANSI colours. The level filter sits behind a reload layer so the
//! operator can change it at runtime through [`LogHandle::set_level`].

use std::fs::OpenOptions;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};

use tracing::{info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;
use crate::error::{ProtocolError, Result};

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Shared view of the active log level.
///
/// A detached handle tracks the level without a subscriber behind it, which is
/// what tests and embedders that install their own subscriber use.
#[derive(Clone, Debug)]
pub struct LogHandle {
    filter: Option<FilterHandle>,
    level: Arc<RwLock<Level>>,
}

impl LogHandle {
    pub fn detached(level: Level) -> Self {
        Self {
            filter: None,
            level: Arc::new(RwLock::new(level)),
        }
    }

    pub fn level(&self) -> Level {
        self.level.read().map(|level| *level).unwrap_or(Level::INFO)
    }

    /// Parse `name` as a level and apply it. Unknown names leave the level unchanged.
    pub fn set_level(&self, name: &str) -> Result<Level> {
        let level = Level::from_str(name.trim()).map_err(|_| ProtocolError::NotFound(format!("log level '{name}'")))?;

        if let Some(filter) = &self.filter {
            filter
                .reload(filter_for(level))
                .map_err(|e| ProtocolError::Custom(format!("Failed to reload log filter: {e}")))?;
        }

        let mut current = self
            .level
            .write()
            .map_err(|_| ProtocolError::Custom("Failed to acquire log level lock".into()))?;
        *current = level;
        Ok(level)
    }
}

fn filter_for(level: Level) -> EnvFilter {
    EnvFilter::default().add_directive(LevelFilter::from_level(level).into())
}

/// Install the global subscriber described by `config`.
///
/// Fails with `ConfigError` when the log file cannot be opened or a global
/// subscriber is already set.
pub fn init_logging(config: &LoggingConfig) -> Result<LogHandle> {
    let (filter, handle) = reload::Layer::new(filter_for(config.log_level));

    type Boxed = Box<dyn Layer<tracing_subscriber::layer::Layered<reload::Layer<EnvFilter, Registry>, Registry>> + Send + Sync>;
    let mut layers: Vec<Boxed> = Vec::new();

    if config.log_to_console {
        let layer = fmt::layer().with_target(true);
        if config.json_format {
            layers.push(layer.json().boxed());
        } else {
            layers.push(layer.compact().boxed());
        }
    }

    if config.log_to_file {
        let path = config
            .log_file_path
            .as_deref()
            .ok_or_else(|| ProtocolError::ConfigError("log_file_path must be set when log_to_file is true".into()))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open log file {path}: {e}")))?;
        let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
        if config.json_format {
            layers.push(layer.json().boxed());
        } else {
            layers.push(layer.boxed());
        }
    }

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .map_err(|e| ProtocolError::ConfigError(format!("Failed to install log subscriber: {e}")))?;

    info!(
        app = %config.app_name,
        level = %config.log_level,
        json = config.json_format,
        file = config.log_file_path.as_deref().unwrap_or("-"),
        "Logging initialized"
    );

    Ok(LogHandle {
        filter: Some(handle),
        level: Arc::new(RwLock::new(config.log_level)),
    })
}
