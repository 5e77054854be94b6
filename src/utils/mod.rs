//! # Utility Modules
//!
//! Ambient support shared by the server: logging setup, counters and bounded waits.
//!
//! ## Components
//! - **Logging**: subscriber installation and the runtime-adjustable level
//! - **Metrics**: process-wide atomic counters
//! - **Timeout**: async timeout wrappers

pub mod logging;
pub mod metrics;
pub mod timeout;

pub use logging::{init_logging, LogHandle};
pub use metrics::{global_metrics, init_metrics, Metrics, MetricsSnapshot, Timer};
