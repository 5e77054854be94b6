//! Bounded waits.
//!
//! The steady-state message loop never times out; the only bounded reads are the
//! diagnostic read after an unknown message type and the shutdown drain.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;

/// How long to wait for trailing bytes after an unknown message type.
pub const DIAGNOSTIC_READ_TIMEOUT: Duration = Duration::from_millis(250);

/// How long the listener waits for live connections to unwind on shutdown.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Await `future`, failing with [`ProtocolError::Timeout`] once `duration` elapses.
pub async fn with_timeout<F, T>(duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| ProtocolError::Timeout)
}

/// Like [`with_timeout`] for futures that already return a [`Result`].
pub async fn with_timeout_result<F, T>(duration: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    with_timeout(duration, future).await?
}
