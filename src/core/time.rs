//! Unified time: the two-word wire timestamp.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut};

use super::stream::{StreamRead, StreamWrite};
use crate::error::Result;

/// Seconds and microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct UnifiedTime {
    pub secs: u32,
    pub micros: u32,
}

impl UnifiedTime {
    /// Wire size in bytes.
    pub const SIZE: usize = 8;

    pub fn new(secs: u32, micros: u32) -> Self {
        Self { secs, micros }
    }

    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Convert from a calendar timestamp. Times before the epoch clamp to zero,
    /// times past the 32-bit range clamp to its end.
    pub fn from_system_time(time: SystemTime) -> Self {
        let since = time.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO);
        Self {
            secs: u32::try_from(since.as_secs()).unwrap_or(u32::MAX),
            micros: since.subsec_micros(),
        }
    }

    pub fn to_system_time(self) -> SystemTime {
        UNIX_EPOCH + self.as_duration()
    }

    /// Offset from the epoch. Out-of-range microsecond fields carry into seconds.
    pub fn as_duration(self) -> Duration {
        Duration::from_secs(u64::from(self.secs)) + Duration::from_micros(u64::from(self.micros))
    }

    pub fn read<B: Buf + ?Sized>(buf: &mut B) -> Result<Self> {
        Ok(Self {
            secs: buf.read_u32()?,
            micros: buf.read_u32()?,
        })
    }

    pub fn write<B: BufMut + ?Sized>(&self, buf: &mut B) {
        buf.write_u32(self.secs);
        buf.write_u32(self.micros);
    }
}

impl From<SystemTime> for UnifiedTime {
    fn from(time: SystemTime) -> Self {
        Self::from_system_time(time)
    }
}

impl From<UnifiedTime> for SystemTime {
    fn from(time: UnifiedTime) -> Self {
        time.to_system_time()
    }
}
