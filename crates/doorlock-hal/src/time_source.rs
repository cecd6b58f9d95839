//! External time sources used to seed and refresh trusted time.

use async_trait::async_trait;
use chrono::Utc;
use doorlock_types::{DoorError, Timestamp};

/// Anything that can report the current wall-clock time from outside the
/// device (NTP server, GPS receiver, a disciplined host clock, ...).
///
/// # Contract
///
/// * Transport problems are reported as [`DoorError::Transport`]; the caller
///   retries after a backoff and keeps its current state.
/// * [`DoorError::ResourceExhausted`] is fatal and must be propagated.
#[async_trait]
pub trait TimeSource: Send + Sync {
    /// Fetch the current time in seconds since the Unix epoch.
    async fn fetch_external_time(&self) -> Result<Timestamp, DoorError>;
}

/// Trusts the host operating system clock.
///
/// Suitable on Linux hosts whose clock is already disciplined by
/// `chronyd`/`systemd-timesyncd`.  A clock reading before the epoch is
/// reported as a transport error so the device stays unsynchronized.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostClockSource;

#[async_trait]
impl TimeSource for HostClockSource {
    async fn fetch_external_time(&self) -> Result<Timestamp, DoorError> {
        let secs = Utc::now().timestamp();
        Timestamp::try_from(secs)
            .map_err(|_| DoorError::Transport(format!("host clock before epoch: {secs}")))
    }
}
