//! Hardware watchdog abstraction.
//!
//! Once armed, a hardware watchdog resets the device unless it is fed at
//! regular intervals.  The door-lock core feeds it only while every
//! supervised background task is healthy, so a wedged task turns into a
//! full device reset instead of a silent hang.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use doorlock_types::DoorError;
use tracing::info;

/// Default device node of the Linux watchdog driver.
pub const DEFAULT_WATCHDOG_PATH: &str = "/dev/watchdog";

/// A hardware watchdog timer.
pub trait HardwareWatchdog: Send {
    /// Reset the watchdog countdown.
    ///
    /// # Errors
    ///
    /// Returns [`DoorError::HardwareFault`] when the keep-alive cannot be
    /// delivered to the device.
    fn feed(&mut self) -> Result<(), DoorError>;
}

/// Linux `/dev/watchdog` driver.
///
/// Opening the device node arms the timer.  The driver never writes the
/// magic close character, so if the daemon exits the board resets once the
/// timeout elapses.
pub struct DevWatchdog {
    path: PathBuf,
    file: File,
}

impl DevWatchdog {
    /// Open (and thereby arm) the watchdog device at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DoorError::HardwareFault`] if the node cannot be opened for
    /// writing.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DoorError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|e| DoorError::HardwareFault {
                component: path.display().to_string(),
                details: format!("cannot open watchdog: {e}"),
            })?;
        info!(path = %path.display(), "hardware watchdog armed");
        Ok(Self { path, file })
    }
}

impl HardwareWatchdog for DevWatchdog {
    fn feed(&mut self) -> Result<(), DoorError> {
        self.file
            .write_all(b"\0")
            .and_then(|()| self.file.flush())
            .map_err(|e| DoorError::HardwareFault {
                component: self.path.display().to_string(),
                details: format!("watchdog keep-alive failed: {e}"),
            })
    }
}
