//! Generic `Relay` trait for the discrete on/off unlock output (door strike,
//! magnetic lock driver, ...).

use std::fs;
use std::path::{Path, PathBuf};

use doorlock_types::DoorError;

/// A discrete on/off hardware output.
///
/// `true` energises the output (door unlocked), `false` releases it (door
/// locked).  The locked state must be the one the hardware falls back to on
/// power loss.
pub trait Relay: Send + Sync {
    /// Stable identifier for this output, e.g. `"door_strike"`.
    fn id(&self) -> &str;

    /// Drive the output to `active`.
    ///
    /// # Errors
    ///
    /// Returns [`DoorError::HardwareFault`] if the command cannot be applied.
    fn set_state(&mut self, active: bool) -> Result<(), DoorError>;

    /// Return the output's current state (`true` = energised).
    fn state(&self) -> bool;
}

/// A relay wired to a GPIO line exported through the sysfs `value` file,
/// e.g. `/sys/class/gpio/gpio17/value`.
pub struct SysfsGpioRelay {
    id: String,
    value: PathBuf,
    state: bool,
}

impl SysfsGpioRelay {
    pub fn new(id: impl Into<String>, value: impl AsRef<Path>) -> Self {
        Self {
            id: id.into(),
            value: value.as_ref().to_path_buf(),
            state: false,
        }
    }
}

impl Relay for SysfsGpioRelay {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_state(&mut self, active: bool) -> Result<(), DoorError> {
        fs::write(&self.value, if active { "1" } else { "0" }).map_err(|e| {
            DoorError::HardwareFault {
                component: self.id.clone(),
                details: format!("{}: {e}", self.value.display()),
            }
        })?;
        self.state = active;
        Ok(())
    }

    fn state(&self) -> bool {
        self.state
    }
}
