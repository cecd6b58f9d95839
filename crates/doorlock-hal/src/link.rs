//! Network link liveness and maintenance.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use doorlock_types::DoorError;
use tracing::{info, warn};

/// Program used to take the interface down and back up.
pub const DEFAULT_LINK_TOOL: &str = "ip";

/// The device's uplink (Wi-Fi station, Ethernet port, ...).
pub trait NetworkLink: Send + Sync {
    /// `true` while the link is up and associated.
    fn is_connected(&self) -> bool;

    /// Tear the link down and bring it back up, renewing any DHCP lease.
    ///
    /// # Errors
    ///
    /// Returns [`DoorError::Transport`] when the link cannot be restarted.
    fn reconnect(&self) -> Result<(), DoorError>;
}

/// Reads link state from `/sys/class/net/<iface>/operstate` and cycles the
/// interface with `ip link set <iface> down|up`.
pub struct SysfsLink {
    iface: String,
    operstate: PathBuf,
    tool: PathBuf,
}

impl SysfsLink {
    /// Watch interface `iface` under the standard sysfs root.
    pub fn new(iface: impl Into<String>) -> Self {
        Self::with_root("/sys/class/net", iface)
    }

    /// Watch interface `iface` under a custom sysfs-style `root`.
    pub fn with_root(root: impl AsRef<Path>, iface: impl Into<String>) -> Self {
        let iface = iface.into();
        let operstate = root.as_ref().join(&iface).join("operstate");
        Self {
            iface,
            operstate,
            tool: PathBuf::from(DEFAULT_LINK_TOOL),
        }
    }

    /// Use `tool` instead of `ip` to cycle the interface.  It is invoked as
    /// `<tool> link set <iface> down` and then `... up`.
    pub fn with_tool(mut self, tool: impl Into<PathBuf>) -> Self {
        self.tool = tool.into();
        self
    }

    fn set_state(&self, state: &str) -> Result<(), DoorError> {
        let output = Command::new(&self.tool)
            .args(["link", "set", self.iface.as_str(), state])
            .output()
            .map_err(|e| {
                DoorError::Transport(format!("cannot run {}: {e}", self.tool.display()))
            })?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(iface = %self.iface, state, stderr = %stderr.trim(), "link command failed");
        Err(DoorError::Transport(format!(
            "{} link set {} {state} exit code {}: {}",
            self.tool.display(),
            self.iface,
            output.status.code().unwrap_or(-1),
            stderr.trim()
        )))
    }
}

impl NetworkLink for SysfsLink {
    fn is_connected(&self) -> bool {
        fs::read_to_string(&self.operstate)
            .map(|s| s.trim() == "up")
            .unwrap_or(false)
    }

    fn reconnect(&self) -> Result<(), DoorError> {
        self.set_state("down")?;
        self.set_state("up")?;
        info!(iface = %self.iface, "link cycled");
        Ok(())
    }
}
