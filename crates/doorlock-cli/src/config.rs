//! Device configuration – reads `~/.doorlock/config.toml` (or
//! `$DOORLOCK_CONFIG`).
//!
//! ```toml
//! port = 8080
//! hardware = "linux"
//! lockout_secs = 30
//!
//! [identities]
//! alice = "JBSWY3DPEHPK3PXP"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use doorlock_kernel::{IdentityTable, TotpSecret};
use doorlock_runtime::{DeviceConfig, RefreshTiming};
use doorlock_types::DoorError;
use zeroize::Zeroizing;

/// Which drivers back the collaborator traits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HardwareMode {
    /// In-process simulated strike, watchdog, time source and link.
    #[default]
    Sim,
    /// sysfs GPIO strike, `/dev/watchdog`, host clock and sysfs link state.
    Linux,
}

impl std::fmt::Display for HardwareMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HardwareMode::Sim => write!(f, "sim"),
            HardwareMode::Linux => write!(f, "linux"),
        }
    }
}

/// Persisted device configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// TCP port of the unlock gateway.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub hardware: HardwareMode,

    #[serde(default = "default_totp_digits")]
    pub totp_digits: usize,

    #[serde(default = "default_totp_step_secs")]
    pub totp_step_secs: u64,

    /// Accepted steps either side of the current one.
    #[serde(default = "default_totp_deviation")]
    pub totp_deviation: u32,

    /// Cool-down after a wrong code.
    #[serde(default = "default_lockout_secs")]
    pub lockout_secs: u64,

    /// How long the strike stays energised after a successful unlock.
    #[serde(default = "default_hold_secs")]
    pub hold_secs: u64,

    /// How long the network link may stay down before the hardware watchdog
    /// is starved.
    #[serde(default = "default_link_stale_secs")]
    pub link_stale_secs: u64,

    #[serde(default = "default_resync_secs")]
    pub resync_secs: u64,

    #[serde(default = "default_retry_secs")]
    pub retry_secs: u64,

    #[serde(default = "default_reconnect_secs")]
    pub reconnect_secs: u64,

    /// Sysfs `value` file of the strike's GPIO line (`linux` mode only).
    #[serde(default = "default_strike_gpio")]
    pub strike_gpio: PathBuf,

    #[serde(default = "default_watchdog_device")]
    pub watchdog_device: PathBuf,

    /// Network interface whose link state is supervised.
    #[serde(default = "default_interface")]
    pub interface: String,

    /// Program that cycles the interface (`<tool> link set <iface> down|up`).
    #[serde(default = "default_link_tool")]
    pub link_tool: PathBuf,

    /// Identity → Base32 TOTP secret.
    #[serde(default)]
    pub identities: BTreeMap<String, Zeroizing<String>>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let identities: BTreeMap<&str, &str> = self
            .identities
            .keys()
            .map(|id| (id.as_str(), "<redacted>"))
            .collect();
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("hardware", &self.hardware)
            .field("totp_digits", &self.totp_digits)
            .field("totp_step_secs", &self.totp_step_secs)
            .field("totp_deviation", &self.totp_deviation)
            .field("lockout_secs", &self.lockout_secs)
            .field("hold_secs", &self.hold_secs)
            .field("link_stale_secs", &self.link_stale_secs)
            .field("resync_secs", &self.resync_secs)
            .field("retry_secs", &self.retry_secs)
            .field("reconnect_secs", &self.reconnect_secs)
            .field("strike_gpio", &self.strike_gpio)
            .field("watchdog_device", &self.watchdog_device)
            .field("interface", &self.interface)
            .field("link_tool", &self.link_tool)
            .field("identities", &identities)
            .finish()
    }
}

fn default_port() -> u16 {
    8080
}
fn default_totp_digits() -> usize {
    6
}
fn default_totp_step_secs() -> u64 {
    30
}
fn default_totp_deviation() -> u32 {
    5
}
fn default_lockout_secs() -> u64 {
    30
}
fn default_hold_secs() -> u64 {
    5
}
fn default_link_stale_secs() -> u64 {
    600
}
fn default_resync_secs() -> u64 {
    6 * 60 * 60
}
fn default_retry_secs() -> u64 {
    60
}
fn default_reconnect_secs() -> u64 {
    60 * 60
}
fn default_strike_gpio() -> PathBuf {
    PathBuf::from("/sys/class/gpio/gpio17/value")
}
fn default_watchdog_device() -> PathBuf {
    PathBuf::from(doorlock_hal::watchdog::DEFAULT_WATCHDOG_PATH)
}
fn default_interface() -> String {
    "wlan0".to_string()
}
fn default_link_tool() -> PathBuf {
    PathBuf::from(doorlock_hal::link::DEFAULT_LINK_TOOL)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            hardware: HardwareMode::default(),
            totp_digits: default_totp_digits(),
            totp_step_secs: default_totp_step_secs(),
            totp_deviation: default_totp_deviation(),
            lockout_secs: default_lockout_secs(),
            hold_secs: default_hold_secs(),
            link_stale_secs: default_link_stale_secs(),
            resync_secs: default_resync_secs(),
            retry_secs: default_retry_secs(),
            reconnect_secs: default_reconnect_secs(),
            strike_gpio: default_strike_gpio(),
            watchdog_device: default_watchdog_device(),
            interface: default_interface(),
            link_tool: default_link_tool(),
            identities: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Reject settings the device cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`DoorError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), DoorError> {
        if !(6..=8).contains(&self.totp_digits) {
            return Err(DoorError::Config(format!(
                "totp_digits must be between 6 and 8, got {}",
                self.totp_digits
            )));
        }
        if self.totp_step_secs == 0 {
            return Err(DoorError::Config("totp_step_secs must be non-zero".to_string()));
        }
        if self.identities.is_empty() {
            return Err(DoorError::Config("no identities configured".to_string()));
        }
        self.identity_table().map(|_| ())
    }

    /// Decode every configured secret.
    pub fn identity_table(&self) -> Result<IdentityTable, DoorError> {
        let mut table = IdentityTable::new();
        for (identity, encoded) in &self.identities {
            let secret = TotpSecret::from_base32(encoded).map_err(|e| {
                DoorError::Config(format!("secret for identity '{identity}': {e}"))
            })?;
            table.insert(identity.clone(), secret);
        }
        Ok(table)
    }

    /// Validate and convert into the runtime's [`DeviceConfig`].
    pub fn to_device_config(&self) -> Result<DeviceConfig, DoorError> {
        self.validate()?;
        Ok(DeviceConfig {
            identities: self.identity_table()?,
            totp_digits: self.totp_digits,
            totp_step_secs: self.totp_step_secs,
            totp_deviation: self.totp_deviation,
            lockout_secs: self.lockout_secs,
            hold: Duration::from_secs(self.hold_secs),
            link_stale_threshold: Duration::from_secs(self.link_stale_secs),
            refresh: RefreshTiming {
                resync_interval: Duration::from_secs(self.resync_secs),
                retry_backoff: Duration::from_secs(self.retry_secs),
                ..RefreshTiming::default()
            },
            reconnect_interval: Duration::from_secs(self.reconnect_secs),
            ..DeviceConfig::default()
        })
    }
}

/// Return the config path: `$DOORLOCK_CONFIG` or `~/.doorlock/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("DOORLOCK_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".doorlock").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, DoorError> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, DoorError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = Zeroizing::new(fs::read_to_string(path).map_err(|e| {
        DoorError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?);
    let mut cfg = parse(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Parse a TOML document without applying environment overrides.
pub(crate) fn parse(raw: &str) -> Result<Config, DoorError> {
    toml::from_str(raw).map_err(|e| DoorError::Config(format!("failed to parse config: {e}")))
}

/// Apply `DOORLOCK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `DOORLOCK_PORT` | `port` |
/// | `DOORLOCK_LOCKOUT_SECS` | `lockout_secs` |
/// | `DOORLOCK_HOLD_SECS` | `hold_secs` |
/// | `DOORLOCK_TOTP_DEVIATION` | `totp_deviation` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("DOORLOCK_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.port = port;
    }
    if let Ok(v) = std::env::var("DOORLOCK_LOCKOUT_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.lockout_secs = secs;
    }
    if let Ok(v) = std::env::var("DOORLOCK_HOLD_SECS")
        && let Ok(secs) = v.parse::<u64>()
    {
        cfg.hold_secs = secs;
    }
    if let Ok(v) = std::env::var("DOORLOCK_TOTP_DEVIATION")
        && let Ok(steps) = v.parse::<u32>()
    {
        cfg.totp_deviation = steps;
    }
}
