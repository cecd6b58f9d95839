//! `doorlock-hal` – Hardware & Collaborator Abstraction Layer
//!
//! Narrow traits through which the door-lock core reaches everything it does
//! not own: the strike output, the hardware watchdog, the external time
//! source and the network link.  The core only ever talks to these traits,
//! so drivers can be swapped without touching authentication logic.
//!
//! # Modules
//!
//! - [`relay`] – [`Relay`][relay::Relay]: the discrete unlock output and the
//!   sysfs GPIO [`SysfsGpioRelay`][relay::SysfsGpioRelay] driver.
//! - [`watchdog`] – [`HardwareWatchdog`][watchdog::HardwareWatchdog] and the
//!   Linux [`DevWatchdog`][watchdog::DevWatchdog] driver.
//! - [`time_source`] – [`TimeSource`][time_source::TimeSource] and the
//!   [`HostClockSource`][time_source::HostClockSource] driver.
//! - [`link`] – [`NetworkLink`][link::NetworkLink] and the sysfs-backed
//!   [`SysfsLink`][link::SysfsLink] driver.
//! - [`sim`] – in-process simulated drivers for headless runs and tests.

pub mod link;
pub mod relay;
pub mod sim;
pub mod time_source;
pub mod watchdog;

pub use link::{NetworkLink, SysfsLink};
pub use relay::{Relay, SysfsGpioRelay};
pub use time_source::{HostClockSource, TimeSource};
pub use watchdog::{DevWatchdog, HardwareWatchdog};
