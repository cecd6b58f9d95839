//! `doorlock-kernel` – Authentication & Liveness Core
//!
//! The part of the door lock that decides.  It owns no hardware and spawns
//! no tasks; it enforces rules over state handed to it by the runtime.
//!
//! # Modules
//!
//! - [`time_authority`] – [`TimeAuthority`][time_authority::TimeAuthority]:
//!   rollback-resistant trusted time, unsynchronized until the first external
//!   sync.
//! - [`totp`] – [`TotpVerifier`][totp::TotpVerifier]: RFC 6238 verification
//!   with a symmetric skew window and constant-time comparison.
//! - [`lockout`] – [`LockoutRegistry`][lockout::LockoutRegistry]: per-identity
//!   cool-down after a failed attempt.
//! - [`auth_gate`] – [`AuthDecisionEngine`][auth_gate::AuthDecisionEngine]:
//!   the single interception point every unlock request passes through.
//! - [`watchdog`] – [`WatchdogMonitor`][watchdog::WatchdogMonitor]:
//!   aggregates liveness probes and decides whether the hardware watchdog may
//!   be fed.

pub mod auth_gate;
pub mod lockout;
pub mod time_authority;
pub mod totp;
pub mod watchdog;

pub use auth_gate::{AuthDecisionEngine, IdentityTable, NoopUnlock, Unlock};
pub use lockout::LockoutRegistry;
pub use time_authority::{
    ManualClock, SharedTimeAuthority, SystemClock, TimeAuthority, WallClock,
};
pub use totp::{TotpSecret, TotpVerifier};
pub use watchdog::{Heartbeat, MonitorHealth, MonitorId, PollReport, Probe, WatchdogMonitor};
