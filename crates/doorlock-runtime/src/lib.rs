//! `doorlock-runtime` – Device Wiring and Background Tasks
//!
//! Assembles the kernel's decision logic with real (or simulated) hardware
//! and keeps it alive.
//!
//! # Modules
//!
//! - [`context`] – [`DeviceContext`][context::DeviceContext]: owns trusted
//!   time, the actuator and the decision engine; starts the background tasks
//!   under a [`Supervisor`][context::Supervisor].
//! - [`actuator_guard`] – [`ActuatorGuard`][actuator_guard::ActuatorGuard]:
//!   exclusive, self-expiring control of the strike relay that always relocks.
//! - [`boundary`] – extracts identity and code from a raw request and maps the
//!   decision to its status line.
//! - [`tasks`] – time refresh, network maintenance and watchdog loops.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with an optional OTLP span exporter.

pub mod actuator_guard;
pub mod boundary;
pub mod context;
pub mod tasks;
pub mod telemetry;

pub use actuator_guard::ActuatorGuard;
pub use boundary::{Credentials, Malformed};
pub use context::{DeviceConfig, DeviceContext, Supervisor};
pub use tasks::{HEARTBEAT_SLACK, RefreshTiming};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
