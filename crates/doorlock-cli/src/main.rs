//! `doorlockd` – Door-Lock Daemon
//!
//! The process entry point for the access-control device.  It:
//!
//! 1. Initialises tracing (console or JSON, optional OTLP export).
//! 2. Loads `~/.doorlock/config.toml` (or `$DOORLOCK_CONFIG`) and validates
//!    it.
//! 3. Builds the [`DeviceContext`] on simulated or Linux hardware, starts the
//!    background tasks and the unlock gateway.
//! 4. Runs until Ctrl-C or until a background task dies.  A dead task is
//!    fatal: the runtime is torn down (relocking the strike) and the process
//!    exits non-zero so the service manager restarts it.

mod config;

use std::process::ExitCode;
use std::sync::Arc;

use doorlock_gateway::GatewayServer;
use doorlock_hal::sim::{SimLink, SimRelay, SimWatchdog};
use doorlock_hal::{
    DevWatchdog, HardwareWatchdog, HostClockSource, NetworkLink, Relay, SysfsGpioRelay, SysfsLink,
    TimeSource,
};
use doorlock_kernel::SystemClock;
use doorlock_runtime::DeviceContext;
use doorlock_types::DoorError;
use tracing::{error, info, warn};

use config::{Config, HardwareMode};

fn main() -> ExitCode {
    let telemetry = doorlock_runtime::init_tracing("doorlockd");
    info!(otlp = telemetry.is_exporting(), "tracing initialised");

    let cfg = match config::load() {
        Ok(Some(cfg)) => cfg,
        Ok(None) => {
            error!(path = %config::config_path().display(), "no configuration found");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    info!(config = ?cfg, "configuration loaded");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!(error = %e, "failed to start async runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(cfg));
    // Dropping the runtime cancels any pending relock timer, which relocks.
    drop(runtime);

    match result {
        Ok(()) => {
            info!("door-lock daemon stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "door-lock daemon exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: Config) -> Result<(), DoorError> {
    let device_config = cfg.to_device_config()?;
    let hw = Hardware::for_mode(&cfg)?;

    let ctx = Arc::new(DeviceContext::new(
        device_config,
        hw.relay,
        Arc::new(SystemClock),
    )?);
    let mut supervisor = ctx.spawn_background(hw.source, hw.link, hw.watchdog);
    let gateway = GatewayServer::new(Arc::clone(&ctx)).with_port(cfg.port);

    let outcome = tokio::select! {
        err = supervisor.wait() => Err(err),
        served = gateway.run() => served,
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Ctrl-C received; shutting down"),
                Err(e) => warn!(error = %e, "signal handler failed; shutting down"),
            }
            Ok(())
        }
    };
    supervisor.shutdown();
    outcome
}

// ─────────────────────────────────────────────────────────────────────────────
// Hardware selection
// ─────────────────────────────────────────────────────────────────────────────

struct Hardware {
    relay: Box<dyn Relay>,
    watchdog: Box<dyn HardwareWatchdog>,
    source: Arc<dyn TimeSource>,
    link: Arc<dyn NetworkLink>,
}

impl Hardware {
    fn for_mode(cfg: &Config) -> Result<Self, DoorError> {
        info!(mode = %cfg.hardware, "selecting hardware drivers");
        match cfg.hardware {
            HardwareMode::Sim => Ok(Self {
                relay: SimRelay::new("door_strike"),
                watchdog: SimWatchdog::new(),
                source: Arc::new(HostClockSource),
                link: Arc::new(SimLink::new(true)),
            }),
            HardwareMode::Linux => Ok(Self {
                relay: Box::new(SysfsGpioRelay::new("door_strike", &cfg.strike_gpio)),
                watchdog: Box::new(DevWatchdog::open(&cfg.watchdog_device)?),
                source: Arc::new(HostClockSource),
                link: Arc::new(SysfsLink::new(cfg.interface.clone()).with_tool(&cfg.link_tool)),
            }),
        }
    }
}
