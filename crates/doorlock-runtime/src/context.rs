//! [`DeviceContext`] – the single owner of all door-lock state.
//!
//! Trusted time, the lockout table, the actuator and the decision engine are
//! built once here and shared by reference with the request boundary and the
//! background tasks.  [`DeviceContext::spawn_background`] starts the long-lived
//! tasks, wires their heartbeats into a [`WatchdogMonitor`] and hands back a
//! [`Supervisor`] that resolves when any of them ends.

use std::sync::Arc;
use std::time::Duration;

use doorlock_hal::{HardwareWatchdog, NetworkLink, Relay, TimeSource};
use doorlock_kernel::{
    AuthDecisionEngine, Heartbeat, IdentityTable, SharedTimeAuthority, TimeAuthority,
    TotpVerifier, WallClock, WatchdogMonitor,
};
use doorlock_types::{DoorError, Outcome, StatusLine};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::actuator_guard::ActuatorGuard;
use crate::boundary;
use crate::tasks::{self, RefreshTiming};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the context needs to assemble itself.
pub struct DeviceConfig {
    pub identities: IdentityTable,
    pub totp_digits: usize,
    pub totp_step_secs: u64,
    /// Accepted steps either side of the current one.
    pub totp_deviation: u32,
    pub lockout_secs: u64,
    /// How long the strike stays energised per successful unlock.
    pub hold: Duration,
    pub watchdog_period: Duration,
    /// How long the network link may report down before the watchdog starves.
    pub link_stale_threshold: Duration,
    pub refresh: RefreshTiming,
    pub reconnect_interval: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            identities: IdentityTable::new(),
            totp_digits: 6,
            totp_step_secs: 30,
            totp_deviation: 5,
            lockout_secs: 30,
            hold: Duration::from_secs(5),
            watchdog_period: Duration::from_secs(1),
            link_stale_threshold: Duration::from_secs(600),
            refresh: RefreshTiming::default(),
            reconnect_interval: Duration::from_secs(60 * 60),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// DeviceContext
// ─────────────────────────────────────────────────────────────────────────────

pub struct DeviceContext {
    time: SharedTimeAuthority,
    engine: AuthDecisionEngine,
    watchdog_period: Duration,
    link_stale_threshold: Duration,
    refresh: RefreshTiming,
    reconnect_interval: Duration,
}

impl DeviceContext {
    /// Build the context around the strike `relay`, reading wall time from
    /// `clock`.  The relay is driven locked before anything else happens.
    ///
    /// # Errors
    ///
    /// Fails if the relay rejects the initial lock command.
    pub fn new(
        config: DeviceConfig,
        relay: Box<dyn Relay>,
        clock: Arc<dyn WallClock>,
    ) -> Result<Self, DoorError> {
        let time = SharedTimeAuthority::new(TimeAuthority::new(clock));
        let actuator = ActuatorGuard::new(relay, config.hold)?;
        let verifier = TotpVerifier::new(
            config.totp_digits,
            config.totp_step_secs,
            config.totp_deviation,
        );
        info!(
            identities = config.identities.len(),
            digits = config.totp_digits,
            step = config.totp_step_secs,
            deviation = config.totp_deviation,
            lockout = config.lockout_secs,
            "device context ready"
        );
        let engine = AuthDecisionEngine::new(
            config.identities,
            verifier,
            config.lockout_secs,
            time.clone(),
            Arc::new(actuator),
        );
        Ok(Self {
            time,
            engine,
            watchdog_period: config.watchdog_period,
            link_stale_threshold: config.link_stale_threshold,
            refresh: config.refresh,
            reconnect_interval: config.reconnect_interval,
        })
    }

    pub fn decide(&self, identity: &str, code: &str) -> Outcome {
        self.engine.decide(identity, code)
    }

    /// Answer a raw request; see [`boundary`].
    pub fn respond(&self, query: &str, content_type: Option<&str>) -> StatusLine {
        boundary::respond(&self.engine, query, content_type)
    }

    pub fn engine(&self) -> &AuthDecisionEngine {
        &self.engine
    }

    pub fn time(&self) -> &SharedTimeAuthority {
        &self.time
    }

    /// Start the time refresh, network maintenance and watchdog tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_background(
        &self,
        source: Arc<dyn TimeSource>,
        link: Arc<dyn NetworkLink>,
        hardware: Box<dyn HardwareWatchdog>,
    ) -> Supervisor {
        let refresh_beat = Heartbeat::new(self.refresh.fetch_timeout + tasks::HEARTBEAT_SLACK);
        let network_beat = Heartbeat::new(tasks::HEARTBEAT_SLACK);
        let watchdog_beat = Heartbeat::new(self.watchdog_period + tasks::HEARTBEAT_SLACK);

        let mut monitor = WatchdogMonitor::new();
        monitor.register("time_refresh", Duration::ZERO, refresh_beat.probe());
        monitor.register("network_maintenance", Duration::ZERO, network_beat.probe());
        monitor.register("watchdog_loop", Duration::ZERO, watchdog_beat.probe());
        let link_probe = Arc::clone(&link);
        monitor.register(
            "network_link",
            self.link_stale_threshold,
            Box::new(move || link_probe.is_connected()),
        );

        let mut set = JoinSet::new();
        let time = self.time.clone();
        let refresh = self.refresh;
        set.spawn(async move {
            ("time_refresh", tasks::time_refresh(time, source, refresh_beat, refresh).await)
        });
        let reconnect = self.reconnect_interval;
        set.spawn(async move {
            (
                "network_maintenance",
                tasks::network_maintenance(link, network_beat, reconnect).await,
            )
        });
        let period = self.watchdog_period;
        set.spawn(async move {
            (
                "watchdog_loop",
                tasks::watchdog_loop(monitor, hardware, watchdog_beat, period).await,
            )
        });

        info!(tasks = set.len(), "background tasks started");
        Supervisor { set }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Supervisor
// ─────────────────────────────────────────────────────────────────────────────

/// Handle over the long-lived background tasks.
///
/// None of them is expected to finish, so the first one that does ends the
/// supervisor.  Dropping it aborts the rest.
pub struct Supervisor {
    set: JoinSet<(&'static str, Result<(), DoorError>)>,
}

impl Supervisor {
    /// Wait until a background task ends and report why as a fatal error.
    pub async fn wait(&mut self) -> DoorError {
        let err = match self.set.join_next().await {
            Some(Ok((_, Err(e)))) if e.is_fatal() => e,
            Some(Ok((task, Err(e)))) => DoorError::TaskExited {
                task: task.to_string(),
                details: e.to_string(),
            },
            Some(Ok((task, Ok(())))) => DoorError::TaskExited {
                task: task.to_string(),
                details: "returned".to_string(),
            },
            Some(Err(join)) => DoorError::TaskExited {
                task: "background".to_string(),
                details: join.to_string(),
            },
            None => DoorError::TaskExited {
                task: "background".to_string(),
                details: "no tasks running".to_string(),
            },
        };
        error!(error = %err, "background task ended");
        err
    }

    /// Abort every remaining task.
    pub fn shutdown(&mut self) {
        self.set.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doorlock_hal::sim::{SimLink, SimRelay, SimTimeSource, SimWatchdog};
    use doorlock_kernel::ManualClock;

    fn context() -> DeviceContext {
        let config = DeviceConfig {
            hold: Duration::from_millis(20),
            ..DeviceConfig::default()
        };
        DeviceContext::new(config, SimRelay::new("door_strike"), Arc::new(ManualClock::new(0)))
            .unwrap()
    }

    #[test]
    fn defaults_follow_device_constants() {
        let config = DeviceConfig::default();
        assert_eq!(config.totp_digits, 6);
        assert_eq!(config.totp_step_secs, 30);
        assert_eq!(config.totp_deviation, 5);
        assert_eq!(config.lockout_secs, 30);
        assert_eq!(config.hold, Duration::from_secs(5));
        assert_eq!(config.watchdog_period, Duration::from_secs(1));
        assert_eq!(config.link_stale_threshold, Duration::from_secs(600));
    }

    struct JammedRelay;

    impl Relay for JammedRelay {
        fn id(&self) -> &str {
            "door_strike"
        }

        fn set_state(&mut self, _active: bool) -> Result<(), DoorError> {
            Err(DoorError::HardwareFault {
                component: "door_strike".to_string(),
                details: "gpio write failed".to_string(),
            })
        }

        fn state(&self) -> bool {
            false
        }
    }

    #[test]
    fn relay_that_cannot_lock_aborts_construction() {
        let result = DeviceContext::new(
            DeviceConfig::default(),
            Box::new(JammedRelay),
            Arc::new(ManualClock::new(0)),
        );
        assert!(matches!(result, Err(DoorError::HardwareFault { .. })));
    }

    #[test]
    fn unknown_identity_before_sync() {
        let ctx = context();
        assert_eq!(ctx.decide("bob", "123456"), Outcome::UnknownIdentity);
        assert!(!ctx.time().is_synchronized());
    }

    #[tokio::test]
    async fn supervisor_reports_fatal_task_error() {
        let ctx = context();
        let source = SimTimeSource::new();
        source
            .handle()
            .push_error(DoorError::ResourceExhausted("out of memory".into()));

        let mut supervisor = ctx.spawn_background(
            Arc::new(source),
            Arc::new(SimLink::new(true)),
            SimWatchdog::new(),
        );
        let err = supervisor.wait().await;
        assert!(matches!(err, DoorError::ResourceExhausted(_)));
        supervisor.shutdown();
    }

    #[tokio::test]
    async fn background_tasks_sync_time_and_feed_watchdog() {
        let config = DeviceConfig {
            watchdog_period: Duration::from_millis(10),
            ..DeviceConfig::default()
        };
        let ctx =
            DeviceContext::new(config, SimRelay::new("door_strike"), Arc::new(ManualClock::new(0)))
                .unwrap();
        let source = SimTimeSource::new();
        source.handle().push_time(1_700_000_000);
        let hardware = SimWatchdog::new();
        let feeds = hardware.observer();

        let mut supervisor =
            ctx.spawn_background(Arc::new(source), Arc::new(SimLink::new(true)), hardware);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ctx.time().get_time(), Some(1_700_000_000));
        assert!(feeds.feeds() > 0);
        supervisor.shutdown();
    }
}
