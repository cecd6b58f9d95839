//! Long-lived background tasks.
//!
//! Each task owns a [`Heartbeat`] and, before every wait, promises to beat
//! again shortly after the wait ends.  A task that hangs, panics or returns
//! breaks that promise and its probe starves the hardware watchdog.
//!
//! | Task | Cadence | On failure |
//! |---|---|---|
//! | [`time_refresh`] | resync every 6 h | transient: retry after backoff; fatal: return |
//! | [`network_maintenance`] | reconnect every hour | transient: log and continue |
//! | [`watchdog_loop`] | poll every second | feed error: log, next cycle retries |

use std::sync::Arc;
use std::time::{Duration, Instant};

use doorlock_hal::{HardwareWatchdog, NetworkLink, TimeSource};
use doorlock_kernel::{Heartbeat, SharedTimeAuthority, WatchdogMonitor};
use doorlock_types::DoorError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

/// Extra allowance on top of every heartbeat promise for scheduling jitter.
pub const HEARTBEAT_SLACK: Duration = Duration::from_secs(5);

/// Cadence of the time refresh task.
#[derive(Debug, Clone, Copy)]
pub struct RefreshTiming {
    pub resync_interval: Duration,
    pub retry_backoff: Duration,
    pub fetch_timeout: Duration,
}

impl Default for RefreshTiming {
    fn default() -> Self {
        Self {
            resync_interval: Duration::from_secs(6 * 60 * 60),
            retry_backoff: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// Keep `time` synchronized from `source`.
///
/// Runs until a fatal error, which is returned after the heartbeat is
/// stopped.
pub async fn time_refresh(
    time: SharedTimeAuthority,
    source: Arc<dyn TimeSource>,
    heartbeat: Heartbeat,
    timing: RefreshTiming,
) -> Result<(), DoorError> {
    loop {
        heartbeat.beat(timing.fetch_timeout + HEARTBEAT_SLACK);
        let fetched = tokio::time::timeout(timing.fetch_timeout, source.fetch_external_time())
            .await
            .unwrap_or_else(|_| {
                Err(DoorError::Transport(format!(
                    "time fetch timed out after {:?}",
                    timing.fetch_timeout
                )))
            });

        let wait = match fetched {
            Ok(external) => {
                time.sync(external);
                debug!(external, "time refreshed");
                timing.resync_interval
            }
            Err(e) if e.is_fatal() => {
                error!(error = %e, "time refresh aborted");
                heartbeat.stop();
                return Err(e);
            }
            Err(e) => {
                warn!(error = %e, retry_in = ?timing.retry_backoff, "time refresh failed");
                timing.retry_backoff
            }
        };

        heartbeat.beat(wait + HEARTBEAT_SLACK);
        tokio::time::sleep(wait).await;
    }
}

/// Periodically restart the network link to renew its lease.
pub async fn network_maintenance(
    link: Arc<dyn NetworkLink>,
    heartbeat: Heartbeat,
    interval: Duration,
) -> Result<(), DoorError> {
    loop {
        // Cycling a real interface shells out, so keep it off the async workers.
        let renewal = {
            let link = Arc::clone(&link);
            tokio::task::spawn_blocking(move || link.reconnect())
                .await
                .unwrap_or_else(|e| {
                    Err(DoorError::Transport(format!("link renewal task failed: {e}")))
                })
        };
        match renewal {
            Ok(()) => debug!("network link renewed"),
            Err(e) if e.is_fatal() => {
                error!(error = %e, "network maintenance aborted");
                heartbeat.stop();
                return Err(e);
            }
            Err(e) => warn!(error = %e, "network link renewal failed"),
        }
        heartbeat.beat(interval + HEARTBEAT_SLACK);
        tokio::time::sleep(interval).await;
    }
}

/// Poll `monitor` every `period` and feed `hardware` when every entry is
/// good.
pub async fn watchdog_loop(
    mut monitor: WatchdogMonitor,
    mut hardware: Box<dyn HardwareWatchdog>,
    heartbeat: Heartbeat,
    period: Duration,
) -> Result<(), DoorError> {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        heartbeat.beat(period + HEARTBEAT_SLACK);
        if monitor.poll(Instant::now()).feed {
            if let Err(e) = hardware.feed() {
                error!(error = %e, "hardware watchdog feed failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doorlock_hal::sim::{SimLink, SimTimeSource, SimWatchdog};
    use doorlock_kernel::{ManualClock, TimeAuthority};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn fast_timing() -> RefreshTiming {
        RefreshTiming {
            resync_interval: Duration::from_secs(3600),
            retry_backoff: Duration::from_millis(10),
            fetch_timeout: Duration::from_millis(100),
        }
    }

    fn fresh_time() -> SharedTimeAuthority {
        SharedTimeAuthority::new(TimeAuthority::new(Arc::new(ManualClock::new(0))))
    }

    #[tokio::test]
    async fn time_refresh_retries_after_transient_failure() {
        let time = fresh_time();
        let source = SimTimeSource::new();
        let script = source.handle();
        script.push_error(DoorError::Transport("dns failure".into()));
        script.push_time(1_700_000_000);

        let heartbeat = Heartbeat::new(Duration::from_secs(1));
        let task = tokio::spawn(time_refresh(
            time.clone(),
            Arc::new(source),
            heartbeat.clone(),
            fast_timing(),
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(time.get_time(), Some(1_700_000_000));
        assert_eq!(script.fetches(), 2);
        assert!(heartbeat.is_alive());
        task.abort();
    }

    #[tokio::test]
    async fn time_refresh_returns_on_fatal_error_and_stops_heartbeat() {
        let time = fresh_time();
        let source = SimTimeSource::new();
        source
            .handle()
            .push_error(DoorError::ResourceExhausted("out of memory".into()));

        let heartbeat = Heartbeat::new(Duration::from_secs(1));
        let result = time_refresh(time.clone(), Arc::new(source), heartbeat.clone(), fast_timing()).await;

        assert!(matches!(result, Err(DoorError::ResourceExhausted(_))));
        assert!(!heartbeat.is_alive());
        assert!(!time.is_synchronized());
    }

    #[tokio::test]
    async fn network_maintenance_reconnects_and_beats() {
        let link = SimLink::new(true);
        let handle = link.handle();
        let heartbeat = Heartbeat::new(Duration::ZERO);
        let task = tokio::spawn(network_maintenance(
            Arc::new(link),
            heartbeat.clone(),
            Duration::from_millis(10),
        ));

        tokio::time::sleep(Duration::from_millis(55)).await;
        assert!(handle.reconnects() >= 2);
        assert!(heartbeat.is_alive());
        task.abort();
    }

    #[tokio::test]
    async fn watchdog_loop_feeds_only_while_all_good() {
        let healthy = Arc::new(AtomicBool::new(true));
        let probe_flag = Arc::clone(&healthy);
        let mut monitor = WatchdogMonitor::new();
        monitor.register(
            "time_refresh",
            Duration::ZERO,
            Box::new(move || probe_flag.load(Ordering::SeqCst)),
        );

        let hardware = SimWatchdog::new();
        let feeds = hardware.observer();
        let heartbeat = Heartbeat::new(Duration::from_secs(1));
        let task = tokio::spawn(watchdog_loop(
            monitor,
            hardware,
            heartbeat,
            Duration::from_millis(10),
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(feeds.feeds() > 0);

        healthy.store(false, Ordering::SeqCst);
        let frozen = feeds.feeds();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(feeds.feeds(), frozen);

        healthy.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(feeds.feeds() > frozen);
        task.abort();
    }
}
