//! [`WatchdogMonitor`] – liveness aggregation that gates hardware watchdog
//! feeding.
//!
//! Every supervised facility registers a probe together with a staleness
//! threshold.  On each [`WatchdogMonitor::poll`]:
//!
//! - a probe reporting healthy refreshes its last-healthy instant and counts
//!   as good;
//! - a probe reporting unhealthy for at least its threshold since it was last
//!   healthy counts as bad;
//! - a probe reporting unhealthy but still inside its threshold is tolerated.
//!
//! The hardware watchdog may be fed only when no entry is bad.  A threshold
//! of zero makes any unhealthy reading immediately fatal to the feed, which
//! is what background task heartbeats use; slower external signals such as
//! link state get a longer threshold to ride out flaps.
//!
//! Background tasks report progress through a [`Heartbeat`]: before each wait
//! the task promises to beat again within a bound, and the heartbeat's probe
//! turns unhealthy once that promise is broken (the task hung, panicked, or
//! exited).

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::warn;

/// A no-argument health check.
pub type Probe = Box<dyn Fn() -> bool + Send + Sync>;

/// Stable handle of a registered monitor entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MonitorId(usize);

/// Verdict for one entry in one poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorHealth {
    /// The probe reported healthy.
    Healthy,
    /// The probe reported unhealthy, but within its threshold.
    Tolerated,
    /// The probe has been unhealthy for at least its threshold.
    Stale,
}

struct MonitorEntry {
    name: String,
    probe: Probe,
    threshold: Duration,
    last_healthy: Instant,
}

/// Result of one poll cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    /// `true` when the hardware watchdog may be fed.
    pub feed: bool,
    /// Names of entries that were stale this cycle.
    pub stale: Vec<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// WatchdogMonitor
// ────────────────────────────────────────────────────────────────────────────

/// Aggregates liveness probes and decides whether to feed the watchdog.
///
/// # Example
///
/// ```
/// use std::time::{Duration, Instant};
/// use doorlock_kernel::watchdog::WatchdogMonitor;
///
/// let mut monitor = WatchdogMonitor::new();
/// monitor.register("always_up", Duration::ZERO, Box::new(|| true));
/// assert!(monitor.poll(Instant::now()).feed);
///
/// monitor.register("dead", Duration::ZERO, Box::new(|| false));
/// assert!(!monitor.poll(Instant::now()).feed);
/// ```
#[derive(Default)]
pub struct WatchdogMonitor {
    entries: Vec<MonitorEntry>,
}

impl WatchdogMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `probe` under `name` with a staleness `threshold`.
    ///
    /// The entry starts out as last healthy *now*.  Entries are never removed.
    pub fn register(&mut self, name: &str, threshold: Duration, probe: Probe) -> MonitorId {
        self.entries.push(MonitorEntry {
            name: name.to_string(),
            probe,
            threshold,
            last_healthy: Instant::now(),
        });
        MonitorId(self.entries.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Name of the entry behind `id`.
    pub fn name(&self, id: MonitorId) -> Option<&str> {
        self.entries.get(id.0).map(|e| e.name.as_str())
    }

    /// Evaluate every probe once at `now` and aggregate the verdicts.
    pub fn poll(&mut self, now: Instant) -> PollReport {
        let mut stale = Vec::new();
        for entry in &mut self.entries {
            if Self::evaluate(entry, now) == MonitorHealth::Stale {
                stale.push(entry.name.clone());
            }
        }
        if !stale.is_empty() {
            warn!(?stale, "watchdog feed suppressed");
        }
        PollReport {
            feed: stale.is_empty(),
            stale,
        }
    }

    fn evaluate(entry: &mut MonitorEntry, now: Instant) -> MonitorHealth {
        if (entry.probe)() {
            entry.last_healthy = now;
            return MonitorHealth::Healthy;
        }
        if now.saturating_duration_since(entry.last_healthy) >= entry.threshold {
            MonitorHealth::Stale
        } else {
            MonitorHealth::Tolerated
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Heartbeat
// ────────────────────────────────────────────────────────────────────────────

/// Progress promise shared between a background task and its probe.
///
/// Cloning shares the same promise.
#[derive(Clone)]
pub struct Heartbeat {
    /// `None` once the owning task has declared itself finished.
    deadline: Arc<Mutex<Option<Instant>>>,
}

impl Heartbeat {
    /// A heartbeat that stays alive for `grace` before the first beat.
    pub fn new(grace: Duration) -> Self {
        Self {
            deadline: Arc::new(Mutex::new(Some(Instant::now() + grace))),
        }
    }

    /// Promise to beat again within `within`.
    pub fn beat(&self, within: Duration) {
        *self.lock() = Some(Instant::now() + within);
    }

    /// Declare the owning task finished; the probe is unhealthy from now on.
    pub fn stop(&self) {
        *self.lock() = None;
    }

    pub fn is_alive(&self) -> bool {
        self.is_alive_at(Instant::now())
    }

    pub fn is_alive_at(&self, now: Instant) -> bool {
        let deadline = *self.lock();
        deadline.is_some_and(|deadline| now <= deadline)
    }

    /// Turn this heartbeat into a [`Probe`] for the monitor.
    pub fn probe(&self) -> Probe {
        let heartbeat = self.clone();
        Box::new(move || heartbeat.is_alive())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Instant>> {
        self.deadline.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
