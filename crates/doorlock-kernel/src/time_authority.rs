//! [`TimeAuthority`] – rollback-resistant trusted time.
//!
//! Trusted time starts *unsynchronized* and stays that way until the first
//! successful [`TimeAuthority::sync`].  From then on every reading is the
//! maximum of the stored floor and the corrected local clock, so the value
//! handed to TOTP verification never moves backward, even when the external
//! source later reports an earlier time or the local clock is stepped back.
//!
//! The corrected local clock is the [`WallClock`] reading shifted by the
//! offset observed at the last sync, which stands in for stepping the board's
//! RTC to the external time.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use doorlock_kernel::time_authority::{ManualClock, TimeAuthority};
//!
//! let clock = Arc::new(ManualClock::new(100));
//! let mut authority = TimeAuthority::new(clock.clone());
//! assert_eq!(authority.get_time(), None);
//!
//! authority.sync(1_700_000_000);
//! clock.advance(5);
//! assert_eq!(authority.get_time(), Some(1_700_000_005));
//!
//! // A rollback from the source never lowers trusted time.
//! authority.sync(1_600_000_000);
//! assert_eq!(authority.get_time(), Some(1_700_000_005));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use doorlock_types::Timestamp;
use tracing::{info, warn};

/// Source of local wall-clock seconds.
pub trait WallClock: Send + Sync {
    fn now_secs(&self) -> Timestamp;
}

/// The host system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_secs(&self) -> Timestamp {
        Timestamp::try_from(Utc::now().timestamp()).unwrap_or(0)
    }
}

/// A hand-driven clock for simulations and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    secs: AtomicU64,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            secs: AtomicU64::new(start),
        }
    }

    pub fn advance(&self, secs: u64) {
        self.secs.fetch_add(secs, Ordering::SeqCst);
    }

    /// Jump to `secs`, possibly backwards.
    pub fn set(&self, secs: Timestamp) {
        self.secs.store(secs, Ordering::SeqCst);
    }
}

impl WallClock for ManualClock {
    fn now_secs(&self) -> Timestamp {
        self.secs.load(Ordering::SeqCst)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TimeAuthority
// ────────────────────────────────────────────────────────────────────────────

/// Monotonic trusted time, seeded and refreshed from an external source.
pub struct TimeAuthority {
    clock: Arc<dyn WallClock>,
    /// Highest time ever handed out or synced; `None` until the first sync.
    floor: Option<Timestamp>,
    /// `external - local` at the most recent sync.
    offset: i64,
}

impl TimeAuthority {
    pub fn new(clock: Arc<dyn WallClock>) -> Self {
        Self {
            clock,
            floor: None,
            offset: 0,
        }
    }

    /// Return the current trusted time, or `None` before the first sync.
    ///
    /// Each call ratchets the stored floor up to the corrected local clock.
    pub fn get_time(&mut self) -> Option<Timestamp> {
        let floor = self.floor?;
        let now = floor.max(self.corrected_now());
        self.floor = Some(now);
        Some(now)
    }

    /// Accept `external_time` from the time source and mark synchronized.
    pub fn sync(&mut self, external_time: Timestamp) {
        let local = self.clock.now_secs();
        self.offset = external_time as i64 - local as i64;

        let floor = match self.floor {
            Some(floor) if floor > external_time => {
                warn!(
                    floor,
                    external_time,
                    "time source reported an earlier time; trusted time held"
                );
                floor
            }
            Some(_) => external_time,
            None => {
                info!(external_time, "trusted time synchronized");
                external_time
            }
        };
        self.floor = Some(floor);
    }

    pub fn is_synchronized(&self) -> bool {
        self.floor.is_some()
    }

    fn corrected_now(&self) -> Timestamp {
        self.clock.now_secs().saturating_add_signed(self.offset)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SharedTimeAuthority
// ────────────────────────────────────────────────────────────────────────────

/// Cloneable handle to one [`TimeAuthority`] shared between the refresh task
/// and the decision engine.
///
/// Each call takes the lock for a single bounded update and never across an
/// `.await`.
#[derive(Clone)]
pub struct SharedTimeAuthority {
    inner: Arc<Mutex<TimeAuthority>>,
}

impl SharedTimeAuthority {
    pub fn new(authority: TimeAuthority) -> Self {
        Self {
            inner: Arc::new(Mutex::new(authority)),
        }
    }

    /// See [`TimeAuthority::get_time`].
    pub fn get_time(&self) -> Option<Timestamp> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_time()
    }

    /// See [`TimeAuthority::sync`].
    pub fn sync(&self, external_time: Timestamp) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sync(external_time);
    }

    pub fn is_synchronized(&self) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_synchronized()
    }
}
