//! In-process simulated drivers for headless runs and tests.
//!
//! Every simulated driver hands out a cheap observer/handle that shares its
//! state, so a test can box the driver, give it to the core, and still
//! inspect or steer what the "hardware" sees.
//!
//! # Example
//!
//! ```rust
//! use doorlock_hal::relay::Relay;
//! use doorlock_hal::sim::SimRelay;
//!
//! let mut strike = SimRelay::new("door_strike");
//! let observer = strike.observer();
//!
//! strike.set_state(true).unwrap();
//! assert!(observer.is_energised());
//! assert_eq!(observer.activations(), 1);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use doorlock_types::{DoorError, Timestamp};

use crate::link::NetworkLink;
use crate::relay::Relay;
use crate::time_source::TimeSource;
use crate::watchdog::HardwareWatchdog;

// ────────────────────────────────────────────────────────────────────────────
// Relay
// ────────────────────────────────────────────────────────────────────────────

/// A simulated unlock output that records its state and how often it was
/// energised.
pub struct SimRelay {
    id: String,
    energised: Arc<AtomicBool>,
    activations: Arc<AtomicUsize>,
    fail_energise: bool,
}

impl SimRelay {
    /// Create a simulated relay that always accepts commands.
    pub fn new(id: impl Into<String>) -> Box<Self> {
        Box::new(Self {
            id: id.into(),
            energised: Arc::new(AtomicBool::new(false)),
            activations: Arc::new(AtomicUsize::new(0)),
            fail_energise: false,
        })
    }

    /// Create a simulated relay whose energise command always faults.
    /// Releasing it still succeeds.
    pub fn failing(id: impl Into<String>) -> Box<Self> {
        let mut relay = Self::new(id);
        relay.fail_energise = true;
        relay
    }

    /// Return an observer sharing this relay's state.
    pub fn observer(&self) -> SimRelayObserver {
        SimRelayObserver {
            energised: Arc::clone(&self.energised),
            activations: Arc::clone(&self.activations),
        }
    }
}

impl Relay for SimRelay {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_state(&mut self, active: bool) -> Result<(), DoorError> {
        if active && self.fail_energise {
            return Err(DoorError::HardwareFault {
                component: self.id.clone(),
                details: "simulated energise failure".to_string(),
            });
        }
        if active {
            self.activations.fetch_add(1, Ordering::SeqCst);
        }
        self.energised.store(active, Ordering::SeqCst);
        Ok(())
    }

    fn state(&self) -> bool {
        self.energised.load(Ordering::SeqCst)
    }
}

/// Read-only view of a [`SimRelay`].
#[derive(Clone)]
pub struct SimRelayObserver {
    energised: Arc<AtomicBool>,
    activations: Arc<AtomicUsize>,
}

impl SimRelayObserver {
    /// `true` while the simulated door is unlocked.
    pub fn is_energised(&self) -> bool {
        self.energised.load(Ordering::SeqCst)
    }

    /// Number of times the output was driven to the energised state.
    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::SeqCst)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Hardware watchdog
// ────────────────────────────────────────────────────────────────────────────

/// A simulated hardware watchdog that counts feeds.
#[derive(Default)]
pub struct SimWatchdog {
    feeds: Arc<AtomicUsize>,
}

impl SimWatchdog {
    pub fn new() -> Box<Self> {
        Box::default()
    }

    pub fn observer(&self) -> SimWatchdogObserver {
        SimWatchdogObserver {
            feeds: Arc::clone(&self.feeds),
        }
    }
}

impl HardwareWatchdog for SimWatchdog {
    fn feed(&mut self) -> Result<(), DoorError> {
        self.feeds.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Read-only view of a [`SimWatchdog`].
#[derive(Clone)]
pub struct SimWatchdogObserver {
    feeds: Arc<AtomicUsize>,
}

impl SimWatchdogObserver {
    /// Total number of feeds delivered so far.
    pub fn feeds(&self) -> usize {
        self.feeds.load(Ordering::SeqCst)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Time source
// ────────────────────────────────────────────────────────────────────────────

/// A scripted time source.
///
/// Responses pushed through the [`SimTimeHandle`] are returned in order.
/// Once the script is exhausted every fetch fails with a transport error.
#[derive(Default)]
pub struct SimTimeSource {
    script: Arc<Mutex<VecDeque<Result<Timestamp, DoorError>>>>,
    fetches: Arc<AtomicUsize>,
}

impl SimTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> SimTimeHandle {
        SimTimeHandle {
            script: Arc::clone(&self.script),
            fetches: Arc::clone(&self.fetches),
        }
    }
}

#[async_trait]
impl TimeSource for SimTimeSource {
    async fn fetch_external_time(&self) -> Result<Timestamp, DoorError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self
            .script
            .lock()
            .map_err(|_| DoorError::Transport("sim time script poisoned".to_string()))?
            .pop_front();
        next.unwrap_or_else(|| Err(DoorError::Transport("no scripted response".to_string())))
    }
}

/// Steers a [`SimTimeSource`].
#[derive(Clone)]
pub struct SimTimeHandle {
    script: Arc<Mutex<VecDeque<Result<Timestamp, DoorError>>>>,
    fetches: Arc<AtomicUsize>,
}

impl SimTimeHandle {
    /// Queue a successful fetch returning `time`.
    pub fn push_time(&self, time: Timestamp) {
        self.push(Ok(time));
    }

    /// Queue a failed fetch.
    pub fn push_error(&self, err: DoorError) {
        self.push(Err(err));
    }

    /// Number of fetches attempted so far.
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn push(&self, response: Result<Timestamp, DoorError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(response);
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Network link
// ────────────────────────────────────────────────────────────────────────────

/// A simulated network link whose state is flipped through a [`SimLinkHandle`].
pub struct SimLink {
    connected: Arc<AtomicBool>,
    reconnects: Arc<AtomicUsize>,
}

impl SimLink {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(connected)),
            reconnects: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn handle(&self) -> SimLinkHandle {
        SimLinkHandle {
            connected: Arc::clone(&self.connected),
            reconnects: Arc::clone(&self.reconnects),
        }
    }
}

impl NetworkLink for SimLink {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn reconnect(&self) -> Result<(), DoorError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Steers a [`SimLink`].
#[derive(Clone)]
pub struct SimLinkHandle {
    connected: Arc<AtomicBool>,
    reconnects: Arc<AtomicUsize>,
}

impl SimLinkHandle {
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn reconnects(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
