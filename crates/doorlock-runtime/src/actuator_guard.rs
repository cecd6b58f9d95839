//! [`ActuatorGuard`] – exclusive, self-expiring control of the unlock output.
//!
//! [`ActuatorGuard::activate`] energises the [`Relay`] and spawns a timer task
//! that holds a [`Release`] token for the configured hold duration.  The
//! token relocks the door and clears the `active` flag when it is dropped,
//! which happens on normal expiry and equally when the task is cancelled or
//! the runtime shuts down.  A second activation while one is in flight is a
//! silent no-op: it neither queues nor extends the cycle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use doorlock_hal::Relay;
use doorlock_kernel::Unlock;
use doorlock_types::DoorError;
use tokio::runtime::Handle;
use tracing::{debug, error, info};

struct GuardInner {
    relay: Mutex<Box<dyn Relay>>,
    active: AtomicBool,
}

impl GuardInner {
    fn drive(&self, energised: bool) -> Result<(), DoorError> {
        self.relay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_state(energised)
    }
}

/// Relocks the door and clears the active flag on drop.
struct Release {
    inner: Arc<GuardInner>,
}

impl Drop for Release {
    fn drop(&mut self) {
        if let Err(e) = self.inner.drive(false) {
            error!(error = %e, "failed to relock door");
        } else {
            info!("door locked");
        }
        self.inner.active.store(false, Ordering::Release);
    }
}

/// Cloneable handle to the single unlock output.
#[derive(Clone)]
pub struct ActuatorGuard {
    inner: Arc<GuardInner>,
    hold: Duration,
}

impl ActuatorGuard {
    /// Take ownership of `relay`, drive it to the locked state, and hold it
    /// energised for `hold` on each activation.
    ///
    /// # Errors
    ///
    /// Returns the relay's [`DoorError`] if the initial lock command fails.
    pub fn new(mut relay: Box<dyn Relay>, hold: Duration) -> Result<Self, DoorError> {
        relay.set_state(false)?;
        Ok(Self {
            inner: Arc::new(GuardInner {
                relay: Mutex::new(relay),
                active: AtomicBool::new(false),
            }),
            hold,
        })
    }

    /// Unlock the door for the hold duration.
    ///
    /// Returns `true` when a new cycle was started and `false` when one was
    /// already running or the output could not be energised.  Must be called
    /// from within a Tokio runtime; without one the door is relocked
    /// immediately.
    pub fn activate(&self) -> bool {
        if self
            .inner
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("unlock already in progress");
            return false;
        }
        let release = Release {
            inner: Arc::clone(&self.inner),
        };

        if let Err(e) = self.inner.drive(true) {
            error!(error = %e, "failed to energise door strike");
            drop(release);
            return false;
        }

        let hold = self.hold;
        match Handle::try_current() {
            Ok(handle) => {
                info!(hold_ms = hold.as_millis() as u64, "door unlocked");
                handle.spawn(async move {
                    let _release = release;
                    tokio::time::sleep(hold).await;
                });
                true
            }
            Err(_) => {
                error!("no async runtime for relock timer; relocking immediately");
                drop(release);
                false
            }
        }
    }

    /// `true` while an unlock cycle is in flight.
    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }
}

impl Unlock for ActuatorGuard {
    fn unlock(&self) {
        self.activate();
    }
}
