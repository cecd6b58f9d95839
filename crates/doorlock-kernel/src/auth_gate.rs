//! [`AuthDecisionEngine`] – the single decision point for unlock requests.
//!
//! Every request from the boundary passes through
//! [`AuthDecisionEngine::decide`], which applies four checks in a fixed
//! order, each one short-circuiting:
//!
//! 1. **Identity** – the identity must resolve to a configured secret, else
//!    [`Outcome::UnknownIdentity`].  Nothing about time or lockouts is
//!    revealed to unknown callers.
//! 2. **Trusted time** – the [`SharedTimeAuthority`] must be synchronized,
//!    else [`Outcome::TimeNotSynchronized`].
//! 3. **Lockout** – the identity must not be cooling down, else
//!    [`Outcome::RateLimited`].  The code is not even looked at.
//! 4. **Code** – the [`TotpVerifier`] must accept the code, else a failure is
//!    recorded in the [`LockoutRegistry`] and [`Outcome::WrongPassword`] is
//!    returned.
//!
//! Only when all four pass is the [`Unlock`] hook triggered and
//! [`Outcome::Ok`] returned.
//!
//! The lockout guard is held from step 3 through failure recording, so two
//! concurrent requests for the same identity cannot interleave between the
//! check and the update.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use doorlock_kernel::{
//!     AuthDecisionEngine, IdentityTable, ManualClock, NoopUnlock,
//!     SharedTimeAuthority, TimeAuthority, TotpSecret, TotpVerifier,
//! };
//! use doorlock_types::Outcome;
//!
//! let mut identities = IdentityTable::new();
//! identities.insert("alice", TotpSecret::from_base32("GEZDGNBVGY3TQOJQ").unwrap());
//!
//! let clock = Arc::new(ManualClock::new(0));
//! let time = SharedTimeAuthority::new(TimeAuthority::new(clock));
//! let verifier = TotpVerifier::new(6, 30, 1);
//! let engine = AuthDecisionEngine::new(identities, verifier, 30, time.clone(), Arc::new(NoopUnlock));
//!
//! assert_eq!(engine.decide("bob", "123456"), Outcome::UnknownIdentity);
//! assert_eq!(engine.decide("alice", "123456"), Outcome::TimeNotSynchronized);
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use doorlock_types::Outcome;
use tracing::{debug, info, warn};

use crate::lockout::LockoutRegistry;
use crate::time_authority::SharedTimeAuthority;
use crate::totp::{TotpSecret, TotpVerifier};

/// Hook fired once a request has been authorized.
pub trait Unlock: Send + Sync {
    fn unlock(&self);
}

/// An [`Unlock`] that does nothing; for dry runs and examples.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUnlock;

impl Unlock for NoopUnlock {
    fn unlock(&self) {}
}

/// Static identity → secret table loaded at startup.
#[derive(Debug, Default, Clone)]
pub struct IdentityTable {
    secrets: HashMap<String, TotpSecret>,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `identity`.  A later insert for the same identity replaces the
    /// earlier secret.
    pub fn insert(&mut self, identity: impl Into<String>, secret: TotpSecret) {
        self.secrets.insert(identity.into(), secret);
    }

    pub fn get(&self, identity: &str) -> Option<&TotpSecret> {
        self.secrets.get(identity)
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// AuthDecisionEngine
// ────────────────────────────────────────────────────────────────────────────

pub struct AuthDecisionEngine {
    identities: IdentityTable,
    verifier: TotpVerifier,
    time: SharedTimeAuthority,
    lockouts: Mutex<LockoutRegistry>,
    unlock: Arc<dyn Unlock>,
}

impl AuthDecisionEngine {
    pub fn new(
        identities: IdentityTable,
        verifier: TotpVerifier,
        lockout_secs: u64,
        time: SharedTimeAuthority,
        unlock: Arc<dyn Unlock>,
    ) -> Self {
        Self {
            identities,
            verifier,
            time,
            lockouts: Mutex::new(LockoutRegistry::new(lockout_secs)),
            unlock,
        }
    }

    /// Decide a single unlock request.
    pub fn decide(&self, identity: &str, code: &str) -> Outcome {
        let outcome = self.evaluate(identity, code);
        match outcome {
            Outcome::Ok => {
                info!(identity, "access granted");
                self.unlock.unlock();
            }
            Outcome::WrongPassword | Outcome::RateLimited => {
                warn!(identity, ?outcome, "access denied");
            }
            Outcome::UnknownIdentity | Outcome::TimeNotSynchronized => {
                debug!(identity, ?outcome, "access denied");
            }
        }
        outcome
    }

    /// Current lockout deadline for `identity`, if any.
    pub fn lockout_deadline(&self, identity: &str) -> Option<u64> {
        self.lockouts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .deadline(identity)
    }

    fn evaluate(&self, identity: &str, code: &str) -> Outcome {
        let Some(secret) = self.identities.get(identity) else {
            return Outcome::UnknownIdentity;
        };
        let Some(now) = self.time.get_time() else {
            return Outcome::TimeNotSynchronized;
        };

        let mut lockouts = self.lockouts.lock().unwrap_or_else(PoisonError::into_inner);
        if lockouts.is_locked(identity, now) {
            return Outcome::RateLimited;
        }
        if !self.verifier.verify(now, secret, code) {
            lockouts.record_failure(identity, now);
            return Outcome::WrongPassword;
        }
        Outcome::Ok
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::time_authority::{ManualClock, TimeAuthority};

    const SECRET_B32: &str = "GEZDGNBVGY3TQOJQGEZDGNBVGY3TQOJQ";
    const LOCKOUT: u64 = 30;

    #[derive(Default)]
    struct CountingUnlock(AtomicUsize);

    impl Unlock for CountingUnlock {
        fn unlock(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        clock: Arc<ManualClock>,
        time: SharedTimeAuthority,
        unlocks: Arc<CountingUnlock>,
        verifier: TotpVerifier,
        engine: AuthDecisionEngine,
    }

    impl Fixture {
        fn new() -> Self {
            let mut identities = IdentityTable::new();
            identities.insert("alice", TotpSecret::from_base32(SECRET_B32).unwrap());
            let clock = Arc::new(ManualClock::new(0));
            let time = SharedTimeAuthority::new(TimeAuthority::new(clock.clone()));
            let unlocks = Arc::new(CountingUnlock::default());
            let verifier = TotpVerifier::new(6, 30, 5);
            let engine = AuthDecisionEngine::new(
                identities,
                verifier,
                LOCKOUT,
                time.clone(),
                unlocks.clone(),
            );
            Self {
                clock,
                time,
                unlocks,
                verifier,
                engine,
            }
        }

        fn valid_code(&self) -> String {
            let now = self.time.get_time().expect("synchronized");
            let secret = TotpSecret::from_base32(SECRET_B32).unwrap();
            self.verifier.code_at(now, &secret)
        }

        fn wrong_code(&self) -> String {
            let now = self.time.get_time().expect("synchronized");
            let secret = TotpSecret::from_base32(SECRET_B32).unwrap();
            (0..1_000_000)
                .map(|n| format!("{n:06}"))
                .find(|c| !self.verifier.verify(now, &secret, c))
                .expect("some code outside the window")
        }

        fn unlocks(&self) -> usize {
            self.unlocks.0.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn unknown_identity_wins_over_everything() {
        let f = Fixture::new();
        assert_eq!(f.engine.decide("bob", ""), Outcome::UnknownIdentity);
        f.time.sync(1_700_000_000);
        assert_eq!(f.engine.decide("bob", "123456"), Outcome::UnknownIdentity);
        assert_eq!(f.engine.decide("bob", "x"), Outcome::UnknownIdentity);
        assert_eq!(f.unlocks(), 0);
    }

    #[test]
    fn unsynchronized_time_rejects_known_identity() {
        let f = Fixture::new();
        assert_eq!(f.engine.decide("alice", "123456"), Outcome::TimeNotSynchronized);
        assert_eq!(f.engine.lockout_deadline("alice"), None);
    }

    #[test]
    fn valid_code_unlocks() {
        let f = Fixture::new();
        f.time.sync(1_700_000_000);
        let code = f.valid_code();
        assert_eq!(f.engine.decide("alice", &code), Outcome::Ok);
        assert_eq!(f.unlocks(), 1);
    }

    #[test]
    fn wrong_code_then_correct_code_is_rate_limited() {
        let f = Fixture::new();
        f.time.sync(1_700_000_000);
        let wrong = f.wrong_code();
        assert_eq!(f.engine.decide("alice", &wrong), Outcome::WrongPassword);
        assert_eq!(f.engine.lockout_deadline("alice"), Some(1_700_000_000 + LOCKOUT));

        f.clock.advance(LOCKOUT - 1);
        let good = f.valid_code();
        assert_eq!(f.engine.decide("alice", &good), Outcome::RateLimited);
        assert_eq!(f.unlocks(), 0);

        f.clock.advance(2);
        let good = f.valid_code();
        assert_eq!(f.engine.decide("alice", &good), Outcome::Ok);
        assert_eq!(f.unlocks(), 1);
    }

    #[test]
    fn wrong_length_code_counts_as_failure() {
        let f = Fixture::new();
        f.time.sync(1_700_000_000);
        assert_eq!(f.engine.decide("alice", "12"), Outcome::WrongPassword);
        assert!(f.engine.lockout_deadline("alice").is_some());
    }

    #[test]
    fn rate_limited_attempt_does_not_extend_deadline() {
        let f = Fixture::new();
        f.time.sync(1_700_000_000);
        let wrong = f.wrong_code();
        f.engine.decide("alice", &wrong);
        f.clock.advance(10);
        assert_eq!(f.engine.decide("alice", &wrong), Outcome::RateLimited);
        assert_eq!(f.engine.lockout_deadline("alice"), Some(1_700_000_000 + LOCKOUT));
    }
}
