//! [`LockoutRegistry`] – per-identity cool-down after a failed attempt.
//!
//! A failure sets the identity's deadline to `now + lockout_secs`,
//! overwriting whatever deadline was there.  Consecutive failures therefore
//! do not compound: only the most recent one counts.  Because `now` is
//! trusted (monotonic) time, an overwrite can never move a deadline earlier.

use std::collections::HashMap;

use doorlock_types::Timestamp;

#[derive(Debug)]
pub struct LockoutRegistry {
    lockout_secs: u64,
    deadlines: HashMap<String, Timestamp>,
}

impl LockoutRegistry {
    pub fn new(lockout_secs: u64) -> Self {
        Self {
            lockout_secs,
            deadlines: HashMap::new(),
        }
    }

    /// `true` while `now <= deadline(identity)`.  Unknown identities are
    /// never locked.
    pub fn is_locked(&self, identity: &str, now: Timestamp) -> bool {
        self.deadlines
            .get(identity)
            .is_some_and(|&deadline| now <= deadline)
    }

    /// Start a fresh cool-down for `identity` ending at `now + lockout_secs`.
    pub fn record_failure(&mut self, identity: &str, now: Timestamp) {
        let deadline = now.saturating_add(self.lockout_secs);
        self.deadlines.insert(identity.to_string(), deadline);
    }

    pub fn deadline(&self, identity: &str) -> Option<Timestamp> {
        self.deadlines.get(identity).copied()
    }
}
