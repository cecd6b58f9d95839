//! End-to-end unlock scenarios through a fully assembled [`DeviceContext`].

use std::sync::Arc;
use std::time::Duration;

use doorlock_hal::sim::{SimRelay, SimRelayObserver};
use doorlock_kernel::{IdentityTable, ManualClock, TotpSecret, TotpVerifier};
use doorlock_runtime::{DeviceConfig, DeviceContext};
use doorlock_types::{Outcome, StatusLine};

const ALICE_SECRET: &str = "JBSWY3DPEHPK3PXP";
const SYNCED_AT: u64 = 1_700_000_000;
const HOLD: Duration = Duration::from_millis(50);

struct Device {
    clock: Arc<ManualClock>,
    ctx: DeviceContext,
    strike: SimRelayObserver,
    verifier: TotpVerifier,
    secret: TotpSecret,
}

impl Device {
    fn new() -> Self {
        let mut identities = IdentityTable::new();
        identities.insert("alice", TotpSecret::from_base32(ALICE_SECRET).unwrap());
        let config = DeviceConfig {
            identities,
            hold: HOLD,
            ..DeviceConfig::default()
        };

        let clock = Arc::new(ManualClock::new(0));
        let relay = SimRelay::new("door_strike");
        let strike = relay.observer();
        let ctx = DeviceContext::new(config, relay, clock.clone()).unwrap();
        Self {
            clock,
            ctx,
            strike,
            verifier: TotpVerifier::new(6, 30, 5),
            secret: TotpSecret::from_base32(ALICE_SECRET).unwrap(),
        }
    }

    fn synced() -> Self {
        let device = Self::new();
        device.ctx.time().sync(SYNCED_AT);
        device
    }

    fn now(&self) -> u64 {
        self.ctx.time().get_time().unwrap()
    }

    fn valid_code(&self) -> String {
        self.verifier.code_at(self.now(), &self.secret)
    }

    /// A six-digit code outside the accepted window at the current time.
    fn invalid_code(&self) -> String {
        let now = self.now();
        (0..1_000_000u32)
            .map(|n| format!("{n:06}"))
            .find(|code| !self.verifier.verify(now, &self.secret, code))
            .unwrap()
    }
}

// ── Scenario A ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn valid_code_unlocks_and_relocks() {
    let device = Device::synced();
    let query = format!("alice:{}", device.valid_code());

    assert_eq!(device.ctx.respond(&query, None), Outcome::Ok.status_line());
    assert!(device.strike.is_energised());

    tokio::time::sleep(HOLD * 3).await;
    assert!(!device.strike.is_energised());
    assert_eq!(device.strike.activations(), 1);
}

#[tokio::test]
async fn form_query_unlocks() {
    let device = Device::synced();
    let query = format!("id=alice&password={}", device.valid_code());
    let line = device.ctx.respond(&query, None);
    assert_eq!((line.code, line.reason), (200, "OK"));
}

// ── Scenario B ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn wrong_code_then_lockout() {
    let device = Device::synced();

    let wrong = device.invalid_code();
    let line = device.ctx.respond(&format!("alice:{wrong}"), None);
    assert_eq!((line.code, line.reason), (403, "Wrong-Password"));

    device.clock.advance(10);
    let line = device.ctx.respond(&format!("alice:{}", device.valid_code()), None);
    assert_eq!((line.code, line.reason), (429, "Rate-Limited"));
    assert!(!device.strike.is_energised());

    device.clock.advance(21);
    let line = device.ctx.respond(&format!("alice:{}", device.valid_code()), None);
    assert_eq!(line.code, 200);
}

#[tokio::test]
async fn lockout_deadline_is_overwritten_by_later_failure() {
    let device = Device::synced();
    let wrong = device.invalid_code();

    device.ctx.decide("alice", &wrong);
    let first = device.ctx.engine().lockout_deadline("alice").unwrap();

    device.clock.advance(31);
    let wrong = device.invalid_code();
    assert_eq!(device.ctx.decide("alice", &wrong), Outcome::WrongPassword);
    let second = device.ctx.engine().lockout_deadline("alice").unwrap();

    assert_eq!(first, SYNCED_AT + 30);
    assert_eq!(second, SYNCED_AT + 31 + 30);
}

// ── Scenario C ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_identity_regardless_of_code() {
    let device = Device::synced();
    let valid = device.valid_code();
    for query in [format!("bob:{valid}"), "bob:000000".to_string(), "bob:".to_string()] {
        let line = device.ctx.respond(&query, None);
        assert_eq!((line.code, line.reason), (404, "Unknown-Id"));
    }
    assert_eq!(device.strike.activations(), 0);
}

// ── Scenario D ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn unsynchronized_device_refuses_known_identity() {
    let device = Device::new();
    let line = device.ctx.respond("alice:123456", None);
    assert_eq!((line.code, line.reason), (503, "Time-Not-Synchronized"));
    assert_eq!(device.ctx.engine().lockout_deadline("alice"), None);
}

// ── Request envelope ─────────────────────────────────────────────────────────

#[tokio::test]
async fn body_content_type_is_denied_without_deciding() {
    let device = Device::synced();
    let query = format!("alice:{}", device.valid_code());
    let line = device
        .ctx
        .respond(&query, Some("application/x-www-form-urlencoded"));
    assert_eq!(line, StatusLine::REQUEST_DENIED);
    assert_eq!(device.strike.activations(), 0);
}

#[tokio::test]
async fn rollback_does_not_reopen_an_expired_window() {
    let device = Device::synced();
    device.clock.advance(600);
    let late = device.now();

    device.ctx.time().sync(SYNCED_AT);
    assert!(device.now() >= late);
}
