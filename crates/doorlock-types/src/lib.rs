use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wall-clock time in whole seconds since the Unix epoch.
pub type Timestamp = u64;

/// Result of evaluating a single unlock request.
///
/// Every variant is a first-class answer surfaced to the caller, never an
/// error.  The request boundary renders it with [`Outcome::status_line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// The code was accepted and the door was (or already is) unlocked.
    Ok,
    /// The identity is not present in the configured secret table.
    UnknownIdentity,
    /// No trusted time is available yet, so no code can be checked.
    TimeNotSynchronized,
    /// The identity is cooling down after a recent failure.
    RateLimited,
    /// The submitted code did not match any step in the accepted window.
    WrongPassword,
}

impl Outcome {
    /// HTTP status and reason phrase for this outcome.
    pub fn status_line(&self) -> StatusLine {
        match self {
            Outcome::Ok => StatusLine::new(200, "OK"),
            Outcome::UnknownIdentity => StatusLine::new(404, "Unknown-Id"),
            Outcome::TimeNotSynchronized => StatusLine::new(503, "Time-Not-Synchronized"),
            Outcome::RateLimited => StatusLine::new(429, "Rate-Limited"),
            Outcome::WrongPassword => StatusLine::new(403, "Wrong-Password"),
        }
    }
}

/// A status code paired with the literal reason phrase sent to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLine {
    pub code: u16,
    pub reason: &'static str,
}

impl StatusLine {
    /// Returned for requests that cannot be parsed into an identity and code.
    pub const REQUEST_DENIED: StatusLine = StatusLine::new(415, "Request-Denied");

    /// Returned for any method other than `POST`.
    pub const METHOD_NOT_ALLOWED: StatusLine = StatusLine::new(405, "Method-Not-Allowed");

    pub const fn new(code: u16, reason: &'static str) -> Self {
        Self { code, reason }
    }
}

/// Global error type spanning transport failures, hardware faults and
/// configuration problems.
///
/// Domain rejections (wrong code, lockout, ...) are [`Outcome`]s and never
/// appear here.
#[derive(Error, Debug)]
pub enum DoorError {
    #[error("Transport Error: {0}")]
    Transport(String),

    #[error("Resource Exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Bind Error on {addr}: {details}")]
    Bind { addr: String, details: String },

    #[error("Background task '{task}' exited: {details}")]
    TaskExited { task: String, details: String },
}

impl DoorError {
    /// `true` for conditions that must end the process so the device restarts
    /// from a clean state.  Everything else is retried or reported locally.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DoorError::ResourceExhausted(_) | DoorError::TaskExited { .. }
        )
    }
}
