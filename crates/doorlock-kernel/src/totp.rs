//! [`TotpVerifier`] – RFC 6238 code verification with a symmetric skew
//! window.
//!
//! Codes are HMAC-SHA1 based (the authenticator-app default).  A submitted
//! code is accepted when it matches the code of any time step within
//! `deviation` steps of trusted time, in either direction.  Comparison is
//! constant-time via the `subtle` crate.

use std::fmt;

use doorlock_types::{DoorError, Timestamp};
use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, Secret, TOTP};
use zeroize::Zeroizing;

/// Shared secret for one identity, wiped from memory on drop.
#[derive(Clone)]
pub struct TotpSecret {
    bytes: Zeroizing<Vec<u8>>,
}

impl TotpSecret {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Zeroizing::new(bytes),
        }
    }

    /// Decode a Base32 (RFC 4648) secret as shown by authenticator apps.
    ///
    /// Whitespace and trailing `=` padding are ignored and lower case is
    /// accepted.
    ///
    /// # Errors
    ///
    /// Returns [`DoorError::Config`] for an empty or malformed secret.
    pub fn from_base32(encoded: &str) -> Result<Self, DoorError> {
        let normalized: String = encoded
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .trim_end_matches('=')
            .to_ascii_uppercase();
        if normalized.is_empty() {
            return Err(DoorError::Config("empty TOTP secret".to_string()));
        }
        let bytes = Secret::Encoded(normalized)
            .to_bytes()
            .map_err(|e| DoorError::Config(format!("invalid base32 TOTP secret: {e:?}")))?;
        Ok(Self::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for TotpSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TotpSecret(<redacted>)")
    }
}

// ────────────────────────────────────────────────────────────────────────────
// TotpVerifier
// ────────────────────────────────────────────────────────────────────────────

/// Verifies submitted codes against trusted time.
#[derive(Debug, Clone, Copy)]
pub struct TotpVerifier {
    digits: usize,
    step_secs: u64,
    deviation: u32,
}

impl TotpVerifier {
    /// `digits` per code, `step_secs` per time step, and `deviation` accepted
    /// steps either side of trusted time.
    pub fn new(digits: usize, step_secs: u64, deviation: u32) -> Self {
        Self {
            digits,
            step_secs,
            deviation,
        }
    }

    /// `true` if `code` matches any step in `[time - D*step, time + D*step]`.
    ///
    /// A code of the wrong length is rejected before any HMAC is computed.
    /// Window positions before the epoch are skipped.
    pub fn verify(&self, time: Timestamp, secret: &TotpSecret, code: &str) -> bool {
        if code.len() != self.digits {
            return false;
        }
        let totp = self.totp(secret);
        let step = self.step_secs as i64;
        let deviation = i64::from(self.deviation);

        let mut accepted = false;
        for k in -deviation..=deviation {
            let Some(at) = time.checked_add_signed(k * step) else {
                continue;
            };
            let expected = totp.generate(at);
            accepted |= bool::from(code.as_bytes().ct_eq(expected.as_bytes()));
        }
        accepted
    }

    /// The code valid at `time`.
    pub fn code_at(&self, time: Timestamp, secret: &TotpSecret) -> String {
        self.totp(secret).generate(time)
    }

    fn totp(&self, secret: &TotpSecret) -> TOTP {
        // Legacy 80-bit authenticator secrets are below the RFC 4226
        // recommended length, so the unchecked constructor is used; the
        // window is applied here rather than through the crate's skew.
        TOTP::new_unchecked(
            Algorithm::SHA1,
            self.digits,
            0,
            self.step_secs,
            secret.as_bytes().to_vec(),
        )
    }
}
