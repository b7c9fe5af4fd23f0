//! Admin credential verification.
//!
//! The connection handler only sees the [`CredentialVerifier`] trait; the
//! server binary wires in a [`StaticPasswordVerifier`] built from the
//! configured admin password.  Tests substitute `MockCredentialVerifier`.
//!
//! # Timing
//!
//! [`constant_time_eq`] touches every byte of the submitted password no matter
//! where the first mismatch is, and never iterates over the secret's length.
//! Response time therefore reveals neither the length of the stored password
//! nor how long a matching prefix the attempt had.

/// Checks a submitted admin password.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialVerifier: Send + Sync {
    /// Returns `true` if `password` matches the admin credential.
    fn verify(&self, password: &[u8]) -> bool;
}

/// Verifies against a single password held in memory.
pub struct StaticPasswordVerifier {
    secret: Vec<u8>,
}

impl StaticPasswordVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl CredentialVerifier for StaticPasswordVerifier {
    fn verify(&self, password: &[u8]) -> bool {
        constant_time_eq(password, &self.secret)
    }
}

impl std::fmt::Debug for StaticPasswordVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticPasswordVerifier")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Compares `candidate` against `secret` in time that depends only on
/// `candidate.len()`.
pub fn constant_time_eq(candidate: &[u8], secret: &[u8]) -> bool {
    let mut diff = candidate.len() ^ secret.len();
    for (i, &byte) in candidate.iter().enumerate() {
        let expected = secret.get(i).copied().unwrap_or(0);
        diff |= usize::from(byte ^ expected);
    }
    diff == 0
}

// ── Tests ─────────────────────────────────────────────────────────────────────
