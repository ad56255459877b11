//! Employee PIN credentials.
//!
//! New records hold an argon2id PHC string. Records imported from the old
//! system hold the plain PIN; those are compared in constant time and
//! replaced with a hash after the first successful match.

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use timeclock_crypto::constant_time_str_eq;
use tracing::warn;

const PHC_PREFIX: &str = "$argon2";

/// A stored credential, classified by format.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    Hashed(&'a str),
    Legacy(&'a str),
}

impl std::fmt::Debug for Credential<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hashed(_) => f.write_str("Credential::Hashed"),
            Self::Legacy(_) => f.write_str("Credential::Legacy([REDACTED])"),
        }
    }
}

impl<'a> Credential<'a> {
    pub fn parse(stored: &'a str) -> Self {
        if stored.starts_with(PHC_PREFIX) {
            Self::Hashed(stored)
        } else {
            Self::Legacy(stored)
        }
    }

    /// Check a candidate PIN. A malformed hash never matches.
    pub fn verify(&self, pin: &str) -> bool {
        match self {
            Self::Hashed(phc) => match PasswordHash::new(phc) {
                Ok(parsed) => Argon2::default()
                    .verify_password(pin.as_bytes(), &parsed)
                    .is_ok(),
                Err(e) => {
                    warn!(error = %e, "Stored PIN hash is malformed");
                    false
                }
            },
            Self::Legacy(plain) => constant_time_str_eq(plain, pin),
        }
    }

    pub const fn needs_upgrade(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }
}

/// Hash a PIN using argon2id with a random salt.
pub fn hash_pin(pin: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(pin.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Hash a PIN at minimal argon2 cost, for tests only.
///
/// Verification reads the cost from the PHC string, so checking these is
/// just as cheap.
#[cfg(any(test, feature = "test-utils"))]
pub fn hash_pin_fast(pin: &str) -> Result<String, argon2::password_hash::Error> {
    let params = argon2::Params::new(8, 1, 1, None)?;
    let argon = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
    let salt = SaltString::generate(&mut OsRng);
    Ok(argon.hash_password(pin.as_bytes(), &salt)?.to_string())
}
