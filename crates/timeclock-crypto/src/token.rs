//! Device token generation, hashing and constant-time comparison.

use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Raw token size in bytes before hex encoding.
pub const TOKEN_BYTES: usize = 32;

/// Generate a fresh random device token (64 hex chars).
pub fn generate_device_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let token = hex::encode(bytes);
    bytes.zeroize();
    token
}

/// Hash a token for storage (we don't store raw tokens).
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Compare two strings without leaking the position of the first mismatch.
///
/// Length differences return early; lengths of configured secrets are not
/// considered sensitive.
pub fn constant_time_str_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && bool::from(a.as_bytes().ct_eq(b.as_bytes()))
}
