//! Timeclock Crypto Library
//!
//! Primitives shared by the server and the kiosk.
//!
//! ## Crypto primitives
//!
//! - **Device token**: 32 random bytes, hex encoded; the server keeps only its SHA-256
//! - **PIN at rest**: argon2id(token || kiosk code, local salt) → ChaCha20-Poly1305 key

pub mod error;
pub mod pin_cipher;
pub mod salt;
pub mod token;

pub use error::CryptoError;
pub use pin_cipher::{KdfParams, NONCE_SIZE, PinCipher};
pub use salt::{LocalSalt, SALT_SIZE};
pub use token::{constant_time_str_eq, generate_device_token, hash_token};
