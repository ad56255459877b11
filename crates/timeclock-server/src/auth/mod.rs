//! Authentication module for the Timeclock server.
//!
//! Provides employee PIN credential verification and hashing.

pub mod credential;

pub use credential::{Credential, hash_pin};
#[cfg(any(test, feature = "test-utils"))]
pub use credential::hash_pin_fast;
