//! Timeclock Core Library
//!
//! Shared functionality for the Timeclock server and kiosk:
//! - Error-code taxonomy and retry classification
//! - Tunable settings snapshot
//! - JSON wire types
//! - `SQLite` helpers and configuration loading

pub mod codes;
pub mod config;
pub mod db;
pub mod error;
pub mod settings;
pub mod tracing_init;
pub mod wire;

pub use codes::{ErrorCategory, ErrorCode};
pub use error::{Error, Result};
pub use settings::Tunables;
pub use wire::PunchAction;
