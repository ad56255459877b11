//! `SQLite` storage for the Timeclock server.
//!
//! Provides persistence for device authorizations, the pairing audit trail,
//! punch events, shifts, photo evidence and settings.

mod db;
mod models;
mod queries_devices;
mod queries_employees;
mod queries_photos;
mod queries_punches;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests;

pub use db::ServerDatabase;
pub use models::*;
pub use queries_devices::AuditParams;
pub use queries_photos::PhotoEvidenceParams;
pub use queries_punches::{NewPunch, PunchOutcome};
pub use timeclock_core::db::DatabaseError;
