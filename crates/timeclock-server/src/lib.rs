//! Timeclock Server Library
//!
//! Core functionality for the Timeclock server:
//! - `SQLite` storage for device authorizations, punches, shifts and photos
//! - Kiosk pairing and revocation with an audit trail
//! - Idempotent punch processing over a per-employee shift state machine
//! - Photo evidence attachment
//! - axum HTTP API

pub mod auth;
pub mod config;
pub mod server;
pub mod settings;
pub mod shift;
pub mod storage;
