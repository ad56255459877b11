//! Timeclock Kiosk
//!
//! Client side of the timeclock: pairs with the server, seals PINs into a
//! durable local queue and delivers punches and evidence photos in the
//! background, surviving network outages.

pub mod backoff;
pub mod client;
pub mod config;
pub mod connectivity;
pub mod credentials;
pub mod error;
pub mod kiosk;
pub mod scheduler;
pub mod settings;
pub mod status;
pub mod storage;
pub mod sync;
pub mod vault;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod testing;

pub use client::{ApiClient, ClientError, KioskApi};
pub use config::KioskConfig;
pub use error::KioskError;
pub use kiosk::{Kiosk, KioskTasks, PunchReceipt, SubmitOutcome, SyncSummary};
pub use status::{ConnectionState, KioskStatus};
