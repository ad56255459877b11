//! Durable kiosk queues.
//!
//! Punches and photos live in two separate `SQLite` files so a large photo
//! backlog never slows the punch queue down. Items are written before any
//! network attempt and removed only once the server has settled them.

mod db;
mod models;
mod photo_queue;
mod punch_queue;


pub use db::{PhotoQueueDb, PunchQueueDb};
pub use models::*;
pub use photo_queue::NewQueuedPhoto;
pub use punch_queue::NewQueuedPunch;
pub use timeclock_core::db::DatabaseError;
