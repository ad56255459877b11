//! Queue rows and counters.

use serde::Serialize;
use timeclock_core::PunchAction;
use timeclock_core::db::DatabaseError;

/// Values of the `status` column.
pub mod queue_status {
    pub const QUEUED: &str = "queued";
    pub const ERROR: &str = "error";
    pub const DEAD: &str = "dead";
}

/// Queue errors.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Corrupt queue row {event_uuid}: {reason}")]
    Corrupt { event_uuid: String, reason: String },
}

impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.into())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct QueuedPunch {
    pub event_uuid: String,
    pub action: String,
    pub pin_ciphertext: String,
    pub device_time: i64,
    pub status: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<i64>,
    pub next_attempt_at: i64,
    pub created_at: i64,
}

impl QueuedPunch {
    pub fn action(&self) -> Result<PunchAction, QueueError> {
        parse_action(&self.event_uuid, &self.action)
    }
}

#[derive(Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct QueuedPhoto {
    pub event_uuid: String,
    pub action: String,
    pub device_time: i64,
    pub content_type: String,
    pub photo: Vec<u8>,
    pub status: String,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<i64>,
    pub next_attempt_at: i64,
    pub created_at: i64,
}

impl std::fmt::Debug for QueuedPhoto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueuedPhoto")
            .field("event_uuid", &self.event_uuid)
            .field("action", &self.action)
            .field("content_type", &self.content_type)
            .field("photo_bytes", &self.photo.len())
            .field("status", &self.status)
            .field("attempts", &self.attempts)
            .field("next_attempt_at", &self.next_attempt_at)
            .finish_non_exhaustive()
    }
}

impl QueuedPhoto {
    pub fn action(&self) -> Result<PunchAction, QueueError> {
        parse_action(&self.event_uuid, &self.action)
    }
}

fn parse_action(event_uuid: &str, raw: &str) -> Result<PunchAction, QueueError> {
    raw.parse().map_err(|_| QueueError::Corrupt {
        event_uuid: event_uuid.to_string(),
        reason: format!("unknown action {raw:?}"),
    })
}

/// Per-status item counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub queued: u64,
    pub error: u64,
    pub dead: u64,
}

impl QueueCounts {
    /// Items still waiting for delivery.
    pub const fn pending(&self) -> u64 {
        self.queued + self.error
    }

    pub(crate) fn from_rows(rows: Vec<(String, i64)>) -> Self {
        let mut counts = Self::default();
        for (status, n) in rows {
            let n = u64::try_from(n).unwrap_or_default();
            match status.as_str() {
                queue_status::QUEUED => counts.queued = n,
                queue_status::ERROR => counts.error = n,
                queue_status::DEAD => counts.dead = n,
                _ => {}
            }
        }
        counts
    }
}
