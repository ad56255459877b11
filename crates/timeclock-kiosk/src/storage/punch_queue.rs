//! Punch queue queries.

use timeclock_core::PunchAction;

use super::db::PunchQueueDb;
use super::models::{QueueCounts, QueueError, QueuedPunch, queue_status};

/// A punch about to be written ahead of delivery.
#[derive(Debug, Clone)]
pub struct NewQueuedPunch<'a> {
    pub event_uuid: &'a str,
    pub action: PunchAction,
    pub pin_ciphertext: &'a str,
    pub device_time: i64,
}

impl PunchQueueDb {
    /// Insert a punch, or refresh its payload if the event is already queued.
    ///
    /// Delivery state (`status`, `attempts`, backoff) of an existing row is
    /// left alone.
    pub async fn enqueue(&self, punch: &NewQueuedPunch<'_>, now: i64) -> Result<(), QueueError> {
        sqlx::query(
            "INSERT INTO punch_queue (event_uuid, action, pin_ciphertext, device_time, created_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(event_uuid) DO UPDATE SET
                action = excluded.action,
                pin_ciphertext = excluded.pin_ciphertext,
                device_time = excluded.device_time",
        )
        .bind(punch.event_uuid)
        .bind(punch.action.as_str())
        .bind(punch.pin_ciphertext)
        .bind(punch.device_time)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Remove a settled punch. Returns whether a row was deleted.
    pub async fn dequeue(&self, event_uuid: &str) -> Result<bool, QueueError> {
        let result = sqlx::query("DELETE FROM punch_queue WHERE event_uuid = ?")
            .bind(event_uuid)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, event_uuid: &str) -> Result<Option<QueuedPunch>, QueueError> {
        let row = sqlx::query_as::<_, QueuedPunch>("SELECT * FROM punch_queue WHERE event_uuid = ?")
            .bind(event_uuid)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    /// Deliverable punches whose backoff has elapsed, oldest first.
    pub async fn list_retryable(&self, limit: u32, now: i64) -> Result<Vec<QueuedPunch>, QueueError> {
        let rows = sqlx::query_as::<_, QueuedPunch>(
            "SELECT * FROM punch_queue
             WHERE status IN (?, ?) AND next_attempt_at <= ?
             ORDER BY created_at ASC, rowid ASC
             LIMIT ?",
        )
        .bind(queue_status::QUEUED)
        .bind(queue_status::ERROR)
        .bind(now)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    /// Count a failed attempt and schedule the next one.
    ///
    /// Returns the attempt count after the increment.
    pub async fn record_failure(
        &self,
        event_uuid: &str,
        error: &str,
        now: i64,
        next_attempt_at: i64,
    ) -> Result<i64, QueueError> {
        let attempts = sqlx::query_scalar::<_, i64>(
            "UPDATE punch_queue
             SET status = ?, attempts = attempts + 1, last_error = ?,
                 last_attempt_at = ?, next_attempt_at = ?
             WHERE event_uuid = ?
             RETURNING attempts",
        )
        .bind(queue_status::ERROR)
        .bind(error)
        .bind(now)
        .bind(next_attempt_at)
        .bind(event_uuid)
        .fetch_optional(self.pool())
        .await?;
        Ok(attempts.unwrap_or_default())
    }

    /// Park a punch that will never be delivered.
    pub async fn mark_dead(&self, event_uuid: &str, error: &str) -> Result<(), QueueError> {
        sqlx::query("UPDATE punch_queue SET status = ?, last_error = ? WHERE event_uuid = ?")
            .bind(queue_status::DEAD)
            .bind(error)
            .bind(event_uuid)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_dead(&self) -> Result<Vec<QueuedPunch>, QueueError> {
        let rows = sqlx::query_as::<_, QueuedPunch>(
            "SELECT * FROM punch_queue WHERE status = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(queue_status::DEAD)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM punch_queue GROUP BY status",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(QueueCounts::from_rows(rows))
    }
}
