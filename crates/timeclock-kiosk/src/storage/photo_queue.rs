//! Photo queue queries.

use timeclock_core::PunchAction;

use super::db::PhotoQueueDb;
use super::models::{QueueCounts, QueueError, QueuedPhoto, queue_status};

#[derive(Debug, Clone)]
pub struct NewQueuedPhoto<'a> {
    pub event_uuid: &'a str,
    pub action: PunchAction,
    pub device_time: i64,
    pub content_type: &'a str,
    pub photo: &'a [u8],
}

impl PhotoQueueDb {
    /// Insert a photo, replacing the image of an already queued one.
    pub async fn enqueue(&self, photo: &NewQueuedPhoto<'_>, now: i64) -> Result<(), QueueError> {
        sqlx::query(
            "INSERT INTO photo_queue (event_uuid, action, device_time, content_type, photo, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(event_uuid) DO UPDATE SET
                action = excluded.action,
                device_time = excluded.device_time,
                content_type = excluded.content_type,
                photo = excluded.photo",
        )
        .bind(photo.event_uuid)
        .bind(photo.action.as_str())
        .bind(photo.device_time)
        .bind(photo.content_type)
        .bind(photo.photo)
        .bind(now)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn dequeue(&self, event_uuid: &str) -> Result<bool, QueueError> {
        let result = sqlx::query("DELETE FROM photo_queue WHERE event_uuid = ?")
            .bind(event_uuid)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get(&self, event_uuid: &str) -> Result<Option<QueuedPhoto>, QueueError> {
        let row = sqlx::query_as::<_, QueuedPhoto>("SELECT * FROM photo_queue WHERE event_uuid = ?")
            .bind(event_uuid)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    pub async fn list_retryable(&self, limit: u32, now: i64) -> Result<Vec<QueuedPhoto>, QueueError> {
        let rows = sqlx::query_as::<_, QueuedPhoto>(
            "SELECT * FROM photo_queue
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

    pub async fn record_failure(
        &self,
        event_uuid: &str,
        error: &str,
        now: i64,
        next_attempt_at: i64,
    ) -> Result<i64, QueueError> {
        let attempts = sqlx::query_scalar::<_, i64>(
            "UPDATE photo_queue
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

    pub async fn mark_dead(&self, event_uuid: &str, error: &str) -> Result<(), QueueError> {
        sqlx::query("UPDATE photo_queue SET status = ?, last_error = ? WHERE event_uuid = ?")
            .bind(queue_status::DEAD)
            .bind(error)
            .bind(event_uuid)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    pub async fn list_dead(&self) -> Result<Vec<QueuedPhoto>, QueueError> {
        let rows = sqlx::query_as::<_, QueuedPhoto>(
            "SELECT * FROM photo_queue WHERE status = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(queue_status::DEAD)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn counts(&self) -> Result<QueueCounts, QueueError> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM photo_queue GROUP BY status",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(QueueCounts::from_rows(rows))
    }
}
