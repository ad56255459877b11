//! Photo evidence queries.

use timeclock_core::db::{DatabaseError, unix_timestamp};

use super::db::ServerDatabase;
use super::models::PhotoEvidence;

/// Parameters for recording an uploaded photo.
#[derive(Debug, Clone)]
pub struct PhotoEvidenceParams<'a> {
    pub event_uuid: &'a str,
    pub action: &'a str,
    pub device_id: &'a str,
    pub device_name: &'a str,
    pub photo_path: &'a str,
    pub content_type: &'a str,
    pub size_bytes: i64,
}

impl ServerDatabase {
    /// Insert or replace the evidence row for a punch.
    ///
    /// Returns the previously stored path when a row was replaced.
    pub async fn upsert_photo_evidence(
        &self,
        params: &PhotoEvidenceParams<'_>,
    ) -> Result<Option<String>, DatabaseError> {
        let mut tx = self.pool().begin().await?;

        let previous = sqlx::query_scalar::<_, String>(
            "SELECT photo_path FROM photo_evidence WHERE event_uuid = ?",
        )
        .bind(params.event_uuid)
        .fetch_optional(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO photo_evidence
             (event_uuid, action, device_id, device_name, photo_path, content_type, size_bytes, uploaded_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(event_uuid) DO UPDATE SET
                action = excluded.action,
                device_id = excluded.device_id,
                device_name = excluded.device_name,
                photo_path = excluded.photo_path,
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                uploaded_at = excluded.uploaded_at",
        )
        .bind(params.event_uuid)
        .bind(params.action)
        .bind(params.device_id)
        .bind(params.device_name)
        .bind(params.photo_path)
        .bind(params.content_type)
        .bind(params.size_bytes)
        .bind(unix_timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(previous.filter(|p| p != params.photo_path))
    }

    pub async fn get_photo_evidence(
        &self,
        event_uuid: &str,
    ) -> Result<Option<PhotoEvidence>, DatabaseError> {
        let row = sqlx::query_as::<_, PhotoEvidence>(
            "SELECT * FROM photo_evidence WHERE event_uuid = ?",
        )
        .bind(event_uuid)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn count_photo_evidence(&self) -> Result<i64, DatabaseError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM photo_evidence")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }
}
