//! Device authorization and pairing audit queries.

use timeclock_core::db::{DatabaseError, unix_timestamp};

use super::db::ServerDatabase;
use super::models::{DeviceAuthorization, PairingAuditEntry};

/// Parameters for appending a pairing audit row.
#[derive(Debug, Clone, Default)]
pub struct AuditParams<'a> {
    pub kiosk_code: &'a str,
    pub event: &'a str,
    pub success: bool,
    pub reason: Option<&'a str>,
    pub version_before: Option<i64>,
    pub version_after: Option<i64>,
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

impl ServerDatabase {
    // =========================================================================
    // Device authorization queries
    // =========================================================================

    /// Create the authorization row for a configured kiosk if it is missing.
    pub async fn ensure_kiosk(&self, kiosk_code: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT OR IGNORE INTO device_authorizations (kiosk_code, updated_at) VALUES (?, ?)",
        )
        .bind(kiosk_code)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn get_device_authorization(
        &self,
        kiosk_code: &str,
    ) -> Result<Option<DeviceAuthorization>, DatabaseError> {
        let row = sqlx::query_as::<_, DeviceAuthorization>(
            "SELECT * FROM device_authorizations WHERE kiosk_code = ?",
        )
        .bind(kiosk_code)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    /// Bind a token hash to an unpaired kiosk.
    ///
    /// Returns the pairing version, or `None` when the kiosk is already
    /// paired (or unknown). The `paired = 0` guard makes concurrent pair
    /// requests race-safe: only one of them updates the row.
    pub async fn pair_device(
        &self,
        kiosk_code: &str,
        token_hash: &str,
    ) -> Result<Option<i64>, DatabaseError> {
        let now = unix_timestamp();
        let version = sqlx::query_scalar::<_, i64>(
            "UPDATE device_authorizations
             SET device_token_hash = ?, paired = 1, paired_at = ?, updated_at = ?
             WHERE kiosk_code = ? AND paired = 0
             RETURNING pairing_version",
        )
        .bind(token_hash)
        .bind(now)
        .bind(now)
        .bind(kiosk_code)
        .fetch_optional(self.pool())
        .await?;
        Ok(version)
    }

    /// Clear the token and bump the pairing version.
    ///
    /// Returns the new version.
    pub async fn revoke_device(&self, kiosk_code: &str) -> Result<i64, DatabaseError> {
        sqlx::query_scalar::<_, i64>(
            "UPDATE device_authorizations
             SET device_token_hash = NULL, paired = 0, paired_at = NULL,
                 pairing_version = pairing_version + 1, updated_at = ?
             WHERE kiosk_code = ?
             RETURNING pairing_version",
        )
        .bind(unix_timestamp())
        .bind(kiosk_code)
        .fetch_optional(self.pool())
        .await?
        .ok_or_else(|| DatabaseError::NotFound(format!("Kiosk {kiosk_code}")))
    }

    // =========================================================================
    // Pairing audit queries
    // =========================================================================

    pub async fn append_audit(&self, params: &AuditParams<'_>) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO pairing_audit
             (kiosk_code, event, success, reason, version_before, version_after, ip, user_agent, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(params.kiosk_code)
        .bind(params.event)
        .bind(params.success)
        .bind(params.reason)
        .bind(params.version_before)
        .bind(params.version_after)
        .bind(params.ip)
        .bind(params.user_agent)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Count failed attempts of `event` for a kiosk since `since` (inclusive).
    ///
    /// Requests refused by the lockout itself are not counted, so the window
    /// does not slide forward while a caller keeps retrying.
    pub async fn count_recent_failures(
        &self,
        kiosk_code: &str,
        event: &str,
        since: i64,
    ) -> Result<i64, DatabaseError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM pairing_audit
             WHERE kiosk_code = ? AND event = ? AND success = 0 AND created_at >= ?
               AND (reason IS NULL OR reason != 'too_many_attempts')",
        )
        .bind(kiosk_code)
        .bind(event)
        .bind(since)
        .fetch_one(self.pool())
        .await?;
        Ok(count)
    }

    /// Audit trail for a kiosk, oldest first.
    pub async fn list_audit(&self, kiosk_code: &str) -> Result<Vec<PairingAuditEntry>, DatabaseError> {
        let rows = sqlx::query_as::<_, PairingAuditEntry>(
            "SELECT * FROM pairing_audit WHERE kiosk_code = ? ORDER BY id ASC",
        )
        .bind(kiosk_code)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}
