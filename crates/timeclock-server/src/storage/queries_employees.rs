//! Employee and settings queries.

use timeclock_core::db::{DatabaseError, unix_timestamp};

use super::db::ServerDatabase;
use super::models::Employee;

impl ServerDatabase {
    // =========================================================================
    // Employee queries
    // =========================================================================

    /// Insert an employee with an already-prepared credential string.
    pub async fn create_employee(
        &self,
        name: &str,
        pin_credential: &str,
    ) -> Result<Employee, DatabaseError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO employees (name, pin_credential, active, created_at)
             VALUES (?, ?, 1, ?) RETURNING id",
        )
        .bind(name)
        .bind(pin_credential)
        .bind(unix_timestamp())
        .fetch_one(self.pool())
        .await?;

        self.get_employee(id).await
    }

    pub async fn get_employee(&self, id: i64) -> Result<Employee, DatabaseError> {
        sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Employee {id}")))
    }

    pub async fn list_active_employees(&self) -> Result<Vec<Employee>, DatabaseError> {
        let rows =
            sqlx::query_as::<_, Employee>("SELECT * FROM employees WHERE active = 1 ORDER BY id")
                .fetch_all(self.pool())
                .await?;
        Ok(rows)
    }

    /// Replace an employee's stored credential (legacy PIN upgrade).
    pub async fn update_employee_credential(
        &self,
        id: i64,
        pin_credential: &str,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE employees SET pin_credential = ? WHERE id = ?")
            .bind(pin_credential)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_employee_active(&self, id: i64, active: bool) -> Result<bool, DatabaseError> {
        let result = sqlx::query("UPDATE employees SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Settings queries
    // =========================================================================

    /// All stored `(key, value)` rows.
    pub async fn list_settings(&self) -> Result<Vec<(String, String)>, DatabaseError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT key, value FROM settings ORDER BY key",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            "INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(unix_timestamp())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
