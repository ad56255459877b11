//! Punch event and shift queries.
//!
//! [`ServerDatabase::record_punch`] is the only writer of shifts. It runs
//! under `BEGIN IMMEDIATE` so the state read and the transition commit as
//! one unit; the partial unique index on open shifts backs this up.

use sqlx::SqliteConnection;
use timeclock_core::db::{DatabaseError, unique_violation_table};
use timeclock_core::{ErrorCode, PunchAction};
use tracing::warn;

use super::db::ServerDatabase;
use super::models::{PunchEvent, Shift, result_status};
use crate::shift::{EmployeeState, OpenShift, ShiftRules, Transition};

/// A punch that passed validation and authorization.
#[derive(Debug, Clone)]
pub struct NewPunch<'a> {
    pub event_uuid: &'a str,
    /// `None` when the PIN matched no active employee.
    pub employee_id: Option<i64>,
    pub action: PunchAction,
    pub device_time: Option<i64>,
    pub received_at: i64,
    pub kiosk_code: &'a str,
    pub device_token_hash: Option<&'a str>,
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PunchOutcome {
    Accepted {
        shift_id: i64,
        effective_time: i64,
        exceeds_max: bool,
    },
    Rejected {
        code: ErrorCode,
        effective_time: i64,
    },
    /// The event UUID was already recorded; nothing changed.
    Duplicate,
}

impl ServerDatabase {
    // =========================================================================
    // Punch processing
    // =========================================================================

    /// Record a punch and apply its shift transition atomically.
    ///
    /// Every non-duplicate call writes exactly one `punch_events` row,
    /// including rejections.
    pub async fn record_punch(
        &self,
        punch: &NewPunch<'_>,
        rules: &ShiftRules,
    ) -> Result<PunchOutcome, DatabaseError> {
        // A lost race on the open-shift index re-reads state once, which
        // then reports the winner's shift.
        let mut retried = false;
        loop {
            // Dropping `tx` while it is open rolls it back before the
            // connection is reused.
            let mut tx = self.pool().begin_with("BEGIN IMMEDIATE").await?;

            let err = match apply_punch(&mut *tx, punch, rules).await {
                Ok(outcome) => match tx.commit().await {
                    Ok(()) => return Ok(outcome),
                    Err(e) => e,
                },
                Err(e) => {
                    if let Err(rb) = tx.rollback().await {
                        warn!(error = %rb, "Rollback failed");
                    }
                    e
                }
            };

            match unique_violation_table(&err).as_deref() {
                Some("punch_events") => return Ok(PunchOutcome::Duplicate),
                Some("shifts") if !retried => {
                    warn!(event_uuid = punch.event_uuid, "Open shift conflict, retrying");
                    retried = true;
                }
                _ => return Err(err.into()),
            }
        }
    }

    /// Load an employee's shift state outside a transaction.
    pub async fn employee_state(&self, employee_id: i64) -> Result<EmployeeState, DatabaseError> {
        let mut conn = self.pool().acquire().await?;
        Ok(load_employee_state(&mut conn, employee_id).await?)
    }

    pub async fn get_punch_event(
        &self,
        event_uuid: &str,
    ) -> Result<Option<PunchEvent>, DatabaseError> {
        let row = sqlx::query_as::<_, PunchEvent>("SELECT * FROM punch_events WHERE event_uuid = ?")
            .bind(event_uuid)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    /// Punch events with `id > after_id`, in insertion order.
    pub async fn list_punch_events(
        &self,
        after_id: i64,
        limit: u32,
    ) -> Result<Vec<PunchEvent>, DatabaseError> {
        let rows = sqlx::query_as::<_, PunchEvent>(
            "SELECT * FROM punch_events WHERE id > ? ORDER BY id ASC LIMIT ?",
        )
        .bind(after_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn count_punch_events(&self) -> Result<i64, DatabaseError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM punch_events")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Shift queries
    // =========================================================================

    pub async fn get_open_shift(&self, employee_id: i64) -> Result<Option<Shift>, DatabaseError> {
        let row = sqlx::query_as::<_, Shift>(
            "SELECT * FROM shifts WHERE employee_id = ? AND is_closed = 0",
        )
        .bind(employee_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn get_shift(&self, id: i64) -> Result<Shift, DatabaseError> {
        sqlx::query_as::<_, Shift>("SELECT * FROM shifts WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Shift {id}")))
    }

    /// All shifts for an employee, oldest first.
    pub async fn list_shifts_for_employee(&self, employee_id: i64) -> Result<Vec<Shift>, DatabaseError> {
        let rows = sqlx::query_as::<_, Shift>(
            "SELECT * FROM shifts WHERE employee_id = ? ORDER BY clock_in_at ASC, id ASC",
        )
        .bind(employee_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}

async fn load_employee_state(
    conn: &mut SqliteConnection,
    employee_id: i64,
) -> Result<EmployeeState, sqlx::Error> {
    let open_shift = sqlx::query_as::<_, (i64, i64)>(
        "SELECT id, clock_in_at FROM shifts WHERE employee_id = ? AND is_closed = 0",
    )
    .bind(employee_id)
    .fetch_optional(&mut *conn)
    .await?
    .map(|(id, clock_in_at)| OpenShift { id, clock_in_at });

    let last_accepted_at = sqlx::query_scalar::<_, Option<i64>>(
        "SELECT MAX(effective_time) FROM punch_events WHERE employee_id = ? AND result_status = ?",
    )
    .bind(employee_id)
    .bind(result_status::ACCEPTED)
    .fetch_one(&mut *conn)
    .await?;

    Ok(EmployeeState {
        open_shift,
        last_accepted_at,
    })
}

async fn apply_punch(
    conn: &mut SqliteConnection,
    punch: &NewPunch<'_>,
    rules: &ShiftRules,
) -> Result<PunchOutcome, sqlx::Error> {
    let existing =
        sqlx::query_scalar::<_, i64>("SELECT id FROM punch_events WHERE event_uuid = ?")
            .bind(punch.event_uuid)
            .fetch_optional(&mut *conn)
            .await?;
    if existing.is_some() {
        return Ok(PunchOutcome::Duplicate);
    }

    let decision = match punch.employee_id {
        None => Err(ErrorCode::InvalidPin),
        Some(employee_id) => {
            let state = load_employee_state(conn, employee_id).await?;
            rules.decide(&state, punch.action, punch.device_time, punch.received_at)
        }
    };

    let outcome = match decision {
        Ok(Transition::Open { at }) => {
            let shift_id = sqlx::query_scalar::<_, i64>(
                "INSERT INTO shifts (employee_id, clock_in_at, is_closed) VALUES (?, ?, 0) RETURNING id",
            )
            .bind(punch.employee_id)
            .bind(at)
            .fetch_one(&mut *conn)
            .await?;
            PunchOutcome::Accepted {
                shift_id,
                effective_time: at,
                exceeds_max: false,
            }
        }
        Ok(Transition::Close {
            shift_id,
            at,
            duration_minutes,
            exceeds_max,
        }) => {
            sqlx::query(
                "UPDATE shifts SET clock_out_at = ?, is_closed = 1, duration_minutes = ?, exceeds_max = ?
                 WHERE id = ? AND is_closed = 0",
            )
            .bind(at)
            .bind(duration_minutes)
            .bind(exceeds_max)
            .bind(shift_id)
            .execute(&mut *conn)
            .await?;
            PunchOutcome::Accepted {
                shift_id,
                effective_time: at,
                exceeds_max,
            }
        }
        Err(code) => PunchOutcome::Rejected {
            code,
            effective_time: rules.effective_time(punch.device_time, punch.received_at, None),
        },
    };

    let (status, error_code, shift_id, effective_time) = match outcome {
        PunchOutcome::Accepted {
            shift_id,
            effective_time,
            ..
        } => (result_status::ACCEPTED, None, Some(shift_id), effective_time),
        PunchOutcome::Rejected {
            code,
            effective_time,
        } => (result_status::REJECTED, Some(code.as_str()), None, effective_time),
        PunchOutcome::Duplicate => return Ok(outcome),
    };

    sqlx::query(
        "INSERT INTO punch_events
         (event_uuid, employee_id, action, device_time, received_at, effective_time,
          result_status, error_code, shift_id, kiosk_code, device_token_hash, ip, user_agent)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(punch.event_uuid)
    .bind(punch.employee_id)
    .bind(punch.action.as_str())
    .bind(punch.device_time)
    .bind(punch.received_at)
    .bind(effective_time)
    .bind(status)
    .bind(error_code)
    .bind(shift_id)
    .bind(punch.kiosk_code)
    .bind(punch.device_token_hash)
    .bind(punch.ip)
    .bind(punch.user_agent)
    .execute(&mut *conn)
    .await?;

    Ok(outcome)
}
