//! Punch processing.
//!
//! Order of checks: request shape, device authorization, duplicate event
//! UUID, employee resolution, then the shift transition inside one storage
//! transaction. Domain rejections are recorded and answered as processed
//! events with an error code; the kiosk never retries them.

use std::sync::Arc;

use timeclock_core::db::unix_timestamp;
use timeclock_core::wire::{PunchRequest, PunchResponse, PunchStatus};
use timeclock_core::{ErrorCode, PunchAction};
use tracing::{error, info, warn};

use super::error::ApiError;
use super::extract::{ClientMeta, DeviceHeaders};
use super::guard::authorize_device;
use crate::auth::{Credential, hash_pin};
use crate::config::KioskRegistry;
use crate::settings::SettingsCache;
use crate::shift::ShiftRules;
use crate::storage::{Employee, NewPunch, PunchOutcome, ServerDatabase};

pub struct PunchService {
    db: ServerDatabase,
    kiosks: Arc<KioskRegistry>,
    settings: SettingsCache,
}

/// A validated punch body.
struct ValidPunch {
    event_uuid: String,
    action: PunchAction,
    pin: String,
    device_time: Option<i64>,
}

fn validate(req: PunchRequest, pin_ok: impl Fn(&str) -> bool) -> Result<ValidPunch, ApiError> {
    let (Some(event_uuid), Some(action), Some(pin)) = (req.event_uuid, req.action, req.pin) else {
        return Err(ErrorCode::MissingFields.into());
    };
    let event_uuid = event_uuid.trim().to_string();
    if uuid::Uuid::parse_str(&event_uuid).is_err() {
        return Err(ApiError::with_message(
            ErrorCode::MissingFields,
            "event_uuid must be a UUID",
        ));
    }
    let action: PunchAction = action.parse()?;
    if !pin_ok(&pin) {
        return Err(ErrorCode::InvalidPinFormat.into());
    }
    Ok(ValidPunch {
        event_uuid,
        action,
        pin,
        device_time: req.device_time,
    })
}

impl PunchService {
    pub const fn new(db: ServerDatabase, kiosks: Arc<KioskRegistry>, settings: SettingsCache) -> Self {
        Self {
            db,
            kiosks,
            settings,
        }
    }

    pub async fn punch(
        &self,
        headers: &DeviceHeaders,
        meta: &ClientMeta,
        req: PunchRequest,
    ) -> Result<PunchResponse, ApiError> {
        let tunables = self.settings.snapshot().await;
        let punch = validate(req, |pin| tunables.is_valid_pin(pin))?;
        let device = authorize_device(&self.db, &self.kiosks, headers, meta).await?;

        if self.db.get_punch_event(&punch.event_uuid).await?.is_some() {
            info!(event_uuid = %punch.event_uuid, "Duplicate punch");
            return Ok(PunchResponse::duplicate());
        }

        let matched = self.resolve_employee(&punch.pin).await?;
        let received_at = unix_timestamp();
        let outcome = self
            .db
            .record_punch(
                &NewPunch {
                    event_uuid: &punch.event_uuid,
                    employee_id: matched.as_ref().map(|(e, _)| e.id),
                    action: punch.action,
                    device_time: punch.device_time,
                    received_at,
                    kiosk_code: &device.kiosk_code,
                    device_token_hash: Some(&device.token_hash),
                    ip: meta.ip.as_deref(),
                    user_agent: meta.user_agent.as_deref(),
                },
                &ShiftRules::from(&*tunables),
            )
            .await?;

        if let Some((employee, true)) = &matched {
            self.upgrade_credential(employee, &punch.pin).await;
        }

        let employee_name = matched.map(|(e, _)| e.name);
        Ok(match outcome {
            PunchOutcome::Duplicate => PunchResponse::duplicate(),
            PunchOutcome::Rejected { code, .. } => {
                info!(event_uuid = %punch.event_uuid, %code, "Punch rejected");
                PunchResponse {
                    status: PunchStatus::Processed,
                    error: Some(code),
                    message: Some(code.user_message().to_string()),
                    employee_name,
                    shift_id: None,
                    effective_time: None,
                }
            }
            PunchOutcome::Accepted {
                shift_id,
                effective_time,
                exceeds_max,
            } => {
                if exceeds_max {
                    warn!(shift_id, "Shift exceeded maximum length, flagged for review");
                }
                info!(
                    event_uuid = %punch.event_uuid,
                    action = %punch.action,
                    shift_id,
                    effective_time,
                    "Punch accepted"
                );
                PunchResponse {
                    status: PunchStatus::Processed,
                    error: None,
                    message: Some(accepted_message(punch.action, exceeds_max).to_string()),
                    employee_name,
                    shift_id: Some(shift_id),
                    effective_time: Some(effective_time),
                }
            }
        })
    }

    /// Find the active employee whose credential matches `pin`.
    ///
    /// Returns the employee and whether the credential is a legacy one.
    async fn resolve_employee(&self, pin: &str) -> Result<Option<(Employee, bool)>, ApiError> {
        let employees = self.db.list_active_employees().await?;
        let pin = pin.to_string();
        tokio::task::spawn_blocking(move || {
            employees.into_iter().find_map(|employee| {
                let matched = {
                    let credential = Credential::parse(&employee.pin_credential);
                    credential.verify(&pin).then_some(credential.needs_upgrade())
                };
                matched.map(|legacy| (employee, legacy))
            })
        })
        .await
        .map_err(|e| {
            error!(error = %e, "PIN verification task failed");
            ApiError::new(ErrorCode::ServerError)
        })
    }

    /// Replace a legacy plain-text credential with an argon2 hash.
    ///
    /// Failures are logged only; the punch has already been recorded.
    async fn upgrade_credential(&self, employee: &Employee, pin: &str) {
        let pin = pin.to_string();
        let hashed = match tokio::task::spawn_blocking(move || hash_pin(&pin)).await {
            Ok(Ok(phc)) => phc,
            Ok(Err(e)) => {
                warn!(employee_id = employee.id, error = %e, "Failed to hash legacy PIN");
                return;
            }
            Err(e) => {
                warn!(employee_id = employee.id, error = %e, "PIN hashing task failed");
                return;
            }
        };
        match self.db.update_employee_credential(employee.id, &hashed).await {
            Ok(_) => info!(employee_id = employee.id, "Upgraded legacy PIN credential"),
            Err(e) => warn!(employee_id = employee.id, error = %e, "Failed to store upgraded PIN"),
        }
    }
}

const fn accepted_message(action: PunchAction, exceeds_max: bool) -> &'static str {
    match (action, exceeds_max) {
        (PunchAction::In, _) => "Clocked in.",
        (PunchAction::Out, false) => "Clocked out.",
        (PunchAction::Out, true) => "Clocked out. This shift was unusually long and will be reviewed.",
    }
}
