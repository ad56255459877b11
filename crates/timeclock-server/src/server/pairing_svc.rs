//! Pairing and revocation.
//!
//! Pairing binds a fresh device token to an unpaired, configured kiosk.
//! Revocation clears the token and bumps the pairing version, invalidating
//! the previous credentials everywhere. Every attempt on a configured kiosk
//! is audited. Repeated pairing failures within the lockout window are
//! refused outright; a correct manager PIN is never locked out.

use std::sync::Arc;

use timeclock_core::ErrorCode;
use timeclock_core::db::unix_timestamp;
use timeclock_core::wire::{PairRequest, PairResponse, RevokeRequest, RevokeResponse};
use timeclock_crypto::{constant_time_str_eq, generate_device_token, hash_token};
use tracing::{info, warn};

use super::error::ApiError;
use super::extract::ClientMeta;
use crate::config::{KioskEntry, KioskRegistry};
use crate::settings::SettingsCache;
use crate::storage::{AuditParams, ServerDatabase, audit_event};

pub struct PairingService {
    db: ServerDatabase,
    kiosks: Arc<KioskRegistry>,
    settings: SettingsCache,
    manager_pin: String,
}

impl std::fmt::Debug for PairingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingService")
            .field("kiosks", &self.kiosks.len())
            .field("manager_pin", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// An audited failure: the row to write and the error to return.
struct Refusal {
    code: ErrorCode,
    version: Option<i64>,
}

impl PairingService {
    pub const fn new(
        db: ServerDatabase,
        kiosks: Arc<KioskRegistry>,
        settings: SettingsCache,
        manager_pin: String,
    ) -> Self {
        Self {
            db,
            kiosks,
            settings,
            manager_pin,
        }
    }

    /// Issue a device token to an unpaired kiosk.
    pub async fn pair(
        &self,
        kiosk_code: Option<&str>,
        req: &PairRequest,
        meta: &ClientMeta,
    ) -> Result<PairResponse, ApiError> {
        let entry = self.lookup(kiosk_code, audit_event::PAIR)?;
        self.check_lockout(entry, audit_event::PAIR, meta).await?;

        if req.pairing_code.trim().is_empty() {
            return Err(self
                .refuse(entry, audit_event::PAIR, meta, Refusal {
                    code: ErrorCode::MissingFields,
                    version: None,
                })
                .await);
        }
        if !constant_time_str_eq(&entry.pairing_code, req.pairing_code.trim()) {
            return Err(self
                .refuse(entry, audit_event::PAIR, meta, Refusal {
                    code: ErrorCode::InvalidPairingCode,
                    version: None,
                })
                .await);
        }

        let device_token = generate_device_token();
        let Some(pairing_version) = self
            .db
            .pair_device(&entry.kiosk_code, &hash_token(&device_token))
            .await?
        else {
            let current = self
                .db
                .get_device_authorization(&entry.kiosk_code)
                .await?
                .map(|a| a.pairing_version);
            return Err(self
                .refuse(entry, audit_event::PAIR, meta, Refusal {
                    code: ErrorCode::AlreadyPaired,
                    version: current,
                })
                .await);
        };

        self.db
            .append_audit(&AuditParams {
                kiosk_code: &entry.kiosk_code,
                event: audit_event::PAIR,
                success: true,
                version_before: Some(pairing_version),
                version_after: Some(pairing_version),
                ip: meta.ip.as_deref(),
                user_agent: meta.user_agent.as_deref(),
                ..AuditParams::default()
            })
            .await?;

        info!(kiosk = %entry.kiosk_code, pairing_version, "Kiosk paired");
        Ok(PairResponse {
            device_token,
            pairing_version,
        })
    }

    /// Invalidate the kiosk's current token. Guarded by the manager PIN.
    pub async fn revoke(
        &self,
        kiosk_code: Option<&str>,
        req: &RevokeRequest,
        meta: &ClientMeta,
    ) -> Result<RevokeResponse, ApiError> {
        let entry = self.lookup(kiosk_code, audit_event::REVOKE)?;
        let before = self
            .db
            .get_device_authorization(&entry.kiosk_code)
            .await?
            .map(|a| a.pairing_version);

        if req.pin.trim().is_empty() {
            return Err(self
                .refuse(entry, audit_event::REVOKE, meta, Refusal {
                    code: ErrorCode::MissingFields,
                    version: before,
                })
                .await);
        }

        // A correct manager PIN always revokes; the lockout only changes
        // how wrong PINs are answered.
        if !constant_time_str_eq(&self.manager_pin, req.pin.trim()) {
            self.check_lockout(entry, audit_event::REVOKE, meta).await?;
            return Err(self
                .refuse(entry, audit_event::REVOKE, meta, Refusal {
                    code: ErrorCode::InvalidManagerPin,
                    version: before,
                })
                .await);
        }

        let after = self.db.revoke_device(&entry.kiosk_code).await?;
        self.db
            .append_audit(&AuditParams {
                kiosk_code: &entry.kiosk_code,
                event: audit_event::REVOKE,
                success: true,
                version_before: before,
                version_after: Some(after),
                ip: meta.ip.as_deref(),
                user_agent: meta.user_agent.as_deref(),
                ..AuditParams::default()
            })
            .await?;

        info!(kiosk = %entry.kiosk_code, pairing_version = after, "Kiosk pairing revoked");
        Ok(RevokeResponse {
            pairing_version: after,
        })
    }

    /// Unknown kiosk codes are logged but not audited.
    fn lookup(&self, kiosk_code: Option<&str>, event: &str) -> Result<&KioskEntry, ApiError> {
        if let Some(entry) = kiosk_code.and_then(|code| self.kiosks.find(code)) {
            return Ok(entry);
        }
        warn!(event, "Pairing request for unknown kiosk");
        Err(ErrorCode::KioskNotAuthorized.into())
    }

    async fn check_lockout(
        &self,
        entry: &KioskEntry,
        event: &str,
        meta: &ClientMeta,
    ) -> Result<(), ApiError> {
        let tunables = self.settings.snapshot().await;
        let since = unix_timestamp() - tunables.pair_lockout_window_secs;
        let failures = self
            .db
            .count_recent_failures(&entry.kiosk_code, event, since)
            .await?;

        if failures >= i64::from(tunables.pair_lockout_attempts) {
            return Err(self
                .refuse(entry, event, meta, Refusal {
                    code: ErrorCode::TooManyAttempts,
                    version: None,
                })
                .await);
        }
        Ok(())
    }

    /// Audit a refused attempt and return the error for the caller.
    async fn refuse(
        &self,
        entry: &KioskEntry,
        event: &str,
        meta: &ClientMeta,
        refusal: Refusal,
    ) -> ApiError {
        warn!(kiosk = %entry.kiosk_code, event, code = %refusal.code, "Pairing attempt refused");
        let audit = AuditParams {
            kiosk_code: &entry.kiosk_code,
            event,
            success: false,
            reason: Some(refusal.code.as_str()),
            version_before: refusal.version,
            version_after: refusal.version,
            ip: meta.ip.as_deref(),
            user_agent: meta.user_agent.as_deref(),
        };
        match self.db.append_audit(&audit).await {
            Ok(()) => ApiError::new(refusal.code),
            Err(e) => ApiError::from(e),
        }
    }
}
