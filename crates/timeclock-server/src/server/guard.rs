//! Device authorization for punch and photo requests.
//!
//! A request is authorized when its kiosk code is configured, the kiosk is
//! paired, and both the presented token and pairing version match the
//! current authorization row. A stale token or version means the device was
//! revoked (or re-paired elsewhere) and is answered with `device_revoked`.
//! Refusals for configured kiosks are written to the pairing audit log.

use timeclock_core::ErrorCode;
use timeclock_crypto::{constant_time_str_eq, hash_token};
use tracing::warn;

use super::error::ApiError;
use super::extract::{ClientMeta, DeviceHeaders};
use crate::config::KioskRegistry;
use crate::storage::{AuditParams, DeviceAuthorization, ServerDatabase, audit_event};

/// The identity of an authorized kiosk for the rest of the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedDevice {
    pub kiosk_code: String,
    pub kiosk_name: String,
    pub token_hash: String,
    pub pairing_version: i64,
}

pub async fn authorize_device(
    db: &ServerDatabase,
    kiosks: &KioskRegistry,
    headers: &DeviceHeaders,
    meta: &ClientMeta,
) -> Result<AuthorizedDevice, ApiError> {
    let entry = headers
        .kiosk_code
        .as_deref()
        .and_then(|code| kiosks.find(code))
        .ok_or(ErrorCode::KioskNotAuthorized)?;

    let auth = db.get_device_authorization(&entry.kiosk_code).await?;
    match check(auth.as_ref(), headers) {
        Ok(token_hash) => Ok(AuthorizedDevice {
            kiosk_code: entry.kiosk_code.clone(),
            kiosk_name: entry.display_name().to_string(),
            token_hash,
            pairing_version: auth.map_or(0, |a| a.pairing_version),
        }),
        Err(code) => {
            let version = auth.as_ref().map(|a| a.pairing_version);
            warn!(kiosk = %entry.kiosk_code, code = code.as_str(), "Rejected device credentials");
            db.append_audit(&AuditParams {
                kiosk_code: &entry.kiosk_code,
                event: audit_event::AUTH,
                success: false,
                reason: Some(code.as_str()),
                version_before: version,
                version_after: version,
                ip: meta.ip.as_deref(),
                user_agent: meta.user_agent.as_deref(),
            })
            .await?;
            Err(code.into())
        }
    }
}

/// Returns the presented token hash, or the refusal code.
fn check(auth: Option<&DeviceAuthorization>, headers: &DeviceHeaders) -> Result<String, ErrorCode> {
    let auth = auth.ok_or(ErrorCode::KioskNotPaired)?;

    let Some(token) = headers.device_token.as_deref() else {
        return Err(if auth.paired {
            ErrorCode::DeviceNotAuthorized
        } else {
            ErrorCode::KioskNotPaired
        });
    };

    let presented = hash_token(token);
    let token_matches = auth
        .device_token_hash
        .as_deref()
        .is_some_and(|stored| constant_time_str_eq(stored, &presented));
    let version_matches = headers
        .pairing_version
        .as_deref()
        .and_then(|v| v.parse::<i64>().ok())
        == Some(auth.pairing_version);

    if auth.paired && token_matches && version_matches {
        Ok(presented)
    } else {
        Err(ErrorCode::DeviceRevoked)
    }
}
