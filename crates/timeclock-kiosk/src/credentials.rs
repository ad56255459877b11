//! Device credential store.
//!
//! The token issued at pairing is kept in an owner-only JSON file. A local
//! `revoked` flag is set as soon as the server answers with an authorization
//! error, which stalls every queue until the kiosk is paired again.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use timeclock_core::config::{load_json_file, save_json_file};
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Credentials issued by `/pair`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct DeviceCredentials {
    #[zeroize(skip)]
    pub kiosk_code: String,
    pub device_token: String,
    #[zeroize(skip)]
    pub pairing_version: i64,
    #[zeroize(skip)]
    #[serde(default)]
    pub revoked: bool,
}

impl std::fmt::Debug for DeviceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceCredentials")
            .field("kiosk_code", &self.kiosk_code)
            .field("device_token", &"[REDACTED]")
            .field("pairing_version", &self.pairing_version)
            .field("revoked", &self.revoked)
            .finish()
    }
}

impl DeviceCredentials {
    pub fn new(kiosk_code: impl Into<String>, device_token: impl Into<String>, pairing_version: i64) -> Self {
        Self {
            kiosk_code: kiosk_code.into(),
            device_token: device_token.into(),
            pairing_version,
            revoked: false,
        }
    }

    /// Whether these credentials may be used to send anything.
    pub const fn is_usable(&self) -> bool {
        !self.revoked
    }
}

/// File-backed store for [`DeviceCredentials`].
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> timeclock_core::Result<Option<DeviceCredentials>> {
        load_json_file(&self.path)
    }

    pub fn save(&self, credentials: &DeviceCredentials) -> timeclock_core::Result<()> {
        save_json_file(&self.path, credentials, true)?;
        info!(
            kiosk = %credentials.kiosk_code,
            pairing_version = credentials.pairing_version,
            "Device credentials saved"
        );
        Ok(())
    }

    /// Flag the stored credentials as revoked, provided they are still the
    /// ones in `used`. Returns `false` if nothing was flagged, e.g. because
    /// the kiosk was paired again in the meantime.
    pub fn mark_revoked(&self, used: &DeviceCredentials) -> timeclock_core::Result<bool> {
        let Some(mut credentials) = self.load()? else {
            return Ok(false);
        };
        if credentials.pairing_version != used.pairing_version
            || credentials.device_token != used.device_token
        {
            return Ok(false);
        }
        if !credentials.revoked {
            credentials.revoked = true;
            save_json_file(&self.path, &credentials, true)?;
            warn!(
                kiosk = %credentials.kiosk_code,
                pairing_version = credentials.pairing_version,
                "Device credentials revoked, pairing required"
            );
        }
        Ok(true)
    }
}
