//! Sealing PINs for the durable queue.
//!
//! Wraps [`PinCipher`] with the kiosk's persisted salt and caches the
//! derived key for the current pairing. The key depends on the device token,
//! so items sealed before a re-pair cannot be opened afterwards.

use std::path::Path;
use std::sync::{Arc, Mutex};

use timeclock_crypto::{CryptoError, KdfParams, LocalSalt, PinCipher, hash_token};
use tracing::debug;
use zeroize::Zeroizing;

use crate::credentials::DeviceCredentials;

pub struct PinVault {
    salt: LocalSalt,
    params: KdfParams,
    cached: Mutex<Option<CachedKey>>,
}

struct CachedKey {
    pairing_version: i64,
    token_hash: String,
    cipher: Arc<PinCipher>,
}

impl std::fmt::Debug for PinVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinVault")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl PinVault {
    /// Load the salt at `salt_path`, creating it on first use.
    pub fn open(salt_path: &Path, params: KdfParams) -> Result<Self, CryptoError> {
        Ok(Self::with_salt(LocalSalt::load_or_generate(salt_path)?, params))
    }

    pub const fn with_salt(salt: LocalSalt, params: KdfParams) -> Self {
        Self {
            salt,
            params,
            cached: Mutex::new(None),
        }
    }

    /// The cipher for `credentials`, derived on a blocking thread if it is
    /// not cached yet.
    pub async fn cipher(&self, credentials: &DeviceCredentials) -> Result<Arc<PinCipher>, CryptoError> {
        let token_hash = hash_token(&credentials.device_token);
        if let Some(cipher) = self.lookup(credentials.pairing_version, &token_hash) {
            return Ok(cipher);
        }

        let token = Zeroizing::new(credentials.device_token.clone());
        let kiosk_code = credentials.kiosk_code.clone();
        let salt = self.salt.clone();
        let params = self.params;
        let cipher = tokio::task::spawn_blocking(move || {
            PinCipher::derive(&token, &kiosk_code, &salt, params)
        })
        .await
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))??;
        let cipher = Arc::new(cipher);
        debug!(pairing_version = credentials.pairing_version, "Derived PIN key");

        if let Ok(mut slot) = self.cached.lock() {
            *slot = Some(CachedKey {
                pairing_version: credentials.pairing_version,
                token_hash,
                cipher: Arc::clone(&cipher),
            });
        }
        Ok(cipher)
    }

    pub async fn seal(&self, credentials: &DeviceCredentials, pin: &str) -> Result<String, CryptoError> {
        self.cipher(credentials).await?.seal(pin)
    }

    fn lookup(&self, pairing_version: i64, token_hash: &str) -> Option<Arc<PinCipher>> {
        let slot = self.cached.lock().ok()?;
        slot.as_ref()
            .filter(|k| k.pairing_version == pairing_version && k.token_hash == token_hash)
            .map(|k| Arc::clone(&k.cipher))
    }
}
