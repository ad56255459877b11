//! PIN sealing for the kiosk's durable queue.
//!
//! The symmetric key is derived with argon2id from the current device token
//! and kiosk code, salted with a locally persisted random salt. Once the
//! device is re-paired the token changes, so items sealed under the old
//! token can no longer be opened.

use argon2::{Algorithm, Argon2, Params, Version};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::{Zeroize, Zeroizing};

use crate::error::CryptoError;
use crate::salt::LocalSalt;

/// Nonce size for ChaCha20-Poly1305.
pub const NONCE_SIZE: usize = 12;

const KEY_SIZE: usize = 32;
const SEALED_PREFIX: &str = "v1";

/// argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub m_cost_kib: u32,
    /// Number of passes.
    pub t_cost: u32,
    /// Degree of parallelism.
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost_kib: Params::DEFAULT_M_COST,
            t_cost: Params::DEFAULT_T_COST,
            p_cost: Params::DEFAULT_P_COST,
        }
    }
}

impl KdfParams {
    /// Minimal cost, for tests only.
    #[cfg(any(test, feature = "test-utils"))]
    pub const fn fast() -> Self {
        Self {
            m_cost_kib: 8,
            t_cost: 1,
            p_cost: 1,
        }
    }
}

/// A derived PIN key. Seals and opens PINs for storage at rest.
pub struct PinCipher {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for PinCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinCipher").field("key", &"[REDACTED]").finish()
    }
}

impl PinCipher {
    /// Derive the key from `(device_token, kiosk_code)` and the local salt.
    pub fn derive(
        device_token: &str,
        kiosk_code: &str,
        salt: &LocalSalt,
        params: KdfParams,
    ) -> Result<Self, CryptoError> {
        if device_token.is_empty() {
            return Err(CryptoError::KeyDerivationFailed(
                "device token is empty".into(),
            ));
        }

        let argon_params = Params::new(
            params.m_cost_kib,
            params.t_cost,
            params.p_cost,
            Some(KEY_SIZE),
        )
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

        let mut input = Zeroizing::new(Vec::with_capacity(device_token.len() + kiosk_code.len() + 1));
        input.extend_from_slice(device_token.as_bytes());
        input.push(0);
        input.extend_from_slice(kiosk_code.as_bytes());

        let mut key_bytes = [0u8; KEY_SIZE];
        argon
            .hash_password_into(&input, salt.as_bytes(), &mut key_bytes)
            .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key_bytes));
        key_bytes.zeroize();

        Ok(Self { cipher })
    }

    /// Encrypt a PIN into the `v1:<nonce hex>:<ciphertext hex>` form.
    pub fn seal(&self, pin: &str) -> Result<String, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, pin.as_bytes())
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        Ok(format!(
            "{SEALED_PREFIX}:{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(ciphertext)
        ))
    }

    /// Decrypt a value produced by [`PinCipher::seal`].
    pub fn open(&self, sealed: &str) -> Result<Zeroizing<String>, CryptoError> {
        let mut parts = sealed.splitn(3, ':');
        let (Some(prefix), Some(nonce_hex), Some(ct_hex)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CryptoError::Malformed("expected three fields".into()));
        };
        if prefix != SEALED_PREFIX {
            return Err(CryptoError::Malformed(format!("unknown version {prefix}")));
        }

        let nonce_bytes =
            hex::decode(nonce_hex).map_err(|e| CryptoError::Malformed(e.to_string()))?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(CryptoError::InvalidNonceLength {
                expected: NONCE_SIZE,
                actual: nonce_bytes.len(),
            });
        }
        let ciphertext = hex::decode(ct_hex).map_err(|e| CryptoError::Malformed(e.to_string()))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext)
            .map(Zeroizing::new)
            .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))
    }
}
