//! Locally persisted key-derivation salt.
//!
//! Generated once per kiosk installation and never sent to the server.

use std::path::Path;

use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::CryptoError;

pub const SALT_SIZE: usize = 16;

/// Random salt mixed into the PIN key derivation.
#[derive(Clone, PartialEq, Eq)]
pub struct LocalSalt([u8; SALT_SIZE]);

impl std::fmt::Debug for LocalSalt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("LocalSalt").field(&"[REDACTED]").finish()
    }
}

impl LocalSalt {
    pub fn generate() -> Self {
        let mut bytes = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let arr: [u8; SALT_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: SALT_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self(arr))
    }

    pub const fn as_bytes(&self) -> &[u8; SALT_SIZE] {
        &self.0
    }

    /// Save the salt as hex with owner-only permissions.
    pub fn save_to_file(&self, path: &Path) -> Result<(), CryptoError> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, hex::encode(self.0))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self, CryptoError> {
        let text = std::fs::read_to_string(path)?;
        let bytes = hex::decode(text.trim())
            .map_err(|e| CryptoError::Malformed(format!("salt file: {e}")))?;
        Self::from_bytes(&bytes)
    }

    /// Load from file, or generate a new salt and save it.
    pub fn load_or_generate(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            let salt = Self::generate();
            salt.save_to_file(path)?;
            Ok(salt)
        }
    }
}
