//! Kiosk error type.

use thiserror::Error;
use timeclock_core::ErrorCode;
use timeclock_core::db::DatabaseError;
use timeclock_crypto::CryptoError;

use crate::client::ClientError;
use crate::storage::QueueError;

#[derive(Debug, Error)]
pub enum KioskError {
    /// The stored pairing was revoked; punching is disabled until re-pair.
    #[error("Kiosk pairing was revoked; pair it again")]
    NeedsPairing,

    /// No pairing to seal the PIN under, and no server to send it to.
    #[error("Server unreachable and this kiosk is not paired")]
    OfflineUnpaired,

    /// Rejected on the kiosk before anything was sent.
    #[error("Rejected: {0}")]
    Rejected(ErrorCode),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Core(#[from] timeclock_core::Error),
}

impl From<DatabaseError> for KioskError {
    fn from(e: DatabaseError) -> Self {
        Self::Queue(e.into())
    }
}

impl KioskError {
    /// The error code behind this error, if there is one.
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Rejected(code) => Some(*code),
            Self::Client(e) => e.code(),
            Self::NeedsPairing => Some(ErrorCode::DeviceRevoked),
            _ => None,
        }
    }

    /// Text for the person standing at the kiosk.
    pub fn user_message(&self) -> String {
        match self {
            Self::OfflineUnpaired => {
                "The server can't be reached and this kiosk isn't paired, so the punch was not saved."
                    .to_string()
            }
            Self::Client(e) if e.is_offline() => "The server can't be reached.".to_string(),
            _ => self
                .code()
                .map_or_else(|| self.to_string(), |code| code.user_message().to_string()),
        }
    }
}
