//! Error-code taxonomy shared by the server and the kiosk.
//!
//! The server puts these codes on the wire; the kiosk uses the category of a
//! code to decide whether a queued item is discarded, retried, or stalled
//! until the device is paired again.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a failure must be treated by a client holding a queued item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The device lost (or never had) its authority. Fatal per request; the
    /// kiosk must re-pair but keeps queued items.
    Authorization,
    /// A resolved business outcome. Never retried.
    Domain,
    /// Malformed input. Never retried.
    Validation,
    /// Infrastructure trouble. Retried with backoff.
    Transient,
    /// Failure detected on the kiosk before anything was sent.
    Local,
}

/// Every error code the system produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    KioskNotAuthorized,
    DeviceNotAuthorized,
    DeviceRevoked,
    KioskNotPaired,
    InvalidPairingCode,
    AlreadyPaired,
    TooManyAttempts,
    InvalidManagerPin,

    InvalidPin,
    AlreadyClockedIn,
    NoOpenShift,
    PunchTooSoon,

    InvalidFileType,
    FileTooLarge,
    MissingFile,
    MissingFields,
    InvalidAction,
    InvalidPinFormat,

    ServerError,
    NoMatchingPunch,

    DecryptFailed,
    UnreadableItem,
}

impl ErrorCode {
    pub const ALL: [Self; 22] = [
        Self::KioskNotAuthorized,
        Self::DeviceNotAuthorized,
        Self::DeviceRevoked,
        Self::KioskNotPaired,
        Self::InvalidPairingCode,
        Self::AlreadyPaired,
        Self::TooManyAttempts,
        Self::InvalidManagerPin,
        Self::InvalidPin,
        Self::AlreadyClockedIn,
        Self::NoOpenShift,
        Self::PunchTooSoon,
        Self::InvalidFileType,
        Self::FileTooLarge,
        Self::MissingFile,
        Self::MissingFields,
        Self::InvalidAction,
        Self::InvalidPinFormat,
        Self::ServerError,
        Self::NoMatchingPunch,
        Self::DecryptFailed,
        Self::UnreadableItem,
    ];

    /// Wire representation, e.g. `"already_clocked_in"`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KioskNotAuthorized => "kiosk_not_authorized",
            Self::DeviceNotAuthorized => "device_not_authorized",
            Self::DeviceRevoked => "device_revoked",
            Self::KioskNotPaired => "kiosk_not_paired",
            Self::InvalidPairingCode => "invalid_pairing_code",
            Self::AlreadyPaired => "already_paired",
            Self::TooManyAttempts => "too_many_attempts",
            Self::InvalidManagerPin => "invalid_manager_pin",
            Self::InvalidPin => "invalid_pin",
            Self::AlreadyClockedIn => "already_clocked_in",
            Self::NoOpenShift => "no_open_shift",
            Self::PunchTooSoon => "punch_too_soon",
            Self::InvalidFileType => "invalid_file_type",
            Self::FileTooLarge => "file_too_large",
            Self::MissingFile => "missing_file",
            Self::MissingFields => "missing_fields",
            Self::InvalidAction => "invalid_action",
            Self::InvalidPinFormat => "invalid_pin_format",
            Self::ServerError => "server_error",
            Self::NoMatchingPunch => "no_matching_punch",
            Self::DecryptFailed => "decrypt_failed",
            Self::UnreadableItem => "unreadable_item",
        }
    }

    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::KioskNotAuthorized
            | Self::DeviceNotAuthorized
            | Self::DeviceRevoked
            | Self::KioskNotPaired
            | Self::InvalidPairingCode
            | Self::AlreadyPaired
            | Self::TooManyAttempts
            | Self::InvalidManagerPin => ErrorCategory::Authorization,
            Self::InvalidPin | Self::AlreadyClockedIn | Self::NoOpenShift | Self::PunchTooSoon => {
                ErrorCategory::Domain
            }
            Self::InvalidFileType
            | Self::FileTooLarge
            | Self::MissingFile
            | Self::MissingFields
            | Self::InvalidAction
            | Self::InvalidPinFormat => ErrorCategory::Validation,
            Self::ServerError | Self::NoMatchingPunch => ErrorCategory::Transient,
            Self::DecryptFailed | Self::UnreadableItem => ErrorCategory::Local,
        }
    }

    pub const fn is_retryable(self) -> bool {
        matches!(self.category(), ErrorCategory::Transient)
    }

    /// Whether this code means the kiosk must pair again before sending more.
    pub const fn requires_repair(self) -> bool {
        matches!(
            self,
            Self::KioskNotAuthorized
                | Self::DeviceNotAuthorized
                | Self::DeviceRevoked
                | Self::KioskNotPaired
        )
    }

    /// Message shown to the person standing at the kiosk.
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::KioskNotAuthorized => "This kiosk is not registered with the server.",
            Self::DeviceNotAuthorized | Self::KioskNotPaired => {
                "This kiosk is not paired. Ask a manager to pair it."
            }
            Self::DeviceRevoked => "This kiosk's pairing was revoked. Ask a manager to pair it again.",
            Self::InvalidPairingCode => "Pairing code is incorrect.",
            Self::AlreadyPaired => "This kiosk is already paired. Revoke it first.",
            Self::TooManyAttempts => "Too many failed attempts. Try again later.",
            Self::InvalidManagerPin => "Manager PIN is incorrect.",
            Self::InvalidPin => "PIN not recognised.",
            Self::AlreadyClockedIn => "You're already clocked in.",
            Self::NoOpenShift => "You're not clocked in.",
            Self::PunchTooSoon => "You punched a moment ago. Please wait before punching again.",
            Self::InvalidFileType => "Photo format not supported.",
            Self::FileTooLarge => "Photo is too large.",
            Self::MissingFile => "No photo was attached.",
            Self::MissingFields => "Request is missing required fields.",
            Self::InvalidAction => "Unknown punch action.",
            Self::InvalidPinFormat => "PIN has the wrong number of digits.",
            Self::ServerError => "The server had a problem. Your punch will be retried.",
            Self::NoMatchingPunch => "Photo is waiting for its punch to sync.",
            Self::DecryptFailed => "A queued punch could not be recovered after re-pairing.",
            Self::UnreadableItem => "A queued item was damaged and was set aside.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an unrecognised error-code string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown error code: {0}")]
pub struct UnknownErrorCode(pub String);

impl FromStr for ErrorCode {
    type Err = UnknownErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownErrorCode(s.to_string()))
    }
}
