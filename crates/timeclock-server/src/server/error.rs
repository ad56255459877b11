//! HTTP error responses.
//!
//! Every non-2xx body is `{"status":"error","error":<code>,"message":...}`.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use timeclock_core::ErrorCode;
use timeclock_core::db::DatabaseError;
use timeclock_core::wire::{ErrorBody, PunchStatus};
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: code.user_message().to_string(),
        }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub const fn status(&self) -> StatusCode {
        status_for(self.code)
    }
}

/// HTTP status used when `code` is returned as an error response.
pub const fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::KioskNotAuthorized
        | ErrorCode::InvalidPairingCode
        | ErrorCode::InvalidManagerPin => StatusCode::FORBIDDEN,
        ErrorCode::DeviceNotAuthorized | ErrorCode::DeviceRevoked | ErrorCode::KioskNotPaired => {
            StatusCode::UNAUTHORIZED
        }
        ErrorCode::AlreadyPaired | ErrorCode::NoMatchingPunch => StatusCode::CONFLICT,
        ErrorCode::TooManyAttempts => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::FileTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
        ErrorCode::InvalidFileType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ErrorCode::MissingFile
        | ErrorCode::MissingFields
        | ErrorCode::InvalidAction
        | ErrorCode::InvalidPinFormat
        | ErrorCode::DecryptFailed
        | ErrorCode::UnreadableItem => StatusCode::BAD_REQUEST,
        ErrorCode::InvalidPin
        | ErrorCode::AlreadyClockedIn
        | ErrorCode::NoOpenShift
        | ErrorCode::PunchTooSoon => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::ServerError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<ErrorCode> for ApiError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        error!(error = %e, "Database error");
        Self::new(ErrorCode::ServerError)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            status: PunchStatus::Error,
            error: self.code,
            message: self.message,
        };
        (status, Json(body)).into_response()
    }
}
