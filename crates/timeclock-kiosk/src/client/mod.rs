//! Server API seen from the kiosk.
//!
//! [`KioskApi`] is the seam between the sync engines and the network; the
//! production implementation is [`ApiClient`] over reqwest.

mod http;

use std::future::Future;

use thiserror::Error;
use timeclock_core::wire::{
    PairResponse, PhotoUploadResponse, PunchRequest, PunchResponse, RevokeResponse, StatusResponse,
};
use timeclock_core::{ErrorCode, PunchAction};

pub use http::ApiClient;

use crate::credentials::DeviceCredentials;

/// Errors from talking to the server.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Server unreachable: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Server rejected request ({status}): {code}")]
    Api {
        status: u16,
        code: ErrorCode,
        message: String,
    },

    #[error("Unexpected response ({status}): {body}")]
    Unexpected { status: u16, body: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// The server's error code, if the server answered with one.
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Api { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Whether the server could not be reached at all.
    pub const fn is_offline(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout)
    }
}

/// Device headers for an authenticated request.
#[derive(Clone, Copy)]
pub struct DeviceAuth<'a> {
    pub kiosk_code: &'a str,
    pub device_token: Option<&'a str>,
    pub pairing_version: Option<i64>,
}

impl std::fmt::Debug for DeviceAuth<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceAuth")
            .field("kiosk_code", &self.kiosk_code)
            .field("device_token", &self.device_token.map(|_| "[REDACTED]"))
            .field("pairing_version", &self.pairing_version)
            .finish()
    }
}

impl<'a> DeviceAuth<'a> {
    /// Headers for a kiosk that holds no token.
    pub const fn unpaired(kiosk_code: &'a str) -> Self {
        Self {
            kiosk_code,
            device_token: None,
            pairing_version: None,
        }
    }
}

impl DeviceCredentials {
    pub fn auth(&self) -> DeviceAuth<'_> {
        DeviceAuth {
            kiosk_code: &self.kiosk_code,
            device_token: Some(&self.device_token),
            pairing_version: Some(self.pairing_version),
        }
    }
}

/// One evidence photo on its way to `/photo_upload`.
#[derive(Clone, Copy)]
pub struct PhotoSubmission<'a> {
    pub event_uuid: &'a str,
    pub action: PunchAction,
    pub device_time: i64,
    pub content_type: &'a str,
    pub bytes: &'a [u8],
}

impl std::fmt::Debug for PhotoSubmission<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhotoSubmission")
            .field("event_uuid", &self.event_uuid)
            .field("action", &self.action)
            .field("content_type", &self.content_type)
            .field("bytes", &self.bytes.len())
            .finish_non_exhaustive()
    }
}

/// Operations the kiosk performs against the server.
pub trait KioskApi: Send + Sync + 'static {
    /// Liveness probe.
    fn ping(&self) -> impl Future<Output = Result<(), ClientError>> + Send;

    fn status(&self, kiosk_code: &str) -> impl Future<Output = Result<StatusResponse, ClientError>> + Send;

    fn pair(
        &self,
        kiosk_code: &str,
        pairing_code: &str,
    ) -> impl Future<Output = Result<PairResponse, ClientError>> + Send;

    fn revoke(
        &self,
        kiosk_code: &str,
        manager_pin: &str,
    ) -> impl Future<Output = Result<RevokeResponse, ClientError>> + Send;

    fn punch(
        &self,
        auth: &DeviceAuth<'_>,
        request: &PunchRequest,
    ) -> impl Future<Output = Result<PunchResponse, ClientError>> + Send;

    fn upload_photo(
        &self,
        auth: &DeviceAuth<'_>,
        photo: &PhotoSubmission<'_>,
    ) -> impl Future<Output = Result<PhotoUploadResponse, ClientError>> + Send;
}
