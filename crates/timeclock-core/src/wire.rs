//! JSON bodies and headers exchanged between kiosk and server.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::codes::ErrorCode;
use crate::settings::Tunables;

pub const HEADER_KIOSK_CODE: &str = "x-kiosk-code";
pub const HEADER_DEVICE_TOKEN: &str = "x-device-token";
pub const HEADER_PAIRING_VERSION: &str = "x-pairing-version";

/// Direction of a punch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PunchAction {
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "OUT")]
    Out,
}

impl PunchAction {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::In => "IN",
            Self::Out => "OUT",
        }
    }
}

impl fmt::Display for PunchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PunchAction {
    type Err = ErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "IN" => Ok(Self::In),
            "OUT" => Ok(Self::Out),
            _ => Err(ErrorCode::InvalidAction),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairRequest {
    #[serde(default)]
    pub pairing_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairResponse {
    pub device_token: String,
    pub pairing_version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub paired: bool,
    pub pairing_version: Option<i64>,
    pub settings: Tunables,
}

/// Body of `POST /punch`.
///
/// Fields are optional so that missing ones produce `missing_fields` rather
/// than a generic JSON rejection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PunchRequest {
    pub event_uuid: Option<String>,
    pub action: Option<String>,
    pub pin: Option<String>,
    /// Kiosk clock at the moment of entry, Unix seconds. Untrusted.
    pub device_time: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunchStatus {
    Processed,
    Duplicate,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PunchResponse {
    pub status: PunchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shift_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effective_time: Option<i64>,
}

impl PunchResponse {
    pub const fn duplicate() -> Self {
        Self {
            status: PunchStatus::Duplicate,
            error: None,
            message: None,
            employee_name: None,
            shift_id: None,
            effective_time: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeRequest {
    #[serde(default)]
    pub pin: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeResponse {
    pub pairing_version: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoUploadResponse {
    pub status: String,
    pub event_uuid: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub status: PunchStatus,
    pub error: ErrorCode,
    pub message: String,
}
