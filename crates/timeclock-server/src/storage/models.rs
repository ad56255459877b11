//! Data models for Timeclock server storage.

use serde::{Deserialize, Serialize};

/// Staff record, read-only to the core apart from credential upgrades.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing)]
    pub pin_credential: String,
    pub active: bool,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceAuthorization {
    pub kiosk_code: String,
    pub device_token_hash: Option<String>,
    pub pairing_version: i64,
    pub paired: bool,
    pub paired_at: Option<i64>,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PairingAuditEntry {
    pub id: i64,
    pub kiosk_code: String,
    pub event: String,
    pub success: bool,
    pub reason: Option<String>,
    pub version_before: Option<i64>,
    pub version_after: Option<i64>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Shift {
    pub id: i64,
    pub employee_id: i64,
    pub clock_in_at: i64,
    pub clock_out_at: Option<i64>,
    pub is_closed: bool,
    pub duration_minutes: Option<i64>,
    pub exceeds_max: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PunchEvent {
    pub id: i64,
    pub event_uuid: String,
    pub employee_id: Option<i64>,
    pub action: String,
    pub device_time: Option<i64>,
    pub received_at: i64,
    pub effective_time: i64,
    pub result_status: String,
    pub error_code: Option<String>,
    pub shift_id: Option<i64>,
    pub kiosk_code: String,
    pub device_token_hash: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PhotoEvidence {
    pub event_uuid: String,
    pub action: String,
    pub device_id: String,
    pub device_name: String,
    pub photo_path: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_at: i64,
}

/// `punch_events.result_status` values.
pub mod result_status {
    pub const ACCEPTED: &str = "accepted";
    pub const REJECTED: &str = "rejected";
}

/// `pairing_audit.event` values.
pub mod audit_event {
    pub const PAIR: &str = "pair";
    pub const REVOKE: &str = "revoke";
    pub const AUTH: &str = "auth";
}
