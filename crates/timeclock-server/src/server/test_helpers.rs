//! Shared test helpers for the service test modules.

use std::path::Path;

use timeclock_core::PunchAction;
use timeclock_core::wire::{PairRequest, PairResponse, PunchRequest};

use super::extract::{ClientMeta, DeviceHeaders};
use super::routes::AppState;
use crate::config::ServerConfig;
use crate::storage::ServerDatabase;

pub const KIOSK: &str = "front-door";
pub const OTHER_KIOSK: &str = "loading-dock";
pub const PAIRING_CODE: &str = "PAIR-7731";
pub const MANAGER_PIN: &str = "2468";

pub fn test_config() -> ServerConfig {
    ServerConfig::from_toml(&format!(
        r#"
manager_pin = "{MANAGER_PIN}"

[[kiosks]]
kiosk_code = "{KIOSK}"
pairing_code = "{PAIRING_CODE}"
name = "Front door"

[[kiosks]]
kiosk_code = "{OTHER_KIOSK}"
pairing_code = "PAIR-0042"
"#
    ))
    .unwrap()
}

/// App state over an in-memory database, storing photos under `photo_dir`.
pub async fn test_state(photo_dir: &Path) -> AppState {
    let db = ServerDatabase::open_in_memory().await.unwrap();
    AppState::new(db, &test_config(), photo_dir.to_path_buf())
        .await
        .unwrap()
}

pub fn meta() -> ClientMeta {
    ClientMeta {
        ip: Some("10.0.0.7".into()),
        user_agent: Some("timeclock-kiosk/test".into()),
    }
}

/// Pair [`KIOSK`] and return its credentials.
pub async fn pair_kiosk(state: &AppState) -> PairResponse {
    state
        .pairing
        .pair(
            Some(KIOSK),
            &PairRequest {
                pairing_code: PAIRING_CODE.into(),
            },
            &meta(),
        )
        .await
        .unwrap()
}

pub fn device_headers(paired: &PairResponse) -> DeviceHeaders {
    DeviceHeaders {
        kiosk_code: Some(KIOSK.into()),
        device_token: Some(paired.device_token.clone()),
        pairing_version: Some(paired.pairing_version.to_string()),
    }
}

pub fn punch_request(action: PunchAction, pin: &str) -> PunchRequest {
    PunchRequest {
        event_uuid: Some(uuid::Uuid::new_v4().to_string()),
        action: Some(action.as_str().into()),
        pin: Some(pin.into()),
        device_time: None,
    }
}
