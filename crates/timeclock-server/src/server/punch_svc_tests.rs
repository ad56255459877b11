use timeclock_core::wire::{PunchRequest, PunchStatus};
use timeclock_core::{ErrorCode, PunchAction};

use super::test_helpers::{device_headers, meta, pair_kiosk, punch_request, test_state};
use crate::auth::{Credential, hash_pin};
use crate::storage::result_status;

#[tokio::test]
async fn clock_in_and_out() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let headers = device_headers(&pair_kiosk(&state).await);
    let alice = state.db.create_employee("Alice", "1234").await.unwrap();

    let resp = state
        .punches
        .punch(&headers, &meta(), punch_request(PunchAction::In, "1234"))
        .await
        .unwrap();
    assert_eq!(resp.status, PunchStatus::Processed);
    assert!(resp.error.is_none());
    assert_eq!(resp.employee_name.as_deref(), Some("Alice"));
    let shift_id = resp.shift_id.unwrap();

    // Backdate the clock-in so the OUT is not too soon.
    sqlx::query("UPDATE shifts SET clock_in_at = clock_in_at - 3600 WHERE id = ?")
        .bind(shift_id)
        .execute(state.db.pool())
        .await
        .unwrap();
    sqlx::query("UPDATE punch_events SET effective_time = effective_time - 3600")
        .execute(state.db.pool())
        .await
        .unwrap();

    let resp = state
        .punches
        .punch(&headers, &meta(), punch_request(PunchAction::Out, "1234"))
        .await
        .unwrap();
    assert_eq!(resp.status, PunchStatus::Processed);
    assert!(resp.error.is_none());
    assert_eq!(resp.shift_id, Some(shift_id));

    let shift = state.db.get_shift(shift_id).await.unwrap();
    assert!(shift.is_closed);
    assert_eq!(shift.duration_minutes, Some(60));
    assert!(state.db.get_open_shift(alice.id).await.unwrap().is_none());
}

#[tokio::test]
async fn replay_is_duplicate_with_no_side_effects() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let headers = device_headers(&pair_kiosk(&state).await);
    let alice = state.db.create_employee("Alice", "1234").await.unwrap();
    let req = punch_request(PunchAction::In, "1234");

    let first = state.punches.punch(&headers, &meta(), req.clone()).await.unwrap();
    assert_eq!(first.status, PunchStatus::Processed);

    for _ in 0..3 {
        let again = state.punches.punch(&headers, &meta(), req.clone()).await.unwrap();
        assert_eq!(again.status, PunchStatus::Duplicate);
    }
    assert_eq!(state.db.count_punch_events().await.unwrap(), 1);
    assert_eq!(state.db.list_shifts_for_employee(alice.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn domain_rejections_are_processed_with_error() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let headers = device_headers(&pair_kiosk(&state).await);
    state.db.create_employee("Alice", "1234").await.unwrap();

    let resp = state
        .punches
        .punch(&headers, &meta(), punch_request(PunchAction::Out, "1234"))
        .await
        .unwrap();
    assert_eq!(resp.status, PunchStatus::Processed);
    assert_eq!(resp.error, Some(ErrorCode::NoOpenShift));

    state
        .punches
        .punch(&headers, &meta(), punch_request(PunchAction::In, "1234"))
        .await
        .unwrap();
    let resp = state
        .punches
        .punch(&headers, &meta(), punch_request(PunchAction::In, "1234"))
        .await
        .unwrap();
    assert_eq!(resp.error, Some(ErrorCode::AlreadyClockedIn));
    assert_eq!(resp.message.as_deref(), Some("You're already clocked in."));

    let resp = state
        .punches
        .punch(&headers, &meta(), punch_request(PunchAction::Out, "1234"))
        .await
        .unwrap();
    assert_eq!(resp.error, Some(ErrorCode::PunchTooSoon));
}

#[tokio::test]
async fn unknown_pin_is_recorded_as_invalid_pin() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let headers = device_headers(&pair_kiosk(&state).await);
    state.db.create_employee("Alice", "1234").await.unwrap();

    let req = punch_request(PunchAction::In, "9999");
    let uuid = req.event_uuid.clone().unwrap();
    let resp = state.punches.punch(&headers, &meta(), req).await.unwrap();
    assert_eq!(resp.status, PunchStatus::Processed);
    assert_eq!(resp.error, Some(ErrorCode::InvalidPin));
    assert!(resp.employee_name.is_none());

    let event = state.db.get_punch_event(&uuid).await.unwrap().unwrap();
    assert_eq!(event.result_status, result_status::REJECTED);
    assert!(event.employee_id.is_none());
    assert_eq!(event.kiosk_code, "front-door");
    assert_eq!(event.ip.as_deref(), Some("10.0.0.7"));
}

#[tokio::test]
async fn inactive_employee_cannot_punch() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let headers = device_headers(&pair_kiosk(&state).await);
    let alice = state.db.create_employee("Alice", "1234").await.unwrap();
    state.db.set_employee_active(alice.id, false).await.unwrap();

    let resp = state
        .punches
        .punch(&headers, &meta(), punch_request(PunchAction::In, "1234"))
        .await
        .unwrap();
    assert_eq!(resp.error, Some(ErrorCode::InvalidPin));
}

#[tokio::test]
async fn validation_errors() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let headers = device_headers(&pair_kiosk(&state).await);

    let err = state
        .punches
        .punch(&headers, &meta(), PunchRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingFields);

    let mut req = punch_request(PunchAction::In, "1234");
    req.event_uuid = Some("not-a-uuid".into());
    let err = state.punches.punch(&headers, &meta(), req).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingFields);

    let mut req = punch_request(PunchAction::In, "1234");
    req.action = Some("LUNCH".into());
    let err = state.punches.punch(&headers, &meta(), req).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidAction);

    for pin in ["123", "12345", "12a4"] {
        let err = state
            .punches
            .punch(&headers, &meta(), punch_request(PunchAction::In, pin))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPinFormat, "pin {pin}");
    }

    assert_eq!(state.db.count_punch_events().await.unwrap(), 0);
}

#[tokio::test]
async fn unauthorized_devices_are_refused() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let paired = pair_kiosk(&state).await;
    state.db.create_employee("Alice", "1234").await.unwrap();

    let mut headers = device_headers(&paired);
    headers.device_token = Some("0".repeat(64));
    let err = state
        .punches
        .punch(&headers, &meta(), punch_request(PunchAction::In, "1234"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DeviceRevoked);

    let mut headers = device_headers(&paired);
    headers.kiosk_code = Some("back-door".into());
    let err = state
        .punches
        .punch(&headers, &meta(), punch_request(PunchAction::In, "1234"))
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::KioskNotAuthorized);

    assert_eq!(state.db.count_punch_events().await.unwrap(), 0);
}

#[tokio::test]
async fn legacy_pin_is_upgraded_on_first_match() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let headers = device_headers(&pair_kiosk(&state).await);
    let alice = state.db.create_employee("Alice", "1234").await.unwrap();

    state
        .punches
        .punch(&headers, &meta(), punch_request(PunchAction::In, "1234"))
        .await
        .unwrap();

    let stored = state.db.get_employee(alice.id).await.unwrap().pin_credential;
    let credential = Credential::parse(&stored);
    assert!(matches!(credential, Credential::Hashed(_)));
    assert!(credential.verify("1234"));
}

#[tokio::test]
async fn hashed_pin_resolves_employee() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let headers = device_headers(&pair_kiosk(&state).await);
    state.db.create_employee("Alice", "1111").await.unwrap();
    state
        .db
        .create_employee("Bob", &hash_pin("2222").unwrap())
        .await
        .unwrap();

    let resp = state
        .punches
        .punch(&headers, &meta(), punch_request(PunchAction::In, "2222"))
        .await
        .unwrap();
    assert_eq!(resp.employee_name.as_deref(), Some("Bob"));
}

#[tokio::test]
async fn trusted_device_time_becomes_effective_time() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let headers = device_headers(&pair_kiosk(&state).await);
    state.db.create_employee("Alice", "1234").await.unwrap();

    let device_time = timeclock_core::db::unix_timestamp() - 2 * 3600;
    let mut req = punch_request(PunchAction::In, "1234");
    req.device_time = Some(device_time);
    let resp = state.punches.punch(&headers, &meta(), req).await.unwrap();
    assert_eq!(resp.effective_time, Some(device_time));

    state.settings.update("trust_device_time", "false").await.unwrap();
    let mut req = punch_request(PunchAction::Out, "1234");
    req.device_time = Some(device_time + 3600);
    let resp = state.punches.punch(&headers, &meta(), req).await.unwrap();
    assert!(resp.error.is_none());
    assert!(resp.effective_time.unwrap() > device_time + 3600);
}
