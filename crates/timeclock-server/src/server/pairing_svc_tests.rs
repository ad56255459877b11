use timeclock_core::ErrorCode;
use timeclock_core::wire::{PairRequest, RevokeRequest};

use super::guard::authorize_device;
use super::test_helpers::{
    KIOSK, MANAGER_PIN, OTHER_KIOSK, PAIRING_CODE, device_headers, meta, pair_kiosk, test_state,
};
use crate::storage::audit_event;

fn pair_req(code: &str) -> PairRequest {
    PairRequest {
        pairing_code: code.into(),
    }
}

fn revoke_req(pin: &str) -> RevokeRequest {
    RevokeRequest { pin: pin.into() }
}

#[tokio::test]
async fn pair_issues_token_at_version_one() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;

    let paired = pair_kiosk(&state).await;
    assert_eq!(paired.pairing_version, 1);
    assert_eq!(paired.device_token.len(), 64);

    let auth = state.db.get_device_authorization(KIOSK).await.unwrap().unwrap();
    assert!(auth.paired);
    assert_ne!(auth.device_token_hash.as_deref(), Some(paired.device_token.as_str()));

    let device = authorize_device(&state.db, &state.kiosks, &device_headers(&paired), &meta())
        .await
        .unwrap();
    assert_eq!(device.kiosk_name, "Front door");

    let audit = state.db.list_audit(KIOSK).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert!(audit[0].success);
    assert_eq!(audit[0].ip.as_deref(), Some("10.0.0.7"));
}

#[tokio::test]
async fn wrong_pairing_code_is_refused_and_audited() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;

    let err = state
        .pairing
        .pair(Some(KIOSK), &pair_req("PAIR-0000"), &meta())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidPairingCode);

    let audit = state.db.list_audit(KIOSK).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert!(!audit[0].success);
    assert_eq!(audit[0].reason.as_deref(), Some("invalid_pairing_code"));
}

#[tokio::test]
async fn pairing_code_of_another_kiosk_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let err = state
        .pairing
        .pair(Some(OTHER_KIOSK), &pair_req(PAIRING_CODE), &meta())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidPairingCode);
}

#[tokio::test]
async fn second_pair_is_already_paired() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let first = pair_kiosk(&state).await;

    let err = state
        .pairing
        .pair(Some(KIOSK), &pair_req(PAIRING_CODE), &meta())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AlreadyPaired);

    // The first token is untouched.
    assert!(authorize_device(&state.db, &state.kiosks, &device_headers(&first), &meta()).await.is_ok());
}

#[tokio::test]
async fn unknown_or_missing_kiosk_is_not_authorized() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;

    let err = state
        .pairing
        .pair(Some("back-door"), &pair_req(PAIRING_CODE), &meta())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::KioskNotAuthorized);

    let err = state
        .pairing
        .pair(None, &pair_req(PAIRING_CODE), &meta())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::KioskNotAuthorized);

    let err = state
        .pairing
        .revoke(Some("back-door"), &revoke_req(MANAGER_PIN), &meta())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::KioskNotAuthorized);

    // Arbitrary codes leave no audit rows behind.
    assert!(state.db.list_audit("back-door").await.unwrap().is_empty());
    assert!(state.db.list_audit("").await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_pairing_code_is_missing_fields() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let err = state
        .pairing
        .pair(Some(KIOSK), &pair_req("  "), &meta())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingFields);

    let audit = state.db.list_audit(KIOSK).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert!(!audit[0].success);
    assert_eq!(audit[0].event, audit_event::PAIR);
    assert_eq!(audit[0].reason.as_deref(), Some("missing_fields"));
}

#[tokio::test]
async fn repeated_failures_lock_out_pairing() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    state.settings.update("pair_lockout_attempts", "3").await.unwrap();

    for _ in 0..3 {
        let err = state
            .pairing
            .pair(Some(KIOSK), &pair_req("PAIR-0000"), &meta())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidPairingCode);
    }

    // Even the right code is refused while locked out.
    let err = state
        .pairing
        .pair(Some(KIOSK), &pair_req(PAIRING_CODE), &meta())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::TooManyAttempts);

    // Lockout refusals do not count towards the window.
    let since = timeclock_core::db::unix_timestamp() - 60;
    assert_eq!(
        state
            .db
            .count_recent_failures(KIOSK, audit_event::PAIR, since)
            .await
            .unwrap(),
        3
    );

    // Other kiosks are unaffected.
    assert!(
        state
            .pairing
            .pair(Some(OTHER_KIOSK), &pair_req("PAIR-0042"), &meta())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn revoke_requires_manager_pin() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let paired = pair_kiosk(&state).await;

    let err = state
        .pairing
        .revoke(Some(KIOSK), &revoke_req("0000"), &meta())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidManagerPin);
    assert!(authorize_device(&state.db, &state.kiosks, &device_headers(&paired), &meta()).await.is_ok());

    let err = state
        .pairing
        .revoke(Some(KIOSK), &revoke_req(""), &meta())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::MissingFields);

    let reasons: Vec<_> = state
        .db
        .list_audit(KIOSK)
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.event == audit_event::REVOKE)
        .map(|a| a.reason)
        .collect();
    assert_eq!(
        reasons,
        vec![
            Some("invalid_manager_pin".to_string()),
            Some("missing_fields".to_string())
        ]
    );
}

#[tokio::test]
async fn manager_pin_revokes_despite_repeated_bad_pins() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    state.settings.update("pair_lockout_attempts", "3").await.unwrap();
    let paired = pair_kiosk(&state).await;

    for _ in 0..3 {
        let err = state
            .pairing
            .revoke(Some(KIOSK), &revoke_req("1111"), &meta())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidManagerPin);
    }
    let err = state
        .pairing
        .revoke(Some(KIOSK), &revoke_req("1111"), &meta())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::TooManyAttempts);

    let resp = state
        .pairing
        .revoke(Some(KIOSK), &revoke_req(MANAGER_PIN), &meta())
        .await
        .unwrap();
    assert_eq!(resp.pairing_version, 2);

    let err = authorize_device(&state.db, &state.kiosks, &device_headers(&paired), &meta())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DeviceRevoked);
}

#[tokio::test]
async fn revoke_invalidates_old_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let old = pair_kiosk(&state).await;

    let resp = state
        .pairing
        .revoke(Some(KIOSK), &revoke_req(MANAGER_PIN), &meta())
        .await
        .unwrap();
    assert_eq!(resp.pairing_version, 2);

    let err = authorize_device(&state.db, &state.kiosks, &device_headers(&old), &meta())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DeviceRevoked);

    let new = pair_kiosk(&state).await;
    assert_eq!(new.pairing_version, 2);
    assert_ne!(new.device_token, old.device_token);

    // The old token fails even with the new version, and vice versa.
    let mut mixed = device_headers(&old);
    mixed.pairing_version = Some("2".into());
    let err = authorize_device(&state.db, &state.kiosks, &mixed, &meta()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::DeviceRevoked);

    let mut stale_version = device_headers(&new);
    stale_version.pairing_version = Some("1".into());
    let err = authorize_device(&state.db, &state.kiosks, &stale_version, &meta())
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DeviceRevoked);

    assert!(authorize_device(&state.db, &state.kiosks, &device_headers(&new), &meta()).await.is_ok());

    let revokes: Vec<_> = state
        .db
        .list_audit(KIOSK)
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.event == audit_event::REVOKE)
        .collect();
    assert_eq!(revokes.len(), 1);
    assert_eq!(revokes[0].version_before, Some(1));
    assert_eq!(revokes[0].version_after, Some(2));
}

#[tokio::test]
async fn guard_distinguishes_missing_token() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;

    let mut headers = super::extract::DeviceHeaders {
        kiosk_code: Some(KIOSK.into()),
        ..Default::default()
    };
    let err = authorize_device(&state.db, &state.kiosks, &headers, &meta()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::KioskNotPaired);

    pair_kiosk(&state).await;
    let err = authorize_device(&state.db, &state.kiosks, &headers, &meta()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::DeviceNotAuthorized);

    headers.kiosk_code = None;
    let err = authorize_device(&state.db, &state.kiosks, &headers, &meta()).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::KioskNotAuthorized);
}

#[tokio::test]
async fn guard_refusals_are_audited() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path()).await;
    let paired = pair_kiosk(&state).await;

    let mut stale = device_headers(&paired);
    stale.device_token = Some("not-the-token".into());
    authorize_device(&state.db, &state.kiosks, &stale, &meta()).await.unwrap_err();
    authorize_device(&state.db, &state.kiosks, &device_headers(&paired), &meta())
        .await
        .unwrap();

    let auth: Vec<_> = state
        .db
        .list_audit(KIOSK)
        .await
        .unwrap()
        .into_iter()
        .filter(|a| a.event == audit_event::AUTH)
        .collect();
    assert_eq!(auth.len(), 1);
    assert!(!auth[0].success);
    assert_eq!(auth[0].reason.as_deref(), Some("device_revoked"));
    assert_eq!(auth[0].ip.as_deref(), Some("10.0.0.7"));
}
