//! Storage layer tests for the Timeclock server.

use timeclock_core::db::unix_timestamp;
use timeclock_core::{ErrorCode, PunchAction};

use super::db::ServerDatabase;
use super::models::{audit_event, result_status};
use super::queries_devices::AuditParams;
use super::queries_photos::PhotoEvidenceParams;
use super::queries_punches::{NewPunch, PunchOutcome};
use crate::shift::ShiftRules;

async fn test_db() -> ServerDatabase {
    ServerDatabase::open_in_memory().await.unwrap()
}

fn punch<'a>(uuid: &'a str, employee_id: Option<i64>, action: PunchAction, at: i64) -> NewPunch<'a> {
    NewPunch {
        event_uuid: uuid,
        employee_id,
        action,
        device_time: None,
        received_at: at,
        kiosk_code: "front-door",
        device_token_hash: Some("hash"),
        ip: None,
        user_agent: None,
    }
}

// === Device authorization tests ===

#[tokio::test]
async fn ensure_kiosk_is_idempotent() {
    let db = test_db().await;
    db.ensure_kiosk("front-door").await.unwrap();
    db.ensure_kiosk("front-door").await.unwrap();

    let auth = db.get_device_authorization("front-door").await.unwrap().unwrap();
    assert_eq!(auth.pairing_version, 1);
    assert!(!auth.paired);
    assert!(auth.device_token_hash.is_none());
}

#[tokio::test]
async fn pair_only_once_until_revoked() {
    let db = test_db().await;
    db.ensure_kiosk("front-door").await.unwrap();

    assert_eq!(db.pair_device("front-door", "h1").await.unwrap(), Some(1));
    assert_eq!(db.pair_device("front-door", "h2").await.unwrap(), None);

    assert_eq!(db.revoke_device("front-door").await.unwrap(), 2);
    let auth = db.get_device_authorization("front-door").await.unwrap().unwrap();
    assert!(!auth.paired);
    assert!(auth.device_token_hash.is_none());

    assert_eq!(db.pair_device("front-door", "h3").await.unwrap(), Some(2));
    let auth = db.get_device_authorization("front-door").await.unwrap().unwrap();
    assert_eq!(auth.device_token_hash.as_deref(), Some("h3"));
}

#[tokio::test]
async fn revoke_unknown_kiosk_is_not_found() {
    let db = test_db().await;
    assert!(db.revoke_device("nowhere").await.is_err());
}

#[tokio::test]
async fn failures_are_counted_per_event_in_window() {
    let db = test_db().await;
    let fail = AuditParams {
        kiosk_code: "front-door",
        event: audit_event::PAIR,
        reason: Some("invalid_pairing_code"),
        ..AuditParams::default()
    };
    db.append_audit(&fail).await.unwrap();
    db.append_audit(&fail).await.unwrap();
    db.append_audit(&AuditParams {
        success: true,
        ..fail.clone()
    })
    .await
    .unwrap();
    db.append_audit(&AuditParams {
        event: audit_event::REVOKE,
        ..fail.clone()
    })
    .await
    .unwrap();

    let since = unix_timestamp() - 60;
    assert_eq!(
        db.count_recent_failures("front-door", audit_event::PAIR, since)
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        db.count_recent_failures("front-door", audit_event::PAIR, unix_timestamp() + 60)
            .await
            .unwrap(),
        0
    );
    assert_eq!(db.list_audit("front-door").await.unwrap().len(), 4);
}

// === Employee and settings tests ===

#[tokio::test]
async fn employees_and_credentials() {
    let db = test_db().await;
    let alice = db.create_employee("Alice", "1234").await.unwrap();
    let bob = db.create_employee("Bob", "5678").await.unwrap();
    assert!(alice.active);

    db.set_employee_active(bob.id, false).await.unwrap();
    let active = db.list_active_employees().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].name, "Alice");

    assert!(db.update_employee_credential(alice.id, "$argon2id$x").await.unwrap());
    assert_eq!(
        db.get_employee(alice.id).await.unwrap().pin_credential,
        "$argon2id$x"
    );
}

#[tokio::test]
async fn settings_upsert() {
    let db = test_db().await;
    db.set_setting("pin_length", "4").await.unwrap();
    db.set_setting("pin_length", "6").await.unwrap();
    db.set_setting("max_shift_minutes", "600").await.unwrap();

    let rows = db.list_settings().await.unwrap();
    assert_eq!(
        rows,
        vec![
            ("max_shift_minutes".to_string(), "600".to_string()),
            ("pin_length".to_string(), "6".to_string()),
        ]
    );
}

// === Punch tests ===

#[tokio::test]
async fn punch_in_then_out_closes_shift() {
    let db = test_db().await;
    let rules = ShiftRules::default();
    let emp = db.create_employee("Alice", "1234").await.unwrap();
    let t0 = 1_760_000_000;

    let outcome = db
        .record_punch(&punch("e1", Some(emp.id), PunchAction::In, t0), &rules)
        .await
        .unwrap();
    let PunchOutcome::Accepted { shift_id, .. } = outcome else {
        panic!("expected accepted, got {outcome:?}");
    };
    assert!(db.get_open_shift(emp.id).await.unwrap().is_some());

    let outcome = db
        .record_punch(&punch("e2", Some(emp.id), PunchAction::Out, t0 + 3600), &rules)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        PunchOutcome::Accepted {
            shift_id,
            effective_time: t0 + 3600,
            exceeds_max: false
        }
    );

    let shift = db.get_shift(shift_id).await.unwrap();
    assert!(shift.is_closed);
    assert_eq!(shift.duration_minutes, Some(60));
    assert!(db.get_open_shift(emp.id).await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_uuid_changes_nothing() {
    let db = test_db().await;
    let rules = ShiftRules::default();
    let emp = db.create_employee("Alice", "1234").await.unwrap();
    let p = punch("e1", Some(emp.id), PunchAction::In, 1_760_000_000);

    db.record_punch(&p, &rules).await.unwrap();
    assert_eq!(db.record_punch(&p, &rules).await.unwrap(), PunchOutcome::Duplicate);
    assert_eq!(db.count_punch_events().await.unwrap(), 1);
    assert_eq!(db.list_shifts_for_employee(emp.id).await.unwrap().len(), 1);
}

/// Poll `fut` up to `polls` times, then drop it wherever it stopped.
async fn abandon_after<F: std::future::Future>(fut: F, polls: usize) {
    let mut fut = std::pin::pin!(fut);
    for _ in 0..polls {
        let ready = std::future::poll_fn(|cx| std::task::Poll::Ready(fut.as_mut().poll(cx).is_ready())).await;
        if ready {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
    }
}

#[tokio::test]
async fn abandoned_punch_does_not_poison_the_pool() {
    let db = test_db().await;
    let rules = ShiftRules::default();
    let alice = db.create_employee("Alice", "1234").await.unwrap();
    let bob = db.create_employee("Bob", "5678").await.unwrap();
    let t0 = 1_760_000_000;

    for polls in 1..=25 {
        let uuid = format!("abandoned-{polls}");
        let p = punch(&uuid, Some(bob.id), PunchAction::In, t0);
        abandon_after(db.record_punch(&p, &rules), polls).await;
    }

    let outcome = db
        .record_punch(&punch("e1", Some(alice.id), PunchAction::In, t0), &rules)
        .await
        .unwrap();
    assert!(matches!(outcome, PunchOutcome::Accepted { .. }));
    let outcome = db
        .record_punch(&punch("e2", Some(alice.id), PunchAction::Out, t0 + 3600), &rules)
        .await
        .unwrap();
    assert!(matches!(outcome, PunchOutcome::Accepted { .. }));
    assert!(db.list_shifts_for_employee(bob.id).await.unwrap().len() <= 1);
}

#[tokio::test]
async fn rejections_are_recorded() {
    let db = test_db().await;
    let rules = ShiftRules::default();
    let emp = db.create_employee("Alice", "1234").await.unwrap();

    let outcome = db
        .record_punch(&punch("e1", Some(emp.id), PunchAction::Out, 1_760_000_000), &rules)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        PunchOutcome::Rejected {
            code: ErrorCode::NoOpenShift,
            ..
        }
    ));

    let outcome = db
        .record_punch(&punch("e2", None, PunchAction::In, 1_760_000_000), &rules)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        PunchOutcome::Rejected {
            code: ErrorCode::InvalidPin,
            ..
        }
    ));

    let event = db.get_punch_event("e2").await.unwrap().unwrap();
    assert_eq!(event.result_status, result_status::REJECTED);
    assert_eq!(event.error_code.as_deref(), Some("invalid_pin"));
    assert!(event.employee_id.is_none());
    assert!(event.shift_id.is_none());

    // A rejected event id is still consumed.
    assert_eq!(
        db.record_punch(&punch("e1", Some(emp.id), PunchAction::In, 1_760_000_000), &rules)
            .await
            .unwrap(),
        PunchOutcome::Duplicate
    );
}

#[tokio::test]
async fn second_in_is_already_clocked_in() {
    let db = test_db().await;
    let rules = ShiftRules::default();
    let emp = db.create_employee("Alice", "1234").await.unwrap();
    let t0 = 1_760_000_000;

    db.record_punch(&punch("e1", Some(emp.id), PunchAction::In, t0), &rules)
        .await
        .unwrap();
    let outcome = db
        .record_punch(&punch("e2", Some(emp.id), PunchAction::In, t0 + 600), &rules)
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        PunchOutcome::Rejected {
            code: ErrorCode::AlreadyClockedIn,
            ..
        }
    ));
    assert_eq!(db.list_shifts_for_employee(emp.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_ins_open_one_shift() {
    let dir = tempfile::tempdir().unwrap();
    let db = ServerDatabase::open(&dir.path().join("server.db")).await.unwrap();
    let emp_id = db.create_employee("Alice", "1234").await.unwrap().id;
    let rules = ShiftRules::default();

    let mut handles = Vec::new();
    for i in 0..8 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            let uuid = format!("race-{i}");
            db.record_punch(&punch(&uuid, Some(emp_id), PunchAction::In, 1_760_000_000), &rules)
                .await
                .unwrap()
        }));
    }

    let mut accepted = 0;
    for h in handles {
        match h.await.unwrap() {
            PunchOutcome::Accepted { .. } => accepted += 1,
            PunchOutcome::Rejected { code, .. } => assert_eq!(code, ErrorCode::AlreadyClockedIn),
            PunchOutcome::Duplicate => panic!("distinct uuids must not be duplicates"),
        }
    }
    assert_eq!(accepted, 1);
    assert_eq!(db.list_shifts_for_employee(emp_id).await.unwrap().len(), 1);
    assert_eq!(db.count_punch_events().await.unwrap(), 8);
}

#[tokio::test]
async fn list_punch_events_pages_by_id() {
    let db = test_db().await;
    let rules = ShiftRules::default();
    for i in 0..3 {
        db.record_punch(&punch(&format!("p{i}"), None, PunchAction::In, 1_760_000_000), &rules)
            .await
            .unwrap();
    }
    let first = db.list_punch_events(0, 2).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].event_uuid, "p0");
    let rest = db.list_punch_events(first[1].id, 10).await.unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].event_uuid, "p2");
}

#[tokio::test]
async fn employee_state_reflects_last_accepted() {
    let db = test_db().await;
    let rules = ShiftRules::default();
    let emp = db.create_employee("Alice", "1234").await.unwrap();

    assert!(db.employee_state(emp.id).await.unwrap().open_shift.is_none());
    db.record_punch(&punch("e1", Some(emp.id), PunchAction::In, 1_760_000_000), &rules)
        .await
        .unwrap();
    let state = db.employee_state(emp.id).await.unwrap();
    assert!(state.open_shift.is_some());
    assert_eq!(state.last_accepted_at, Some(1_760_000_000));
}

// === Photo evidence tests ===

#[tokio::test]
async fn photo_upsert_replaces_row() {
    let db = test_db().await;
    let rules = ShiftRules::default();
    let emp = db.create_employee("Alice", "1234").await.unwrap();
    db.record_punch(&punch("e1", Some(emp.id), PunchAction::In, 1_760_000_000), &rules)
        .await
        .unwrap();

    let first = PhotoEvidenceParams {
        event_uuid: "e1",
        action: "IN",
        device_id: "front-door",
        device_name: "Front door",
        photo_path: "/photos/a.jpg",
        content_type: "image/jpeg",
        size_bytes: 10,
    };
    assert_eq!(db.upsert_photo_evidence(&first).await.unwrap(), None);

    let second = PhotoEvidenceParams {
        photo_path: "/photos/b.png",
        content_type: "image/png",
        size_bytes: 20,
        ..first.clone()
    };
    assert_eq!(
        db.upsert_photo_evidence(&second).await.unwrap().as_deref(),
        Some("/photos/a.jpg")
    );

    let row = db.get_photo_evidence("e1").await.unwrap().unwrap();
    assert_eq!(row.photo_path, "/photos/b.png");
    assert_eq!(row.size_bytes, 20);
    assert_eq!(db.count_photo_evidence().await.unwrap(), 1);
}

#[tokio::test]
async fn photo_requires_existing_punch() {
    let db = test_db().await;
    let params = PhotoEvidenceParams {
        event_uuid: "missing",
        action: "IN",
        device_id: "front-door",
        device_name: "Front door",
        photo_path: "/photos/a.jpg",
        content_type: "image/jpeg",
        size_bytes: 10,
    };
    assert!(db.upsert_photo_evidence(&params).await.is_err());
}
