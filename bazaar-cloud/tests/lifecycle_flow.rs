//! End-to-end service flows against the in-memory store and scripted gateway

mod common;

use bazaar_cloud::ServiceError;
use bazaar_cloud::db::ApplicationStore;
use bazaar_cloud::notify::NotifyKind;
use bazaar_cloud::services::attendees::AttendeeSubmission;
use bazaar_cloud::stripe::{IntentStatus, PaymentIntent};
use chrono::{Duration, Utc};
use common::*;
use rust_decimal::Decimal;
use shared::error::ErrorCode;
use shared::models::{ApplicationStatus, Attendee, BazaarApplication, BoothSize, PaymentStatus};

fn error_code(err: &ServiceError) -> Option<ErrorCode> {
    match err {
        ServiceError::Validation { code, .. } => Some(*code),
        _ => None,
    }
}

#[tokio::test]
async fn test_apply_approve_pay_issues_one_qr_per_attendee() {
    let mut h = Harness::new();
    let v = vendor("v1");

    let app = h.approved_with_documents(&v, "e1", 3).await;
    assert_eq!(app.status, ApplicationStatus::Approved);
    assert!(app.attendees_complete());
    assert_eq!(app.payment_status(), Some(PaymentStatus::Pending));
    assert_eq!(
        app.booth_end_time.unwrap().format("%Y-%m-%d").to_string(),
        "2024-01-15"
    );

    let intent_id = h.paid_intent(&v, "e1").await;
    let outcome = h
        .state
        .payments
        .confirm(&v, "e1", &intent_id)
        .await
        .unwrap();

    assert!(outcome.newly_paid);
    let paid = outcome.application;
    assert!(paid.is_paid());
    let payment = paid.payment.as_ref().unwrap();
    assert_eq!(payment.amount, Decimal::from(1000));
    assert_eq!(payment.transaction_reference.as_deref(), Some(intent_id.as_str()));
    assert!(payment.receipt_number.as_deref().unwrap().starts_with("RCPT-"));
    assert_eq!(paid.qr_codes.len(), 3);
    for i in 0..3 {
        assert!(paid.qr_codes.iter().any(|q| q.visitor_email == attendee_email(i)));
    }

    let stored = h.reload(&app.id).await.unwrap();
    assert_eq!(stored.qr_codes, paid.qr_codes);
    assert_eq!(h.notified(), vec![NotifyKind::Approved, NotifyKind::Paid]);
}

#[tokio::test]
async fn test_repeated_finalize_is_idempotent() {
    let mut h = Harness::new();
    let v = vendor("v1");
    let app = h.approved_with_documents(&v, "e1", 2).await;
    let intent_id = h.paid_intent(&v, "e1").await;

    let first = h.state.payments.finalize(&app.id, &intent_id).await.unwrap();
    assert!(first.newly_paid);

    let again = h.state.payments.finalize(&app.id, &intent_id).await.unwrap();
    assert!(!again.newly_paid);

    // A different id against an already-paid application is not re-checked
    let other = h.state.payments.finalize(&app.id, "pi_other").await.unwrap();
    assert!(!other.newly_paid);

    // Nor is the id's shape
    let malformed = h.state.payments.finalize(&app.id, "not-an-id").await.unwrap();
    assert!(!malformed.newly_paid);
    assert!(malformed.application.is_paid());

    assert_eq!(h.gateway.retrieve_calls(), 1);
    let stored = h.reload(&app.id).await.unwrap();
    assert_eq!(stored.qr_codes.len(), 2);
    assert_eq!(
        stored.payment.unwrap().transaction_reference.as_deref(),
        Some(intent_id.as_str())
    );
    assert_eq!(
        h.notified()
            .into_iter()
            .filter(|k| *k == NotifyKind::Paid)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_missing_payment_record_charges_default_fee() {
    let h = Harness::new();
    let v = vendor("v1");
    let now = Utc::now();
    let app = BazaarApplication {
        id: "legacy-1".into(),
        vendor_id: v.user_id.clone(),
        vendor_email: v.email.clone(),
        company_name: None,
        event_id: "e1".into(),
        status: ApplicationStatus::Approved,
        rejection_reason: None,
        attendees: vec![Attendee {
            name: "Mona".into(),
            email: "mona@example.com".into(),
            id_document_path: Some("documents/v1/e1/mona.pdf".into()),
        }],
        booth_size: BoothSize::TwoByTwo,
        booth_location: None,
        booth_start_time: None,
        booth_end_time: None,
        booth_duration_weeks: None,
        payment: None,
        qr_codes: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    assert!(h.store.insert(&app).await.unwrap());

    let intent = h.state.payments.create_intent(&v, "e1").await.unwrap();
    assert_eq!(intent.currency, "EGP");
    assert_eq!(intent.amount, "EGP 1,000.00");
    let scripted = h.gateway.intent(&intent.payment_intent_id).unwrap();
    assert_eq!(scripted.amount, 100_000);
    assert_eq!(scripted.application_id.as_deref(), Some("legacy-1"));

    // Creating an intent does not open a payment record
    assert!(h.reload("legacy-1").await.unwrap().payment.is_none());
}

#[tokio::test]
async fn test_finalize_after_cancel_conflicts() {
    let h = Harness::new();
    let v = vendor("v1");
    let app = h.applied(&v, "e1", 1).await;
    h.state.lifecycle.cancel_for_event(&v, "e1").await.unwrap();

    let err = h
        .state
        .payments
        .finalize(&app.id, "pi_late")
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
    assert!(h.reload(&app.id).await.is_none());
    assert_eq!(h.gateway.retrieve_calls(), 0);
}

#[tokio::test]
async fn test_paid_application_cannot_be_cancelled() {
    let h = Harness::new();
    let v = vendor("v1");
    let app = h.approved_with_documents(&v, "e1", 1).await;
    let intent_id = h.paid_intent(&v, "e1").await;
    h.state.payments.finalize(&app.id, &intent_id).await.unwrap();

    let err = h.state.lifecycle.cancel_for_event(&v, "e1").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
    assert!(h.reload(&app.id).await.unwrap().is_paid());
}

#[tokio::test]
async fn test_attendee_error_reports_index_and_keeps_list() {
    let h = Harness::new();
    let v = vendor("v1");
    let app = h.approved_with_documents(&v, "e1", 2).await;
    let before = app.attendees.clone();

    let submissions = vec![
        AttendeeSubmission::new("Attendee 0", &attendee_email(0)),
        AttendeeSubmission::new("Attendee 1", &attendee_email(1)),
        AttendeeSubmission::new("New Person", "new@example.com"),
    ];
    let err = h
        .state
        .attendees
        .update(&v, "e1", submissions)
        .await
        .unwrap_err();

    match err {
        ServiceError::Validation {
            code,
            attendee_index,
            ..
        } => {
            assert_eq!(code, ErrorCode::AttendeeDocumentMissing);
            assert_eq!(attendee_index, Some(2));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.reload(&app.id).await.unwrap().attendees, before);
}

#[tokio::test]
async fn test_existing_documents_survive_reordered_update() {
    let h = Harness::new();
    let v = vendor("v1");
    let app = h.approved_with_documents(&v, "e1", 2).await;

    let submissions = vec![
        AttendeeSubmission::new("Attendee 1", &attendee_email(1)),
        AttendeeSubmission::new("Attendee 0", &attendee_email(0)),
    ];
    let updated = h.state.attendees.update(&v, "e1", submissions).await.unwrap();

    assert_eq!(updated[0].id_document_path, app.attendees[1].id_document_path);
    assert_eq!(updated[1].id_document_path, app.attendees[0].id_document_path);
}

#[tokio::test]
async fn test_rejected_application_cannot_be_cancelled() {
    let mut h = Harness::new();
    let v = vendor("v1");
    let app = h.applied(&v, "e1", 1).await;
    let rejected = h
        .state
        .lifecycle
        .reject(&office(), "e1", &app.id, Some("Booths are full".into()))
        .await
        .unwrap();
    assert_eq!(rejected.rejection_reason.as_deref(), Some("Booths are full"));

    let err = h.state.lifecycle.cancel_for_event(&v, "e1").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
    assert_eq!(
        h.reload(&app.id).await.unwrap().status,
        ApplicationStatus::Rejected
    );
    assert_eq!(h.notified(), vec![NotifyKind::Rejected]);
}

#[tokio::test]
async fn test_gateway_timeout_leaves_payment_untouched() {
    let h = Harness::new();
    let v = vendor("v1");
    let app = h.approved_with_documents(&v, "e1", 1).await;
    let intent_id = h.paid_intent(&v, "e1").await;

    h.gateway.set_timeout(true);
    let err = h
        .state
        .payments
        .finalize(&app.id, &intent_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Gateway(_)));
    assert_eq!(
        h.reload(&app.id).await.unwrap().payment_status(),
        Some(PaymentStatus::Pending)
    );

    // Retry succeeds once the gateway is back
    h.gateway.set_timeout(false);
    let outcome = h.state.payments.finalize(&app.id, &intent_id).await.unwrap();
    assert!(outcome.newly_paid);
}

#[tokio::test]
async fn test_declined_card_surfaces_gateway_message() {
    let h = Harness::new();
    let v = vendor("v1");
    let app = h.approved_with_documents(&v, "e1", 1).await;
    let intent = h.state.payments.create_intent(&v, "e1").await.unwrap();
    h.gateway
        .decline(&intent.payment_intent_id, "Your card has insufficient funds.");

    let err = h
        .state
        .payments
        .finalize(&app.id, &intent.payment_intent_id)
        .await
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::CardDeclined));
    assert!(err.to_string().contains("insufficient funds"));
    assert!(!h.reload(&app.id).await.unwrap().is_paid());
}

#[tokio::test]
async fn test_foreign_intent_is_rejected() {
    let h = Harness::new();
    let v = vendor("v1");
    let app = h.approved_with_documents(&v, "e1", 1).await;
    h.gateway.insert(PaymentIntent {
        id: "pi_foreign".into(),
        status: IntentStatus::Succeeded,
        amount: 100_000,
        currency: "EGP".into(),
        application_id: Some("someone-else".into()),
        last_error: None,
    });

    let err = h
        .state
        .payments
        .finalize(&app.id, "pi_foreign")
        .await
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::PaymentIntentMismatch));

    // Right application, wrong amount
    h.gateway.insert(PaymentIntent {
        id: "pi_cheap".into(),
        status: IntentStatus::Succeeded,
        amount: 100,
        currency: "EGP".into(),
        application_id: Some(app.id.clone()),
        last_error: None,
    });
    let err = h
        .state
        .payments
        .finalize(&app.id, "pi_cheap")
        .await
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::PaymentIntentMismatch));
    assert!(!h.reload(&app.id).await.unwrap().is_paid());
}

#[tokio::test]
async fn test_overdue_payment_can_still_be_paid() {
    let mut h = Harness::new();
    let v = vendor("v1");
    let app = h.approved_with_documents(&v, "e1", 1).await;
    h.notified();

    let swept = h
        .state
        .payments
        .sweep_overdue(Utc::now() + Duration::days(15))
        .await
        .unwrap();
    assert_eq!(swept, 1);
    assert_eq!(
        h.reload(&app.id).await.unwrap().payment_status(),
        Some(PaymentStatus::Overdue)
    );
    assert_eq!(h.notified(), vec![NotifyKind::PaymentOverdue]);

    let intent_id = h.paid_intent(&v, "e1").await;
    let outcome = h.state.payments.finalize(&app.id, &intent_id).await.unwrap();
    assert!(outcome.newly_paid);
    assert_eq!(outcome.application.payment_status(), Some(PaymentStatus::Paid));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_finalize_pays_once() {
    let mut h = Harness::new();
    let v = vendor("v1");
    let app = h.approved_with_documents(&v, "e1", 2).await;
    let intent_id = h.paid_intent(&v, "e1").await;

    let (a, b) = tokio::join!(
        h.state.payments.finalize(&app.id, &intent_id),
        h.state.payments.finalize(&app.id, &intent_id),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(a.newly_paid ^ b.newly_paid);
    let stored = h.reload(&app.id).await.unwrap();
    assert_eq!(stored.qr_codes.len(), 2);
    assert_eq!(
        h.notified()
            .into_iter()
            .filter(|k| *k == NotifyKind::Paid)
            .count(),
        1
    );
}

#[tokio::test]
async fn test_attendees_frozen_after_payment() {
    let h = Harness::new();
    let v = vendor("v1");
    let app = h.approved_with_documents(&v, "e1", 1).await;
    let intent_id = h.paid_intent(&v, "e1").await;
    h.state.payments.finalize(&app.id, &intent_id).await.unwrap();

    let err = h
        .state
        .attendees
        .update(&v, "e1", uploads(2))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
    assert_eq!(h.reload(&app.id).await.unwrap().attendees.len(), 1);
}

#[tokio::test]
async fn test_payment_requires_approval() {
    let h = Harness::new();
    let v = vendor("v1");
    h.applied(&v, "e1", 1).await;

    let err = h.state.payments.create_intent(&v, "e1").await.unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));
    assert_eq!(h.gateway.create_calls(), 0);
}

#[tokio::test]
async fn test_payment_requires_every_document() {
    let h = Harness::new();
    let v = vendor("v1");
    let app = h.applied(&v, "e1", 3).await;
    h.state
        .lifecycle
        .approve(&office(), "e1", &app.id)
        .await
        .unwrap();

    let err = h.state.payments.create_intent(&v, "e1").await.unwrap_err();
    match err {
        ServiceError::Validation {
            code,
            attendee_index,
            ..
        } => {
            assert_eq!(code, ErrorCode::AttendeeDocumentMissing);
            assert_eq!(attendee_index, Some(0));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(h.gateway.create_calls(), 0);

    // A succeeded intent for the right amount still cannot mark it paid
    h.gateway.insert(PaymentIntent {
        id: "pi_early".into(),
        status: IntentStatus::Succeeded,
        amount: 100_000,
        currency: "EGP".into(),
        application_id: Some(app.id.clone()),
        last_error: None,
    });
    let err = h
        .state
        .payments
        .finalize(&app.id, "pi_early")
        .await
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::AttendeeDocumentMissing));
    assert_eq!(h.gateway.retrieve_calls(), 0);
    let stored = h.reload(&app.id).await.unwrap();
    assert!(!stored.is_paid());
    assert!(stored.qr_codes.is_empty());

    // Once documents are on file the same intent settles
    h.state.attendees.update(&v, "e1", uploads(3)).await.unwrap();
    let outcome = h.state.payments.finalize(&app.id, "pi_early").await.unwrap();
    assert!(outcome.newly_paid);
    assert_eq!(outcome.application.qr_codes.len(), 3);
}

#[tokio::test]
async fn test_unknown_intent_is_not_retryable() {
    let h = Harness::new();
    let v = vendor("v1");
    let app = h.approved_with_documents(&v, "e1", 1).await;

    let err = h
        .state
        .payments
        .finalize(&app.id, "pi_missing")
        .await
        .unwrap_err();
    assert_eq!(error_code(&err), Some(ErrorCode::PaymentIntentMismatch));
    assert_eq!(h.gateway.retrieve_calls(), 1);
    assert!(!h.reload(&app.id).await.unwrap().is_paid());
}
