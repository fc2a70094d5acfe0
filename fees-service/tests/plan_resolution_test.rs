//! Plan resolution integration tests for fees-service.
//!
//! Exercises GET /applications/:id/plan across the resolver's priority
//! rules: hint-only, history-over-hint and the retake override.

mod common;

use common::{as_payer, as_staff, TestApp};
use fees_service::models::{PaymentPlan, PlanItem};
use fees_service::services::Store;
use reqwest::{Client, StatusCode};
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn fresh_application_defaults_to_staggered_step1() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let application_id = app.seed_application(None).await;

    let response = as_payer(client.get(&format!(
        "{}/applications/{}/plan",
        app.http_address, application_id
    )))
    .send()
    .await
    .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["plan"], "staggered");
    assert_eq!(body["next_item"], "step1");
    assert_eq!(body["amount_due"], "500.00");

    app.cleanup().await;
}

#[tokio::test]
async fn unconfirmed_full_hint_defaults_to_staggered() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    // A full hint with zero payment history is treated as likely mis-set.
    let application_id = app.seed_application(Some(PaymentPlan::Full)).await;

    let response = as_payer(client.get(&format!(
        "{}/applications/{}/plan",
        app.http_address, application_id
    )))
    .send()
    .await
    .expect("Failed to execute request");

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["plan"], "staggered");
    assert_eq!(body["next_item"], "step1");
    assert_eq!(body["amount_due"], "500.00");

    app.cleanup().await;
}

#[tokio::test]
async fn resolution_is_repeatable_and_never_rewrites_the_hint() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let application_id = app.seed_application(Some(PaymentPlan::Full)).await;
    let url = format!("{}/applications/{}/plan", app.http_address, application_id);

    let first: serde_json::Value = as_payer(client.get(&url))
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse JSON");
    let second: serde_json::Value = as_payer(client.get(&url))
        .send()
        .await
        .expect("Failed to execute request")
        .json()
        .await
        .expect("Failed to parse JSON");
    assert_eq!(first, second);

    // Overriding the hint is a per-request decision; the stored hint is
    // never corrected in place.
    let profile = app
        .state
        .store
        .application_profile(application_id)
        .await
        .expect("store read failed")
        .expect("profile vanished");
    assert_eq!(profile.payment_type_hint, Some(PaymentPlan::Full));

    app.cleanup().await;
}

#[tokio::test]
async fn full_history_resolves_to_the_full_plan() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let application_id = app.seed_application(Some(PaymentPlan::Full)).await;
    seed_paid_payment(&app, application_id, PaymentPlan::Full, PlanItem::Full).await;

    let response = as_payer(client.get(&format!(
        "{}/applications/{}/plan",
        app.http_address, application_id
    )))
    .send()
    .await
    .expect("Failed to execute request");

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["plan"], "full");
    assert!(body["next_item"].is_null());
    assert_eq!(body["amount_due"], "0");

    app.cleanup().await;
}

#[tokio::test]
async fn paid_step1_overrides_a_full_hint() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    // The portal later flipped the declared type to full, but a step payment
    // already exists. History wins and step 2 is what is due.
    let application_id = app.seed_application(Some(PaymentPlan::Full)).await;
    seed_paid_payment(&app, application_id, PaymentPlan::Staggered, PlanItem::Step1).await;

    let response = as_payer(client.get(&format!(
        "{}/applications/{}/plan",
        app.http_address, application_id
    )))
    .send()
    .await
    .expect("Failed to execute request");

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["plan"], "staggered");
    assert_eq!(body["next_item"], "step2");
    assert_eq!(body["amount_due"], "700.00");

    app.cleanup().await;
}

#[tokio::test]
async fn retake_hint_prices_off_step2() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let application_id = app.seed_application(Some(PaymentPlan::Retake)).await;

    let response = as_payer(client.get(&format!(
        "{}/applications/{}/plan",
        app.http_address, application_id
    )))
    .send()
    .await
    .expect("Failed to execute request");

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["plan"], "retake");
    assert_eq!(body["next_item"], "step2");
    assert_eq!(body["amount_due"], "700.00");

    app.cleanup().await;
}

#[tokio::test]
async fn both_installments_settled_leaves_nothing_due() {
    let app = TestApp::spawn().await;
    let client = Client::new();
    let application_id = app.seed_application(None).await;

    // Pay both installments through the manual rail.
    for plan_item in ["step1", "step2"] {
        let created = as_payer(client.post(&format!(
            "{}/applications/{}/payments",
            app.http_address, application_id
        )))
        .json(&json!({ "plan_item": plan_item }))
        .send()
        .await
        .expect("Failed to execute request");
        assert_eq!(created.status(), StatusCode::CREATED);
        let payment: serde_json::Value = created.json().await.expect("Failed to parse JSON");
        let payment_id = payment["payment_id"].as_str().unwrap().to_string();
        submit_and_approve(&app, &client, &payment_id).await;
    }

    let response = as_payer(client.get(&format!(
        "{}/applications/{}/plan",
        app.http_address, application_id
    )))
    .send()
    .await
    .expect("Failed to execute request");

    let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
    assert_eq!(body["plan"], "staggered");
    assert!(body["next_item"].is_null());
    assert_eq!(body["amount_due"], "0");
    assert!(body["breakdown"].as_array().unwrap().is_empty());

    app.cleanup().await;
}

#[tokio::test]
async fn unknown_application_is_404() {
    let app = TestApp::spawn().await;
    let client = Client::new();

    let response = as_payer(client.get(&format!(
        "{}/applications/{}/plan",
        app.http_address,
        Uuid::new_v4()
    )))
    .send()
    .await
    .expect("Failed to execute request");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.cleanup().await;
}

/// Insert an already paid row straight into the store, bypassing the
/// ledger's plan resolution.
async fn seed_paid_payment(
    app: &TestApp,
    application_id: Uuid,
    plan: PaymentPlan,
    plan_item: PlanItem,
) {
    use chrono::Utc;
    use fees_service::models::{FeeScheduleSnapshot, Payment, PaymentStatus};
    use rust_decimal::Decimal;

    let amount = match plan_item {
        PlanItem::Step1 => Decimal::new(500_00, 2),
        PlanItem::Step2 => Decimal::new(700_00, 2),
        PlanItem::Full => Decimal::new(1100_00, 2),
    };
    let now = Utc::now();
    let payment = Payment {
        payment_id: Uuid::new_v4(),
        application_id,
        plan,
        plan_item,
        amount,
        currency: "PHP".to_string(),
        status: PaymentStatus::Paid,
        settlement_method: None,
        external_reference: None,
        proof_ref: None,
        reference_number: None,
        confirmation_code: None,
        reviewer_note: None,
        reviewed_by: None,
        schedule_snapshot: FeeScheduleSnapshot {
            key: common::schedule_key(plan),
            schedule: common::totals_schedule(),
            captured_at: now,
        },
        created_at: now,
        updated_at: now,
    };
    app.state
        .store
        .insert_payment(&payment)
        .await
        .expect("Failed to seed payment");
}

/// Drive a pending payment through proof submission and staff approval.
async fn submit_and_approve(app: &TestApp, client: &Client, payment_id: &str) {
    let submitted = as_payer(client.post(&format!(
        "{}/payments/{}/proof",
        app.http_address, payment_id
    )))
    .json(&json!({
        "method": "manual_reference",
        "reference_number": "OTC-2291",
        "confirmation_code": "CONF-88"
    }))
    .send()
    .await
    .expect("Failed to execute request");
    assert_eq!(submitted.status(), StatusCode::OK);

    let approved = as_staff(client.post(&format!(
        "{}/payments/{}/approve",
        app.http_address, payment_id
    )))
    .json(&json!({}))
    .send()
    .await
    .expect("Failed to execute request");
    assert_eq!(approved.status(), StatusCode::OK);
}
