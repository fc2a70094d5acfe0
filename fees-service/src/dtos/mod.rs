use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    Payment, PaymentPlan, PaymentStatus, PlanItem, Receipt, ReceiptLineItem, SettlementMethod,
};
use crate::services::reconciler::{Aggregates, Notice};
use crate::services::resolver::ResolvedPlan;
use crate::services::streams::ViewSnapshot;

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    pub plan_item: PlanItem,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitProofRequest {
    pub method: SettlementMethod,
    #[validate(length(min = 1, message = "Reference number cannot be empty"))]
    pub reference_number: Option<String>,
    #[validate(length(min = 1, message = "Confirmation code cannot be empty"))]
    pub confirmation_code: Option<String>,
    #[validate(length(min = 1, message = "Proof reference cannot be empty"))]
    pub proof_ref: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub note: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectRequest {
    #[validate(length(min = 1, message = "A rejection reason is required"))]
    pub note: String,
}

#[derive(Debug, Serialize)]
pub struct PaymentResponse {
    pub payment_id: Uuid,
    pub application_id: Uuid,
    pub plan: PaymentPlan,
    pub plan_item: PlanItem,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub settlement_method: Option<SettlementMethod>,
    pub external_reference: Option<String>,
    pub proof_ref: Option<String>,
    pub reference_number: Option<String>,
    pub confirmation_code: Option<String>,
    pub reviewer_note: Option<String>,
    pub reviewed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentResponse {
    fn from(p: Payment) -> Self {
        Self {
            payment_id: p.payment_id,
            application_id: p.application_id,
            plan: p.plan,
            plan_item: p.plan_item,
            amount: p.amount,
            currency: p.currency,
            status: p.status,
            settlement_method: p.settlement_method,
            external_reference: p.external_reference,
            proof_ref: p.proof_ref,
            reference_number: p.reference_number,
            confirmation_code: p.confirmation_code,
            reviewer_note: p.reviewer_note,
            reviewed_by: p.reviewed_by,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PaymentListResponse {
    pub payments: Vec<PaymentResponse>,
}

#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub application_id: Uuid,
    pub plan: PaymentPlan,
    pub next_item: Option<PlanItem>,
    pub amount_due: Decimal,
    pub breakdown: Vec<ReceiptLineItem>,
}

impl PlanResponse {
    pub fn from_resolved(application_id: Uuid, resolved: ResolvedPlan) -> Self {
        Self {
            application_id,
            plan: resolved.plan,
            next_item: resolved.next_item,
            amount_due: resolved.amount_due,
            breakdown: resolved.breakdown,
        }
    }
}

/// Returned when a card settlement is initiated; the client handle is what
/// the browser hands to the processor's widget.
#[derive(Debug, Serialize)]
pub struct CardIntentResponse {
    pub payment_id: Uuid,
    pub reference: Option<String>,
    pub client_handle: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReceiptResponse {
    pub receipt_id: Uuid,
    pub payment_id: Uuid,
    pub receipt_number: String,
    pub application_id: Uuid,
    pub plan: PaymentPlan,
    pub plan_item: PlanItem,
    pub amount: Decimal,
    pub currency: String,
    pub line_items: Vec<ReceiptLineItem>,
    pub issued_at: DateTime<Utc>,
}

impl From<Receipt> for ReceiptResponse {
    fn from(r: Receipt) -> Self {
        Self {
            receipt_id: r.receipt_id,
            payment_id: r.payment_id,
            receipt_number: r.receipt_number,
            application_id: r.application_id,
            plan: r.plan,
            plan_item: r.plan_item,
            amount: r.amount,
            currency: r.currency,
            line_items: r.line_items,
            issued_at: r.issued_at,
        }
    }
}

/// One SSE frame of a reconciled view stream.
#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub payments: Vec<PaymentResponse>,
    pub aggregates: Aggregates,
    pub notices: Vec<Notice>,
}

impl From<ViewSnapshot> for SnapshotResponse {
    fn from(s: ViewSnapshot) -> Self {
        Self {
            payments: s.payments.into_iter().map(PaymentResponse::from).collect(),
            aggregates: s.aggregates,
            notices: s.notices,
        }
    }
}
