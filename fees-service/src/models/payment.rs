use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::schedule::FeeScheduleSnapshot;

/// Payment plan an application is charged under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPlan {
    /// Two installments, step 1 then step 2.
    Staggered,
    /// Single payment covering the whole fee.
    Full,
    /// Repeat attempt. Priced off the step 2 totals of its schedule.
    Retake,
}

impl PaymentPlan {
    pub fn as_str(&self) -> &str {
        match self {
            PaymentPlan::Staggered => "staggered",
            PaymentPlan::Full => "full",
            PaymentPlan::Retake => "retake",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "full" => PaymentPlan::Full,
            "retake" => PaymentPlan::Retake,
            _ => PaymentPlan::Staggered,
        }
    }
}

/// Billable unit within a plan. A retake bills as `step2`; there is no
/// dedicated wire value for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanItem {
    Step1,
    Step2,
    Full,
}

impl PlanItem {
    pub fn as_str(&self) -> &str {
        match self {
            PlanItem::Step1 => "step1",
            PlanItem::Step2 => "step2",
            PlanItem::Full => "full",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "step2" => PlanItem::Step2,
            "full" => PlanItem::Full,
            _ => PlanItem::Step1,
        }
    }

    /// Human-readable form used in notices and receipt lines.
    pub fn label(&self) -> &str {
        match self {
            PlanItem::Step1 => "Step 1",
            PlanItem::Step2 => "Step 2",
            PlanItem::Full => "Full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created, no settlement evidence yet. Occupies the slot.
    Pending,
    /// Manual proof submitted, waiting for staff review. Occupies the slot.
    PendingApproval,
    Paid,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::PendingApproval => "pending_approval",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "pending_approval" => PaymentStatus::PendingApproval,
            "paid" => PaymentStatus::Paid,
            "failed" => PaymentStatus::Failed,
            "cancelled" => PaymentStatus::Cancelled,
            _ => PaymentStatus::Pending,
        }
    }

    /// Terminal rows free the (application, plan item) slot.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Paid | PaymentStatus::Failed | PaymentStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementMethod {
    /// Card processor intent confirmed by signed callback.
    Card,
    /// Mobile wallet transfer backed by an uploaded proof document.
    MobileTransfer,
    /// Over-the-counter payment identified by reference number and
    /// confirmation code.
    ManualReference,
}

impl SettlementMethod {
    pub fn as_str(&self) -> &str {
        match self {
            SettlementMethod::Card => "card",
            SettlementMethod::MobileTransfer => "mobile_transfer",
            SettlementMethod::ManualReference => "manual_reference",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "card" => SettlementMethod::Card,
            "manual_reference" => SettlementMethod::ManualReference,
            _ => SettlementMethod::MobileTransfer,
        }
    }
}

/// A single payment obligation in the ledger.
///
/// The schedule snapshot is captured at creation time so the receipt and any
/// later review see the prices the payer was actually quoted, regardless of
/// catalog edits in between.
#[derive(Debug, Clone)]
pub struct Payment {
    pub payment_id: Uuid,
    pub application_id: Uuid,
    pub plan: PaymentPlan,
    pub plan_item: PlanItem,
    pub amount: Decimal,
    pub currency: String,
    pub status: PaymentStatus,
    pub settlement_method: Option<SettlementMethod>,
    /// Intent identifier at the card processor.
    pub external_reference: Option<String>,
    /// Storage key of the uploaded proof document.
    pub proof_ref: Option<String>,
    /// Payment center reference number for counter payments.
    pub reference_number: Option<String>,
    /// Payment center confirmation code for counter payments.
    pub confirmation_code: Option<String>,
    pub reviewer_note: Option<String>,
    pub reviewed_by: Option<String>,
    pub schedule_snapshot: FeeScheduleSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
