use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::payment::{PaymentPlan, PlanItem};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLineItem {
    pub description: String,
    pub amount: Decimal,
    pub taxable: bool,
    /// Tax charged on this line, already included in the payment amount.
    pub tax: Decimal,
}

/// Official receipt for a settled payment. Exactly one exists per payment;
/// line amounts plus tax always sum to the payment amount.
#[derive(Debug, Clone)]
pub struct Receipt {
    pub receipt_id: Uuid,
    pub payment_id: Uuid,
    /// Sequential human-facing number, e.g. "RCT-00000042".
    pub receipt_number: String,
    pub application_id: Uuid,
    pub plan: PaymentPlan,
    pub plan_item: PlanItem,
    pub amount: Decimal,
    pub currency: String,
    pub line_items: Vec<ReceiptLineItem>,
    pub issued_at: DateTime<Utc>,
}
