pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::{
    ApplicationProfile, FeeSchedule, Payment, PaymentStatus, Receipt, ScheduleKey,
    SettlementMethod,
};

/// Field updates applied alongside a status transition. `None` leaves the
/// column untouched; there is no way to clear a field, only to set one.
#[derive(Debug, Clone, Default)]
pub struct PaymentPatch {
    pub status: Option<PaymentStatus>,
    pub settlement_method: Option<SettlementMethod>,
    pub external_reference: Option<String>,
    pub proof_ref: Option<String>,
    pub reference_number: Option<String>,
    pub confirmation_code: Option<String>,
    pub reviewer_note: Option<String>,
    pub reviewed_by: Option<String>,
}

/// Result of a compare-and-set attempt on a payment row.
#[derive(Debug)]
pub enum CasOutcome {
    /// The expected status matched and the patch was applied atomically.
    Applied(Payment),
    /// The row had already moved on. Nothing was written; `current` is the
    /// row as found, so callers can decide whether the race was benign.
    Missed { current: Payment },
}

/// Persistence boundary for the fees engine.
///
/// Two implementations exist: [`MemoryStore`] for tests and local
/// development, [`PgStore`] for production. Both uphold the same contract:
/// at most one open payment per (application, plan item), transitions only
/// through compare-and-set, and at most one receipt per payment.
#[async_trait]
pub trait Store: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    async fn application_profile(
        &self,
        application_id: Uuid,
    ) -> Result<Option<ApplicationProfile>, AppError>;

    async fn fee_schedule(&self, key: &ScheduleKey) -> Result<Option<FeeSchedule>, AppError>;

    /// Insert a new payment. Fails with `Conflict` when a non-terminal
    /// payment already occupies the (application, plan item) slot.
    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError>;

    async fn payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError>;

    async fn payments_for_application(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<Payment>, AppError>;

    /// Every payment in the ledger, oldest first. Feeds the staff view.
    async fn all_payments(&self) -> Result<Vec<Payment>, AppError>;

    /// Apply `patch` if and only if the payment is still in `expected`
    /// status. A miss is not an error at this layer.
    async fn transition_payment(
        &self,
        payment_id: Uuid,
        expected: PaymentStatus,
        patch: PaymentPatch,
    ) -> Result<CasOutcome, AppError>;

    /// Insert a receipt, or return the existing one when the payment already
    /// has a receipt. Never produces two rows for one payment.
    async fn insert_receipt(&self, receipt: &Receipt) -> Result<Receipt, AppError>;

    async fn receipt_for_payment(&self, payment_id: Uuid) -> Result<Option<Receipt>, AppError>;

    /// Draw the next value from the receipt number sequence. Draws are never
    /// reused; gaps are expected when an issuance loses the insert race.
    async fn next_receipt_number(&self) -> Result<u64, AppError>;
}

impl PaymentPatch {
    pub(crate) fn apply_to(&self, payment: &mut Payment) {
        if let Some(status) = self.status {
            payment.status = status;
        }
        if let Some(method) = self.settlement_method {
            payment.settlement_method = Some(method);
        }
        if let Some(reference) = &self.external_reference {
            payment.external_reference = Some(reference.clone());
        }
        if let Some(proof) = &self.proof_ref {
            payment.proof_ref = Some(proof.clone());
        }
        if let Some(number) = &self.reference_number {
            payment.reference_number = Some(number.clone());
        }
        if let Some(code) = &self.confirmation_code {
            payment.confirmation_code = Some(code.clone());
        }
        if let Some(note) = &self.reviewer_note {
            payment.reviewer_note = Some(note.clone());
        }
        if let Some(reviewer) = &self.reviewed_by {
            payment.reviewed_by = Some(reviewer.clone());
        }
    }
}
