use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::{
    ApplicationProfile, FeeSchedule, Payment, PaymentStatus, Receipt, ScheduleKey,
};
use crate::services::store::{CasOutcome, PaymentPatch, Store};

#[derive(Default)]
struct MemoryInner {
    applications: HashMap<Uuid, ApplicationProfile>,
    schedules: HashMap<ScheduleKey, FeeSchedule>,
    payments: HashMap<Uuid, Payment>,
    receipts: HashMap<Uuid, Receipt>,
}

/// In-memory store used by tests and local development. A single write lock
/// over the whole state makes slot checks and compare-and-set transitions
/// atomic without further coordination.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
    receipt_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an application profile. Profiles are portal-owned in production;
    /// this stands in for the portal writing them.
    pub async fn seed_application(&self, profile: ApplicationProfile) {
        let mut inner = self.inner.write().await;
        inner.applications.insert(profile.application_id, profile);
    }

    /// Seed or replace a fee schedule.
    pub async fn seed_schedule(&self, key: ScheduleKey, schedule: FeeSchedule) {
        let mut inner = self.inner.write().await;
        inner.schedules.insert(key, schedule);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn application_profile(
        &self,
        application_id: Uuid,
    ) -> Result<Option<ApplicationProfile>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.applications.get(&application_id).cloned())
    }

    async fn fee_schedule(&self, key: &ScheduleKey) -> Result<Option<FeeSchedule>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.schedules.get(key).cloned())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;

        let slot_taken = inner.payments.values().any(|p| {
            p.application_id == payment.application_id
                && p.plan_item == payment.plan_item
                && !p.status.is_terminal()
        });
        if slot_taken {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "an open {} payment already exists for application {}",
                payment.plan_item.as_str(),
                payment.application_id
            )));
        }

        inner.payments.insert(payment.payment_id, payment.clone());
        Ok(())
    }

    async fn payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.payments.get(&payment_id).cloned())
    }

    async fn payments_for_application(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        let inner = self.inner.read().await;
        let mut payments: Vec<Payment> = inner
            .payments
            .values()
            .filter(|p| p.application_id == application_id)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn all_payments(&self) -> Result<Vec<Payment>, AppError> {
        let inner = self.inner.read().await;
        let mut payments: Vec<Payment> = inner.payments.values().cloned().collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn transition_payment(
        &self,
        payment_id: Uuid,
        expected: PaymentStatus,
        patch: PaymentPatch,
    ) -> Result<CasOutcome, AppError> {
        let mut inner = self.inner.write().await;
        let payment = inner.payments.get_mut(&payment_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("payment {} not found", payment_id))
        })?;

        if payment.status != expected {
            return Ok(CasOutcome::Missed {
                current: payment.clone(),
            });
        }

        patch.apply_to(payment);
        payment.updated_at = Utc::now();
        Ok(CasOutcome::Applied(payment.clone()))
    }

    async fn insert_receipt(&self, receipt: &Receipt) -> Result<Receipt, AppError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.receipts.get(&receipt.payment_id) {
            return Ok(existing.clone());
        }
        inner.receipts.insert(receipt.payment_id, receipt.clone());
        Ok(receipt.clone())
    }

    async fn receipt_for_payment(&self, payment_id: Uuid) -> Result<Option<Receipt>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner.receipts.get(&payment_id).cloned())
    }

    async fn next_receipt_number(&self) -> Result<u64, AppError> {
        Ok(self.receipt_seq.fetch_add(1, Ordering::SeqCst) + 1)
    }
}
