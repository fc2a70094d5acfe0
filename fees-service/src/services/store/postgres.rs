use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::{
    ApplicationProfile, FeeSchedule, FeeScheduleSnapshot, Payment, PaymentPlan, PaymentStatus,
    PlanItem, Receipt, ReceiptLineItem, ScheduleKey, SettlementMethod,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{CasOutcome, PaymentPatch, Store};

const PAYMENT_COLUMNS: &str = "payment_id, application_id, plan, plan_item, amount, currency, \
     status, settlement_method, external_reference, proof_ref, reference_number, \
     confirmation_code, reviewer_note, reviewed_by, schedule_snapshot, created_utc, updated_utc";

const RECEIPT_COLUMNS: &str = "receipt_id, payment_id, receipt_number, application_id, plan, \
     plan_item, amount, currency, line_items, issued_utc";

/// PostgreSQL-backed store. The open-slot invariant is enforced by a partial
/// unique index and transitions go through a single conditional UPDATE, so
/// correctness does not depend on application-side locking.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(
        url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        tracing::info!("Connecting to PostgreSQL...");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(url)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("failed to connect to PostgreSQL: {e}"))
            })?;

        tracing::info!("Successfully connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), AppError> {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("migration failed: {e}")))?;
        tracing::info!("Database migrations completed");
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct ApplicationRow {
    application_id: Uuid,
    service: String,
    jurisdiction: String,
    payment_type_hint: Option<String>,
}

impl From<ApplicationRow> for ApplicationProfile {
    fn from(row: ApplicationRow) -> Self {
        ApplicationProfile {
            application_id: row.application_id,
            service: row.service,
            jurisdiction: row.jurisdiction,
            payment_type_hint: row
                .payment_type_hint
                .as_deref()
                .map(PaymentPlan::from_string),
        }
    }
}

#[derive(sqlx::FromRow)]
struct ScheduleRow {
    total_step1: Option<Decimal>,
    total_step2: Option<Decimal>,
    total_full: Option<Decimal>,
    tax_step1: Option<Decimal>,
    tax_step2: Option<Decimal>,
    tax_amount: Option<Decimal>,
    line_items: Json<Vec<crate::models::ScheduleLineItem>>,
}

impl From<ScheduleRow> for FeeSchedule {
    fn from(row: ScheduleRow) -> Self {
        FeeSchedule {
            total_step1: row.total_step1,
            total_step2: row.total_step2,
            total_full: row.total_full,
            tax_step1: row.tax_step1,
            tax_step2: row.tax_step2,
            tax_amount: row.tax_amount,
            line_items: row.line_items.0,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    payment_id: Uuid,
    application_id: Uuid,
    plan: String,
    plan_item: String,
    amount: Decimal,
    currency: String,
    status: String,
    settlement_method: Option<String>,
    external_reference: Option<String>,
    proof_ref: Option<String>,
    reference_number: Option<String>,
    confirmation_code: Option<String>,
    reviewer_note: Option<String>,
    reviewed_by: Option<String>,
    schedule_snapshot: Json<FeeScheduleSnapshot>,
    created_utc: DateTime<Utc>,
    updated_utc: DateTime<Utc>,
}

impl From<PaymentRow> for Payment {
    fn from(row: PaymentRow) -> Self {
        Payment {
            payment_id: row.payment_id,
            application_id: row.application_id,
            plan: PaymentPlan::from_string(&row.plan),
            plan_item: PlanItem::from_string(&row.plan_item),
            amount: row.amount,
            currency: row.currency,
            status: PaymentStatus::from_string(&row.status),
            settlement_method: row
                .settlement_method
                .as_deref()
                .map(SettlementMethod::from_string),
            external_reference: row.external_reference,
            proof_ref: row.proof_ref,
            reference_number: row.reference_number,
            confirmation_code: row.confirmation_code,
            reviewer_note: row.reviewer_note,
            reviewed_by: row.reviewed_by,
            schedule_snapshot: row.schedule_snapshot.0,
            created_at: row.created_utc,
            updated_at: row.updated_utc,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReceiptRow {
    receipt_id: Uuid,
    payment_id: Uuid,
    receipt_number: String,
    application_id: Uuid,
    plan: String,
    plan_item: String,
    amount: Decimal,
    currency: String,
    line_items: Json<Vec<ReceiptLineItem>>,
    issued_utc: DateTime<Utc>,
}

impl From<ReceiptRow> for Receipt {
    fn from(row: ReceiptRow) -> Self {
        Receipt {
            receipt_id: row.receipt_id,
            payment_id: row.payment_id,
            receipt_number: row.receipt_number,
            application_id: row.application_id,
            plan: PaymentPlan::from_string(&row.plan),
            plan_item: PlanItem::from_string(&row.plan_item),
            amount: row.amount,
            currency: row.currency,
            line_items: row.line_items.0,
            issued_at: row.issued_utc,
        }
    }
}

fn db_error(context: &str, e: sqlx::Error) -> AppError {
    AppError::DatabaseError(anyhow::anyhow!("{context}: {e}"))
}

#[async_trait]
impl Store for PgStore {
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("health check", e))?;
        Ok(())
    }

    async fn application_profile(
        &self,
        application_id: Uuid,
    ) -> Result<Option<ApplicationProfile>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["application_profile"])
            .start_timer();
        let row = sqlx::query_as::<_, ApplicationRow>(
            "SELECT application_id, service, jurisdiction, payment_type_hint \
             FROM applications WHERE application_id = $1",
        )
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("fetch application profile", e));
        timer.observe_duration();

        Ok(row?.map(ApplicationProfile::from))
    }

    async fn fee_schedule(&self, key: &ScheduleKey) -> Result<Option<FeeSchedule>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["fee_schedule"])
            .start_timer();
        let row = sqlx::query_as::<_, ScheduleRow>(
            "SELECT total_step1, total_step2, total_full, tax_step1, tax_step2, tax_amount, \
             line_items FROM fee_schedules \
             WHERE service = $1 AND jurisdiction = $2 AND plan = $3",
        )
        .bind(&key.service)
        .bind(&key.jurisdiction)
        .bind(key.plan.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("fetch fee schedule", e));
        timer.observe_duration();

        Ok(row?.map(FeeSchedule::from))
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_payment"])
            .start_timer();
        let result = sqlx::query(
            "INSERT INTO payments (payment_id, application_id, plan, plan_item, amount, \
             currency, status, settlement_method, external_reference, proof_ref, \
             reference_number, confirmation_code, reviewer_note, reviewed_by, \
             schedule_snapshot, created_utc, updated_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
        )
        .bind(payment.payment_id)
        .bind(payment.application_id)
        .bind(payment.plan.as_str())
        .bind(payment.plan_item.as_str())
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(payment.status.as_str())
        .bind(payment.settlement_method.map(|m| m.as_str().to_string()))
        .bind(&payment.external_reference)
        .bind(&payment.proof_ref)
        .bind(&payment.reference_number)
        .bind(&payment.confirmation_code)
        .bind(&payment.reviewer_note)
        .bind(&payment.reviewed_by)
        .bind(Json(&payment.schedule_snapshot))
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await;
        timer.observe_duration();

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(AppError::Conflict(anyhow::anyhow!(
                    "an open {} payment already exists for application {}",
                    payment.plan_item.as_str(),
                    payment.application_id
                )))
            }
            Err(e) => Err(db_error("insert payment", e)),
        }
    }

    async fn payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment"])
            .start_timer();
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE payment_id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("fetch payment", e));
        timer.observe_duration();

        Ok(row?.map(Payment::from))
    }

    async fn payments_for_application(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["payments_for_application"])
            .start_timer();
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE application_id = $1 ORDER BY created_utc ASC"
        ))
        .bind(application_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("fetch application payments", e));
        timer.observe_duration();

        Ok(rows?.into_iter().map(Payment::from).collect())
    }

    async fn all_payments(&self) -> Result<Vec<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["all_payments"])
            .start_timer();
        let rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments ORDER BY created_utc ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("fetch all payments", e));
        timer.observe_duration();

        Ok(rows?.into_iter().map(Payment::from).collect())
    }

    async fn transition_payment(
        &self,
        payment_id: Uuid,
        expected: PaymentStatus,
        patch: PaymentPatch,
    ) -> Result<CasOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["transition_payment"])
            .start_timer();
        let updated = sqlx::query_as::<_, PaymentRow>(&format!(
            "UPDATE payments SET \
                 status = COALESCE($3, status), \
                 settlement_method = COALESCE($4, settlement_method), \
                 external_reference = COALESCE($5, external_reference), \
                 proof_ref = COALESCE($6, proof_ref), \
                 reference_number = COALESCE($7, reference_number), \
                 confirmation_code = COALESCE($8, confirmation_code), \
                 reviewer_note = COALESCE($9, reviewer_note), \
                 reviewed_by = COALESCE($10, reviewed_by), \
                 updated_utc = now() \
             WHERE payment_id = $1 AND status = $2 \
             RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(payment_id)
        .bind(expected.as_str())
        .bind(patch.status.map(|s| s.as_str().to_string()))
        .bind(patch.settlement_method.map(|m| m.as_str().to_string()))
        .bind(&patch.external_reference)
        .bind(&patch.proof_ref)
        .bind(&patch.reference_number)
        .bind(&patch.confirmation_code)
        .bind(&patch.reviewer_note)
        .bind(&patch.reviewed_by)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("transition payment", e));
        timer.observe_duration();

        if let Some(row) = updated? {
            return Ok(CasOutcome::Applied(Payment::from(row)));
        }

        // The conditional update hit nothing: either the row moved on or it
        // never existed. Read it back to tell the two apart.
        match self.payment(payment_id).await? {
            Some(current) => Ok(CasOutcome::Missed { current }),
            None => Err(AppError::NotFound(anyhow::anyhow!(
                "payment {} not found",
                payment_id
            ))),
        }
    }

    async fn insert_receipt(&self, receipt: &Receipt) -> Result<Receipt, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_receipt"])
            .start_timer();
        let inserted = sqlx::query_as::<_, ReceiptRow>(&format!(
            "INSERT INTO receipts (receipt_id, payment_id, receipt_number, application_id, \
             plan, plan_item, amount, currency, line_items, issued_utc) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (payment_id) DO NOTHING \
             RETURNING {RECEIPT_COLUMNS}"
        ))
        .bind(receipt.receipt_id)
        .bind(receipt.payment_id)
        .bind(&receipt.receipt_number)
        .bind(receipt.application_id)
        .bind(receipt.plan.as_str())
        .bind(receipt.plan_item.as_str())
        .bind(receipt.amount)
        .bind(&receipt.currency)
        .bind(Json(&receipt.line_items))
        .bind(receipt.issued_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("insert receipt", e));
        timer.observe_duration();

        if let Some(row) = inserted? {
            return Ok(Receipt::from(row));
        }

        // Lost the insert race; the winner's row is the receipt of record.
        self.receipt_for_payment(receipt.payment_id)
            .await?
            .ok_or_else(|| {
                AppError::DatabaseError(anyhow::anyhow!(
                    "receipt insert for payment {} conflicted but no row exists",
                    receipt.payment_id
                ))
            })
    }

    async fn receipt_for_payment(&self, payment_id: Uuid) -> Result<Option<Receipt>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["receipt_for_payment"])
            .start_timer();
        let row = sqlx::query_as::<_, ReceiptRow>(&format!(
            "SELECT {RECEIPT_COLUMNS} FROM receipts WHERE payment_id = $1"
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("fetch receipt", e));
        timer.observe_duration();

        Ok(row?.map(Receipt::from))
    }

    async fn next_receipt_number(&self) -> Result<u64, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["next_receipt_number"])
            .start_timer();
        let value = sqlx::query_scalar::<_, i64>("SELECT nextval('receipt_number_seq')")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_error("draw receipt number", e));
        timer.observe_duration();

        Ok(value? as u64)
    }
}
