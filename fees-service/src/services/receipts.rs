use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::{Payment, PaymentPlan, PaymentStatus, Receipt, ReceiptLineItem};
use crate::services::feed::{ChangeEvent, ChangeFeed};
use crate::services::metrics;
use crate::services::resolver;
use crate::services::store::Store;

/// Issues official receipts for settled payments, exactly once per payment.
///
/// The issuer is freely re-entrant: any number of triggers for the same
/// payment collapse into a single receipt through the store's uniqueness
/// guarantee on payment id.
#[derive(Clone)]
pub struct ReceiptIssuer {
    store: Arc<dyn Store>,
}

impl ReceiptIssuer {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Issue the receipt for a paid payment, or return the existing one.
    ///
    /// Line items come from the schedule snapshot captured when the payment
    /// was created. When the snapshot's lines do not reproduce the charged
    /// amount, or the snapshot has no lines for this item, the receipt falls
    /// back to a single consolidated line so the total always matches what
    /// was paid.
    pub async fn issue(&self, payment: &Payment) -> Result<Receipt, AppError> {
        if payment.status != PaymentStatus::Paid {
            return Err(AppError::InvalidTransition(anyhow::anyhow!(
                "receipts are only issued for paid payments, payment {} is {}",
                payment.payment_id,
                payment.status.as_str()
            )));
        }

        if let Some(existing) = self.store.receipt_for_payment(payment.payment_id).await? {
            return Ok(existing);
        }

        let line_items = line_items_for(payment);
        let number = self.store.next_receipt_number().await?;
        let receipt = Receipt {
            receipt_id: Uuid::new_v4(),
            payment_id: payment.payment_id,
            receipt_number: format!("RCT-{number:08}"),
            application_id: payment.application_id,
            plan: payment.plan,
            plan_item: payment.plan_item,
            amount: payment.amount,
            currency: payment.currency.clone(),
            line_items,
            issued_at: Utc::now(),
        };

        let stored = self.store.insert_receipt(&receipt).await?;
        if stored.receipt_id == receipt.receipt_id {
            metrics::RECEIPTS_ISSUED_TOTAL
                .with_label_values(&[payment.plan_item.as_str()])
                .inc();
            tracing::info!(
                payment_id = %payment.payment_id,
                receipt_number = %stored.receipt_number,
                "Receipt issued"
            );
        }
        Ok(stored)
    }

    pub async fn receipt_for(&self, payment_id: Uuid) -> Result<Option<Receipt>, AppError> {
        self.store.receipt_for_payment(payment_id).await
    }
}

fn line_items_for(payment: &Payment) -> Vec<ReceiptLineItem> {
    let snapshot = &payment.schedule_snapshot;
    let lines = resolver::lines_for(&snapshot.schedule, payment.plan, payment.plan_item);
    let total: Decimal = lines
        .iter()
        .map(|l| l.amount + l.tax)
        .sum::<Decimal>()
        .round_dp(2);

    if !lines.is_empty() && total == payment.amount.round_dp(2) {
        return lines;
    }

    // The snapshot's lines do not account for the charged amount. The amount
    // is authoritative, so consolidate into one line.
    vec![ReceiptLineItem {
        description: consolidated_description(payment),
        amount: payment.amount,
        taxable: false,
        tax: Decimal::ZERO,
    }]
}

fn consolidated_description(payment: &Payment) -> String {
    match payment.plan {
        PaymentPlan::Retake => "Retake fee".to_string(),
        _ => format!("{} fee", payment.plan_item.label()),
    }
}

/// Watch the change feed and issue receipts for payments landing on paid.
///
/// Issuance also happens inline on the transition path; this consumer is the
/// retry for the case where that inline write failed after the transition
/// itself had committed. Both paths funnel into the same idempotent issuer.
pub fn spawn_receipt_monitor(
    feed: ChangeFeed,
    issuer: ReceiptIssuer,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    // Subscribe before spawning so events published after this call returns
    // are never lost to the gap before the task's first poll.
    let mut rx = feed.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Receipt monitor shutting down");
                    break;
                }
                event = rx.recv() => match event {
                    Ok(ChangeEvent::Update { old, new })
                        if new.status == PaymentStatus::Paid
                            && old.status != PaymentStatus::Paid =>
                    {
                        if let Err(e) = issuer.issue(&new).await {
                            tracing::error!(
                                payment_id = %new.payment_id,
                                error = %e,
                                "Receipt issuance from change feed failed"
                            );
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Receipt monitor lagged behind the change feed");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    })
}
