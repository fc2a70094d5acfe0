pub mod catalog;
pub mod clock;
pub mod debounce;
pub mod feed;
pub mod gateways;
pub mod ledger;
pub mod metrics;
pub mod processor;
pub mod receipts;
pub mod reconciler;
pub mod resolver;
pub mod store;
pub mod streams;

pub use catalog::{CachingCatalog, PricingCatalog, StoreCatalog};
pub use feed::{ChangeEvent, ChangeFeed};
pub use ledger::PaymentLedger;
pub use metrics::{get_metrics, init_metrics};
pub use receipts::{spawn_receipt_monitor, ReceiptIssuer};
pub use store::{MemoryStore, PgStore, Store};
pub use streams::{StreamScope, StreamService, ViewSnapshot};

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use crate::models::{
        FeeSchedule, FeeScheduleSnapshot, Payment, PaymentPlan, PaymentStatus, PlanItem, Receipt,
        ReceiptLineItem, ScheduleKey, ScheduleLineItem,
    };

    /// Totals-only schedule used by most lifecycle tests: 500.00 for step
    /// one, 700.00 for step two, 1100.00 in full.
    pub fn totals_schedule() -> FeeSchedule {
        FeeSchedule {
            total_step1: Some(Decimal::new(500_00, 2)),
            total_step2: Some(Decimal::new(700_00, 2)),
            total_full: Some(Decimal::new(1100_00, 2)),
            ..Default::default()
        }
    }

    /// Line-item schedule whose step-two lines reproduce the 700.00 step-two
    /// total: 625.00 taxable plus 75.00 tax.
    pub fn itemized_schedule() -> FeeSchedule {
        FeeSchedule {
            line_items: vec![
                ScheduleLineItem {
                    description: "Step 1 assessment".into(),
                    amount: Decimal::new(500_00, 2),
                    step: Some(1),
                    taxable: false,
                },
                ScheduleLineItem {
                    description: "Step 2 assessment".into(),
                    amount: Decimal::new(625_00, 2),
                    step: Some(2),
                    taxable: true,
                },
                ScheduleLineItem {
                    description: "Processing".into(),
                    amount: Decimal::new(100_00, 2),
                    step: None,
                    taxable: false,
                },
            ],
            ..Default::default()
        }
    }

    pub fn snapshot(plan: PaymentPlan, schedule: FeeSchedule) -> FeeScheduleSnapshot {
        FeeScheduleSnapshot {
            key: ScheduleKey {
                service: "licensure-exam".into(),
                jurisdiction: "NCR".into(),
                plan,
            },
            schedule,
            captured_at: Utc::now(),
        }
    }

    pub fn payment(
        application_id: Uuid,
        plan: PaymentPlan,
        plan_item: PlanItem,
        status: PaymentStatus,
    ) -> Payment {
        let amount = match plan_item {
            PlanItem::Step1 => Decimal::new(500_00, 2),
            PlanItem::Step2 => Decimal::new(700_00, 2),
            PlanItem::Full => Decimal::new(1100_00, 2),
        };
        let now = Utc::now();
        Payment {
            payment_id: Uuid::new_v4(),
            application_id,
            plan,
            plan_item,
            amount,
            currency: "PHP".into(),
            status,
            settlement_method: None,
            external_reference: None,
            proof_ref: None,
            reference_number: None,
            confirmation_code: None,
            reviewer_note: None,
            reviewed_by: None,
            schedule_snapshot: snapshot(plan, totals_schedule()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn receipt(payment: &Payment, number: &str) -> Receipt {
        Receipt {
            receipt_id: Uuid::new_v4(),
            payment_id: payment.payment_id,
            receipt_number: number.to_string(),
            application_id: payment.application_id,
            plan: payment.plan,
            plan_item: payment.plan_item,
            amount: payment.amount,
            currency: payment.currency.clone(),
            line_items: vec![ReceiptLineItem {
                description: format!("{} fee", payment.plan_item.label()),
                amount: payment.amount,
                taxable: false,
                tax: Decimal::ZERO,
            }],
            issued_at: Utc::now(),
        }
    }
}
