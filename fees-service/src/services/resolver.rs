use rust_decimal::Decimal;

use service_core::error::AppError;

use crate::models::{FeeSchedule, Payment, PaymentPlan, PaymentStatus, PlanItem, ReceiptLineItem};
use crate::models::schedule::line_tax;

/// Outcome of plan resolution for an application.
#[derive(Debug, Clone)]
pub struct ResolvedPlan {
    pub plan: PaymentPlan,
    /// Next billable item, or `None` when the plan is fully settled.
    pub next_item: Option<PlanItem>,
    /// Amount due for `next_item`. Zero when nothing is due.
    pub amount_due: Decimal,
    pub breakdown: Vec<ReceiptLineItem>,
}

/// Decide the effective plan from the declared hint and the payment history.
///
/// The declared type on the application is unreliable; what the payer has
/// actually been billed wins. Rules, first match applies:
///
/// 1. hint says retake: retake, regardless of history
/// 2. history has step items and no full item: staggered
/// 3. history has a full item and no step items: full
/// 4. no history and hint says full: staggered (payers may still switch)
/// 5. otherwise the hint, defaulting to staggered
pub fn resolve_plan(hint: Option<PaymentPlan>, history: &[Payment]) -> PaymentPlan {
    if hint == Some(PaymentPlan::Retake) {
        return PaymentPlan::Retake;
    }

    let has_step_item = history
        .iter()
        .any(|p| matches!(p.plan_item, PlanItem::Step1 | PlanItem::Step2));
    let has_full_item = history.iter().any(|p| p.plan_item == PlanItem::Full);

    if has_step_item && !has_full_item {
        return PaymentPlan::Staggered;
    }
    if has_full_item && !has_step_item {
        return PaymentPlan::Full;
    }
    if history.is_empty() && hint == Some(PaymentPlan::Full) {
        return PaymentPlan::Staggered;
    }
    hint.unwrap_or(PaymentPlan::Staggered)
}

/// Next item the payer owes under `plan`, skipping items already paid.
/// Pending or failed attempts do not count as settled.
pub fn next_item(plan: PaymentPlan, history: &[Payment]) -> Option<PlanItem> {
    let paid = |item: PlanItem| {
        history
            .iter()
            .any(|p| p.plan_item == item && p.status == PaymentStatus::Paid)
    };

    match plan {
        PaymentPlan::Staggered => {
            if !paid(PlanItem::Step1) {
                Some(PlanItem::Step1)
            } else if !paid(PlanItem::Step2) {
                Some(PlanItem::Step2)
            } else {
                None
            }
        }
        PaymentPlan::Full => (!paid(PlanItem::Full)).then_some(PlanItem::Full),
        PaymentPlan::Retake => (!paid(PlanItem::Step2)).then_some(PlanItem::Step2),
    }
}

/// Price an item off a schedule. Retakes bill the step 2 total, falling back
/// to the full total, then to the step-2-tagged line items. Other plans use
/// their matching total with the line items as fallback.
pub fn amount_for(
    schedule: &FeeSchedule,
    plan: PaymentPlan,
    item: PlanItem,
) -> Result<Decimal, AppError> {
    let amount = match (plan, item) {
        (PaymentPlan::Staggered, PlanItem::Step1) => schedule
            .total_step1
            .unwrap_or_else(|| tagged_line_total(schedule, 1)),
        (PaymentPlan::Staggered, PlanItem::Step2) => schedule
            .total_step2
            .unwrap_or_else(|| tagged_line_total(schedule, 2)),
        (PaymentPlan::Full, PlanItem::Full) => schedule
            .total_full
            .unwrap_or_else(|| full_line_total(schedule)),
        (PaymentPlan::Retake, PlanItem::Step2) => schedule
            .total_step2
            .or(schedule.total_full)
            .unwrap_or_else(|| tagged_line_total(schedule, 2)),
        (plan, item) => {
            return Err(AppError::ValidationFailed(anyhow::anyhow!(
                "the {} plan does not bill a {} item",
                plan.as_str(),
                item.as_str()
            )))
        }
    };

    if amount <= Decimal::ZERO {
        return Err(AppError::ValidationFailed(anyhow::anyhow!(
            "fee schedule prices {} at {}, refusing to bill a non-positive amount",
            item.as_str(),
            amount
        )));
    }
    Ok(amount.round_dp(2))
}

/// Line items backing an item's price, with per-line tax computed. May be
/// empty when the schedule only carries totals.
pub fn lines_for(schedule: &FeeSchedule, plan: PaymentPlan, item: PlanItem) -> Vec<ReceiptLineItem> {
    let step_filter = match (plan, item) {
        (_, PlanItem::Step1) => Some(1),
        (_, PlanItem::Step2) => Some(2),
        (_, PlanItem::Full) => None,
    };

    schedule
        .line_items
        .iter()
        .filter(|line| match step_filter {
            Some(step) => line.step == Some(step),
            None => true,
        })
        .map(|line| ReceiptLineItem {
            description: line.description.clone(),
            amount: line.amount,
            taxable: line.taxable,
            tax: line_tax(line),
        })
        .collect()
}

fn tagged_line_total(schedule: &FeeSchedule, step: u8) -> Decimal {
    schedule
        .line_items
        .iter()
        .filter(|line| line.step == Some(step))
        .map(|line| line.amount + line_tax(line))
        .sum()
}

fn full_line_total(schedule: &FeeSchedule) -> Decimal {
    schedule
        .line_items
        .iter()
        .map(|line| line.amount + line_tax(line))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScheduleLineItem;
    use crate::services::fixtures;

    fn history(items: &[(PlanItem, PaymentStatus)]) -> Vec<Payment> {
        let application_id = uuid::Uuid::new_v4();
        items
            .iter()
            .map(|(item, status)| {
                fixtures::payment(application_id, PaymentPlan::Staggered, *item, *status)
            })
            .collect()
    }

    #[test]
    fn retake_hint_wins_over_any_history() {
        let history = history(&[(PlanItem::Full, PaymentStatus::Paid)]);
        assert_eq!(
            resolve_plan(Some(PaymentPlan::Retake), &history),
            PaymentPlan::Retake
        );
    }

    #[test]
    fn step_history_forces_staggered_even_when_hint_says_full() {
        let history = history(&[(PlanItem::Step1, PaymentStatus::Paid)]);
        assert_eq!(
            resolve_plan(Some(PaymentPlan::Full), &history),
            PaymentPlan::Staggered
        );
    }

    #[test]
    fn full_history_forces_full_even_when_hint_says_staggered() {
        let history = history(&[(PlanItem::Full, PaymentStatus::Pending)]);
        assert_eq!(
            resolve_plan(Some(PaymentPlan::Staggered), &history),
            PaymentPlan::Full
        );
    }

    #[test]
    fn fresh_application_hinting_full_starts_staggered() {
        assert_eq!(
            resolve_plan(Some(PaymentPlan::Full), &[]),
            PaymentPlan::Staggered
        );
    }

    #[test]
    fn mixed_history_falls_through_to_the_hint() {
        let history = history(&[
            (PlanItem::Step1, PaymentStatus::Failed),
            (PlanItem::Full, PaymentStatus::Pending),
        ]);
        assert_eq!(
            resolve_plan(Some(PaymentPlan::Full), &history),
            PaymentPlan::Full
        );
        assert_eq!(resolve_plan(None, &history), PaymentPlan::Staggered);
    }

    #[test]
    fn no_hint_no_history_defaults_to_staggered() {
        assert_eq!(resolve_plan(None, &[]), PaymentPlan::Staggered);
    }

    #[test]
    fn staggered_advances_step_by_step() {
        assert_eq!(
            next_item(PaymentPlan::Staggered, &[]),
            Some(PlanItem::Step1)
        );

        let one_paid = history(&[(PlanItem::Step1, PaymentStatus::Paid)]);
        assert_eq!(
            next_item(PaymentPlan::Staggered, &one_paid),
            Some(PlanItem::Step2)
        );

        let both_paid = history(&[
            (PlanItem::Step1, PaymentStatus::Paid),
            (PlanItem::Step2, PaymentStatus::Paid),
        ]);
        assert_eq!(next_item(PaymentPlan::Staggered, &both_paid), None);
    }

    #[test]
    fn failed_attempts_do_not_advance_the_plan() {
        let failed = history(&[(PlanItem::Step1, PaymentStatus::Failed)]);
        assert_eq!(
            next_item(PaymentPlan::Staggered, &failed),
            Some(PlanItem::Step1)
        );
    }

    #[test]
    fn retake_bills_step2_without_requiring_step1() {
        assert_eq!(next_item(PaymentPlan::Retake, &[]), Some(PlanItem::Step2));
    }

    #[test]
    fn step1_prices_from_the_step1_total() {
        let schedule = FeeSchedule {
            total_step1: Some(Decimal::new(500_00, 2)),
            total_step2: Some(Decimal::new(700_00, 2)),
            ..Default::default()
        };
        assert_eq!(
            amount_for(&schedule, PaymentPlan::Staggered, PlanItem::Step1).unwrap(),
            Decimal::new(500_00, 2)
        );
    }

    #[test]
    fn retake_falls_back_from_step2_to_full_to_tagged_lines() {
        let step2 = FeeSchedule {
            total_step2: Some(Decimal::new(700_00, 2)),
            total_full: Some(Decimal::new(1100_00, 2)),
            ..Default::default()
        };
        assert_eq!(
            amount_for(&step2, PaymentPlan::Retake, PlanItem::Step2).unwrap(),
            Decimal::new(700_00, 2)
        );

        let full_only = FeeSchedule {
            total_full: Some(Decimal::new(1100_00, 2)),
            ..Default::default()
        };
        assert_eq!(
            amount_for(&full_only, PaymentPlan::Retake, PlanItem::Step2).unwrap(),
            Decimal::new(1100_00, 2)
        );

        let lines_only = FeeSchedule {
            line_items: vec![
                ScheduleLineItem {
                    description: "Exam fee".into(),
                    amount: Decimal::new(600_00, 2),
                    step: Some(2),
                    taxable: false,
                },
                ScheduleLineItem {
                    description: "Processing".into(),
                    amount: Decimal::new(100_00, 2),
                    step: Some(2),
                    taxable: true,
                },
                ScheduleLineItem {
                    description: "Step 1 only".into(),
                    amount: Decimal::new(999_00, 2),
                    step: Some(1),
                    taxable: false,
                },
            ],
            ..Default::default()
        };
        // 600 + 100 + 12% of 100
        assert_eq!(
            amount_for(&lines_only, PaymentPlan::Retake, PlanItem::Step2).unwrap(),
            Decimal::new(712_00, 2)
        );
    }

    #[test]
    fn mismatched_plan_and_item_is_rejected() {
        let schedule = FeeSchedule {
            total_full: Some(Decimal::new(1100_00, 2)),
            ..Default::default()
        };
        let err = amount_for(&schedule, PaymentPlan::Retake, PlanItem::Step1).unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
        let err = amount_for(&schedule, PaymentPlan::Full, PlanItem::Step2).unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
    }

    #[test]
    fn zero_priced_items_are_rejected() {
        let schedule = FeeSchedule {
            total_step1: Some(Decimal::ZERO),
            ..Default::default()
        };
        let err = amount_for(&schedule, PaymentPlan::Staggered, PlanItem::Step1).unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
    }

    #[test]
    fn full_breakdown_includes_untagged_lines() {
        let schedule = fixtures::itemized_schedule();
        let lines = lines_for(&schedule, PaymentPlan::Full, PlanItem::Full);
        assert_eq!(lines.len(), schedule.line_items.len());

        let step1 = lines_for(&schedule, PaymentPlan::Staggered, PlanItem::Step1);
        assert!(step1.iter().all(|l| !l.description.contains("Step 2")));
    }
}
