use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::payment::PaymentPlan;

/// Catalog key. Schedules are priced per service, per jurisdiction, per plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduleKey {
    pub service: String,
    pub jurisdiction: String,
    pub plan: PaymentPlan,
}

/// One line of a fee schedule. Lines tagged with a step belong to that
/// installment; untagged lines belong to the fee as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleLineItem {
    pub description: String,
    pub amount: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<u8>,
    #[serde(default)]
    pub taxable: bool,
}

/// A priced fee schedule. Totals are tax-inclusive and optional; when a
/// total is absent the price falls back to the matching line items.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub total_step1: Option<Decimal>,
    pub total_step2: Option<Decimal>,
    pub total_full: Option<Decimal>,
    pub tax_step1: Option<Decimal>,
    pub tax_step2: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    #[serde(default)]
    pub line_items: Vec<ScheduleLineItem>,
}

/// Schedule as captured on a payment at creation time. Later catalog edits
/// never reach back into this copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeScheduleSnapshot {
    pub key: ScheduleKey,
    pub schedule: FeeSchedule,
    pub captured_at: DateTime<Utc>,
}

/// Statutory tax rate applied to taxable line items.
pub fn tax_rate() -> Decimal {
    Decimal::new(12, 2)
}

/// Tax owed on a single line, rounded to centavos. Zero for non-taxable
/// lines.
pub fn line_tax(line: &ScheduleLineItem) -> Decimal {
    if line.taxable {
        (line.amount * tax_rate()).round_dp(2)
    } else {
        Decimal::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tax_is_twelve_percent_rounded_to_centavos() {
        let line = ScheduleLineItem {
            description: "Processing".into(),
            amount: Decimal::new(333_33, 2),
            step: None,
            taxable: true,
        };
        // 333.33 * 0.12 = 39.9996 -> 40.00
        assert_eq!(line_tax(&line), Decimal::new(40_00, 2));
    }

    #[test]
    fn non_taxable_lines_owe_nothing() {
        let line = ScheduleLineItem {
            description: "Stamp".into(),
            amount: Decimal::new(50_00, 2),
            step: Some(1),
            taxable: false,
        };
        assert_eq!(line_tax(&line), Decimal::ZERO);
    }
}
