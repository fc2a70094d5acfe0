use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::models::{Payment, PaymentStatus, PlanItem};
use crate::services::feed::ChangeEvent;

/// Client-facing view of the payments a stream covers, reconciled
/// incrementally from change events. Purely in-memory; the stream worker
/// owns one per subscriber.
#[derive(Debug, Default)]
pub struct ViewState {
    payments: HashMap<Uuid, Payment>,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole view, used after a refetch.
    pub fn replace_all(&mut self, payments: Vec<Payment>) {
        self.payments = payments
            .into_iter()
            .map(|p| (p.payment_id, p))
            .collect();
    }

    pub fn get(&self, payment_id: Uuid) -> Option<&Payment> {
        self.payments.get(&payment_id)
    }

    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }

    /// Payments ordered newest first, the order clients render.
    pub fn sorted(&self) -> Vec<&Payment> {
        let mut rows: Vec<&Payment> = self.payments.values().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// The event was applied to the view in place.
    Patched,
    /// The view cannot be trusted after this event; refetch from the store.
    NeedsRefetch,
    /// The row was dropped from the view.
    Removed,
    /// The event was older than what the view already holds.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeSeverity {
    Success,
    Alert,
    Info,
}

/// A user-visible notification derived from a status change.
#[derive(Debug, Clone, Serialize)]
pub struct Notice {
    pub payment_id: Uuid,
    pub plan_item: PlanItem,
    pub status: PaymentStatus,
    pub severity: NoticeSeverity,
    pub message: String,
}

#[derive(Debug)]
pub struct ReconcileOutcome {
    pub action: ReconcileAction,
    pub notice: Option<Notice>,
}

/// Apply one change event to the view.
///
/// Inserts always force a refetch rather than trusting the event payload;
/// the event may describe a row the scope filter let through before the
/// initial snapshot was taken, and refetching resolves both orders the
/// same way. Updates patch in place when the row is known and the event is
/// not older than the view, and surface a notice when the status changed.
pub fn apply(state: &mut ViewState, event: &ChangeEvent) -> ReconcileOutcome {
    match event {
        ChangeEvent::Insert { .. } => ReconcileOutcome {
            action: ReconcileAction::NeedsRefetch,
            notice: None,
        },
        ChangeEvent::Update { new, .. } => {
            let Some(existing) = state.payments.get(&new.payment_id) else {
                return ReconcileOutcome {
                    action: ReconcileAction::NeedsRefetch,
                    notice: None,
                };
            };
            if new.updated_at < existing.updated_at {
                return ReconcileOutcome {
                    action: ReconcileAction::Ignored,
                    notice: None,
                };
            }
            let notice = if existing.status != new.status {
                notice_for(new)
            } else {
                None
            };
            state.payments.insert(new.payment_id, new.clone());
            ReconcileOutcome {
                action: ReconcileAction::Patched,
                notice,
            }
        }
        ChangeEvent::Delete { old } => {
            state.payments.remove(&old.payment_id);
            ReconcileOutcome {
                action: ReconcileAction::Removed,
                notice: None,
            }
        }
    }
}

/// Only settled, declined and awaiting-review transitions notify the user;
/// the rest change the list without a banner.
fn notice_for(payment: &Payment) -> Option<Notice> {
    let label = payment.plan_item.label();
    let (severity, message) = match payment.status {
        PaymentStatus::Paid => (
            NoticeSeverity::Success,
            format!("Payment for {label} received"),
        ),
        PaymentStatus::Failed => {
            let message = match payment.reviewer_note.as_deref() {
                Some(reason) => format!("Payment for {label} failed: {reason}"),
                None => format!("Payment for {label} failed"),
            };
            (NoticeSeverity::Alert, message)
        }
        PaymentStatus::PendingApproval => (
            NoticeSeverity::Info,
            format!("Payment for {label} is awaiting review"),
        ),
        PaymentStatus::Pending | PaymentStatus::Cancelled => return None,
    };
    Some(Notice {
        payment_id: payment.payment_id,
        plan_item: payment.plan_item,
        status: payment.status,
        severity,
        message,
    })
}

/// Roll-up counters shown on the staff dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregates {
    pub revenue: Decimal,
    pub pending: u64,
    pub pending_approval: u64,
    pub paid: u64,
    pub failed: u64,
    pub cancelled: u64,
}

pub fn aggregates(state: &ViewState) -> Aggregates {
    let mut agg = Aggregates::default();
    for payment in state.payments.values() {
        match payment.status {
            PaymentStatus::Pending => agg.pending += 1,
            PaymentStatus::PendingApproval => agg.pending_approval += 1,
            PaymentStatus::Paid => {
                agg.paid += 1;
                agg.revenue += payment.amount;
            }
            PaymentStatus::Failed => agg.failed += 1,
            PaymentStatus::Cancelled => agg.cancelled += 1,
        }
    }
    agg
}
