use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use service_core::error::AppError;

use crate::models::{
    ApplicationProfile, FeeScheduleSnapshot, Payment, PaymentStatus, PlanItem, ScheduleKey,
    SettlementMethod,
};
use crate::services::catalog::PricingCatalog;
use crate::services::feed::{ChangeEvent, ChangeFeed};
use crate::services::gateways::{
    CallbackOutcome, Evidence, ManualGateway, PendingHandle, ReviewVerdict, SettlementGateway,
    SettlementOutcome,
};
use crate::services::metrics;
use crate::services::receipts::ReceiptIssuer;
use crate::services::resolver::{self, ResolvedPlan};
use crate::services::store::{CasOutcome, PaymentPatch, Store};

/// The payment ledger. Owns every status transition.
///
/// All transitions are compare-and-set against the status the caller
/// observed, so two racing actors can never both move a payment. The loser
/// of a race gets a conflict, except where both sides wanted the payment
/// paid; that race is benign and the loser is handed the winner's result.
///
/// Events are published to the change feed only after the write has
/// committed.
pub struct PaymentLedger {
    store: Arc<dyn Store>,
    catalog: Arc<dyn PricingCatalog>,
    card: Arc<dyn SettlementGateway>,
    manual: Arc<ManualGateway>,
    receipts: ReceiptIssuer,
    feed: ChangeFeed,
    currency: String,
}

impl PaymentLedger {
    pub fn new(
        store: Arc<dyn Store>,
        catalog: Arc<dyn PricingCatalog>,
        card: Arc<dyn SettlementGateway>,
        manual: Arc<ManualGateway>,
        receipts: ReceiptIssuer,
        feed: ChangeFeed,
        currency: String,
    ) -> Self {
        Self {
            store,
            catalog,
            card,
            manual,
            receipts,
            feed,
            currency,
        }
    }

    /// Resolve the effective plan, next item due and its price for an
    /// application. Pure read; calling it never changes anything.
    pub async fn resolve_plan(&self, application_id: Uuid) -> Result<ResolvedPlan, AppError> {
        let profile = self.require_profile(application_id).await?;
        let history = self.store.payments_for_application(application_id).await?;

        let plan = resolver::resolve_plan(profile.payment_type_hint, &history);
        let key = ScheduleKey {
            service: profile.service,
            jurisdiction: profile.jurisdiction,
            plan,
        };
        let schedule = self.catalog.schedule(&key).await?;

        let next_item = resolver::next_item(plan, &history);
        let (amount_due, breakdown) = match next_item {
            Some(item) => (
                resolver::amount_for(&schedule, plan, item)?,
                resolver::lines_for(&schedule, plan, item),
            ),
            None => (Decimal::ZERO, Vec::new()),
        };

        Ok(ResolvedPlan {
            plan,
            next_item,
            amount_due,
            breakdown,
        })
    }

    /// Create a pending payment for one plan item. The plan is re-resolved
    /// here rather than trusted from the caller, and the schedule in force
    /// is snapshotted onto the payment.
    pub async fn create_payment(
        &self,
        application_id: Uuid,
        plan_item: PlanItem,
    ) -> Result<Payment, AppError> {
        let profile = self.require_profile(application_id).await?;
        let history = self.store.payments_for_application(application_id).await?;

        let plan = resolver::resolve_plan(profile.payment_type_hint, &history);
        let key = ScheduleKey {
            service: profile.service,
            jurisdiction: profile.jurisdiction,
            plan,
        };
        let schedule = self.catalog.schedule(&key).await?;
        let amount = resolver::amount_for(&schedule, plan, plan_item)?;

        let now = Utc::now();
        let payment = Payment {
            payment_id: Uuid::new_v4(),
            application_id,
            plan,
            plan_item,
            amount,
            currency: self.currency.clone(),
            status: PaymentStatus::Pending,
            settlement_method: None,
            external_reference: None,
            proof_ref: None,
            reference_number: None,
            confirmation_code: None,
            reviewer_note: None,
            reviewed_by: None,
            schedule_snapshot: FeeScheduleSnapshot {
                key,
                schedule: (*schedule).clone(),
                captured_at: now,
            },
            created_at: now,
            updated_at: now,
        };

        self.store.insert_payment(&payment).await?;
        metrics::PAYMENTS_CREATED_TOTAL
            .with_label_values(&[plan.as_str(), plan_item.as_str()])
            .inc();
        tracing::info!(
            payment_id = %payment.payment_id,
            application_id = %application_id,
            plan = %plan.as_str(),
            plan_item = %plan_item.as_str(),
            amount = %amount,
            "Payment created"
        );
        self.feed.publish(ChangeEvent::Insert {
            new: payment.clone(),
        });
        Ok(payment)
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<Payment, AppError> {
        self.require_payment(payment_id).await
    }

    pub async fn payments_for_application(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<Payment>, AppError> {
        self.store.payments_for_application(application_id).await
    }

    /// Start a card settlement: create a processor intent and record its
    /// reference on the payment. Status stays pending; only the callback can
    /// move it. Re-initiating replaces the recorded intent, which invalidates
    /// callbacks for the old one.
    pub async fn begin_card_settlement(
        &self,
        payment_id: Uuid,
    ) -> Result<(Payment, PendingHandle), AppError> {
        let payment = self.require_payment(payment_id).await?;
        if payment.status != PaymentStatus::Pending {
            return Err(AppError::InvalidTransition(anyhow::anyhow!(
                "card settlement can only start from pending; payment {} is {}",
                payment_id,
                payment.status.as_str()
            )));
        }

        let handle = self.card.initiate(&payment).await?;

        let patch = PaymentPatch {
            settlement_method: Some(SettlementMethod::Card),
            external_reference: handle.reference.clone(),
            ..Default::default()
        };
        match self
            .store
            .transition_payment(payment_id, PaymentStatus::Pending, patch)
            .await?
        {
            CasOutcome::Applied(updated) => {
                tracing::info!(
                    payment_id = %payment_id,
                    reference = ?handle.reference,
                    "Card settlement initiated"
                );
                self.feed.publish(ChangeEvent::Update {
                    old: payment,
                    new: updated.clone(),
                });
                Ok((updated, handle))
            }
            CasOutcome::Missed { current } => Err(AppError::Conflict(anyhow::anyhow!(
                "payment {} moved to {} while card settlement was being initiated",
                payment_id,
                current.status.as_str()
            ))),
        }
    }

    /// Apply a processor callback to a payment. The gateway checks that the
    /// callback names the recorded intent before any outcome is honored;
    /// callbacks for a stale or foreign intent fail as invalid transitions
    /// and leave the payment untouched.
    pub async fn complete_card_settlement(
        &self,
        payment_id: Uuid,
        reference: &str,
        outcome: CallbackOutcome,
    ) -> Result<Payment, AppError> {
        let payment = self.require_payment(payment_id).await?;
        let evidence = Evidence::ProcessorCallback {
            reference: reference.to_string(),
            outcome,
        };

        match self.card.confirm(&payment, &evidence).await? {
            SettlementOutcome::Settled { .. } => self.settle_from_card(payment).await,
            SettlementOutcome::Rejected { reason } => self.fail_from_card(payment, reason).await,
            SettlementOutcome::StillPending => Ok(payment),
        }
    }

    async fn settle_from_card(&self, payment: Payment) -> Result<Payment, AppError> {
        // Callbacks are delivered at least once; a repeat for an already
        // settled payment is benign.
        if payment.status == PaymentStatus::Paid {
            return Ok(payment);
        }
        if payment.status != PaymentStatus::Pending {
            return Err(AppError::InvalidTransition(anyhow::anyhow!(
                "payment {} cannot settle from {}",
                payment.payment_id,
                payment.status.as_str()
            )));
        }

        let patch = PaymentPatch {
            status: Some(PaymentStatus::Paid),
            ..Default::default()
        };
        match self
            .store
            .transition_payment(payment.payment_id, PaymentStatus::Pending, patch)
            .await?
        {
            CasOutcome::Applied(updated) => {
                metrics::TRANSITIONS_TOTAL.with_label_values(&["paid"]).inc();
                tracing::info!(
                    payment_id = %updated.payment_id,
                    "Payment settled by card processor"
                );
                self.issue_receipt(&updated).await;
                self.feed.publish(ChangeEvent::Update {
                    old: payment,
                    new: updated.clone(),
                });
                Ok(updated)
            }
            CasOutcome::Missed { current } if current.status == PaymentStatus::Paid => Ok(current),
            CasOutcome::Missed { current } => Err(AppError::Conflict(anyhow::anyhow!(
                "payment {} moved to {} while the settlement callback was being applied",
                payment.payment_id,
                current.status.as_str()
            ))),
        }
    }

    async fn fail_from_card(&self, payment: Payment, reason: String) -> Result<Payment, AppError> {
        if payment.status == PaymentStatus::Failed {
            return Ok(payment);
        }
        if payment.status != PaymentStatus::Pending {
            return Err(AppError::InvalidTransition(anyhow::anyhow!(
                "payment {} cannot fail from {}",
                payment.payment_id,
                payment.status.as_str()
            )));
        }

        let patch = PaymentPatch {
            status: Some(PaymentStatus::Failed),
            reviewer_note: Some(reason.clone()),
            ..Default::default()
        };
        match self
            .store
            .transition_payment(payment.payment_id, PaymentStatus::Pending, patch)
            .await?
        {
            CasOutcome::Applied(updated) => {
                metrics::TRANSITIONS_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                tracing::warn!(
                    payment_id = %updated.payment_id,
                    reason = %reason,
                    "Card settlement declined"
                );
                self.feed.publish(ChangeEvent::Update {
                    old: payment,
                    new: updated.clone(),
                });
                Ok(updated)
            }
            CasOutcome::Missed { current } if current.status == PaymentStatus::Failed => {
                Ok(current)
            }
            CasOutcome::Missed { current } => Err(AppError::Conflict(anyhow::anyhow!(
                "payment {} moved to {} while the decline callback was being applied",
                payment.payment_id,
                current.status.as_str()
            ))),
        }
    }

    /// Record manually submitted settlement proof and queue the payment for
    /// staff review. All validation happens before anything is written, so a
    /// rejected submission leaves the payment pending.
    pub async fn submit_manual_proof(
        &self,
        payment_id: Uuid,
        method: SettlementMethod,
        reference_number: Option<String>,
        confirmation_code: Option<String>,
        proof_ref: Option<String>,
    ) -> Result<Payment, AppError> {
        let payment = self.require_payment(payment_id).await?;
        if payment.status != PaymentStatus::Pending {
            return Err(AppError::InvalidTransition(anyhow::anyhow!(
                "proof can only be submitted for a pending payment; payment {} is {}",
                payment_id,
                payment.status.as_str()
            )));
        }

        self.manual.validate_submission(
            method,
            reference_number.as_deref(),
            confirmation_code.as_deref(),
            proof_ref.as_deref(),
        )?;

        let patch = PaymentPatch {
            status: Some(PaymentStatus::PendingApproval),
            settlement_method: Some(method),
            reference_number,
            confirmation_code,
            proof_ref,
            ..Default::default()
        };
        match self
            .store
            .transition_payment(payment_id, PaymentStatus::Pending, patch)
            .await?
        {
            CasOutcome::Applied(updated) => {
                metrics::TRANSITIONS_TOTAL
                    .with_label_values(&["pending_approval"])
                    .inc();
                tracing::info!(
                    payment_id = %payment_id,
                    method = %method.as_str(),
                    "Settlement proof submitted for review"
                );
                self.feed.publish(ChangeEvent::Update {
                    old: payment,
                    new: updated.clone(),
                });
                Ok(updated)
            }
            CasOutcome::Missed { current } => Err(AppError::Conflict(anyhow::anyhow!(
                "payment {} moved to {} while the proof was being recorded",
                payment_id,
                current.status.as_str()
            ))),
        }
    }

    /// Approve a manually settled payment. Approving an already paid payment
    /// is a no-op that reports success without issuing anything again.
    pub async fn approve_payment(
        &self,
        payment_id: Uuid,
        reviewer: &str,
        note: Option<String>,
    ) -> Result<Payment, AppError> {
        self.review(payment_id, ReviewVerdict::Approve, reviewer, note)
            .await
    }

    /// Reject a manually settled payment with a reason the payer will see.
    pub async fn reject_payment(
        &self,
        payment_id: Uuid,
        reviewer: &str,
        note: String,
    ) -> Result<Payment, AppError> {
        self.review(payment_id, ReviewVerdict::Reject, reviewer, Some(note))
            .await
    }

    async fn review(
        &self,
        payment_id: Uuid,
        verdict: ReviewVerdict,
        reviewer: &str,
        note: Option<String>,
    ) -> Result<Payment, AppError> {
        let payment = self.require_payment(payment_id).await?;

        // Two reviewers approving the same payment is expected under load.
        if verdict == ReviewVerdict::Approve && payment.status == PaymentStatus::Paid {
            tracing::info!(payment_id = %payment_id, "Approval is a no-op, payment already paid");
            return Ok(payment);
        }
        if payment.status != PaymentStatus::PendingApproval {
            return Err(AppError::InvalidTransition(anyhow::anyhow!(
                "only payments awaiting review can be {}; payment {} is {}",
                match verdict {
                    ReviewVerdict::Approve => "approved",
                    ReviewVerdict::Reject => "rejected",
                },
                payment_id,
                payment.status.as_str()
            )));
        }

        let evidence = Evidence::Review {
            verdict,
            note: note.clone(),
        };
        match self.manual.confirm(&payment, &evidence).await? {
            SettlementOutcome::Settled { .. } => {
                let patch = PaymentPatch {
                    status: Some(PaymentStatus::Paid),
                    reviewed_by: Some(reviewer.to_string()),
                    reviewer_note: note,
                    ..Default::default()
                };
                match self
                    .store
                    .transition_payment(payment_id, PaymentStatus::PendingApproval, patch)
                    .await?
                {
                    CasOutcome::Applied(updated) => {
                        metrics::TRANSITIONS_TOTAL.with_label_values(&["paid"]).inc();
                        tracing::info!(
                            payment_id = %payment_id,
                            reviewer = %reviewer,
                            "Payment approved"
                        );
                        self.issue_receipt(&updated).await;
                        self.feed.publish(ChangeEvent::Update {
                            old: payment,
                            new: updated.clone(),
                        });
                        Ok(updated)
                    }
                    CasOutcome::Missed { current }
                        if current.status == PaymentStatus::Paid =>
                    {
                        // Another reviewer won the race; their approval
                        // already issued the receipt.
                        tracing::info!(
                            payment_id = %payment_id,
                            "Lost the approval race to another reviewer"
                        );
                        Ok(current)
                    }
                    CasOutcome::Missed { current } => Err(AppError::Conflict(anyhow::anyhow!(
                        "payment {} moved to {} while being approved",
                        payment_id,
                        current.status.as_str()
                    ))),
                }
            }
            SettlementOutcome::Rejected { reason } => {
                let patch = PaymentPatch {
                    status: Some(PaymentStatus::Failed),
                    reviewed_by: Some(reviewer.to_string()),
                    reviewer_note: Some(reason.clone()),
                    ..Default::default()
                };
                match self
                    .store
                    .transition_payment(payment_id, PaymentStatus::PendingApproval, patch)
                    .await?
                {
                    CasOutcome::Applied(updated) => {
                        metrics::TRANSITIONS_TOTAL
                            .with_label_values(&["failed"])
                            .inc();
                        tracing::info!(
                            payment_id = %payment_id,
                            reviewer = %reviewer,
                            reason = %reason,
                            "Payment rejected"
                        );
                        self.feed.publish(ChangeEvent::Update {
                            old: payment,
                            new: updated.clone(),
                        });
                        Ok(updated)
                    }
                    CasOutcome::Missed { current } => Err(AppError::Conflict(anyhow::anyhow!(
                        "payment {} moved to {} while being rejected",
                        payment_id,
                        current.status.as_str()
                    ))),
                }
            }
            SettlementOutcome::StillPending => Ok(payment),
        }
    }

    /// Cancel a pending payment, releasing its slot.
    pub async fn cancel_payment(&self, payment_id: Uuid) -> Result<Payment, AppError> {
        let payment = self.require_payment(payment_id).await?;
        if payment.status != PaymentStatus::Pending {
            return Err(AppError::InvalidTransition(anyhow::anyhow!(
                "only pending payments can be cancelled; payment {} is {}",
                payment_id,
                payment.status.as_str()
            )));
        }

        let patch = PaymentPatch {
            status: Some(PaymentStatus::Cancelled),
            ..Default::default()
        };
        match self
            .store
            .transition_payment(payment_id, PaymentStatus::Pending, patch)
            .await?
        {
            CasOutcome::Applied(updated) => {
                metrics::TRANSITIONS_TOTAL
                    .with_label_values(&["cancelled"])
                    .inc();
                tracing::info!(payment_id = %payment_id, "Payment cancelled");
                self.feed.publish(ChangeEvent::Update {
                    old: payment,
                    new: updated.clone(),
                });
                Ok(updated)
            }
            CasOutcome::Missed { current } => Err(AppError::Conflict(anyhow::anyhow!(
                "payment {} moved to {} while being cancelled",
                payment_id,
                current.status.as_str()
            ))),
        }
    }

    async fn issue_receipt(&self, payment: &Payment) {
        // The transition has already committed; an issuance failure here is
        // picked up by the feed monitor, which retries through the same
        // idempotent issuer.
        if let Err(e) = self.receipts.issue(payment).await {
            tracing::error!(
                payment_id = %payment.payment_id,
                error = %e,
                "Inline receipt issuance failed"
            );
        }
    }

    async fn require_payment(&self, payment_id: Uuid) -> Result<Payment, AppError> {
        self.store.payment(payment_id).await?.ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("payment {} not found", payment_id))
        })
    }

    async fn require_profile(
        &self,
        application_id: Uuid,
    ) -> Result<ApplicationProfile, AppError> {
        self.store
            .application_profile(application_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("application {} not found", application_id))
            })
    }
}
