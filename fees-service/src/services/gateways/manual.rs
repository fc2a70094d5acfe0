use async_trait::async_trait;

use service_core::error::AppError;

use crate::models::{Payment, SettlementMethod};
use crate::services::gateways::{
    Evidence, GatewayError, PendingHandle, ReviewVerdict, SettlementGateway, SettlementOutcome,
};

/// Manual settlement: the payer moves money outside the system, submits
/// proof, and a staff reviewer decides. Nothing external needs to be set up,
/// so initiation hands back an empty handle and all validation happens when
/// the proof is submitted.
pub struct ManualGateway;

fn present(value: Option<&str>) -> bool {
    value.is_some_and(|s| !s.trim().is_empty())
}

impl ManualGateway {
    /// Validate a proof submission before anything is recorded. Mobile
    /// transfers need an uploaded proof document; counter payments need the
    /// payment center reference number and confirmation code.
    pub fn validate_submission(
        &self,
        method: SettlementMethod,
        reference_number: Option<&str>,
        confirmation_code: Option<&str>,
        proof_ref: Option<&str>,
    ) -> Result<(), AppError> {
        match method {
            SettlementMethod::MobileTransfer => {
                if !present(proof_ref) {
                    return Err(AppError::ValidationFailed(anyhow::anyhow!(
                        "a proof of payment upload is required for mobile transfers"
                    )));
                }
                Ok(())
            }
            SettlementMethod::ManualReference => {
                if !present(reference_number) || !present(confirmation_code) {
                    return Err(AppError::ValidationFailed(anyhow::anyhow!(
                        "the payment center reference number and confirmation code are both required"
                    )));
                }
                Ok(())
            }
            SettlementMethod::Card => Err(AppError::ValidationFailed(anyhow::anyhow!(
                "card settlements are confirmed by the processor callback, not by manual proof"
            ))),
        }
    }
}

#[async_trait]
impl SettlementGateway for ManualGateway {
    fn name(&self) -> &'static str {
        "manual"
    }

    async fn initiate(&self, _payment: &Payment) -> Result<PendingHandle, GatewayError> {
        Ok(PendingHandle::default())
    }

    async fn confirm(
        &self,
        _payment: &Payment,
        evidence: &Evidence,
    ) -> Result<SettlementOutcome, GatewayError> {
        let Evidence::Review { verdict, note } = evidence else {
            return Err(GatewayError::UnsupportedEvidence("manual"));
        };

        Ok(match verdict {
            ReviewVerdict::Approve => SettlementOutcome::Settled { reference: None },
            ReviewVerdict::Reject => SettlementOutcome::Rejected {
                reason: note
                    .clone()
                    .unwrap_or_else(|| "rejected by reviewer".to_string()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_transfer_requires_a_proof_document() {
        let gateway = ManualGateway;

        let err = gateway
            .validate_submission(SettlementMethod::MobileTransfer, Some("REF-1"), None, None)
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));

        // Whitespace does not count as a proof.
        let err = gateway
            .validate_submission(SettlementMethod::MobileTransfer, None, None, Some("  "))
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));

        gateway
            .validate_submission(
                SettlementMethod::MobileTransfer,
                None,
                None,
                Some("uploads/proof-1.jpg"),
            )
            .unwrap();
    }

    #[test]
    fn counter_payment_requires_reference_and_confirmation() {
        let gateway = ManualGateway;

        let err = gateway
            .validate_submission(SettlementMethod::ManualReference, Some("REF-1"), None, None)
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));

        let err = gateway
            .validate_submission(SettlementMethod::ManualReference, None, Some("CONF-1"), None)
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));

        gateway
            .validate_submission(
                SettlementMethod::ManualReference,
                Some("REF-1"),
                Some("CONF-1"),
                None,
            )
            .unwrap();
    }

    #[test]
    fn card_method_cannot_be_settled_manually() {
        let gateway = ManualGateway;
        let err = gateway
            .validate_submission(SettlementMethod::Card, Some("REF-1"), Some("CONF-1"), None)
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn review_verdicts_map_onto_settlement_outcomes() {
        let gateway = ManualGateway;
        let payment = crate::services::fixtures::payment(
            uuid::Uuid::new_v4(),
            crate::models::PaymentPlan::Staggered,
            crate::models::PlanItem::Step1,
            crate::models::PaymentStatus::PendingApproval,
        );

        let approve = Evidence::Review {
            verdict: ReviewVerdict::Approve,
            note: None,
        };
        assert_eq!(
            gateway.confirm(&payment, &approve).await.unwrap(),
            SettlementOutcome::Settled { reference: None }
        );

        let reject = Evidence::Review {
            verdict: ReviewVerdict::Reject,
            note: Some("amount does not match the deposit slip".to_string()),
        };
        assert_eq!(
            gateway.confirm(&payment, &reject).await.unwrap(),
            SettlementOutcome::Rejected {
                reason: "amount does not match the deposit slip".to_string()
            }
        );
    }
}
