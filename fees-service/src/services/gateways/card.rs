use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::models::Payment;
use crate::services::gateways::{
    CallbackOutcome, Evidence, GatewayError, PendingHandle, SettlementGateway, SettlementOutcome,
};
use crate::services::metrics;
use crate::services::processor::ProcessorClient;

/// Card settlement through the external processor.
///
/// Initiation creates a payment intent under a fixed retry budget and records
/// nothing on failure, so a failed attempt can simply be retried.
/// Confirmation interprets the signed callback, but only after checking that
/// it names the intent recorded on the payment; stale callbacks from an
/// earlier intent are refused.
pub struct CardGateway {
    processor: ProcessorClient,
    initiate_budget: Duration,
}

impl CardGateway {
    pub fn new(processor: ProcessorClient, initiate_budget: Duration) -> Self {
        Self {
            processor,
            initiate_budget,
        }
    }
}

fn amount_minor(amount: Decimal) -> Result<u64, GatewayError> {
    (amount * Decimal::from(100u32))
        .round()
        .to_u64()
        .ok_or_else(|| {
            GatewayError::RequestFailed(format!(
                "amount {amount} is not representable in minor units"
            ))
        })
}

#[async_trait]
impl SettlementGateway for CardGateway {
    fn name(&self) -> &'static str {
        "card"
    }

    async fn initiate(&self, payment: &Payment) -> Result<PendingHandle, GatewayError> {
        if !self.processor.is_configured() {
            return Err(GatewayError::NotConfigured(
                "card processor credentials are not set".to_string(),
            ));
        }

        let amount = amount_minor(payment.amount)?;
        let reference_tag = payment.payment_id.to_string();

        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.initiate_budget),
            ..Default::default()
        };

        let result = retry(backoff, || async {
            self.processor
                .create_intent(amount, &payment.currency, &reference_tag)
                .await
                .map_err(backoff::Error::transient)
        })
        .await;

        match result {
            Ok(intent) => {
                metrics::GATEWAY_REQUESTS_TOTAL
                    .with_label_values(&["card", "initiated"])
                    .inc();
                Ok(PendingHandle {
                    reference: Some(intent.id),
                    client_handle: Some(intent.client_secret),
                })
            }
            Err(e) => {
                metrics::GATEWAY_REQUESTS_TOTAL
                    .with_label_values(&["card", "error"])
                    .inc();
                Err(GatewayError::RequestFailed(e.to_string()))
            }
        }
    }

    async fn confirm(
        &self,
        payment: &Payment,
        evidence: &Evidence,
    ) -> Result<SettlementOutcome, GatewayError> {
        let Evidence::ProcessorCallback { reference, outcome } = evidence else {
            return Err(GatewayError::UnsupportedEvidence("card"));
        };

        if payment.external_reference.as_deref() != Some(reference.as_str()) {
            return Err(GatewayError::EvidenceMismatch {
                expected: payment.external_reference.clone(),
                received: reference.clone(),
            });
        }

        Ok(match outcome {
            CallbackOutcome::Settled => SettlementOutcome::Settled {
                reference: Some(reference.clone()),
            },
            CallbackOutcome::Failed { reason } => SettlementOutcome::Rejected {
                reason: reason.clone(),
            },
            CallbackOutcome::Pending => SettlementOutcome::StillPending,
        })
    }
}
