pub mod card;
pub mod manual;

pub use card::CardGateway;
pub use manual::ManualGateway;

use async_trait::async_trait;

use service_core::error::AppError;

use crate::models::Payment;

/// Handle returned when a settlement is initiated.
#[derive(Debug, Clone, Default)]
pub struct PendingHandle {
    /// Identifier the gateway will quote back in later evidence.
    pub reference: Option<String>,
    /// Opaque token the payer's client needs to drive the external flow.
    pub client_handle: Option<String>,
}

/// What a processor callback said about an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Settled,
    Failed { reason: String },
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewVerdict {
    Approve,
    Reject,
}

/// Settlement evidence presented to a gateway for interpretation.
#[derive(Debug, Clone)]
pub enum Evidence {
    /// Signature-verified callback from the card processor.
    ProcessorCallback {
        reference: String,
        outcome: CallbackOutcome,
    },
    /// Staff decision on a manually settled payment.
    Review {
        verdict: ReviewVerdict,
        note: Option<String>,
    },
}

/// Gateway verdict on a piece of evidence.
#[derive(Debug, Clone, PartialEq)]
pub enum SettlementOutcome {
    /// Funds confirmed.
    Settled { reference: Option<String> },
    /// Attempt definitively failed.
    Rejected { reason: String },
    /// Evidence received but not conclusive; the payment stays where it is.
    StillPending,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Gateway not configured: {0}")]
    NotConfigured(String),

    #[error("Gateway request failed: {0}")]
    RequestFailed(String),

    #[error("Evidence does not belong to this payment: expected reference {expected:?}, received {received}")]
    EvidenceMismatch {
        expected: Option<String>,
        received: String,
    },

    #[error("Evidence of this kind is not usable by the {0} gateway")]
    UnsupportedEvidence(&'static str),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotConfigured(msg) => {
                AppError::ConfigError(anyhow::anyhow!("settlement gateway: {msg}"))
            }
            GatewayError::RequestFailed(msg) => {
                AppError::GatewayUnavailable(anyhow::anyhow!("{msg}"))
            }
            GatewayError::EvidenceMismatch { expected, received } => {
                AppError::InvalidTransition(anyhow::anyhow!(
                    "settlement confirmation references {received}, which does not match the \
                     recorded intent {expected:?}"
                ))
            }
            GatewayError::UnsupportedEvidence(gateway) => AppError::InternalError(anyhow::anyhow!(
                "evidence routed to the wrong gateway ({gateway})"
            )),
        }
    }
}

/// A way of moving money. Gateways never touch payment status; they initiate
/// external flows and interpret evidence, and the ledger owns the resulting
/// transition.
#[async_trait]
pub trait SettlementGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prepare an external settlement for this payment and hand back whatever
    /// the client needs to continue it. Safe to retry; must not assume the
    /// payment will ever settle.
    async fn initiate(&self, payment: &Payment) -> Result<PendingHandle, GatewayError>;

    /// Interpret settlement evidence against this payment. Read-only: the
    /// caller applies the outcome.
    async fn confirm(
        &self,
        payment: &Payment,
        evidence: &Evidence,
    ) -> Result<SettlementOutcome, GatewayError>;
}
