//! Card processor client.
//!
//! Implements the processor's payment-intent API for settlement initiation
//! and signature verification for the settlement callback.

use std::time::Duration;

use anyhow::{anyhow, Result};
use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::CardProcessorConfig;
use crate::services::gateways::CallbackOutcome;

/// Client for the card processor's REST API.
#[derive(Clone)]
pub struct ProcessorClient {
    client: Client,
    config: CardProcessorConfig,
}

/// Request to create a payment intent.
#[derive(Debug, Serialize)]
pub struct CreateIntentRequest {
    /// Amount in the smallest currency unit (centavos for PHP).
    pub amount: u64,
    /// Currency code (e.g., "PHP").
    pub currency: String,
    /// Caller-side identifier echoed back in the callback. We put the
    /// payment id here so the callback can be routed without a lookup table.
    pub reference_tag: String,
}

/// Response from intent creation.
#[derive(Debug, Deserialize)]
pub struct PaymentIntent {
    /// Processor-side intent ID.
    pub id: String,
    /// Token the payer's browser needs to complete the card flow.
    pub client_secret: String,
    /// Amount in smallest currency unit.
    pub amount: u64,
    /// Currency code.
    pub currency: String,
    /// Intent status at creation ("requires_confirmation").
    pub status: String,
}

/// Processor API error response.
#[derive(Debug, Deserialize)]
pub struct ProcessorApiError {
    pub error: ProcessorErrorDetail,
}

#[derive(Debug, Deserialize)]
pub struct ProcessorErrorDetail {
    pub code: String,
    pub description: String,
}

/// Settlement callback event.
#[derive(Debug, Deserialize)]
pub struct CallbackEnvelope {
    /// Event name: "intent.settled", "intent.failed" or "intent.pending".
    pub event: String,
    pub intent: CallbackIntent,
    /// Decline reason, present on failed events.
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackIntent {
    pub id: String,
    /// The reference tag we supplied at creation, i.e. our payment id.
    #[serde(default)]
    pub reference_tag: Option<String>,
    #[serde(default)]
    pub amount: Option<u64>,
    #[serde(default)]
    pub currency: Option<String>,
}

impl CallbackEnvelope {
    /// Map the event name onto a settlement outcome. Unknown events are
    /// treated as inconclusive rather than rejected.
    pub fn outcome(&self) -> CallbackOutcome {
        match self.event.as_str() {
            "intent.settled" => CallbackOutcome::Settled,
            "intent.failed" => CallbackOutcome::Failed {
                reason: self
                    .reason
                    .clone()
                    .unwrap_or_else(|| "declined by processor".to_string()),
            },
            _ => CallbackOutcome::Pending,
        }
    }
}

impl ProcessorClient {
    pub fn new(config: CardProcessorConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Check whether processor credentials are set.
    pub fn is_configured(&self) -> bool {
        !self.config.key_id.is_empty() && !self.config.key_secret.expose_secret().is_empty()
    }

    /// Create a payment intent at the processor.
    ///
    /// # Arguments
    /// * `amount` - Amount in smallest currency unit (centavos for PHP)
    /// * `currency` - Currency code (e.g., "PHP")
    /// * `reference_tag` - Our payment id, echoed back in the callback
    pub async fn create_intent(
        &self,
        amount: u64,
        currency: &str,
        reference_tag: &str,
    ) -> Result<PaymentIntent> {
        if !self.is_configured() {
            return Err(anyhow!("Card processor credentials not configured"));
        }

        let request = CreateIntentRequest {
            amount,
            currency: currency.to_string(),
            reference_tag: reference_tag.to_string(),
        };

        let url = format!("{}/intents", self.config.api_base_url);

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.config.request_timeout_secs))
            .basic_auth(
                &self.config.key_id,
                Some(self.config.key_secret.expose_secret()),
            )
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, body = %body, "Processor create_intent response");

        if status.is_success() {
            let intent: PaymentIntent = serde_json::from_str(&body)?;
            tracing::info!(
                intent_id = %intent.id,
                amount = intent.amount,
                currency = %intent.currency,
                "Payment intent created"
            );
            Ok(intent)
        } else {
            let error: ProcessorApiError =
                serde_json::from_str(&body).unwrap_or_else(|_| ProcessorApiError {
                    error: ProcessorErrorDetail {
                        code: "UNKNOWN".to_string(),
                        description: body.clone(),
                    },
                });
            tracing::error!(
                code = %error.error.code,
                description = %error.error.description,
                "Payment intent creation failed"
            );
            Err(anyhow!(
                "Processor error: {} - {}",
                error.error.code,
                error.error.description
            ))
        }
    }

    /// Verify the callback signature.
    ///
    /// The signature is computed as:
    /// `HMAC-SHA256(request_body, webhook_secret)`
    pub fn verify_callback_signature(&self, body: &str, signature: &str) -> Result<bool> {
        let expected_signature =
            self.compute_signature(body, self.config.webhook_secret.expose_secret())?;

        let is_valid = expected_signature == signature;

        if !is_valid {
            tracing::warn!("Callback signature verification failed");
        }

        Ok(is_valid)
    }

    /// Parse a callback event from the request body.
    pub fn parse_callback(&self, body: &str) -> Result<CallbackEnvelope> {
        let envelope: CallbackEnvelope = serde_json::from_str(body)?;
        Ok(envelope)
    }

    /// Compute HMAC-SHA256 signature.
    fn compute_signature(&self, payload: &str, secret: &str) -> Result<String> {
        type HmacSha256 = Hmac<Sha256>;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| anyhow!("Invalid key length"))?;
        mac.update(payload.as_bytes());
        let result = mac.finalize();
        Ok(hex::encode(result.into_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::Secret;

    fn test_config() -> CardProcessorConfig {
        CardProcessorConfig {
            key_id: "pk_test_123".to_string(),
            key_secret: Secret::new("test_secret".to_string()),
            webhook_secret: Secret::new("webhook_secret".to_string()),
            api_base_url: "https://processor.example.com/v1".to_string(),
            request_timeout_secs: 10,
        }
    }

    #[test]
    fn test_is_configured() {
        let client = ProcessorClient::new(test_config());
        assert!(client.is_configured());

        let empty_config = CardProcessorConfig {
            key_id: "".to_string(),
            key_secret: Secret::new("".to_string()),
            webhook_secret: Secret::new("".to_string()),
            api_base_url: "".to_string(),
            request_timeout_secs: 10,
        };
        let client = ProcessorClient::new(empty_config);
        assert!(!client.is_configured());
    }

    #[test]
    fn test_callback_signature_verification() {
        let client = ProcessorClient::new(test_config());

        let body = r#"{"event":"intent.settled","intent":{"id":"pi_123"}}"#;
        let signature = client.compute_signature(body, "webhook_secret").unwrap();

        assert!(client.verify_callback_signature(body, &signature).unwrap());
        assert!(!client
            .verify_callback_signature(body, "invalid_signature")
            .unwrap());
    }

    #[test]
    fn test_callback_outcome_mapping() {
        let client = ProcessorClient::new(test_config());

        let settled = client
            .parse_callback(r#"{"event":"intent.settled","intent":{"id":"pi_1","reference_tag":"abc"}}"#)
            .unwrap();
        assert_eq!(settled.outcome(), CallbackOutcome::Settled);
        assert_eq!(settled.intent.reference_tag.as_deref(), Some("abc"));

        let failed = client
            .parse_callback(
                r#"{"event":"intent.failed","intent":{"id":"pi_1"},"reason":"insufficient funds"}"#,
            )
            .unwrap();
        assert_eq!(
            failed.outcome(),
            CallbackOutcome::Failed {
                reason: "insufficient funds".to_string()
            }
        );

        let unknown = client
            .parse_callback(r#"{"event":"intent.created","intent":{"id":"pi_1"}}"#)
            .unwrap();
        assert_eq!(unknown.outcome(), CallbackOutcome::Pending);
    }
}
