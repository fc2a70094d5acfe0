//! Card settlement endpoints: intent creation and the processor callback.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use uuid::Uuid;

use service_core::error::AppError;

use crate::dtos::CardIntentResponse;
use crate::middleware::ActorContext;
use crate::AppState;

/// Start a card settlement by creating a payment intent with the processor.
pub async fn create_card_intent(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<CardIntentResponse>, AppError> {
    tracing::info!(
        actor_id = %actor.actor_id,
        payment_id = %payment_id,
        "Initiating card settlement"
    );
    let (payment, handle) = state.ledger.begin_card_settlement(payment_id).await?;
    Ok(Json(CardIntentResponse {
        payment_id: payment.payment_id,
        reference: handle.reference,
        client_handle: handle.client_handle,
    }))
}

/// Card processor callback.
///
/// Verifies the signature before anything else. Events that cannot be
/// applied (unknown payment, stale intent, already-terminal state) are
/// logged and acknowledged so the processor stops redelivering them;
/// transient store failures are surfaced so it retries.
pub async fn processor_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<StatusCode, AppError> {
    let signature = headers
        .get("X-Processor-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Missing X-Processor-Signature header");
            AppError::AuthError(anyhow::anyhow!("Missing callback signature"))
        })?;

    let is_valid = state
        .processor
        .verify_callback_signature(&body, signature)
        .map_err(|e| {
            tracing::error!(error = %e, "Callback signature verification error");
            AppError::InternalError(anyhow::anyhow!("Callback verification failed"))
        })?;
    if !is_valid {
        tracing::warn!("Invalid callback signature");
        return Err(AppError::AuthError(anyhow::anyhow!(
            "Invalid callback signature"
        )));
    }

    let envelope = state.processor.parse_callback(&body).map_err(|e| {
        tracing::error!(error = %e, "Failed to parse callback payload");
        AppError::BadRequest(anyhow::anyhow!("Invalid callback payload"))
    })?;

    let Some(payment_id) = envelope
        .intent
        .reference_tag
        .as_deref()
        .and_then(|tag| tag.parse::<Uuid>().ok())
    else {
        tracing::warn!(
            intent = %envelope.intent.id,
            event = %envelope.event,
            "Callback carries no usable reference tag; acknowledging without action"
        );
        return Ok(StatusCode::OK);
    };

    tracing::info!(
        payment_id = %payment_id,
        intent = %envelope.intent.id,
        event = %envelope.event,
        "Processing card settlement callback"
    );

    match state
        .ledger
        .complete_card_settlement(payment_id, &envelope.intent.id, envelope.outcome())
        .await
    {
        Ok(_) => Ok(StatusCode::OK),
        // Redelivery cannot fix these; acknowledge and drop the event.
        Err(AppError::NotFound(e)) => {
            tracing::warn!(payment_id = %payment_id, error = %e, "Callback for unknown payment");
            Ok(StatusCode::OK)
        }
        Err(AppError::InvalidTransition(e)) => {
            tracing::warn!(payment_id = %payment_id, error = %e, "Callback not applicable");
            Ok(StatusCode::OK)
        }
        Err(AppError::Conflict(e)) => {
            tracing::warn!(payment_id = %payment_id, error = %e, "Callback lost a transition race");
            Ok(StatusCode::OK)
        }
        Err(e) => Err(e),
    }
}
