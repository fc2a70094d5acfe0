//! Manual settlement endpoints: proof submission and staff review.

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;
use validator::Validate;

use service_core::error::AppError;

use crate::dtos::{PaymentResponse, RejectRequest, ReviewRequest, SubmitProofRequest};
use crate::middleware::ActorContext;
use crate::AppState;

/// Submit proof of a manual settlement, moving the payment to review.
pub async fn submit_proof(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(payment_id): Path<Uuid>,
    Json(payload): Json<SubmitProofRequest>,
) -> Result<Json<PaymentResponse>, AppError> {
    payload.validate()?;
    tracing::info!(
        actor_id = %actor.actor_id,
        payment_id = %payment_id,
        method = %payload.method.as_str(),
        "Submitting settlement proof"
    );
    let payment = state
        .ledger
        .submit_manual_proof(
            payment_id,
            payload.method,
            payload.reference_number,
            payload.confirmation_code,
            payload.proof_ref,
        )
        .await?;
    Ok(Json(payment.into()))
}

/// Approve a payment under review. Staff only.
pub async fn approve(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(payment_id): Path<Uuid>,
    Json(payload): Json<ReviewRequest>,
) -> Result<Json<PaymentResponse>, AppError> {
    actor.require_staff()?;
    let payment = state
        .ledger
        .approve_payment(payment_id, &actor.actor_id, payload.note)
        .await?;
    Ok(Json(payment.into()))
}

/// Reject a payment under review with a reason. Staff only.
pub async fn reject(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(payment_id): Path<Uuid>,
    Json(payload): Json<RejectRequest>,
) -> Result<Json<PaymentResponse>, AppError> {
    actor.require_staff()?;
    payload.validate()?;
    let payment = state
        .ledger
        .reject_payment(payment_id, &actor.actor_id, payload.note)
        .await?;
    Ok(Json(payment.into()))
}
