//! Payment lifecycle endpoints: create, read, cancel.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use service_core::error::AppError;

use crate::dtos::{CreatePaymentRequest, PaymentListResponse, PaymentResponse};
use crate::middleware::ActorContext;
use crate::AppState;

/// Create a pending payment for the next plan item.
///
/// Returns 409 when a non-terminal payment already exists for the same
/// plan item; the caller should refresh and act on the current payment
/// instead of retrying blindly.
pub async fn create_payment(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(application_id): Path<Uuid>,
    Json(payload): Json<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), AppError> {
    tracing::info!(
        actor_id = %actor.actor_id,
        application_id = %application_id,
        plan_item = %payload.plan_item.as_str(),
        "Creating payment"
    );
    let payment = state
        .ledger
        .create_payment(application_id, payload.plan_item)
        .await?;
    Ok((StatusCode::CREATED, Json(payment.into())))
}

pub async fn list_payments(
    State(state): State<AppState>,
    _actor: ActorContext,
    Path(application_id): Path<Uuid>,
) -> Result<Json<PaymentListResponse>, AppError> {
    let payments = state.ledger.payments_for_application(application_id).await?;
    Ok(Json(PaymentListResponse {
        payments: payments.into_iter().map(PaymentResponse::from).collect(),
    }))
}

pub async fn get_payment(
    State(state): State<AppState>,
    _actor: ActorContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, AppError> {
    let payment = state.ledger.get_payment(payment_id).await?;
    Ok(Json(payment.into()))
}

/// Cancel a pending payment, releasing its plan-item slot.
pub async fn cancel_payment(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<PaymentResponse>, AppError> {
    tracing::info!(
        actor_id = %actor.actor_id,
        payment_id = %payment_id,
        "Cancelling payment"
    );
    let payment = state.ledger.cancel_payment(payment_id).await?;
    Ok(Json(payment.into()))
}
