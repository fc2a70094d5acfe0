//! Receipt lookup endpoint.

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use service_core::error::AppError;

use crate::dtos::ReceiptResponse;
use crate::middleware::ActorContext;
use crate::AppState;

/// Fetch the receipt for a settled payment. 404 until the payment is paid
/// and the receipt has been issued.
pub async fn get_receipt(
    State(state): State<AppState>,
    _actor: ActorContext,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<ReceiptResponse>, AppError> {
    let receipt = state
        .receipts
        .receipt_for(payment_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!(
                "no receipt exists for payment {}",
                payment_id
            ))
        })?;
    Ok(Json(receipt.into()))
}
