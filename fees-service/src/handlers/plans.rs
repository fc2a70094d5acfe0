//! Plan resolution endpoint.

use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use service_core::error::AppError;

use crate::dtos::PlanResponse;
use crate::middleware::ActorContext;
use crate::AppState;

/// Resolve the effective plan and next amount due for an application.
///
/// The form layer calls this before rendering payment actions, so the
/// response carries the full price breakdown for display.
pub async fn get_plan(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(application_id): Path<Uuid>,
) -> Result<Json<PlanResponse>, AppError> {
    tracing::debug!(
        actor_id = %actor.actor_id,
        application_id = %application_id,
        "Resolving payment plan"
    );
    let resolved = state.ledger.resolve_plan(application_id).await?;
    Ok(Json(PlanResponse::from_resolved(application_id, resolved)))
}

/// Drop all cached fee schedules so the next lookup rereads the catalog.
/// Staff call this after publishing schedule changes. Staff only.
pub async fn invalidate_schedule_cache(
    State(state): State<AppState>,
    actor: ActorContext,
) -> Result<axum::http::StatusCode, AppError> {
    actor.require_staff()?;
    tracing::info!(actor_id = %actor.actor_id, "Invalidating fee schedule cache");
    state.catalog.invalidate_all().await;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
