//! Server-sent event streams of reconciled payment views.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use futures::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use service_core::error::AppError;

use crate::dtos::SnapshotResponse;
use crate::middleware::ActorContext;
use crate::services::streams::{StreamScope, ViewSnapshot};
use crate::AppState;

/// Stream one application's payments to its payer.
pub async fn application_stream(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(application_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!(
        actor_id = %actor.actor_id,
        application_id = %application_id,
        "Opening application view stream"
    );
    let rx = state.streams.subscribe(StreamScope::Application(application_id));
    sse_from(rx)
}

/// Stream every payment plus dashboard aggregates. Staff only.
pub async fn staff_stream(
    State(state): State<AppState>,
    actor: ActorContext,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    actor.require_staff()?;
    tracing::debug!(actor_id = %actor.actor_id, "Opening staff view stream");
    let rx = state.streams.subscribe(StreamScope::Staff);
    Ok(sse_from(rx))
}

fn sse_from(
    rx: tokio::sync::mpsc::Receiver<ViewSnapshot>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = ReceiverStream::new(rx).filter_map(|snapshot| async move {
        match Event::default()
            .event("snapshot")
            .json_data(SnapshotResponse::from(snapshot))
        {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                tracing::error!(error = %e, "Dropping unserializable snapshot frame");
                None
            }
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}
