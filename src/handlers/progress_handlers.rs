//! HTTP handlers for watch progress. The caller's identity is resolved
//! upstream; `user_id` arrives already authenticated.

use crate::{
    errors::AppError,
    models::progress::{ProgressRecord, ProgressUpdate},
    routes::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, stream};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

/// PUT `/api/progress/{user_id}/{movie_id}` — report the playback position.
pub async fn record_progress(
    State(state): State<AppState>,
    Path((user_id, movie_id)): Path<(String, String)>,
    Json(update): Json<ProgressUpdate>,
) -> Result<StatusCode, AppError> {
    let outcome = state
        .progress
        .record(&user_id, &movie_id, update.position_ms, update.duration_ms)
        .await?;
    if outcome.flushed {
        debug!(
            "checkpointed {}/{} at {}ms",
            user_id, movie_id, outcome.record.position_ms
        );
    }
    Ok(StatusCode::NO_CONTENT)
}

/// GET `/api/progress/{user_id}/{movie_id}` — resume point, 404 when unknown.
pub async fn fetch_progress(
    State(state): State<AppState>,
    Path((user_id, movie_id)): Path<(String, String)>,
) -> Result<Json<ProgressRecord>, AppError> {
    state
        .progress
        .fetch(&user_id, &movie_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::not_found(format!("no progress for {} in {}", user_id, movie_id))
        })
}

/// GET `/api/events/progress/{user_id}` — live progress of one user's players.
///
/// Delivery is best effort: a subscriber that falls behind skips ahead.
pub async fn progress_events(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let rx = state.progress.subscribe();

    let events = stream::unfold((rx, user_id), |(mut rx, user_id)| async move {
        loop {
            match rx.recv().await {
                Ok(event) if event.user_id == user_id => {
                    let sse = Event::default().event("progress").json_data(&event);
                    return Some((sse, (rx, user_id)));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("progress subscriber for {} skipped {} events", user_id, skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}
