//! Defines routes for media delivery and playback progress.
//!
//! ## Structure
//! - **Playback**
//!   - `GET  /api/stream/{*key}` — stream an object, honoring a single `Range`
//!
//! - **Uploads**
//!   - `POST /api/upload/presigned` — issue a direct-upload ticket
//!   - `POST /api/upload/{folder}?fileName=` — server-side streamed upload
//!   - `GET  /api/upload/config` — bucket and public base URL
//!
//! - **Progress**
//!   - `PUT  /api/progress/{user_id}/{movie_id}` — report a position
//!   - `GET  /api/progress/{user_id}/{movie_id}` — resume point
//!   - `GET  /api/events/progress/{user_id}` — live updates (SSE)
//!
//! The wildcard `*key` allows nested keys like `videos/2025/trailer.mp4`.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        progress_handlers::{fetch_progress, progress_events, record_progress},
        stream_handlers::stream_object,
        upload_handlers::{issue_ticket, upload_config, upload_object},
    },
    services::{
        progress_sync::ProgressSyncEngine, range_relay::RangeStreamRelay,
        upload_tickets::UploadTicketIssuer,
    },
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: RangeStreamRelay,
    pub uploads: UploadTicketIssuer,
    pub progress: ProgressSyncEngine,
}

/// Build and return the router for every endpoint.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/api/stream/{*key}", get(stream_object))
        // static segments win over `{folder}`
        .route("/api/upload/presigned", post(issue_ticket))
        .route("/api/upload/config", get(upload_config))
        .route("/api/upload/{folder}", post(upload_object))
        .route(
            "/api/progress/{user_id}/{movie_id}",
            put(record_progress).get(fetch_progress),
        )
        .route("/api/events/progress/{user_id}", get(progress_events))
}
