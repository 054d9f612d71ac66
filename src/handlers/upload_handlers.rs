//! HTTP handlers for getting media into the object store: presigned tickets
//! for large files, and a streamed server-side path for small assets.

use crate::{
    errors::AppError,
    models::upload::{StoredObject, UploadTicket, UploadTicketRequest},
    routes::AppState,
    services::upload_tickets::DEFAULT_UPLOAD_FOLDER,
};
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderMap, header},
};
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::io;

#[derive(Debug, Deserialize)]
pub struct UploadObjectQuery {
    #[serde(rename = "fileName")]
    pub file_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadConfigResponse {
    pub bucket: String,
    pub public_url: String,
}

/// POST `/api/upload/presigned` — issue a direct-upload ticket.
pub async fn issue_ticket(
    State(state): State<AppState>,
    Json(req): Json<UploadTicketRequest>,
) -> Result<Json<UploadTicket>, AppError> {
    let folder = req.folder.as_deref().unwrap_or(DEFAULT_UPLOAD_FOLDER);
    let ticket = state
        .uploads
        .issue(&req.file_name, &req.content_type, folder)
        .await?;
    Ok(Json(ticket))
}

/// POST `/api/upload/{folder}?fileName=` — stream the request body into the store.
pub async fn upload_object(
    State(state): State<AppState>,
    Path(folder): Path<String>,
    Query(query): Query<UploadObjectQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<StoredObject>, AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let stream = body
        .into_data_stream()
        .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
        .boxed();

    let stored = state
        .uploads
        .store_object(&query.file_name, &content_type, &folder, stream)
        .await?;
    Ok(Json(stored))
}

/// GET `/api/upload/config` — where uploads land and where they are served from.
pub async fn upload_config(State(state): State<AppState>) -> Json<UploadConfigResponse> {
    Json(UploadConfigResponse {
        bucket: state.uploads.bucket().to_string(),
        public_url: state.uploads.public_base_url().to_string(),
    })
}
