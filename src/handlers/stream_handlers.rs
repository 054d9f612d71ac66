//! HTTP handler for seekable media playback.
//! The body streams from the object store as it arrives; dropping the
//! response (client disconnect) drops the upstream read with it.

use crate::{
    errors::{AppError, MediaError},
    models::media::RangeStatus,
    routes::AppState,
    services::range_relay::RangeResponse,
};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};

/// GET `/api/stream/{*key}` — full object, or one byte range via `Range`.
pub async fn stream_object(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let range = headers
        .get(header::RANGE)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| MediaError::MalformedRange("range header is not ASCII".into()))
        })
        .transpose()?;

    let relayed = state.relay.relay(&key, range).await?;
    Ok(into_response(relayed))
}

fn into_response(relayed: RangeResponse) -> Response {
    let RangeResponse {
        status,
        content_range,
        content_length,
        content_type,
        body,
    } = relayed;

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = match status {
        RangeStatus::Full => StatusCode::OK,
        RangeStatus::Partial => StatusCode::PARTIAL_CONTENT,
    };

    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(content_length));
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("inline"),
    );
    if let Some(range) = content_range {
        if let Ok(value) = HeaderValue::from_str(&range.content_range()) {
            headers.insert(header::CONTENT_RANGE, value);
        }
    }

    response
}
