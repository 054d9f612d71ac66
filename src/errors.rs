use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Failure taxonomy shared by the relay, the upload issuer and the progress engine.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("malformed range: {0}")]
    MalformedRange(String),
    #[error("range not satisfiable for object of {total_size} bytes")]
    RangeNotSatisfiable { total_size: u64 },
    #[error("object `{0}` not found")]
    NotFound(String),
    #[error("object store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Cache(#[from] redis::RedisError),
}

pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    pub fn status(&self) -> StatusCode {
        match self {
            MediaError::MalformedRange(_) | MediaError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            MediaError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            MediaError::NotFound(_) => StatusCode::NOT_FOUND,
            MediaError::StoreUnavailable(_) | MediaError::Database(_) | MediaError::Cache(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            MediaError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub headers: HeaderMap,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            headers: HeaderMap::new(),
        }
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, self.headers, body).into_response()
    }
}

impl From<MediaError> for AppError {
    fn from(err: MediaError) -> Self {
        let status = err.status();
        if status.is_server_error() {
            tracing::error!("request failed: {}", err);
        } else {
            tracing::debug!("request rejected: {}", err);
        }

        let mut app_err = AppError::new(status, err.to_string());
        if let MediaError::RangeNotSatisfiable { total_size } = err {
            if let Ok(value) = HeaderValue::from_str(&format!("bytes */{}", total_size)) {
                app_err.headers.insert(header::CONTENT_RANGE, value);
            }
        }
        app_err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsatisfiable_range_carries_total_size_header() {
        let err: AppError = MediaError::RangeNotSatisfiable { total_size: 1000 }.into();
        assert_eq!(err.status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            err.headers.get(header::CONTENT_RANGE).unwrap(),
            "bytes */1000"
        );
    }

    #[test]
    fn client_errors_and_store_errors_map_to_distinct_statuses() {
        assert_eq!(
            MediaError::MalformedRange("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            MediaError::InvalidInput("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            MediaError::NotFound("k".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            MediaError::StoreUnavailable("down".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            MediaError::ConfigError("no creds".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
