//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use resync_engine::Error as EngineError;
use serde::Serialize;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Engine(e) if e.is_input_error() => StatusCode::BAD_REQUEST,
            AppError::Engine(EngineError::TableNotFound(_) | EngineError::KeyNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            AppError::Engine(EngineError::DuplicateKey(_)) => StatusCode::CONFLICT,
            AppError::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error_message, details) = match &self {
            AppError::Engine(EngineError::Backend(source)) => {
                tracing::error!("Storage error: {:?}", source);
                ("Storage error".to_string(), Some(source.to_string()))
            }
            AppError::Engine(e) => {
                tracing::warn!("Engine error: {:?}", e);
                (e.to_string(), None)
            }
        };

        let body = Json(ErrorResponse {
            error: error_message,
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use resync_engine::Key;

    #[test]
    fn engine_errors_map_to_statuses() {
        let cases = [
            (
                EngineError::InvalidArgument("records must be an array".into()),
                StatusCode::BAD_REQUEST,
            ),
            (EngineError::MissingKey("id".into()), StatusCode::BAD_REQUEST),
            (
                EngineError::TableNotFound("authors".into()),
                StatusCode::NOT_FOUND,
            ),
            (EngineError::KeyNotFound(Key::Int(3)), StatusCode::NOT_FOUND),
            (EngineError::DuplicateKey(Key::Int(9)), StatusCode::CONFLICT),
            (
                EngineError::backend(std::io::Error::new(std::io::ErrorKind::Other, "down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(AppError::from(error).status(), status);
        }
    }
}
