use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed")]
    AuthError,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Request body too large")]
    PayloadTooLarge,
    #[error("Upstream unavailable: {0}")]
    Upstream(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::AuthError => {
                tracing::debug!("Authentication failed");
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            Self::BadRequest(msg) => {
                tracing::debug!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, msg)
            }
            Self::PayloadTooLarge => {
                tracing::debug!("Request body too large");
                (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
            }
            Self::Upstream(msg) => {
                tracing::error!(error = %msg, "Upstream error");
                (StatusCode::BAD_GATEWAY, "Bad gateway".to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
