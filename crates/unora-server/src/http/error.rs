//! Response envelope and error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::error;

use crate::error::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Engine(e) => {
                let status = match e {
                    EngineError::NotFound(_) => StatusCode::NOT_FOUND,
                    EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
                    EngineError::Conflict(_) | EngineError::CapacityReached(_) => {
                        StatusCode::CONFLICT
                    }
                    EngineError::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    EngineError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
                    EngineError::DeadlineExceeded(_) => StatusCode::GONE,
                    EngineError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                    EngineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.code())
            }
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

/// `{"success": ..., "data": ...}` or `{"success": false, "error": {...}}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

/// Wrap a successful payload.
pub fn ok<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(Json(Envelope {
        success: true,
        data: Some(data),
        error: None,
    }))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            match &self {
                Self::Engine(e) => e.to_string(),
                Self::Unauthorized(m) | Self::BadRequest(m) => m.clone(),
            }
        };

        let body: Envelope<()> = Envelope {
            success: false,
            data: None,
            error: Some(ErrorBody { code, message }),
        };
        (status, Json(body)).into_response()
    }
}
