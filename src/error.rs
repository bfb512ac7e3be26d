use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum WarehouseError {
    #[error("warehouse connection failed: {0}")]
    Connection(String),
    #[error("query failed: {0}")]
    Query(String),
    #[error("result shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("only read-only statements are permitted")]
    ReadOnlyViolation,
}

#[derive(Debug, Error)]
pub enum AssistantError {
    #[error("Request timed out. Please try again with a simpler query.")]
    Timeout,
    #[error("Failed request (id: {request_id}) with status {status}: {body}")]
    Status {
        request_id: String,
        status: u16,
        body: String,
    },
    #[error("Error communicating with the analyst service: {0}")]
    Transport(String),
    #[error("Unexpected analyst response: {0}")]
    Decode(String),
    #[error(transparent)]
    Connection(#[from] WarehouseError),
}

#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            message,
        )
    }
}

impl From<WarehouseError> for ApiError {
    fn from(err: WarehouseError) -> Self {
        match err {
            WarehouseError::Connection(_) => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, "WAREHOUSE_UNAVAILABLE", err.to_string())
            }
            WarehouseError::ReadOnlyViolation => {
                Self::bad_request("READ_ONLY_VIOLATION", err.to_string())
            }
            WarehouseError::Query(_) | WarehouseError::ShapeMismatch(_) => {
                Self::bad_request("QUERY_FAILED", err.to_string())
            }
        }
    }
}

impl From<AssistantError> for ApiError {
    fn from(err: AssistantError) -> Self {
        let status = match err {
            AssistantError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            AssistantError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, "EXTERNAL_SERVICE_FAILURE", err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error": {
                    "code": self.code,
                    "message": self.message
                }
            })),
        )
            .into_response()
    }
}
