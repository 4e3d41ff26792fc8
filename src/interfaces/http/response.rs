use crate::domain::callback::SUCCESS_CODE;
use crate::error::GatewayError;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Envelope shared by every business response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub status: String,
    pub result_code: String,
    pub result_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: StatusCode::OK.as_u16().to_string(),
            result_code: SUCCESS_CODE.to_string(),
            result_message: "OK".to_string(),
            data: Some(data),
        }
    }
}

/// HTTP face of a `GatewayError`.
#[derive(Debug)]
pub struct ApiError(pub GatewayError);

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        match &self.0 {
            GatewayError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            GatewayError::Timeout(_) => (
                StatusCode::GATEWAY_TIMEOUT,
                "timeout",
                "no response from backend within the window".to_string(),
            ),
            GatewayError::BackendReported { message, .. } => {
                (StatusCode::BAD_GATEWAY, "backend_error", message.clone())
            }
            GatewayError::UnknownTransaction(id) => (
                StatusCode::NOT_FOUND,
                "unknown_transaction",
                format!("no transaction {id}"),
            ),
            GatewayError::DuplicateTransaction(id) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "duplicate_transaction",
                format!("transaction {id} already exists"),
            ),
            GatewayError::Parse { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "parse_error",
                "backend response could not be decoded".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "an internal error occurred".to_string(),
            ),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(GatewayError::Validation(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            tracing::error!(status = %status, code, error = %self.0, "request failed");
        }
        let body: ApiResponse<()> = ApiResponse {
            status: status.as_u16().to_string(),
            result_code: code.to_string(),
            result_message: message,
            data: None,
        };
        (status, Json(body)).into_response()
    }
}
