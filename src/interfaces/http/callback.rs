use super::response::ApiError;
use crate::application::engine::CorrelationEngine;
use crate::domain::callback::{CallbackAck, CallbackBody};
use crate::domain::transaction::{ApiType, TransactionId, TransactionRecord, TransactionStatus};
use crate::error::GatewayError;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// `POST /callback/{transactionId}`.
///
/// Answers with HTTP 200 and an acknowledgement body in every case except a
/// structurally malformed id, which is a 400.
pub async fn receive_callback(
    State(engine): State<CorrelationEngine>,
    Path(raw_id): Path<String>,
    body: Result<Json<CallbackBody>, JsonRejection>,
) -> Result<Json<CallbackAck>, ApiError> {
    let transaction_id = TransactionId::parse(&raw_id)?;
    let body = match body {
        Ok(Json(body)) => body,
        Err(rejection) => {
            tracing::warn!(transaction_id = %transaction_id, error = %rejection.body_text(), "unreadable callback body");
            return Ok(Json(CallbackAck::invalid_body(rejection.body_text())));
        }
    };
    Ok(Json(engine.on_callback(&transaction_id, body).await?))
}

/// Diagnostic view of a record. Payloads are left out.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionView {
    pub transaction_id: TransactionId,
    pub api_type: ApiType,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl From<TransactionRecord> for TransactionView {
    fn from(record: TransactionRecord) -> Self {
        Self {
            transaction_id: record.transaction_id,
            api_type: record.api_type,
            status: record.status,
            created_at: record.created_at,
            expires_at: record.expires_at,
            completed_at: record.completed_at,
            error_message: record.error_message,
        }
    }
}

/// `GET /transactions/{transactionId}`.
pub async fn get_transaction(
    State(engine): State<CorrelationEngine>,
    Path(raw_id): Path<String>,
) -> Result<Json<TransactionView>, ApiError> {
    let transaction_id = TransactionId::parse(&raw_id)?;
    match engine.store().get(&transaction_id).await? {
        Some(record) => Ok(Json(record.into())),
        None => Err(GatewayError::UnknownTransaction(transaction_id).into()),
    }
}

/// `GET /health`.
pub async fn health() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
