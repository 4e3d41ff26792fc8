use super::engine::CorrelationEngine;
use super::registry::WaitError;
use crate::domain::callback::{CallbackAck, CallbackBody};
use crate::domain::transaction::{TransactionId, TransactionStatus};
use crate::error::{GatewayError, Result};
use serde_json::Value;
use tracing::{info, warn};

impl CorrelationEngine {
    /// Handles a backend callback for `transaction_id`.
    ///
    /// Unknown ids are acknowledged with an error and leave the store
    /// untouched. Callbacks for transactions that already reached a terminal
    /// state (duplicates, or a timeout that won the race) are acknowledged
    /// without re-resolving anything. Only storage failures are returned as
    /// errors.
    pub async fn on_callback(
        &self,
        transaction_id: &TransactionId,
        body: CallbackBody,
    ) -> Result<CallbackAck> {
        let Some(record) = self.store.get(transaction_id).await? else {
            warn!(transaction_id = %transaction_id, "callback for unknown transaction");
            return Ok(CallbackAck::unknown(transaction_id));
        };

        let applied = if body.is_success() {
            let payload = serde_json::to_vec(&body.data.unwrap_or(Value::Null)).map_err(
                |source| GatewayError::Parse {
                    transaction_id: transaction_id.clone(),
                    source,
                },
            )?;
            let applied = self
                .store
                .conditional_complete(transaction_id, payload.clone())
                .await?;
            if applied {
                self.scheduler.cancel(transaction_id);
                self.registry.resolve(transaction_id, payload);
            }
            applied
        } else {
            let message = if body.result_message.is_empty() {
                body.result_code.clone()
            } else {
                body.result_message.clone()
            };
            let applied = self
                .store
                .conditional_fail(transaction_id, TransactionStatus::Error, message.clone())
                .await?;
            if applied {
                self.scheduler.cancel(transaction_id);
                self.registry
                    .reject(transaction_id, WaitError::Backend(message));
            }
            applied
        };

        if applied {
            info!(
                transaction_id = %transaction_id,
                api_type = %record.api_type,
                result_code = %body.result_code,
                "transaction resolved by callback"
            );
            Ok(CallbackAck::applied())
        } else {
            warn!(
                transaction_id = %transaction_id,
                api_type = %record.api_type,
                "callback for already resolved transaction"
            );
            Ok(CallbackAck::already_resolved(transaction_id))
        }
    }
}
