use super::transaction::{OutboundRequest, TransactionId, TransactionRecord, TransactionStatus};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Durable keyed record of every in-flight and recently finished transaction.
///
/// Every mutating method is a single atomic read-modify-write against the
/// backing store. `conditional_complete` and `conditional_fail` only apply
/// while the stored status is still `Pending`.
#[async_trait]
pub trait CorrelationStore: Send + Sync {
    /// Inserts a new record, failing with `DuplicateTransaction` on id collision.
    async fn create(&self, record: TransactionRecord) -> Result<TransactionRecord>;
    async fn conditional_complete(
        &self,
        transaction_id: &TransactionId,
        response_payload: Vec<u8>,
    ) -> Result<bool>;
    async fn conditional_fail(
        &self,
        transaction_id: &TransactionId,
        status: TransactionStatus,
        error_message: String,
    ) -> Result<bool>;
    async fn get(&self, transaction_id: &TransactionId) -> Result<Option<TransactionRecord>>;
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
    async fn pending(&self) -> Result<Vec<TransactionRecord>>;
}

/// Fire-and-forget transmission of forwarded requests to the backend.
pub trait Dispatcher: Send + Sync {
    /// Must return without waiting on the backend.
    fn dispatch(&self, request: OutboundRequest);
}

pub type CorrelationStoreRef = Arc<dyn CorrelationStore>;
pub type DispatcherRef = Arc<dyn Dispatcher>;
