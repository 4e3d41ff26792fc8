use crate::domain::transaction::{TransactionId, TransactionStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Transaction {0} already exists")]
    DuplicateTransaction(TransactionId),
    #[error("A waiter is already registered for transaction {0}")]
    AlreadyRegistered(TransactionId),
    #[error("Dispatch failed: {0}")]
    Dispatch(String),
    #[error("No response for transaction {0} within the window")]
    Timeout(TransactionId),
    #[error("Backend reported an error for transaction {transaction_id}: {message}")]
    BackendReported {
        transaction_id: TransactionId,
        message: String,
    },
    #[error("Unknown transaction {0}")]
    UnknownTransaction(TransactionId),
    #[error("Response for transaction {transaction_id} could not be decoded: {source}")]
    Parse {
        transaction_id: TransactionId,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0:?} is not a failure status")]
    InvalidTransition(TransactionStatus),
    #[error("Storage error: {0}")]
    Storage(String),
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for GatewayError {
    fn from(err: rocksdb::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;
