use crate::domain::ports::CorrelationStore;
use crate::domain::transaction::{TransactionId, TransactionRecord, TransactionStatus};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// A thread-safe in-memory correlation store.
///
/// Uses a sharded `DashMap` so that unrelated transactions never contend on a
/// single lock. Conditional transitions run while holding the shard's write
/// guard, which makes each of them one atomic read-modify-write.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    records: Arc<DashMap<TransactionId, TransactionRecord>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl CorrelationStore for InMemoryStore {
    async fn create(&self, record: TransactionRecord) -> Result<TransactionRecord> {
        match self.records.entry(record.transaction_id.clone()) {
            Entry::Occupied(_) => Err(GatewayError::DuplicateTransaction(record.transaction_id)),
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn conditional_complete(
        &self,
        transaction_id: &TransactionId,
        response_payload: Vec<u8>,
    ) -> Result<bool> {
        Ok(match self.records.get_mut(transaction_id) {
            Some(mut record) => record.complete(response_payload, Utc::now()),
            None => false,
        })
    }

    async fn conditional_fail(
        &self,
        transaction_id: &TransactionId,
        status: TransactionStatus,
        error_message: String,
    ) -> Result<bool> {
        status.ensure_failure()?;
        match self.records.get_mut(transaction_id) {
            Some(mut record) => record.fail(status, error_message, Utc::now()),
            None => Ok(false),
        }
    }

    async fn get(&self, transaction_id: &TransactionId) -> Result<Option<TransactionRecord>> {
        Ok(self.records.get(transaction_id).map(|r| r.value().clone()))
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let reap = record.is_reapable(cutoff);
            if reap {
                removed += 1;
            }
            !reap
        });
        Ok(removed)
    }

    async fn pending(&self) -> Result<Vec<TransactionRecord>> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.status == TransactionStatus::Pending)
            .map(|r| r.value().clone())
            .collect())
    }
}
