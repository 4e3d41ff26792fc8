use crate::domain::ports::CorrelationStore;
use crate::domain::transaction::{TransactionId, TransactionRecord, TransactionStatus};
use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, TransactionDB,
    TransactionDBOptions,
};
use std::path::Path;
use std::sync::Arc;

/// Column Family holding transaction records, keyed by transaction id.
pub const CF_TRANSACTIONS: &str = "transactions";

/// A persistent correlation store backed by a RocksDB `TransactionDB`.
///
/// Records are stored as JSON. Conditional transitions take an exclusive
/// lock on the key with `get_for_update_cf` and commit the new state in the
/// same transaction, so a callback and a timeout racing on one record are
/// serialized by RocksDB itself.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<TransactionDB>`).
#[derive(Clone)]
pub struct RocksDbStore {
    db: Arc<TransactionDB>,
}

impl RocksDbStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the "transactions" column family exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_transactions = ColumnFamilyDescriptor::new(CF_TRANSACTIONS, Options::default());
        let db = TransactionDB::open_cf_descriptors(
            &opts,
            &TransactionDBOptions::default(),
            path,
            vec![cf_transactions],
        )?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(CF_TRANSACTIONS)
            .ok_or_else(|| GatewayError::Storage("Transactions column family not found".into()))
    }

    /// Runs `apply` against the stored record under an exclusive key lock and
    /// persists it when `apply` reports a change.
    fn update<F>(&self, transaction_id: &TransactionId, apply: F) -> Result<bool>
    where
        F: FnOnce(&mut TransactionRecord) -> Result<bool>,
    {
        let cf = self.cf()?;
        let key = transaction_id.as_str().as_bytes();
        let txn = self.db.transaction();

        let Some(bytes) = txn.get_for_update_cf(cf, key, true)? else {
            return Ok(false);
        };
        let mut record = decode(&bytes)?;
        if !apply(&mut record)? {
            return Ok(false);
        }

        txn.put_cf(cf, key, encode(&record)?)?;
        txn.commit()?;
        Ok(true)
    }

    fn scan(&self) -> Result<Vec<TransactionRecord>> {
        let cf = self.cf()?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            records.push(decode(&value)?);
        }
        Ok(records)
    }
}

fn encode(record: &TransactionRecord) -> Result<Vec<u8>> {
    serde_json::to_vec(record)
        .map_err(|e| GatewayError::Storage(format!("Serialization error: {}", e)))
}

fn decode(bytes: &[u8]) -> Result<TransactionRecord> {
    serde_json::from_slice(bytes)
        .map_err(|e| GatewayError::Storage(format!("Deserialization error: {}", e)))
}

#[async_trait]
impl CorrelationStore for RocksDbStore {
    async fn create(&self, record: TransactionRecord) -> Result<TransactionRecord> {
        let cf = self.cf()?;
        let key = record.transaction_id.as_str().as_bytes();
        let txn = self.db.transaction();

        if txn.get_for_update_cf(cf, key, true)?.is_some() {
            return Err(GatewayError::DuplicateTransaction(
                record.transaction_id.clone(),
            ));
        }
        txn.put_cf(cf, key, encode(&record)?)?;
        txn.commit()?;

        Ok(record)
    }

    async fn conditional_complete(
        &self,
        transaction_id: &TransactionId,
        response_payload: Vec<u8>,
    ) -> Result<bool> {
        self.update(transaction_id, |record| {
            Ok(record.complete(response_payload, Utc::now()))
        })
    }

    async fn conditional_fail(
        &self,
        transaction_id: &TransactionId,
        status: TransactionStatus,
        error_message: String,
    ) -> Result<bool> {
        status.ensure_failure()?;
        self.update(transaction_id, |record| {
            record.fail(status, error_message, Utc::now())
        })
    }

    async fn get(&self, transaction_id: &TransactionId) -> Result<Option<TransactionRecord>> {
        let cf = self.cf()?;
        match self.db.get_cf(cf, transaction_id.as_str().as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let cf = self.cf()?;
        let candidates: Vec<TransactionId> = self
            .scan()?
            .into_iter()
            .filter(|r| r.is_reapable(cutoff))
            .map(|r| r.transaction_id)
            .collect();

        let mut removed = 0;
        for transaction_id in candidates {
            let key = transaction_id.as_str().as_bytes();
            let txn = self.db.transaction();
            // Re-check under the key lock: a callback may have landed since the scan.
            let Some(bytes) = txn.get_for_update_cf(cf, key, true)? else {
                continue;
            };
            if decode(&bytes)?.is_reapable(cutoff) {
                txn.delete_cf(cf, key)?;
                txn.commit()?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn pending(&self) -> Result<Vec<TransactionRecord>> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|r| r.status == TransactionStatus::Pending)
            .collect())
    }
}
