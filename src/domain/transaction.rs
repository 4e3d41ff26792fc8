use crate::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAX_TRANSACTION_ID_LEN: usize = 64;

/// Identity correlating one inbound call with its eventual callback.
///
/// Generated ids are UUID v4 strings. Caller-supplied ids are accepted as long
/// as they are 1 to 64 characters of `[A-Za-z0-9_-]`, which keeps them safe to
/// embed in callback URLs and storage keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let well_formed = !raw.is_empty()
            && raw.len() <= MAX_TRANSACTION_ID_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if well_formed {
            Ok(Self(raw.to_string()))
        } else {
            Err(GatewayError::Validation(format!(
                "malformed transaction id {raw:?}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TransactionId {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque tag naming the business operation, e.g. `incar.search`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ApiType(String);

impl ApiType {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransactionStatus {
    #[default]
    Pending,
    Completed,
    Error,
    TimedOut,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        self != Self::Pending
    }

    /// Only `Error` and `TimedOut` may be written by a failing transition.
    pub fn ensure_failure(self) -> Result<()> {
        match self {
            Self::Error | Self::TimedOut => Ok(()),
            other => Err(GatewayError::InvalidTransition(other)),
        }
    }
}

/// Durable record of one transaction, owned by the correlation store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub transaction_id: TransactionId,
    pub api_type: ApiType,
    pub request_payload: Vec<u8>,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub response_payload: Option<Vec<u8>>,
    pub error_message: Option<String>,
}

impl TransactionRecord {
    pub fn pending(
        transaction_id: TransactionId,
        api_type: ApiType,
        request_payload: Vec<u8>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            transaction_id,
            api_type,
            request_payload,
            status: TransactionStatus::Pending,
            created_at,
            expires_at,
            completed_at: None,
            response_payload: None,
            error_message: None,
        }
    }

    /// Moves a pending record to `Completed`. Returns whether the transition applied.
    pub fn complete(&mut self, response_payload: Vec<u8>, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = TransactionStatus::Completed;
        self.completed_at = Some(now);
        self.response_payload = Some(response_payload);
        true
    }

    /// Moves a pending record to `Error` or `TimedOut`. Returns whether the transition applied.
    pub fn fail(
        &mut self,
        status: TransactionStatus,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        status.ensure_failure()?;
        if self.status.is_terminal() {
            return Ok(false);
        }
        self.status = status;
        self.completed_at = Some(now);
        self.error_message = Some(message.into());
        Ok(true)
    }

    /// Whether the reaper may evict this record given the retention `cutoff`.
    ///
    /// Terminal records age from `completed_at`. Pending records are only
    /// evictable once their deadline itself is older than the cutoff, which
    /// covers records orphaned by a crash.
    pub fn is_reapable(&self, cutoff: DateTime<Utc>) -> bool {
        match self.status {
            TransactionStatus::Pending => self.expires_at < cutoff,
            _ => self.completed_at.unwrap_or(self.expires_at) < cutoff,
        }
    }
}

/// A forwarded request handed to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundRequest {
    pub api_type: ApiType,
    pub transaction_id: TransactionId,
    pub payload: Vec<u8>,
}
