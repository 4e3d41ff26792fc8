use super::registry::{WaitError, WaiterRegistry};
use super::scheduler::TimeoutScheduler;
use crate::domain::ports::{CorrelationStoreRef, DispatcherRef};
use crate::domain::transaction::{
    ApiType, OutboundRequest, TransactionId, TransactionRecord, TransactionStatus,
};
use crate::error::{GatewayError, Result};
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

pub const TIMEOUT_MESSAGE: &str = "no response within window";
pub const RESTART_MESSAGE: &str = "gateway restarted while transaction was pending";

/// Per-call overrides for [`CorrelationEngine::call`].
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub transaction_id: Option<TransactionId>,
    pub timeout: Option<Duration>,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transaction_id(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Result of reconciling pending records at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub expired: usize,
    pub rearmed: usize,
}

/// The correlation engine.
///
/// `call` is the synchronous facade used by the business endpoints: it
/// creates the record, registers a waiter, arms the timeout, dispatches the
/// request and then parks until a callback or the timeout resolves it.
/// Callback intake lives in `application::callback`.
///
/// Cloning is cheap; every clone shares the same store, registry and timers.
#[derive(Clone)]
pub struct CorrelationEngine {
    pub(super) store: CorrelationStoreRef,
    pub(super) dispatcher: DispatcherRef,
    pub(super) registry: Arc<WaiterRegistry>,
    pub(super) scheduler: Arc<TimeoutScheduler>,
    default_timeout: Duration,
}

impl CorrelationEngine {
    /// Creates a new `CorrelationEngine`.
    ///
    /// # Arguments
    ///
    /// * `store` - The durable correlation store.
    /// * `dispatcher` - Sends forwarded requests to the backend.
    /// * `default_timeout` - Window applied when a call does not override it.
    pub fn new(
        store: CorrelationStoreRef,
        dispatcher: DispatcherRef,
        default_timeout: Duration,
    ) -> Self {
        Self {
            store,
            dispatcher,
            registry: Arc::new(WaiterRegistry::new()),
            scheduler: Arc::new(TimeoutScheduler::new()),
            default_timeout,
        }
    }

    pub fn store(&self) -> &CorrelationStoreRef {
        &self.store
    }

    pub fn registry(&self) -> &WaiterRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &TimeoutScheduler {
        &self.scheduler
    }

    /// Relays one request and blocks until it is resolved.
    ///
    /// Returns the backend's response payload, `BackendReported` when the
    /// callback signalled failure, or `Timeout` when nothing arrived in time.
    /// The outcome returned always matches the terminal status in the store.
    pub async fn call(
        &self,
        api_type: ApiType,
        request_payload: Vec<u8>,
        options: CallOptions,
    ) -> Result<Vec<u8>> {
        let transaction_id = options
            .transaction_id
            .unwrap_or_else(TransactionId::generate);
        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let window = chrono::Duration::from_std(timeout)
            .map_err(|_| GatewayError::Validation(format!("timeout {timeout:?} out of range")))?;

        let out_of_range = || GatewayError::Validation(format!("timeout {timeout:?} out of range"));
        let deadline = Instant::now().checked_add(timeout).ok_or_else(out_of_range)?;
        let created_at = Utc::now();
        let expires_at = created_at
            .checked_add_signed(window)
            .ok_or_else(out_of_range)?;
        let record = TransactionRecord::pending(
            transaction_id.clone(),
            api_type.clone(),
            request_payload.clone(),
            created_at,
            expires_at,
        );

        if let Err(e) = self.store.create(record).await {
            error!(transaction_id = %transaction_id, error = %e, "failed to create transaction");
            return Err(e);
        }
        let handle = match self.registry.register(transaction_id.clone()) {
            Ok(handle) => handle,
            Err(e) => {
                self.abandon(&transaction_id, &e).await;
                return Err(e);
            }
        };
        self.arm_timeout(transaction_id.clone(), deadline);

        debug!(transaction_id = %transaction_id, api_type = %api_type, "dispatching");
        self.dispatcher.dispatch(OutboundRequest {
            api_type,
            transaction_id: transaction_id.clone(),
            payload: request_payload,
        });

        match self.registry.wait(handle, deadline).await {
            Ok(payload) => Ok(payload),
            Err(WaitError::Backend(message)) => Err(GatewayError::BackendReported {
                transaction_id,
                message,
            }),
            Err(WaitError::TimedOut) => self.settle_after_deadline(&transaction_id).await,
        }
    }

    /// Like [`call`](Self::call), with JSON encoding of the request and
    /// decoding of the response. A response that does not decode into `Resp`
    /// is reported as `GatewayError::Parse`.
    pub async fn call_json<Req, Resp>(
        &self,
        api_type: ApiType,
        request: &Req,
        mut options: CallOptions,
    ) -> Result<Resp>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let transaction_id = options
            .transaction_id
            .get_or_insert_with(TransactionId::generate)
            .clone();
        let payload = serde_json::to_vec(request)
            .map_err(|e| GatewayError::Validation(format!("unencodable request: {e}")))?;

        let response = self.call(api_type, payload, options).await?;
        serde_json::from_slice(&response).map_err(|source| {
            error!(transaction_id = %transaction_id, error = %source, "response payload has unexpected shape");
            GatewayError::Parse {
                transaction_id,
                source,
            }
        })
    }

    /// The timeout action: fail the record as `TimedOut` and, if that won the
    /// race, reject the waiter. Returns whether this call applied the transition.
    pub async fn expire(&self, transaction_id: &TransactionId) -> Result<bool> {
        let applied = self
            .store
            .conditional_fail(
                transaction_id,
                TransactionStatus::TimedOut,
                TIMEOUT_MESSAGE.to_string(),
            )
            .await?;
        if applied {
            warn!(transaction_id = %transaction_id, "transaction timed out");
            self.registry.reject(transaction_id, WaitError::TimedOut);
        }
        Ok(applied)
    }

    /// Marks pending records left behind by a previous process.
    ///
    /// Their waiters died with that process. Records whose deadline plus
    /// `grace` has passed become `TimedOut` right away; the rest get a fresh
    /// timer so they still reach a terminal state if no callback shows up.
    pub async fn recover_pending(&self, grace: Duration) -> Result<RecoveryReport> {
        let out_of_range = || GatewayError::Validation(format!("grace {grace:?} out of range"));
        let window = chrono::Duration::from_std(grace).map_err(|_| out_of_range())?;
        let now = Utc::now();
        let mut report = RecoveryReport::default();

        for record in self.store.pending().await? {
            let cutoff = record
                .expires_at
                .checked_add_signed(window)
                .ok_or_else(out_of_range)?;
            if cutoff <= now {
                if self
                    .store
                    .conditional_fail(
                        &record.transaction_id,
                        TransactionStatus::TimedOut,
                        RESTART_MESSAGE.to_string(),
                    )
                    .await?
                {
                    report.expired += 1;
                }
            } else {
                let remaining = (cutoff - now).to_std().unwrap_or_default();
                let deadline = Instant::now()
                    .checked_add(remaining)
                    .ok_or_else(out_of_range)?;
                self.arm_timeout(record.transaction_id, deadline);
                report.rearmed += 1;
            }
        }

        if report != RecoveryReport::default() {
            info!(
                expired = report.expired,
                rearmed = report.rearmed,
                "recovered pending transactions"
            );
        }
        Ok(report)
    }

    /// Cancels all outstanding timers. Pending records stay pending and are
    /// picked up by `recover_pending` on the next start.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    fn arm_timeout(&self, transaction_id: TransactionId, deadline: Instant) {
        let engine = self.clone();
        let id = transaction_id.clone();
        self.scheduler.arm(transaction_id, deadline, async move {
            if let Err(e) = engine.expire(&id).await {
                error!(transaction_id = %id, error = %e, "timeout action failed");
            }
        });
    }

    /// Called when the local wait elapsed or was rejected as timed out.
    /// Reconciles with the store so the caller sees the recorded outcome.
    async fn settle_after_deadline(&self, transaction_id: &TransactionId) -> Result<Vec<u8>> {
        if self.expire(transaction_id).await? {
            self.scheduler.cancel(transaction_id);
            return Err(GatewayError::Timeout(transaction_id.clone()));
        }

        let record = self.store.get(transaction_id).await?;
        match record {
            Some(TransactionRecord {
                status: TransactionStatus::Completed,
                response_payload,
                ..
            }) => Ok(response_payload.unwrap_or_default()),
            Some(TransactionRecord {
                status: TransactionStatus::Error,
                error_message,
                ..
            }) => Err(GatewayError::BackendReported {
                transaction_id: transaction_id.clone(),
                message: error_message.unwrap_or_default(),
            }),
            _ => Err(GatewayError::Timeout(transaction_id.clone())),
        }
    }

    async fn abandon(&self, transaction_id: &TransactionId, cause: &GatewayError) {
        error!(transaction_id = %transaction_id, error = %cause, "abandoning transaction");
        if let Err(e) = self
            .store
            .conditional_fail(transaction_id, TransactionStatus::Error, cause.to_string())
            .await
        {
            error!(transaction_id = %transaction_id, error = %e, "failed to record abandoned transaction");
        }
    }
}
