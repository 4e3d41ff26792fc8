use crate::domain::transaction::TransactionId;
use crate::error::{GatewayError, Result};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::{Instant, timeout_at};

/// Why a waiter was resolved without a payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitError {
    #[error("timed out")]
    TimedOut,
    #[error("backend error: {0}")]
    Backend(String),
}

pub type WaitOutcome = std::result::Result<Vec<u8>, WaitError>;

/// One-shot handle held by the blocked caller.
#[derive(Debug)]
pub struct WaitHandle {
    transaction_id: TransactionId,
    receiver: oneshot::Receiver<WaitOutcome>,
}

impl WaitHandle {
    pub fn transaction_id(&self) -> &TransactionId {
        &self.transaction_id
    }
}

/// In-memory map from transaction id to the sending half of its waiter.
///
/// Whoever removes the sender from the map is the only party that can
/// deliver an outcome, so `resolve` and `reject` have an observable effect at
/// most once per transaction no matter how many callbacks or timers race.
#[derive(Debug, Default)]
pub struct WaiterRegistry {
    waiters: DashMap<TransactionId, oneshot::Sender<WaitOutcome>>,
}

impl WaiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, transaction_id: TransactionId) -> Result<WaitHandle> {
        match self.waiters.entry(transaction_id.clone()) {
            Entry::Occupied(_) => Err(GatewayError::AlreadyRegistered(transaction_id)),
            Entry::Vacant(slot) => {
                let (sender, receiver) = oneshot::channel();
                slot.insert(sender);
                Ok(WaitHandle {
                    transaction_id,
                    receiver,
                })
            }
        }
    }

    /// Delivers a payload. Returns `false` if the waiter is gone or already resolved.
    pub fn resolve(&self, transaction_id: &TransactionId, payload: Vec<u8>) -> bool {
        self.settle(transaction_id, Ok(payload))
    }

    /// Delivers an error. Returns `false` if the waiter is gone or already resolved.
    pub fn reject(&self, transaction_id: &TransactionId, error: WaitError) -> bool {
        self.settle(transaction_id, Err(error))
    }

    fn settle(&self, transaction_id: &TransactionId, outcome: WaitOutcome) -> bool {
        match self.waiters.remove(transaction_id) {
            // A dropped receiver means the caller already gave up.
            Some((_, sender)) => sender.send(outcome).is_ok(),
            None => false,
        }
    }

    /// Blocks until the waiter is resolved or `deadline` passes.
    ///
    /// An elapsed deadline is reported as `WaitError::TimedOut` even if nothing
    /// rejected the waiter, so the caller never waits past its window.
    pub async fn wait(&self, handle: WaitHandle, deadline: Instant) -> WaitOutcome {
        let WaitHandle {
            transaction_id,
            receiver,
        } = handle;

        let outcome = match timeout_at(deadline, receiver).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped through `remove`.
            Ok(Err(_)) => Err(WaitError::TimedOut),
            Err(_elapsed) => Err(WaitError::TimedOut),
        };
        self.remove(&transaction_id);
        outcome
    }

    pub fn remove(&self, transaction_id: &TransactionId) {
        self.waiters.remove(transaction_id);
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}
