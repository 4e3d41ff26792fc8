use crate::domain::ports::CorrelationStoreRef;
use crate::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Periodic sweep that evicts old records from the correlation store.
pub struct Reaper {
    store: CorrelationStoreRef,
    interval: Duration,
    retention: Duration,
}

impl Reaper {
    pub fn new(store: CorrelationStoreRef, interval: Duration, retention: Duration) -> Self {
        Self {
            store,
            interval,
            retention,
        }
    }

    pub async fn sweep(&self) -> Result<usize> {
        self.sweep_at(Utc::now()).await
    }

    /// Removes records that aged out of the retention window as seen at `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let retention = chrono::Duration::from_std(self.retention).map_err(|_| {
            GatewayError::Validation(format!("retention {:?} out of range", self.retention))
        })?;
        self.store.delete_older_than(now - retention).await
    }

    /// Sweeps every `interval` until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => match self.sweep().await {
                    Ok(0) => debug!("reaper sweep found nothing to evict"),
                    Ok(removed) => info!(removed, "reaper evicted transactions"),
                    Err(e) => error!(error = %e, "reaper sweep failed"),
                },
            }
        }
        debug!("reaper stopped");
    }

    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
