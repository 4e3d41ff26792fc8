use crate::domain::transaction::TransactionId;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Deferred timeout actions, one per transaction.
///
/// Each armed timer is a spawned task racing its deadline against a
/// cancellation token. Cancellation only prevents the action from starting:
/// once the deadline has fired the action always runs to completion.
#[derive(Debug)]
pub struct TimeoutScheduler {
    timers: Arc<DashMap<TransactionId, (u64, CancellationToken)>>,
    next_generation: AtomicU64,
    root: CancellationToken,
}

impl Default for TimeoutScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutScheduler {
    pub fn new() -> Self {
        Self {
            timers: Arc::new(DashMap::new()),
            next_generation: AtomicU64::new(0),
            root: CancellationToken::new(),
        }
    }

    /// Schedules `on_timeout` to run at `deadline` unless cancelled first.
    ///
    /// Re-arming an id cancels the timer it replaces.
    pub fn arm<F>(&self, transaction_id: TransactionId, deadline: Instant, on_timeout: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();
        if let Some((_, previous)) = self
            .timers
            .insert(transaction_id.clone(), (generation, token.clone()))
        {
            previous.cancel();
        }

        let timers = Arc::clone(&self.timers);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => return,
                () = sleep_until(deadline) => {}
            }
            timers.remove_if(&transaction_id, |_, (armed, _)| *armed == generation);
            on_timeout.await;
        });
    }

    /// Prevents a pending timer from firing. Returns `false` if there was
    /// nothing to cancel, including when the timer has already fired.
    pub fn cancel(&self, transaction_id: &TransactionId) -> bool {
        match self.timers.remove(transaction_id) {
            Some((_, (_, token))) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Number of timers that have neither fired nor been cancelled.
    pub fn armed(&self) -> usize {
        self.timers.len()
    }

    /// Cancels every outstanding timer.
    pub fn shutdown(&self) {
        self.root.cancel();
        self.timers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn id(raw: &str) -> TransactionId {
        TransactionId::parse(raw).unwrap()
    }

    fn counting(counter: &Arc<AtomicUsize>) -> impl Future<Output = ()> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_at_deadline() {
        let scheduler = TimeoutScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.arm(
            id("tx-1"),
            Instant::now() + Duration::from_millis(100),
            counting(&fired),
        );
        assert_eq!(scheduler.armed(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.armed(), 0);
        // Cancel after firing is a no-op.
        assert!(!scheduler.cancel(&id("tx-1")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let scheduler = TimeoutScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.arm(
            id("tx-1"),
            Instant::now() + Duration::from_millis(100),
            counting(&fired),
        );
        assert!(scheduler.cancel(&id("tx-1")));
        assert!(!scheduler.cancel(&id("tx-1")));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_replaces_previous_timer() {
        let scheduler = TimeoutScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));

        scheduler.arm(
            id("tx-1"),
            Instant::now() + Duration::from_millis(100),
            counting(&fired),
        );
        scheduler.arm(
            id("tx-1"),
            Instant::now() + Duration::from_millis(300),
            counting(&fired),
        );

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.armed(), 1);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_everything() {
        let scheduler = TimeoutScheduler::new();
        let fired = Arc::new(AtomicUsize::new(0));
        for n in 0..10 {
            scheduler.arm(
                id(&format!("tx-{n}")),
                Instant::now() + Duration::from_millis(100),
                counting(&fired),
            );
        }

        scheduler.shutdown();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.armed(), 0);
    }
}
