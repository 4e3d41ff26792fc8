#![allow(dead_code)]

use relaygate::application::engine::CorrelationEngine;
use relaygate::domain::callback::CallbackBody;
use relaygate::domain::ports::Dispatcher;
use relaygate::domain::transaction::OutboundRequest;
use relaygate::infrastructure::in_memory::InMemoryStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Hands every dispatched request to a channel instead of the network.
pub struct ChannelDispatcher {
    sender: mpsc::UnboundedSender<OutboundRequest>,
}

impl Dispatcher for ChannelDispatcher {
    fn dispatch(&self, request: OutboundRequest) {
        let _ = self.sender.send(request);
    }
}

pub struct Harness {
    pub engine: CorrelationEngine,
    pub store: Arc<InMemoryStore>,
    pub outbound: mpsc::UnboundedReceiver<OutboundRequest>,
}

pub fn harness(timeout: Duration) -> Harness {
    let (sender, outbound) = mpsc::unbounded_channel();
    let store = Arc::new(InMemoryStore::new());
    let engine = CorrelationEngine::new(
        store.clone(),
        Arc::new(ChannelDispatcher { sender }),
        timeout,
    );
    Harness {
        engine,
        store,
        outbound,
    }
}

/// Simulated backend: answers each dispatched request through callback
/// intake. `respond` picks the delay and the callback body; `None` means the
/// backend never answers.
pub fn spawn_backend<F>(
    engine: CorrelationEngine,
    mut outbound: mpsc::UnboundedReceiver<OutboundRequest>,
    respond: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn(&OutboundRequest) -> Option<(Duration, CallbackBody)> + Send + Sync + 'static,
{
    let respond = Arc::new(respond);
    tokio::spawn(async move {
        while let Some(request) = outbound.recv().await {
            let Some((delay, body)) = respond(&request) else {
                continue;
            };
            let engine = engine.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                engine
                    .on_callback(&request.transaction_id, body)
                    .await
                    .expect("callback intake failed");
            });
        }
    })
}
