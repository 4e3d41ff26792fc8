use clap::Parser;
use miette::{IntoDiagnostic, Result};
use relaygate::application::engine::CorrelationEngine;
use relaygate::application::reaper::Reaper;
use relaygate::config::{
    DEFAULT_REAPER_INTERVAL, DEFAULT_RETENTION, DEFAULT_TIMEOUT, GatewayConfig,
};
use relaygate::domain::ports::CorrelationStoreRef;
use relaygate::infrastructure::http_dispatcher::HttpDispatcher;
use relaygate::infrastructure::in_memory::InMemoryStore;
use relaygate::interfaces::http::router;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Address the HTTP server listens on
    #[arg(long, env = "RELAYGATE_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    listen_addr: SocketAddr,

    /// Base URL of the backend that performs the work
    #[arg(long, env = "RELAYGATE_BACKEND_URL")]
    backend_url: String,

    /// Public base URL of this gateway, sent to the backend as the callback target
    #[arg(long, env = "RELAYGATE_CALLBACK_BASE_URL")]
    callback_base_url: Option<String>,

    /// Per-transaction timeout in milliseconds
    #[arg(long, env = "RELAYGATE_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT.as_millis() as u64)]
    timeout_ms: u64,

    /// Seconds between reaper sweeps
    #[arg(long, env = "RELAYGATE_REAPER_INTERVAL_SECS", default_value_t = DEFAULT_REAPER_INTERVAL.as_secs())]
    reaper_interval_secs: u64,

    /// Seconds a finished transaction is kept before eviction
    #[arg(long, env = "RELAYGATE_RETENTION_SECS", default_value_t = DEFAULT_RETENTION.as_secs())]
    retention_secs: u64,

    /// Extra seconds granted to transactions left pending by a previous run
    #[arg(long, env = "RELAYGATE_RECOVERY_GRACE_SECS", default_value_t = 0)]
    recovery_grace_secs: u64,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "RELAYGATE_DB_PATH")]
    db_path: Option<PathBuf>,
}

impl From<Cli> for GatewayConfig {
    fn from(cli: Cli) -> Self {
        Self {
            listen_addr: cli.listen_addr,
            backend_url: cli.backend_url,
            callback_base_url: cli.callback_base_url,
            timeout: Duration::from_millis(cli.timeout_ms),
            reaper_interval: Duration::from_secs(cli.reaper_interval_secs),
            retention: Duration::from_secs(cli.retention_secs),
            recovery_grace: Duration::from_secs(cli.recovery_grace_secs),
            db_path: cli.db_path,
        }
    }
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<&Path>) -> Result<CorrelationStoreRef> {
    use relaygate::infrastructure::rocksdb::RocksDbStore;

    match db_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "using RocksDB correlation store");
            Ok(Arc::new(RocksDbStore::open(path).into_diagnostic()?))
        }
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<&Path>) -> Result<CorrelationStoreRef> {
    if db_path.is_some() {
        tracing::warn!(
            "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Arc::new(InMemoryStore::new()))
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        }
        () = shutdown.cancelled() => {}
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,relaygate=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = GatewayConfig::from(Cli::parse());

    let store = open_store(config.db_path.as_deref())?;
    let dispatcher = HttpDispatcher::new(
        config.backend_url.clone(),
        config.callback_base_url.clone(),
        config.timeout,
    )
    .into_diagnostic()?;
    let engine = CorrelationEngine::new(store.clone(), Arc::new(dispatcher), config.timeout);

    engine
        .recover_pending(config.recovery_grace)
        .await
        .into_diagnostic()?;

    let shutdown = CancellationToken::new();
    let reaper = Reaper::new(store, config.reaper_interval, config.retention)
        .spawn(shutdown.clone());

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .into_diagnostic()?;
    tracing::info!(
        addr = %listener.local_addr().into_diagnostic()?,
        backend = %config.backend_url,
        timeout_ms = config.timeout.as_millis() as u64,
        "relaygate listening"
    );

    axum::serve(listener, router(engine.clone()))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .into_diagnostic()?;

    shutdown.cancel();
    engine.shutdown();
    reaper.await.into_diagnostic()?;

    Ok(())
}
