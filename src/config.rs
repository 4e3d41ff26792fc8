use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_REAPER_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(300);

/// Runtime configuration of the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    pub listen_addr: SocketAddr,
    /// Base URL the dispatcher forwards requests to.
    pub backend_url: String,
    /// Public base URL of this gateway, advertised to the backend for callbacks.
    pub callback_base_url: Option<String>,
    /// Per-transaction window.
    pub timeout: Duration,
    pub reaper_interval: Duration,
    /// How long terminal records are kept before the reaper evicts them.
    pub retention: Duration,
    /// Extra time granted to records left pending by a previous process.
    pub recovery_grace: Duration,
    pub db_path: Option<PathBuf>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            backend_url: "http://localhost:9090".to_string(),
            callback_base_url: None,
            timeout: DEFAULT_TIMEOUT,
            reaper_interval: DEFAULT_REAPER_INTERVAL,
            retention: DEFAULT_RETENTION,
            recovery_grace: Duration::ZERO,
            db_path: None,
        }
    }
}
