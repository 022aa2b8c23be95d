//! Daemon configuration
//!
//! `DaemonConfig` holds every tunable of the daemon. The binary fills it from
//! command-line flags (with `DOCBRIDGE_*` environment fallbacks); tests build
//! it directly, usually from `Default` with a few fields overridden.

use std::path::PathBuf;
use std::time::Duration;

use crate::result_cache::DEFAULT_CAPACITY;

/// Default WebSocket port for editor sessions
pub const DEFAULT_PORT: u16 = 8080;

/// Default HTTP port for the pull boundary
pub const DEFAULT_PULL_PORT: u16 = 8081;

/// Configuration for a docbridge daemon
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Interface both listeners bind to
    pub host: String,
    /// WebSocket session port
    pub port: u16,
    /// HTTP pull boundary port
    pub pull_port: u16,
    /// Base URL the analysis tool uses to reach the pull boundary.
    /// Derived from `host` and `pull_port` when unset.
    pub public_url: Option<String>,
    /// Directory holding materialized import maps
    pub dist_dir: PathBuf,
    /// Analysis tool executable
    pub deno: PathBuf,
    /// Documentation results kept in memory
    pub result_cache_capacity: usize,
    /// Import map entries kept in memory
    pub config_cache_capacity: usize,
    /// zstd level for outbound frames
    pub compression_level: i32,
    /// How long a closing session waits for in-flight requests
    pub drain_timeout: Duration,
    /// Upper bound on a single pull; `None` waits until the session closes
    pub pull_timeout: Option<Duration>,
}

impl DaemonConfig {
    /// Base URL of the pull boundary, without a trailing slash
    pub fn public_url(&self) -> String {
        match &self.public_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.pull_port),
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            pull_port: DEFAULT_PULL_PORT,
            public_url: None,
            dist_dir: default_dist_dir(),
            deno: PathBuf::from("deno"),
            result_cache_capacity: DEFAULT_CAPACITY,
            config_cache_capacity: DEFAULT_CAPACITY,
            compression_level: zstd::DEFAULT_COMPRESSION_LEVEL,
            drain_timeout: Duration::from_secs(30),
            pull_timeout: None,
        }
    }
}

/// Base directory for docbridge state
pub fn get_cache_base_dir() -> PathBuf {
    // Check XDG_CACHE_HOME first
    if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
        return PathBuf::from(xdg_cache).join("docbridge");
    }

    // Fall back to ~/.cache/docbridge
    if let Some(home) = dirs::home_dir() {
        return home.join(".cache").join("docbridge");
    }

    // Last resort: temp directory
    std::env::temp_dir().join("docbridge")
}

/// Default location of materialized import maps
pub fn default_dist_dir() -> PathBuf {
    get_cache_base_dir().join("dist")
}
