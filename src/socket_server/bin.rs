//! Docbridge Daemon Binary
//!
//! Serves documentation sessions over WebSocket and virtual content to the
//! analysis tool over HTTP.
//!
//! # Usage
//!
//! ```bash
//! docbridge --port 8080 --pull-port 8081
//! docbridge --deno /usr/local/bin/deno --dist-dir /tmp/docbridge
//! DOCBRIDGE_PUBLIC_URL=http://docbridge.internal:8081 docbridge --host 0.0.0.0
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use docbridge::config::{default_dist_dir, DaemonConfig, DEFAULT_PORT, DEFAULT_PULL_PORT};
use docbridge::result_cache::DEFAULT_CAPACITY;
use docbridge::socket_server::{handle_connection, pull, Services};

/// Docbridge Daemon
#[derive(Parser, Debug)]
#[command(name = "docbridge")]
#[command(about = "Documentation bridge for unsaved editor buffers")]
struct Args {
    /// WebSocket session port
    #[arg(short, long, env = "DOCBRIDGE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// HTTP pull boundary port
    #[arg(long, env = "DOCBRIDGE_PULL_PORT", default_value_t = DEFAULT_PULL_PORT)]
    pull_port: u16,

    /// Host to bind to
    #[arg(long, env = "DOCBRIDGE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// URL the analysis tool uses to reach the pull boundary
    #[arg(long, env = "DOCBRIDGE_PUBLIC_URL")]
    public_url: Option<String>,

    /// Directory for materialized import maps
    #[arg(long, env = "DOCBRIDGE_DIST_DIR")]
    dist_dir: Option<PathBuf>,

    /// Analysis tool executable
    #[arg(long, env = "DOCBRIDGE_DENO", default_value = "deno")]
    deno: PathBuf,

    /// Documentation results kept in memory
    #[arg(long, env = "DOCBRIDGE_RESULT_CACHE", default_value_t = DEFAULT_CAPACITY)]
    result_cache_capacity: usize,

    /// Import maps kept in memory
    #[arg(long, env = "DOCBRIDGE_CONFIG_CACHE", default_value_t = DEFAULT_CAPACITY)]
    config_cache_capacity: usize,

    /// zstd level for outbound frames
    #[arg(long, env = "DOCBRIDGE_COMPRESSION_LEVEL", default_value_t = zstd::DEFAULT_COMPRESSION_LEVEL)]
    compression_level: i32,

    /// Seconds a closing session waits for in-flight requests
    #[arg(long, env = "DOCBRIDGE_DRAIN_TIMEOUT", default_value_t = 30)]
    drain_timeout_secs: u64,

    /// Seconds a pull may wait for content (unbounded when unset)
    #[arg(long, env = "DOCBRIDGE_PULL_TIMEOUT")]
    pull_timeout_secs: Option<u64>,
}

impl From<Args> for DaemonConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            pull_port: args.pull_port,
            public_url: args.public_url,
            dist_dir: args.dist_dir.unwrap_or_else(default_dist_dir),
            deno: args.deno,
            result_cache_capacity: args.result_cache_capacity,
            config_cache_capacity: args.config_cache_capacity,
            compression_level: args.compression_level,
            drain_timeout: Duration::from_secs(args.drain_timeout_secs),
            pull_timeout: args.pull_timeout_secs.map(Duration::from_secs),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("docbridge=info".parse()?),
        )
        .init();

    let config = DaemonConfig::from(Args::parse());
    let ws_addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let pull_addr: SocketAddr = format!("{}:{}", config.host, config.pull_port).parse()?;
    let services = Arc::new(Services::new(config));

    let pull_listener = TcpListener::bind(&pull_addr).await?;
    tracing::info!(
        "Pull boundary listening on http://{} (public URL {})",
        pull_addr,
        services.config.public_url()
    );
    let pull_services = Arc::clone(&services);
    tokio::spawn(async move {
        if let Err(e) = pull::serve(pull_listener, pull_services).await {
            tracing::error!("Pull boundary stopped: {}", e);
        }
    });

    let listener = TcpListener::bind(&ws_addr).await?;
    tracing::info!("Docbridge listening on ws://{}", ws_addr);
    tracing::info!("Import maps materialize under {}", services.config.dist_dir.display());

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                tracing::info!("Accepted connection from {}", addr);
                let services = Arc::clone(&services);
                tokio::spawn(async move {
                    handle_connection(stream, services).await;
                });
            }
            Err(e) => {
                tracing::error!("Failed to accept connection: {}", e);
            }
        }
    }
}
