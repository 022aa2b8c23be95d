//! Docbridge: documentation for unsaved editor buffers
//!
//! This library bridges editor sessions to a path-based documentation tool
//! (`deno doc`). Buffers the tool cannot read from disk are served to it over
//! HTTP, and any module it needs that the client has not sent yet is requested
//! from the client as a challenge on the session channel.
//!
//! # Pieces
//!
//! - [`rendezvous::RendezvousCell`]: set-once value with any number of waiters
//! - [`content_store::ContentStore`]: per-session cells keyed by path or fingerprint
//! - [`socket_server::SessionRegistry`]: live sessions, resolved by the pull boundary
//! - [`materializer::ConfigMaterializer`]: import maps rewritten onto the pull boundary
//! - [`result_cache::ResultCache`]: bounded cache with single-flight computation
//! - [`analysis::AnalysisInvoker`]: runs the tool and maps pull URLs back to client paths
//! - [`socket_server::connection`]: the session state machine
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use docbridge::{DaemonConfig, Services};
//!
//! let services = Arc::new(Services::new(DaemonConfig::default()));
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8081").await?;
//! docbridge::socket_server::pull::serve(listener, services).await?;
//! ```

pub mod analysis;
pub mod config;
pub mod content_store;
pub mod error;
pub mod fingerprint;
pub mod materializer;
pub mod rendezvous;
pub mod result_cache;
pub mod socket_server;

// Re-export commonly used types
pub use analysis::{AnalysisInvoker, AnalysisTool, DenoDoc, ToolOutput};
pub use config::DaemonConfig;
pub use content_store::{ContentKey, ContentStore};
pub use error::{DocBridgeError, Result};
pub use fingerprint::fingerprint;
pub use materializer::{ConfigEntry, ConfigMaterializer};
pub use rendezvous::RendezvousCell;
pub use result_cache::{CacheStats, ResultCache};
pub use socket_server::{Services, SessionRegistry};
