//! Shared daemon services
//!
//! Every process-wide structure (session registry, import map cache, result
//! cache, analysis invoker) lives here and is handed to connections and the
//! pull boundary as `Arc<Services>`. Tests build isolated instances.

use std::sync::Arc;

use crate::analysis::{AnalysisInvoker, AnalysisTool, DenoDoc, ToolOutput};
use crate::config::DaemonConfig;
use crate::materializer::ConfigMaterializer;
use crate::result_cache::ResultCache;
use crate::socket_server::codec::FrameCodec;
use crate::socket_server::session_registry::SessionRegistry;

/// Services shared by every connection
pub struct Services {
    pub config: DaemonConfig,
    pub registry: SessionRegistry,
    pub materializer: ConfigMaterializer,
    /// Tool output keyed by content fingerprint or path, restored per session
    pub results: ResultCache<ToolOutput>,
    pub invoker: Arc<AnalysisInvoker>,
    pub codec: FrameCodec,
}

impl Services {
    /// Services running the configured `deno` executable
    pub fn new(config: DaemonConfig) -> Self {
        let tool = Arc::new(DenoDoc::new(config.deno.clone()));
        Self::with_tool(config, tool)
    }

    /// Services running a custom analysis tool
    pub fn with_tool(config: DaemonConfig, tool: Arc<dyn AnalysisTool>) -> Self {
        let public_url = config.public_url();
        Self {
            registry: SessionRegistry::new(),
            materializer: ConfigMaterializer::new(
                config.dist_dir.clone(),
                public_url.clone(),
                config.config_cache_capacity,
            ),
            results: ResultCache::new(config.result_cache_capacity),
            invoker: Arc::new(AnalysisInvoker::new(tool, public_url)),
            codec: FrameCodec::new(config.compression_level),
            config,
        }
    }
}
