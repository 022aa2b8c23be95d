//! Analysis tool double that resolves modules over the pull boundary

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use docbridge::{AnalysisTool, DocBridgeError, Result};
use tokio::runtime::Handle;

/// Fetches its target, then every `from "./..."` import relative to it, and
/// reports each module it saw as a deno-doc style node.
///
/// Targets that are not HTTP URLs fail, like a missing local file would.
pub struct PullingTool {
    handle: Handle,
    invocations: AtomicUsize,
}

impl PullingTool {
    /// Must be created inside the test runtime
    pub fn new() -> Self {
        Self {
            handle: Handle::current(),
            invocations: AtomicUsize::new(0),
        }
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    fn fetch(&self, url: &str) -> Result<String> {
        self.handle.block_on(async {
            let response = reqwest::get(url)
                .await
                .map_err(|e| DocBridgeError::analysis(format!("fetch {}: {}", url, e)))?;
            let status = response.status();
            if !status.is_success() {
                return Err(DocBridgeError::analysis(format!(
                    "fetch {}: HTTP {}",
                    url, status
                )));
            }
            response
                .text()
                .await
                .map_err(|e| DocBridgeError::analysis(format!("read {}: {}", url, e)))
        })
    }
}

impl AnalysisTool for PullingTool {
    fn document(&self, _config_path: &Path, target: &str) -> Result<String> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        if !target.starts_with("http://") {
            return Err(DocBridgeError::analysis(format!(
                "Module not found \"{}\"",
                target
            )));
        }

        let source = self.fetch(target)?;
        let mut nodes = vec![serde_json::json!({
            "kind": "module",
            "location": { "filename": target },
            "source": source,
        })];

        let base = module_dir(target);
        for specifier in relative_imports(&source) {
            let url = format!("{}/{}", base, specifier.trim_start_matches("./"));
            let imported = self.fetch(&url)?;
            nodes.push(serde_json::json!({
                "kind": "import",
                "location": { "filename": url },
                "source": imported,
            }));
        }

        Ok(serde_json::Value::Array(nodes).to_string())
    }
}

/// URL of the directory holding `url`, without query or trailing slash
fn module_dir(url: &str) -> &str {
    let without_query = url.split('?').next().unwrap_or(url);
    match without_query.rfind('/') {
        Some(idx) => &without_query[..idx],
        None => without_query,
    }
}

/// Specifiers of `from "./x"` / `from './x'` imports
fn relative_imports(source: &str) -> Vec<String> {
    let mut imports = Vec::new();
    for line in source.lines() {
        let Some(idx) = line.find("from ") else {
            continue;
        };
        let rest = line[idx + 5..].trim();
        let Some(quote) = rest.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            continue;
        };
        let inner = &rest[1..];
        if let Some(end) = inner.find(quote) {
            let specifier = &inner[..end];
            if specifier.starts_with("./") {
                imports.push(specifier.to_string());
            }
        }
    }
    imports
}
