//! Analysis tool invocation
//!
//! The documentation generator is an external, synchronous, path-based
//! program. It cannot be handed an editor buffer directly, so the invoker
//! bridges the gap:
//!
//! 1. Seed the session store with the buffer under its fingerprint.
//! 2. Replace the requested path with a pull URL on this server:
//!    `<public_url>/<session>/<path relative to working dir>?fingerprint=<fp>`.
//!    Relative imports the tool resolves from that URL land on the same
//!    session as path keys, which challenge the client when unseen.
//! 3. Run the tool, which may block on those pulls.
//! 4. Rewrite pull URLs in the output back to the client's paths.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use serde::de::IgnoredAny;

use crate::content_store::{ContentKey, ContentStore};
use crate::error::{DocBridgeError, Result};
use crate::socket_server::protocol::DocRequest;

/// A synchronous documentation generator
///
/// `target` is either a local path or an HTTP URL served by the pull boundary.
/// Implementations block the calling thread for the whole run.
pub trait AnalysisTool: Send + Sync {
    fn document(&self, config_path: &Path, target: &str) -> Result<String>;
}

/// `deno doc --import-map <config> --json <target>`
#[derive(Debug, Clone)]
pub struct DenoDoc {
    program: PathBuf,
}

impl DenoDoc {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for DenoDoc {
    fn default() -> Self {
        Self::new("deno")
    }
}

impl AnalysisTool for DenoDoc {
    fn document(&self, config_path: &Path, target: &str) -> Result<String> {
        let output = Command::new(&self.program)
            .arg("doc")
            .arg("--import-map")
            .arg(config_path)
            .arg("--json")
            .arg(target)
            .output()
            .map_err(|e| {
                DocBridgeError::analysis(format!(
                    "failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DocBridgeError::analysis(format!(
                "{} doc exited with {} for {}: {}",
                self.program.display(),
                output.status,
                target,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| DocBridgeError::analysis(format!("non UTF-8 output for {}", target)))
    }
}

/// Pull URL handed to the tool in place of a buffer's path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticUrl {
    /// Path segments percent-encoded, as passed to the tool
    pub encoded: String,
    /// Path segments as the client spelled them
    pub raw: String,
}

/// Validated tool output before client paths are restored.
///
/// This is what the result cache holds, so one run can be restored for any
/// session that asks for the same content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub output: String,
    /// `<public_url>/<session>` of the session the tool ran for
    pub session_base: String,
    pub synthetic: Option<SyntheticUrl>,
}

/// Removes a seeded fingerprint cell once the run that needed it is over
struct SeedGuard<'a> {
    store: &'a ContentStore,
    key: ContentKey,
}

impl Drop for SeedGuard<'_> {
    fn drop(&mut self) {
        self.store.remove(&self.key);
    }
}

/// Runs the analysis tool on behalf of a session
pub struct AnalysisInvoker {
    tool: Arc<dyn AnalysisTool>,
    public_url: String,
}

impl AnalysisInvoker {
    pub fn new(tool: Arc<dyn AnalysisTool>, public_url: impl Into<String>) -> Self {
        Self {
            tool,
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Run the tool for `request` in the session owning `store`.
    ///
    /// Blocks for the duration of the tool run. Failures are reported as
    /// `Analysis` errors and are not retried here. A buffer's fingerprint
    /// cell only lives for the duration of the run.
    pub fn run(
        &self,
        config_path: &Path,
        store: &ContentStore,
        request: &DocRequest,
    ) -> Result<ToolOutput> {
        let mut _seeded = None;
        let (target, synthetic) = match request {
            DocRequest::Path { path } => (path.clone(), None),
            DocRequest::Buffer {
                path,
                content,
                fingerprint,
            } => {
                let key = ContentKey::Fingerprint(fingerprint.clone());
                store.seed(key.clone(), content.clone())?;
                _seeded = Some(SeedGuard { store, key });
                let url = self.synthetic_url(store, path, fingerprint);
                (url.encoded.clone(), Some(url))
            }
        };

        tracing::debug!("[{}] Documenting {}", store.session_id(), target);
        let output = self.tool.document(config_path, &target)?;
        serde_json::from_str::<IgnoredAny>(&output).map_err(|e| {
            DocBridgeError::analysis(format!("unparsable output for {}: {}", request.path(), e))
        })?;

        Ok(ToolOutput {
            output,
            session_base: self.session_base(store.session_id()),
            synthetic,
        })
    }

    /// Run on the blocking pool so the tool can block on pulls served by the
    /// async runtime.
    pub async fn run_blocking(
        self: &Arc<Self>,
        config_path: PathBuf,
        store: Arc<ContentStore>,
        request: DocRequest,
    ) -> Result<ToolOutput> {
        let invoker = Arc::clone(self);
        tokio::task::spawn_blocking(move || invoker.run(&config_path, &store, &request))
            .await
            .map_err(|e| DocBridgeError::analysis(format!("analysis task failed: {}", e)))?
    }

    /// Base URL under which the tool reaches `session_id`'s content
    pub fn session_base(&self, session_id: &str) -> String {
        format!("{}/{}", self.public_url, session_id)
    }

    /// Pull URL standing in for an unsaved buffer
    pub fn synthetic_url(&self, store: &ContentStore, path: &str, fingerprint: &str) -> SyntheticUrl {
        let base = self.session_base(store.session_id());
        let relative = store.relative_path(path);
        let encoded = relative
            .split('/')
            .map(urlencoding::encode)
            .collect::<Vec<_>>()
            .join("/");
        SyntheticUrl {
            encoded: format!("{}/{}?fingerprint={}", base, encoded, fingerprint),
            raw: format!("{}/{}?fingerprint={}", base, relative, fingerprint),
        }
    }

    /// Rewrite pull URLs in `raw` to paths of the session owning `store`.
    ///
    /// `client_path` is the path the requester sent for the documented
    /// buffer; `raw` may come from a run for another session.
    pub fn restore(&self, raw: &ToolOutput, store: &ContentStore, client_path: &str) -> String {
        let mut output = raw.output.clone();
        if let Some(url) = &raw.synthetic {
            let client_path = json_escape(client_path);
            output = output.replace(&url.encoded, &client_path);
            if url.raw != url.encoded {
                output = output.replace(&json_escape(&url.raw), &client_path);
            }
        }
        let working_dir = store.working_dir().to_string_lossy();
        let working_dir = format!("{}/", working_dir.trim_end_matches('/'));
        output.replace(&format!("{}/", raw.session_base), &json_escape(&working_dir))
    }
}

/// Escape `s` for splicing into a JSON string literal
fn json_escape(s: &str) -> String {
    let quoted = serde_json::Value::String(s.to_string()).to_string();
    quoted[1..quoted.len() - 1].to_string()
}
