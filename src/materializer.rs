//! Import map materialization
//!
//! The analysis tool reads its import map from disk, so each distinct raw
//! configuration sent by a client is rewritten and written once to
//! `<dist_dir>/<fingerprint>/import_map.json`.
//!
//! The rewrite points the map's `"./"` root at the pull boundary URL of the
//! session that materialized it, so the tool's own relative lookups route
//! back through this server.
//!
//! Entries are keyed by the fingerprint of the raw configuration alone. A
//! second session sending the same configuration reuses the artifact written
//! for the first one, including the first session's URL.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{DocBridgeError, Result};
use crate::fingerprint::fingerprint;
use crate::result_cache::{CacheStats, ResultCache};

/// File name of a materialized import map
pub const IMPORT_MAP_FILE: &str = "import_map.json";

/// A materialized configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigEntry {
    /// Fingerprint of the raw configuration
    pub fingerprint: String,
    /// Location of the rewritten import map
    pub localized_path: PathBuf,
}

/// Content-addressed, single-flight writer of localized import maps
pub struct ConfigMaterializer {
    dist_dir: PathBuf,
    public_url: String,
    entries: ResultCache<ConfigEntry>,
    materializations: AtomicUsize,
}

impl ConfigMaterializer {
    pub fn new(dist_dir: impl Into<PathBuf>, public_url: impl Into<String>, capacity: usize) -> Self {
        Self {
            dist_dir: dist_dir.into(),
            public_url: public_url.into(),
            entries: ResultCache::new(capacity),
            materializations: AtomicUsize::new(0),
        }
    }

    pub fn dist_dir(&self) -> &Path {
        &self.dist_dir
    }

    /// Return the materialized entry for `raw`, writing it if this is the
    /// first time the configuration is seen.
    ///
    /// Concurrent calls with the same configuration share one write. The
    /// write itself runs on the blocking pool.
    pub async fn ensure(&self, raw: &str, session_id: &str) -> Result<ConfigEntry> {
        let fp = fingerprint(raw);
        self.entries
            .compute(&fp, || self.materialize(&fp, raw, session_id))
            .await
    }

    async fn materialize(&self, fp: &str, raw: &str, session_id: &str) -> Result<ConfigEntry> {
        let dir = self.dist_dir.join(fp);
        let localized_path = dir.join(IMPORT_MAP_FILE);
        let session_base = format!("{}/{}", self.public_url, session_id);
        let contents = localize(raw, &session_base);

        let target = localized_path.clone();
        tokio::task::spawn_blocking(move || write_import_map(&dir, &target, &contents))
            .await
            .map_err(|e| DocBridgeError::Materialization {
                path: localized_path.clone(),
                source: std::io::Error::other(e),
            })??;

        self.materializations.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            "Materialized import map {} -> {}",
            fp,
            localized_path.display()
        );

        Ok(ConfigEntry {
            fingerprint: fp.to_string(),
            localized_path,
        })
    }

    /// Number of import maps actually written
    pub fn materializations(&self) -> usize {
        self.materializations.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> CacheStats {
        self.entries.stats()
    }
}

fn write_import_map(dir: &Path, path: &Path, contents: &str) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| DocBridgeError::Materialization {
        path: dir.to_path_buf(),
        source,
    })?;
    fs::write(path, contents).map_err(|source| DocBridgeError::Materialization {
        path: path.to_path_buf(),
        source,
    })
}

/// Point the import map's `"./"` root at `session_base`
pub fn localize(raw: &str, session_base: &str) -> String {
    raw.replace("\"./\"", &format!("\"{}/\"", session_base.trim_end_matches('/')))
}
