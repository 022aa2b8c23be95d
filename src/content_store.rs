//! Per-session content store
//!
//! Maps content keys to rendezvous cells for one client session. Cells get
//! into the store two ways:
//!
//! - **pull** (`get_or_create`): the analysis tool asked for a path nobody has
//!   supplied yet. The cell is created empty and a challenge is queued for the
//!   client, which answers with the content.
//! - **push** (`seed`, `supply`): the client sent content inline with a
//!   request. The cell is created already filled and no challenge is sent.
//!   Fingerprint cells hold one buffer version for the tool run that needs
//!   it; path cells hold the latest version the session sent for that path.
//!
//! # Locking
//!
//! Lookups take the read lock. Creation takes the write lock and re-checks,
//! so the first creator wins and exactly one challenge is queued per key.
//! The challenge is sent while the write lock is held, after insertion. The
//! outbound queue is unbounded, so sending never blocks under the lock.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::error::{DocBridgeError, Result};
use crate::rendezvous::RendezvousCell;
use crate::socket_server::protocol::DocResponse;

/// Key of a cell inside a session store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContentKey {
    /// Path relative to the session working directory
    Path(String),
    /// Content fingerprint of an inline buffer
    Fingerprint(String),
}

impl ContentKey {
    /// Path key with leading separators removed
    pub fn path(rel_path: &str) -> Self {
        Self::Path(rel_path.trim_start_matches('/').to_string())
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKey::Path(path) => write!(f, "path:{}", path),
            ContentKey::Fingerprint(fp) => write!(f, "fingerprint:{}", fp),
        }
    }
}

struct StoreState {
    cells: HashMap<ContentKey, Arc<RendezvousCell>>,
    closed: bool,
}

/// Keyed collection of rendezvous cells for one session
pub struct ContentStore {
    session_id: String,
    working_dir: PathBuf,
    state: RwLock<StoreState>,
    /// Session outbound queue, shared with documentation results
    outbound: mpsc::UnboundedSender<DocResponse>,
}

impl ContentStore {
    /// Create an empty store whose challenges go to `outbound`
    pub fn new(
        session_id: impl Into<String>,
        working_dir: impl Into<PathBuf>,
        outbound: mpsc::UnboundedSender<DocResponse>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            working_dir: working_dir.into(),
            state: RwLock::new(StoreState {
                cells: HashMap::new(),
                closed: false,
            }),
            outbound,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Absolute client path for a path relative to the working directory
    pub fn client_path(&self, rel_path: &str) -> String {
        self.working_dir
            .join(rel_path.trim_start_matches('/'))
            .to_string_lossy()
            .into_owned()
    }

    /// Path of `client_path` relative to the working directory, with forward
    /// slashes.
    ///
    /// Paths outside the working directory keep their full path minus the
    /// leading separator.
    pub fn relative_path(&self, client_path: &str) -> String {
        let relative = match Path::new(client_path).strip_prefix(&self.working_dir) {
            Ok(rel) => rel.to_string_lossy().into_owned(),
            Err(_) => client_path.to_string(),
        };
        relative.replace('\\', "/").trim_start_matches('/').to_string()
    }

    /// Get the cell for `rel_path`, creating it and challenging the client if
    /// it does not exist yet.
    pub fn get_or_create(&self, rel_path: &str) -> Result<Arc<RendezvousCell>> {
        let key = ContentKey::path(rel_path);

        {
            let state = self.state.read();
            if let Some(cell) = state.cells.get(&key) {
                return Ok(Arc::clone(cell));
            }
            if state.closed {
                return Err(DocBridgeError::Cancelled);
            }
        }

        let mut state = self.state.write();
        if let Some(cell) = state.cells.get(&key) {
            return Ok(Arc::clone(cell));
        }
        if state.closed {
            return Err(DocBridgeError::Cancelled);
        }

        let cell = Arc::new(RendezvousCell::new(key.to_string()));
        let client_path = match &key {
            ContentKey::Path(rel) => self.client_path(rel),
            ContentKey::Fingerprint(fp) => fp.clone(),
        };
        state.cells.insert(key, Arc::clone(&cell));

        tracing::info!("[{}] Challenging client for {}", self.session_id, client_path);
        if self.outbound.send(DocResponse::challenge(client_path)).is_err() {
            tracing::warn!(
                "[{}] Outbound queue closed, challenge not delivered",
                self.session_id
            );
        }

        Ok(cell)
    }

    /// Push content the client supplied before anyone asked for it.
    ///
    /// Fills an existing cell, or creates one already filled (no challenge).
    /// Seeding identical content twice is accepted; different content for the
    /// same key fails with `AlreadySet`.
    pub fn seed(&self, key: ContentKey, content: String) -> Result<()> {
        let existing = self.state.read().cells.get(&key).cloned();
        let cell = match existing {
            Some(cell) => cell,
            None => {
                let mut state = self.state.write();
                if state.closed {
                    return Err(DocBridgeError::Cancelled);
                }
                match state.cells.entry(key) {
                    Entry::Occupied(entry) => Arc::clone(entry.get()),
                    Entry::Vacant(entry) => {
                        let label = entry.key().to_string();
                        entry.insert(Arc::new(RendezvousCell::filled(label, content)));
                        return Ok(());
                    }
                }
            }
        };
        cell.set_or_confirm(content).map(|_| ())
    }

    /// Record the latest content the client sent for `rel_path`.
    ///
    /// A pull already waiting on the path is released with it and true is
    /// returned. Otherwise the path cell is replaced by one filled with this
    /// version, so later pulls resolve without a challenge. A cell is still
    /// assigned only once: each new version gets a new cell, and pulls that
    /// already hold the previous cell keep the previous value.
    pub fn supply(&self, rel_path: &str, content: &str) -> Result<bool> {
        let key = ContentKey::path(rel_path);
        let mut state = self.state.write();
        if state.closed {
            return Err(DocBridgeError::Cancelled);
        }

        if let Some(cell) = state.cells.get(&key) {
            if cell.is_pending() {
                let filled = cell.set_or_confirm(content.to_string())?;
                if filled {
                    tracing::debug!("[{}] Challenge answered for {}", self.session_id, rel_path);
                }
                return Ok(filled);
            }
            if cell.try_get().as_deref() == Some(content) {
                return Ok(false);
            }
        }

        let label = key.to_string();
        state
            .cells
            .insert(key, Arc::new(RendezvousCell::filled(label, content.to_string())));
        Ok(false)
    }

    /// Drop the cell for `key`. Waiters already holding it are unaffected.
    pub fn remove(&self, key: &ContentKey) -> Option<Arc<RendezvousCell>> {
        self.state.write().cells.remove(key)
    }

    /// Existing cell for `key`, never creating one
    pub fn lookup(&self, key: &ContentKey) -> Option<Arc<RendezvousCell>> {
        self.state.read().cells.get(key).cloned()
    }

    /// Close the store, releasing every waiter on an unfilled cell with
    /// `Cancelled`. No cells can be created afterwards.
    pub fn close(&self) -> usize {
        let mut state = self.state.write();
        state.closed = true;
        let cancelled = state.cells.values().filter(|cell| cell.cancel()).count();
        if cancelled > 0 {
            tracing::info!(
                "[{}] Released {} pending content request(s)",
                self.session_id,
                cancelled
            );
        }
        cancelled
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    /// Number of cells in the store
    pub fn len(&self) -> usize {
        self.state.read().cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of cells still waiting for content
    pub fn pending(&self) -> usize {
        self.state
            .read()
            .cells
            .values()
            .filter(|cell| cell.is_pending())
            .count()
    }
}
