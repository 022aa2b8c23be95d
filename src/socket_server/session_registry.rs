//! Session registry
//!
//! Directory of live sessions. Each connected client owns exactly one
//! `ContentStore`, registered at handshake and removed when the connection
//! terminates. The pull boundary resolves `/{session}/{key}` through here.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::content_store::{ContentKey, ContentStore};
use crate::error::{DocBridgeError, Result};
use crate::rendezvous::RendezvousCell;
use crate::socket_server::protocol::DocResponse;

/// Unique identifier for a session
pub type SessionId = String;

/// Generate a fresh session id
pub fn new_session_id() -> SessionId {
    uuid::Uuid::new_v4().to_string()
}

/// Registry of all live session stores
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<ContentStore>>>,
}

impl SessionRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a store for a new session
    pub fn open(
        &self,
        session_id: &str,
        working_dir: impl Into<PathBuf>,
        outbound: mpsc::UnboundedSender<DocResponse>,
    ) -> Result<Arc<ContentStore>> {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(session_id) {
            return Err(DocBridgeError::DuplicateSession {
                session_id: session_id.to_string(),
            });
        }
        let store = Arc::new(ContentStore::new(session_id, working_dir, outbound));
        sessions.insert(session_id.to_string(), Arc::clone(&store));
        tracing::info!("Opened session {} ({} live)", session_id, sessions.len());
        Ok(store)
    }

    /// Store for a live session
    pub fn get(&self, session_id: &str) -> Option<Arc<ContentStore>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Resolve a pull against a session.
    ///
    /// Path keys are created on demand (challenging the client). Fingerprint
    /// keys are only ever seeded by the session itself, so an unknown
    /// fingerprint fails instead of leaving a cell nobody can answer.
    pub fn resolve(&self, session_id: &str, key: &ContentKey) -> Result<Arc<RendezvousCell>> {
        let store = self
            .get(session_id)
            .ok_or_else(|| DocBridgeError::SessionNotFound {
                session_id: session_id.to_string(),
            })?;

        match key {
            ContentKey::Path(rel_path) => store.get_or_create(rel_path),
            ContentKey::Fingerprint(_) => {
                store
                    .lookup(key)
                    .ok_or_else(|| DocBridgeError::ContentNotFound {
                        key: key.to_string(),
                    })
            }
        }
    }

    /// Remove a session, releasing every pending waiter with `Cancelled`
    pub fn close(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id);
        match removed {
            Some(store) => {
                store.close();
                tracing::info!("Closed session {}", session_id);
                true
            }
            None => false,
        }
    }

    /// Get all live session ids
    pub fn active_sessions(&self) -> Vec<SessionId> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Get stats about the registry
    pub fn stats(&self) -> RegistryStats {
        let sessions = self.sessions.read();
        RegistryStats {
            session_count: sessions.len(),
            pending_pulls: sessions.values().map(|s| s.pending()).sum(),
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the registry
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub session_count: usize,
    pub pending_pulls: usize,
}
