//! Error types for docbridge
//!
//! Errors at the request level end only that request's task. Errors at the
//! connection level (`Protocol`, transport) end the whole session.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Main error type for docbridge operations
#[derive(Error, Debug)]
pub enum DocBridgeError {
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Failed to materialize import map at {}: {source}", path.display())]
    Materialization {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Analysis failed: {message}")]
    Analysis { message: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Session already registered: {session_id}")]
    DuplicateSession { session_id: String },

    #[error("No content registered for {key}")]
    ContentNotFound { key: String },

    #[error("Content for {key} was already set")]
    AlreadySet { key: String },

    #[error("Cancelled: session closed before the value was available")]
    Cancelled,

    /// One failure observed by every caller that coalesced onto the same computation
    #[error(transparent)]
    Shared(Arc<DocBridgeError>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

impl DocBridgeError {
    /// Build a protocol error from anything displayable
    pub fn protocol(message: impl std::fmt::Display) -> Self {
        Self::Protocol {
            message: message.to_string(),
        }
    }

    /// Build an analysis error from anything displayable
    pub fn analysis(message: impl std::fmt::Display) -> Self {
        Self::Analysis {
            message: message.to_string(),
        }
    }

    /// The error with any `Shared` wrappers peeled off
    pub fn root(&self) -> &DocBridgeError {
        match self {
            Self::Shared(inner) => inner.root(),
            other => other,
        }
    }

    /// Whether this error means a session went away underneath the caller
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }

    /// Whether this error is fatal to the whole connection
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.root(),
            Self::Protocol { .. } | Self::WebSocket(_) | Self::Materialization { .. }
        )
    }
}

/// Result type alias for docbridge operations
pub type Result<T> = std::result::Result<T, DocBridgeError>;
