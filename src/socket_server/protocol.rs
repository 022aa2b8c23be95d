//! Socket server protocol message types
//!
//! Defines the JSON message format for client-server communication. Every
//! frame on the wire is zstd-compressed JSON (see `codec`).

use serde::{Deserialize, Serialize};

use crate::fingerprint::{fingerprint, is_valid_fingerprint};

/// First client message: opens a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Raw import map contents
    pub config: String,
    /// Client working directory root
    #[serde(default)]
    pub working_dir: String,
}

/// Subsequent client message, as it appears on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFrame {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// A documentation request, decided once at decode time
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocRequest {
    /// Document a path the tool can read on its own (file or URL)
    Path { path: String },
    /// Document an editor buffer whose content travels with the request
    Buffer {
        path: String,
        content: String,
        fingerprint: String,
    },
}

impl DocRequest {
    /// Client-facing path of the request
    pub fn path(&self) -> &str {
        match self {
            Self::Path { path } | Self::Buffer { path, .. } => path,
        }
    }

    /// Result cache key: the fingerprint for buffers, the path otherwise
    pub fn cache_key(&self) -> &str {
        match self {
            Self::Path { path } => path,
            Self::Buffer { fingerprint, .. } => fingerprint,
        }
    }
}

impl From<RequestFrame> for DocRequest {
    fn from(frame: RequestFrame) -> Self {
        match frame.content {
            None => Self::Path { path: frame.path },
            Some(content) => {
                let fingerprint = frame
                    .fingerprint
                    .filter(|fp| is_valid_fingerprint(fp))
                    .unwrap_or_else(|| fingerprint(&content));
                Self::Buffer {
                    path: frame.path,
                    content,
                    fingerprint,
                }
            }
        }
    }
}

/// Server-to-client message: a documentation result or a challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocResponse {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documentation: Option<String>,
    #[serde(default)]
    pub is_challenge: bool,
}

impl DocResponse {
    /// Documentation result for `path`
    pub fn documentation(path: impl Into<String>, documentation: String) -> Self {
        Self {
            path: path.into(),
            documentation: Some(documentation),
            is_challenge: false,
        }
    }

    /// Ask the client to supply the content of `path`
    pub fn challenge(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            documentation: None,
            is_challenge: true,
        }
    }
}
