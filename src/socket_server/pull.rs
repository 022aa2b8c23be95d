//! HTTP pull boundary
//!
//! The analysis tool fetches virtual content from here:
//!
//! ```text
//! GET /{session_id}/{path}                      -> path key (may challenge the client)
//! GET /{session_id}/{path}?fingerprint=<fp>     -> content seeded by the session
//! ```
//!
//! | Status | Meaning                                          |
//! |--------|--------------------------------------------------|
//! | 200    | raw content                                      |
//! | 404    | unknown session, or unknown fingerprint          |
//! | 410    | session closed while the pull was waiting        |
//! | 504    | pull timeout elapsed (when configured)           |
//!
//! A pull on a path nobody supplied yet holds the request open until the
//! client answers the challenge or the session closes.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::net::TcpListener;

use crate::content_store::ContentKey;
use crate::error::DocBridgeError;
use crate::socket_server::services::Services;

#[derive(Debug, Default, Deserialize)]
pub struct PullQuery {
    #[serde(default)]
    pub fingerprint: Option<String>,
}

/// Router serving pulls against `services.registry`
pub fn router(services: Arc<Services>) -> Router {
    Router::new()
        .route("/:session_id/*key", get(pull))
        .with_state(services)
}

/// Serve the pull boundary until the listener fails
pub async fn serve(listener: TcpListener, services: Arc<Services>) -> std::io::Result<()> {
    axum::serve(listener, router(services)).await
}

async fn pull(
    State(services): State<Arc<Services>>,
    Path((session_id, path)): Path<(String, String)>,
    Query(query): Query<PullQuery>,
) -> Response {
    let key = match query.fingerprint.filter(|fp| !fp.is_empty()) {
        Some(fp) => ContentKey::Fingerprint(fp),
        None => ContentKey::path(&path),
    };
    tracing::debug!("[{}] Pull {}", session_id, key);

    let cell = match services.registry.resolve(&session_id, &key) {
        Ok(cell) => cell,
        Err(e) => return error_response(&session_id, &key, &e),
    };

    let content = match services.config.pull_timeout {
        Some(limit) => match tokio::time::timeout(limit, cell.get()).await {
            Ok(content) => content,
            Err(_) => {
                tracing::warn!("[{}] Pull for {} timed out", session_id, key);
                return (StatusCode::GATEWAY_TIMEOUT, "timed out waiting for content")
                    .into_response();
            }
        },
        None => cell.get().await,
    };

    match content {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, media_type(&path))],
            body,
        )
            .into_response(),
        Err(e) => error_response(&session_id, &key, &e),
    }
}

fn error_response(session_id: &str, key: &ContentKey, err: &DocBridgeError) -> Response {
    let status = match err.root() {
        DocBridgeError::SessionNotFound { .. } | DocBridgeError::ContentNotFound { .. } => {
            StatusCode::NOT_FOUND
        }
        DocBridgeError::Cancelled => StatusCode::GONE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::info!("[{}] Pull for {} failed ({}): {}", session_id, key, status, err);
    (status, err.to_string()).into_response()
}

/// Content type the analysis tool uses to pick a media type for a module
fn media_type(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or_default();
    match ext {
        "ts" | "mts" | "cts" => "application/typescript; charset=utf-8",
        "tsx" => "text/tsx; charset=utf-8",
        "js" | "mjs" | "cjs" => "application/javascript; charset=utf-8",
        "jsx" => "text/jsx; charset=utf-8",
        "json" => "application/json; charset=utf-8",
        _ => "text/plain; charset=utf-8",
    }
}
