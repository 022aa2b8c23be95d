//! Common test utilities for docbridge integration tests
//!
//! This module provides:
//! - `TestDaemon`, a full daemon (sessions + pull boundary) on ephemeral ports
//! - `TestClient`, a WebSocket client speaking the compressed frame protocol
//! - `PullingTool`, an analysis tool that fetches its target and relative
//!   imports over HTTP the way `deno doc` does

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod pulling_tool;
pub mod test_client;
pub mod test_daemon;

use std::time::Duration;

pub use pulling_tool::PullingTool;
pub use test_client::TestClient;
pub use test_daemon::TestDaemon;

/// Upper bound for anything a test waits on
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll `condition` until it holds, panicking after `TEST_TIMEOUT`
pub async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + TEST_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {}",
            what
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
