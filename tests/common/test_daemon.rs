//! In-process daemon on ephemeral ports

use std::sync::Arc;
use std::time::Duration;

use docbridge::socket_server::{handle_connection, pull};
use docbridge::{AnalysisTool, DaemonConfig, Services};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub struct TestDaemon {
    pub services: Arc<Services>,
    /// `ws://` address of the session listener
    pub ws_url: String,
    /// `http://` address of the pull boundary
    pub pull_url: String,
    dist: TempDir,
    tasks: Vec<JoinHandle<()>>,
}

impl TestDaemon {
    pub async fn start(tool: Arc<dyn AnalysisTool>) -> Self {
        Self::start_with(tool, |_| {}).await
    }

    /// Start with `configure` applied on top of the test defaults
    pub async fn start_with(
        tool: Arc<dyn AnalysisTool>,
        configure: impl FnOnce(&mut DaemonConfig),
    ) -> Self {
        let dist = TempDir::new().expect("Failed to create dist dir");
        let pull_listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind pull listener");
        let ws_listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind session listener");
        let pull_addr = pull_listener.local_addr().unwrap();
        let ws_addr = ws_listener.local_addr().unwrap();
        let pull_url = format!("http://{}", pull_addr);

        let mut config = DaemonConfig {
            host: "127.0.0.1".to_string(),
            port: ws_addr.port(),
            pull_port: pull_addr.port(),
            public_url: Some(pull_url.clone()),
            dist_dir: dist.path().join("dist"),
            drain_timeout: Duration::from_secs(5),
            ..DaemonConfig::default()
        };
        configure(&mut config);
        let services = Arc::new(Services::with_tool(config, tool));

        let pull_services = Arc::clone(&services);
        let pull_task = tokio::spawn(async move {
            let _ = pull::serve(pull_listener, pull_services).await;
        });

        let ws_services = Arc::clone(&services);
        let ws_task = tokio::spawn(async move {
            while let Ok((stream, _)) = ws_listener.accept().await {
                tokio::spawn(handle_connection(stream, Arc::clone(&ws_services)));
            }
        });

        Self {
            services,
            ws_url: format!("ws://{}", ws_addr),
            pull_url,
            dist,
            tasks: vec![pull_task, ws_task],
        }
    }

    /// Id of the only live session
    pub fn single_session(&self) -> String {
        let sessions = self.services.registry.active_sessions();
        assert_eq!(sessions.len(), 1, "expected exactly one session");
        sessions.into_iter().next().unwrap()
    }
}

impl Drop for TestDaemon {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
