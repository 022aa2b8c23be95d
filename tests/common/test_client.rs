//! WebSocket client speaking the session protocol

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use docbridge::socket_server::{DocResponse, FrameCodec, Handshake, RequestFrame};

use super::TEST_TIMEOUT;

pub struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    codec: FrameCodec,
}

impl TestClient {
    pub async fn connect(url: &str) -> Self {
        let (ws, _) = connect_async(url).await.expect("Failed to connect");
        Self {
            ws,
            codec: FrameCodec::default(),
        }
    }

    /// Connect and open a session
    pub async fn open(url: &str, config: &str, working_dir: &str) -> Self {
        let mut client = Self::connect(url).await;
        client
            .send(&Handshake {
                config: config.to_string(),
                working_dir: working_dir.to_string(),
            })
            .await;
        client
    }

    pub async fn send<T: serde::Serialize>(&mut self, msg: &T) {
        let frame = self.codec.encode(msg).expect("Failed to encode frame");
        self.ws
            .send(Message::Binary(frame))
            .await
            .expect("Failed to send frame");
    }

    pub async fn send_raw(&mut self, msg: Message) {
        self.ws.send(msg).await.expect("Failed to send frame");
    }

    /// Request documentation for a path the tool resolves itself
    pub async fn request_path(&mut self, path: &str) {
        self.send(&RequestFrame {
            path: path.to_string(),
            content: None,
            fingerprint: None,
        })
        .await;
    }

    /// Request documentation for an editor buffer
    pub async fn request_buffer(&mut self, path: &str, content: &str) {
        self.send(&RequestFrame {
            path: path.to_string(),
            content: Some(content.to_string()),
            fingerprint: None,
        })
        .await;
    }

    /// Next response frame, or `None` once the server closed the session
    pub async fn next_response(&mut self) -> Option<DocResponse> {
        loop {
            let msg = tokio::time::timeout(TEST_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for a frame");
            match msg {
                Some(Ok(Message::Binary(data))) => {
                    return Some(self.codec.decode(&data).expect("Failed to decode frame"));
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return None,
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Read frames until the documentation for `path` arrives, answering
    /// nothing. Returns the frames seen before it.
    pub async fn documentation_for(&mut self, path: &str) -> (DocResponse, Vec<DocResponse>) {
        let mut before = Vec::new();
        loop {
            let response = self
                .next_response()
                .await
                .unwrap_or_else(|| panic!("session closed before documentation for {}", path));
            if !response.is_challenge && response.path == path {
                return (response, before);
            }
            before.push(response);
        }
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
