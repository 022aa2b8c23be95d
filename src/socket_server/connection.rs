//! WebSocket connection handler
//!
//! Drives one client session through `Handshaking -> Active -> Closing -> Closed`.
//! While active, three things run concurrently: the receive loop, one task per
//! request, and a single send loop that owns the write half of the socket.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_util::sync::CancellationToken;

use crate::content_store::ContentStore;
use crate::error::{DocBridgeError, Result};
use crate::socket_server::codec::FrameCodec;
use crate::socket_server::protocol::{DocRequest, DocResponse, Handshake, RequestFrame};
use crate::socket_server::services::Services;
use crate::socket_server::session_registry::{new_session_id, SessionId};

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    Active,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Handshaking => "handshaking",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Handle a single WebSocket connection
pub async fn handle_connection(stream: TcpStream, services: Arc<Services>) {
    let addr = stream.peer_addr().ok();
    tracing::info!("New connection from {:?}", addr);

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::error!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    if let Err(e) = run_session(ws_stream, services).await {
        tracing::warn!("Session from {:?} failed: {}", addr, e);
    }

    tracing::info!("Connection closed from {:?}", addr);
}

/// Run a session over an upgraded connection until it closes.
///
/// Returns an error only when the session never became active.
pub async fn run_session<S>(ws: S, services: Arc<Services>) -> Result<()>
where
    S: Stream<Item = std::result::Result<Message, WsError>>
        + Sink<Message, Error = WsError>
        + Unpin
        + Send
        + 'static,
{
    let (mut sink, mut stream) = ws.split();
    let mut session = Session::new(services);

    let handshake = match read_handshake(&mut stream, &session.services.codec).await {
        Ok(Some(handshake)) => handshake,
        Ok(None) => {
            session.transition(SessionState::Closed);
            return Ok(());
        }
        Err(e) => {
            session.transition(SessionState::Closed);
            let _ = sink.close().await;
            return Err(e);
        }
    };

    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let ctx = match session.open(&handshake, outbound_tx).await {
        Ok(ctx) => ctx,
        Err(e) => {
            session.transition(SessionState::Closed);
            let _ = sink.close().await;
            return Err(e);
        }
    };
    session.transition(SessionState::Active);

    let sender = tokio::spawn(send_loop(
        sink,
        outbound_rx,
        session.services.codec,
        session.abort.clone(),
        session.id.clone(),
    ));

    let mut tasks = session.receive_loop(&mut stream, &ctx).await;

    session.transition(SessionState::Closing);
    session.close(&mut tasks).await;
    if let Err(e) = sender.await {
        tracing::warn!("[{}] Send loop failed: {}", session.id, e);
    }
    session.transition(SessionState::Closed);
    Ok(())
}

/// Wait for the handshake frame. `None` means the peer went away first.
async fn read_handshake<St>(stream: &mut St, codec: &FrameCodec) -> Result<Option<Handshake>>
where
    St: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Binary(data))) => {
                let handshake: Handshake = codec.decode(&data)?;
                if handshake.working_dir.is_empty() {
                    return Err(DocBridgeError::protocol("handshake without workingDir"));
                }
                return Ok(Some(handshake));
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
            Some(Ok(Message::Close(_))) | None => return Ok(None),
            Some(Ok(_)) => {
                return Err(DocBridgeError::protocol("handshake must be a binary frame"));
            }
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// State for a single session
struct Session {
    services: Arc<Services>,
    id: SessionId,
    state: SessionState,
    abort: CancellationToken,
}

/// What every request task needs from its session
#[derive(Clone)]
struct RequestContext {
    services: Arc<Services>,
    store: Arc<ContentStore>,
    config_path: PathBuf,
    outbound: mpsc::UnboundedSender<DocResponse>,
    abort: CancellationToken,
}

impl Session {
    fn new(services: Arc<Services>) -> Self {
        Self {
            services,
            id: new_session_id(),
            state: SessionState::Handshaking,
            abort: CancellationToken::new(),
        }
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!("[{}] {} -> {}", self.id, self.state, next);
        self.state = next;
    }

    async fn open(
        &self,
        handshake: &Handshake,
        outbound: mpsc::UnboundedSender<DocResponse>,
    ) -> Result<RequestContext> {
        let entry = self
            .services
            .materializer
            .ensure(&handshake.config, &self.id)
            .await?;
        let store = self
            .services
            .registry
            .open(&self.id, &handshake.working_dir, outbound.clone())?;
        tracing::info!(
            "[{}] Session active in {} (import map {})",
            self.id,
            handshake.working_dir,
            entry.fingerprint
        );

        Ok(RequestContext {
            services: Arc::clone(&self.services),
            store,
            config_path: entry.localized_path,
            outbound,
            abort: self.abort.clone(),
        })
    }

    /// Dispatch requests until the peer leaves, the transport fails, or a
    /// frame does not decode.
    async fn receive_loop<St>(&self, stream: &mut St, ctx: &RequestContext) -> JoinSet<()>
    where
        St: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
    {
        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                _ = self.abort.cancelled() => {
                    tracing::debug!("[{}] Aborted by send loop", self.id);
                    break;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::warn!("[{}] Request task failed: {}", self.id, e);
                    }
                }
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => {
                            match self.services.codec.decode::<RequestFrame>(&data) {
                                Ok(frame) => {
                                    let request = DocRequest::from(frame);
                                    tasks.spawn(handle_request(ctx.clone(), request));
                                }
                                Err(e) => {
                                    tracing::warn!("[{}] {}", self.id, e);
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            tracing::info!("[{}] Client requested close", self.id);
                            break;
                        }
                        Some(Ok(Message::Text(_))) => {
                            tracing::warn!("[{}] Text frames are not supported", self.id);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::warn!("[{}] WebSocket error: {}", self.id, e);
                            break;
                        }
                    }
                }
            }
        }
        tasks
    }

    async fn close(&self, tasks: &mut JoinSet<()>) {
        self.abort.cancel();
        self.services.registry.close(&self.id);

        let in_flight = tasks.len();
        let drained = tokio::time::timeout(self.services.config.drain_timeout, async {
            while let Some(joined) = tasks.join_next().await {
                if let Err(e) = joined {
                    tracing::warn!("[{}] Request task failed: {}", self.id, e);
                }
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                "[{}] {} request(s) still running after {:?}, aborting",
                self.id,
                tasks.len(),
                self.services.config.drain_timeout
            );
            tasks.abort_all();
        } else if in_flight > 0 {
            tracing::debug!("[{}] Drained {} request(s)", self.id, in_flight);
        }
    }
}

async fn handle_request(ctx: RequestContext, request: DocRequest) {
    let session_id = ctx.store.session_id().to_string();
    let path = request.path().to_string();

    if let DocRequest::Buffer { content, .. } = &request {
        if let Err(e) = ctx.store.supply(&ctx.store.relative_path(&path), content) {
            tracing::warn!("[{}] Cannot record {}: {}", session_id, path, e);
        }
    }

    let key = request.cache_key().to_string();
    let invoker = Arc::clone(&ctx.services.invoker);
    let config_path = ctx.config_path.clone();
    let store = Arc::clone(&ctx.store);
    let result = ctx
        .services
        .results
        .compute(&key, move || async move {
            invoker.run_blocking(config_path, store, request).await
        })
        .await;

    match result {
        Ok(raw) => {
            if ctx.abort.is_cancelled() {
                tracing::debug!("[{}] Discarding result for {}", session_id, path);
                return;
            }
            let documentation = ctx.services.invoker.restore(&raw, &ctx.store, &path);
            let _ = ctx
                .outbound
                .send(DocResponse::documentation(path, documentation));
        }
        Err(e) if e.is_cancelled() => {
            tracing::debug!("[{}] Request for {} cancelled", session_id, path);
        }
        Err(e) => {
            tracing::warn!("[{}] Request for {} failed: {}", session_id, path, e);
        }
    }
}

/// Sole writer of the connection
async fn send_loop<Si>(
    mut sink: Si,
    mut outbound: mpsc::UnboundedReceiver<DocResponse>,
    codec: FrameCodec,
    abort: CancellationToken,
    session_id: SessionId,
) where
    Si: Sink<Message, Error = WsError> + Unpin,
{
    loop {
        let response = tokio::select! {
            biased;
            _ = abort.cancelled() => break,
            response = outbound.recv() => match response {
                Some(response) => response,
                None => break,
            },
        };

        let frame = match codec.encode(&response) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::error!("[{}] Cannot encode response: {}", session_id, e);
                abort.cancel();
                break;
            }
        };

        if response.is_challenge {
            tracing::info!("[{}] Challenge for {}", session_id, response.path);
        }
        if let Err(e) = sink.send(Message::Binary(frame)).await {
            tracing::warn!("[{}] Write failed: {}", session_id, e);
            abort.cancel();
            break;
        }
    }
    let _ = sink.close().await;
}
