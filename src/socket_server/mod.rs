//! Docbridge Socket Server
//!
//! A daemon that documents editor buffers with an external, path-based
//! analysis tool. Unsaved content is served back to the tool over HTTP and,
//! when the tool asks for something the client has not sent yet, the client
//! is challenged for it over its session.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DOCBRIDGE (docbridge daemon)                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  WebSocket Server ──► Session per client                                │
//! │    - handshake, import map materialization                              │
//! │    - one task per request ──► ResultCache ──► AnalysisInvoker ──► tool  │
//! │    - single send loop (results + challenges)                            │
//! │                                                              │          │
//! │  ┌───────────────────────────────────────────┐               │ GET      │
//! │  │        SessionRegistry (RwLock)           │ ◄──── Pull boundary      │
//! │  │                                           │       /{session}/{path}  │
//! │  │  session_1 ──► ContentStore {             │                          │
//! │  │                  path:a.ts  ──► cell      │                          │
//! │  │                  fingerprint:… ──► cell   │                          │
//! │  │                }                          │                          │
//! │  └───────────────────────────────────────────┘                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol
//!
//! All session frames are zstd-compressed JSON in binary WebSocket messages:
//!
//! ```json
//! // Client -> Server (first frame)
//! {"config": "{\"imports\":{}}", "workingDir": "/proj"}
//! // Client -> Server (requests)
//! {"path": "/proj/a.ts", "content": "export const x = 1"}
//! {"path": "https://deno.land/std/path/mod.ts"}
//!
//! // Server -> Client
//! {"path": "/proj/b.ts", "isChallenge": true}
//! {"path": "/proj/a.ts", "documentation": "[...]", "isChallenge": false}
//! ```

pub mod codec;
pub mod connection;
pub mod protocol;
pub mod pull;
pub mod services;
pub mod session_registry;

pub use codec::FrameCodec;
pub use connection::{handle_connection, run_session, SessionState};
pub use protocol::{DocRequest, DocResponse, Handshake, RequestFrame};
pub use services::Services;
pub use session_registry::{new_session_id, RegistryStats, SessionId, SessionRegistry};
