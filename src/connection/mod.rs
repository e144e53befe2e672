//! Connection Handling
//!
//! One [`Session`] per accepted client, each on its own tokio task. A session
//! exclusively owns its stream; the only things shared between sessions are
//! the command handler and the [`ConnectionStats`] counters.
//!
//! ```text
//!   Server::run ── accept() ──> tokio::spawn(handle_connection)
//!                                        │
//!                                        ▼
//!            ┌───────────────────── Session::run ─────────────────────┐
//!            │                                                        │
//!            │   RespDecoder ──> dispatch(handler) ──> write + flush  │
//!            │        ▲                                      │        │
//!            │        └──────────── next request ────────────┘        │
//!            └────────────────────────────────────────────────────────┘
//! ```
//!
//! Sessions work over any `AsyncRead + AsyncWrite` stream, so the same loop
//! runs against a `TcpStream` in production and an in-memory pipe in tests:
//!
//! ```
//! # tokio_test::block_on(async {
//! use respd::commands::BuiltinHandler;
//! use respd::config::ServerConfig;
//! use respd::connection::{ConnectionStats, Session};
//! use std::sync::Arc;
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! let (mut client, server) = tokio::io::duplex(64);
//! let stats = Arc::new(ConnectionStats::new());
//! let mut session = Session::new(server, &ServerConfig::default(), Arc::new(BuiltinHandler), stats);
//!
//! client.write_all(b"*1\r\n$4\r\nPING\r\n").await.unwrap();
//! client.shutdown().await.unwrap();
//! session.run().await.unwrap();
//!
//! let mut reply = Vec::new();
//! client.read_to_end(&mut reply).await.unwrap();
//! assert_eq!(reply, b"+PONG\r\n");
//! # });
//! ```

pub mod session;

pub use session::{
    handle_connection, CloseKind, ConnectionStats, Session, SessionError, SessionState,
};
