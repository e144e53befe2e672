//! # respd - A RESP Protocol Server Core
//!
//! respd speaks the REdis Serialization Protocol (RESP2) over TCP. It owns
//! the wire format and the connection lifecycle; what a command *does* is
//! left to a pluggable [`CommandHandler`].
//!
//! ## Features
//!
//! - **Streaming decoder**: values may arrive split across any number of reads
//! - **Bounded**: bulk length, array length, line length and nesting depth are capped
//! - **Binary safe**: bulk strings carry arbitrary bytes
//! - **Async I/O**: one Tokio task per connection
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                respd                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐                  │
//! │  │   Server    │───>│   Session   │───>│  Command    │                  │
//! │  │ (Listener)  │    │ (per conn)  │    │  Handler    │                  │
//! │  └─────────────┘    └──────┬──────┘    └─────────────┘                  │
//! │                            │                                            │
//! │              ┌─────────────┴─────────────┐                              │
//! │              ▼                           ▼                              │
//! │  ┌──────────────────────┐    ┌──────────────────────┐                   │
//! │  │     RespDecoder      │    │       encode()       │                   │
//! │  │  (buffer + parser)   │    │   (pure, no I/O)     │                   │
//! │  └──────────────────────┘    └──────────────────────┘                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use respd::commands::BuiltinHandler;
//! use respd::config::ServerConfig;
//! use respd::server::Server;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let server = Server::bind(ServerConfig::default(), Arc::new(BuiltinHandler::new())).await?;
//!     server.run().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: RESP values, parser, streaming decoder and encoder
//! - [`commands`]: Request extraction, dispatch policy and the built-in handler
//! - [`connection`]: The per-connection session loop
//! - [`server`]: TCP listener
//! - [`config`]: Server configuration and command-line arguments
//!
//! ## Design Highlights
//!
//! ### Incomplete Input Is Not an Error
//!
//! The parser reports "need more bytes" separately from malformed input, so
//! the decoder simply reads again. A stream split at any byte boundary decodes
//! to the same values as the unsplit stream.
//!
//! ### Bounded Before Allocated
//!
//! Declared bulk lengths and array counts are checked the moment their header
//! line is complete, so an oversized request is rejected before its payload is
//! awaited or any memory is reserved for it.

pub mod commands;
pub mod config;
pub mod connection;
pub mod protocol;
pub mod server;

// Re-export commonly used types for convenience
pub use commands::{BuiltinHandler, CommandError, CommandHandler, Request};
pub use config::ServerConfig;
pub use connection::{handle_connection, ConnectionStats, Session, SessionError};
pub use protocol::{DecodeError, DecodeLimits, ProtocolError, RespDecoder, RespParser, RespValue};
pub use server::Server;

/// The default port respd listens on (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default host respd binds to
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Version of respd
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
