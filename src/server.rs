//! TCP listener.
//!
//! Accepts connections and spawns one task per connection. Ownership of each
//! accepted stream moves into its task; the accept loop keeps nothing but the
//! shared handler, configuration and statistics.

use crate::commands::CommandHandler;
use crate::config::ServerConfig;
use crate::connection::{handle_connection, ConnectionStats};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// A bound listener, ready to accept clients.
pub struct Server {
    listener: TcpListener,
    config: Arc<ServerConfig>,
    handler: Arc<dyn CommandHandler>,
    stats: Arc<ConnectionStats>,
}

impl Server {
    /// Binds the listener to `config.bind_address()`.
    pub async fn bind(config: ServerConfig, handler: Arc<dyn CommandHandler>) -> io::Result<Self> {
        let listener = TcpListener::bind(config.bind_address()).await?;

        Ok(Self {
            listener,
            config: Arc::new(config),
            handler,
            stats: Arc::new(ConnectionStats::new()),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(&self.stats)
    }

    /// Accepts connections forever.
    pub async fn run(self) {
        if let Ok(addr) = self.local_addr() {
            info!("Listening on {}", addr);
        }

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    tokio::spawn(handle_connection(
                        stream,
                        addr,
                        Arc::clone(&self.config),
                        Arc::clone(&self.handler),
                        Arc::clone(&self.stats),
                    ));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Accepts connections until `shutdown` completes.
    ///
    /// Sessions already running are not interrupted; they end when their
    /// clients disconnect or the runtime shuts down.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let stats = self.stats();

        tokio::select! {
            _ = self.run() => {}
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }

        info!(
            connections = stats.connections_accepted.load(Ordering::Relaxed),
            active = stats.active_connections.load(Ordering::Relaxed),
            commands = stats.commands_processed.load(Ordering::Relaxed),
            protocol_errors = stats.protocol_errors.load(Ordering::Relaxed),
            "Server stopped"
        );
    }
}
