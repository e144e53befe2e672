//! respd - A RESP Protocol Server
//!
//! This is the main entry point for the respd server.
//! It parses the command line, sets up logging and runs the listener until
//! Ctrl+C.

use clap::Parser;
use respd::commands::BuiltinHandler;
use respd::config::CliArgs;
use respd::server::Server;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_banner(address: &str) {
    println!(
        r#"
respd v{} - RESP Protocol Server
──────────────────────────────────────────────────────────────
Server started on {}
Ready to accept connections.

Use Ctrl+C to shutdown gracefully.
"#,
        respd::VERSION,
        address
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let args = CliArgs::parse();

    // Set up logging; RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = args.into_config();
    let address = config.bind_address();

    let server = Server::bind(config, Arc::new(BuiltinHandler::new())).await?;
    print_banner(&address);

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    server.run_until(shutdown).await;

    info!("Server shutdown complete");
    Ok(())
}
