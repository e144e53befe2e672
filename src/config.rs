//! Server configuration.
//!
//! Everything is set from the command line, and every flag can also come from
//! a `RESPD_*` environment variable. Command line wins over environment.

use crate::protocol::parser::{MAX_ARRAY_LEN, MAX_BULK_SIZE, MAX_LINE_LEN, MAX_NESTING_DEPTH};
use crate::protocol::DecodeLimits;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use std::time::Duration;

/// Runtime configuration for the listener and every session it spawns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Decoder limits applied to every connection
    pub limits: DecodeLimits,
    /// Close a connection that sends nothing for this long
    pub read_timeout: Option<Duration>,
    /// Close a connection whose reply cannot be written within this long
    pub write_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            limits: DecodeLimits::default(),
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "respd")]
#[command(version)]
#[command(about = "A RESP protocol server", long_about = None)]
pub struct CliArgs {
    /// Host to bind to
    #[arg(short = 'H', long, env = "RESPD_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "RESPD_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Largest accepted bulk string, in bytes
    #[arg(long, env = "RESPD_MAX_BULK_LEN", default_value_t = MAX_BULK_SIZE, value_parser = positive)]
    pub max_bulk_len: usize,

    /// Largest accepted array element count
    #[arg(long, env = "RESPD_MAX_ARRAY_LEN", default_value_t = MAX_ARRAY_LEN, value_parser = positive)]
    pub max_array_len: usize,

    /// Deepest accepted array nesting
    #[arg(long, env = "RESPD_MAX_NESTING_DEPTH", default_value_t = MAX_NESTING_DEPTH, value_parser = positive)]
    pub max_nesting_depth: usize,

    /// Longest accepted CRLF-terminated line, in bytes
    #[arg(long, env = "RESPD_MAX_LINE_LEN", default_value_t = MAX_LINE_LEN, value_parser = positive)]
    pub max_line_len: usize,

    /// Idle timeout in seconds (0 = disabled)
    #[arg(long, env = "RESPD_READ_TIMEOUT_SECS", default_value_t = 0)]
    pub read_timeout_secs: u64,

    /// Reply write timeout in seconds (0 = disabled)
    #[arg(long, env = "RESPD_WRITE_TIMEOUT_SECS", default_value_t = 0)]
    pub write_timeout_secs: u64,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "RESPD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl CliArgs {
    pub fn into_config(self) -> ServerConfig {
        ServerConfig {
            host: self.host,
            port: self.port,
            limits: DecodeLimits {
                max_bulk_len: self.max_bulk_len,
                max_array_len: self.max_array_len,
                max_nesting_depth: self.max_nesting_depth,
                max_line_len: self.max_line_len,
            },
            read_timeout: seconds(self.read_timeout_secs),
            write_timeout: seconds(self.write_timeout_secs),
        }
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

fn positive(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be greater than zero".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}
