//! Command-line and environment configuration.
//!
//! ```text
//! linefan --addr 0.0.0.0 --port 9000 \
//!         --target logs-a:5140,logs-b:5140 \
//!         --connections 4
//! ```
//!
//! Every flag can also be set through a `LINEFAN_*` environment variable.

use crate::worker::WorkerConfig;
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use clap::Parser;
use thiserror::Error;

/// Default target list.
pub const DEFAULT_TARGET: &str = "127.0.0.1:9999";

/// Default bind address for the diagnostics endpoint.
pub const DEFAULT_DIAGNOSTICS_ADDR: &str = "127.0.0.1:8080";

/// Configuration problems caught before anything is bound.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no targets configured")]
    NoTargets,

    #[error("connections per target must be at least 1")]
    NoConnections,
}

/// Line-oriented TCP load-balancing proxy.
#[derive(Parser, Debug, Clone)]
#[command(name = "linefan", version, about, long_about = None)]
pub struct ProxyConfig {
    /// Address to listen on
    #[arg(long, env = "LINEFAN_ADDR", default_value = DEFAULT_HOST)]
    pub addr: String,

    /// Port to listen on
    #[arg(short, long, env = "LINEFAN_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to proxy to; separate multiple with commas
    #[arg(short, long, env = "LINEFAN_TARGET", default_value = DEFAULT_TARGET)]
    pub target: String,

    /// Number of outbound connections to make to each target
    #[arg(short, long, env = "LINEFAN_CONNECTIONS", default_value_t = 4)]
    pub connections: usize,

    /// Enable debug logging and the diagnostics endpoint
    #[arg(short, long, env = "LINEFAN_DEBUG")]
    pub debug: bool,

    /// Where the diagnostics endpoint listens when debug is enabled
    #[arg(long, env = "LINEFAN_DIAGNOSTICS_ADDR", default_value = DEFAULT_DIAGNOSTICS_ADDR)]
    pub diagnostics_addr: String,

    /// Worker timings (not exposed on the command line)
    #[arg(skip)]
    pub worker: WorkerConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            target: DEFAULT_TARGET.to_string(),
            connections: 4,
            debug: false,
            diagnostics_addr: DEFAULT_DIAGNOSTICS_ADDR.to_string(),
            worker: WorkerConfig::default(),
        }
    }
}

impl ProxyConfig {
    /// The comma-separated target list, trimmed, without empty entries.
    pub fn targets(&self) -> Vec<String> {
        self.target
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets().is_empty() {
            return Err(ConfigError::NoTargets);
        }
        if self.connections == 0 {
            return Err(ConfigError::NoConnections);
        }
        Ok(())
    }

    /// Returns the bind address as a string
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.addr, self.port)
    }

    /// Number of workers: connections per target times targets.
    pub fn pool_size(&self) -> usize {
        self.connections * self.targets().len()
    }

    /// Record queue capacity: twice the pool size.
    pub fn queue_capacity(&self) -> usize {
        self.pool_size() * 2
    }
}
