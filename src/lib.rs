//! # linefan - A Line-Oriented TCP Load-Balancing Proxy
//!
//! linefan accepts TCP connections carrying newline-delimited records (log
//! lines, metrics, events) and fans them out across a fixed pool of
//! persistent backend connections. A record is never split between two
//! backend connections, and a record that has been accepted is delivered
//! eventually, no matter how long the backends stay down.
//!
//! ## Features
//!
//! - **Record Integrity**: Inbound bytes are cut at the last newline of each
//!   read, so backends only ever see whole lines
//! - **Failover and Failback**: Workers hop to a random target when their own
//!   is down and return to it on a periodic reconnect
//! - **Backpressure**: A bounded queue stops inbound reads when every worker
//!   is busy
//! - **Graceful Shutdown**: SIGINT/SIGTERM flush partial records and drain the
//!   queue before exiting
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              linefan                                    │
//! │                                                                         │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────────────────┐     │
//! │  │ TCP Server  │───>│  Inbound    │───>│   Bounded RecordQueue    │     │
//! │  │ (Listener)  │    │ Connection  │    │  (capacity = 2 x pool)   │     │
//! │  └─────────────┘    │ LineFramer  │    └────────────┬─────────────┘     │
//! │                     └─────────────┘                 │                   │
//! │                                     ┌───────────────┼───────────────┐   │
//! │                                     ▼               ▼               ▼   │
//! │                               ┌──────────┐    ┌──────────┐    ┌────────┐│
//! │  ┌─────────────┐              │ Worker 1 │    │ Worker 2 │    │  ...N  ││
//! │  │ BufferPool  │<─ released ──│  Link    │    │  Link    │    │        ││
//! │  └─────────────┘              └────┬─────┘    └────┬─────┘    └───┬────┘│
//! └────────────────────────────────────┼───────────────┼──────────────┼─────┘
//!                                      ▼               ▼              ▼
//!                                  target A         target B       target ..
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use linefan::config::ProxyConfig;
//! use linefan::proxy::listen_and_proxy;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ProxyConfig {
//!         target: "logs-a:5140,logs-b:5140".to_string(),
//!         ..ProxyConfig::default()
//!     };
//!
//!     let cancel = CancellationToken::new();
//!     let shutdown = cancel.clone();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.cancel();
//!     });
//!
//!     let summary = listen_and_proxy(config, cancel).await?;
//!     println!("{} records delivered", summary.stats.records_delivered);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: Command-line/environment configuration and validation
//! - [`pipeline`]: Buffer pool and the bounded record queue
//! - [`framing`]: Cuts inbound byte streams into whole-line records
//! - [`connection`]: One task per inbound client
//! - [`worker`]: Outbound connections with failover, retry, and drain
//! - [`proxy`]: Pool sizing, the accept loop, shutdown, and diagnostics
//! - [`stats`]: Process-wide counters
//!
//! ## Design Highlights
//!
//! ### Backpressure Instead of Loss
//!
//! Framers block on a full queue rather than dropping records. A slow or dead
//! backend therefore slows inbound clients down through TCP flow control.
//!
//! ### Buffer Reuse
//!
//! Record buffers go back to a shared pool after delivery. Oversized buffers
//! are discarded so one huge record does not pin memory forever.

pub mod config;
pub mod connection;
pub mod framing;
pub mod pipeline;
pub mod proxy;
pub mod stats;
pub mod worker;

// Re-export commonly used types for convenience
pub use config::{ConfigError, ProxyConfig};
pub use connection::{handle_connection, InboundConnection};
pub use framing::{LineFramer, WINDOW_SIZE};
pub use pipeline::{BufferPool, Record, RecordQueue};
pub use proxy::{listen_and_proxy, Proxy, ProxyError, ProxySummary};
pub use stats::{ProxyStats, StatsSnapshot};
pub use worker::{Worker, WorkerConfig, WorkerState};

/// The default port linefan listens on
pub const DEFAULT_PORT: u16 = 9000;

/// The default host linefan binds to
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Version of linefan
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
