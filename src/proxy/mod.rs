//! Proxy Module
//!
//! Ties the pieces together: binds the listener, sizes and starts the worker
//! pool, spawns one inbound connection task per client, and runs the
//! shutdown sequence.
//!
//! ## Example
//!
//! ```ignore
//! use linefan::config::ProxyConfig;
//! use linefan::proxy::listen_and_proxy;
//! use tokio_util::sync::CancellationToken;
//!
//! let cancel = CancellationToken::new();
//! let summary = listen_and_proxy(ProxyConfig::default(), cancel).await?;
//! println!("delivered {} records", summary.stats.records_delivered);
//! ```

pub mod coordinator;
pub mod diagnostics;

// Re-export commonly used types
pub use coordinator::{listen_and_proxy, Proxy, ProxyError, ProxySummary};
pub use diagnostics::Diagnostics;
