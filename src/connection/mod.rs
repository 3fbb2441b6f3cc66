//! Inbound Connection Module
//!
//! This module manages client connections accepted by the proxy. Each client
//! connection is handled by its own async task, so a slow or stalled client
//! never holds up any other client or any worker.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TCP Listener                            │
//! │                    (proxy module)                           │
//! └──────────────────────┬──────────────────────────────────────┘
//!                        │
//!                        │ accept()
//!                        ▼
//!           ┌────────────────────────┐
//!           │   For each client...   │
//!           └────────────┬───────────┘
//!                        │
//!                        │ spawn task
//!                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 InboundConnection                           │
//! │                                                             │
//! │  ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │  │ Read window │───>│ Split lines │───>│  Enqueue    │     │
//! │  └─────────────┘    └─────────────┘    └─────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use linefan::connection::handle_connection;
//!
//! let (stream, peer) = listener.accept().await?;
//! tokio::spawn(handle_connection(stream, peer, pool, queue, stats, cancel));
//! ```

pub mod handler;

// Re-export commonly used types
pub use handler::{handle_connection, InboundConnection};
