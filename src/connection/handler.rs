//! Inbound Connection Handler
//!
//! Each accepted client gets one [`InboundConnection`], run as its own task.
//! The connection owns its socket and its framer; nobody else touches either.
//!
//! ## Connection Lifecycle
//!
//! ```text
//! 1. Client connects (accepted by the proxy)
//!        │
//!        ▼
//! 2. InboundConnection spawned
//!        │
//!        ▼
//! 3. ┌──────────────────────────────┐
//!    │      Main Loop (framer)      │
//!    │                              │
//!    │  read window ──> split ──┐   │
//!    │       ▲                  │   │
//!    │       └── enqueue <──────┘   │
//!    └──────────────────────────────┘
//!        │
//!        │ EOF / read error / shutdown signal
//!        ▼
//! 4. Residual flushed as a final record
//!        │
//!        ▼
//! 5. Socket shut down and dropped by this task
//! ```
//!
//! Shutdown does not need a separate watcher task per socket: the framer's
//! read loop observes the cancellation token itself, and the socket is closed
//! here once the loop returns.

use crate::framing::{FramerSummary, LineFramer, StopReason};
use crate::pipeline::{BufferPool, QueueClosed, RecordSender};
use crate::stats::ProxyStats;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One inbound client, from accept to close.
pub struct InboundConnection {
    /// The TCP stream for this connection
    stream: TcpStream,

    /// Client's address (for logging)
    peer: SocketAddr,

    /// Splits the stream into records
    framer: LineFramer,

    /// Where finished records go
    queue: RecordSender,

    /// Proxy statistics (shared)
    stats: Arc<ProxyStats>,
}

impl InboundConnection {
    /// Wraps an accepted stream.
    ///
    /// # Arguments
    ///
    /// * `stream` - The accepted TCP stream
    /// * `peer` - The client's socket address
    /// * `pool` - Buffer pool the framer accumulates into
    /// * `queue` - Producer half of the record queue
    /// * `stats` - Shared proxy statistics
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        pool: Arc<BufferPool>,
        queue: RecordSender,
        stats: Arc<ProxyStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream,
            peer,
            framer: LineFramer::new(pool),
            queue,
            stats,
        }
    }

    /// Frames the stream until it ends or `cancel` fires, then closes the socket.
    pub async fn run(self, cancel: CancellationToken) -> Result<FramerSummary, QueueClosed> {
        let Self {
            mut stream,
            peer,
            framer,
            queue,
            stats,
        } = self;

        debug!(peer = %peer, "New inbound connection");

        let result = framer.run(&mut stream, &queue, &cancel, &stats).await;

        // Best effort; the peer may already be gone.
        let _ = stream.shutdown().await;
        drop(stream);
        stats.connection_closed();

        match &result {
            Ok(summary) => match summary.stop {
                StopReason::Eof => debug!(
                    peer = %peer,
                    records = summary.records,
                    bytes = summary.bytes,
                    "Closed inbound connection"
                ),
                StopReason::ReadError => debug!(
                    peer = %peer,
                    records = summary.records,
                    bytes = summary.bytes,
                    "Inbound connection ended on read error"
                ),
                StopReason::Cancelled => debug!(
                    peer = %peer,
                    records = summary.records,
                    "Closed inbound connection for shutdown"
                ),
            },
            Err(e) => warn!(peer = %peer, error = %e, "No workers left to accept records"),
        }

        result
    }
}

/// Runs an inbound connection to completion.
///
/// Convenience wrapper used by the accept loop; all outcomes are logged by
/// [`InboundConnection::run`].
pub async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    pool: Arc<BufferPool>,
    queue: RecordSender,
    stats: Arc<ProxyStats>,
    cancel: CancellationToken,
) {
    let connection = InboundConnection::new(stream, peer, pool, queue, stats);
    let _ = connection.run(cancel).await;
}
