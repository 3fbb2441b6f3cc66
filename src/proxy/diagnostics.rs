//! Diagnostics Endpoint
//!
//! Enabled with `--debug`. Every client that connects gets a plain-text
//! report and the connection is closed:
//!
//! ```text
//! $ nc 127.0.0.1 8080
//! # Server
//! linefan_version:0.1.0
//! uptime_in_seconds:42
//! ...
//! ```

use crate::pipeline::{BufferPool, QueueGauge};
use crate::proxy::coordinator::ProxyError;
use crate::stats::ProxyStats;
use crate::worker::WorkerState;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Everything the report is built from.
pub struct Diagnostics {
    started: Instant,
    targets: Arc<[String]>,
    stats: Arc<ProxyStats>,
    pool: Arc<BufferPool>,
    queue: QueueGauge,
    workers: Vec<watch::Receiver<WorkerState>>,
}

impl Diagnostics {
    pub fn new(
        targets: Arc<[String]>,
        stats: Arc<ProxyStats>,
        pool: Arc<BufferPool>,
        queue: QueueGauge,
        workers: Vec<watch::Receiver<WorkerState>>,
    ) -> Self {
        Self {
            started: Instant::now(),
            targets,
            stats,
            pool,
            queue,
            workers,
        }
    }

    /// Binds the endpoint. The caller treats failure as non-fatal.
    pub async fn bind(&self, addr: &str) -> Result<TcpListener, ProxyError> {
        TcpListener::bind(addr)
            .await
            .map_err(|source| ProxyError::DiagnosticsBind {
                addr: addr.to_string(),
                source,
            })
    }

    /// Builds the text report.
    pub fn report(&self) -> String {
        let stats = self.stats.snapshot();
        let pool = self.pool.snapshot();

        let mut states = [0usize; 5];
        for worker in &self.workers {
            let slot = match *worker.borrow() {
                WorkerState::Disconnected => 0,
                WorkerState::Connecting => 1,
                WorkerState::Connected => 2,
                WorkerState::Draining => 3,
                WorkerState::Terminated => 4,
            };
            states[slot] += 1;
        }

        format!(
            "# Server\n\
             linefan_version:{}\n\
             os:{}\n\
             uptime_in_seconds:{}\n\
             \n\
             # Inbound\n\
             connections_accepted:{}\n\
             active_connections:{}\n\
             bytes_read:{}\n\
             records_framed:{}\n\
             \n\
             # Outbound\n\
             targets:{}\n\
             workers:{}\n\
             workers_disconnected:{}\n\
             workers_connecting:{}\n\
             workers_connected:{}\n\
             workers_draining:{}\n\
             workers_terminated:{}\n\
             records_delivered:{}\n\
             bytes_written:{}\n\
             write_failures:{}\n\
             dial_failures:{}\n\
             connects:{}\n\
             \n\
             # Queue\n\
             queue_depth:{}\n\
             queue_capacity:{}\n\
             \n\
             # Buffers\n\
             pool_idle:{}\n\
             pool_max_buffer_bytes:{}\n\
             pool_hits:{}\n\
             pool_misses:{}\n\
             pool_returns:{}\n\
             pool_discards:{}\n",
            crate::VERSION,
            std::env::consts::OS,
            self.started.elapsed().as_secs(),
            stats.connections_accepted,
            stats.active_connections,
            stats.bytes_read,
            stats.records_framed,
            self.targets.join(","),
            self.workers.len(),
            states[0],
            states[1],
            states[2],
            states[3],
            states[4],
            stats.records_delivered,
            stats.bytes_written,
            stats.write_failures,
            stats.dial_failures,
            stats.connects,
            self.queue.len(),
            self.queue.capacity(),
            pool.idle,
            self.pool.max_pooled_capacity(),
            pool.hits,
            pool.misses,
            pool.returns,
            pool.discards,
        )
    }

    /// Answers report requests until `cancel` fires.
    pub async fn serve(self, listener: TcpListener, cancel: CancellationToken) {
        if let Ok(addr) = listener.local_addr() {
            info!(addr = %addr, "Diagnostics endpoint listening");
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => {
                    let Ok((mut stream, peer)) = accepted else {
                        continue;
                    };
                    let report = self.report();
                    if let Err(e) = stream.write_all(report.as_bytes()).await {
                        debug!(peer = %peer, error = %e, "Failed to send diagnostics report");
                    }
                    let _ = stream.shutdown().await;
                }
            }
        }

        debug!("Diagnostics endpoint stopped");
    }
}
