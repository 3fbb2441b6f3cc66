//! Worker Pool Coordinator
//!
//! Owns the listener and the worker set. Sizing, spawning, accepting, and the
//! shutdown sequence all live here.
//!
//! ## Shutdown Sequence
//!
//! ```text
//! cancel ──┬──> accept loop stops, listener dropped
//!          ├──> inbound connections flush their residual and close
//!          │          │
//!          │          ▼
//!          │    last RecordSender dropped (queue closes once empty)
//!          │
//!          └──> workers drain ──> Terminated
//!                                    │
//!                                    ▼
//!                            run() returns summary
//! ```

use crate::config::{ConfigError, ProxyConfig};
use crate::connection::handle_connection;
use crate::framing::WINDOW_SIZE;
use crate::pipeline::{BufferPool, RecordQueue};
use crate::proxy::diagnostics::Diagnostics;
use crate::stats::{ProxyStats, StatsSnapshot};
use crate::worker::{Worker, WorkerSummary};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Delay before accepting again after a failed accept (e.g. out of file descriptors).
const ACCEPT_ERROR_DELAY: Duration = Duration::from_millis(100);

/// Errors that stop the proxy from starting.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind diagnostics endpoint {addr}: {source}")]
    DiagnosticsBind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// What the proxy did over its lifetime.
#[derive(Debug, Clone)]
pub struct ProxySummary {
    pub workers: Vec<WorkerSummary>,
    pub stats: StatsSnapshot,
}

/// The proxy: one listener, a fixed pool of workers, and the state they share.
pub struct Proxy {
    config: ProxyConfig,
    targets: Arc<[String]>,
    pool: Arc<BufferPool>,
    stats: Arc<ProxyStats>,
}

impl Proxy {
    /// Validates `config` and prepares the shared state.
    pub fn new(config: ProxyConfig) -> Result<Self, ProxyError> {
        config.validate()?;
        let targets: Arc<[String]> = config.targets().into();

        Ok(Self {
            config,
            targets,
            pool: Arc::new(BufferPool::new()),
            stats: Arc::new(ProxyStats::new()),
        })
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    pub fn stats(&self) -> Arc<ProxyStats> {
        Arc::clone(&self.stats)
    }

    pub fn pool(&self) -> Arc<BufferPool> {
        Arc::clone(&self.pool)
    }

    /// Binds the configured listen address. Failure here is fatal.
    pub async fn bind(&self) -> Result<TcpListener, ProxyError> {
        let addr = self.config.bind_address();
        TcpListener::bind(&addr)
            .await
            .map_err(|source| ProxyError::Bind { addr, source })
    }

    /// Spawns the workers, accepts inbound connections until `cancel` fires,
    /// then waits for every worker to terminate.
    pub async fn run(&self, listener: TcpListener, cancel: CancellationToken) -> ProxySummary {
        let (queue_tx, queue_rx) = RecordQueue::bounded(self.config.queue_capacity());

        let mut workers = JoinSet::new();
        let mut worker_states = Vec::with_capacity(self.config.pool_size());
        for i in 0..self.config.pool_size() {
            let worker = Worker::new(
                i + 1,
                Arc::clone(&self.targets),
                i % self.targets.len(),
                self.config.worker.clone(),
                queue_rx.clone(),
                Arc::clone(&self.pool),
                Arc::clone(&self.stats),
            );
            debug!(
                worker = worker.id(),
                primary = %self.targets[worker.primary()],
                "Starting worker"
            );
            worker_states.push(worker.subscribe());
            workers.spawn(worker.run(cancel.clone()));
        }
        // Only workers hold the consumer side from here on
        drop(queue_rx);

        info!(
            workers = self.config.pool_size(),
            queue_capacity = queue_tx.capacity(),
            "Worker pool started"
        );

        if self.config.debug {
            let diagnostics = Diagnostics::new(
                Arc::clone(&self.targets),
                Arc::clone(&self.stats),
                Arc::clone(&self.pool),
                queue_tx.gauge(),
                worker_states,
            );
            match diagnostics.bind(&self.config.diagnostics_addr).await {
                Ok(diag_listener) => {
                    tokio::spawn(diagnostics.serve(diag_listener, cancel.clone()));
                }
                Err(e) => warn!(error = %e, "Diagnostics endpoint disabled"),
            }
        }

        let connections = TaskTracker::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        connections.spawn(handle_connection(
                            stream,
                            peer,
                            Arc::clone(&self.pool),
                            queue_tx.clone(),
                            Arc::clone(&self.stats),
                            cancel.clone(),
                        ));
                    }
                    Err(e) => {
                        if cancel.is_cancelled() {
                            break;
                        }
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_ERROR_DELAY).await;
                    }
                },
            }
        }

        drop(listener);
        info!(open = connections.len(), "Stopped accepting connections");

        connections.close();
        drop(queue_tx);
        connections.wait().await;
        debug!("All inbound connections closed");

        let mut summaries = Vec::with_capacity(self.config.pool_size());
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(summary) => summaries.push(summary),
                Err(e) => error!(error = %e, "Worker task failed"),
            }
        }
        summaries.sort_by_key(|s| s.id);

        let stats = self.stats.snapshot();
        info!(
            records_framed = stats.records_framed,
            records_delivered = stats.records_delivered,
            bytes_written = stats.bytes_written,
            "All workers done"
        );

        ProxySummary {
            workers: summaries,
            stats,
        }
    }
}

/// Binds the configured address and proxies until `cancel` fires.
///
/// The only error is a configuration or bind failure at startup.
pub async fn listen_and_proxy(
    config: ProxyConfig,
    cancel: CancellationToken,
) -> Result<ProxySummary, ProxyError> {
    let proxy = Proxy::new(config)?;
    let listener = proxy.bind().await?;

    let config = proxy.config();
    info!("Listening on {}", config.bind_address());
    info!(
        "Making {} connections to {}",
        config.connections,
        proxy.targets.join(",")
    );
    info!("Buffer size {}KiB", WINDOW_SIZE / 1024);

    Ok(proxy.run(listener, cancel).await)
}
