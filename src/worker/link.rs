//! A single outbound connection.
//!
//! A [`Link`] only exists once the dial succeeded, so holding one is proof of
//! being connected: the worker can only write through `Option<Link>`, which
//! makes writing while disconnected unrepresentable.

use std::io;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Outbound failures. All of them are transient: the worker retries.
#[derive(Debug, Error)]
pub enum LinkError {
    #[error("dial {target} failed: {source}")]
    Dial {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("dial {target} timed out after {timeout:?}")]
    DialTimeout { target: String, timeout: Duration },

    #[error("write failed: {0}")]
    Write(#[source] io::Error),

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
}

/// An established connection to one target.
#[derive(Debug)]
pub struct Link {
    stream: TcpStream,
    target: usize,
    connected_at: Instant,
}

impl Link {
    /// Connects to `addr` within `connect_timeout`.
    ///
    /// `target` is the index of `addr` in the worker's target list.
    pub async fn dial(addr: &str, target: usize, connect_timeout: Duration) -> Result<Self, LinkError> {
        let stream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(LinkError::Dial {
                    target: addr.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(LinkError::DialTimeout {
                    target: addr.to_string(),
                    timeout: connect_timeout,
                })
            }
        };

        // Records are already batched per read window; don't wait on Nagle.
        if let Err(e) = stream.set_nodelay(true) {
            debug!(target = %addr, error = %e, "failed to set TCP_NODELAY");
        }

        Ok(Self {
            stream,
            target,
            connected_at: Instant::now(),
        })
    }

    /// Writes the whole buffer within `deadline`.
    pub async fn write_record(&mut self, bytes: &[u8], deadline: Duration) -> Result<(), LinkError> {
        let write = async {
            self.stream.write_all(bytes).await?;
            self.stream.flush().await
        };

        match timeout(deadline, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(LinkError::Write(e)),
            Err(_) => Err(LinkError::WriteTimeout(deadline)),
        }
    }

    /// Index of the connected target.
    pub fn target(&self) -> usize {
        self.target
    }

    /// Time since the connection was established.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Shuts the write side down cleanly before dropping the socket.
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}
