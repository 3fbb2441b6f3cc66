//! Newline Framer
//!
//! Turns one inbound byte stream into records. Each read fills a fixed 16 KiB
//! window; the *last* newline in the window ends the current record.
//!
//! ## Splitting Rule
//!
//! ```text
//! residual "x"   window "a\nb\nc"
//!                         ▲  ▲
//!                         │  └── last newline: record ends here
//!                         └───── earlier newline stays inside the record
//!
//! emitted record: "xa\nb\n"      new residual: "c"
//! ```
//!
//! A window with no newline is appended to the residual as-is, so a single
//! record may span any number of reads. When the peer closes (or the read
//! fails, or the proxy shuts down) the residual is flushed as a final record
//! even without a trailing newline. Empty records are never produced.

use crate::pipeline::{BufferPool, QueueClosed, Record, RecordSender};
use crate::stats::ProxyStats;
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Size of the read window (16 KiB).
pub const WINDOW_SIZE: usize = 16 * 1024;

/// Why the read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The peer closed its side
    Eof,
    /// A read returned an error
    ReadError,
    /// The proxy is shutting down
    Cancelled,
}

/// What a finished framer did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramerSummary {
    pub records: u64,
    pub bytes: u64,
    pub stop: StopReason,
}

/// Splits a byte stream into newline-bounded records.
#[derive(Debug)]
pub struct LineFramer {
    pool: Arc<BufferPool>,
    pending: BytesMut,
}

impl LineFramer {
    /// Creates a framer drawing its accumulation buffers from `pool`.
    pub fn new(pool: Arc<BufferPool>) -> Self {
        let pending = pool.acquire();
        Self { pool, pending }
    }

    /// Feeds one read window.
    ///
    /// Returns a completed record if the window contains a newline; the bytes
    /// after the last newline become the new residual.
    pub fn push(&mut self, window: &[u8]) -> Option<Record> {
        match window.iter().rposition(|&b| b == b'\n') {
            Some(last_newline) => {
                let (head, tail) = window.split_at(last_newline + 1);
                self.pending.extend_from_slice(head);

                let done = std::mem::replace(&mut self.pending, self.pool.acquire());
                self.pending.extend_from_slice(tail);
                Record::new(done)
            }
            None => {
                self.pending.extend_from_slice(window);
                None
            }
        }
    }

    /// Bytes waiting for a newline.
    pub fn residual(&self) -> &[u8] {
        &self.pending
    }

    /// Ends the stream, returning the residual as a final record if non-empty.
    pub fn finish(self) -> Option<Record> {
        if self.pending.is_empty() {
            self.pool.release(self.pending);
            None
        } else {
            Record::new(self.pending)
        }
    }

    /// Reads `reader` until EOF, error, or cancellation, enqueueing every
    /// record, then flushes the residual.
    ///
    /// Only fails if the queue has no consumers left; the rejected record is
    /// returned inside the error.
    pub async fn run<R>(
        mut self,
        reader: &mut R,
        queue: &RecordSender,
        cancel: &CancellationToken,
        stats: &ProxyStats,
    ) -> Result<FramerSummary, QueueClosed>
    where
        R: AsyncRead + Unpin,
    {
        let mut window = vec![0u8; WINDOW_SIZE];
        let mut records = 0u64;
        let mut bytes = 0u64;

        let stop = loop {
            let n = tokio::select! {
                _ = cancel.cancelled() => break StopReason::Cancelled,
                read = reader.read(&mut window) => match read {
                    Ok(0) => break StopReason::Eof,
                    Ok(n) => n,
                    Err(e) => {
                        debug!(error = %e, "inbound read failed");
                        break StopReason::ReadError;
                    }
                },
            };

            stats.bytes_read(n);
            bytes += n as u64;

            if let Some(record) = self.push(&window[..n]) {
                trace!(len = record.len(), residual = self.pending.len(), "framed record");
                queue.enqueue(record).await?;
                stats.record_framed();
                records += 1;
            }
        };

        if let Some(record) = self.finish() {
            trace!(len = record.len(), "flushing residual record");
            queue.enqueue(record).await?;
            stats.record_framed();
            records += 1;
        }

        Ok(FramerSummary {
            records,
            bytes,
            stop,
        })
    }
}
