//! Bounded Record Queue
//!
//! The queue is the only coupling between the inbound and outbound halves of
//! the proxy. Framers hold a [`RecordSender`], workers hold a
//! [`RecordReceiver`]; both are cheap to clone.
//!
//! ```text
//!  Framer ─┐                                ┌─> Worker 1
//!  Framer ─┼──> [ r r r r r r . . ] ────────┼─> Worker 2
//!  Framer ─┘     capacity = pool × 2        └─> Worker N
//! ```
//!
//! - `enqueue` waits while the queue is full (backpressure, never loss)
//! - `dequeue` waits while the queue is empty
//! - FIFO: records from one framer leave in the order they were enqueued
//!
//! Built on a tokio bounded `mpsc` channel. The receiving half is shared
//! between workers behind an async mutex; `recv` is cancel-safe, so a worker
//! that abandons a `dequeue` inside `select!` never loses a record.

use bytes::BytesMut;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// One unit of transmission: a byte sequence ending at a newline (or the
/// residual tail of a closed connection).
///
/// A record is immutable once built; the only way to get the bytes back for
/// mutation is [`Record::into_buffer`], which hands the allocation back for
/// pooling.
#[derive(Debug, PartialEq, Eq)]
pub struct Record(BytesMut);

impl Record {
    /// Wraps a filled buffer. Returns `None` for an empty buffer since empty
    /// records are never transmitted.
    pub fn new(buf: BytesMut) -> Option<Self> {
        if buf.is_empty() {
            None
        } else {
            Some(Self(buf))
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Gives the underlying buffer back (for returning to the pool).
    pub fn into_buffer(self) -> BytesMut {
        self.0
    }
}

impl AsRef<[u8]> for Record {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Returned by [`RecordSender::enqueue`] when every receiver is gone.
/// Carries the record back so the caller can account for it.
#[derive(Debug, Error)]
#[error("record queue closed ({} bytes not enqueued)", .0.len())]
pub struct QueueClosed(pub Record);

#[derive(Debug)]
struct Shared {
    depth: AtomicUsize,
    capacity: usize,
}

/// Constructor namespace for the queue halves.
pub struct RecordQueue;

impl RecordQueue {
    /// Creates a queue holding at most `capacity` records.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn bounded(capacity: usize) -> (RecordSender, RecordReceiver) {
        let (tx, rx) = mpsc::channel(capacity);
        let shared = Arc::new(Shared {
            depth: AtomicUsize::new(0),
            capacity,
        });

        (
            RecordSender {
                tx,
                shared: Arc::clone(&shared),
            },
            RecordReceiver {
                rx: Arc::new(Mutex::new(rx)),
                shared,
            },
        )
    }
}

/// Read-only view of the queue depth that keeps neither half alive.
#[derive(Debug, Clone)]
pub struct QueueGauge {
    shared: Arc<Shared>,
}

impl QueueGauge {
    pub fn len(&self) -> usize {
        self.shared.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}

/// Producer half, one clone per framer.
#[derive(Debug, Clone)]
pub struct RecordSender {
    tx: mpsc::Sender<Record>,
    shared: Arc<Shared>,
}

impl RecordSender {
    /// Hands a record to the workers, waiting while the queue is full.
    pub async fn enqueue(&self, record: Record) -> Result<(), QueueClosed> {
        // Waiting for a slot is cancel-safe; the depth only moves once the
        // slot is ours and always before a consumer can see the record.
        let Ok(permit) = self.tx.reserve().await else {
            return Err(QueueClosed(record));
        };
        self.shared.depth.fetch_add(1, Ordering::AcqRel);
        permit.send(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.shared.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    pub fn gauge(&self) -> QueueGauge {
        QueueGauge {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Consumer half, one clone per worker.
#[derive(Debug, Clone)]
pub struct RecordReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Record>>>,
    shared: Arc<Shared>,
}

impl RecordReceiver {
    /// Waits for the next record.
    ///
    /// Returns `None` once every sender is dropped and the queue is empty.
    /// Cancel-safe.
    pub async fn dequeue(&self) -> Option<Record> {
        let mut rx = self.rx.lock().await;
        let record = rx.recv().await;
        if record.is_some() {
            self.shared.depth.fetch_sub(1, Ordering::AcqRel);
        }
        record
    }

    /// Takes a record without waiting, if one is immediately available.
    pub fn try_dequeue(&self) -> Option<Record> {
        let mut rx = self.rx.try_lock().ok()?;
        let record = rx.try_recv().ok();
        if record.is_some() {
            self.shared.depth.fetch_sub(1, Ordering::AcqRel);
        }
        record
    }

    /// Number of records waiting to be taken.
    pub fn len(&self) -> usize {
        self.shared.depth.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }
}
