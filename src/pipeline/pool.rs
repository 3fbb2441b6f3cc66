//! Reusable Accumulation Buffers
//!
//! Every inbound connection accumulates bytes into a `BytesMut` until it sees a
//! newline. Allocating a fresh buffer for every record would churn the
//! allocator at high line rates, so finished buffers come back here after the
//! worker has written them out.
//!
//! ## Lifecycle
//!
//! ```text
//!   acquire()                enqueue                 write ok
//! ┌──────────┐  append   ┌──────────────┐  dequeue ┌──────────┐  release()
//! │  Framer  │──────────>│ RecordQueue  │─────────>│  Worker  │──────────┐
//! └──────────┘           └──────────────┘          └──────────┘          │
//!      ▲                                                                 │
//!      │                    ┌──────────────┐    capacity <= threshold    │
//!      └────────────────────│  BufferPool  │<────────────────────────────┘
//!                           └──────────────┘
//! ```
//!
//! Buffers that grew past the pooling threshold (one abnormally long record)
//! are dropped instead of pooled, so a single burst cannot pin memory forever.

use bytes::BytesMut;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Default capacity for a freshly allocated buffer (two framing windows).
pub const DEFAULT_INITIAL_CAPACITY: usize = 32 * 1024;

/// Buffers with a larger capacity than this are discarded on release (1 MiB).
pub const DEFAULT_MAX_POOLED_CAPACITY: usize = 1024 * 1024;

/// Maximum number of idle buffers kept around.
pub const DEFAULT_MAX_IDLE: usize = 256;

/// Counters describing how well the pool is doing.
#[derive(Debug, Default)]
struct BufferPoolMetrics {
    /// Acquires served from the idle list
    hits: AtomicU64,
    /// Acquires that had to allocate
    misses: AtomicU64,
    /// Buffers put back on the idle list
    returns: AtomicU64,
    /// Buffers dropped because they were oversized or the idle list was full
    discards: AtomicU64,
}

/// Point-in-time copy of the pool counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub returns: u64,
    pub discards: u64,
    pub idle: usize,
}

/// A synchronized pool of reusable `BytesMut` buffers.
///
/// The pool is shared by reference (`Arc<BufferPool>`) between every framer
/// and every worker; there is no global instance.
///
/// # Example
///
/// ```
/// use linefan::pipeline::BufferPool;
///
/// let pool = BufferPool::new();
/// let mut buf = pool.acquire();
/// buf.extend_from_slice(b"hello\n");
/// pool.release(buf);
///
/// let again = pool.acquire();
/// assert!(again.is_empty());
/// assert!(again.capacity() >= 6);
/// ```
#[derive(Debug)]
pub struct BufferPool {
    idle: Mutex<Vec<BytesMut>>,
    initial_capacity: usize,
    max_pooled_capacity: usize,
    max_idle: usize,
    metrics: BufferPoolMetrics,
}

impl BufferPool {
    /// Creates a pool with the default sizing.
    pub fn new() -> Self {
        Self::with_limits(
            DEFAULT_INITIAL_CAPACITY,
            DEFAULT_MAX_POOLED_CAPACITY,
            DEFAULT_MAX_IDLE,
        )
    }

    /// Creates a pool with explicit sizing.
    ///
    /// # Arguments
    ///
    /// * `initial_capacity` - Capacity reserved for newly allocated buffers
    /// * `max_pooled_capacity` - Largest capacity that is still returned to the pool
    /// * `max_idle` - Maximum number of idle buffers retained
    pub fn with_limits(initial_capacity: usize, max_pooled_capacity: usize, max_idle: usize) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            initial_capacity,
            max_pooled_capacity,
            max_idle,
            metrics: BufferPoolMetrics::default(),
        }
    }

    /// Returns an empty buffer, reusing an idle one when available.
    pub fn acquire(&self) -> BytesMut {
        let reused = self.lock_idle().pop();
        match reused {
            Some(buf) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                buf
            }
            None => {
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                BytesMut::with_capacity(self.initial_capacity)
            }
        }
    }

    /// Clears `buf` and keeps it for reuse unless it grew past the threshold.
    pub fn release(&self, mut buf: BytesMut) {
        if buf.capacity() > self.max_pooled_capacity {
            self.metrics.discards.fetch_add(1, Ordering::Relaxed);
            return;
        }

        buf.clear();
        let mut idle = self.lock_idle();
        if idle.len() >= self.max_idle {
            self.metrics.discards.fetch_add(1, Ordering::Relaxed);
            return;
        }
        idle.push(buf);
        self.metrics.returns.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of idle buffers currently held.
    pub fn idle(&self) -> usize {
        self.lock_idle().len()
    }

    /// Largest buffer capacity that [`release`](Self::release) keeps.
    pub fn max_pooled_capacity(&self) -> usize {
        self.max_pooled_capacity
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            returns: self.metrics.returns.load(Ordering::Relaxed),
            discards: self.metrics.discards.load(Ordering::Relaxed),
            idle: self.idle(),
        }
    }

    // A poisoned lock only means another thread panicked mid push/pop; the
    // Vec itself is still consistent.
    fn lock_idle(&self) -> std::sync::MutexGuard<'_, Vec<BytesMut>> {
        self.idle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_acquire_returns_empty_buffer_with_capacity() {
        let pool = BufferPool::new();
        let buf = pool.acquire();

        assert!(buf.is_empty());
        assert!(buf.capacity() >= DEFAULT_INITIAL_CAPACITY);
        assert_eq!(pool.snapshot().misses, 1);
    }

    #[test]
    fn test_release_resets_length_keeps_capacity() {
        let pool = BufferPool::with_limits(64, 1024, 8);

        let mut buf = pool.acquire();
        buf.extend_from_slice(&[b'x'; 200]);
        let capacity = buf.capacity();
        pool.release(buf);

        let reused = pool.acquire();
        assert!(reused.is_empty());
        assert_eq!(reused.capacity(), capacity);

        let snapshot = pool.snapshot();
        assert_eq!(snapshot.hits, 1);
        assert_eq!(snapshot.returns, 1);
    }

    #[test]
    fn test_oversized_buffer_is_discarded() {
        let pool = BufferPool::with_limits(16, 1024, 8);

        let mut buf = pool.acquire();
        buf.extend_from_slice(&vec![b'y'; 4096]);
        assert!(buf.capacity() > 1024);
        pool.release(buf);

        assert_eq!(pool.idle(), 0);
        assert_eq!(pool.snapshot().discards, 1);

        // Next acquire has to allocate
        let _ = pool.acquire();
        assert_eq!(pool.snapshot().misses, 2);
    }

    #[test]
    fn test_buffer_at_threshold_is_reused() {
        let pool = BufferPool::with_limits(1024, 1024, 8);

        let buf = pool.acquire();
        assert_eq!(buf.capacity(), 1024);
        pool.release(buf);

        assert_eq!(pool.idle(), 1);
        let _ = pool.acquire();
        assert_eq!(pool.snapshot().hits, 1);
    }

    #[test]
    fn test_idle_list_is_bounded() {
        let pool = BufferPool::with_limits(16, 1024, 2);

        let bufs: Vec<_> = (0..3).map(|_| pool.acquire()).collect();
        for buf in bufs {
            pool.release(buf);
        }

        assert_eq!(pool.idle(), 2);
        assert_eq!(pool.snapshot().discards, 1);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let pool = Arc::new(BufferPool::with_limits(128, 1024, 64));
        let mut handles = vec![];

        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let mut buf = pool.acquire();
                    buf.extend_from_slice(b"line\n");
                    pool.release(buf);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = pool.snapshot();
        assert_eq!(snapshot.hits + snapshot.misses, 8000);
        assert!(snapshot.idle <= 64);
    }
}
