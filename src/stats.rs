//! Proxy-wide counters.
//!
//! Shared (`Arc<ProxyStats>`) by inbound connections and workers. All counters
//! are relaxed atomics; they are for observability, not coordination.

use std::sync::atomic::{AtomicU64, Ordering};

/// Statistics for the whole proxy.
#[derive(Debug, Default)]
pub struct ProxyStats {
    /// Total number of inbound connections accepted
    pub connections_accepted: AtomicU64,
    /// Currently open inbound connections
    pub active_connections: AtomicU64,
    /// Total bytes read from inbound connections
    pub bytes_read: AtomicU64,
    /// Records handed to the queue
    pub records_framed: AtomicU64,
    /// Records written to a target
    pub records_delivered: AtomicU64,
    /// Bytes written to targets
    pub bytes_written: AtomicU64,
    /// Failed outbound writes (each one is retried)
    pub write_failures: AtomicU64,
    /// Failed outbound dials
    pub dial_failures: AtomicU64,
    /// Successful outbound connects, including reconnects
    pub connects: AtomicU64,
}

/// Point-in-time copy of [`ProxyStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_accepted: u64,
    pub active_connections: u64,
    pub bytes_read: u64,
    pub records_framed: u64,
    pub records_delivered: u64,
    pub bytes_written: u64,
    pub write_failures: u64,
    pub dial_failures: u64,
    pub connects: u64,
}

impl ProxyStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_framed(&self) {
        self.records_framed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self, bytes: usize) {
        self.records_delivered.fetch_add(1, Ordering::Relaxed);
        self.bytes_written.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn write_failed(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dial_failed(&self) {
        self.dial_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connected(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            records_framed: self.records_framed.load(Ordering::Relaxed),
            records_delivered: self.records_delivered.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            dial_failures: self.dial_failures.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
        }
    }
}
