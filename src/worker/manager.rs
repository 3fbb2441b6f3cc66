//! Outbound Connection Manager
//!
//! A [`Worker`] owns at most one outbound connection and pulls records off the
//! shared queue until shutdown. Once it has taken a record, that record is
//! written somewhere before the worker does anything else; there is no retry
//! limit.
//!
//! ## States
//!
//! ```text
//!                ┌─────────────────── write failed ───────────────────┐
//!                ▼                                                    │
//! ┌──────────────────┐  dial   ┌────────────┐  ok   ┌─────────────┐   │
//! │   Disconnected   │────────>│ Connecting │──────>│  Connected  │───┘
//! └──────────────────┘         └─────┬──────┘       └──────┬──────┘
//!                                ▲   │ failed:             │ shutdown signal
//!                                └───┘ backoff, random     ▼
//!                                      target         ┌─────────────┐  idle  ┌────────────┐
//!                                                     │  Draining   │───────>│ Terminated │
//!                                                     └─────────────┘        └────────────┘
//! ```
//!
//! ## Target Selection
//!
//! Every connect attempt starts at the worker's primary target. After a
//! failed dial the worker sleeps (2s doubling to 30s) and then picks the next
//! target uniformly at random from the *whole* list, which may be the one
//! that just failed.
//!
//! A connection older than the reconnect interval (5 min) is dropped before
//! the next write and re-established from the primary. That is how a worker
//! that failed over returns to its primary once it is healthy again.
//!
//! ## Drain
//!
//! After the shutdown signal the worker keeps taking records. It exits once
//! five consecutive one-second polls found nothing to send, or as soon as the
//! queue is closed (every inbound connection has flushed) and empty.

use crate::pipeline::{BufferPool, Record, RecordReceiver};
use crate::stats::ProxyStats;
use crate::worker::backoff::{Backoff, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF};
use crate::worker::link::Link;
use rand::Rng;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Timing knobs for a worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bound on a single dial (default: 5s)
    pub connect_timeout: Duration,

    /// Bound on writing one record (default: 30s)
    pub write_timeout: Duration,

    /// First delay after a failed dial (default: 2s)
    pub initial_backoff: Duration,

    /// Largest delay between dials (default: 30s)
    pub max_backoff: Duration,

    /// Age after which a connection is re-established from the primary (default: 5min)
    pub reconnect_interval: Duration,

    /// Queue poll cadence while draining (default: 1s)
    pub poll_interval: Duration,

    /// Consecutive empty polls before a draining worker exits (default: 5)
    pub drain_idle_polls: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(30),
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            reconnect_interval: Duration::from_secs(5 * 60),
            poll_interval: Duration::from_secs(1),
            drain_idle_polls: 5,
        }
    }
}

/// Lifecycle of a worker, observable through [`Worker::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Disconnected,
    Connecting,
    Connected,
    Draining,
    Terminated,
}

impl WorkerState {
    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Once draining, connection-level changes (a reconnect while flushing
    /// the last records) no longer change the reported state.
    pub fn can_transition(self, next: WorkerState) -> bool {
        use WorkerState::*;
        match (self, next) {
            (Terminated, _) => false,
            (_, Terminated) => true,
            (Draining, _) => false,
            (_, Draining) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Connecting | Connected | Disconnected) => true,
            (Connected, Disconnected | Connecting) => true,
            _ => false,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Disconnected => "disconnected",
            WorkerState::Connecting => "connecting",
            WorkerState::Connected => "connected",
            WorkerState::Draining => "draining",
            WorkerState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// What a worker did before it terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSummary {
    pub id: usize,
    pub records: u64,
    pub bytes: u64,
}

/// Owns one outbound connection and delivers records through it.
pub struct Worker {
    id: usize,
    targets: Arc<[String]>,
    primary: usize,
    current: usize,
    link: Option<Link>,
    backoff: Backoff,
    config: WorkerConfig,
    queue: RecordReceiver,
    pool: Arc<BufferPool>,
    stats: Arc<ProxyStats>,
    state: watch::Sender<WorkerState>,
    records: u64,
    bytes: u64,
}

impl Worker {
    /// Creates a disconnected worker.
    ///
    /// # Arguments
    ///
    /// * `id` - Ordinal used in logs
    /// * `targets` - Full target list shared by all workers (must not be empty)
    /// * `primary` - Index of this worker's assigned target
    /// * `config` - Timing knobs
    /// * `queue` - Consumer half of the record queue
    /// * `pool` - Where delivered buffers are returned
    /// * `stats` - Shared proxy statistics
    pub fn new(
        id: usize,
        targets: Arc<[String]>,
        primary: usize,
        config: WorkerConfig,
        queue: RecordReceiver,
        pool: Arc<BufferPool>,
        stats: Arc<ProxyStats>,
    ) -> Self {
        debug_assert!(primary < targets.len());
        let (state, _) = watch::channel(WorkerState::Disconnected);
        let backoff = Backoff::new(config.initial_backoff, config.max_backoff);

        Self {
            id,
            targets,
            primary,
            current: primary,
            link: None,
            backoff,
            config,
            queue,
            pool,
            stats,
            state,
            records: 0,
            bytes: 0,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn primary(&self) -> usize {
        self.primary
    }

    /// Watches the worker's state.
    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    fn target_addr(&self) -> &str {
        &self.targets[self.current]
    }

    fn transition(&self, next: WorkerState) {
        self.state.send_if_modified(|state| {
            if *state != next && state.can_transition(next) {
                *state = next;
                true
            } else {
                false
            }
        });
    }

    /// Runs the worker until it has drained after `cancel` fired.
    pub async fn run(mut self, cancel: CancellationToken) -> WorkerSummary {
        if !self.connect_with_retry(Some(&cancel)).await {
            info!(worker = self.id, "Shutdown requested before connecting");
            return self.terminate().await;
        }

        let poll = self.config.poll_interval;
        let mut ticker = interval_at(Instant::now() + poll, poll);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut draining = false;
        let mut idle_polls = 0u32;

        loop {
            tokio::select! {
                _ = cancel.cancelled(), if !draining => {
                    info!(worker = self.id, queued = self.queue.len(), "Draining records and exiting...");
                    draining = true;
                    idle_polls = 0;
                    ticker.reset();
                    self.transition(WorkerState::Draining);
                }
                _ = ticker.tick() => {
                    idle_polls = idle_polls.saturating_add(1);
                    if draining && idle_polls >= self.config.drain_idle_polls {
                        break;
                    }
                }
                record = self.queue.dequeue() => match record {
                    Some(record) => {
                        idle_polls = 0;
                        self.deliver(record).await;
                        ticker.reset();
                    }
                    None => {
                        debug!(worker = self.id, "Record queue closed");
                        break;
                    }
                },
            }
        }

        self.terminate().await
    }

    /// Writes one record, however long that takes, and recycles its buffer.
    pub async fn deliver(&mut self, record: Record) {
        self.write_with_retry(&record).await;

        self.records += 1;
        self.bytes += record.len() as u64;
        self.stats.record_delivered(record.len());
        self.pool.release(record.into_buffer());
    }

    /// Writes `record` to the current connection, reconnecting on any failure
    /// until the write succeeds.
    async fn write_with_retry(&mut self, record: &Record) {
        loop {
            self.ensure_connected().await;

            let Some(link) = self.link.as_mut() else {
                continue;
            };

            match link
                .write_record(record.as_bytes(), self.config.write_timeout)
                .await
            {
                Ok(()) => return,
                Err(e) => {
                    error!(
                        worker = self.id,
                        target = %self.targets[self.current],
                        error = %e,
                        len = record.len(),
                        "Error writing record"
                    );
                    self.stats.write_failed();
                    self.disconnect();
                }
            }
        }
    }

    /// Connects if disconnected; reconnects from the primary if the current
    /// connection has outlived the reconnect interval.
    async fn ensure_connected(&mut self) {
        if let Some(link) = &self.link {
            if link.age() <= self.config.reconnect_interval {
                return;
            }
            debug!(
                worker = self.id,
                target = %self.target_addr(),
                "Attempting to reconnect to primary target"
            );
        }

        self.connect_with_retry(None).await;
    }

    /// Dials until a target accepts, starting from the primary.
    ///
    /// With a cancellation token the loop gives up (returning `false`) once
    /// the token fires; without one it never gives up.
    async fn connect_with_retry(&mut self, cancel: Option<&CancellationToken>) -> bool {
        if let Some(link) = self.link.take() {
            link.close().await;
        }

        let mut index = self.primary;
        loop {
            self.current = index;
            self.transition(WorkerState::Connecting);

            let dialed = Link::dial(self.target_addr(), index, self.config.connect_timeout).await;
            match dialed {
                Ok(link) => {
                    info!(
                        worker = self.id,
                        target = %self.target_addr(),
                        primary = index == self.primary,
                        "Connected"
                    );
                    self.link = Some(link);
                    self.backoff.reset();
                    self.stats.connected();
                    self.transition(WorkerState::Connected);
                    return true;
                }
                Err(e) => {
                    warn!(
                        worker = self.id,
                        target = %self.target_addr(),
                        error = %e,
                        "Unable to connect"
                    );
                    self.stats.dial_failed();
                }
            }

            let delay = self.backoff.next_delay();
            match cancel {
                Some(cancel) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            self.transition(WorkerState::Disconnected);
                            return false;
                        }
                        _ = sleep(delay) => {}
                    }
                }
                None => sleep(delay).await,
            }

            index = rand::rng().random_range(0..self.targets.len());
        }
    }

    /// Whether the worker currently holds a connection to its primary target.
    pub fn is_connected_to_primary(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.target() == self.primary)
    }

    fn disconnect(&mut self) {
        self.link = None;
        self.transition(WorkerState::Disconnected);
    }

    async fn terminate(mut self) -> WorkerSummary {
        if let Some(link) = self.link.take() {
            link.close().await;
        }
        self.transition(WorkerState::Terminated);
        info!(
            worker = self.id,
            records = self.records,
            bytes = self.bytes,
            "Worker done"
        );

        WorkerSummary {
            id: self.id,
            records: self.records,
            bytes: self.bytes,
        }
    }
}

impl fmt::Display for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{:02}", self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{RecordQueue, RecordSender};
    use bytes::BytesMut;
    use std::net::SocketAddr;
    use std::sync::Mutex;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            connect_timeout: Duration::from_millis(500),
            write_timeout: Duration::from_secs(1),
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(40),
            reconnect_interval: Duration::from_secs(60),
            poll_interval: Duration::from_millis(20),
            drain_idle_polls: 5,
        }
    }

    fn record(data: &[u8]) -> Record {
        Record::new(BytesMut::from(data)).unwrap()
    }

    /// A target that appends everything it receives to a shared buffer.
    struct Collector {
        addr: SocketAddr,
        received: Arc<Mutex<Vec<u8>>>,
        _task: JoinHandle<()>,
    }

    impl Collector {
        async fn start() -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            Self::serve(listener)
        }

        fn serve(listener: TcpListener) -> Self {
            let addr = listener.local_addr().unwrap();
            let received = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&received);

            let task = tokio::spawn(async move {
                while let Ok((mut stream, _)) = listener.accept().await {
                    let sink = Arc::clone(&sink);
                    tokio::spawn(async move {
                        let mut buf = [0u8; 4096];
                        while let Ok(n) = stream.read(&mut buf).await {
                            if n == 0 {
                                break;
                            }
                            sink.lock().unwrap().extend_from_slice(&buf[..n]);
                        }
                    });
                }
            });

            Self {
                addr,
                received,
                _task: task,
            }
        }

        fn received(&self) -> Vec<u8> {
            self.received.lock().unwrap().clone()
        }

        async fn wait_for(&self, len: usize) -> Vec<u8> {
            let deadline = Instant::now() + Duration::from_secs(5);
            while self.received.lock().unwrap().len() < len && Instant::now() < deadline {
                sleep(Duration::from_millis(10)).await;
            }
            self.received()
        }
    }

    async fn dead_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    fn worker(targets: Vec<String>, primary: usize, config: WorkerConfig) -> (Worker, RecordSender) {
        let (tx, rx) = RecordQueue::bounded(16);
        let worker = Worker::new(
            1,
            targets.into(),
            primary,
            config,
            rx,
            Arc::new(BufferPool::new()),
            Arc::new(ProxyStats::new()),
        );
        (worker, tx)
    }

    #[test]
    fn test_state_transitions() {
        use WorkerState::*;

        assert!(Disconnected.can_transition(Connecting));
        assert!(Connecting.can_transition(Connected));
        assert!(Connected.can_transition(Disconnected));
        assert!(Connected.can_transition(Draining));
        assert!(Draining.can_transition(Terminated));
        assert!(Connecting.can_transition(Terminated));

        assert!(!Disconnected.can_transition(Connected));
        assert!(!Draining.can_transition(Connecting));
        assert!(!Terminated.can_transition(Connecting));
    }

    #[test]
    fn test_display() {
        let (tx, rx) = RecordQueue::bounded(1);
        drop(tx);
        let worker = Worker::new(
            7,
            vec!["127.0.0.1:1".to_string()].into(),
            0,
            WorkerConfig::default(),
            rx,
            Arc::new(BufferPool::new()),
            Arc::new(ProxyStats::new()),
        );
        assert_eq!(worker.to_string(), "worker-07");
        assert_eq!(worker.state(), WorkerState::Disconnected);
    }

    #[tokio::test]
    async fn test_delivers_records_in_order() {
        let target = Collector::start().await;
        let (worker, tx) = worker(vec![target.addr.to_string()], 0, fast_config());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(worker.run(cancel.clone()));

        for i in 0..50 {
            tx.enqueue(record(format!("line {i}\n").as_bytes()))
                .await
                .unwrap();
        }
        drop(tx);

        let summary = task.await.unwrap();
        assert_eq!(summary.records, 50);

        let expected: String = (0..50).map(|i| format!("line {i}\n")).collect();
        assert_eq!(target.wait_for(expected.len()).await, expected.as_bytes());
    }

    #[tokio::test]
    async fn test_fails_over_to_reachable_target() {
        let dead = dead_addr().await;
        let live = Collector::start().await;
        let (mut worker, _tx) = worker(
            vec![dead.to_string(), live.addr.to_string()],
            0,
            fast_config(),
        );

        tokio::time::timeout(Duration::from_secs(5), worker.deliver(record(b"moved\n")))
            .await
            .expect("record should fail over to the live target");

        assert!(!worker.is_connected_to_primary());
        assert_eq!(live.wait_for(6).await, b"moved\n");
    }

    #[tokio::test]
    async fn test_fails_back_to_primary_after_reconnect_interval() {
        let primary_addr = dead_addr().await;
        let secondary = Collector::start().await;
        let config = WorkerConfig {
            reconnect_interval: Duration::from_millis(300),
            ..fast_config()
        };
        let (mut worker, _tx) = worker(
            vec![primary_addr.to_string(), secondary.addr.to_string()],
            0,
            config,
        );

        worker.deliver(record(b"first\n")).await;
        assert!(!worker.is_connected_to_primary());

        // Primary comes back; the worker stays put until its timer elapses
        let primary = Collector::serve(TcpListener::bind(primary_addr).await.unwrap());
        worker.deliver(record(b"second\n")).await;
        assert!(!worker.is_connected_to_primary());

        sleep(Duration::from_millis(350)).await;
        worker.deliver(record(b"third\n")).await;
        assert!(worker.is_connected_to_primary());

        assert_eq!(secondary.wait_for(13).await, b"first\nsecond\n");
        assert_eq!(primary.wait_for(6).await, b"third\n");
    }

    #[tokio::test]
    async fn test_retries_until_target_appears() {
        let addr = dead_addr().await;
        let (mut worker, _tx) = worker(vec![addr.to_string()], 0, fast_config());

        let delivery = tokio::spawn(async move {
            worker.deliver(record(b"patient\n")).await;
            worker
        });

        sleep(Duration::from_millis(100)).await;
        assert!(!delivery.is_finished());

        let target = Collector::serve(TcpListener::bind(addr).await.unwrap());
        let worker = tokio::time::timeout(Duration::from_secs(5), delivery)
            .await
            .unwrap()
            .unwrap();

        assert!(worker.is_connected_to_primary());
        assert_eq!(target.wait_for(8).await, b"patient\n");
    }

    #[tokio::test]
    async fn test_drain_delivers_everything_before_exit() {
        let target = Collector::start().await;
        let config = fast_config();
        let full_drain = config.poll_interval * config.drain_idle_polls;
        let (worker, tx) = worker(vec![target.addr.to_string()], 0, config);
        let mut state = worker.subscribe();
        let cancel = CancellationToken::new();

        for i in 0..10 {
            tx.enqueue(record(format!("{i}\n").as_bytes())).await.unwrap();
        }

        let task = tokio::spawn(worker.run(cancel.clone()));
        state
            .wait_for(|s| *s == WorkerState::Connected)
            .await
            .unwrap();

        let started = Instant::now();
        cancel.cancel();

        // The sender is still alive, so only idle polls can end the drain
        let summary = task.await.unwrap();
        assert!(started.elapsed() >= full_drain);
        assert_eq!(summary.records, 10);
        assert_eq!(*state.borrow(), WorkerState::Terminated);
        assert!(tx.is_empty());

        let expected: String = (0..10).map(|i| format!("{i}\n")).collect();
        assert_eq!(target.wait_for(expected.len()).await, expected.as_bytes());
    }

    #[tokio::test]
    async fn test_exits_once_producers_are_gone() {
        let target = Collector::start().await;
        let config = WorkerConfig {
            poll_interval: Duration::from_secs(1),
            ..fast_config()
        };
        let (worker, tx) = worker(vec![target.addr.to_string()], 0, config);
        let mut state = worker.subscribe();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(worker.run(cancel.clone()));

        state
            .wait_for(|s| *s == WorkerState::Connected)
            .await
            .unwrap();
        cancel.cancel();

        // A late flush from an inbound connection still gets through
        tx.enqueue(record(b"late residual")).await.unwrap();
        drop(tx);

        let summary = tokio::time::timeout(Duration::from_millis(500), task)
            .await
            .expect("worker should not wait out the idle polls")
            .unwrap();
        assert_eq!(summary.records, 1);
        assert_eq!(target.wait_for(13).await, b"late residual");
    }

    #[tokio::test]
    async fn test_cancel_waits_for_record_in_flight() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let first = Collector::serve(listener);
        let config = WorkerConfig {
            reconnect_interval: Duration::from_millis(50),
            ..fast_config()
        };
        let (worker, tx) = worker(vec![addr.to_string()], 0, config);
        let mut state = worker.subscribe();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(worker.run(cancel.clone()));

        state
            .wait_for(|s| *s == WorkerState::Connected)
            .await
            .unwrap();

        // Take the target down and let the connection go stale
        first._task.abort();
        sleep(Duration::from_millis(100)).await;

        tx.enqueue(record(b"in flight\n")).await.unwrap();
        state
            .wait_for(|s| *s == WorkerState::Connecting)
            .await
            .unwrap();

        cancel.cancel();
        sleep(Duration::from_millis(200)).await;
        assert!(!task.is_finished());
        assert_eq!(*state.borrow(), WorkerState::Connecting);

        let target = Collector::serve(TcpListener::bind(addr).await.unwrap());
        drop(tx);

        let summary = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("worker should finish once the record is written")
            .unwrap();
        assert_eq!(summary.records, 1);
        assert_eq!(target.wait_for(10).await, b"in flight\n");
        assert_eq!(*state.borrow(), WorkerState::Terminated);
    }

    #[tokio::test]
    async fn test_cancel_before_connecting() {
        let addr = dead_addr().await;
        let (worker, _tx) = worker(vec![addr.to_string()], 0, fast_config());
        let mut state = worker.subscribe();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(worker.run(cancel.clone()));

        sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        let summary = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.records, 0);
        state.changed().await.ok();
        assert_eq!(*state.borrow(), WorkerState::Terminated);
    }
}
