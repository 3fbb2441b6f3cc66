//! Throughput Benchmark for linefan
//!
//! Measures the hot paths of the pipeline: cutting windows into records,
//! recycling buffers, and moving records through the queue.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use linefan::framing::{LineFramer, WINDOW_SIZE};
use linefan::pipeline::{BufferPool, RecordQueue};
use std::sync::Arc;
use std::time::Duration;

/// Builds `len` bytes of newline-terminated lines, each `line_len` long.
fn lines(len: usize, line_len: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(len);
    while data.len() < len {
        data.extend(std::iter::repeat(b'x').take(line_len - 1));
        data.push(b'\n');
    }
    data.truncate(len);
    data
}

/// Benchmark framing full windows
fn bench_framer(c: &mut Criterion) {
    let pool = Arc::new(BufferPool::new());

    let mut group = c.benchmark_group("framer");
    group.throughput(Throughput::Bytes(WINDOW_SIZE as u64));

    for line_len in [64, 512, 4096] {
        let window = lines(WINDOW_SIZE, line_len);
        group.bench_function(format!("window_{}b_lines", line_len), |b| {
            let mut framer = LineFramer::new(Arc::clone(&pool));
            b.iter(|| {
                if let Some(record) = framer.push(black_box(&window)) {
                    pool.release(record.into_buffer());
                }
            });
        });
    }

    // Lines longer than a window accumulate across several pushes
    let window = vec![b'y'; WINDOW_SIZE];
    group.bench_function("window_no_newline", |b| {
        b.iter(|| {
            let mut framer = LineFramer::new(Arc::clone(&pool));
            for _ in 0..4 {
                black_box(framer.push(&window));
            }
            if let Some(record) = framer.finish() {
                pool.release(record.into_buffer());
            }
        });
    });

    group.finish();
}

/// Benchmark buffer pool churn
fn bench_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool");
    group.throughput(Throughput::Elements(1));

    group.bench_function("acquire_release", |b| {
        let pool = BufferPool::new();
        b.iter(|| {
            let mut buf = pool.acquire();
            buf.extend_from_slice(b"a record\n");
            pool.release(black_box(buf));
        });
    });

    group.bench_function("oversized_discard", |b| {
        let pool = BufferPool::with_limits(1024, 4096, 16);
        b.iter(|| {
            let mut buf = pool.acquire();
            buf.reserve(8192);
            pool.release(black_box(buf));
        });
    });

    group.finish();
}

/// Benchmark concurrent pool access
fn bench_pool_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("pool_concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads", |b| {
        b.iter(|| {
            let pool = Arc::new(BufferPool::new());
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let pool = Arc::clone(&pool);
                    thread::spawn(move || {
                        for _ in 0..10_000 {
                            let buf = pool.acquire();
                            pool.release(buf);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(pool.idle());
        });
    });

    group.finish();
}

/// Benchmark moving records through the queue
fn bench_queue(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap();
    let pool = BufferPool::new();
    let (tx, rx) = RecordQueue::bounded(64);
    let record = lines(256, 64);

    let mut group = c.benchmark_group("queue");
    group.throughput(Throughput::Elements(32));

    group.bench_function("enqueue_dequeue_32", |b| {
        b.iter(|| {
            runtime.block_on(async {
                for _ in 0..32 {
                    let mut buf = pool.acquire();
                    buf.extend_from_slice(&record);
                    if let Some(record) = linefan::Record::new(buf) {
                        tx.enqueue(record).await.unwrap();
                    }
                }
                while let Some(record) = rx.try_dequeue() {
                    pool.release(black_box(record).into_buffer());
                }
            });
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_framer,
    bench_pool,
    bench_pool_concurrent,
    bench_queue,
);

criterion_main!(benches);
