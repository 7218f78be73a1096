use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use crate::aggregate::FoldStats;

/// Events emitted by the aggregator and the execution engine.
///
/// The sequential aggregator only emits `FoldStarted` / `FoldFinished`; the engine adds chunk,
/// throttle and run events.
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    FoldStarted { operation: &'static str },
    ThrottleWaited { duration: Duration },
    ChunkStarted { start_row: usize, row_count: usize },
    ChunkFinished { folded_rows: u64 },
    FoldFinished {
        operation: &'static str,
        stats: FoldStats,
        elapsed: Duration,
    },
    RunFinished {
        elapsed: Duration,
        metrics: ExecutionMetricsSnapshot,
    },
}

/// Observer hook for execution events.
pub trait ExecutionObserver: Send + Sync {
    fn on_event(&self, event: &ExecutionEvent);
}

/// A simple stderr logger for execution events.
///
/// Per-chunk events are only logged when `verbose` is set.
#[derive(Debug, Default)]
pub struct StdErrExecutionObserver {
    pub verbose: bool,
}

impl ExecutionObserver for StdErrExecutionObserver {
    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::FoldStarted { operation } => eprintln!("[fold] {operation} started"),
            ExecutionEvent::FoldFinished {
                operation,
                stats,
                elapsed,
            } => eprintln!("[fold] {operation} finished in {elapsed:?}: {stats}"),
            ExecutionEvent::RunFinished { metrics, .. } => eprintln!("[fold] metrics {metrics}"),
            other if self.verbose => eprintln!("[fold] {other:?}"),
            _ => {}
        }
    }
}

/// Live counters for the engine's current (or last) fold.
///
/// Row counts are added as each chunk finishes; callers can snapshot them at any time.
#[derive(Default)]
pub struct ExecutionMetrics {
    runs: AtomicU64,
    operation: Mutex<Option<&'static str>>,
    elapsed_ns: AtomicU64,

    rows_seen: AtomicU64,
    rows_folded: AtomicU64,
    rows_malformed: AtomicU64,
    chunks_started: AtomicU64,
    chunks_finished: AtomicU64,
    chunks_failed: AtomicU64,
    throttle_wait_ns: AtomicU64,

    active_chunks: AtomicUsize,
    max_active_chunks: AtomicUsize,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the counters for a new fold of `operation`.
    pub fn begin_run(&self, operation: &'static str) {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut op) = self.operation.lock() {
            *op = Some(operation);
        }
        for counter in [
            &self.elapsed_ns,
            &self.rows_seen,
            &self.rows_folded,
            &self.rows_malformed,
            &self.chunks_started,
            &self.chunks_finished,
            &self.chunks_failed,
            &self.throttle_wait_ns,
        ] {
            counter.store(0, Ordering::SeqCst);
        }
        self.active_chunks.store(0, Ordering::SeqCst);
        self.max_active_chunks.store(0, Ordering::SeqCst);
    }

    pub fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns.store(nanos(elapsed), Ordering::SeqCst);
    }

    pub fn on_chunk_start(&self) {
        self.chunks_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active_chunks.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_chunks.fetch_max(now, Ordering::SeqCst);
    }

    /// Record a finished chunk; `None` when its fold returned an error.
    pub fn on_chunk_end(&self, stats: Option<&FoldStats>) {
        match stats {
            Some(stats) => {
                self.chunks_finished.fetch_add(1, Ordering::SeqCst);
                self.rows_seen.fetch_add(stats.rows_seen, Ordering::SeqCst);
                self.rows_folded.fetch_add(stats.rows_folded, Ordering::SeqCst);
                self.rows_malformed.fetch_add(stats.rows_malformed, Ordering::SeqCst);
            }
            None => {
                self.chunks_failed.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.active_chunks.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_throttle_wait(&self, d: Duration) {
        self.throttle_wait_ns.fetch_add(nanos(d), Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> ExecutionMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        ExecutionMetricsSnapshot {
            run_id: self.runs.load(Ordering::SeqCst),
            operation: self.operation.lock().ok().and_then(|op| *op),
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
            rows_seen: self.rows_seen.load(Ordering::SeqCst),
            rows_folded: self.rows_folded.load(Ordering::SeqCst),
            rows_malformed: self.rows_malformed.load(Ordering::SeqCst),
            chunks_started: self.chunks_started.load(Ordering::SeqCst),
            chunks_finished: self.chunks_finished.load(Ordering::SeqCst),
            chunks_failed: self.chunks_failed.load(Ordering::SeqCst),
            throttle_wait: Duration::from_nanos(self.throttle_wait_ns.load(Ordering::SeqCst)),
            max_active_chunks: self.max_active_chunks.load(Ordering::SeqCst),
        }
    }
}

fn nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

/// Point-in-time copy of [`ExecutionMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionMetricsSnapshot {
    pub run_id: u64,
    pub operation: Option<&'static str>,
    pub elapsed: Option<Duration>,
    pub rows_seen: u64,
    pub rows_folded: u64,
    pub rows_malformed: u64,
    pub chunks_started: u64,
    pub chunks_finished: u64,
    pub chunks_failed: u64,
    pub throttle_wait: Duration,
    pub max_active_chunks: usize,
}

impl fmt::Display for ExecutionMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run={} op={} rows={}/{} malformed={} chunks={}/{} failed={} max_active={} throttle_wait={:?} elapsed={:?}",
            self.run_id,
            self.operation.unwrap_or("-"),
            self.rows_folded,
            self.rows_seen,
            self.rows_malformed,
            self.chunks_finished,
            self.chunks_started,
            self.chunks_failed,
            self.max_active_chunks,
            self.throttle_wait,
            self.elapsed
        )
    }
}
