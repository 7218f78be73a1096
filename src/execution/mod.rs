//! Chunked parallel folds over an in-memory [`DataSet`].
//!
//! Rows are split into fixed-size chunks, each chunk is folded into its own accumulator on the
//! rayon pool, and the partial accumulators are merged back in chunk order. A semaphore caps
//! the number of chunks folding at once. Progress is published as [`ExecutionEvent`]s and as
//! counters in [`ExecutionMetrics`].
//!
//! Accumulator merges are associative and commutative, so every chunk size yields the same
//! result as [`crate::aggregate::RowAggregator`].

mod observer;
mod semaphore;

use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::aggregate::{
    Accumulator, Aggregation, BucketPlan, CountPlan, DistinctPlan, DistinctSet, FoldPlan, FoldStats,
    FrequencyCounter, Key, KeySelector, NestedCountPlan, NestedCounter, NumericSummary, OnMalformed,
    RangeBucket, RangeBuckets, SummaryPlan, YearRangePlan, absorb,
};
use crate::error::AggregateResult;
use crate::types::{DataSet, Value};

pub use observer::{
    ExecutionEvent, ExecutionMetrics, ExecutionMetricsSnapshot, ExecutionObserver, StdErrExecutionObserver,
};

use semaphore::Semaphore;

/// Pool size, chunking and throttle settings for an [`ExecutionEngine`].
#[derive(Debug, Clone)]
pub struct ExecutionOptions {
    /// Worker threads; `None` means one per available core.
    pub num_threads: Option<usize>,
    /// Rows folded by a single task.
    pub chunk_size: usize,
    /// Chunks allowed to fold at the same time, independent of the pool size.
    pub max_in_flight_chunks: usize,
    /// Malformed-row policy applied inside every chunk.
    pub on_malformed: OnMalformed,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self {
            num_threads: Some(n),
            chunk_size: 4_096,
            max_in_flight_chunks: n.max(1),
            on_malformed: OnMalformed::default(),
        }
    }
}

/// Parallel counterpart of [`crate::aggregate::RowAggregator`] for loaded datasets.
pub struct ExecutionEngine {
    pool: ThreadPool,
    opts: ExecutionOptions,
    observer: Option<Arc<dyn ExecutionObserver>>,
    metrics: Arc<ExecutionMetrics>,
}

impl ExecutionEngine {
    /// # Panics
    ///
    /// On a zero chunk size, zero in-flight limit or `Some(0)` threads.
    pub fn new(opts: ExecutionOptions) -> Self {
        assert!(opts.chunk_size > 0, "chunk_size must be > 0");
        assert!(
            opts.max_in_flight_chunks > 0,
            "max_in_flight_chunks must be > 0"
        );
        if let Some(n) = opts.num_threads {
            assert!(n > 0, "num_threads must be > 0 when set");
        }

        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);

        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .build()
            .expect("failed to build rayon thread pool");

        Self {
            pool,
            opts,
            observer: None,
            metrics: Arc::new(ExecutionMetrics::new()),
        }
    }

    /// Send fold, chunk and throttle events to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Shared handle to the counters of the current or most recent fold.
    pub fn metrics(&self) -> Arc<ExecutionMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Fold `dataset` with `plan`, one chunk of rows per task.
    ///
    /// Under [`OnMalformed::Abort`] the error of the earliest failing chunk is returned.
    pub fn fold<P>(&self, dataset: &DataSet, plan: &P) -> AggregateResult<Aggregation<P::Acc>>
    where
        P: FoldPlan + Sync,
        P::Acc: Send,
    {
        self.pool.install(|| self.fold_impl(dataset, plan))
    }

    fn fold_impl<P>(&self, dataset: &DataSet, plan: &P) -> AggregateResult<Aggregation<P::Acc>>
    where
        P: FoldPlan + Sync,
        P::Acc: Send,
    {
        let start = Instant::now();
        self.metrics.begin_run(plan.name());
        self.emit(ExecutionEvent::FoldStarted {
            operation: plan.name(),
        });

        let sem = Semaphore::new(self.opts.max_in_flight_chunks);
        let chunk_ranges = chunk_ranges(dataset.row_count(), self.opts.chunk_size);

        let per_chunk: Vec<AggregateResult<(P::Acc, FoldStats)>> = chunk_ranges
            .into_par_iter()
            .map(|range| {
                let permit = sem.acquire();
                if permit.waited > Duration::ZERO {
                    self.metrics.on_throttle_wait(permit.waited);
                    self.emit(ExecutionEvent::ThrottleWaited {
                        duration: permit.waited,
                    });
                }

                self.metrics.on_chunk_start();
                self.emit(ExecutionEvent::ChunkStarted {
                    start_row: range.start,
                    row_count: range.end - range.start,
                });

                let out = self.fold_chunk(dataset, plan, range);

                self.emit(ExecutionEvent::ChunkFinished {
                    folded_rows: out.as_ref().map_or(0, |(_, stats)| stats.rows_folded),
                });
                self.metrics.on_chunk_end(out.as_ref().ok().map(|(_, stats)| stats));
                drop(permit);
                out
            })
            .collect();

        let mut acc = P::Acc::default();
        let mut stats = FoldStats::default();
        let mut result = Ok(());
        for chunk in per_chunk {
            match chunk {
                Ok((chunk_acc, chunk_stats)) => {
                    acc.merge(chunk_acc);
                    stats.merge(chunk_stats);
                }
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }

        self.metrics.end_run(start.elapsed());
        if result.is_ok() {
            self.emit(ExecutionEvent::FoldFinished {
                operation: plan.name(),
                stats,
                elapsed: start.elapsed(),
            });
        }
        self.emit(ExecutionEvent::RunFinished {
            elapsed: start.elapsed(),
            metrics: self.metrics.snapshot(),
        });

        result.map(|()| Aggregation { value: acc, stats })
    }

    fn fold_chunk<P: FoldPlan>(
        &self,
        dataset: &DataSet,
        plan: &P,
        range: Range<usize>,
    ) -> AggregateResult<(P::Acc, FoldStats)> {
        let mut acc = P::Acc::default();
        let mut stats = FoldStats::default();
        for record in &dataset.records()[range] {
            absorb(plan, &mut acc, &mut stats, self.opts.on_malformed, Ok(record))?;
        }
        Ok((acc, stats))
    }

    /// Parallel [`crate::aggregate::RowAggregator::collect_distinct`].
    pub fn collect_distinct(
        &self,
        dataset: &DataSet,
        column: &str,
    ) -> AggregateResult<Aggregation<DistinctSet<Key>>> {
        self.fold(dataset, &DistinctPlan::new(dataset.header(), column)?)
    }

    /// Parallel [`crate::aggregate::RowAggregator::count_by`].
    pub fn count_by(
        &self,
        dataset: &DataSet,
        selector: &KeySelector,
    ) -> AggregateResult<Aggregation<FrequencyCounter<Key>>> {
        self.fold(dataset, &CountPlan::new(dataset.header(), selector)?)
    }

    /// Parallel [`crate::aggregate::RowAggregator::count_by_nested`].
    pub fn count_by_nested(
        &self,
        dataset: &DataSet,
        outer: &KeySelector,
        inner: &KeySelector,
    ) -> AggregateResult<Aggregation<NestedCounter<Key, Key>>> {
        self.fold(dataset, &NestedCountPlan::new(dataset.header(), outer, inner)?)
    }

    /// Parallel [`crate::aggregate::RowAggregator::numeric_summary`].
    ///
    /// Chunk samples are concatenated before summarizing, so the median is exact.
    pub fn numeric_summary<P>(
        &self,
        dataset: &DataSet,
        column: &str,
        predicate: P,
    ) -> AggregateResult<Aggregation<Option<NumericSummary>>>
    where
        P: Fn(&Value) -> bool + Sync,
    {
        let plan = SummaryPlan::new(dataset.header(), column, predicate)?;
        Ok(self.fold(dataset, &plan)?.map(|sample| sample.summarize()))
    }

    /// Parallel [`crate::aggregate::RowAggregator::bucketed_range_count`].
    pub fn bucketed_range_count(
        &self,
        dataset: &DataSet,
        column: &str,
        buckets: &RangeBuckets,
    ) -> AggregateResult<Aggregation<FrequencyCounter<RangeBucket>>> {
        self.fold(dataset, &BucketPlan::new(dataset.header(), column, buckets)?)
    }

    /// Parallel [`crate::aggregate::RowAggregator::year_range_count`].
    pub fn year_range_count(
        &self,
        dataset: &DataSet,
        column: &str,
        low_year: i32,
        high_year: i32,
    ) -> AggregateResult<Aggregation<FrequencyCounter<i32>>> {
        self.fold(
            dataset,
            &YearRangePlan::new(dataset.header(), column, low_year, high_year)?,
        )
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

fn chunk_ranges(row_count: usize, chunk_size: usize) -> Vec<Range<usize>> {
    if row_count == 0 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(row_count.div_ceil(chunk_size));
    let mut start = 0usize;
    while start < row_count {
        let end = (start + chunk_size).min(row_count);
        out.push(start..end);
        start = end;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{ExecutionEngine, ExecutionOptions, chunk_ranges};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use chrono::NaiveDate;

    use crate::aggregate::{
        FoldPlan, FrequencyCounter, Key, KeySelector, OnMalformed, RangeBuckets, RowAggregator, RowFate,
        derive,
    };
    use crate::error::{AggregateError, AggregateResult};
    use crate::execution::{ExecutionEvent, ExecutionObserver};
    use crate::types::{DataSet, Record, Value};

    const RACES: [&str; 4] = ["white", "black", "hispanic", "other"];

    fn dataset_of_n(n: usize) -> DataSet {
        let mut rows = Vec::with_capacity(n);
        for i in 0..n {
            let date = NaiveDate::from_ymd_opt(2010 + (i % 9) as i32, 1 + (i % 12) as u32, 1 + (i % 28) as u32)
                .unwrap();
            let race = if i % 7 == 0 {
                Value::Missing
            } else {
                Value::Utf8(RACES[i % RACES.len()].to_string())
            };
            rows.push(vec![
                Value::Int64(i as i64),
                Value::Date(date),
                race,
                Value::Int64((i % 45) as i64),
            ]);
        }
        DataSet::from_rows(vec!["id", "date", "subject_race", "officer_years_of_service"], rows)
    }

    fn engine(chunk_size: usize, max_in_flight_chunks: usize) -> ExecutionEngine {
        ExecutionEngine::new(ExecutionOptions {
            num_threads: Some(4),
            chunk_size,
            max_in_flight_chunks,
            on_malformed: OnMalformed::Abort,
        })
    }

    #[test]
    fn chunk_ranges_cover_all_rows() {
        assert!(chunk_ranges(0, 3).is_empty());
        assert_eq!(chunk_ranges(7, 3), vec![0..3, 3..6, 6..7]);
    }

    #[test]
    fn parallel_folds_match_sequential_for_every_chunk_size() {
        let ds = dataset_of_n(250);
        let seq = RowAggregator::default();
        let race = KeySelector::column("subject_race");
        let year = KeySelector::derived("date", derive::year);
        let buckets = RangeBuckets::years_of_service();

        for chunk_size in [1, 7, 64, 1_000] {
            let par = engine(chunk_size, 4);
            assert_eq!(par.count_by(&ds, &race).unwrap(), seq.count_by(&ds, &race).unwrap());
            assert_eq!(
                par.collect_distinct(&ds, "subject_race").unwrap(),
                seq.collect_distinct(&ds, "subject_race").unwrap()
            );
            assert_eq!(
                par.count_by_nested(&ds, &year, &race).unwrap(),
                seq.count_by_nested(&ds, &year, &race).unwrap()
            );
            assert_eq!(
                par.bucketed_range_count(&ds, "officer_years_of_service", &buckets).unwrap(),
                seq.bucketed_range_count(&ds, "officer_years_of_service", &buckets).unwrap()
            );
            assert_eq!(
                par.year_range_count(&ds, "date", 2011, 2017).unwrap(),
                seq.year_range_count(&ds, "date", 2011, 2017).unwrap()
            );
            assert_eq!(
                par.numeric_summary(&ds, "officer_years_of_service", Value::is_number).unwrap(),
                seq.numeric_summary(&ds, "officer_years_of_service", Value::is_number).unwrap()
            );
        }
    }

    #[test]
    fn abort_returns_the_earliest_chunk_error() {
        let mut rows: Vec<Vec<Value>> = (0..20).map(|i| vec![Value::Int64(i)]).collect();
        rows[5] = vec![Value::Utf8("five".to_string())];
        rows[15] = vec![Value::Utf8("fifteen".to_string())];
        let ds = DataSet::from_rows(vec!["years"], rows);

        let err = engine(4, 4)
            .bucketed_range_count(&ds, "years", &RangeBuckets::years_of_service())
            .unwrap_err();
        match err {
            AggregateError::Malformed { row, raw, .. } => {
                assert_eq!(row, 7);
                assert_eq!(raw, "five");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// Counts every row under one key, slowly enough for chunks to overlap.
    struct SlowCount;

    impl FoldPlan for SlowCount {
        type Acc = FrequencyCounter<Key>;

        fn name(&self) -> &'static str {
            "slow_count"
        }

        fn step(&self, acc: &mut Self::Acc, _record: &Record) -> AggregateResult<RowFate> {
            std::thread::sleep(Duration::from_millis(1));
            acc.increment(Key::from("row"));
            Ok(RowFate::Folded)
        }
    }

    /// Records the order of events, one tag per event.
    #[derive(Default)]
    struct EventLog(Mutex<Vec<&'static str>>);

    impl EventLog {
        fn tags(&self) -> Vec<&'static str> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ExecutionObserver for EventLog {
        fn on_event(&self, event: &ExecutionEvent) {
            let tag = match event {
                ExecutionEvent::FoldStarted { .. } => "fold_started",
                ExecutionEvent::ThrottleWaited { .. } => "throttled",
                ExecutionEvent::ChunkStarted { .. } => "chunk_started",
                ExecutionEvent::ChunkFinished { .. } => "chunk_finished",
                ExecutionEvent::FoldFinished { .. } => "fold_finished",
                ExecutionEvent::RunFinished { .. } => "run_finished",
            };
            self.0.lock().unwrap().push(tag);
        }
    }

    #[test]
    fn one_in_flight_chunk_serializes_chunk_events() {
        let ds = dataset_of_n(40);
        let log = Arc::new(EventLog::default());
        let engine = engine(4, 1).with_observer(log.clone());

        let out = engine.fold(&ds, &SlowCount).unwrap();
        assert_eq!(out.value.get(&Key::from("row")), 40);

        let tags = log.tags();
        assert_eq!(tags.first(), Some(&"fold_started"));
        assert_eq!(&tags[tags.len() - 2..], ["fold_finished", "run_finished"]);

        let chunk_events: Vec<_> = tags
            .iter()
            .filter(|t| t.starts_with("chunk_"))
            .collect();
        assert_eq!(chunk_events.len(), 20);
        for pair in chunk_events.chunks(2) {
            assert_eq!(pair, [&"chunk_started", &"chunk_finished"]);
        }
    }

    #[test]
    fn failed_fold_still_reports_the_run() {
        let ds = DataSet::from_rows(vec!["years"], vec![vec![Value::Utf8("many".to_string())]]);
        let log = Arc::new(EventLog::default());
        let engine = engine(1, 1).with_observer(log.clone());

        assert!(
            engine
                .bucketed_range_count(&ds, "years", &RangeBuckets::years_of_service())
                .is_err()
        );
        assert!(!log.tags().contains(&"fold_finished"));
        assert_eq!(log.tags().last(), Some(&"run_finished"));
        assert_eq!(engine.metrics().snapshot().chunks_failed, 1);
    }

    #[test]
    fn metrics_are_available_after_run() {
        let ds = dataset_of_n(60);
        let engine = engine(1, 1);
        let metrics = engine.metrics();

        let out = engine.fold(&ds, &SlowCount).unwrap();
        assert_eq!(out.stats.rows_folded, ds.row_count() as u64);

        let snap = metrics.snapshot();
        assert_eq!(snap.operation, Some("slow_count"));
        assert_eq!(snap.rows_seen, ds.row_count() as u64);
        assert_eq!(snap.rows_folded, ds.row_count() as u64);
        assert_eq!(snap.chunks_failed, 0);
        assert_eq!(snap.chunks_started, ds.row_count() as u64);
        assert_eq!(snap.chunks_finished, ds.row_count() as u64);
        assert_eq!(snap.max_active_chunks, 1);
        assert!(snap.throttle_wait > Duration::ZERO);
        assert!(snap.elapsed.is_some());
    }
}
