//! The row aggregator.
//!
//! Every aggregation is a single pass over a [`RecordSource`] that folds each record into an
//! accumulator:
//!
//! - [`RowAggregator::collect_distinct`]: distinct values of a column ([`DistinctSet`])
//! - [`RowAggregator::count_by`]: occurrences per key ([`FrequencyCounter`])
//! - [`RowAggregator::count_by_nested`]: occurrences per outer key and inner key ([`NestedCounter`])
//! - [`RowAggregator::numeric_summary`]: min/max/mean/median of a column ([`NumericSummary`])
//! - [`RowAggregator::bucketed_range_count`]: occurrences per value range ([`RangeBuckets`])
//! - [`RowAggregator::year_range_count`]: occurrences per year strictly inside a year range
//!
//! Rows whose relevant field is missing are skipped and counted in [`FoldStats::rows_missing`].
//! Malformed values abort the pass or are skipped according to [`OnMalformed`].
//!
//! ## Example
//!
//! ```rust
//! use stop_aggregator::aggregate::{derive, Key, KeySelector, RowAggregator};
//! use stop_aggregator::ingestion::csv::ingest_csv_from_reader;
//! use stop_aggregator::ingestion::CellInference;
//! use stop_aggregator::types::Schema;
//!
//! let input = "date,subject_race\n2015-03-02,white\n2015-03-09,NA\n2016-01-01,black\n";
//! let mut rdr = csv::Reader::from_reader(input.as_bytes());
//! let ds = ingest_csv_from_reader(&mut rdr, &Schema::default(), &CellInference::default()).unwrap();
//!
//! let agg = RowAggregator::default();
//! let by_race = agg.count_by(&ds, &KeySelector::column("subject_race")).unwrap();
//! assert_eq!(by_race.value.get(&Key::from("white")), 1);
//! assert_eq!(by_race.stats.rows_missing, 1);
//!
//! let by_year = agg
//!     .count_by(&ds, &KeySelector::derived("date", derive::year))
//!     .unwrap();
//! assert_eq!(by_year.value.get(&Key::from(2015)), 2);
//! ```

mod accumulators;
mod buckets;
pub mod derive;
mod filter;
mod key;
mod plan;
mod source;
mod summary;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::error::AggregateResult;
use crate::execution::{ExecutionEvent, ExecutionObserver};
use crate::types::Value;

pub use accumulators::{Accumulator, DistinctSet, FrequencyCounter, NestedCounter};
pub use buckets::{RangeBucket, RangeBuckets};
pub use filter::filter;
pub use key::{DeriveError, Derivation, FloatKey, Key, KeySelector};
pub use plan::{
    BucketPlan, CountPlan, DistinctPlan, FoldPlan, NestedCountPlan, RowFate, SummaryPlan, YearRangePlan,
};
pub use source::{RecordSource, RecordVisitor};
pub use summary::{NumericSample, NumericSummary};

pub(crate) use plan::absorb;

/// What to do with a row whose value cannot be used by the aggregation.
///
/// Cells of declared columns that fail to parse only reach this policy through a streaming
/// [`crate::ingestion::csv::CsvSource`]; loading a [`crate::types::DataSet`] rejects them up front.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum OnMalformed {
    /// End the pass with the row's error.
    #[default]
    Abort,
    /// Leave the row out and count it in [`FoldStats::rows_malformed`].
    Skip,
}

/// Options for a [`RowAggregator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateOptions {
    pub on_malformed: OnMalformed,
}

/// Per-pass row accounting.
///
/// `rows_seen == rows_folded + rows_missing + rows_filtered + rows_malformed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FoldStats {
    /// Rows read from the source.
    pub rows_seen: u64,
    /// Rows that updated the accumulator.
    pub rows_folded: u64,
    /// Rows skipped because the relevant field was missing.
    pub rows_missing: u64,
    /// Rows skipped by a range or predicate.
    pub rows_filtered: u64,
    /// Rows skipped as malformed under [`OnMalformed::Skip`].
    pub rows_malformed: u64,
}

impl FoldStats {
    /// Add the counts of a pass over another part of the input.
    pub fn merge(&mut self, other: FoldStats) {
        self.rows_seen += other.rows_seen;
        self.rows_folded += other.rows_folded;
        self.rows_missing += other.rows_missing;
        self.rows_filtered += other.rows_filtered;
        self.rows_malformed += other.rows_malformed;
    }
}

impl fmt::Display for FoldStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "seen={}, folded={}, missing={}, filtered={}, malformed={}",
            self.rows_seen, self.rows_folded, self.rows_missing, self.rows_filtered, self.rows_malformed
        )
    }
}

/// A folded accumulator and the row accounting of the pass that built it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Aggregation<A> {
    pub value: A,
    pub stats: FoldStats,
}

impl<A> Aggregation<A> {
    pub fn map<B>(self, f: impl FnOnce(A) -> B) -> Aggregation<B> {
        Aggregation {
            value: f(self.value),
            stats: self.stats,
        }
    }
}

/// Sequential, single-pass aggregator.
#[derive(Default)]
pub struct RowAggregator {
    options: AggregateOptions,
    observer: Option<Arc<dyn ExecutionObserver>>,
}

impl fmt::Debug for RowAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowAggregator")
            .field("options", &self.options)
            .field("observer_set", &self.observer.is_some())
            .finish()
    }
}

impl RowAggregator {
    pub fn new(options: AggregateOptions) -> Self {
        Self {
            options,
            observer: None,
        }
    }

    /// Attach an observer receiving fold start/finish events.
    pub fn with_observer(mut self, observer: Arc<dyn ExecutionObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn options(&self) -> AggregateOptions {
        self.options
    }

    /// Fold every record of `source` with `plan`.
    pub fn fold<S, P>(&self, source: S, plan: &P) -> AggregateResult<Aggregation<P::Acc>>
    where
        S: RecordSource,
        P: FoldPlan,
    {
        let start = Instant::now();
        self.emit(ExecutionEvent::FoldStarted {
            operation: plan.name(),
        });

        let mut acc = P::Acc::default();
        let mut stats = FoldStats::default();
        let on_malformed = self.options.on_malformed;
        source.for_each_record(&mut |record| absorb(plan, &mut acc, &mut stats, on_malformed, record))?;

        self.emit(ExecutionEvent::FoldFinished {
            operation: plan.name(),
            stats,
            elapsed: start.elapsed(),
        });
        Ok(Aggregation { value: acc, stats })
    }

    /// Distinct values of `column`.
    pub fn collect_distinct<S: RecordSource>(
        &self,
        source: S,
        column: &str,
    ) -> AggregateResult<Aggregation<DistinctSet<Key>>> {
        let plan = DistinctPlan::new(&source.header(), column)?;
        self.fold(source, &plan)
    }

    /// Occurrences per key chosen by `selector`.
    pub fn count_by<S: RecordSource>(
        &self,
        source: S,
        selector: &KeySelector,
    ) -> AggregateResult<Aggregation<FrequencyCounter<Key>>> {
        let plan = CountPlan::new(&source.header(), selector)?;
        self.fold(source, &plan)
    }

    /// Occurrences per `outer` key, then per `inner` key. Rows missing either field are skipped.
    pub fn count_by_nested<S: RecordSource>(
        &self,
        source: S,
        outer: &KeySelector,
        inner: &KeySelector,
    ) -> AggregateResult<Aggregation<NestedCounter<Key, Key>>> {
        let plan = NestedCountPlan::new(&source.header(), outer, inner)?;
        self.fold(source, &plan)
    }

    /// Min, max, mean and median of the values of `column` that pass `predicate`.
    ///
    /// A value passing `predicate` that is not a number is malformed. The summary is `None` when
    /// no value qualified.
    pub fn numeric_summary<S, P>(
        &self,
        source: S,
        column: &str,
        predicate: P,
    ) -> AggregateResult<Aggregation<Option<NumericSummary>>>
    where
        S: RecordSource,
        P: Fn(&Value) -> bool,
    {
        let plan = SummaryPlan::new(&source.header(), column, predicate)?;
        Ok(self.fold(source, &plan)?.map(|sample| sample.summarize()))
    }

    /// Occurrences per bucket containing the numeric value of `column`.
    ///
    /// Values outside every bucket are counted in [`FoldStats::rows_filtered`].
    pub fn bucketed_range_count<S: RecordSource>(
        &self,
        source: S,
        column: &str,
        buckets: &RangeBuckets,
    ) -> AggregateResult<Aggregation<FrequencyCounter<RangeBucket>>> {
        let plan = BucketPlan::new(&source.header(), column, buckets)?;
        self.fold(source, &plan)
    }

    /// Occurrences per year of the dates in `column`, for years strictly between `low_year` and
    /// `high_year`.
    pub fn year_range_count<S: RecordSource>(
        &self,
        source: S,
        column: &str,
        low_year: i32,
        high_year: i32,
    ) -> AggregateResult<Aggregation<FrequencyCounter<i32>>> {
        let plan = YearRangePlan::new(&source.header(), column, low_year, high_year)?;
        self.fold(source, &plan)
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Some(obs) = &self.observer {
            obs.on_event(&event);
        }
    }
}

/// [`RowAggregator::collect_distinct`] with default options.
pub fn collect_distinct<S: RecordSource>(
    source: S,
    column: &str,
) -> AggregateResult<Aggregation<DistinctSet<Key>>> {
    RowAggregator::default().collect_distinct(source, column)
}

/// [`RowAggregator::count_by`] with default options.
pub fn count_by<S: RecordSource>(
    source: S,
    selector: &KeySelector,
) -> AggregateResult<Aggregation<FrequencyCounter<Key>>> {
    RowAggregator::default().count_by(source, selector)
}

/// [`RowAggregator::count_by_nested`] with default options.
pub fn count_by_nested<S: RecordSource>(
    source: S,
    outer: &KeySelector,
    inner: &KeySelector,
) -> AggregateResult<Aggregation<NestedCounter<Key, Key>>> {
    RowAggregator::default().count_by_nested(source, outer, inner)
}

/// [`RowAggregator::numeric_summary`] with default options.
pub fn numeric_summary<S, P>(
    source: S,
    column: &str,
    predicate: P,
) -> AggregateResult<Aggregation<Option<NumericSummary>>>
where
    S: RecordSource,
    P: Fn(&Value) -> bool,
{
    RowAggregator::default().numeric_summary(source, column, predicate)
}

/// [`RowAggregator::bucketed_range_count`] with default options.
pub fn bucketed_range_count<S: RecordSource>(
    source: S,
    column: &str,
    buckets: &RangeBuckets,
) -> AggregateResult<Aggregation<FrequencyCounter<RangeBucket>>> {
    RowAggregator::default().bucketed_range_count(source, column, buckets)
}

/// [`RowAggregator::year_range_count`] with default options.
pub fn year_range_count<S: RecordSource>(
    source: S,
    column: &str,
    low_year: i32,
    high_year: i32,
) -> AggregateResult<Aggregation<FrequencyCounter<i32>>> {
    RowAggregator::default().year_range_count(source, column, low_year, high_year)
}
