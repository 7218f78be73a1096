//! Per-record update rules for each aggregation.
//!
//! A [`FoldPlan`] is built against a source [`Header`] (so unknown columns fail before any row is
//! read) and then applied to one record at a time. The same plans drive the sequential
//! [`super::RowAggregator`] and the parallel [`crate::execution::ExecutionEngine`].

use chrono::Datelike;

use super::accumulators::{Accumulator, DistinctSet, FrequencyCounter, NestedCounter};
use super::buckets::{RangeBucket, RangeBuckets};
use super::key::{Key, KeySelector};
use super::summary::NumericSample;
use super::{FoldStats, OnMalformed};
use crate::error::{AggregateError, AggregateResult, IngestionResult};
use crate::types::{Header, Record, Value};

/// What one record contributed to a fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFate {
    /// The accumulator was updated.
    Folded,
    /// The relevant field held the missing sentinel.
    Missing,
    /// The record was present and well-formed but outside the aggregation's range or predicate.
    Filtered,
}

/// Update rule for one aggregation.
pub trait FoldPlan {
    type Acc: Accumulator;

    /// Operation name used in execution events.
    fn name(&self) -> &'static str;

    /// Fold `record` into `acc`. A malformed value is returned as a row-level error.
    fn step(&self, acc: &mut Self::Acc, record: &Record) -> AggregateResult<RowFate>;
}

/// Apply `plan` to one item of a source, recording the outcome in `stats`.
pub(crate) fn absorb<P: FoldPlan>(
    plan: &P,
    acc: &mut P::Acc,
    stats: &mut FoldStats,
    on_malformed: OnMalformed,
    record: IngestionResult<&Record>,
) -> AggregateResult<()> {
    stats.rows_seen += 1;
    let fate = match record {
        Ok(record) => plan.step(acc, record),
        Err(e) => Err(e.into()),
    };
    match fate {
        Ok(RowFate::Folded) => stats.rows_folded += 1,
        Ok(RowFate::Missing) => stats.rows_missing += 1,
        Ok(RowFate::Filtered) => stats.rows_filtered += 1,
        Err(e) if e.is_row_level() && on_malformed == OnMalformed::Skip => {
            stats.rows_malformed += 1
        }
        Err(e) => return Err(e),
    }
    Ok(())
}

fn malformed(record: &Record, column: &str, value: &Value, expected: &'static str) -> AggregateError {
    AggregateError::Malformed {
        row: record.line(),
        column: column.to_owned(),
        raw: value.to_string(),
        expected,
    }
}

/// A column name resolved to its index in the source header.
#[derive(Debug, Clone)]
struct Column {
    name: String,
    idx: usize,
}

impl Column {
    fn resolve(header: &Header, name: &str) -> AggregateResult<Self> {
        Ok(Self {
            name: name.to_owned(),
            idx: header.require(name)?,
        })
    }
}

#[derive(Debug, Clone)]
struct ResolvedSelector {
    column: Column,
    selector: KeySelector,
}

impl ResolvedSelector {
    fn resolve(header: &Header, selector: &KeySelector) -> AggregateResult<Self> {
        Ok(Self {
            column: Column::resolve(header, selector.column_name())?,
            selector: selector.clone(),
        })
    }

    /// `Ok(None)` when the field is missing.
    fn key(&self, record: &Record) -> AggregateResult<Option<Key>> {
        let value = record.value(self.column.idx);
        if value.is_missing() {
            return Ok(None);
        }
        self.selector
            .key_of(value)
            .map(Some)
            .map_err(|e| malformed(record, &self.column.name, value, e.expected))
    }
}

/// Plan for [`super::RowAggregator::collect_distinct`].
#[derive(Debug, Clone)]
pub struct DistinctPlan {
    column: Column,
}

impl DistinctPlan {
    pub fn new(header: &Header, column: &str) -> AggregateResult<Self> {
        Ok(Self {
            column: Column::resolve(header, column)?,
        })
    }
}

impl FoldPlan for DistinctPlan {
    type Acc = DistinctSet<Key>;

    fn name(&self) -> &'static str {
        "collect_distinct"
    }

    fn step(&self, acc: &mut Self::Acc, record: &Record) -> AggregateResult<RowFate> {
        match Key::from_value(record.value(self.column.idx)) {
            Some(key) => {
                acc.insert(key);
                Ok(RowFate::Folded)
            }
            None => Ok(RowFate::Missing),
        }
    }
}

/// Plan for [`super::RowAggregator::count_by`].
#[derive(Debug, Clone)]
pub struct CountPlan {
    selector: ResolvedSelector,
}

impl CountPlan {
    pub fn new(header: &Header, selector: &KeySelector) -> AggregateResult<Self> {
        Ok(Self {
            selector: ResolvedSelector::resolve(header, selector)?,
        })
    }
}

impl FoldPlan for CountPlan {
    type Acc = FrequencyCounter<Key>;

    fn name(&self) -> &'static str {
        "count_by"
    }

    fn step(&self, acc: &mut Self::Acc, record: &Record) -> AggregateResult<RowFate> {
        match self.selector.key(record)? {
            Some(key) => {
                acc.increment(key);
                Ok(RowFate::Folded)
            }
            None => Ok(RowFate::Missing),
        }
    }
}

/// Plan for [`super::RowAggregator::count_by_nested`].
#[derive(Debug, Clone)]
pub struct NestedCountPlan {
    outer: ResolvedSelector,
    inner: ResolvedSelector,
}

impl NestedCountPlan {
    pub fn new(header: &Header, outer: &KeySelector, inner: &KeySelector) -> AggregateResult<Self> {
        Ok(Self {
            outer: ResolvedSelector::resolve(header, outer)?,
            inner: ResolvedSelector::resolve(header, inner)?,
        })
    }
}

impl FoldPlan for NestedCountPlan {
    type Acc = NestedCounter<Key, Key>;

    fn name(&self) -> &'static str {
        "count_by_nested"
    }

    // A row missing either field is skipped before the other field is checked.
    fn step(&self, acc: &mut Self::Acc, record: &Record) -> AggregateResult<RowFate> {
        match (self.outer.key(record), self.inner.key(record)) {
            (Ok(None), _) | (_, Ok(None)) => Ok(RowFate::Missing),
            (Err(e), _) | (_, Err(e)) => Err(e),
            (Ok(Some(outer)), Ok(Some(inner))) => {
                acc.increment(outer, inner);
                Ok(RowFate::Folded)
            }
        }
    }
}

/// Plan for [`super::RowAggregator::numeric_summary`].
pub struct SummaryPlan<P> {
    column: Column,
    predicate: P,
}

impl<P> SummaryPlan<P>
where
    P: Fn(&Value) -> bool,
{
    pub fn new(header: &Header, column: &str, predicate: P) -> AggregateResult<Self> {
        Ok(Self {
            column: Column::resolve(header, column)?,
            predicate,
        })
    }
}

impl<P> FoldPlan for SummaryPlan<P>
where
    P: Fn(&Value) -> bool,
{
    type Acc = NumericSample;

    fn name(&self) -> &'static str {
        "numeric_summary"
    }

    fn step(&self, acc: &mut Self::Acc, record: &Record) -> AggregateResult<RowFate> {
        let value = record.value(self.column.idx);
        if value.is_missing() {
            return Ok(RowFate::Missing);
        }
        if !(self.predicate)(value) {
            return Ok(RowFate::Filtered);
        }
        let v = value
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| malformed(record, &self.column.name, value, "finite number"))?;
        acc.push(v);
        Ok(RowFate::Folded)
    }
}

/// Plan for [`super::RowAggregator::bucketed_range_count`].
#[derive(Debug, Clone)]
pub struct BucketPlan {
    column: Column,
    buckets: RangeBuckets,
}

impl BucketPlan {
    pub fn new(header: &Header, column: &str, buckets: &RangeBuckets) -> AggregateResult<Self> {
        Ok(Self {
            column: Column::resolve(header, column)?,
            buckets: buckets.clone(),
        })
    }
}

impl FoldPlan for BucketPlan {
    type Acc = FrequencyCounter<RangeBucket>;

    fn name(&self) -> &'static str {
        "bucketed_range_count"
    }

    fn step(&self, acc: &mut Self::Acc, record: &Record) -> AggregateResult<RowFate> {
        let value = record.value(self.column.idx);
        if value.is_missing() {
            return Ok(RowFate::Missing);
        }
        let v = value
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| malformed(record, &self.column.name, value, "finite number"))?;

        let mut hit = false;
        for bucket in self.buckets.matching(v) {
            acc.increment(*bucket);
            hit = true;
        }
        Ok(if hit { RowFate::Folded } else { RowFate::Filtered })
    }
}

/// Plan for [`super::RowAggregator::year_range_count`].
#[derive(Debug, Clone)]
pub struct YearRangePlan {
    column: Column,
    low_year: i32,
    high_year: i32,
}

impl YearRangePlan {
    pub fn new(header: &Header, column: &str, low_year: i32, high_year: i32) -> AggregateResult<Self> {
        Ok(Self {
            column: Column::resolve(header, column)?,
            low_year,
            high_year,
        })
    }
}

impl FoldPlan for YearRangePlan {
    type Acc = FrequencyCounter<i32>;

    fn name(&self) -> &'static str {
        "year_range_count"
    }

    fn step(&self, acc: &mut Self::Acc, record: &Record) -> AggregateResult<RowFate> {
        let value = record.value(self.column.idx);
        if value.is_missing() {
            return Ok(RowFate::Missing);
        }
        let year = value
            .as_date()
            .ok_or_else(|| malformed(record, &self.column.name, value, "date"))?
            .year();

        if year > self.low_year && year < self.high_year {
            acc.increment(year);
            Ok(RowFate::Folded)
        } else {
            Ok(RowFate::Filtered)
        }
    }
}
