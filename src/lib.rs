//! `stop-aggregator` folds traffic-stop records (Stanford Open Policing Project CSV files) into
//! descriptive aggregates: distinct values, frequency counts, nested counts, numeric summaries and
//! range-bucketed counts.
//!
//! The primary entrypoint is [`aggregate::RowAggregator`], which folds any
//! [`aggregate::RecordSource`] in one pass. Sources are an in-memory [`types::DataSet`] (see
//! [`ingestion::ingest_from_path`]) or a streaming [`ingestion::CsvSource`] (see
//! [`ingestion::open_source`]).
//!
//! ## Cells
//!
//! Every cell is inferred into a [`types::Value`]:
//!
//! - a missing marker (`NA` or an empty cell by default) becomes [`types::Value::Missing`]
//! - integers become [`types::Value::Int64`], other decimals [`types::Value::Float64`]
//! - `YYYY-MM-DD` becomes [`types::Value::Date`], `HH:MM[:SS]` becomes [`types::Value::Time`]
//! - anything else is [`types::Value::Utf8`]
//!
//! A [`types::Schema`] can declare column types; declared columns are parsed strictly.
//!
//! ## Quick example: stream a file
//!
//! ```no_run
//! use stop_aggregator::aggregate::{derive, KeySelector, RowAggregator};
//! use stop_aggregator::ingestion::{open_source, IngestionOptions};
//! use stop_aggregator::types::Schema;
//!
//! # fn main() -> Result<(), stop_aggregator::AggregateError> {
//! let source = open_source("il_chicago.csv", &Schema::default(), &IngestionOptions::default())?;
//! let by_weekday = RowAggregator::default()
//!     .count_by(source, &KeySelector::derived("date", derive::weekday))?;
//! for (day, n) in by_weekday.value.iter() {
//!     println!("{day}: {n}");
//! }
//! println!("{}", by_weekday.stats);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: CSV/TSV reading, cell inference and ingestion observers
//! - [`types`]: values, records, headers and the in-memory dataset
//! - [`aggregate`]: accumulators, key selectors and the sequential aggregator
//! - [`execution`]: chunked parallel folds over a dataset, with metrics and throttling
//! - [`report`]: the per-city report
//! - [`error`]: error types used across ingestion and aggregation

pub mod aggregate;
pub mod error;
pub mod execution;
pub mod ingestion;
pub mod report;
pub mod types;

pub use error::{AggregateError, AggregateResult, IngestionError, IngestionResult};
