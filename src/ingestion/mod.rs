//! Ingestion entrypoints and implementations.
//!
//! Most callers should use [`ingest_from_path`] or [`open_source`] (from [`unified`]) which:
//!
//! - pick the delimiter by file extension (or you can override via [`IngestionOptions`])
//! - type every cell (see [`CellInference`]), strictly for columns declared in a
//!   [`crate::types::Schema`]
//! - optionally report success/failure/alerts to an [`IngestionObserver`]

pub mod csv;
pub mod infer;
pub mod observability;
pub mod unified;

pub use csv::CsvSource;
pub use infer::CellInference;
pub use observability::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats,
    StdErrObserver, severity_for_error,
};
pub use unified::{IngestionFormat, IngestionOptions, ingest_from_path, open_source};
