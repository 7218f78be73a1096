use thiserror::Error;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Convenience result type for aggregation operations.
pub type AggregateResult<T> = Result<T, AggregateError>;

/// Error type returned by ingestion functions.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV framing error (unequal row lengths, invalid UTF-8, ...).
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// The input does not conform to the provided schema (missing declared columns, etc.).
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A value in a declared column could not be parsed into its [`crate::types::DataType`].
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },
}

impl IngestionError {
    /// Returns `true` if the error concerns a single row and the rest of the input is still
    /// readable.
    pub fn is_row_level(&self) -> bool {
        matches!(self, Self::ParseError { .. })
    }
}

/// Error type returned by the row aggregator.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Reading the record source failed.
    #[error(transparent)]
    Ingestion(#[from] IngestionError),

    /// The aggregation refers to a column the source does not have.
    #[error("unknown column '{column}'. headers={available:?}")]
    UnknownColumn {
        column: String,
        available: Vec<String>,
    },

    /// A present value does not have the shape the aggregation needs (e.g. a non-date in a date
    /// column).
    #[error("malformed value at row {row} column '{column}': expected {expected} (raw='{raw}')")]
    Malformed {
        row: usize,
        column: String,
        raw: String,
        expected: &'static str,
    },

    /// A bucket table is unusable.
    #[error("invalid buckets: {message}")]
    InvalidBuckets { message: String },
}

impl AggregateError {
    /// Returns `true` for errors that concern a single row, which
    /// [`crate::aggregate::OnMalformed::Skip`] may skip over.
    pub fn is_row_level(&self) -> bool {
        match self {
            Self::Malformed { .. } => true,
            Self::Ingestion(e) => e.is_row_level(),
            Self::UnknownColumn { .. } | Self::InvalidBuckets { .. } => false,
        }
    }
}
