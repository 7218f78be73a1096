//! Core data model types.
//!
//! Ingestion turns each line of a delimited file into a [`Record`]: typed [`Value`]s addressed by
//! column name through a shared [`Header`]. A [`DataSet`] is a materialized list of records; an
//! optional [`Schema`] declares strict types for selected columns.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};

use crate::error::{AggregateError, AggregateResult};

/// Logical data type for a declared column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Calendar date (`YYYY-MM-DD`).
    Date,
    /// Clock time (`HH:MM:SS` or `HH:MM`).
    Time,
    /// UTF-8 string.
    Utf8,
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Declared column types.
///
/// Columns listed here are parsed strictly; every other column uses per-cell inference. The
/// empty schema (the default) infers everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of declared fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Returns the declared type of `name`, if any.
    pub fn data_type_of(&self, name: &str) -> Option<DataType> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.data_type)
    }
}

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing-data sentinel (`NA` in the source files).
    Missing,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Calendar date.
    Date(NaiveDate),
    /// Clock time.
    Time(NaiveTime),
    /// UTF-8 string.
    Utf8(String),
}

static MISSING: Value = Value::Missing;

impl Value {
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    /// Returns `true` for the numeric variants.
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Int64(_) | Self::Float64(_))
    }

    /// Numeric value widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int64(v) => Some(*v as f64),
            Self::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Self::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<NaiveTime> {
        match self {
            Self::Time(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => f.write_str("NA"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{v}"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
            Self::Utf8(s) => f.write_str(s),
        }
    }
}

/// Column names of a source, shared by all of its records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Header {
    /// Build a header from column names. On duplicate names the first occurrence wins.
    pub fn new(names: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            index.entry(name.clone()).or_insert(i);
        }
        Self { names, index }
    }

    /// Column names in source order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Returns the index of a column by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Like [`Self::index_of`], but an absent column is an [`AggregateError::UnknownColumn`].
    pub fn require(&self, name: &str) -> AggregateResult<usize> {
        self.index_of(name).ok_or_else(|| AggregateError::UnknownColumn {
            column: name.to_owned(),
            available: self.names.clone(),
        })
    }
}

/// One parsed row.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    line: usize,
    header: Arc<Header>,
    values: Vec<Value>,
}

impl Record {
    /// Create a record. `line` is the 1-based line in the source (the header is line 1).
    pub fn new(line: usize, header: Arc<Header>, values: Vec<Value>) -> Self {
        Self {
            line,
            header,
            values,
        }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Value of the column at `idx`; cells past the end of a short row read as missing.
    pub fn value(&self, idx: usize) -> &Value {
        self.values.get(idx).unwrap_or(&MISSING)
    }

    /// Value of the named column, or `None` if the header has no such column.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.header.index_of(column).map(|idx| self.value(idx))
    }

    /// Returns `true` if the named column is absent from the header or holds the missing sentinel.
    pub fn is_missing(&self, column: &str) -> bool {
        self.get(column).is_none_or(Value::is_missing)
    }
}

/// In-memory list of records sharing one header.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    header: Arc<Header>,
    records: Vec<Record>,
}

impl DataSet {
    /// Create a dataset from a header and records built against it.
    pub fn new(header: Arc<Header>, records: Vec<Record>) -> Self {
        Self { header, records }
    }

    /// Build a dataset from column names and row values, numbering rows as if read from a file
    /// with a header line.
    pub fn from_rows<S: Into<String>>(columns: Vec<S>, rows: Vec<Vec<Value>>) -> Self {
        let header = Arc::new(Header::new(columns.into_iter().map(Into::into).collect()));
        let records = rows
            .into_iter()
            .enumerate()
            .map(|(i, values)| Record::new(i + 2, Arc::clone(&header), values))
            .collect();
        Self { header, records }
    }

    pub fn header(&self) -> &Arc<Header> {
        &self.header
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Number of records in the dataset.
    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    /// Create a new dataset containing only records that match `predicate`.
    ///
    /// The returned dataset shares the original header; records keep their line numbers.
    pub fn filter_records<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&Record) -> bool,
    {
        let records = self
            .records
            .iter()
            .filter(|r| predicate(r))
            .cloned()
            .collect();
        Self {
            header: Arc::clone(&self.header),
            records,
        }
    }
}
