//! Per-cell typing.
//!
//! Undeclared columns are typed cell by cell: missing marker, integer, float, date, time, then
//! string. Columns declared in a [`crate::types::Schema`] are parsed strictly instead.

use chrono::{NaiveDate, NaiveTime};

use crate::error::{IngestionError, IngestionResult};
use crate::types::{DataType, Value};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S", "%H:%M"];

/// Rules for turning raw cell text into a [`Value`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellInference {
    /// Trimmed cell texts that mean "no data". Compared case-sensitively.
    pub missing_markers: Vec<String>,
}

impl Default for CellInference {
    fn default() -> Self {
        Self {
            missing_markers: vec!["NA".to_string(), String::new()],
        }
    }
}

impl CellInference {
    /// Use `markers` as the missing markers.
    pub fn with_missing_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            missing_markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_missing_marker(&self, trimmed: &str) -> bool {
        self.missing_markers.iter().any(|m| m == trimmed)
    }

    /// Infer a typed value from raw cell text.
    pub fn infer(&self, raw: &str) -> Value {
        let trimmed = raw.trim();
        if self.is_missing_marker(trimmed) || trimmed.is_empty() {
            return Value::Missing;
        }
        if looks_integral(trimmed) {
            if let Ok(v) = trimmed.parse::<i64>() {
                return Value::Int64(v);
            }
        }
        if looks_decimal(trimmed) {
            if let Some(v) = trimmed.parse::<f64>().ok().filter(|v| v.is_finite()) {
                return Value::Float64(v);
            }
        }
        if let Some(d) = parse_date(trimmed) {
            return Value::Date(d);
        }
        if let Some(t) = parse_time(trimmed) {
            return Value::Time(t);
        }
        Value::Utf8(trimmed.to_owned())
    }

    /// Parse raw cell text as `data_type`. `row` and `column` only label the error.
    pub fn parse_declared(
        &self,
        row: usize,
        column: &str,
        data_type: DataType,
        raw: &str,
    ) -> IngestionResult<Value> {
        let trimmed = raw.trim();
        if self.is_missing_marker(trimmed) || trimmed.is_empty() {
            return Ok(Value::Missing);
        }

        let parse_error = |message: String| IngestionError::ParseError {
            row,
            column: column.to_owned(),
            raw: raw.to_owned(),
            message,
        };

        match data_type {
            DataType::Utf8 => Ok(Value::Utf8(trimmed.to_owned())),
            DataType::Int64 => trimmed
                .parse::<i64>()
                .map(Value::Int64)
                .map_err(|e| parse_error(e.to_string())),
            DataType::Float64 => match trimmed.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(Value::Float64(v)),
                Ok(_) => Err(parse_error("expected a finite number".to_string())),
                Err(e) => Err(parse_error(e.to_string())),
            },
            DataType::Date => parse_date(trimmed)
                .map(Value::Date)
                .ok_or_else(|| parse_error("expected date (YYYY-MM-DD)".to_string())),
            DataType::Time => parse_time(trimmed)
                .map(Value::Time)
                .ok_or_else(|| parse_error("expected time (HH:MM:SS or HH:MM)".to_string())),
        }
    }
}

fn looks_integral(s: &str) -> bool {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

// Keeps words such as `inf` and `NaN`, which `f64::from_str` accepts, out of the numbers.
fn looks_decimal(s: &str) -> bool {
    s.bytes().any(|b| b.is_ascii_digit())
        && s
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'e' | b'E' | b'+' | b'-'))
}

pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).ok()
}

pub(crate) fn parse_time(s: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}
