//! Built-in [`super::Derivation`]s.

use chrono::{Datelike, Timelike};

use super::key::{DeriveError, Key};
use crate::types::Value;

/// ISO weekday of a date: Monday = 1 through Sunday = 7.
pub fn weekday(value: &Value) -> Result<Key, DeriveError> {
    value
        .as_date()
        .map(|d| Key::Int64(i64::from(d.weekday().number_from_monday())))
        .ok_or(DeriveError { expected: "date" })
}

/// Calendar year of a date.
pub fn year(value: &Value) -> Result<Key, DeriveError> {
    value
        .as_date()
        .map(|d| Key::Int64(i64::from(d.year())))
        .ok_or(DeriveError { expected: "date" })
}

/// Hour of a clock time. Text such as `"19:30:56"` is accepted as long as it starts with an
/// hour field.
pub fn hour(value: &Value) -> Result<Key, DeriveError> {
    const EXPECTED: DeriveError = DeriveError {
        expected: "time (HH:MM:SS)",
    };
    match value {
        Value::Time(t) => Ok(Key::Int64(i64::from(t.hour()))),
        Value::Utf8(s) => s
            .split(':')
            .next()
            .and_then(|h| h.trim().parse::<u32>().ok())
            .filter(|h| *h < 24)
            .map(|h| Key::Int64(i64::from(h)))
            .ok_or(EXPECTED),
        _ => Err(EXPECTED),
    }
}
