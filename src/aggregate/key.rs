//! Grouping keys and key selection.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{NaiveDate, NaiveTime};
use serde::{Serialize, Serializer};

use crate::types::Value;

/// `f64` with IEEE total ordering, usable as a map key.
#[derive(Debug, Clone, Copy)]
pub struct FloatKey(pub f64);

impl PartialEq for FloatKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.total_cmp(&other.0) == Ordering::Equal
    }
}

impl Eq for FloatKey {}

impl PartialOrd for FloatKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FloatKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Hash for FloatKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// A non-missing [`Value`] in a form that can be hashed and ordered.
///
/// Keys of different kinds order by kind first (integers, floats, dates, times, strings).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Key {
    Int64(i64),
    Float64(FloatKey),
    Date(NaiveDate),
    Time(NaiveTime),
    Utf8(String),
}

impl Key {
    /// Key for `value`; `None` for the missing sentinel.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Missing => None,
            Value::Int64(v) => Some(Self::Int64(*v)),
            Value::Float64(v) => Some(Self::Float64(FloatKey(*v))),
            Value::Date(d) => Some(Self::Date(*d)),
            Value::Time(t) => Some(Self::Time(*t)),
            Value::Utf8(s) => Some(Self::Utf8(s.clone())),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Utf8(s.to_owned())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Utf8(s)
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Self::Int64(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Self::Int64(i64::from(v))
    }
}

impl From<NaiveDate> for Key {
    fn from(d: NaiveDate) -> Self {
        Self::Date(d)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int64(v) => write!(f, "{v}"),
            Self::Float64(v) => write!(f, "{}", v.0),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Self::Time(t) => write!(f, "{}", t.format("%H:%M:%S")),
            Self::Utf8(s) => f.write_str(s),
        }
    }
}

// Serialized as text so keys can be JSON object keys.
impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A derivation could not handle the value it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeriveError {
    /// What the derivation accepts, e.g. `"date"`.
    pub expected: &'static str,
}

/// Pure function turning a non-missing cell into a grouping key.
pub type Derivation = fn(&Value) -> Result<Key, DeriveError>;

/// Which key a record is counted under.
#[derive(Debug, Clone)]
pub enum KeySelector {
    /// The column's value itself.
    Column(String),
    /// The column's value passed through `derive`.
    Derived { column: String, derive: Derivation },
}

impl KeySelector {
    pub fn column(name: impl Into<String>) -> Self {
        Self::Column(name.into())
    }

    pub fn derived(name: impl Into<String>, derive: Derivation) -> Self {
        Self::Derived {
            column: name.into(),
            derive,
        }
    }

    /// Column the selector reads.
    pub fn column_name(&self) -> &str {
        match self {
            Self::Column(c) | Self::Derived { column: c, .. } => c,
        }
    }

    /// Key of a non-missing value.
    pub(crate) fn key_of(&self, value: &Value) -> Result<Key, DeriveError> {
        match self {
            Self::Column(_) => Key::from_value(value).ok_or(DeriveError { expected: "value" }),
            Self::Derived { derive, .. } => derive(value),
        }
    }
}
