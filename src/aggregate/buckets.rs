//! Inclusive numeric range buckets.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::{AggregateError, AggregateResult};

/// Closed interval `[low, high]`, labelled `low-high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RangeBucket {
    pub low: i64,
    pub high: i64,
}

impl RangeBucket {
    pub fn contains(&self, value: f64) -> bool {
        self.low as f64 <= value && value <= self.high as f64
    }
}

impl fmt::Display for RangeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.low, self.high)
    }
}

impl Serialize for RangeBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An ordered table of [`RangeBucket`]s.
///
/// A value is counted in every bucket that contains it; with disjoint buckets that is at most
/// one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeBuckets {
    buckets: Vec<RangeBucket>,
}

impl RangeBuckets {
    /// Build a table from `(low, high)` pairs. Fails on an empty table or an inverted range.
    pub fn new(ranges: impl IntoIterator<Item = (i64, i64)>) -> AggregateResult<Self> {
        let buckets: Vec<RangeBucket> = ranges
            .into_iter()
            .map(|(low, high)| RangeBucket { low, high })
            .collect();

        if buckets.is_empty() {
            return Err(AggregateError::InvalidBuckets {
                message: "no buckets".to_string(),
            });
        }
        if let Some(b) = buckets.iter().find(|b| b.low > b.high) {
            return Err(AggregateError::InvalidBuckets {
                message: format!("bucket {b} has low > high"),
            });
        }

        Ok(Self { buckets })
    }

    /// Officer years of service: `0-5`, `6-10`, ... `36-40`.
    pub fn years_of_service() -> Self {
        let mut buckets = vec![RangeBucket { low: 0, high: 5 }];
        buckets.extend((1..8).map(|i| RangeBucket {
            low: i * 5 + 1,
            high: i * 5 + 5,
        }));
        Self { buckets }
    }

    pub fn buckets(&self) -> &[RangeBucket] {
        &self.buckets
    }

    /// Buckets containing `value`, in table order.
    pub fn matching(&self, value: f64) -> impl Iterator<Item = &RangeBucket> {
        self.buckets.iter().filter(move |b| b.contains(value))
    }
}
