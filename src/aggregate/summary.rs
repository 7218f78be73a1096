//! Numeric summaries (min, max, mean, median).

use serde::Serialize;

use super::accumulators::Accumulator;

/// The numeric values collected by a summary fold.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NumericSample {
    values: Vec<f64>,
}

impl NumericSample {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: f64) {
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Summarize the sample; `None` when it is empty.
    pub fn summarize(&self) -> Option<NumericSummary> {
        NumericSummary::from_values(&self.values)
    }
}

impl Accumulator for NumericSample {
    fn merge(&mut self, mut other: Self) {
        self.values.append(&mut other.values);
    }
}

impl FromIterator<f64> for NumericSample {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Descriptive statistics over a non-empty set of numbers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumericSummary {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Central value; the average of the two central values for an even count.
    pub median: f64,
}

impl NumericSummary {
    /// Summarize `values`; `None` when there are none.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut min = values[0];
        let mut max = values[0];
        let mut sum = 0.0;
        for &v in values {
            min = min.min(v);
            max = max.max(v);
            sum += v;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        Some(Self {
            count: values.len(),
            min,
            max,
            mean: sum / values.len() as f64,
            median: median_of_sorted(&sorted),
        })
    }
}

fn median_of_sorted(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}
