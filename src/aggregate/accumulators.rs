//! Accumulator shapes the aggregator folds records into.
//!
//! All of them are ordered maps/sets, so iteration is by key and two folds over the same input
//! compare equal. Every accumulator can [`Accumulator::merge`] another one of the same shape;
//! merges are associative and commutative, which is what lets the execution engine fold chunks
//! independently.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

/// Fold state that can absorb a partial result built over another part of the input.
pub trait Accumulator: Default {
    fn merge(&mut self, other: Self);
}

/// Set of observed keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct DistinctSet<K> {
    values: BTreeSet<K>,
}

impl<K: Ord> Default for DistinctSet<K> {
    fn default() -> Self {
        Self {
            values: BTreeSet::new(),
        }
    }
}

impl<K: Ord> DistinctSet<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `value` was not seen before.
    pub fn insert(&mut self, value: K) -> bool {
        self.values.insert(value)
    }

    pub fn contains(&self, value: &K) -> bool {
        self.values.contains(value)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Values in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.values.iter()
    }

    pub fn into_sorted_vec(self) -> Vec<K> {
        self.values.into_iter().collect()
    }
}

impl<K: Ord> Accumulator for DistinctSet<K> {
    fn merge(&mut self, mut other: Self) {
        self.values.append(&mut other.values);
    }
}

impl<K: Ord> FromIterator<K> for DistinctSet<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// Key → occurrence count. Unseen keys read as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FrequencyCounter<K> {
    counts: BTreeMap<K, u64>,
}

impl<K: Ord> Default for FrequencyCounter<K> {
    fn default() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }
}

impl<K: Ord> FrequencyCounter<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more occurrence of `key`.
    pub fn increment(&mut self, key: K) {
        self.add(key, 1);
    }

    /// Count `n` more occurrences of `key`.
    pub fn add(&mut self, key: K, n: u64) {
        *self.counts.entry(key).or_insert(0) += n;
    }

    /// Count for `key`, zero if never seen.
    pub fn get(&self, key: &K) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Number of distinct keys seen.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// `(key, count)` pairs in ascending key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, u64)> {
        self.counts.iter().map(|(k, v)| (k, *v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.counts.keys()
    }

    /// Share of the total per key, in percent. Empty when the counter is empty.
    pub fn percentages(&self) -> Vec<(&K, f64)> {
        let total = self.total();
        if total == 0 {
            return Vec::new();
        }
        self.counts
            .iter()
            .map(|(k, v)| (k, *v as f64 * 100.0 / total as f64))
            .collect()
    }
}

impl<K: Ord> Accumulator for FrequencyCounter<K> {
    fn merge(&mut self, other: Self) {
        for (key, n) in other.counts {
            self.add(key, n);
        }
    }
}

impl<K: Ord> FromIterator<K> for FrequencyCounter<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut counter = Self::new();
        for key in iter {
            counter.increment(key);
        }
        counter
    }
}

/// Outer key → [`FrequencyCounter`] over inner keys.
///
/// The inner counter for an outer key is created on its first increment; lookups of unseen
/// outer or inner keys read as zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NestedCounter<O, I> {
    groups: BTreeMap<O, FrequencyCounter<I>>,
}

impl<O: Ord, I: Ord> Default for NestedCounter<O, I> {
    fn default() -> Self {
        Self {
            groups: BTreeMap::new(),
        }
    }
}

impl<O: Ord, I: Ord> NestedCounter<O, I> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, outer: O, inner: I) {
        self.group_mut(outer).increment(inner);
    }

    /// Inner counter for `outer`, inserted empty if absent.
    pub fn group_mut(&mut self, outer: O) -> &mut FrequencyCounter<I> {
        self.groups.entry(outer).or_default()
    }

    pub fn group(&self, outer: &O) -> Option<&FrequencyCounter<I>> {
        self.groups.get(outer)
    }

    pub fn get(&self, outer: &O, inner: &I) -> u64 {
        self.groups.get(outer).map_or(0, |g| g.get(inner))
    }

    /// Sum of all counts across groups.
    pub fn total(&self) -> u64 {
        self.groups.values().map(FrequencyCounter::total).sum()
    }

    /// Number of outer keys seen.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&O, &FrequencyCounter<I>)> {
        self.groups.iter()
    }
}

impl<O: Ord, I: Ord> Accumulator for NestedCounter<O, I> {
    fn merge(&mut self, other: Self) {
        for (outer, counter) in other.groups {
            self.group_mut(outer).merge(counter);
        }
    }
}
