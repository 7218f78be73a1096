//! Record filtering for [`crate::types::DataSet`].

use crate::types::{DataSet, Record};

/// Returns a new [`DataSet`] containing only records for which `predicate` returns `true`.
///
/// This is a convenience wrapper around [`DataSet::filter_records`].
pub fn filter<F>(dataset: &DataSet, predicate: F) -> DataSet
where
    F: FnMut(&Record) -> bool,
{
    dataset.filter_records(predicate)
}
