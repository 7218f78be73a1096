use std::sync::Arc;

use crate::error::{AggregateResult, IngestionResult};
use crate::types::{DataSet, Header, Record};

/// Callback receiving each record of a source, or the row-level error that replaced it.
pub type RecordVisitor<'v> = dyn FnMut(IngestionResult<&Record>) -> AggregateResult<()> + 'v;

/// Anything the aggregator can fold over.
///
/// A source hands every record to the visitor exactly once, in source order, and stops at the
/// first error the visitor returns. Only row-level problems (a declared column that failed to
/// parse) are passed to the visitor as `Err`; structural failures end the pass directly.
pub trait RecordSource {
    /// Header shared by all records, known before the pass starts.
    fn header(&self) -> Arc<Header>;

    fn for_each_record(self, visit: &mut RecordVisitor<'_>) -> AggregateResult<()>;
}

impl RecordSource for &DataSet {
    fn header(&self) -> Arc<Header> {
        Arc::clone(DataSet::header(self))
    }

    fn for_each_record(self, visit: &mut RecordVisitor<'_>) -> AggregateResult<()> {
        for record in self.records() {
            visit(Ok(record))?;
        }
        Ok(())
    }
}
