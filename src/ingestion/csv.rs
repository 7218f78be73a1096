//! CSV ingestion implementation.
//!
//! Two ways to read a file:
//!
//! - [`ingest_csv_from_path`] / [`ingest_csv_from_reader`] materialize a [`DataSet`], which can be
//!   aggregated any number of times;
//! - [`CsvSource`] streams records straight into a single aggregation pass.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use crate::aggregate::{RecordSource, RecordVisitor};
use crate::error::{AggregateError, AggregateResult, IngestionError, IngestionResult};
use crate::types::{DataSet, DataType, Header, Record, Schema};

use super::infer::CellInference;
use super::observability::{
    IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats, notify_outcome,
};

/// Ingest a CSV file into an in-memory [`DataSet`].
///
/// Rules:
///
/// - CSV must have headers.
/// - Headers must contain all declared schema fields (order can differ).
/// - Declared columns are parsed strictly; all other cells are inferred.
pub fn ingest_csv_from_path(
    path: impl AsRef<Path>,
    schema: &Schema,
    inference: &CellInference,
) -> IngestionResult<DataSet> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;
    ingest_csv_from_reader(&mut rdr, schema, inference)
}

/// Ingest CSV data from an existing CSV reader.
///
/// Loading is all-or-nothing: the first declared cell that fails to parse ends the load with
/// [`IngestionError::ParseError`], so [`crate::aggregate::OnMalformed::Skip`] never sees it. Use a
/// [`CsvSource`] to have such rows skipped instead.
pub fn ingest_csv_from_reader<R: Read>(
    rdr: &mut csv::Reader<R>,
    schema: &Schema,
    inference: &CellInference,
) -> IngestionResult<DataSet> {
    let parser = RowParser::from_headers(rdr.headers()?, schema, inference.clone())?;

    let mut records = Vec::new();
    let mut raw = csv::StringRecord::new();
    while rdr.read_record(&mut raw)? {
        records.push(parser.parse(&raw)?);
    }

    Ok(DataSet::new(parser.header, records))
}

/// Maps raw CSV rows onto typed [`Record`]s for one header.
#[derive(Debug, Clone)]
struct RowParser {
    header: Arc<Header>,
    declared: Vec<Option<DataType>>,
    inference: CellInference,
}

impl RowParser {
    fn from_headers(
        headers: &csv::StringRecord,
        schema: &Schema,
        inference: CellInference,
    ) -> IngestionResult<Self> {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_owned()).collect();

        for field in &schema.fields {
            if !names.iter().any(|n| *n == field.name) {
                return Err(IngestionError::SchemaMismatch {
                    message: format!(
                        "missing declared column '{field}'. headers={names:?}",
                        field = field.name
                    ),
                });
            }
        }

        let declared = names.iter().map(|n| schema.data_type_of(n)).collect();
        Ok(Self {
            header: Arc::new(Header::new(names)),
            declared,
            inference,
        })
    }

    fn parse(&self, raw: &csv::StringRecord) -> IngestionResult<Record> {
        let line = start_line(raw);
        let mut values = Vec::with_capacity(self.header.len());
        for (idx, cell) in raw.iter().enumerate() {
            let value = match self.declared.get(idx).copied().flatten() {
                Some(data_type) => self.inference.parse_declared(
                    line,
                    &self.header.names()[idx],
                    data_type,
                    cell,
                )?,
                None => self.inference.infer(cell),
            };
            values.push(value);
        }
        Ok(Record::new(line, Arc::clone(&self.header), values))
    }
}

/// Line on which `raw` starts; quoted fields may span several lines.
fn start_line(raw: &csv::StringRecord) -> usize {
    raw.position().map_or(0, |pos| pos.line() as usize)
}

/// Observer wiring for a [`CsvSource`] opened from a path.
struct SourceObserver {
    observer: Arc<dyn IngestionObserver>,
    ctx: IngestionContext,
    alert_at_or_above: IngestionSeverity,
}

/// A streaming [`RecordSource`] over CSV input.
///
/// Each line is read, typed and handed to the aggregation exactly once; nothing is kept after the
/// pass. Rows whose declared columns fail to parse reach the aggregation as row-level errors, so
/// [`crate::aggregate::OnMalformed`] decides whether they abort the pass.
pub struct CsvSource<R> {
    reader: csv::Reader<R>,
    parser: RowParser,
    observer: Option<SourceObserver>,
}

impl CsvSource<File> {
    /// Open a comma-separated file.
    pub fn from_path(
        path: impl AsRef<Path>,
        schema: &Schema,
        inference: &CellInference,
    ) -> IngestionResult<Self> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(path)?;
        Self::from_reader(reader, schema, inference)
    }
}

impl<R: Read> CsvSource<R> {
    /// Wrap an existing CSV reader. The header row is read immediately.
    pub fn from_reader(
        mut reader: csv::Reader<R>,
        schema: &Schema,
        inference: &CellInference,
    ) -> IngestionResult<Self> {
        let parser = RowParser::from_headers(reader.headers()?, schema, inference.clone())?;
        Ok(Self {
            reader,
            parser,
            observer: None,
        })
    }

    /// Report the outcome of the pass to `observer` once it ends.
    pub fn with_observer(
        mut self,
        observer: Arc<dyn IngestionObserver>,
        ctx: IngestionContext,
        alert_at_or_above: IngestionSeverity,
    ) -> Self {
        self.observer = Some(SourceObserver {
            observer,
            ctx,
            alert_at_or_above,
        });
        self
    }

    fn stream(&mut self, visit: &mut RecordVisitor<'_>, rows: &mut usize) -> AggregateResult<()> {
        let mut raw = csv::StringRecord::new();
        while self
            .reader
            .read_record(&mut raw)
            .map_err(IngestionError::from)?
        {
            *rows += 1;
            match self.parser.parse(&raw) {
                Ok(record) => visit(Ok(&record))?,
                Err(e) => visit(Err(e))?,
            }
        }
        Ok(())
    }
}

impl<R: Read> RecordSource for CsvSource<R> {
    fn header(&self) -> Arc<Header> {
        Arc::clone(&self.parser.header)
    }

    fn for_each_record(mut self, visit: &mut RecordVisitor<'_>) -> AggregateResult<()> {
        let mut rows = 0;
        let result = self.stream(visit, &mut rows);

        if let Some(hook) = &self.observer {
            match &result {
                Ok(()) => notify_outcome(
                    hook.observer.as_ref(),
                    &hook.ctx,
                    hook.alert_at_or_above,
                    Ok(rows),
                ),
                Err(AggregateError::Ingestion(e)) => notify_outcome(
                    hook.observer.as_ref(),
                    &hook.ctx,
                    hook.alert_at_or_above,
                    Err(e),
                ),
                // The file read fine up to here; the aggregation stopped the pass.
                Err(_) => hook.observer.on_success(
                    &hook.ctx,
                    IngestionStats {
                        rows,
                        complete: false,
                    },
                ),
            }
        }

        result
    }
}
