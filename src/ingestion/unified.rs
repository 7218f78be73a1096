//! Unified ingestion entrypoints.
//!
//! - [`ingest_from_path`] reads a whole file into a [`DataSet`].
//! - [`open_source`] opens a file as a streaming [`CsvSource`] for a single aggregation pass.
//!
//! If [`IngestionOptions::format`] is `None`, the delimiter is inferred from the file extension.
//! If an [`IngestionObserver`] is provided, success/failure/alerts are reported to it.

use std::fmt;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{DataSet, Schema};

use super::csv::{CsvSource, ingest_csv_from_reader};
use super::infer::CellInference;
use super::observability::{IngestionContext, IngestionObserver, IngestionSeverity, notify_outcome};

/// Delimiter flavour of a stops file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionFormat {
    Csv,
    Tsv,
}

impl IngestionFormat {
    /// `csv`, `tsv` or `tab`, in any case.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Csv),
            "tsv" | "tab" => Some(Self::Tsv),
            _ => None,
        }
    }

    pub fn delimiter(self) -> u8 {
        match self {
            Self::Csv => b',',
            Self::Tsv => b'\t',
        }
    }
}

/// How to open and type a stops file. The default infers the delimiter from the extension,
/// treats `NA` and empty cells as missing, and reports to nobody.
#[derive(Clone)]
pub struct IngestionOptions {
    /// Forces a delimiter instead of going by the extension.
    pub format: Option<IngestionFormat>,
    pub inference: CellInference,
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Failures this severe or worse also go to [`IngestionObserver::on_alert`].
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for IngestionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionOptions")
            .field("format", &self.format)
            .field("inference", &self.inference)
            .field("has_observer", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            format: None,
            inference: CellInference::default(),
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

/// Read a delimited file into an in-memory [`DataSet`].
///
/// The configured observer, if any, hears about the outcome once the whole file is read.
///
/// A declared column that fails to parse fails the whole load; see [`open_source`] for a pass
/// that leaves the decision to [`crate::aggregate::OnMalformed`].
///
/// # Examples
///
/// ```no_run
/// use stop_aggregator::ingestion::{ingest_from_path, IngestionOptions};
/// use stop_aggregator::types::Schema;
///
/// # fn main() -> Result<(), stop_aggregator::IngestionError> {
/// // Uses `.csv` to select the comma delimiter; every column is inferred.
/// let ds = ingest_from_path("il_chicago_2020_04_01.csv", &Schema::default(), &IngestionOptions::default())?;
/// assert!(ds.row_count() > 0);
/// # Ok(())
/// # }
/// ```
pub fn ingest_from_path(
    path: impl AsRef<Path>,
    schema: &Schema,
    options: &IngestionOptions,
) -> IngestionResult<DataSet> {
    let path = path.as_ref();
    let fmt = resolve_format(path, options)?;
    let ctx = IngestionContext { path: path.to_path_buf(), format: fmt };

    let result = reader_for(path, fmt)
        .and_then(|mut rdr| ingest_csv_from_reader(&mut rdr, schema, &options.inference));

    if let Some(obs) = &options.observer {
        notify_outcome(
            obs.as_ref(),
            &ctx,
            options.alert_at_or_above,
            result.as_ref().map(DataSet::row_count),
        );
    }

    result
}

/// Open a delimited file as a streaming [`CsvSource`].
///
/// The header is read (and declared columns are checked) immediately. A configured observer is
/// notified when the aggregation pass over the source ends, or right away if opening fails.
pub fn open_source(
    path: impl AsRef<Path>,
    schema: &Schema,
    options: &IngestionOptions,
) -> IngestionResult<CsvSource<File>> {
    let path = path.as_ref();
    let fmt = resolve_format(path, options)?;
    let ctx = IngestionContext { path: path.to_path_buf(), format: fmt };

    let source = reader_for(path, fmt)
        .and_then(|rdr| CsvSource::from_reader(rdr, schema, &options.inference));

    match (source, options.observer.as_ref()) {
        (Ok(source), Some(obs)) => {
            Ok(source.with_observer(Arc::clone(obs), ctx, options.alert_at_or_above))
        }
        (Ok(source), None) => Ok(source),
        (Err(e), Some(obs)) => {
            notify_outcome(obs.as_ref(), &ctx, options.alert_at_or_above, Err(&e));
            Err(e)
        }
        (Err(e), None) => Err(e),
    }
}

fn reader_for(path: &Path, fmt: IngestionFormat) -> IngestionResult<csv::Reader<File>> {
    Ok(csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(fmt.delimiter())
        .from_path(path)?)
}

fn resolve_format(path: &Path, options: &IngestionOptions) -> IngestionResult<IngestionFormat> {
    if let Some(f) = options.format {
        return Ok(f);
    }
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or_default();
    IngestionFormat::from_extension(ext).ok_or_else(|| IngestionError::SchemaMismatch {
        message: format!(
            "{}: unrecognized extension {ext:?}, expected csv or tsv",
            path.display()
        ),
    })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{IngestionFormat, IngestionOptions, resolve_format};
    use crate::error::IngestionError;

    #[test]
    fn unknown_extension_is_rejected() {
        let err = resolve_format(Path::new("stops.parquet"), &IngestionOptions::default()).unwrap_err();
        assert!(matches!(err, IngestionError::SchemaMismatch { .. }));
        assert!(err.to_string().contains("stops.parquet"));

        let forced = IngestionOptions {
            format: Some(IngestionFormat::Tsv),
            ..IngestionOptions::default()
        };
        assert_eq!(resolve_format(Path::new("stops"), &forced).unwrap(), IngestionFormat::Tsv);
    }

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(IngestionFormat::from_extension("CSV"), Some(IngestionFormat::Csv));
        assert_eq!(IngestionFormat::from_extension("tsv"), Some(IngestionFormat::Tsv));
        assert_eq!(IngestionFormat::from_extension("parquet"), None);
        assert_eq!(IngestionFormat::Tsv.delimiter(), b'\t');
    }
}
