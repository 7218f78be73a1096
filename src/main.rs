use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};

use stop_aggregator::aggregate::{AggregateOptions, OnMalformed, RowAggregator};
use stop_aggregator::execution::{ExecutionObserver, StdErrExecutionObserver};
use stop_aggregator::ingestion::{
    CellInference, CompositeObserver, FileObserver, IngestionObserver, IngestionOptions, StdErrObserver,
    ingest_from_path,
};
use stop_aggregator::report::CityReport;
use stop_aggregator::types::Schema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Descriptive statistics for Stanford Open Policing traffic-stop files.
#[derive(Parser, Debug)]
#[command(name = "stop-report", version, about)]
struct Args {
    /// CSV or TSV stop files, one report per file
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Report label, one per file in order (defaults to the file stem)
    #[arg(long)]
    name: Vec<String>,

    /// Leave out rows with malformed values instead of failing
    #[arg(long)]
    skip_malformed: bool,

    /// Raw cell text read as a missing value (replaces the defaults "NA" and "")
    #[arg(long = "missing", value_name = "MARKER")]
    missing: Vec<String>,

    /// Append ingestion events to this file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log ingestion and aggregation events to stderr
    #[arg(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    if args.name.len() > args.files.len() {
        bail!(
            "{} names given for {} files",
            args.name.len(),
            args.files.len()
        );
    }

    let options = ingestion_options(&args);
    let mut aggregator = RowAggregator::new(AggregateOptions {
        on_malformed: if args.skip_malformed {
            OnMalformed::Skip
        } else {
            OnMalformed::Abort
        },
    });
    if args.verbose {
        let observer: Arc<dyn ExecutionObserver> = Arc::new(StdErrExecutionObserver::default());
        aggregator = aggregator.with_observer(observer);
    }

    let schema = Schema::default();
    let mut reports = Vec::with_capacity(args.files.len());
    for (i, path) in args.files.iter().enumerate() {
        let name = match args.name.get(i) {
            Some(name) => name.clone(),
            None => file_label(path),
        };
        let dataset = ingest_from_path(path, &schema, &options)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let report = CityReport::build(name, &dataset, &aggregator)
            .with_context(|| format!("failed to aggregate {}", path.display()))?;
        reports.push(report);
    }

    match args.format {
        OutputFormat::Text => {
            for (i, report) in reports.iter().enumerate() {
                if i > 0 {
                    println!();
                }
                print!("{report}");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
    }
    Ok(())
}

fn ingestion_options(args: &Args) -> IngestionOptions {
    let mut observers: Vec<Arc<dyn IngestionObserver>> = Vec::new();
    if args.verbose {
        observers.push(Arc::new(StdErrObserver));
    }
    if let Some(path) = &args.log_file {
        observers.push(Arc::new(FileObserver::new(path)));
    }

    IngestionOptions {
        inference: if args.missing.is_empty() {
            CellInference::default()
        } else {
            CellInference::with_missing_markers(&args.missing)
        },
        observer: match observers.len() {
            0 => None,
            1 => observers.pop(),
            _ => Some(Arc::new(CompositeObserver::new(observers))),
        },
        ..IngestionOptions::default()
    }
}

fn file_label(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
