//! Ingestion outcome reporting.
//!
//! Observers receive one callback per ingestion: success with row stats, or failure with a
//! severity; failures at or above a threshold also raise an alert.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::IngestionError;

use super::unified::IngestionFormat;

/// How bad a failed ingestion is. Ordered, so it doubles as an alert threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionSeverity {
    /// The file was reachable but its contents were rejected.
    Error,
    /// The file could not be opened or read.
    Critical,
}

/// Which file was ingested, and as what.
#[derive(Debug, Clone)]
pub struct IngestionContext {
    pub path: PathBuf,
    pub format: IngestionFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionStats {
    /// Data rows read, header excluded.
    pub rows: usize,
    /// `false` when a streaming pass was stopped before the end of the file.
    pub complete: bool,
}

impl fmt::Display for IngestionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rows={}", self.rows)?;
        if !self.complete {
            f.write_str(" partial")?;
        }
        Ok(())
    }
}

/// Receives ingestion outcomes. Every callback defaults to doing nothing.
pub trait IngestionObserver: Send + Sync {
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &IngestionError) {}

    /// A failure at or above the configured threshold; reported as a plain failure unless
    /// overridden.
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.on_failure(ctx, severity, error)
    }
}

/// Forwards every callback to each wrapped observer in order.
#[derive(Default)]
pub struct CompositeObserver(Vec<Arc<dyn IngestionObserver>>);

impl CompositeObserver {
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self(observers)
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CompositeObserver({} observers)", self.0.len())
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.0.iter().for_each(|o| o.on_success(ctx, stats));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.0.iter().for_each(|o| o.on_failure(ctx, severity, error));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.0.iter().for_each(|o| o.on_alert(ctx, severity, error));
    }
}

/// Severity of an ingestion failure: I/O problems are critical, everything else is an error.
pub fn severity_for_error(e: &IngestionError) -> IngestionSeverity {
    match e {
        IngestionError::Io(_) => IngestionSeverity::Critical,
        IngestionError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => IngestionSeverity::Critical,
            _ => IngestionSeverity::Error,
        },
        IngestionError::SchemaMismatch { .. } | IngestionError::ParseError { .. } => {
            IngestionSeverity::Error
        }
    }
}

/// Forward an ingestion outcome (rows read, or the error) to `observer`.
pub(crate) fn notify_outcome(
    observer: &dyn IngestionObserver,
    ctx: &IngestionContext,
    alert_at_or_above: IngestionSeverity,
    outcome: Result<usize, &IngestionError>,
) {
    match outcome {
        Ok(rows) => observer.on_success(ctx, IngestionStats { rows, complete: true }),
        Err(e) => {
            let sev = severity_for_error(e);
            observer.on_failure(ctx, sev, e);
            if sev >= alert_at_or_above {
                observer.on_alert(ctx, sev, e);
            }
        }
    }
}

/// One observer callback, rendered as a single `key=value` log line.
fn render_line(
    ctx: &IngestionContext,
    status: &str,
    severity: Option<IngestionSeverity>,
    detail: &str,
) -> String {
    let mut line = format!("{status} format={:?} path={}", ctx.format, ctx.path.display());
    if let Some(sev) = severity {
        line.push_str(&format!(" severity={sev:?}"));
    }
    line.push(' ');
    line.push_str(detail);
    line
}

/// Logs ingestion events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl IngestionObserver for StdErrObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        eprintln!(
            "[stops] {}",
            render_line(ctx, "ok", None, &stats.to_string())
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        eprintln!(
            "[stops] {}",
            render_line(ctx, "fail", Some(severity), &format!("err={error}"))
        );
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        eprintln!(
            "[ALERT][stops] {}",
            render_line(ctx, "fail", Some(severity), &format!("err={error}"))
        );
    }
}

/// Appends ingestion events to a local log file, one timestamped line per event.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Log lines that cannot be written are dropped.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn write(&self, line: &str) {
        let _held = self.lock.lock();
        let opened = OpenOptions::new().create(true).append(true).open(&self.path);
        if let Ok(mut file) = opened {
            let _ = writeln!(file, "{} {line}", unix_ts());
        }
    }
}

impl IngestionObserver for FileObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.write(&render_line(ctx, "ok", None, &stats.to_string()));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.write(&render_line(ctx, "fail", Some(severity), &format!("err={error}")));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.write(&render_line(ctx, "ALERT", Some(severity), &format!("err={error}")));
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{
        FileObserver, IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats,
        notify_outcome,
    };
    use crate::error::IngestionError;
    use crate::ingestion::IngestionFormat;

    fn ctx() -> IngestionContext {
        IngestionContext {
            path: PathBuf::from("il_chicago.csv"),
            format: IngestionFormat::Csv,
        }
    }

    #[test]
    fn file_observer_appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ingest.log");
        let obs = FileObserver::new(&log);

        obs.on_success(&ctx(), IngestionStats { rows: 12, complete: true });
        obs.on_success(&ctx(), IngestionStats { rows: 4, complete: false });
        let err = IngestionError::SchemaMismatch {
            message: "missing declared column 'date'".to_string(),
        };
        notify_outcome(&obs, &ctx(), IngestionSeverity::Error, Err(&err));

        let text = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with("ok format=Csv path=il_chicago.csv rows=12"));
        assert!(lines[1].ends_with("rows=4 partial"));
        assert!(lines[2].contains("fail"));
        assert!(lines[2].contains("severity=Error"));
        assert!(lines[3].contains("ALERT"));
        assert!(lines[3].contains("missing declared column 'date'"));
    }

    #[test]
    fn io_errors_are_critical() {
        let err = IngestionError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(super::severity_for_error(&err), IngestionSeverity::Critical);
    }
}
