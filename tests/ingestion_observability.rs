use std::sync::{Arc, Mutex};

use stop_aggregator::aggregate::{KeySelector, RangeBuckets, RowAggregator};
use stop_aggregator::ingestion::{
    CompositeObserver, FileObserver, IngestionContext, IngestionFormat, IngestionObserver,
    IngestionOptions, IngestionSeverity, IngestionStats, ingest_from_path, open_source,
};
use stop_aggregator::types::{DataType, Field, Schema};
use stop_aggregator::IngestionError;

#[derive(Default)]
struct Outcomes {
    succeeded: Mutex<Vec<usize>>,
    partial: Mutex<Vec<usize>>,
    failed: Mutex<Vec<IngestionSeverity>>,
    alerted: Mutex<Vec<IngestionSeverity>>,
}

impl IngestionObserver for Outcomes {
    fn on_success(&self, _ctx: &IngestionContext, stats: IngestionStats) {
        if stats.complete {
            self.succeeded.lock().unwrap().push(stats.rows);
        } else {
            self.partial.lock().unwrap().push(stats.rows);
        }
    }

    fn on_failure(&self, _ctx: &IngestionContext, severity: IngestionSeverity, _error: &IngestionError) {
        self.failed.lock().unwrap().push(severity);
    }

    fn on_alert(&self, _ctx: &IngestionContext, severity: IngestionSeverity, _error: &IngestionError) {
        self.alerted.lock().unwrap().push(severity);
    }
}

fn reporting_to(obs: &Arc<Outcomes>, alert_at_or_above: IngestionSeverity) -> IngestionOptions {
    IngestionOptions {
        format: Some(IngestionFormat::Csv),
        observer: Some(obs.clone()),
        alert_at_or_above,
        ..Default::default()
    }
}

fn schema_requiring_absent_column() -> Schema {
    Schema::new(vec![Field::new("search_basis", DataType::Utf8)])
}

#[test]
fn unreadable_file_is_a_critical_alert() {
    let obs = Arc::new(Outcomes::default());
    let opts = reporting_to(&obs, IngestionSeverity::Critical);

    assert!(ingest_from_path("tests/fixtures/does_not_exist.csv", &Schema::default(), &opts).is_err());

    assert_eq!(*obs.failed.lock().unwrap(), vec![IngestionSeverity::Critical]);
    assert_eq!(*obs.alerted.lock().unwrap(), vec![IngestionSeverity::Critical]);
}

#[test]
fn schema_mismatch_fails_below_the_default_alert_level() {
    let obs = Arc::new(Outcomes::default());
    let opts = reporting_to(&obs, IngestionSeverity::Critical);

    assert!(ingest_from_path("tests/fixtures/stops_sample.csv", &schema_requiring_absent_column(), &opts).is_err());

    assert_eq!(*obs.failed.lock().unwrap(), vec![IngestionSeverity::Error]);
    assert!(obs.alerted.lock().unwrap().is_empty());
}

#[test]
fn alert_threshold_can_be_lowered() {
    let obs = Arc::new(Outcomes::default());
    let opts = reporting_to(&obs, IngestionSeverity::Error);

    assert!(ingest_from_path("tests/fixtures/stops_sample.csv", &schema_requiring_absent_column(), &opts).is_err());

    assert_eq!(*obs.alerted.lock().unwrap(), vec![IngestionSeverity::Error]);
}

#[test]
fn success_reports_rows_read() {
    let obs = Arc::new(Outcomes::default());
    let opts = reporting_to(&obs, IngestionSeverity::Critical);

    let ds = ingest_from_path("tests/fixtures/stops_sample.csv", &Schema::default(), &opts).unwrap();

    assert_eq!(ds.row_count(), 10);
    assert_eq!(*obs.succeeded.lock().unwrap(), vec![10]);
    assert!(obs.failed.lock().unwrap().is_empty());
}

#[test]
fn streaming_source_reports_once_the_pass_ends() {
    let obs = Arc::new(Outcomes::default());
    let opts = reporting_to(&obs, IngestionSeverity::Critical);

    let source = open_source("tests/fixtures/stops_sample.csv", &Schema::default(), &opts).unwrap();
    assert!(obs.succeeded.lock().unwrap().is_empty());

    let _ = RowAggregator::default()
        .count_by(source, &KeySelector::column("subject_sex"))
        .unwrap();
    assert_eq!(*obs.succeeded.lock().unwrap(), vec![10]);
}

#[test]
fn aborted_streaming_pass_reports_rows_read_so_far() {
    let obs = Arc::new(Outcomes::default());
    let opts = reporting_to(&obs, IngestionSeverity::Critical);

    let source = open_source("tests/fixtures/stops_malformed.csv", &Schema::default(), &opts).unwrap();
    assert!(
        RowAggregator::default()
            .bucketed_range_count(source, "officer_years_of_service", &RangeBuckets::years_of_service())
            .is_err()
    );

    assert_eq!(*obs.partial.lock().unwrap(), vec![2]);
    assert!(obs.succeeded.lock().unwrap().is_empty());
    assert!(obs.failed.lock().unwrap().is_empty());
}

#[test]
fn streaming_source_reports_open_failures_immediately() {
    let obs = Arc::new(Outcomes::default());
    let opts = reporting_to(&obs, IngestionSeverity::Critical);

    assert!(open_source("tests/fixtures/does_not_exist.csv", &Schema::default(), &opts).is_err());
    assert_eq!(*obs.failed.lock().unwrap(), vec![IngestionSeverity::Critical]);
}

#[test]
fn composite_observer_fans_out_to_file_log() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("stops.log");
    let recorder = Arc::new(Outcomes::default());
    let observers: Vec<Arc<dyn IngestionObserver>> =
        vec![recorder.clone(), Arc::new(FileObserver::new(&log))];
    let composite = CompositeObserver::new(observers);

    let opts = IngestionOptions {
        observer: Some(Arc::new(composite)),
        ..Default::default()
    };
    let _ = ingest_from_path("tests/fixtures/stops_sample.csv", &Schema::default(), &opts).unwrap();
    assert!(ingest_from_path("tests/fixtures/does_not_exist.csv", &Schema::default(), &opts).is_err());

    assert_eq!(*recorder.succeeded.lock().unwrap(), vec![10]);
    let text = std::fs::read_to_string(&log).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    // success, failure, alert
    assert_eq!(lines.len(), 3);
    assert!(lines[0].contains("rows=10"));
    assert!(lines[1].contains("severity=Critical"));
    assert!(lines[2].contains("ALERT"));
}
