use assert_cmd::assert::OutputAssertExt;
use predicates::prelude::*;
use std::process::Command;

fn stop_report() -> Command {
    Command::new(env!("CARGO_BIN_EXE_stop-report"))
}

#[test]
fn text_report_for_one_file() {
    stop_report()
        .arg("tests/fixtures/stops_sample.csv")
        .assert()
        .success()
        .stdout(predicate::str::contains("== stops_sample (10 rows) =="))
        .stdout(predicate::str::contains("Outcomes: [arrest, citation, warning]"))
        .stdout(predicate::str::contains("Arrests per year (2011 < year < 2017): 2013=2, 2015=1"));
}

#[test]
fn json_report_uses_given_names() {
    let output = stop_report()
        .args([
            "--format",
            "json",
            "--name",
            "chicago",
            "tests/fixtures/stops_sample.csv",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());

    let reports: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(reports[0]["name"], "chicago");
    assert_eq!(reports[0]["race"]["counts"]["black"], 3);
    assert_eq!(reports[0]["age"]["median"], 31.5);
}

#[test]
fn malformed_rows_fail_unless_skipped() {
    stop_report()
        .arg("tests/fixtures/stops_malformed.csv")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to aggregate"))
        .stderr(predicate::str::contains("column 'officer_years_of_service'"));

    stop_report()
        .args(["--skip-malformed", "tests/fixtures/stops_malformed.csv"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Missing race by officer years of service: 6-10=1"));
}

#[test]
fn custom_missing_markers() {
    // With only "UNKNOWN" as a marker, "NA" is ordinary text; the "NA" clock time is then malformed.
    stop_report()
        .args([
            "--missing",
            "UNKNOWN",
            "--skip-malformed",
            "tests/fixtures/stops_sample.csv",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("NA=3"));
}

#[test]
fn log_file_records_ingestion() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("stops.log");

    stop_report()
        .arg("--log-file")
        .arg(&log)
        .arg("tests/fixtures/stops_sample.csv")
        .assert()
        .success();

    let text = std::fs::read_to_string(&log).unwrap();
    assert!(text.contains("rows=10"));
}

#[test]
fn missing_file_is_an_error() {
    stop_report()
        .arg("tests/fixtures/does_not_exist.csv")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read"));
}

#[test]
fn too_many_names_is_an_error() {
    stop_report()
        .args(["--name", "a", "--name", "b", "tests/fixtures/stops_sample.csv"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("2 names given for 1 files"));
}
