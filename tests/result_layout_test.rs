//! Result-directory layout tests: header/param files, per-run CSV discovery,
//! and the `result.csv` / `concat.csv` re-materialization contract.

use std::fs;

use ccsweep::store::{ResultTable, Value};
use ccsweep::Error;

fn write_result_dir(dir: &std::path::Path) {
    fs::write(dir.join("header"), "protocol,contention,Core,TotalTime\n").unwrap();
    fs::write(dir.join("compile_params"), "protocol\n").unwrap();
    fs::write(dir.join("runtime_params"), "protocol,contention\n").unwrap();
    fs::write(dir.join("b.csv"), "serval,0.5,0,30\n").unwrap();
    fs::write(dir.join("a.csv"), "caracal,0.5,0,100\ncaracal,0.5,1,50\n").unwrap();
}

#[test]
fn ingest_concatenates_all_run_files() {
    let dir = tempfile::tempdir().unwrap();
    write_result_dir(dir.path());

    let header = ResultTable::read_params(&dir.path().join("header")).unwrap();
    assert_eq!(header, ["protocol", "contention", "Core", "TotalTime"]);

    let files = ResultTable::discover_csv(dir.path()).unwrap();
    assert_eq!(files.len(), 2);

    let table = ResultTable::ingest(&files, &header).unwrap();
    assert_eq!(table.num_rows(), 3);
    assert_eq!(table.columns(), header);
}

#[test]
fn concat_csv_gets_the_header_prepended() {
    let dir = tempfile::tempdir().unwrap();
    write_result_dir(dir.path());

    let header = ResultTable::read_params(&dir.path().join("header")).unwrap();
    let files = ResultTable::discover_csv(dir.path()).unwrap();
    let table = ResultTable::ingest(&files, &header).unwrap();
    table.write_concat(dir.path()).unwrap();

    let result = fs::read_to_string(dir.path().join("result.csv")).unwrap();
    let concat = fs::read_to_string(dir.path().join("concat.csv")).unwrap();
    assert_eq!(result.lines().count(), 3);
    assert_eq!(concat.lines().count(), 4);
    assert_eq!(
        concat.lines().next().unwrap(),
        "protocol,contention,Core,TotalTime"
    );
    assert!(result.lines().all(|line| concat.contains(line)));

    // Re-materialized files are not picked up as per-run output.
    let files = ResultTable::discover_csv(dir.path()).unwrap();
    assert_eq!(files.len(), 2);
}

#[test]
fn ingest_names_the_misaligned_file() {
    let dir = tempfile::tempdir().unwrap();
    write_result_dir(dir.path());
    fs::write(dir.path().join("c.csv"), "caracal,0.5,0\n").unwrap();

    let header = ResultTable::read_params(&dir.path().join("header")).unwrap();
    let files = ResultTable::discover_csv(dir.path()).unwrap();
    let err = ResultTable::ingest(&files, &header).unwrap_err();
    match err {
        Error::Ingest(msg) => {
            assert!(msg.contains("c.csv"), "message should name the file: {msg}");
            assert!(msg.contains("3"));
            assert!(msg.contains("4"));
        }
        other => panic!("expected Ingest error, got {other}"),
    }
}

#[test]
fn ingest_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.csv");
    let err = ResultTable::ingest(&[&missing], &["a".to_string()]).unwrap_err();
    match err {
        Error::Ingest(msg) => assert!(msg.contains("nope.csv")),
        other => panic!("expected Ingest error, got {other}"),
    }
}

#[test]
fn read_params_reports_missing_and_empty_files() {
    let dir = tempfile::tempdir().unwrap();
    let err = ResultTable::read_params(&dir.path().join("header")).unwrap_err();
    assert!(matches!(err, Error::Ingest(_)));

    fs::write(dir.path().join("empty"), "\n").unwrap();
    let err = ResultTable::read_params(&dir.path().join("empty")).unwrap_err();
    assert!(matches!(err, Error::Ingest(_)));
}

#[test]
fn split_by_protocol_then_group_matches_per_protocol_totals() {
    let dir = tempfile::tempdir().unwrap();
    write_result_dir(dir.path());

    let header = ResultTable::read_params(&dir.path().join("header")).unwrap();
    let runtime = ResultTable::read_params(&dir.path().join("runtime_params")).unwrap();
    let files = ResultTable::discover_csv(dir.path()).unwrap();
    let table = ResultTable::ingest(&files, &header).unwrap();

    let caracal = table.select_by("protocol", "caracal").unwrap();
    assert_eq!(caracal.num_rows(), 2);
    let grouped = caracal.group_and_sum(&runtime).unwrap();
    assert_eq!(grouped.num_rows(), 1);
    assert_eq!(grouped.rows()[0][3], Value::Num(150.0));
}
