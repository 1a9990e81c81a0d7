mod fixtures;

use fixtures::*;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::process::Command;
use tempfile::tempdir;

const EXPECTED_TABLE: &str = "TimeCreated\tProvider\tEventID\tLevel
2019-02-04 14:13:52.105862 UTC\tEventLog\t6005\tInformational
2019-02-04 14:13:53.500000 UTC\t\t\t
2019-02-04 14:13:55.000000 UTC\tService Control Manager\t7036\tInformational
2019-02-04 14:14:01.250000 UTC\tdisk\t11\tError
";

#[test]
fn it_prints_a_sorted_table() {
    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_table"));
    cmd.arg(jsonl_sample());

    cmd.assert().success().stdout(EXPECTED_TABLE);
}

#[test]
fn it_prints_the_same_table_with_prefetch() {
    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_table"));
    cmd.args(["--prefetch", "-t", "2"]).arg(jsonl_sample());

    cmd.assert().success().stdout(EXPECTED_TABLE);
}

#[test]
fn it_respects_row_ranges() {
    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_table"));
    cmd.args(["--rows", "2..3"]).arg(jsonl_sample());

    cmd.assert().success().stdout(
        "TimeCreated\tProvider\tEventID\tLevel
2019-02-04 14:13:55.000000 UTC\tService Control Manager\t7036\tInformational
",
    );
}

#[test]
fn it_reports_failed_cells_in_jsonl() {
    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_table"));
    cmd.args(["-o", "jsonl", "--rows", "..2"]).arg(jsonl_sample());

    let output = cmd.output().unwrap();
    assert!(output.status.success());

    let lines: Vec<serde_json::Value> = String::from_utf8(output.stdout)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["event_record_id"], 1);
    assert_eq!(lines[0]["EventID"], "6005");
    assert!(lines[0].get("errors").is_none());

    assert_eq!(lines[1]["event_record_id"], 2);
    assert_eq!(lines[1]["TimeCreated"], "2019-02-04 14:13:53.500000 UTC");
    assert!(lines[1]["Provider"].is_null());
    assert_eq!(lines[1]["errors"].as_array().unwrap().len(), 3);
}

#[test]
fn it_keeps_log_output_off_stdout() {
    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_table"));
    cmd.args(["-vv", "--prefetch"]).arg(jsonl_sample());

    cmd.assert()
        .success()
        .stdout(EXPECTED_TABLE)
        .stderr(predicate::str::contains("indexed 4 records"));
}

#[test]
fn it_reads_records_from_stdin() {
    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_table"));
    cmd.arg("-").stdin(File::open(jsonl_sample()).unwrap());

    cmd.assert().success().stdout(EXPECTED_TABLE);
}

#[test]
fn it_respects_directory_output() {
    let d = tempdir().unwrap();
    let f = d.as_ref().join("nested").join("test.out");

    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_table"));
    cmd.args(["-f", &f.to_string_lossy()]).arg(jsonl_sample());

    assert!(
        cmd.output().unwrap().stdout.is_empty(),
        "Expected output to be printed to file, but was printed to stdout"
    );

    let mut written = String::new();
    File::open(&f)
        .unwrap()
        .read_to_string(&mut written)
        .unwrap();
    assert_eq!(written, EXPECTED_TABLE);
}

#[test]
fn test_it_refuses_to_overwrite_directory() {
    let d = tempdir().unwrap();

    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_table"));
    cmd.args(["-f", &d.path().to_string_lossy()])
        .arg(jsonl_sample());

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("refusing to overwrite"));
}

#[test]
fn test_it_overwrites_file_anyways_if_passed_flag() {
    let d = tempdir().unwrap();
    let f = d.as_ref().join("test.out");

    let mut file = File::create(&f).unwrap();
    file.write_all(b"I'm a file!").unwrap();

    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_table"));
    cmd.args(["-f", &f.to_string_lossy(), "--no-confirm-overwrite"])
        .arg(jsonl_sample());

    cmd.assert().success();

    assert_eq!(fs::read_to_string(&f).unwrap(), EXPECTED_TABLE);
}

#[test]
fn test_it_fails_on_invalid_json_lines() {
    let d = tempdir().unwrap();
    let f = d.as_ref().join("broken.jsonl");
    fs::write(&f, "{\"event_record_id\": 1}\n").unwrap();

    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_table"));
    cmd.arg(&f);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Line 1"));
}

#[test]
fn test_it_fails_on_missing_evtx_input() {
    let d = tempdir().unwrap();

    let mut cmd = Command::new(assert_cmd::cargo_bin!("evtx_table"));
    cmd.arg(d.as_ref().join("missing.evtx"));

    cmd.assert().failure().code(1);
}
