use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

fn events_file(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file
}

#[test]
fn test_replay_happy_path_prints_settlement() {
    let file = events_file(&[
        r#"{"op":"post_require","require":"r1","traveler":"alice","min_budget":3000,"max_budget":6000,"trip_start":"2030-10-10","trip_end":"2030-10-15","group_size":2}"#,
        r#"{"op":"submit_offer","offer":"o1","require":"r1","guide":"bob","total":5000,"valid_until":"2030-10-05"}"#,
        r#"{"op":"accept_offer","offer":"o1","traveler":"alice"}"#,
        r#"{"op":"confirm_payment","offer":"o1"}"#,
        r#"{"op":"confirm_arrival","offer":"o1","traveler":"alice"}"#,
        r#"{"op":"confirm_complete","offer":"o1","traveler":"alice"}"#,
    ]);

    Command::cargo_bin("tripbook")
        .unwrap()
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "offer,status,total,released,refunded,in_escrow",
        ))
        .stdout(predicate::str::contains("o1,trip_completed,5000,5000,0,0"));
}

#[test]
fn test_no_show_deadline_path_through_replay() {
    let file = events_file(&[
        r#"{"op":"post_require","require":"r1","traveler":"alice","min_budget":3000,"max_budget":6000,"trip_start":"2030-10-10","trip_end":"2030-10-15","group_size":2}"#,
        r#"{"op":"submit_offer","offer":"o1","require":"r1","guide":"bob","total":4000,"valid_until":"2030-10-05"}"#,
        r#"{"op":"accept_offer","offer":"o1","traveler":"alice"}"#,
        r#"{"op":"confirm_payment","offer":"o1"}"#,
        r#"{"op":"report_no_show","offer":"o1","guide":"bob"}"#,
        r#"{"op":"advance_time","hours":49}"#,
        r#"{"op":"sweep"}"#,
    ]);

    Command::cargo_bin("tripbook")
        .unwrap()
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "o1,no_show_confirmed,4000,2000,2000,0",
        ));
}

#[test]
fn test_malformed_line_is_reported_and_skipped() {
    let file = events_file(&[
        r#"{"op":"post_require","require":"r1","traveler":"alice","min_budget":3000,"max_budget":6000,"trip_start":"2030-10-10","trip_end":"2030-10-15","group_size":2}"#,
        "this is not json",
        r#"{"op":"submit_offer","offer":"o1","require":"r1","guide":"bob","total":5000,"valid_until":"2030-10-05"}"#,
    ]);

    Command::cargo_bin("tripbook")
        .unwrap()
        .arg(file.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("event rejected"));
}

#[test]
fn test_report_flag_writes_csv_file() {
    let events = events_file(&[
        r#"{"op":"post_require","require":"r1","traveler":"alice","min_budget":3000,"max_budget":6000,"trip_start":"2030-10-10","trip_end":"2030-10-15","group_size":2}"#,
        r#"{"op":"submit_offer","offer":"o1","require":"r1","guide":"bob","total":5000,"valid_until":"2030-10-05"}"#,
        r#"{"op":"accept_offer","offer":"o1","traveler":"alice"}"#,
        r#"{"op":"confirm_payment","offer":"o1"}"#,
    ]);
    let report = NamedTempFile::new().unwrap();

    Command::cargo_bin("tripbook")
        .unwrap()
        .arg(events.path())
        .arg("--report")
        .arg(report.path())
        .assert()
        .success();

    let contents = std::fs::read_to_string(report.path()).unwrap();
    assert!(contents.contains("o1,paid,5000,0,0,5000"));
}

#[test]
fn test_missing_input_file_fails() {
    Command::cargo_bin("tripbook")
        .unwrap()
        .arg("/nonexistent/events.jsonl")
        .assert()
        .failure();
}
