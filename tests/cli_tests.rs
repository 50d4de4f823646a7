//! Integration tests for CLI

use assert_cmd::Command;
use predicates::prelude::*;
use rust_xlsxwriter::Workbook;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_template(path: &Path) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    let headers = ["SEMT ID", "Property City", "HOA", "HOA Monthly Payment"];
    for (col, header) in headers.iter().enumerate() {
        sheet.write_string(0, col as u16, *header).unwrap();
    }
    workbook.save(path).unwrap();
}

/// Tape, template, one vendor file, and a config pointing at them
fn fixture(tmp: &TempDir) -> PathBuf {
    let tape = tmp.path().join("tape.csv");
    fs::write(&tape, "Loan Number,Property City\nL-1,Austin\nL-2,Dallas\n").unwrap();
    let vendor = tmp.path().join("vendor.csv");
    fs::write(&vendor, "Loan Number,Monthly Dues\nL1,125\n").unwrap();
    let template = tmp.path().join("template.xlsx");
    write_template(&template);

    let config = tmp.path().join("config.json");
    let json = serde_json::json!({
        "tape_path": tape,
        "template_path": template,
        "output_path": tmp.path().join("out/report.xlsx"),
        "vendors": [
            { "name": "acme", "type": "example_vendor", "path": vendor }
        ]
    });
    fs::write(&config, json.to_string()).unwrap();
    config
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("hoa-report"));
    cmd.arg("--help");
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--vendor-path"));
}

#[test]
fn test_cli_requires_config() {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("hoa-report"));
    cmd.assert().failure().code(2);
}

#[test]
fn test_end_to_end_run() {
    let tmp = TempDir::new().unwrap();
    let config = fixture(&tmp);

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("hoa-report"));
    cmd.arg("--config").arg(&config);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Input path validation: OK"))
        .stdout(predicate::str::contains("Output written to:"))
        .stdout(predicate::str::contains("- Tape Rows: 2"))
        .stdout(predicate::str::contains("- Match Rate: 50.00%"));

    assert!(tmp.path().join("out/report.xlsx").exists());
}

#[test]
fn test_end_to_end_with_overrides() {
    let tmp = TempDir::new().unwrap();
    let config = fixture(&tmp);
    let other_vendor = tmp.path().join("other.csv");
    fs::write(&other_vendor, "Loan Number,Monthly Dues\nL1,10\nL2,20\n").unwrap();
    let out = tmp.path().join("override.xlsx");

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("hoa-report"));
    cmd.arg("--config")
        .arg(&config)
        .arg("--vendor-path")
        .arg(&other_vendor)
        .arg("--vendor-type")
        .arg("example_vendor")
        .arg("--out")
        .arg(&out);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("- Matched Loan IDs: 2"))
        .stdout(predicate::str::contains("- Match Rate: 100.00%"));

    assert!(out.exists());
}

#[test]
fn test_missing_override_path_exits_2() {
    let tmp = TempDir::new().unwrap();
    let config = fixture(&tmp);

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("hoa-report"));
    cmd.arg("--config")
        .arg(&config)
        .arg("--vendor-path")
        .arg(tmp.path().join("nope.xlsx"));
    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("do not exist"))
        .stderr(predicate::str::contains("nope.xlsx"));
}

#[test]
fn test_unknown_vendor_type_exits_2() {
    let tmp = TempDir::new().unwrap();
    let config = fixture(&tmp);

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("hoa-report"));
    cmd.arg("--config").arg(&config).arg("--vendor-type").arg("acme");
    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Unknown vendor extractor 'acme'"));
}

#[test]
fn test_bad_sql_connection_string_exits_2() {
    let tmp = TempDir::new().unwrap();
    let config = fixture(&tmp);
    let query = tmp.path().join("query.sql");
    fs::write(&query, "SELECT loan_id FROM loans WHERE loan_id IN rarray(:tape_loan_ids)").unwrap();

    let mut json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&config).unwrap()).unwrap();
    json["run_sql"] = serde_json::json!(true);
    json["sql"] = serde_json::json!({
        "connection_string": "mssql+pyodbc://user@host/db",
        "query_path": query,
    });
    fs::write(&config, json.to_string()).unwrap();

    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("hoa-report"));
    cmd.arg("--config").arg(&config);
    cmd.assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Unsupported SQL connection string scheme"));
}
