//! Exit codes of `histner convert`.

use std::process::Command;

fn histner() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_histner"));
    command.env("RUST_LOG", "error");
    command
}

const RECORD: &str = r#"{"run_id":"00000000-0000-0000-0000-000000000000","sentence_id":"q#0001","text":"Pieter ging naar Rotterdam.","gold":[{"span":"Rotterdam","label":"E53","start":17,"end":26}],"model":"echo","examples":[],"raw_output":"Pieter ging naar **Rotterdam** (E53 Place).","outcome":{"status":"success","predictions":[{"span":"Rotterdam","label":"E53"}]},"created_at":"2025-01-01T12:00:00Z"}"#;

#[test]
fn test_convert_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("predictions.jsonl");
    let output = dir.path().join("report.html");
    std::fs::write(&input, format!("{RECORD}\nnot json\n")).unwrap();

    let status = histner().arg("convert").arg(&input).arg(&output).status().unwrap();

    assert!(status.success());
    let html = std::fs::read_to_string(&output).unwrap();
    assert!(html.contains("Line 2: malformed record"));
}

#[test]
fn test_convert_missing_input_fails() {
    let dir = tempfile::tempdir().unwrap();
    let status = histner()
        .arg("convert")
        .arg(dir.path().join("missing.jsonl"))
        .arg(dir.path().join("report.html"))
        .status()
        .unwrap();

    assert_eq!(status.code(), Some(1));
    assert!(!dir.path().join("report.html").exists());
}

#[test]
fn test_convert_unwritable_output_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("predictions.jsonl");
    std::fs::write(&input, format!("{RECORD}\n")).unwrap();

    let status = histner()
        .arg("convert")
        .arg(&input)
        .arg(dir.path().join("missing-dir/report.html"))
        .status()
        .unwrap();

    assert_eq!(status.code(), Some(1));
}
