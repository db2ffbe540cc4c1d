//! End-to-end pipeline tests
//!
//! Runs generate → personas list → score through the binary against the
//! offline mock provider.

mod common;

use std::fs;

use common::{fixture_path, MockWorkspace};
use predicates::prelude::*;
use serde_json::Value;

fn generate(ws: &MockWorkspace, namespace: &str, inputs: &[&str]) -> assert_cmd::assert::Assert {
    let mut cmd = ws.cmd();
    cmd.args(["generate", "--namespace", namespace, "--input"]);
    for input in inputs {
        cmd.arg(fixture_path(input));
    }
    cmd.assert()
}

// ─────────────────────────────────────────────────────────────────
// Generation
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_generate_from_survey() {
    let ws = MockWorkspace::new();

    generate(&ws, "csv", &["survey.csv"])
        .success()
        .stdout(predicate::str::contains("Generated 2 persona(s) for 'csv'"))
        .stdout(predicate::str::contains("csv_1"))
        .stdout(predicate::str::contains("csv_2"));

    assert!(ws.output("personas/csv/PERSONA-csv_1.json").exists());
    assert!(ws.output("personas/csv/PERSONA-csv_2.json").exists());
    assert!(ws.output("csv_personas.zip").exists());

    let combined: Value =
        serde_json::from_str(&fs::read_to_string(ws.output("personas/csv_personas.json")).unwrap())
            .unwrap();
    let records = combined.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["persona_id"], "csv_1");
    assert!(records[0]["suggested_learning_resources"].is_array());
}

#[test]
fn test_generate_writes_conversation_log() {
    let ws = MockWorkspace::new();
    generate(&ws, "md", &["interview_a.md", "interview_b.md"]).success();

    let log = fs::read_to_string(ws.output("all_md_conve_log.csv")).unwrap();
    assert!(log.starts_with('\u{FEFF}'));
    assert!(log.contains("source,content,type,prompt_tokens,completion_tokens,timestamp"));
    // Both transcripts went into the single prompt
    assert!(log.contains("Interview 1"));
    assert!(log.contains("Interview 2"));
    assert!(log.contains(",prompt,"));
    assert!(log.contains(",response,"));
}

#[test]
fn test_generate_missing_input() {
    let ws = MockWorkspace::new();

    ws.cmd()
        .args(["generate", "--namespace", "csv", "--input", "/nonexistent/survey.csv"])
        .assert()
        .failure()
        .code(20);
}

#[test]
fn test_generate_output_override() {
    let ws = MockWorkspace::new();
    let other = ws.root.path().join("elsewhere");

    ws.cmd()
        .args(["generate", "--namespace", "csv2", "--input"])
        .arg(fixture_path("survey.csv"))
        .arg("--output")
        .arg(&other)
        .assert()
        .success();

    assert!(other.join("personas/csv2/PERSONA-csv2_1.json").exists());
    assert!(!ws.output("personas").exists());
}

// ─────────────────────────────────────────────────────────────────
// Listing
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_personas_list() {
    let ws = MockWorkspace::new();

    ws.cmd()
        .args(["personas", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No saved personas"));

    generate(&ws, "md", &["interview_a.md"]).success();
    generate(&ws, "csv", &["survey.csv"]).success();

    ws.cmd()
        .args(["personas", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("csv_1"))
        .stdout(predicate::str::contains("md_2"));

    let output = ws.cmd().args(["personas", "list", "--json"]).output().unwrap();
    let listed: Value = serde_json::from_slice(&output.stdout).unwrap();
    let ids: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|p| p["persona_id"].as_str())
        .collect();
    assert_eq!(ids, vec!["csv_1", "csv_2", "md_1", "md_2"]);
}

// ─────────────────────────────────────────────────────────────────
// Scoring
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_score_and_write_report() {
    let ws = MockWorkspace::new();
    generate(&ws, "csv", &["survey.csv"]).success();
    let report_path = ws.root.path().join("report.json");

    ws.cmd()
        .args([
            "score",
            "--persona",
            "csv_2",
            "--persona",
            "csv_1",
            "--copy",
            "Become a data analyst in 12 weeks, learning at your own pace.",
            "--output",
        ])
        .arg(&report_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("csv_1 ("))
        .stdout(predicate::str::contains("csv_2 ("))
        .stdout(predicate::str::contains("average"));

    let report: Value = serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    let feedback = report["feedback"].as_array().unwrap();
    assert_eq!(feedback.len(), 2);
    // Request order is preserved
    assert_eq!(feedback[0]["persona_id"], "csv_2");
    assert_eq!(feedback[1]["persona_id"], "csv_1");
    for f in feedback {
        let score = f["score"].as_f64().unwrap();
        assert!((5.0..=9.0).contains(&score));
    }
    assert!(report["avg_score"].as_f64().unwrap() > 0.0);
    assert!(report["chart"].as_str().unwrap().contains("average"));
}

#[test]
fn test_score_copy_from_file() {
    let ws = MockWorkspace::new();
    generate(&ws, "md", &["interview_b.md"]).success();
    let copy_path = ws.root.path().join("copy.txt");
    fs::write(&copy_path, "Ten-minute lessons that fit your commute.").unwrap();

    ws.cmd()
        .args(["score", "--persona", "md_1", "--copy-file"])
        .arg(&copy_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("md_1 ("));
}

#[test]
fn test_score_unknown_persona() {
    let ws = MockWorkspace::new();
    generate(&ws, "csv", &["survey.csv"]).success();

    ws.cmd()
        .args(["score", "--persona", "csv_99", "--copy", "Buy now"])
        .assert()
        .failure()
        .code(40)
        .stderr(predicate::str::contains("csv_99"))
        .stderr(predicate::str::contains("personas list"));
}
