//! CLI integration tests.
//!
//! Uses `assert_cmd` to spawn the `settle` binary and verify exit codes,
//! stdout content, and stderr content.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn settle() -> Command {
    let mut cmd = cargo_bin_cmd!("settle");
    cmd.env("RUST_LOG", "error");
    cmd
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    settle()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Compliance-aware collection call engine"));
}

#[test]
fn version_exits_0() {
    settle()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("settle"));
}

// ──────────────────────────────────────────────
// 2. fsm and screen
// ──────────────────────────────────────────────

#[test]
fn fsm_prints_every_state() {
    settle()
        .arg("fsm")
        .assert()
        .success()
        .stdout(predicate::str::contains("NEGOTIATION (main)"))
        .stdout(predicate::str::contains("DO_NOT_CALL (branch)"))
        .stdout(predicate::str::contains("signal AGREEMENT after"));
}

#[test]
fn fsm_json_is_parseable() {
    let out = settle().args(["--output", "json", "fsm"]).output().unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["global_edges"].as_array().unwrap().len(), 2);
    assert!(value["states"].as_array().unwrap().len() >= 10);
}

#[test]
fn screen_clean_text_exits_0() {
    settle()
        .args(["screen", "--jurisdiction", "UK", "We can set up an affordable plan."])
        .assert()
        .success()
        .stdout(predicate::str::contains("clean (UK)"));
}

#[test]
fn screen_prohibited_phrase_exits_2() {
    settle()
        .args(["screen", "--jurisdiction", "UAE", "Pay now or the police will come."])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("prohibited phrase: \"police\""));
}

#[test]
fn screen_unknown_jurisdiction_exits_1() {
    settle()
        .args(["screen", "--jurisdiction", "ZZ", "Hello."])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown jurisdiction 'ZZ'"));
}

// ──────────────────────────────────────────────
// 3. simulate
// ──────────────────────────────────────────────

#[test]
fn simulate_prints_one_line_per_call() {
    settle()
        .args(["simulate", "--persona", "cooperative", "--episodes", "3", "--seed", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cooperative").count(3));
}

#[test]
fn simulate_json_transcript_has_traces() {
    let out = settle()
        .args(["--output", "json", "simulate", "--episodes", "1", "--transcript"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    let call = &value[0];
    let traces = call["traces"].as_array().unwrap();
    assert!(!traces.is_empty());
    assert_eq!(traces[0]["emitted_action"], "GREET");
    assert_eq!(traces.last().unwrap()["state_after"], "END_CALL");
}

#[test]
fn simulate_records_episodes_to_jsonl() {
    let dir = TempDir::new().unwrap();
    let log = dir.path().join("episodes.jsonl");
    settle()
        .args(["simulate", "--episodes", "2", "--record"])
        .arg(&log)
        .assert()
        .success();
    let contents = fs::read_to_string(&log).unwrap();
    assert_eq!(contents.lines().filter(|l| !l.trim().is_empty()).count(), 2);
}

#[test]
fn simulate_unknown_persona_exits_1() {
    settle()
        .args(["simulate", "--persona", "pirate"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown persona 'pirate'"));
}

#[test]
fn simulate_late_call_is_deferred() {
    let out = settle()
        .args(["--output", "json", "simulate", "--minute", "1380"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value[0]["outcome"], "CALLBACK");
}

// ──────────────────────────────────────────────
// 4. train and inspect
// ──────────────────────────────────────────────

#[test]
fn train_writes_a_snapshot_that_inspects_clean() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("policy.json");
    settle()
        .args(["train", "--episodes", "10", "--swap-every", "5", "--out"])
        .arg(&snapshot)
        .assert()
        .success()
        .stdout(predicate::str::contains("episodes trained: 10"));

    let out = settle()
        .args(["--output", "json", "inspect"])
        .arg(&snapshot)
        .output()
        .unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["kind"], "qlearning");
    assert_eq!(value["episodes_trained"], 10);
    assert!(value["rows"].as_u64().unwrap() > 0);

    // resuming continues the count
    let resumed = dir.path().join("resumed.json");
    settle()
        .args(["--output", "json", "train", "--episodes", "5", "--resume"])
        .arg(&snapshot)
        .arg("--out")
        .arg(&resumed)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"episodes_trained\": 15"));
}

#[test]
fn inspect_refuses_a_tampered_snapshot() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("policy.json");
    settle()
        .args(["train", "--episodes", "3", "--out"])
        .arg(&snapshot)
        .assert()
        .success();

    let mut value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&snapshot).unwrap()).unwrap();
    value["parameters"]["learning_rate"] = serde_json::json!(0.9);
    fs::write(&snapshot, serde_json::to_string(&value).unwrap()).unwrap();

    settle()
        .arg("inspect")
        .arg(&snapshot)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("checksum mismatch"));
    settle()
        .args(["simulate", "--policy"])
        .arg(&snapshot)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("refusing snapshot"));
}

#[test]
fn inspect_missing_file_exits_1() {
    settle()
        .args(["inspect", "does/not/exist.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error reading file"));
}

// ──────────────────────────────────────────────
// 5. Configuration
// ──────────────────────────────────────────────

#[test]
fn config_file_selects_default_jurisdiction() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("settle.toml");
    fs::write(&config, "[engine]\ndefault_jurisdiction = \"IN\"\n").unwrap();
    settle()
        .arg("--config")
        .arg(&config)
        .args(["screen", "Please pay today."])
        .assert()
        .success()
        .stdout(predicate::str::contains("clean (IN)"));
}

#[test]
fn invalid_config_exits_1() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("settle.toml");
    fs::write(&config, "[learner]\nlearning_rate = -1.0\n").unwrap();
    settle()
        .arg("--config")
        .arg(&config)
        .arg("fsm")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid configuration"));
}
