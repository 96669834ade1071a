use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn flowtrack() -> Command {
    let mut cmd = Command::cargo_bin("flowtrack").unwrap();
    cmd.env_remove("FLOWTRACK_MAX_FLOWS");
    cmd
}

fn generate(dir: &TempDir, flows: &str, packets: &str) -> std::path::PathBuf {
    let path = dir.path().join("traffic.cap");
    flowtrack()
        .args(["generate", "--flows", flows, "--packets", packets, "--output"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("Records: {}", packets)));
    path
}

#[test]
fn test_generate_then_replay() {
    let dir = TempDir::new().unwrap();
    let capture = generate(&dir, "30", "300");

    flowtrack()
        .arg("replay")
        .arg(&capture)
        .assert()
        .success()
        .stdout(predicate::str::contains("Records: 300"))
        .stdout(predicate::str::contains("Flows: 30 IPv4, 0 IPv6"))
        .stdout(predicate::str::contains("Rejected (table full): 0"));
}

#[test]
fn test_replay_json_with_small_table() {
    let dir = TempDir::new().unwrap();
    let capture = generate(&dir, "10", "10");

    let output = flowtrack()
        .args(["replay", "--json", "--max-flows", "4"])
        .arg(&capture)
        .output()
        .unwrap();
    assert!(output.status.success());

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["records"], 10);
    assert_eq!(summary["flows_v4"], 4);
    assert_eq!(summary["rejected"], 6);
    assert_eq!(summary["max_flows"], 4);
}

#[test]
fn test_config_file_and_env() {
    let dir = TempDir::new().unwrap();
    let capture = generate(&dir, "10", "10");
    let config = dir.path().join("tracker.toml");
    std::fs::write(&config, "max_flows = 3\n").unwrap();

    flowtrack()
        .args(["replay", "--config"])
        .arg(&config)
        .arg(&capture)
        .assert()
        .success()
        .stdout(predicate::str::contains("capacity 3 per family"));

    flowtrack()
        .env("FLOWTRACK_MAX_FLOWS", "5")
        .arg("replay")
        .arg(&capture)
        .assert()
        .success()
        .stdout(predicate::str::contains("capacity 5 per family"));
}

#[test]
fn test_inspect() {
    let dir = TempDir::new().unwrap();
    let capture = generate(&dir, "5", "12");

    flowtrack()
        .args(["inspect", "--limit", "2"])
        .arg(&capture)
        .assert()
        .success()
        .stdout(predicate::str::contains("#0"))
        .stdout(predicate::str::contains("... 10 more"))
        .stdout(predicate::str::contains("Total records: 12"));
}

#[test]
fn test_missing_capture_fails() {
    let dir = TempDir::new().unwrap();
    flowtrack()
        .arg("replay")
        .arg(dir.path().join("absent.cap"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_zero_capacity_rejected() {
    let dir = TempDir::new().unwrap();
    let capture = generate(&dir, "1", "1");
    flowtrack()
        .args(["replay", "--max-flows", "0"])
        .arg(&capture)
        .assert()
        .failure();
}

#[test]
fn test_benchmark_runs() {
    flowtrack()
        .args(["benchmark", "--flows", "100", "--packets", "5000", "--workers", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Packets analyzed: 5000"));
}
