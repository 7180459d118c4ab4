//! Integration tests for the swarm-coord binary

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn demo_scenario() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/two_teams.yaml")
}

/// Command isolated from any config files in the developer's home or cwd
fn swarm_coord(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("swarm-coord").unwrap();
    cmd.current_dir(dir).env("HOME", dir).env_remove("RUST_LOG");
    cmd
}

fn run_json(dir: &Path, extra: &[&str]) -> serde_json::Value {
    let output = swarm_coord(dir)
        .arg("--scenario")
        .arg(demo_scenario())
        .args(["--ticks", "30", "--json"])
        .args(extra)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_version() {
    let mut cmd = Command::cargo_bin("swarm-coord").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(format!(
            "swarm-coord {}",
            env!("CARGO_PKG_VERSION")
        )));
}

#[test]
fn test_help() {
    let mut cmd = Command::cargo_bin("swarm-coord").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("connector-chain"));
}

#[test]
fn test_scenario_required() {
    let dir = tempdir().unwrap();
    swarm_coord(dir.path()).assert().failure();
}

#[test]
fn test_missing_scenario_file() {
    let dir = tempdir().unwrap();
    swarm_coord(dir.path())
        .args(["--scenario", "nope.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to load scenario"));
}

#[test]
fn test_demo_scenario_runs() {
    let dir = tempdir().unwrap();
    let summary = run_json(dir.path(), &[]);
    let robots = summary.as_array().unwrap();
    assert_eq!(robots.len(), 9);

    let l1 = &robots[0];
    assert_eq!(l1["id"], "L1");
    assert_eq!(l1["role"], "Leader");
    assert_eq!(l1["hops"]["1"], 0);

    // the follower right behind its leader learned its route
    let f2 = &robots[1];
    assert_eq!(f2["id"], "F2");
    assert_eq!(f2["hops"]["1"], 1);
}

#[test]
fn test_demo_forms_a_connector() {
    let dir = tempdir().unwrap();
    let summary = run_json(dir.path(), &[]);
    let robots = summary.as_array().unwrap();

    // F5 trails out of L1's range right next to team 2
    let f5 = robots.iter().find(|r| r["id"] == "F5").unwrap();
    assert_eq!(f5["role"], "Connector");
    assert!(f5["team"].is_null());
    // it links both teams
    assert!(f5["hops"]["1"].is_u64());
    assert!(f5["hops"]["2"].is_u64());
}

#[test]
fn test_parallel_matches_sequential() {
    let dir = tempdir().unwrap();
    let sequential = run_json(dir.path(), &[]);
    let parallel = run_json(dir.path(), &["--parallel"]);
    assert_eq!(sequential, parallel);
}

#[test]
fn test_plain_summary() {
    let dir = tempdir().unwrap();
    swarm_coord(dir.path())
        .arg("--scenario")
        .arg(demo_scenario())
        .args(["--ticks", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("L1"))
        .stdout(predicate::str::contains("leader"));
}

#[test]
fn test_strict_config_without_files_fails() {
    let dir = tempdir().unwrap();
    swarm_coord(dir.path())
        .arg("--scenario")
        .arg(demo_scenario())
        .arg("--strict-config")
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing configuration value"));
}

#[test]
fn test_invalid_config_fails_before_first_tick() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join(".swarm-coord.config.yaml"),
        "wheelTurning:\n  noTurnAngleThreshold: 120\n",
    )
    .unwrap();
    swarm_coord(dir.path())
        .arg("--scenario")
        .arg(demo_scenario())
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid configuration"));
}

#[test]
fn test_config_file_is_applied() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("slow.json");
    fs::write(&config, r#"{"wheelTurning": {"maxSpeed": 0.5}}"#).unwrap();
    let summary = run_json(dir.path(), &["--config", config.to_str().unwrap()]);
    // a half-speed leader covers at most 0.05 cm per tick
    let x = summary[0]["x"].as_f64().unwrap();
    assert!(x.abs() <= 30.0 * 0.05 + 1e-9, "leader moved to {}", x);
}

#[test]
fn test_bad_supervisor_rejected() {
    let dir = tempdir().unwrap();
    let table = dir.path().join("sup.yaml");
    fs::write(
        &table,
        "supervisors:\n  - name: s\n    states: [a]\n    initial: a\n    transitions:\n      - { from: a, event: warp, to: a }\n",
    )
    .unwrap();
    swarm_coord(dir.path())
        .arg("--scenario")
        .arg(demo_scenario())
        .arg("--supervisor")
        .arg(&table)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown event name 'warp'"));
}
