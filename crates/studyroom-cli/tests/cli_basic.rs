//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run and verify outputs. Each test gets
//! its own HOME so runs are isolated from each other and from real user data.

use std::path::Path;
use std::process::Command;

/// Run a CLI command with an isolated home directory and return output.
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-p", "studyroom-cli", "--"])
        .args(args)
        .env("HOME", home)
        .env("STUDYROOM_ENV", "dev")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn create_room(home: &Path, name: &str, user: &str) -> String {
    let (stdout, stderr, code) = run_cli(home, &["room", "create", name, "--user", user]);
    assert_eq!(code, 0, "room create failed: {stderr}");
    let room: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    room["id"].as_str().unwrap().to_string()
}

#[test]
fn test_room_create_and_members() {
    let home = tempfile::tempdir().unwrap();
    let room = create_room(home.path(), "library", "alice");

    let (stdout, _, code) = run_cli(home.path(), &["room", "members", "--room", &room]);
    assert_eq!(code, 0);
    let members: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(members.as_array().unwrap().len(), 1);
    assert_eq!(members[0]["user_id"], "alice");
}

#[test]
fn test_room_leave_emits_json() {
    let home = tempfile::tempdir().unwrap();
    let room = create_room(home.path(), "library", "alice");
    run_cli(home.path(), &["room", "join", "--room", &room, "--user", "bob"]);

    let (stdout, stderr, code) = run_cli(
        home.path(),
        &["room", "leave", "--room", &room, "--user", "bob"],
    );
    assert_eq!(code, 0, "room leave failed: {stderr}");
    let reply: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(reply["left"].as_str().unwrap(), room);

    let (stdout, _, _) = run_cli(home.path(), &["room", "members", "--room", &room]);
    let members: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(members.as_array().unwrap().len(), 1);
}

#[test]
fn test_timer_status_defaults_to_idle() {
    let home = tempfile::tempdir().unwrap();
    let room = create_room(home.path(), "library", "alice");

    let (stdout, _, code) = run_cli(home.path(), &["timer", "status", "--room", &room]);
    assert_eq!(code, 0);
    let state: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(state["is_running"], false);
    assert_eq!(state["version"], 0);
}

#[test]
fn test_timer_start_then_status() {
    let home = tempfile::tempdir().unwrap();
    let room = create_room(home.path(), "library", "alice");

    let (stdout, stderr, code) = run_cli(
        home.path(),
        &["timer", "start", "--room", &room, "--user", "alice"],
    );
    assert_eq!(code, 0, "timer start failed: {stderr}");
    let state: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(state["is_running"], true);
    assert_eq!(state["started_by"], "alice");

    let (stdout, _, code) = run_cli(home.path(), &["timer", "status", "--room", &room]);
    assert_eq!(code, 0);
    let state: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(state["is_running"], true);
}

#[test]
fn test_pause_while_idle_fails() {
    let home = tempfile::tempdir().unwrap();
    let room = create_room(home.path(), "library", "alice");

    let (_, stderr, code) = run_cli(
        home.path(),
        &["timer", "pause", "--room", &room, "--user", "alice"],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("cannot pause"), "stderr was: {stderr}");
}

#[test]
fn test_timer_without_user_fails_unauthenticated() {
    let home = tempfile::tempdir().unwrap();
    let room = create_room(home.path(), "library", "alice");

    let (_, stderr, code) = run_cli(home.path(), &["timer", "start", "--room", &room]);
    assert_ne!(code, 0);
    assert!(stderr.contains("not authenticated"), "stderr was: {stderr}");
}

#[test]
fn test_non_member_cannot_start() {
    let home = tempfile::tempdir().unwrap();
    let room = create_room(home.path(), "library", "alice");

    let (_, stderr, code) = run_cli(
        home.path(),
        &["timer", "start", "--room", &room, "--user", "mallory"],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("not a member"), "stderr was: {stderr}");
}

#[test]
fn test_full_cycle_feeds_events_and_stats() {
    let home = tempfile::tempdir().unwrap();
    let room = create_room(home.path(), "library", "alice");

    run_cli(
        home.path(),
        &["timer", "start", "--room", &room, "--user", "alice"],
    );
    run_cli(
        home.path(),
        &["timer", "pause", "--room", &room, "--user", "alice"],
    );

    let (stdout, _, code) = run_cli(home.path(), &["events", "list", "--room", &room]);
    assert_eq!(code, 0);
    let events: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let actions: Vec<&str> = events
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["action"].as_str().unwrap())
        .collect();
    assert_eq!(actions, vec!["pause", "start"]);

    let (stdout, _, code) = run_cli(home.path(), &["stats", "leaderboard"]);
    assert_eq!(code, 0);
    let totals: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(totals[0]["user_id"], "alice");
}

#[test]
fn test_config_show_and_path() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "show"]);
    assert_eq!(code, 0);
    let cfg: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(cfg["notifier"]["channel_capacity"], 64);

    let (stdout, _, code) = run_cli(home.path(), &["config", "path"]);
    assert_eq!(code, 0);
    assert!(stdout.trim().ends_with("config.toml"));
}
