//! Basic CLI E2E tests.
//!
//! Each test runs the built binary against its own temporary home directory.

use std::process::Command;

use tempfile::TempDir;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &TempDir, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_timeledger"))
        .args(args)
        .env("HOME", home.path())
        .env_remove("TIMELEDGER_ENV")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_json(home: &TempDir, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, code) = run_cli(home, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).expect("Failed to parse JSON output")
}

fn add_task(home: &TempDir, title: &str) -> String {
    let task = run_json(home, &["task", "add", title, "--rate", "6000"]);
    task["id"].as_str().unwrap().to_string()
}

#[test]
fn test_task_add_and_list() {
    let home = TempDir::new().unwrap();
    let id = add_task(&home, "Write invoice");

    let list = run_json(&home, &["task", "list"]);
    let tasks = list.as_array().unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0]["task_id"], id.as_str());
    assert_eq!(tasks[0]["running"], false);
}

#[test]
fn test_timer_start_is_idempotent() {
    let home = TempDir::new().unwrap();
    let id = add_task(&home, "Review");

    let first = run_json(&home, &["timer", "start", &id]);
    let second = run_json(&home, &["timer", "start", &id]);
    assert_eq!(first["id"], second["id"]);

    let status = run_json(&home, &["timer", "status", &id]);
    assert_eq!(status["running"], true);
}

#[test]
fn test_timer_stop_twice() {
    let home = TempDir::new().unwrap();
    let id = add_task(&home, "Review");

    run_json(&home, &["timer", "start", &id]);
    let stopped = run_json(&home, &["timer", "stop", &id]);
    assert!(stopped["current_start_at"].is_null());
    let again = run_json(&home, &["timer", "stop", &id]);
    assert_eq!(stopped["total_time_seconds"], again["total_time_seconds"]);
}

#[test]
fn test_timer_start_unknown_task_fails() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(&home, &["timer", "start", "missing"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_workday_show_uses_configured_budget() {
    let home = TempDir::new().unwrap();
    let (_, _, code) = run_cli(&home, &["config", "set", "workday.daily_budget_seconds", "3600"]);
    assert_eq!(code, 0);

    let day = run_json(&home, &["workday", "show"]);
    assert_eq!(day["daily_budget_seconds"], 3600);
    assert_eq!(day["remaining_seconds"], 3600);
}

#[test]
fn test_config_rejects_zero_budget() {
    let home = TempDir::new().unwrap();
    let (_, stderr, code) = run_cli(&home, &["config", "set", "workday.daily_budget_seconds", "0"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("error:"));

    let (stdout, _, _) = run_cli(&home, &["config", "get", "workday.daily_budget_seconds"]);
    assert_eq!(stdout.trim(), "28800");
}

#[test]
fn test_task_import_legacy_export() {
    let home = TempDir::new().unwrap();
    let file = home.path().join("export.json");
    std::fs::write(
        &file,
        r#"[{"id":"old-1","projectId":"p","name":"Legacy","timeSpent":120,"earnings":200}]"#,
    )
    .unwrap();

    let imported = run_json(&home, &["task", "import", file.to_str().unwrap()]);
    assert_eq!(imported.as_array().unwrap().len(), 1);

    let shown = run_json(&home, &["task", "show", "old-1"]);
    assert_eq!(shown["task"]["title"], "Legacy");
    assert_eq!(shown["task"]["total_time_seconds"], 120);
}

#[test]
fn test_ids_with_quotes_are_escaped_in_output() {
    let home = TempDir::new().unwrap();
    let file = home.path().join("export.json");
    std::fs::write(&file, r#"[{"id":"old\"1","projectId":"p","name":"Quoted"}]"#).unwrap();
    run_json(&home, &["task", "import", file.to_str().unwrap()]);

    let status = run_json(&home, &["timer", "status", "old\"1"]);
    assert_eq!(status["task_id"], "old\"1");
    assert_eq!(status["running"], false);

    let deleted = run_json(&home, &["task", "delete", "old\"1"]);
    assert_eq!(deleted["deleted"], "old\"1");
    let list = run_json(&home, &["task", "list"]);
    assert!(list.as_array().unwrap().is_empty());
}
