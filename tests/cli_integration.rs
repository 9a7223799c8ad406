//! Integration tests for the agentboard CLI
//!
//! These tests exercise the full CLI workflow using a temporary database.
//! They verify that commands work end-to-end without mocking.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

/// Helper to run agentboard with a specific database path
fn run_agentboard(args: &[&str], db_path: &PathBuf) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_agentboard"))
        .args(args)
        .env("AGENTBOARD_DB_PATH", db_path)
        .env("AGENTBOARD_CONFIG", config_path(db_path))
        .env("AGENTBOARD_AUTHOR", "Tester")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute agentboard")
}

/// A config path that never exists, so tests ignore the user's config
fn config_path(db_path: &Path) -> PathBuf {
    db_path.with_file_name("no-config.toml")
}

/// Helper to get stdout as string
fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Helper to get stderr as string
fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn temp_db() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("board.db");
    (temp_dir, db_path)
}

// =============================================================================
// Basic Command Tests
// =============================================================================

#[test]
fn test_help_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_agentboard"))
        .arg("--help")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.contains("agentboard"));
    assert!(out.contains("project board"));
}

#[test]
fn test_version_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_agentboard"))
        .arg("--version")
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    assert!(stdout(&output).contains("agentboard"));
}

#[test]
fn test_init_reports_migrations() {
    let (_dir, db_path) = temp_db();
    let output = run_agentboard(&["init"], &db_path);
    assert!(output.status.success(), "init failed: {}", stderr(&output));
    let out = stdout(&output);
    assert!(out.contains("Board ready at"));
    assert!(out.contains("0001_initial_schema"));
    assert!(db_path.exists());

    // Second run is a no-op migration-wise
    let output = run_agentboard(&["init"], &db_path);
    assert!(output.status.success());
    assert_eq!(stdout(&output).matches("0001_initial_schema").count(), 1);
}

// =============================================================================
// Shell Completion Tests
// =============================================================================

#[test]
fn test_completion_zsh() {
    let output = Command::new(env!("CARGO_BIN_EXE_agentboard"))
        .args(["completion", "zsh"])
        .output()
        .expect("Failed to execute");

    assert!(
        output.status.success(),
        "completion zsh failed: {}",
        stderr(&output)
    );
    assert!(
        stdout(&output).contains("#compdef agentboard"),
        "zsh completion should contain #compdef"
    );
}

#[test]
fn test_completion_bash() {
    let output = Command::new(env!("CARGO_BIN_EXE_agentboard"))
        .args(["completion", "bash"])
        .output()
        .expect("Failed to execute");

    assert!(output.status.success());
    assert!(stdout(&output).contains("_agentboard"));
}

// =============================================================================
// Project and Milestone Tests
// =============================================================================

#[test]
fn test_projects() {
    let (_dir, db_path) = temp_db();

    let output = run_agentboard(&["project", "list"], &db_path);
    assert!(output.status.success(), "project list failed: {}", stderr(&output));
    assert!(stdout(&output).contains("Default Project"));

    let output = run_agentboard(&["project", "create", "Apollo", "-d", "moonshot"], &db_path);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Created project 2: Apollo"));

    let output = run_agentboard(&["project", "show", "2"], &db_path);
    assert!(stdout(&output).contains("moonshot"));
}

#[test]
fn test_milestone_lifecycle() {
    let (_dir, db_path) = temp_db();

    let output = run_agentboard(
        &["milestone", "add", "Design", "--priority", "1", "-o", "alice"],
        &db_path,
    );
    assert!(output.status.success(), "milestone add failed: {}", stderr(&output));
    assert!(stdout(&output).contains("Created milestone 1: Design"));
    run_agentboard(&["milestone", "add", "Build"], &db_path);

    let output = run_agentboard(&["milestone", "update", "1", "-s", "in_progress"], &db_path);
    assert!(output.status.success(), "update failed: {}", stderr(&output));
    assert!(stdout(&output).contains("in_progress"));

    let output = run_agentboard(&["milestone", "list", "-s", "in_progress"], &db_path);
    let out = stdout(&output);
    assert!(out.contains("Design"));
    assert!(out.contains("@alice"));
    assert!(!out.contains("Build"));
}

#[test]
fn test_milestone_rejects_unknown_status() {
    let (_dir, db_path) = temp_db();
    let output = run_agentboard(&["milestone", "add", "X", "-s", "finished"], &db_path);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("not_started"));
}

#[test]
fn test_update_missing_milestone_fails() {
    let (_dir, db_path) = temp_db();
    let output = run_agentboard(&["milestone", "update", "42", "-s", "done"], &db_path);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("not found"));
}

// =============================================================================
// Task Tests
// =============================================================================

#[test]
fn test_task_flow() {
    let (_dir, db_path) = temp_db();
    run_agentboard(&["milestone", "add", "Build"], &db_path);

    let output = run_agentboard(&["task", "add", "1", "Write parser", "-a", "bot"], &db_path);
    assert!(output.status.success(), "task add failed: {}", stderr(&output));
    run_agentboard(&["task", "add", "1", "Write tests"], &db_path);

    let output = run_agentboard(&["task", "done", "1"], &db_path);
    assert!(output.status.success());
    assert!(stdout(&output).contains("done"));

    let output = run_agentboard(&["task", "list", "-p", "1", "-a", "bot"], &db_path);
    let out = stdout(&output);
    assert!(out.contains("[x]"));
    assert!(out.contains("Write parser"));
    assert!(!out.contains("Write tests"));

    let output = run_agentboard(&["milestone", "list"], &db_path);
    assert!(stdout(&output).contains("1/2 tasks"));
}

#[test]
fn test_task_on_missing_milestone_fails() {
    let (_dir, db_path) = temp_db();
    let output = run_agentboard(&["task", "add", "99", "orphan"], &db_path);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Error"));
}

// =============================================================================
// Dialogue Tests
// =============================================================================

#[test]
fn test_log_and_broadcast() {
    let (_dir, db_path) = temp_db();
    run_agentboard(&["milestone", "add", "A"], &db_path);
    run_agentboard(&["milestone", "add", "B"], &db_path);

    let output = run_agentboard(&["log", "1", "Picked SQLite", "-t", "decision"], &db_path);
    assert!(output.status.success(), "log failed: {}", stderr(&output));

    let output = run_agentboard(&["broadcast", "Standup moved to 10"], &db_path);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Broadcast to 2 milestone(s)"));

    let output = run_agentboard(&["dialogue", "-m", "2"], &db_path);
    let out = stdout(&output);
    assert!(out.contains("Standup moved to 10"));
    assert!(!out.contains("Picked SQLite"));

    let output = run_agentboard(&["dialogue"], &db_path);
    let out = stdout(&output);
    assert!(out.contains("Tester"));
    assert!(out.contains("decision"));

    let output = run_agentboard(&["log", "1", "   "], &db_path);
    assert!(!output.status.success());
}

// =============================================================================
// Status and Graph Tests
// =============================================================================

#[test]
fn test_status_json() {
    let (_dir, db_path) = temp_db();
    run_agentboard(&["milestone", "add", "A", "-s", "done"], &db_path);
    run_agentboard(&["milestone", "add", "B"], &db_path);
    run_agentboard(&["task", "add", "2", "t"], &db_path);

    let output = run_agentboard(&["status", "--json"], &db_path);
    assert!(output.status.success(), "status failed: {}", stderr(&output));
    let json: serde_json::Value =
        serde_json::from_str(&stdout(&output)).expect("Output should be valid JSON");
    assert_eq!(json["total_milestones"], 2);
    assert_eq!(json["milestones_by_status"]["done"], 1);
    assert_eq!(json["task_counts"]["pending"], 1);
}

#[test]
fn test_graph_formats() {
    let (_dir, db_path) = temp_db();
    run_agentboard(&["milestone", "add", "Design"], &db_path);
    run_agentboard(&["milestone", "add", "Build"], &db_path);
    let output = run_agentboard(&["dep", "add", "2", "1"], &db_path);
    assert!(output.status.success(), "dep add failed: {}", stderr(&output));

    let output = run_agentboard(&["graph"], &db_path);
    let out = stdout(&output);
    assert!(out.contains("Rank 0"));
    assert!(out.contains("[2] Build (not_started, 0/0 tasks) <- 1"));

    let output = run_agentboard(&["graph", "-f", "dot", "--title", "Plan"], &db_path);
    let out = stdout(&output);
    assert!(out.contains("digraph"));
    assert!(out.contains("m1 -> m2;"));
    assert!(out.contains("label=\"Plan\""));

    let output = run_agentboard(&["graph", "-f", "json"], &db_path);
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("valid JSON");
    assert_eq!(json["graph"]["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(json["layout"]["ranks"].as_array().unwrap().len(), 2);
}

#[test]
fn test_dep_remove() {
    let (_dir, db_path) = temp_db();
    run_agentboard(&["milestone", "add", "A"], &db_path);
    run_agentboard(&["milestone", "add", "B"], &db_path);
    run_agentboard(&["dep", "add", "2", "1"], &db_path);

    let output = run_agentboard(&["dep", "remove", "2", "1"], &db_path);
    assert!(output.status.success());
    let output = run_agentboard(&["dep", "list"], &db_path);
    assert!(stdout(&output).contains("No dependencies."));

    let output = run_agentboard(&["dep", "remove", "2", "1"], &db_path);
    assert!(!output.status.success());
}

// =============================================================================
// Tool Server Tests
// =============================================================================

#[test]
fn test_mcp_over_stdio() {
    let (_dir, db_path) = temp_db();
    let mut child = Command::new(env!("CARGO_BIN_EXE_agentboard"))
        .arg("mcp")
        .env("AGENTBOARD_DB_PATH", &db_path)
        .env("AGENTBOARD_CONFIG", config_path(&db_path))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn agentboard mcp");

    {
        let stdin = child.stdin.as_mut().expect("stdin");
        writeln!(stdin, r#"{{"jsonrpc":"2.0","id":1,"method":"initialize","params":{{}}}}"#).unwrap();
        writeln!(stdin, r#"{{"jsonrpc":"2.0","method":"notifications/initialized"}}"#).unwrap();
        writeln!(
            stdin,
            r#"{{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{{"name":"create_milestone","arguments":{{"name":"From agent"}}}}}}"#
        )
        .unwrap();
    }
    let output = child.wait_with_output().expect("wait");
    assert!(output.status.success(), "mcp failed: {}", stderr(&output));

    let lines: Vec<serde_json::Value> = stdout(&output)
        .lines()
        .map(|l| serde_json::from_str(l).expect("each stdout line is JSON"))
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[1]["result"]["isError"], false);

    let output = run_agentboard(&["milestone", "list"], &db_path);
    assert!(stdout(&output).contains("From agent"));
}

// =============================================================================
// Change Feed Tests
// =============================================================================

#[test]
fn test_watch_reports_write_from_another_process() {
    use std::io::{BufRead, BufReader, Read};
    use std::time::{Duration, Instant};

    let (_dir, db_path) = temp_db();
    run_agentboard(&["init"], &db_path);

    let mut child = Command::new(env!("CARGO_BIN_EXE_agentboard"))
        .args(["watch", "--backend", "poll", "--count", "1"])
        .env("AGENTBOARD_DB_PATH", &db_path)
        .env("AGENTBOARD_CONFIG", config_path(&db_path))
        .env("NO_COLOR", "1")
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn agentboard watch");

    // The banner is printed once the feed has its baseline
    let mut stderr_lines = BufReader::new(child.stderr.take().expect("stderr"));
    let mut line = String::new();
    loop {
        line.clear();
        let n = stderr_lines.read_line(&mut line).expect("read stderr");
        assert!(n > 0, "watch exited before starting");
        if line.contains("Watching") {
            break;
        }
    }
    assert!(line.contains("poll backend"), "banner: {}", line);

    let output = run_agentboard(&["milestone", "add", "Seen by watcher"], &db_path);
    assert!(output.status.success());

    let deadline = Instant::now() + Duration::from_secs(15);
    let status = loop {
        if let Some(status) = child.try_wait().expect("try_wait") {
            break status;
        }
        if Instant::now() > deadline {
            let _ = child.kill();
            panic!("watch did not report the write");
        }
        std::thread::sleep(Duration::from_millis(50));
    };
    assert!(status.success());

    let mut out = String::new();
    child
        .stdout
        .take()
        .expect("stdout")
        .read_to_string(&mut out)
        .expect("read stdout");
    assert!(out.starts_with("change 1 at"), "stdout: {}", out);
}
