//! End-to-end tests for the `tasksync` binary.
//!
//! stdout is not a terminal under test, so every command answers in JSON.

use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("tasksync").unwrap();
        cmd.env("HOME", self.dir.path())
            .env("TASKSYNC_DB", self.dir.path().join("tasks.db"))
            .env("TASKSYNC_ACTOR", "tester")
            // Nothing listens on port 1; probes fail fast.
            .env("API_BASE_URL", "http://127.0.0.1:1/api")
            .env_remove("RUST_LOG");
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().args(args).output().unwrap();
        assert!(
            output.status.success(),
            "{args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    fn add(&self, title: &str) -> String {
        let task = self.json(&["task", "add", title]);
        task["id"].as_str().unwrap().to_string()
    }
}

#[test]
fn test_add_list_show() {
    let ws = Workspace::new();
    let id = ws.add("Buy milk");

    let list = ws.json(&["task", "list"]);
    assert_eq!(list["count"], 1);
    assert_eq!(list["tasks"][0]["title"], "Buy milk");
    assert_eq!(list["tasks"][0]["sync_status"], "pending");

    let shown = ws.json(&["task", "show", &id]);
    assert_eq!(shown["id"], id.as_str());
    assert_eq!(shown["completed"], false);
}

#[test]
fn test_mutations_coalesce_in_queue() {
    let ws = Workspace::new();
    let id = ws.add("Draft");
    ws.json(&["task", "update", &id, "--completed", "true"]);

    let queue = ws.json(&["sync", "queue"]);
    assert_eq!(queue["count"], 1);
    assert_eq!(queue["items"][0]["operation"], "create");
    assert_eq!(queue["items"][0]["status"], "pending");

    ws.json(&["task", "delete", &id]);
    let queue = ws.json(&["sync", "queue"]);
    assert_eq!(queue["count"], 1);
    assert_eq!(queue["items"][0]["operation"], "delete");

    let list = ws.json(&["task", "list"]);
    assert_eq!(list["count"], 0);
    let unsynced = ws.json(&["task", "list", "--unsynced"]);
    assert_eq!(unsynced["count"], 1);
    assert_eq!(unsynced["tasks"][0]["is_deleted"], true);
}

#[test]
fn test_history_records_actor() {
    let ws = Workspace::new();
    let id = ws.add("Audited");
    ws.json(&["task", "update", &id, "--title", "Audited twice"]);

    let history = ws.json(&["task", "history", &id]);
    let events = history.as_array().unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0]["event_type"], "task_updated");
    assert_eq!(events[1]["event_type"], "task_created");
    assert!(events.iter().all(|e| e["actor"] == "tester"));
}

#[test]
fn test_sync_run_offline_leaves_queue() {
    let ws = Workspace::new();
    ws.add("Offline edit");

    let result = ws.json(&["sync", "run"]);
    assert_eq!(result["outcome"]["kind"], "offline");
    assert_eq!(result["success"], false);

    let status = ws.json(&["sync", "status"]);
    assert_eq!(status["online"], false);
    assert_eq!(status["pending_count"], 1);
    assert_eq!(status["failed_count"], 0);
    assert!(status["last_sync_time"].is_null());
}

#[test]
fn test_read_without_database_is_not_initialized() {
    let ws = Workspace::new();
    ws.cmd().args(["task", "list"]).assert().failure().code(2);
}

#[test]
fn test_error_exit_codes() {
    let ws = Workspace::new();
    let id = ws.add("Exists");

    ws.cmd()
        .args(["task", "show", "no-such-task"])
        .assert()
        .failure()
        .code(3);

    ws.cmd()
        .args(["task", "update", &id])
        .assert()
        .failure()
        .code(4);

    ws.cmd()
        .args(["task", "add", "   "])
        .assert()
        .failure()
        .code(4);

    let queue = ws.json(&["sync", "queue"]);
    let item_id = queue["items"][0]["id"].as_str().unwrap().to_string();
    let output = ws.cmd().args(["sync", "requeue", &item_id]).output().unwrap();
    assert_eq!(output.status.code(), Some(4));
    let err: Value = serde_json::from_slice(&output.stderr).unwrap();
    assert_eq!(err["error"]["code"], "INVALID_ARGUMENT");
}
