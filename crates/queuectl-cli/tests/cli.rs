//! Drives the `queuectl` binary against a throwaway database.

use std::path::PathBuf;
use std::process::{Command, Output};

use tempfile::TempDir;

struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = format!(
            "[database]\nurl = \"sqlite://{}\"\n\n[settings]\npath = \"{}\"\n\n[logging]\nlevel = \"warn\"\n",
            dir.path().join("queue.db").display(),
            dir.path().join("settings.json").display(),
        );
        std::fs::write(dir.path().join("queuectl.toml"), config).expect("write config");
        Self { dir }
    }

    fn config_path(&self) -> PathBuf {
        self.dir.path().join("queuectl.toml")
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_queuectl"))
            .arg("--config")
            .arg(self.config_path())
            .args(args)
            .env_remove("RUST_LOG")
            .output()
            .expect("run queuectl")
    }

    fn json(&self, args: &[&str]) -> serde_json::Value {
        let mut full = args.to_vec();
        full.extend(["--format", "json"]);
        let output = self.run(&full);
        assert!(
            output.status.success(),
            "queuectl {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("json output")
    }
}

#[test]
fn test_enqueue_list_and_status() {
    let sb = Sandbox::new();

    let job = sb.json(&["enqueue", r#"{"id":"job1","command":"echo hi"}"#]);
    assert_eq!(job["id"], "job1");
    assert_eq!(job["state"], "pending");
    assert_eq!(job["attempts"], 0);
    assert_eq!(job["max_retries"], 3);

    let jobs = sb.json(&["list", "--state", "pending"]);
    assert_eq!(jobs.as_array().map(Vec::len), Some(1));
    let jobs = sb.json(&["list", "--state", "dead"]);
    assert_eq!(jobs.as_array().map(Vec::len), Some(0));

    let status = sb.json(&["status"]);
    assert_eq!(status["jobs"]["pending"], 1);
    assert_eq!(status["workers"]["total"], 0);
    assert_eq!(status["workers"]["uptimeMs"], 0);
}

#[test]
fn test_duplicate_and_invalid_enqueue_fail() {
    let sb = Sandbox::new();
    sb.json(&["enqueue", r#"{"id":"a","command":"true"}"#]);

    let output = sb.run(&["enqueue", r#"{"id":"a","command":"true"}"#]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));

    let output = sb.run(&["enqueue", r#"{"command":"true","priority":5}"#]);
    assert_eq!(output.status.code(), Some(1));

    let output = sb.run(&["enqueue", "not json"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_config_get_set() {
    let sb = Sandbox::new();

    let all = sb.json(&["config", "get"]);
    assert_eq!(all["max-retries"], 3);
    assert_eq!(all["backoff-base"], 2);

    assert!(sb.run(&["config", "set", "max-retries", "7"]).status.success());
    assert_eq!(sb.json(&["config", "get", "max-retries"]), 7);

    let job = sb.json(&["enqueue", r#"{"command":"true"}"#]);
    assert_eq!(job["max_retries"], 7);

    assert!(!sb.run(&["config", "set", "backoff-base", "0"]).status.success());
    assert!(!sb.run(&["config", "set", "colour", "blue"]).status.success());
    assert_eq!(sb.json(&["config", "get", "colour"]), serde_json::Value::Null);
}

#[test]
fn test_dlq_retry_unknown_job_fails() {
    let sb = Sandbox::new();

    let dlq = sb.json(&["dlq", "list"]);
    assert_eq!(dlq.as_array().map(Vec::len), Some(0));

    let output = sb.run(&["dlq", "retry", "nope"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("NOT_FOUND"));

    sb.json(&["enqueue", r#"{"id":"p","command":"true"}"#]);
    let output = sb.run(&["dlq", "retry", "p"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_worker_stop_without_pools_is_not_an_error() {
    let sb = Sandbox::new();
    let output = sb.run(&["worker", "stop"]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("No running worker pools"));
}
