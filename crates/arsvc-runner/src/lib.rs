//! Playbook Runner: invokes the external Ansible tool as a child process
//! inside a fresh per-run temp directory and collects its result.
//!
//! The runner does not interpret playbook failure — a non-zero return
//! code is a normal outcome, not a runner-level error. `RunnerError` is
//! reserved for cases where the child process itself could not be spawned
//! or did not complete within its timeout.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use arsvc_schemas::Options;
use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("runner_spawn_failed: {0}")]
    SpawnFailed(String),
    #[error("runner_timeout: ansible-playbook did not complete within the configured timeout")]
    Timeout,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub enum InventoryInput {
    /// Path to an inventory file (materialized inline-inventory, cloned
    /// git-inventory, or a plain inventory file on disk).
    Path(PathBuf),
    /// A literal inventory spec string, e.g. `"localhost,"`.
    Literal(String),
}

#[derive(Debug, Clone)]
pub struct RunSpec {
    /// Absolute, or playbooks-dir-relative, playbook path.
    pub playbook: PathBuf,
    pub extra_vars: BTreeMap<String, Value>,
    pub inventory: InventoryInput,
    pub envvars: BTreeMap<String, String>,
    pub options: Option<Options>,
    /// Working directory the child process is spawned in (the clone root
    /// for Git sources, the playbooks dir for local sources).
    pub working_dir: PathBuf,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    /// The runtime's own status string: `"successful"` when `rc == 0`,
    /// `"failed"` otherwise.
    pub status: String,
    pub rc: i32,
    pub stdout: String,
    pub stats: Value,
}

impl RunResult {
    pub fn from_rc(rc: i32, stdout: String, stats: Value) -> Self {
        Self {
            status: if rc == 0 { "successful" } else { "failed" }.to_string(),
            rc,
            stdout,
            stats,
        }
    }
}

#[async_trait]
pub trait PlaybookRunner: Send + Sync {
    async fn run(&self, spec: &RunSpec) -> Result<RunResult, RunnerError>;
}

/// Maps `Options` onto `ansible-playbook` CLI flags per the fixed table:
/// tags/skip-tags (comma-joined), limit, verbosity (repeated `-v`), check,
/// diff.
fn options_to_args(options: &Options) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(tags) = &options.tags {
        if !tags.is_empty() {
            args.push("--tags".to_string());
            args.push(tags.join(","));
        }
    }
    if let Some(skip_tags) = &options.skip_tags {
        if !skip_tags.is_empty() {
            args.push("--skip-tags".to_string());
            args.push(skip_tags.join(","));
        }
    }
    if let Some(limit) = &options.limit {
        args.push("--limit".to_string());
        args.push(limit.clone());
    }
    if let Some(v) = options.verbosity {
        if v > 0 {
            args.push(format!("-{}", "v".repeat(v as usize)));
        }
    }
    if options.check.unwrap_or(false) {
        args.push("--check".to_string());
    }
    if options.diff.unwrap_or(false) {
        args.push("--diff".to_string());
    }
    if let Some(vault_file) = &options.vault_password_file {
        args.push("--vault-password-file".to_string());
        args.push(vault_file.clone());
    }

    args
}

/// Production `PlaybookRunner`: spawns the real `ansible-playbook` binary.
pub struct AnsibleCliRunner;

impl Default for AnsibleCliRunner {
    fn default() -> Self {
        Self
    }
}

#[async_trait]
impl PlaybookRunner for AnsibleCliRunner {
    async fn run(&self, spec: &RunSpec) -> Result<RunResult, RunnerError> {
        let bin = which::which("ansible-playbook")
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|_| "ansible-playbook".to_string());

        let inventory_arg = match &spec.inventory {
            InventoryInput::Path(p) => p.to_string_lossy().to_string(),
            InventoryInput::Literal(s) => s.clone(),
        };

        let extra_vars_json = serde_json::to_string(&spec.extra_vars)?;

        let mut cmd = Command::new(bin);
        cmd.current_dir(&spec.working_dir)
            .arg(&spec.playbook)
            .args(["-i", &inventory_arg])
            .args(["--extra-vars", &extra_vars_json])
            .env("ANSIBLE_STDOUT_CALLBACK", "json")
            .env("ANSIBLE_HOST_KEY_CHECKING", "False")
            .envs(&spec.envvars);

        if let Some(options) = &spec.options {
            cmd.args(options_to_args(options));
        }

        let output = match tokio::time::timeout(spec.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| RunnerError::SpawnFailed(e.to_string()))?,
            Err(_) => return Err(RunnerError::Timeout),
        };

        let rc = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stats = parse_stats(&stdout);

        Ok(RunResult::from_rc(rc, stdout, stats))
    }
}

/// Parses the `stats` object out of the `ansible.posix.json` (or stock
/// `json`) stdout callback's top-level document.
fn parse_stats(stdout: &str) -> Value {
    serde_json::from_str::<Value>(stdout)
        .ok()
        .and_then(|v| v.get("stats").cloned())
        .unwrap_or(Value::Null)
}

/// Test double used by worker/daemon unit tests — returns a
/// pre-configured canned result instead of spawning a real process.
pub struct FakeRunner {
    pub result: Result<RunResult, String>,
}

impl FakeRunner {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            result: Ok(RunResult::from_rc(0, stdout.into(), Value::Null)),
        }
    }

    pub fn failure(rc: i32, stdout: impl Into<String>) -> Self {
        Self {
            result: Ok(RunResult::from_rc(rc, stdout.into(), Value::Null)),
        }
    }
}

#[async_trait]
impl PlaybookRunner for FakeRunner {
    async fn run(&self, _spec: &RunSpec) -> Result<RunResult, RunnerError> {
        match &self.result {
            Ok(r) => Ok(r.clone()),
            Err(e) => Err(RunnerError::SpawnFailed(e.clone())),
        }
    }
}

pub fn ensure_ansible_playbook_available() -> bool {
    which::which("ansible-playbook").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_map_tags_and_skip_tags_as_comma_joined() {
        let options = Options {
            tags: Some(vec!["a".to_string(), "b".to_string()]),
            skip_tags: Some(vec!["c".to_string()]),
            ..Default::default()
        };
        let args = options_to_args(&options);
        assert_eq!(args, vec!["--tags", "a,b", "--skip-tags", "c"]);
    }

    #[test]
    fn options_map_check_and_diff_as_bare_flags() {
        let options = Options {
            check: Some(true),
            diff: Some(true),
            ..Default::default()
        };
        let args = options_to_args(&options);
        assert!(args.contains(&"--check".to_string()));
        assert!(args.contains(&"--diff".to_string()));
    }

    #[test]
    fn verbosity_maps_to_repeated_v_flag() {
        let options = Options {
            verbosity: Some(3),
            ..Default::default()
        };
        let args = options_to_args(&options);
        assert_eq!(args, vec!["-vvv"]);
    }

    #[test]
    fn zero_verbosity_adds_no_flag() {
        let options = Options {
            verbosity: Some(0),
            ..Default::default()
        };
        assert!(options_to_args(&options).is_empty());
    }

    #[test]
    fn parse_stats_extracts_stats_object() {
        let stdout = r#"{"plays": [], "stats": {"localhost": {"ok": 2, "failures": 0}}}"#;
        let stats = parse_stats(stdout);
        assert_eq!(stats["localhost"]["ok"], 2);
    }

    #[test]
    fn parse_stats_is_null_on_unparseable_stdout() {
        assert_eq!(parse_stats("not json"), Value::Null);
    }

    #[tokio::test]
    async fn fake_runner_returns_canned_result() {
        let runner = FakeRunner::success("Hello, Claude!");
        let spec = RunSpec {
            playbook: PathBuf::from("hello.yml"),
            extra_vars: BTreeMap::new(),
            inventory: InventoryInput::Literal("localhost,".to_string()),
            envvars: BTreeMap::new(),
            options: None,
            working_dir: PathBuf::from("."),
            timeout: Duration::from_secs(5),
        };
        let result = runner.run(&spec).await.unwrap();
        assert_eq!(result.rc, 0);
        assert_eq!(result.status, "successful");
        assert!(result.stdout.contains("Hello, Claude!"));
    }
}
