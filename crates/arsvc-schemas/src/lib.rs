//! Shared wire/data types for the job orchestration service.
//!
//! These are plain serde DTOs with no I/O. They are shared by the HTTP
//! layer, the queue encoding, the two-tier store, and the worker so that a
//! single definition of "what a job looks like" flows through the whole
//! system.

pub mod http;
mod validate;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use validate::{JobSubmission, ValidationError};

// ---------------------------------------------------------------------------
// Job status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Successful,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Successful => "successful",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Successful | JobStatus::Failed)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "successful" => Ok(JobStatus::Successful),
            "failed" => Ok(JobStatus::Failed),
            other => Err(anyhow::anyhow!("unknown job status '{other}'")),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Source descriptor (tagged union carried on the queue and in the job row)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceDescriptor {
    Local {
        target: SourceTarget,
        /// Playbook-relative path. Set for `target = playbook`.
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        /// Set for `target = role`.
        #[serde(skip_serializing_if = "Option::is_none")]
        collection: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        role_vars: Option<BTreeMap<String, Value>>,
    },
    Git {
        target: SourceTarget,
        repo: String,
        branch: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        role_vars: Option<BTreeMap<String, Value>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTarget {
    Playbook,
    Role,
}

impl SourceDescriptor {
    pub fn source_type(&self) -> &'static str {
        match self {
            SourceDescriptor::Local { .. } => "local",
            SourceDescriptor::Git { .. } => "git",
        }
    }

    pub fn source_target(&self) -> SourceTarget {
        match self {
            SourceDescriptor::Local { target, .. } => *target,
            SourceDescriptor::Git { target, .. } => *target,
        }
    }

    pub fn repo(&self) -> Option<&str> {
        match self {
            SourceDescriptor::Git { repo, .. } => Some(repo.as_str()),
            SourceDescriptor::Local { .. } => None,
        }
    }

    pub fn branch(&self) -> Option<&str> {
        match self {
            SourceDescriptor::Git { branch, .. } => Some(branch.as_str()),
            SourceDescriptor::Local { .. } => None,
        }
    }

    pub fn is_git(&self) -> bool {
        matches!(self, SourceDescriptor::Git { .. })
    }

    /// Display/storage name, per spec: the relative playbook path for
    /// playbook sources, the short role name for role sources.
    pub fn display_name(&self) -> String {
        match self {
            SourceDescriptor::Local {
                target: SourceTarget::Playbook,
                path,
                ..
            } => path.clone().unwrap_or_default(),
            SourceDescriptor::Local {
                target: SourceTarget::Role,
                role,
                ..
            } => role.clone().unwrap_or_default(),
            SourceDescriptor::Git {
                target: SourceTarget::Playbook,
                path,
                ..
            } => path.clone().unwrap_or_default(),
            SourceDescriptor::Git {
                target: SourceTarget::Role,
                role,
                ..
            } => role.clone().unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Inventory {
    Literal(String),
    Inline(InlineInventory),
    Git(GitInventory),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineInventory {
    #[serde(rename = "type")]
    pub kind: InlineTag,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InlineTag {
    Inline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitInventory {
    #[serde(rename = "type")]
    pub kind: GitTag,
    pub repo: String,
    pub branch: String,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GitTag {
    Git,
}

impl Inventory {
    pub fn is_git(&self) -> bool {
        matches!(self, Inventory::Git(_))
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Options {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub check: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault_password_file: Option<String>,
}

impl Options {
    pub fn verbosity_in_range(&self) -> bool {
        self.verbosity.map(|v| v <= 4).unwrap_or(true)
    }
}

// ---------------------------------------------------------------------------
// Job result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub rc: i32,
    pub stdout: String,
    pub stats: Value,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub status: JobStatus,
    pub playbook: String,
    pub extra_vars: BTreeMap<String, Value>,
    pub inventory: Inventory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Options>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub source_type: String,
    pub source_target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_repo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_branch: Option<String>,
}

impl Job {
    /// Invariant: terminal status implies `finished_at` is set, and
    /// `result.rc == 0` iff `status == successful` when a result is present.
    pub fn check_terminal_invariant(&self) -> bool {
        if !self.status.is_terminal() {
            return true;
        }
        if self.finished_at.is_none() {
            return false;
        }
        if let Some(result) = &self.result {
            return (result.rc == 0) == (self.status == JobStatus::Successful);
        }
        true
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id,
            status: self.status,
            playbook: self.playbook.clone(),
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            source_type: self.source_type.clone(),
            source_target: self.source_target.clone(),
        }
    }
}

/// Lightweight projection of a `Job` used for list responses: omits
/// `extra_vars` and `result.stdout` to keep list payloads small.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: Uuid,
    pub status: JobStatus,
    pub playbook: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub source_type: String,
    pub source_target: String,
}

// ---------------------------------------------------------------------------
// Git provider policy record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    Azure,
    Gitlab,
}

impl ProviderType {
    /// Username embedded in the clone URL for this provider type. The
    /// credential itself is never substituted into the URL.
    pub fn url_username(&self) -> &'static str {
        match self {
            ProviderType::Azure => "pat",
            ProviderType::Gitlab => "oauth2",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitProvider {
    #[serde(rename = "type")]
    pub kind: ProviderType,
    pub host: String,
    pub orgs: Vec<String>,
    pub credential_env: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_round_trips_through_str() {
        for s in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Successful,
            JobStatus::Failed,
        ] {
            let parsed: JobStatus = s.as_str().parse().unwrap();
            assert_eq!(parsed, s);
        }
    }

    #[test]
    fn terminal_invariant_holds_for_pending() {
        let job = Job {
            id: Uuid::nil(),
            status: JobStatus::Pending,
            playbook: "hello.yml".into(),
            extra_vars: BTreeMap::new(),
            inventory: Inventory::Literal("localhost,".into()),
            options: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
            source_type: "local".into(),
            source_target: "playbook".into(),
            source_repo: None,
            source_branch: None,
        };
        assert!(job.check_terminal_invariant());
    }

    #[test]
    fn terminal_invariant_rejects_successful_without_finished_at() {
        let mut job = Job {
            id: Uuid::nil(),
            status: JobStatus::Successful,
            playbook: "hello.yml".into(),
            extra_vars: BTreeMap::new(),
            inventory: Inventory::Literal("localhost,".into()),
            options: None,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            finished_at: None,
            result: Some(JobResult {
                rc: 0,
                stdout: String::new(),
                stats: Value::Null,
            }),
            error: None,
            source_type: "local".into(),
            source_target: "playbook".into(),
            source_repo: None,
            source_branch: None,
        };
        assert!(!job.check_terminal_invariant());
        job.finished_at = Some(Utc::now());
        assert!(job.check_terminal_invariant());
    }

    #[test]
    fn rc_mismatch_violates_invariant() {
        let job = Job {
            id: Uuid::nil(),
            status: JobStatus::Successful,
            playbook: "hello.yml".into(),
            extra_vars: BTreeMap::new(),
            inventory: Inventory::Literal("localhost,".into()),
            options: None,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            finished_at: Some(Utc::now()),
            result: Some(JobResult {
                rc: 2,
                stdout: String::new(),
                stats: Value::Null,
            }),
            error: None,
            source_type: "local".into(),
            source_target: "playbook".into(),
            source_repo: None,
            source_branch: None,
        };
        assert!(!job.check_terminal_invariant());
    }

    #[test]
    fn source_descriptor_display_name() {
        let src = SourceDescriptor::Git {
            target: SourceTarget::Role,
            repo: "https://gitlab.company.com/team/col.git".into(),
            branch: "main".into(),
            path: None,
            role: Some("nginx".into()),
            role_vars: None,
        };
        assert_eq!(src.display_name(), "nginx");
        assert!(src.is_git());
    }
}
