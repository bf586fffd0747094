//! HTTP wire DTOs for the daemon's `/api/v1/jobs` and `/health/*` routes.
//!
//! Kept alongside the core `Job`/`JobSummary` types rather than in
//! `arsvc-daemon` so request/response shapes and the validation in
//! `validate.rs` live in one no-I/O crate. The wire contract uses
//! `job_id`, distinct from the internal model's `id`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Inventory, Job, JobResult, JobStatus, JobSummary, Options};

/// `202` response body for an accepted async submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmitResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&Job> for JobSubmitResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            created_at: job.created_at,
        }
    }
}

/// `200` response body for a synchronous run: the runner's result,
/// unwrapped, with no job record involved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSyncResponse {
    pub status: String,
    pub rc: i32,
    pub stdout: String,
    pub stats: Value,
}

/// `200` response body for `GET /api/v1/jobs/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDetailResponse {
    pub job_id: Uuid,
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

impl From<Job> for JobDetailResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            playbook: job.playbook,
            extra_vars: job.extra_vars,
            inventory: job.inventory,
            options: job.options,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            result: job.result,
            error: job.error,
            source_type: job.source_type,
            source_target: job.source_target,
            source_repo: job.source_repo,
            source_branch: job.source_branch,
        }
    }
}

/// One entry of `GET /api/v1/jobs`'s `jobs` array — a smaller projection
/// than the detail response, matching the original's list/detail split.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummaryResponse {
    pub job_id: Uuid,
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

impl From<JobSummary> for JobSummaryResponse {
    fn from(s: JobSummary) -> Self {
        Self {
            job_id: s.id,
            status: s.status,
            playbook: s.playbook,
            created_at: s.created_at,
            started_at: s.started_at,
            finished_at: s.finished_at,
            source_type: s.source_type,
            source_target: s.source_target,
        }
    }
}

/// `200` response body for `GET /api/v1/jobs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobSummaryResponse>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

pub const DEFAULT_LIST_LIMIT: i64 = 20;
pub const MAX_LIST_LIMIT: i64 = 100;

/// Clamps an optional client-supplied limit to `[1, MAX_LIST_LIMIT]`,
/// defaulting to `DEFAULT_LIST_LIMIT` when absent.
pub fn effective_limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthLiveResponse {
    pub status: &'static str,
}

impl Default for HealthLiveResponse {
    fn default() -> Self {
        Self { status: "ok" }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReadyResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl HealthReadyResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok",
            reason: None,
        }
    }

    pub fn error(reason: String) -> Self {
        Self {
            status: "error",
            reason: Some(reason),
        }
    }
}

/// `400` error body, shared across validation / policy / sync-unsupported
/// rejections per spec §7 ("map all of these to a single client-visible
/// 400 invalid source" for policy errors; other 400s carry their own
/// message but the same shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(msg: impl Into<String>) -> Self {
        Self { error: msg.into() }
    }
}
