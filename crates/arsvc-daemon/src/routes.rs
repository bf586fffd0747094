//! Axum router and HTTP handlers for arsvc-daemon: Request Intake (spec
//! §4.I) and health probes (spec §4.J).
//!
//! `build_router` is the single entry point; `main.rs` attaches
//! middleware after calling it so tests can exercise the bare router.

use std::collections::BTreeMap;

use arsvc_queue::{JobDescriptor, JobPayload};
use arsvc_runner::{InventoryInput, PlaybookRunner, RunSpec};
use arsvc_schemas::http::{
    effective_limit, ErrorResponse, HealthLiveResponse, HealthReadyResponse, JobDetailResponse,
    JobListResponse, JobSubmitResponse, JobSummaryResponse, JobSyncResponse,
};
use arsvc_schemas::{
    Inventory, JobStatus, JobSubmission, SourceDescriptor, SourceTarget, ValidationError,
};
use arsvc_store::NewJob;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/jobs", post(submit_job).get(list_jobs))
        .route("/api/v1/jobs/:id", get(get_job))
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// POST /api/v1/jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SubmitQuery {
    #[serde(default)]
    pub sync: bool,
}

pub(crate) async fn submit_job(
    State(state): State<AppState>,
    Query(q): Query<SubmitQuery>,
    Json(submission): Json<JobSubmission>,
) -> Response {
    if let Err(e) = submission.validate(q.sync) {
        return validation_error_response(e);
    }

    if submission.source.is_git() {
        if let Err(e) = state.config.providers.resolve(submission.source.repo().unwrap()) {
            tracing::warn!(error = %e, "git source rejected by provider policy");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("invalid source")),
            )
                .into_response();
        }
    }
    if let Inventory::Git(git_inv) = &submission.inventory {
        if let Err(e) = state.config.providers.resolve(&git_inv.repo) {
            tracing::warn!(error = %e, "git inventory rejected by provider policy");
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("invalid source")),
            )
                .into_response();
        }
    }

    if q.sync {
        return run_sync(&state, &submission).await;
    }

    let new_job = NewJob {
        playbook: submission.source.display_name(),
        extra_vars: submission.extra_vars.clone(),
        inventory: submission.inventory.clone(),
        options: submission.options.clone(),
        source_type: submission.source.source_type().to_string(),
        source_target: source_target_str(submission.source.source_target()).to_string(),
        source_repo: submission.source.repo().map(str::to_string),
        source_branch: submission.source.branch().map(str::to_string),
    };

    let job = match state.store.create_job(new_job).await {
        Ok(job) => job,
        Err(e) => {
            tracing::error!(error = %e, "create_job failed");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("failed to create job")),
            )
                .into_response();
        }
    };

    let descriptor = JobDescriptor {
        job_id: job.id,
        payload: JobPayload {
            job_id: job.id,
            playbook: job.playbook.clone(),
            extra_vars: job.extra_vars.clone(),
            inventory: job.inventory.clone(),
            source_config: Some(submission.source.clone()),
            options: job.options.clone(),
        },
    };

    if let Err(e) = state.queue.enqueue(&descriptor).await {
        tracing::error!(job_id = %job.id, error = %e, "enqueue failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new("failed to enqueue job")),
        )
            .into_response();
    }

    (
        StatusCode::ACCEPTED,
        Json(JobSubmitResponse::from(&job)),
    )
        .into_response()
}

fn source_target_str(t: SourceTarget) -> &'static str {
    match t {
        SourceTarget::Playbook => "playbook",
        SourceTarget::Role => "role",
    }
}

/// Every `ValidationError` variant maps to `400` per spec §7
/// (`validation_error` and `sync_unsupported` both surface as `400`).
fn validation_error_response(e: ValidationError) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e.to_string()))).into_response()
}

/// Executes the runner inline for a local source and returns the full
/// result. Only reached when `validate(sync=true)` has already rejected
/// git sources and git inventory.
async fn run_sync(state: &AppState, submission: &JobSubmission) -> Response {
    let job_dir = match tempfile::tempdir() {
        Ok(d) => d,
        Err(e) => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response()
        }
    };

    let inventory = match &submission.inventory {
        Inventory::Literal(s) => InventoryInput::Literal(s.clone()),
        Inventory::Inline(inline) => {
            let yaml = match serde_yaml::to_string(&inline.data) {
                Ok(y) => y,
                Err(e) => {
                    return (
                        StatusCode::BAD_REQUEST,
                        Json(ErrorResponse::new(e.to_string())),
                    )
                        .into_response()
                }
            };
            let path = job_dir.path().join("inventory.yml");
            if let Err(e) = tokio::fs::write(&path, yaml).await {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(e.to_string())),
                )
                    .into_response();
            }
            InventoryInput::Path(path)
        }
        // Unreachable: validate() rejects git inventory for sync=true.
        Inventory::Git(_) => unreachable!("sync submission with git inventory passed validation"),
    };

    let (playbook, working_dir, envvars) = match &submission.source {
        SourceDescriptor::Local {
            target: SourceTarget::Playbook,
            path,
            ..
        } => {
            let rel = path.clone().unwrap_or_default();
            let playbook = state.config.playbooks_dir.join(&rel);
            if !playbook.exists() {
                return (
                    StatusCode::NOT_FOUND,
                    Json(ErrorResponse::new(format!("playbook not found: {rel}"))),
                )
                    .into_response();
            }
            (playbook, state.config.playbooks_dir.clone(), BTreeMap::new())
        }
        SourceDescriptor::Local {
            target: SourceTarget::Role,
            collection,
            role,
            role_vars,
            ..
        } => {
            let fqcn = format!(
                "{}.{}",
                collection.clone().unwrap_or_default(),
                role.clone().unwrap_or_default()
            );
            let yaml = match arsvc_git::wrapper_playbook(&fqcn, &role_vars.clone().unwrap_or_default()) {
                Ok(y) => y,
                Err(e) => {
                    return (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(ErrorResponse::new(e.to_string())),
                    )
                        .into_response()
                }
            };
            let wrapper_path = job_dir.path().join("wrapper.yml");
            if let Err(e) = tokio::fs::write(&wrapper_path, yaml).await {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse::new(e.to_string())),
                )
                    .into_response();
            }
            let mut envvars = BTreeMap::new();
            envvars.insert(
                "ANSIBLE_COLLECTIONS_PATH".to_string(),
                state.config.collections_dir.to_string_lossy().to_string(),
            );
            (wrapper_path, job_dir.path().to_path_buf(), envvars)
        }
        // Unreachable: validate() rejects git sources for sync=true.
        SourceDescriptor::Git { .. } => {
            unreachable!("sync submission with git source passed validation")
        }
    };

    let spec = RunSpec {
        playbook,
        extra_vars: submission.extra_vars.clone(),
        inventory,
        envvars,
        options: submission.options.clone(),
        working_dir,
        timeout: std::time::Duration::from_secs(3600),
    };

    match state.sync_runner.run(&spec).await {
        Ok(result) => (
            StatusCode::OK,
            Json(JobSyncResponse {
                status: result.status,
                rc: result.rc,
                stdout: result.stdout,
                stats: result.stats,
            }),
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::new(e.to_string())),
        )
            .into_response(),
    }
}

// ---------------------------------------------------------------------------
// GET /api/v1/jobs/{id}
// ---------------------------------------------------------------------------

pub(crate) async fn get_job(State(state): State<AppState>, Path(id): Path<Uuid>) -> Response {
    match state.store.get_job(id).await {
        Ok(Some(job)) => (StatusCode::OK, Json(JobDetailResponse::from(job))).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("job not found")),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(job_id = %id, error = %e, "get_job failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("failed to read job")),
            )
                .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// GET /api/v1/jobs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: i64,
}

pub(crate) async fn list_jobs(State(state): State<AppState>, Query(q): Query<ListQuery>) -> Response {
    let status_filter = match q.status.as_deref().map(str::parse::<JobStatus>) {
        Some(Ok(s)) => Some(s),
        Some(Err(_)) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("unknown status filter")),
            )
                .into_response()
        }
        None => None,
    };

    let limit = effective_limit(q.limit);
    let offset = q.offset.max(0);

    match arsvc_db::list_jobs(state.store.pool(), status_filter, limit, offset).await {
        Ok((jobs, total)) => (
            StatusCode::OK,
            Json(JobListResponse {
                jobs: jobs.into_iter().map(JobSummaryResponse::from).collect(),
                total,
                limit,
                offset,
            }),
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "list_jobs failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new("failed to list jobs")),
            )
                .into_response()
        }
    }
}

// ---------------------------------------------------------------------------
// GET /health/live
// ---------------------------------------------------------------------------

pub(crate) async fn health_live() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthLiveResponse::default()))
}

// ---------------------------------------------------------------------------
// GET /health/ready
// ---------------------------------------------------------------------------

pub(crate) async fn health_ready(State(state): State<AppState>) -> Response {
    let db_result = arsvc_db::status(state.store.pool()).await;
    let cache_result = state.store.cache().roundtrip().await;

    let mut reasons = Vec::new();
    match &db_result {
        Ok(s) if s.ok => {}
        Ok(_) => reasons.push("database connectivity check failed".to_string()),
        Err(e) => reasons.push(format!("database unreachable: {e}")),
    }
    if let Err(e) = &cache_result {
        reasons.push(format!("cache unreachable: {e}"));
    }

    if reasons.is_empty() {
        (StatusCode::OK, Json(HealthReadyResponse::ok())).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthReadyResponse::error(reasons.join(", "))),
        )
            .into_response()
    }
}
