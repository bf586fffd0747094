//! Two-Tier Job Store — the central composite. Wraps the durable store
//! (`arsvc-db`) and the ephemeral store (`arsvc-cache`) with a
//! strict-consistency contract that is deliberately asymmetric between
//! create and update:
//!
//! - `create_job` writes ephemeral first, then durable; a durable failure
//!   rolls back the ephemeral write.
//! - `update_status` writes durable first, then ephemeral; an ephemeral
//!   failure is not rolled back and is not propagated — the next
//!   `get_job` recovers via the durable fallback path.
//!
//! The asymmetry is deliberate: on create we tolerate an orphan ephemeral
//! record (harmless — a later durable write is authoritative); on update
//! we must never show a status in ephemeral that durable does not also
//! show, or a post-TTL read would appear to regress.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use arsvc_cache::EphemeralStore;
use arsvc_schemas::{Inventory, Job, JobResult, JobStatus, Options};
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

/// Inputs needed to create a new job. Everything else (`id`, `status`,
/// `created_at`) is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub playbook: String,
    pub extra_vars: BTreeMap<String, serde_json::Value>,
    pub inventory: Inventory,
    pub options: Option<Options>,
    pub source_type: String,
    pub source_target: String,
    pub source_repo: Option<String>,
    pub source_branch: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub started_at: Option<chrono::DateTime<Utc>>,
    pub finished_at: Option<chrono::DateTime<Utc>>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

impl From<StatusUpdate> for arsvc_db::StatusUpdate {
    fn from(u: StatusUpdate) -> Self {
        arsvc_db::StatusUpdate {
            started_at: u.started_at,
            finished_at: u.finished_at,
            result: u.result,
            error: u.error,
        }
    }
}

#[derive(Clone)]
pub struct JobStore {
    pool: PgPool,
    cache: EphemeralStore,
    ttl: Duration,
}

impl JobStore {
    pub fn new(pool: PgPool, cache: EphemeralStore, ttl: Duration) -> Self {
        Self { pool, cache, ttl }
    }

    /// 1. Build an in-memory Job with a fresh UUID and `status = pending`.
    /// 2. Write ephemeral first (with TTL).
    /// 3. Write durable.
    /// 4. If durable fails, delete the ephemeral key and propagate.
    pub async fn create_job(&self, new: NewJob) -> Result<Job> {
        let job = Job {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            playbook: new.playbook,
            extra_vars: new.extra_vars,
            inventory: new.inventory,
            options: new.options,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
            source_type: new.source_type,
            source_target: new.source_target,
            source_repo: new.source_repo,
            source_branch: new.source_branch,
        };

        self.cache
            .write_job(&job, self.ttl)
            .await
            .context("create_job: ephemeral write failed")?;

        if let Err(e) = arsvc_db::create_job(&self.pool, &job).await {
            if let Err(rollback_err) = self.cache.delete_job(job.id).await {
                tracing::warn!(
                    job_id = %job.id,
                    error = %rollback_err,
                    "failed to roll back ephemeral record after durable create failure"
                );
            }
            return Err(e.context("create_job: durable write failed, ephemeral rolled back"));
        }

        tracing::info!(job_id = %job.id, "job created");
        Ok(job)
    }

    /// 1. Write durable first. If it fails, propagate without touching
    ///    ephemeral.
    /// 2. Write ephemeral (subset update, TTL refreshed). A failure here is
    ///    logged but not propagated — the durable write already succeeded
    ///    and is authoritative.
    pub async fn update_status(
        &self,
        id: Uuid,
        status: JobStatus,
        update: StatusUpdate,
    ) -> Result<bool> {
        let db_update: arsvc_db::StatusUpdate = update.clone().into();
        let existed = arsvc_db::update_job_status(&self.pool, id, status, &db_update)
            .await
            .context("update_status: durable write failed")?;

        if !existed {
            return Ok(false);
        }

        let mut fields = BTreeMap::new();
        fields.insert("status".to_string(), status.as_str().to_string());
        if let Some(t) = update.started_at {
            fields.insert("started_at".to_string(), t.to_rfc3339());
        }
        if let Some(t) = update.finished_at {
            fields.insert("finished_at".to_string(), t.to_rfc3339());
        }
        if let Some(result) = &update.result {
            fields.insert("result".to_string(), serde_json::to_string(result)?);
        }
        if let Some(err) = &update.error {
            fields.insert("error".to_string(), err.clone());
        }

        if let Err(e) = self.cache.update_job_fields(id, fields, self.ttl).await {
            tracing::warn!(
                job_id = %id,
                error = %e,
                "ephemeral update failed after durable write succeeded; \
                 will be recovered by read fallback"
            );
        }

        Ok(true)
    }

    /// Read ephemeral; if present, return it. Else read durable; return
    /// that (`None` if absent). This transparent fallback is what lets a
    /// job survive TTL expiry of its ephemeral copy.
    pub async fn get_job(&self, id: Uuid) -> Result<Option<Job>> {
        if let Some(job) = self.cache.read_job(id).await.context("get_job: ephemeral read failed")? {
            return Ok(Some(job));
        }
        arsvc_db::get_job(&self.pool, id)
            .await
            .context("get_job: durable read failed")
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn cache(&self) -> &EphemeralStore {
        &self.cache
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
