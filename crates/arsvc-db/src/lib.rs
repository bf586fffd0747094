//! Durable Store: the relational record of every job and its terminal
//! state. Postgres via sqlx, free functions over `&PgPool` in the style the
//! rest of this service's data-access layer follows — no repository
//! struct, no hidden connection-pool singleton.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use arsvc_schemas::{Inventory, Job, JobResult, JobStatus, JobSummary, Options};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use uuid::Uuid;

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// Connect to Postgres using `DATABASE_URL`.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DATABASE_URL)
        .with_context(|| format!("missing env var {ENV_DATABASE_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded sqlx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_jobs_table: bool,
}

/// Connectivity + schema-presence probe, used by the readiness endpoint.
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as(
        r#"
        select exists (
            select 1 from information_schema.tables
            where table_schema = 'public' and table_name = 'jobs'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_jobs_table: exists,
    })
}

/// Insert a new job row. Atomic single-statement insert per spec §4.C.
pub async fn create_job(pool: &PgPool, job: &Job) -> Result<()> {
    let extra_vars = serde_json::to_value(&job.extra_vars)?;
    let inventory = serde_json::to_value(&job.inventory)?;
    let options = job.options.as_ref().map(serde_json::to_value).transpose()?;

    sqlx::query(
        r#"
        insert into jobs (
            id, status, playbook, extra_vars, inventory, options, created_at,
            started_at, finished_at, result_rc, result_stdout, result_stats, error,
            source_type, source_target, source_repo, source_branch
        ) values (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17
        )
        "#,
    )
    .bind(job.id)
    .bind(job.status.as_str())
    .bind(&job.playbook)
    .bind(extra_vars)
    .bind(inventory)
    .bind(options)
    .bind(job.created_at)
    .bind(job.started_at)
    .bind(job.finished_at)
    .bind(job.result.as_ref().map(|r| r.rc))
    .bind(job.result.as_ref().map(|r| r.stdout.clone()))
    .bind(job.result.as_ref().map(|r| r.stats.clone()))
    .bind(&job.error)
    .bind(&job.source_type)
    .bind(&job.source_target)
    .bind(&job.source_repo)
    .bind(&job.source_branch)
    .execute(pool)
    .await
    .context("create_job failed")?;

    Ok(())
}

/// Lookup by primary key.
pub async fn get_job(pool: &PgPool, id: Uuid) -> Result<Option<Job>> {
    let row = sqlx::query("select * from jobs where id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("get_job failed")?;

    row.map(|r| row_to_job(&r)).transpose()
}

/// Fields that may change on a status transition. Only `Some` fields are
/// applied; unset fields keep their prior durable value (a job's recorded
/// fields only ever move forward, never reset).
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<JobResult>,
    pub error: Option<String>,
}

/// Partial update of a job's status and terminal fields. Returns whether
/// the row existed.
pub async fn update_job_status(
    pool: &PgPool,
    id: Uuid,
    status: JobStatus,
    update: &StatusUpdate,
) -> Result<bool> {
    let result_stats = update
        .result
        .as_ref()
        .map(|r| r.stats.clone());

    let rows = sqlx::query(
        r#"
        update jobs set
            status        = $2,
            started_at    = coalesce($3, started_at),
            finished_at   = coalesce($4, finished_at),
            result_rc     = coalesce($5, result_rc),
            result_stdout = coalesce($6, result_stdout),
            result_stats  = coalesce($7, result_stats),
            error         = coalesce($8, error)
        where id = $1
        "#,
    )
    .bind(id)
    .bind(status.as_str())
    .bind(update.started_at)
    .bind(update.finished_at)
    .bind(update.result.as_ref().map(|r| r.rc))
    .bind(update.result.as_ref().map(|r| r.stdout.clone()))
    .bind(result_stats)
    .bind(&update.error)
    .execute(pool)
    .await
    .context("update_job_status failed")?
    .rows_affected();

    Ok(rows > 0)
}

/// Ordered by `created_at DESC`; `total` counts the filtered set before
/// pagination is applied.
pub async fn list_jobs(
    pool: &PgPool,
    status_filter: Option<JobStatus>,
    limit: i64,
    offset: i64,
) -> Result<(Vec<JobSummary>, i64)> {
    let total: i64 = match status_filter {
        Some(s) => {
            sqlx::query_scalar("select count(*) from jobs where status = $1")
                .bind(s.as_str())
                .fetch_one(pool)
                .await
        }
        None => {
            sqlx::query_scalar("select count(*) from jobs")
                .fetch_one(pool)
                .await
        }
    }
    .context("list_jobs count failed")?;

    let rows = match status_filter {
        Some(s) => {
            sqlx::query(
                r#"
                select id, status, playbook, created_at, started_at, finished_at,
                       source_type, source_target
                from jobs
                where status = $1
                order by created_at desc
                limit $2 offset $3
                "#,
            )
            .bind(s.as_str())
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query(
                r#"
                select id, status, playbook, created_at, started_at, finished_at,
                       source_type, source_target
                from jobs
                order by created_at desc
                limit $1 offset $2
                "#,
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
        }
    }
    .context("list_jobs select failed")?;

    let jobs = rows
        .iter()
        .map(row_to_job_summary)
        .collect::<Result<Vec<_>>>()?;

    Ok((jobs, total))
}

/// Rows with `status = 'running'` whose `started_at` is older than
/// `threshold`. Used by startup recovery.
pub async fn list_stale_running_jobs(pool: &PgPool, threshold: Duration) -> Result<Vec<Job>> {
    let threshold_secs = threshold.as_secs() as f64;

    let rows = sqlx::query(
        r#"
        select * from jobs
        where status = 'running'
          and started_at is not null
          and started_at < now() - make_interval(secs => $1)
        "#,
    )
    .bind(threshold_secs)
    .fetch_all(pool)
    .await
    .context("list_stale_running_jobs failed")?;

    rows.iter().map(row_to_job).collect()
}

fn row_to_job(row: &sqlx::postgres::PgRow) -> Result<Job> {
    let status_str: String = row.try_get("status")?;
    let status: JobStatus = status_str.parse()?;

    let extra_vars_json: Value = row.try_get("extra_vars")?;
    let extra_vars: BTreeMap<String, Value> = serde_json::from_value(extra_vars_json)?;

    let inventory_json: Value = row.try_get("inventory")?;
    let inventory: Inventory = serde_json::from_value(inventory_json)?;

    let options_json: Option<Value> = row.try_get("options")?;
    let options: Option<Options> = options_json.map(serde_json::from_value).transpose()?;

    let result_rc: Option<i32> = row.try_get("result_rc")?;
    let result_stdout: Option<String> = row.try_get("result_stdout")?;
    let result_stats: Option<Value> = row.try_get("result_stats")?;
    let result = match (result_rc, result_stdout, result_stats) {
        (Some(rc), Some(stdout), Some(stats)) => Some(JobResult { rc, stdout, stats }),
        _ => None,
    };

    Ok(Job {
        id: row.try_get("id")?,
        status,
        playbook: row.try_get("playbook")?,
        extra_vars,
        inventory,
        options,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        result,
        error: row.try_get("error")?,
        source_type: row.try_get("source_type")?,
        source_target: row.try_get("source_target")?,
        source_repo: row.try_get("source_repo")?,
        source_branch: row.try_get("source_branch")?,
    })
}

fn row_to_job_summary(row: &sqlx::postgres::PgRow) -> Result<JobSummary> {
    let status_str: String = row.try_get("status")?;
    Ok(JobSummary {
        id: row.try_get("id")?,
        status: status_str.parse()?,
        playbook: row.try_get("playbook")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        finished_at: row.try_get("finished_at")?,
        source_type: row.try_get("source_type")?,
        source_target: row.try_get("source_target")?,
    })
}
