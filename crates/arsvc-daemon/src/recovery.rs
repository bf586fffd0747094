//! Startup recovery: jobs whose durable status is `running` but whose
//! ephemeral record is absent are abandoned — the worker that owned them
//! crashed or was killed before it could record a terminal status.
//!
//! Matches `main.py`'s `lifespan` startup hook in the source this is
//! rewritten from: called once before the server starts accepting
//! traffic, non-fatal on error so a broken durable/ephemeral connection
//! never blocks startup (the readiness probe will report it instead).

use arsvc_cache::EphemeralStore;
use chrono::Utc;
use sqlx::PgPool;
use std::time::Duration;

/// Lists stale-running durable jobs and, for each one absent from
/// ephemeral, marks it `failed` with the crash-recovery error message.
/// Returns the number of jobs recovered.
pub async fn recover_stale_jobs(
    pool: &PgPool,
    cache: &EphemeralStore,
    threshold: Duration,
) -> anyhow::Result<usize> {
    let stale = arsvc_db::list_stale_running_jobs(pool, threshold).await?;
    let mut recovered = 0;

    for job in stale {
        if cache.exists(job.id).await? {
            continue;
        }

        let existed = arsvc_db::update_job_status(
            pool,
            job.id,
            arsvc_schemas::JobStatus::Failed,
            &arsvc_db::StatusUpdate {
                finished_at: Some(Utc::now()),
                error: Some("Worker crashed or timed out".to_string()),
                ..Default::default()
            },
        )
        .await?;

        if existed {
            tracing::warn!(job_id = %job.id, "recovered abandoned running job, marked failed");
            recovered += 1;
        }
    }

    Ok(recovered)
}

