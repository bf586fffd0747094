use std::collections::BTreeMap;
use std::time::Duration;

use arsvc_schemas::{Inventory, Job, JobResult, JobStatus};
use chrono::Utc;
use uuid::Uuid;

fn new_pending_job() -> Job {
    Job {
        id: Uuid::new_v4(),
        status: JobStatus::Pending,
        playbook: "hello.yml".to_string(),
        extra_vars: BTreeMap::new(),
        inventory: Inventory::Literal("localhost,".to_string()),
        options: None,
        created_at: Utc::now(),
        started_at: None,
        finished_at: None,
        result: None,
        error: None,
        source_type: "local".to_string(),
        source_target: "playbook".to_string(),
        source_repo: None,
        source_branch: None,
    }
}

/// create -> update to running -> update to successful -> get, round-tripping
/// through the durable store. Skipped if DATABASE_URL is not set.
#[tokio::test]
async fn job_lifecycle_round_trips() -> anyhow::Result<()> {
    let url = match std::env::var(arsvc_db::ENV_DATABASE_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = arsvc_db::connect(&url).await?;
    arsvc_db::migrate(&pool).await?;

    let job = new_pending_job();
    arsvc_db::create_job(&pool, &job).await?;

    let fetched = arsvc_db::get_job(&pool, job.id).await?.expect("job exists");
    assert_eq!(fetched.status, JobStatus::Pending);

    let started_at = Utc::now();
    let existed = arsvc_db::update_job_status(
        &pool,
        job.id,
        JobStatus::Running,
        &arsvc_db::StatusUpdate {
            started_at: Some(started_at),
            ..Default::default()
        },
    )
    .await?;
    assert!(existed);

    let finished_at = Utc::now();
    arsvc_db::update_job_status(
        &pool,
        job.id,
        JobStatus::Successful,
        &arsvc_db::StatusUpdate {
            finished_at: Some(finished_at),
            result: Some(JobResult {
                rc: 0,
                stdout: "ok".to_string(),
                stats: serde_json::json!({}),
            }),
            ..Default::default()
        },
    )
    .await?;

    let fetched = arsvc_db::get_job(&pool, job.id).await?.expect("job exists");
    assert_eq!(fetched.status, JobStatus::Successful);
    assert!(fetched.started_at.is_some());
    assert!(fetched.finished_at.is_some());
    assert_eq!(fetched.result.unwrap().rc, 0);

    let (summaries, total) = arsvc_db::list_jobs(&pool, None, 20, 0).await?;
    assert!(total >= 1);
    assert!(summaries.iter().any(|s| s.id == job.id));

    let stale = arsvc_db::list_stale_running_jobs(&pool, Duration::from_secs(0)).await?;
    assert!(!stale.iter().any(|j| j.id == job.id));

    Ok(())
}
