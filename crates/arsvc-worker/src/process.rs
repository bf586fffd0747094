//! Per-job processing: the seven-step procedure a worker task runs for
//! every dequeued descriptor, from `running` to a terminal status.

use arsvc_config::{AppConfig, PolicyError};
use arsvc_git::MaterializeError;
use arsvc_queue::JobDescriptor;
use arsvc_runner::{PlaybookRunner, RunResult, RunSpec, RunnerError};
use arsvc_schemas::{JobResult, JobStatus};
use arsvc_store::{JobStore, StatusUpdate};
use chrono::Utc;

use crate::dispatch::{materialize_inventory, materialize_source};

const DEFAULT_RUN_TIMEOUT_SECS: u64 = 3600;

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("{0}")]
    Policy(#[from] PolicyError),
    #[error("{0}")]
    Materialize(#[from] MaterializeError),
    #[error("{0}")]
    Runner(#[from] RunnerError),
    #[error("{0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Runs one job to completion: marks it `running`, dispatches on its
/// source, materializes its inventory, invokes the runner, and records
/// the terminal status. Any error during dispatch/materialization/run is
/// recorded as a `failed` status with the error's message rather than
/// propagated, since there is no caller left to propagate to once a job
/// has been dequeued.
pub async fn process_job(
    store: &JobStore,
    config: &AppConfig,
    runner: &dyn PlaybookRunner,
    descriptor: JobDescriptor,
) -> anyhow::Result<()> {
    let job_id = descriptor.job_id;
    let payload = descriptor.payload;

    store
        .update_status(
            job_id,
            JobStatus::Running,
            StatusUpdate {
                started_at: Some(Utc::now()),
                ..Default::default()
            },
        )
        .await?;

    let job_dir = tempfile::tempdir()?;

    let outcome = run_inner(config, runner, &payload, job_dir.path()).await;

    match outcome {
        Ok(result) => {
            let status = if result.rc == 0 {
                JobStatus::Successful
            } else {
                JobStatus::Failed
            };
            store
                .update_status(
                    job_id,
                    status,
                    StatusUpdate {
                        finished_at: Some(Utc::now()),
                        result: Some(JobResult {
                            rc: result.rc,
                            stdout: result.stdout,
                            stats: result.stats,
                        }),
                        ..Default::default()
                    },
                )
                .await?;
        }
        Err(e) => {
            tracing::warn!(job_id = %job_id, error = %e, "job failed");
            store
                .update_status(
                    job_id,
                    JobStatus::Failed,
                    StatusUpdate {
                        finished_at: Some(Utc::now()),
                        error: Some(e.to_string()),
                        ..Default::default()
                    },
                )
                .await?;
        }
    }

    Ok(())
}

async fn run_inner(
    config: &AppConfig,
    runner: &dyn PlaybookRunner,
    payload: &arsvc_queue::JobPayload,
    job_dir: &std::path::Path,
) -> Result<RunResult, WorkerError> {
    let materialized =
        materialize_source(payload.source_config.as_ref(), &payload.playbook, config, job_dir)
            .await?;

    let inventory = materialize_inventory(&payload.inventory, config, job_dir).await?;

    let spec = RunSpec {
        playbook: materialized.playbook,
        extra_vars: payload.extra_vars.clone(),
        inventory,
        envvars: materialized.envvars,
        options: payload.options.clone(),
        working_dir: materialized.working_dir,
        timeout: std::time::Duration::from_secs(DEFAULT_RUN_TIMEOUT_SECS),
    };

    Ok(runner.run(&spec).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arsvc_queue::JobPayload;
    use arsvc_runner::FakeRunner;
    use arsvc_schemas::{Inventory, Options};
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn test_config() -> AppConfig {
        AppConfig {
            database_url: "postgres://unused".to_string(),
            redis_url: "redis://unused".to_string(),
            playbooks_dir: std::env::temp_dir(),
            collections_dir: std::env::temp_dir(),
            job_ttl: std::time::Duration::from_secs(60),
            stale_running_threshold: std::time::Duration::from_secs(60),
            clone_timeout: std::time::Duration::from_secs(5),
            providers: arsvc_config::GitProviders::default(),
        }
    }

    #[tokio::test]
    async fn run_inner_dispatches_nil_source_to_playbooks_dir() {
        let config = test_config();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(config.playbooks_dir.join("hello.yml"), "---\n").unwrap();

        let payload = JobPayload {
            job_id: Uuid::new_v4(),
            playbook: "hello.yml".to_string(),
            extra_vars: BTreeMap::new(),
            inventory: Inventory::Literal("localhost,".to_string()),
            source_config: None,
            options: None::<Options>,
        };

        let runner = FakeRunner::success("ok");
        let result = run_inner(&config, &runner, &payload, dir.path()).await;
        assert!(result.is_ok());
        let _ = std::fs::remove_file(config.playbooks_dir.join("hello.yml"));
    }
}
