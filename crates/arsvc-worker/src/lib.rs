//! Worker pool: dequeues job descriptors and runs each one to a terminal
//! status.
//!
//! One Tokio task per dequeued descriptor, bounded by a semaphore rather
//! than a fixed-size task pool, matching the per-job (not per-source-type)
//! task granularity the queue handoff is designed around.

mod dispatch;
mod process;

use std::sync::Arc;
use std::time::Duration;

use arsvc_config::AppConfig;
use arsvc_queue::WorkQueue;
use arsvc_runner::PlaybookRunner;
use arsvc_store::JobStore;
use tokio::sync::Semaphore;

pub use process::{process_job, WorkerError};

const DEQUEUE_POLL_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything a worker task needs, shared across every job it processes.
#[derive(Clone)]
pub struct WorkerPool {
    queue: WorkQueue,
    store: JobStore,
    config: Arc<AppConfig>,
    runner: Arc<dyn PlaybookRunner>,
    limiter: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(
        queue: WorkQueue,
        store: JobStore,
        config: Arc<AppConfig>,
        runner: Arc<dyn PlaybookRunner>,
        concurrency: usize,
    ) -> Self {
        Self {
            queue,
            store,
            config,
            runner,
            limiter: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Runs forever: blocking-dequeue with a poll timeout, spawn one task
    /// per descriptor, repeat. Never returns under normal operation; a
    /// dequeue error is logged and the loop retries after a short backoff
    /// rather than exiting, since a single malformed queue entry must not
    /// take the whole worker down.
    pub async fn run(self) -> ! {
        loop {
            match self.queue.dequeue_blocking(DEQUEUE_POLL_TIMEOUT).await {
                Ok(Some(descriptor)) => {
                    let permit = self
                        .limiter
                        .clone()
                        .acquire_owned()
                        .await
                        .expect("worker semaphore is never closed");
                    let store = self.store.clone();
                    let config = self.config.clone();
                    let runner = self.runner.clone();

                    tokio::spawn(async move {
                        let _permit = permit;
                        let job_id = descriptor.job_id;
                        if let Err(e) =
                            process_job(&store, &config, runner.as_ref(), descriptor).await
                        {
                            tracing::error!(job_id = %job_id, error = %e, "job processing failed");
                        }
                    });
                }
                Ok(None) => {
                    // Poll timeout, no work available.
                }
                Err(e) => {
                    tracing::warn!(error = %e, "dequeue failed, retrying after backoff");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    }
}
