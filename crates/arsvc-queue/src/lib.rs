//! Work Queue Adapter: a FIFO work queue backed by the same product as the
//! ephemeral store (Redis), handing job descriptors from Request Intake to
//! the Worker pool.
//!
//! The queue library's own job-tracking key is named identically to one of
//! our payload fields (`job_id`). The adapter never relies on automatic
//! keyword expansion to avoid that collision: the caller-supplied
//! descriptor is always carried as a nested `payload` mapping field, so a
//! caller's `job_id` reaches the worker with that key intact regardless of
//! what the transport calls its own bookkeeping field.

use std::time::Duration;

use anyhow::{Context, Result};
use arsvc_schemas::{Inventory, Options, SourceDescriptor};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

pub const QUEUE_KEY: &str = "arsvc:queue:jobs";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobPayload {
    pub job_id: Uuid,
    pub playbook: String,
    pub extra_vars: BTreeMap<String, Value>,
    pub inventory: Inventory,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_config: Option<SourceDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Options>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobDescriptor {
    pub job_id: Uuid,
    pub payload: JobPayload,
}

#[derive(Clone)]
pub struct WorkQueue {
    conn: redis::aio::ConnectionManager,
}

impl WorkQueue {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("invalid redis url")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("failed to connect to redis")?;
        Ok(Self { conn })
    }

    pub async fn enqueue(&self, descriptor: &JobDescriptor) -> Result<()> {
        let mut conn = self.conn.clone();
        let encoded = serde_json::to_string(descriptor).context("encode job descriptor failed")?;
        let _: i64 = conn
            .lpush(QUEUE_KEY, encoded)
            .await
            .context("enqueue failed")?;
        Ok(())
    }

    /// Blocking dequeue with a timeout; `None` on timeout (no work
    /// available), matching the worker's poll-loop expectations.
    pub async fn dequeue_blocking(&self, timeout: Duration) -> Result<Option<JobDescriptor>> {
        let mut conn = self.conn.clone();
        let result: Option<(String, String)> = conn
            .brpop(QUEUE_KEY, timeout.as_secs_f64())
            .await
            .context("dequeue failed")?;

        match result {
            Some((_key, raw)) => {
                let descriptor: JobDescriptor =
                    serde_json::from_str(&raw).context("decode job descriptor failed")?;
                Ok(Some(descriptor))
            }
            None => Ok(None),
        }
    }
}
