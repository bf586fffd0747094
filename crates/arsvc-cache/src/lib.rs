//! Ephemeral Store: a keyed mapping with TTL holding the live view of
//! active jobs, under key `job:<id>`. Backed by Redis; all values are
//! string/JSON-encoded as a flat record so this could sit behind any
//! keyed-mapping-with-TTL product.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use arsvc_schemas::{Inventory, Job, JobResult, JobStatus, Options};
use redis::AsyncCommands;
use uuid::Uuid;

pub const ENV_REDIS_URL: &str = "REDIS_URL";

fn job_key(id: Uuid) -> String {
    format!("job:{id}")
}

#[derive(Clone)]
pub struct EphemeralStore {
    conn: redis::aio::ConnectionManager,
}

impl EphemeralStore {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("invalid redis url")?;
        let conn = client
            .get_connection_manager()
            .await
            .context("failed to connect to redis")?;
        Ok(Self { conn })
    }

    /// Write-whole-record and set TTL. Used by `create_job`.
    pub async fn write_job(&self, job: &Job, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let fields = job_to_fields(job)?;
        let key = job_key(job.id);

        let pairs: Vec<(String, String)> = fields.into_iter().collect();
        let _: () = conn.hset_multiple(&key, &pairs).await.context("hset job failed")?;
        let _: () = conn
            .expire(&key, ttl.as_secs() as i64)
            .await
            .context("expire job failed")?;
        Ok(())
    }

    /// Update-subset: overwrite only the given fields, then refresh the
    /// TTL (per the open-question resolution in SPEC_FULL.md §5: every
    /// status update re-applies the full TTL).
    pub async fn update_job_fields(
        &self,
        id: Uuid,
        fields: BTreeMap<String, String>,
        ttl: Duration,
    ) -> Result<()> {
        let mut conn = self.conn.clone();
        let key = job_key(id);
        let pairs: Vec<(String, String)> = fields.into_iter().collect();
        if !pairs.is_empty() {
            let _: () = conn.hset_multiple(&key, &pairs).await.context("hset subset failed")?;
        }
        let _: () = conn
            .expire(&key, ttl.as_secs() as i64)
            .await
            .context("expire job failed")?;
        Ok(())
    }

    /// Read-whole-record; absence yields `None`.
    pub async fn read_job(&self, id: Uuid) -> Result<Option<Job>> {
        let mut conn = self.conn.clone();
        let key = job_key(id);
        let raw: BTreeMap<String, String> = conn.hgetall(&key).await.context("hgetall job failed")?;
        if raw.is_empty() {
            return Ok(None);
        }
        Ok(Some(fields_to_job(&raw)?))
    }

    pub async fn delete_job(&self, id: Uuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(job_key(id)).await.context("del job failed")?;
        Ok(())
    }

    /// Used by recovery to decide whether a stale-running durable job is
    /// actually abandoned.
    pub async fn exists(&self, id: Uuid) -> Result<bool> {
        let mut conn = self.conn.clone();
        let n: i64 = conn.exists(job_key(id)).await.context("exists job failed")?;
        Ok(n > 0)
    }

    /// Trivial roundtrip used by the readiness probe.
    pub async fn roundtrip(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("redis ping failed")?;
        Ok(())
    }
}

fn job_to_fields(job: &Job) -> Result<BTreeMap<String, String>> {
    let mut m = BTreeMap::new();
    m.insert("id".to_string(), job.id.to_string());
    m.insert("status".to_string(), job.status.as_str().to_string());
    m.insert("playbook".to_string(), job.playbook.clone());
    m.insert("extra_vars".to_string(), serde_json::to_string(&job.extra_vars)?);
    m.insert("inventory".to_string(), serde_json::to_string(&job.inventory)?);
    if let Some(opts) = &job.options {
        m.insert("options".to_string(), serde_json::to_string(opts)?);
    }
    m.insert("created_at".to_string(), job.created_at.to_rfc3339());
    if let Some(t) = job.started_at {
        m.insert("started_at".to_string(), t.to_rfc3339());
    }
    if let Some(t) = job.finished_at {
        m.insert("finished_at".to_string(), t.to_rfc3339());
    }
    if let Some(result) = &job.result {
        m.insert("result".to_string(), serde_json::to_string(result)?);
    }
    if let Some(err) = &job.error {
        m.insert("error".to_string(), err.clone());
    }
    m.insert("source_type".to_string(), job.source_type.clone());
    m.insert("source_target".to_string(), job.source_target.clone());
    if let Some(repo) = &job.source_repo {
        m.insert("source_repo".to_string(), repo.clone());
    }
    if let Some(branch) = &job.source_branch {
        m.insert("source_branch".to_string(), branch.clone());
    }
    Ok(m)
}

fn fields_to_job(fields: &BTreeMap<String, String>) -> Result<Job> {
    let get = |k: &str| fields.get(k).cloned();

    let id: Uuid = get("id").context("missing id field")?.parse()?;
    let status: JobStatus = get("status").context("missing status field")?.parse()?;
    let playbook = get("playbook").context("missing playbook field")?;
    let extra_vars = serde_json::from_str(&get("extra_vars").unwrap_or_else(|| "{}".to_string()))?;
    let inventory: Inventory = serde_json::from_str(
        &get("inventory").context("missing inventory field")?,
    )?;
    let options: Option<Options> = get("options")
        .map(|s| serde_json::from_str(&s))
        .transpose()?;
    let created_at = chrono::DateTime::parse_from_rfc3339(
        &get("created_at").context("missing created_at field")?,
    )?
    .with_timezone(&chrono::Utc);
    let started_at = get("started_at")
        .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&chrono::Utc)))
        .transpose()?;
    let finished_at = get("finished_at")
        .map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&chrono::Utc)))
        .transpose()?;
    let result: Option<JobResult> = get("result").map(|s| serde_json::from_str(&s)).transpose()?;
    let error = get("error");
    let source_type = get("source_type").context("missing source_type field")?;
    let source_target = get("source_target").context("missing source_target field")?;
    let source_repo = get("source_repo");
    let source_branch = get("source_branch");

    Ok(Job {
        id,
        status,
        playbook,
        extra_vars,
        inventory,
        options,
        created_at,
        started_at,
        finished_at,
        result,
        error,
        source_type,
        source_target,
        source_repo,
        source_branch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap as Map;

    fn sample_job() -> Job {
        Job {
            id: Uuid::new_v4(),
            status: JobStatus::Pending,
            playbook: "hello.yml".to_string(),
            extra_vars: Map::new(),
            inventory: Inventory::Literal("localhost,".to_string()),
            options: None,
            created_at: chrono::Utc::now(),
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

    #[test]
    fn job_field_encoding_round_trips() {
        let job = sample_job();
        let fields = job_to_fields(&job).unwrap();
        let back = fields_to_job(&fields).unwrap();
        assert_eq!(back.id, job.id);
        assert_eq!(back.status, job.status);
        assert_eq!(back.playbook, job.playbook);
        assert_eq!(back.inventory, job.inventory);
    }

    #[test]
    fn job_key_format() {
        let id = Uuid::nil();
        assert_eq!(job_key(id), format!("job:{id}"));
    }
}
