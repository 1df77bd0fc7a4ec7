//! Redis-backed transport.
//!
//! Layout per queue (`media:<kind>`):
//! - `media:<kind>` sorted set of waiting envelopes scored
//!   `priority * 10^12 + seq`
//! - `media:<kind>:delayed` sorted set of retry envelopes scored by ready
//!   time in epoch milliseconds
//! - `media:<kind>:active` sorted set of claimed job ids scored by lease
//!   deadline in epoch milliseconds, with the envelopes in the
//!   `media:<kind>:leases` hash
//! - `media:<kind>:dead` list of dead letters
//!
//! `seq` comes from `INCR media:seq`, so ties within a priority resolve in
//! enqueue order. A claim pops the waiting set and takes the lease in one
//! script, so a worker that dies mid-job leaves its envelope behind; once
//! the lease expires the job is failed as a retryable attempt.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use mediaflow_models::{JobId, JobKind, JobVariant, RetryPolicy};

use crate::error::{QueueError, QueueResult};
use crate::transport::{ClaimedJob, DeadLetter, FailureDisposition, JobTransport};

const SEQ_KEY: &str = "media:seq";

/// Number of due retries or expired leases handled per claim.
const PROMOTE_BATCH: isize = 32;

/// Default lease on a claimed job. Must outlast the longest job timeout.
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(3600);

/// KEYS: waiting, active, leases. ARGV: lease deadline (ms).
const CLAIM_SCRIPT: &str = r#"
local popped = redis.call('ZPOPMIN', KEYS[1], 1)
if #popped == 0 then
  return false
end
local payload = popped[1]
local ok, decoded = pcall(cjson.decode, payload)
if ok and type(decoded) == 'table' and type(decoded['id']) == 'string' then
  redis.call('ZADD', KEYS[2], ARGV[1], decoded['id'])
  redis.call('HSET', KEYS[3], decoded['id'], payload)
end
return payload
"#;

/// KEYS: active, leases. ARGV: now (ms), batch size.
const EXPIRED_SCRIPT: &str = r#"
local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
local payloads = {}
for _, id in ipairs(ids) do
  redis.call('ZREM', KEYS[1], id)
  local payload = redis.call('HGET', KEYS[2], id)
  redis.call('HDEL', KEYS[2], id)
  if payload then
    table.insert(payloads, payload)
  end
end
return payloads
"#;

fn delayed_key(kind: JobKind) -> String {
    format!("{}:delayed", kind.queue_name())
}

fn active_key(kind: JobKind) -> String {
    format!("{}:active", kind.queue_name())
}

fn leases_key(kind: JobKind) -> String {
    format!("{}:leases", kind.queue_name())
}

fn dead_key(kind: JobKind) -> String {
    format!("{}:dead", kind.queue_name())
}

/// [`JobTransport`] on Redis sorted sets.
pub struct RedisTransport {
    conn: RwLock<Option<MultiplexedConnection>>,
    retry: RetryPolicy,
    visibility_timeout: Duration,
    claim_script: Script,
    expired_script: Script,
}

impl RedisTransport {
    /// Connect to Redis.
    pub async fn connect(redis_url: &str, retry: RetryPolicy) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))?;

        info!("Connected to Redis queue backend");
        Ok(Self {
            conn: RwLock::new(Some(conn)),
            retry,
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            claim_script: Script::new(CLAIM_SCRIPT),
            expired_script: Script::new(EXPIRED_SCRIPT),
        })
    }

    /// How long a claimed job stays invisible before it is presumed lost.
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    async fn conn(&self) -> QueueResult<MultiplexedConnection> {
        self.conn.read().await.clone().ok_or(QueueError::Closed)
    }

    async fn enqueue(
        &self,
        conn: &mut MultiplexedConnection,
        claimed: &ClaimedJob,
    ) -> QueueResult<()> {
        let seq: u64 = conn.incr(SEQ_KEY, 1).await?;
        let payload = serde_json::to_string(claimed)?;
        conn.zadd::<_, _, _, ()>(claimed.kind().queue_name(), payload, claimed.score(seq))
            .await?;
        Ok(())
    }

    /// Move due retries from the delayed set into the waiting set.
    async fn promote_due(&self, conn: &mut MultiplexedConnection, kind: JobKind) -> QueueResult<()> {
        let now_ms = Utc::now().timestamp_millis();
        let due: Vec<String> = conn
            .zrangebyscore_limit(delayed_key(kind), "-inf", now_ms, 0, PROMOTE_BATCH)
            .await?;

        for payload in due {
            // Only the worker that removes the entry re-enqueues it.
            let removed: i64 = conn.zrem(delayed_key(kind), &payload).await?;
            if removed == 0 {
                continue;
            }
            match serde_json::from_str::<ClaimedJob>(&payload) {
                Ok(claimed) => self.enqueue(conn, &claimed).await?,
                Err(e) => {
                    warn!("Dropping malformed delayed payload on {}: {}", kind.queue_name(), e);
                    conn.lpush::<_, _, ()>(dead_key(kind), payload).await?;
                }
            }
        }
        Ok(())
    }

    /// Fail jobs whose lease ran out: their worker died or stalled.
    async fn recover_expired(
        &self,
        conn: &mut MultiplexedConnection,
        kind: JobKind,
    ) -> QueueResult<()> {
        let now_ms = Utc::now().timestamp_millis();
        let expired: Vec<String> = self
            .expired_script
            .key(active_key(kind))
            .key(leases_key(kind))
            .arg(now_ms)
            .arg(PROMOTE_BATCH)
            .invoke_async(conn)
            .await?;

        for payload in expired {
            match serde_json::from_str::<ClaimedJob>(&payload) {
                Ok(claimed) => {
                    warn!(
                        "Lease expired for job {} on {} (attempt {})",
                        claimed.id,
                        kind.queue_name(),
                        claimed.attempt
                    );
                    self.reschedule(conn, &claimed, "lease expired", true)
                        .await?;
                }
                Err(e) => {
                    warn!("Dropping malformed lease on {}: {}", kind.queue_name(), e);
                    conn.lpush::<_, _, ()>(dead_key(kind), payload).await?;
                }
            }
        }
        Ok(())
    }

    /// Drop the lease held for a claimed job.
    async fn release(&self, conn: &mut MultiplexedConnection, claimed: &ClaimedJob) -> QueueResult<()> {
        let kind = claimed.kind();
        redis::pipe()
            .atomic()
            .zrem(active_key(kind), claimed.id.as_str())
            .ignore()
            .hdel(leases_key(kind), claimed.id.as_str())
            .ignore()
            .query_async::<()>(conn)
            .await?;
        Ok(())
    }

    /// Schedule a retry or bury the job.
    async fn reschedule(
        &self,
        conn: &mut MultiplexedConnection,
        claimed: &ClaimedJob,
        error: &str,
        retryable: bool,
    ) -> QueueResult<FailureDisposition> {
        let kind = claimed.kind();

        if retryable && self.retry.allows_retry(claimed.attempt) {
            let delay = self.retry.delay_after(claimed.attempt);
            let mut next = claimed.clone();
            next.attempt += 1;

            let ready_at = Utc::now().timestamp_millis() + delay.as_millis() as i64;
            let payload = serde_json::to_string(&next)?;
            conn.zadd::<_, _, _, ()>(delayed_key(kind), payload, ready_at)
                .await?;

            info!(
                "Retrying job {} on {} (attempt {}) in {:?}: {}",
                claimed.id,
                kind.queue_name(),
                next.attempt,
                delay,
                error
            );
            return Ok(FailureDisposition::Retrying {
                attempt: next.attempt,
                delay,
            });
        }

        let letter = DeadLetter {
            job: claimed.clone(),
            error: error.to_string(),
            failed_at: Utc::now(),
        };
        conn.lpush::<_, _, ()>(dead_key(kind), serde_json::to_string(&letter)?)
            .await?;

        error!(
            "Dead-lettered job {} on {} after {} attempt(s): {}",
            claimed.id,
            kind.queue_name(),
            claimed.attempt,
            error
        );
        Ok(FailureDisposition::DeadLettered)
    }

    /// Waiting jobs for a kind.
    pub async fn len(&self, kind: JobKind) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.zcard(kind.queue_name()).await?)
    }

    /// Claimed jobs still holding a lease.
    pub async fn active_len(&self, kind: JobKind) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.zcard(active_key(kind)).await?)
    }

    /// Dead letter count for a kind.
    pub async fn dead_len(&self, kind: JobKind) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.llen(dead_key(kind)).await?)
    }
}

#[async_trait]
impl JobTransport for RedisTransport {
    async fn submit(&self, job: JobVariant) -> QueueResult<JobId> {
        let mut conn = self.conn().await?;
        let claimed = ClaimedJob::new(job);
        self.enqueue(&mut conn, &claimed)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        debug!("Enqueued job {} on {}", claimed.id, claimed.kind().queue_name());
        Ok(claimed.id)
    }

    async fn claim(&self, kind: JobKind) -> QueueResult<Option<ClaimedJob>> {
        let mut conn = self.conn().await?;
        self.recover_expired(&mut conn, kind).await?;
        self.promote_due(&mut conn, kind).await?;

        loop {
            let deadline = Utc::now().timestamp_millis()
                + self.visibility_timeout.as_millis() as i64;
            let popped: Option<String> = self
                .claim_script
                .key(kind.queue_name())
                .key(active_key(kind))
                .key(leases_key(kind))
                .arg(deadline)
                .invoke_async(&mut conn)
                .await?;
            let Some(payload) = popped else {
                return Ok(None);
            };

            match serde_json::from_str::<ClaimedJob>(&payload) {
                Ok(claimed) => return Ok(Some(claimed)),
                Err(e) => {
                    warn!("Dead-lettering malformed payload on {}: {}", kind.queue_name(), e);
                    conn.lpush::<_, _, ()>(dead_key(kind), payload).await?;
                }
            }
        }
    }

    async fn complete(&self, claimed: &ClaimedJob) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        self.release(&mut conn, claimed).await?;
        debug!("Completed job {} on {}", claimed.id, claimed.kind().queue_name());
        Ok(())
    }

    async fn fail(
        &self,
        claimed: &ClaimedJob,
        error: &str,
        retryable: bool,
    ) -> QueueResult<FailureDisposition> {
        let mut conn = self.conn().await?;
        let disposition = self.reschedule(&mut conn, claimed, error, retryable).await?;
        self.release(&mut conn, claimed).await?;
        Ok(disposition)
    }

    async fn close(&self) -> QueueResult<()> {
        if self.conn.write().await.take().is_some() {
            info!("Closed Redis queue connection");
        }
        Ok(())
    }
}
