//! In-process transport for tests and local runs.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info};

use mediaflow_models::{JobId, JobKind, JobVariant, RetryPolicy};

use crate::error::{QueueError, QueueResult};
use crate::transport::{ClaimedJob, DeadLetter, FailureDisposition, JobTransport};

#[derive(Default)]
struct QueueState {
    /// Keyed by (priority, sequence).
    waiting: BTreeMap<(u8, u64), ClaimedJob>,
    /// Retries not yet due.
    delayed: Vec<(Instant, ClaimedJob)>,
    dead: Vec<DeadLetter>,
}

#[derive(Default)]
struct State {
    queues: HashMap<JobKind, QueueState>,
    seq: u64,
    closed: bool,
}

impl State {
    fn push_waiting(&mut self, claimed: ClaimedJob) {
        self.seq += 1;
        let key = (claimed.job.priority().value(), self.seq);
        self.queues
            .entry(claimed.kind())
            .or_default()
            .waiting
            .insert(key, claimed);
    }

    fn promote_due(&mut self, kind: JobKind, now: Instant) {
        let due: Vec<ClaimedJob> = match self.queues.get_mut(&kind) {
            Some(queue) => {
                let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut queue.delayed)
                    .into_iter()
                    .partition(|(ready_at, _)| *ready_at <= now);
                queue.delayed = pending;
                due.into_iter().map(|(_, job)| job).collect()
            }
            None => Vec::new(),
        };
        for job in due {
            self.push_waiting(job);
        }
    }
}

/// [`JobTransport`] over a mutex-guarded map of priority queues.
pub struct MemoryTransport {
    state: Mutex<State>,
    retry: RetryPolicy,
}

impl MemoryTransport {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            state: Mutex::new(State::default()),
            retry,
        }
    }

    /// Waiting plus delayed jobs for a kind.
    pub async fn len(&self, kind: JobKind) -> usize {
        let state = self.state.lock().await;
        state
            .queues
            .get(&kind)
            .map(|q| q.waiting.len() + q.delayed.len())
            .unwrap_or(0)
    }

    pub async fn is_empty(&self, kind: JobKind) -> bool {
        self.len(kind).await == 0
    }

    pub async fn dead_letters(&self, kind: JobKind) -> Vec<DeadLetter> {
        let state = self.state.lock().await;
        state
            .queues
            .get(&kind)
            .map(|q| q.dead.clone())
            .unwrap_or_default()
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

#[async_trait]
impl JobTransport for MemoryTransport {
    async fn submit(&self, job: JobVariant) -> QueueResult<JobId> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(QueueError::Closed);
        }

        let claimed = ClaimedJob::new(job);
        let id = claimed.id.clone();
        debug!("Submitted {} job {}", claimed.kind().as_str(), id);
        state.push_waiting(claimed);
        Ok(id)
    }

    async fn claim(&self, kind: JobKind) -> QueueResult<Option<ClaimedJob>> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(QueueError::Closed);
        }

        state.promote_due(kind, Instant::now());
        Ok(state
            .queues
            .get_mut(&kind)
            .and_then(|q| q.waiting.pop_first())
            .map(|(_, job)| job))
    }

    async fn complete(&self, claimed: &ClaimedJob) -> QueueResult<()> {
        debug!("Completed {} job {}", claimed.kind().as_str(), claimed.id);
        Ok(())
    }

    async fn fail(
        &self,
        claimed: &ClaimedJob,
        error: &str,
        retryable: bool,
    ) -> QueueResult<FailureDisposition> {
        let mut state = self.state.lock().await;
        let queue = state.queues.entry(claimed.kind()).or_default();

        if retryable && self.retry.allows_retry(claimed.attempt) {
            let delay = self.retry.delay_after(claimed.attempt);
            let mut next = claimed.clone();
            next.attempt += 1;
            info!(
                "Retrying {} job {} (attempt {}) in {:?}: {}",
                claimed.kind().as_str(),
                claimed.id,
                next.attempt,
                delay,
                error
            );
            let attempt = next.attempt;
            queue.delayed.push((Instant::now() + delay, next));
            return Ok(FailureDisposition::Retrying { attempt, delay });
        }

        error!(
            "Dead-lettered {} job {} after {} attempt(s): {}",
            claimed.kind().as_str(),
            claimed.id,
            claimed.attempt,
            error
        );
        queue.dead.push(DeadLetter {
            job: claimed.clone(),
            error: error.to_string(),
            failed_at: Utc::now(),
        });
        Ok(FailureDisposition::DeadLettered)
    }

    async fn close(&self) -> QueueResult<()> {
        self.state.lock().await.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaflow_models::{BackoffKind, JobBase, JobPriority};
    use std::time::Duration;

    fn base(asset: &str, priority: Option<JobPriority>) -> JobBase {
        JobBase {
            asset_id: asset.into(),
            account_id: "acc".into(),
            project_id: "proj".into(),
            storage_key: format!("uploads/{}", asset),
            mime_type: "video/mp4".into(),
            source_filename: "clip.mp4".into(),
            priority,
        }
    }

    fn immediate_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            backoff: BackoffKind::Exponential,
            base_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_priority_then_fifo() {
        let transport = MemoryTransport::default();
        transport
            .submit(JobVariant::metadata(base("bulk", Some(JobPriority::BulkUpload))).unwrap())
            .await
            .unwrap();
        transport
            .submit(JobVariant::metadata(base("std-1", None)).unwrap())
            .await
            .unwrap();
        transport
            .submit(JobVariant::metadata(base("std-2", None)).unwrap())
            .await
            .unwrap();
        transport
            .submit(
                JobVariant::metadata(base("urgent", Some(JobPriority::UserReprocess))).unwrap(),
            )
            .await
            .unwrap();

        let mut order = Vec::new();
        while let Some(claimed) = transport.claim(JobKind::Metadata).await.unwrap() {
            order.push(claimed.job.asset_id().to_string());
        }
        assert_eq!(order, vec!["urgent", "std-1", "std-2", "bulk"]);
    }

    #[tokio::test]
    async fn test_queues_are_isolated_by_kind() {
        let transport = MemoryTransport::default();
        transport
            .submit(JobVariant::waveform(base("a", None), 3.0).unwrap())
            .await
            .unwrap();
        assert!(transport.claim(JobKind::Metadata).await.unwrap().is_none());
        assert!(transport.claim(JobKind::Waveform).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_retry_until_dead_letter() {
        let transport = MemoryTransport::new(immediate_retry(3));
        transport
            .submit(JobVariant::metadata(base("a", None)).unwrap())
            .await
            .unwrap();

        for expected_attempt in 1..=2 {
            let claimed = transport.claim(JobKind::Metadata).await.unwrap().unwrap();
            assert_eq!(claimed.attempt, expected_attempt);
            let disposition = transport.fail(&claimed, "boom", true).await.unwrap();
            assert_eq!(
                disposition,
                FailureDisposition::Retrying {
                    attempt: expected_attempt + 1,
                    delay: Duration::ZERO
                }
            );
        }

        let claimed = transport.claim(JobKind::Metadata).await.unwrap().unwrap();
        assert_eq!(claimed.attempt, 3);
        let disposition = transport.fail(&claimed, "boom", true).await.unwrap();
        assert_eq!(disposition, FailureDisposition::DeadLettered);

        assert!(transport.claim(JobKind::Metadata).await.unwrap().is_none());
        let dead = transport.dead_letters(JobKind::Metadata).await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].error, "boom");
        assert_eq!(dead[0].job.attempt, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_goes_straight_to_dead_letter() {
        let transport = MemoryTransport::new(immediate_retry(3));
        transport
            .submit(JobVariant::metadata(base("a", None)).unwrap())
            .await
            .unwrap();
        let claimed = transport.claim(JobKind::Metadata).await.unwrap().unwrap();
        let disposition = transport.fail(&claimed, "invalid", false).await.unwrap();
        assert_eq!(disposition, FailureDisposition::DeadLettered);
        assert_eq!(transport.dead_letters(JobKind::Metadata).await.len(), 1);
    }

    #[tokio::test]
    async fn test_backoff_delays_redelivery() {
        let transport = MemoryTransport::new(RetryPolicy {
            max_attempts: 3,
            backoff: BackoffKind::Exponential,
            base_delay: Duration::from_secs(60),
        });
        transport
            .submit(JobVariant::metadata(base("a", None)).unwrap())
            .await
            .unwrap();
        let claimed = transport.claim(JobKind::Metadata).await.unwrap().unwrap();
        let disposition = transport.fail(&claimed, "boom", true).await.unwrap();
        assert_eq!(
            disposition,
            FailureDisposition::Retrying {
                attempt: 2,
                delay: Duration::from_secs(60)
            }
        );

        assert!(transport.claim(JobKind::Metadata).await.unwrap().is_none());
        assert_eq!(transport.len(JobKind::Metadata).await, 1);
    }

    #[tokio::test]
    async fn test_closed_transport_rejects_calls() {
        let transport = MemoryTransport::default();
        transport.close().await.unwrap();
        let err = transport
            .submit(JobVariant::metadata(base("a", None)).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Closed));
        assert!(matches!(
            transport.claim(JobKind::Metadata).await,
            Err(QueueError::Closed)
        ));
    }
}
