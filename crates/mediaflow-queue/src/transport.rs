//! Queue transport seam.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mediaflow_models::{JobId, JobKind, JobVariant};

use crate::error::QueueResult;

/// Scale applied to the priority when ordering waiting jobs, leaving room for
/// a per-queue sequence number below it.
pub const PRIORITY_SCALE: f64 = 1e12;

/// A job as delivered to a worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedJob {
    pub id: JobId,
    pub job: JobVariant,
    /// Delivery attempt, starting at 1.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl ClaimedJob {
    pub fn new(job: JobVariant) -> Self {
        Self {
            id: JobId::new(),
            job,
            attempt: 1,
            enqueued_at: Utc::now(),
        }
    }

    pub fn kind(&self) -> JobKind {
        self.job.kind()
    }

    /// Ordering score within a queue: priority first, then enqueue sequence.
    pub fn score(&self, seq: u64) -> f64 {
        f64::from(self.job.priority().value()) * PRIORITY_SCALE + seq as f64
    }
}

/// What the transport did with a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Scheduled for another delivery after `delay`.
    Retrying { attempt: u32, delay: Duration },
    /// Moved to the dead letter list.
    DeadLettered,
}

/// Entry in a dead letter list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetter {
    pub job: ClaimedJob,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Per-kind priority queues with retry and dead-lettering.
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Add a job to its kind's queue.
    async fn submit(&self, job: JobVariant) -> QueueResult<JobId>;

    /// Take the next ready job for `kind`: lowest priority value, then FIFO.
    async fn claim(&self, kind: JobKind) -> QueueResult<Option<ClaimedJob>>;

    /// Acknowledge a successful (or skipped) job.
    async fn complete(&self, claimed: &ClaimedJob) -> QueueResult<()>;

    /// Report a failed job. Retryable failures are redelivered with backoff
    /// until the attempt limit; everything else is dead-lettered.
    async fn fail(
        &self,
        claimed: &ClaimedJob,
        error: &str,
        retryable: bool,
    ) -> QueueResult<FailureDisposition>;

    /// Release connections. Further calls may fail with `QueueError::Closed`.
    async fn close(&self) -> QueueResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaflow_models::{JobBase, JobPriority};

    fn job(priority: JobPriority) -> JobVariant {
        JobVariant::metadata(JobBase {
            asset_id: "a".into(),
            account_id: "acc".into(),
            project_id: "p".into(),
            storage_key: "k".into(),
            mime_type: "video/mp4".into(),
            source_filename: "clip.mp4".into(),
            priority: Some(priority),
        })
        .unwrap()
    }

    #[test]
    fn test_score_orders_priority_before_sequence() {
        let urgent = ClaimedJob::new(job(JobPriority::UserReprocess));
        let bulk = ClaimedJob::new(job(JobPriority::BulkUpload));
        assert!(urgent.score(1_000_000) < bulk.score(1));
        assert!(bulk.score(1) < bulk.score(2));
    }

    #[test]
    fn test_envelope_wire_format() {
        let claimed = ClaimedJob::new(job(JobPriority::Standard));
        let value = serde_json::to_value(&claimed).unwrap();
        assert_eq!(value["attempt"], 1);
        assert_eq!(value["job"]["type"], "metadata");
        assert!(value.get("enqueuedAt").is_some());

        let back: ClaimedJob = serde_json::from_value(value).unwrap();
        assert_eq!(back, claimed);
    }
}
