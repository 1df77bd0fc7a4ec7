//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for job processing with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};

use mediaflow_models::{JobId, JobKind};

/// Job logger carrying job id, kind and asset id on every event.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    kind: JobKind,
    asset_id: String,
}

impl JobLogger {
    pub fn new(job_id: &JobId, kind: JobKind, asset_id: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            kind,
            asset_id: asset_id.to_string(),
        }
    }

    /// Log the start of a job.
    pub fn log_start(&self, attempt: u32) {
        info!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            asset_id = %self.asset_id,
            attempt,
            "Job started"
        );
    }

    /// Log a progress update during job execution.
    pub fn log_progress(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            asset_id = %self.asset_id,
            "Job progress: {}", message
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            asset_id = %self.asset_id,
            "Job warning: {}", message
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            asset_id = %self.asset_id,
            "Job error: {}", message
        );
    }

    /// Log the terminal state of a job.
    pub fn log_completion(&self, state: &str, elapsed_secs: f64) {
        info!(
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            asset_id = %self.asset_id,
            state,
            elapsed_secs,
            "Job finished"
        );
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            kind = self.kind.as_str(),
            asset_id = %self.asset_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, JobKind::Proxy, "asset-9");

        assert_eq!(logger.job_id(), job_id.to_string());
        assert_eq!(logger.kind(), JobKind::Proxy);
        assert_eq!(logger.asset_id(), "asset-9");
    }
}
