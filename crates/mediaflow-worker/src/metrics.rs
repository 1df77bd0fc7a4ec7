//! Prometheus metrics for the worker.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use mediaflow_models::{JobKind, JobState};

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_ENQUEUED_TOTAL: &str = "mediaflow_jobs_enqueued_total";
    pub const JOBS_FINISHED_TOTAL: &str = "mediaflow_jobs_finished_total";
    pub const JOBS_RETRIED_TOTAL: &str = "mediaflow_jobs_retried_total";
    pub const JOBS_DEAD_LETTERED_TOTAL: &str = "mediaflow_jobs_dead_lettered_total";
    pub const JOB_DURATION_SECONDS: &str = "mediaflow_job_duration_seconds";
    pub const JOBS_IN_FLIGHT: &str = "mediaflow_jobs_in_flight";
}

/// Install the Prometheus recorder with an HTTP listener on `port`.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

pub fn record_job_enqueued(kind: JobKind) {
    counter!(
        names::JOBS_ENQUEUED_TOTAL,
        "kind" => kind.as_str(),
        "state" => JobState::Pending.as_str()
    )
    .increment(1);
}

/// Counts a job in the in-flight gauge until dropped, including when the
/// job future is cancelled.
pub struct InFlight(JobKind);

impl InFlight {
    pub fn start(kind: JobKind) -> Self {
        in_flight_gauge(kind).increment(1.0);
        Self(kind)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        in_flight_gauge(self.0).decrement(1.0);
    }
}

fn in_flight_gauge(kind: JobKind) -> metrics::Gauge {
    gauge!(
        names::JOBS_IN_FLIGHT,
        "kind" => kind.as_str(),
        "state" => JobState::Processing.as_str()
    )
}

/// Record a terminal state (`completed`, `skipped` or `failed`).
pub fn record_job_finished(kind: JobKind, state: JobState, elapsed: Duration) {
    debug_assert!(state.is_terminal(), "{:?} is not a terminal state", state);
    counter!(
        names::JOBS_FINISHED_TOTAL,
        "kind" => kind.as_str(),
        "state" => state.as_str()
    )
    .increment(1);
    histogram!(
        names::JOB_DURATION_SECONDS,
        "kind" => kind.as_str(),
        "state" => state.as_str()
    )
    .record(elapsed.as_secs_f64());
}

pub fn record_job_retried(kind: JobKind) {
    counter!(names::JOBS_RETRIED_TOTAL, "kind" => kind.as_str()).increment(1);
}

pub fn record_job_dead_lettered(kind: JobKind) {
    counter!(names::JOBS_DEAD_LETTERED_TOTAL, "kind" => kind.as_str()).increment(1);
}
