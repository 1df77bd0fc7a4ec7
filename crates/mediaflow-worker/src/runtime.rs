//! Worker runtime.
//!
//! One pool per job kind. Each pool claims from its queue while it holds a
//! free permit, runs the job under the kind's hard timeout, and reports the
//! outcome back to the transport.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn, Instrument};

use mediaflow_models::{JobKind, JobState};
use mediaflow_queue::{ClaimedJob, FailureDisposition, JobTransport};

use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::processors::{process_job, ProcessorContext};

/// How long interrupted jobs get to report back after the drain deadline.
const INTERRUPT_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

/// Runs a pool per job kind until shut down.
pub struct WorkerRuntime {
    ctx: ProcessorContext,
    transport: Arc<dyn JobTransport>,
    shutdown: watch::Sender<bool>,
}

impl WorkerRuntime {
    pub fn new(ctx: ProcessorContext, transport: Arc<dyn JobTransport>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            ctx,
            transport,
            shutdown,
        }
    }

    /// Run every pool until [`shutdown`](Self::shutdown), then release the
    /// transport.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting worker runtime with pools {:?}",
            JobKind::ALL
                .iter()
                .map(|k| (k.as_str(), self.ctx.config.concurrency.for_kind(*k)))
                .collect::<Vec<_>>()
        );

        join_all(JobKind::ALL.into_iter().map(|kind| self.run_pool(kind))).await;

        self.transport.close().await?;
        info!("Worker runtime stopped");
        Ok(())
    }

    /// Signal shutdown. Pools stop claiming immediately.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shutting_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    async fn run_pool(&self, kind: JobKind) {
        let limit = self.ctx.config.concurrency.for_kind(kind).max(1);
        let semaphore = Arc::new(Semaphore::new(limit));
        let (interrupt, interrupted) = watch::channel(false);
        let mut shutdown_rx = self.shutdown.subscribe();
        let mut in_flight = JoinSet::new();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }
            while let Some(result) = in_flight.try_join_next() {
                log_join_error(kind, result);
            }

            let permit = tokio::select! {
                _ = shutdown_rx.changed() => continue,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            match self.transport.claim(kind).await {
                Ok(Some(claimed)) => {
                    let ctx = self.ctx.clone();
                    let transport = Arc::clone(&self.transport);
                    let mut interrupted = interrupted.clone();

                    in_flight.spawn(async move {
                        let _permit = permit;
                        tokio::select! {
                            _ = execute_job(&ctx, transport.as_ref(), &claimed) => {}
                            Ok(()) = interrupted.changed() => {
                                report_interrupted(transport.as_ref(), &claimed).await;
                            }
                        }
                    });
                }
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(self.ctx.config.poll_interval) => {}
                    }
                }
                Err(e) => {
                    drop(permit);
                    warn!("Failed to claim {} job: {}", kind, e);
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(self.ctx.config.poll_interval * 4) => {}
                    }
                }
            }
        }

        if !in_flight.is_empty() {
            info!(
                "Waiting for {} in-flight {} job(s) to finish",
                in_flight.len(),
                kind
            );
        }

        let drained = tokio::time::timeout(self.ctx.config.shutdown_timeout, async {
            while let Some(result) = in_flight.join_next().await {
                log_join_error(kind, result);
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                "Interrupting {} {} job(s) still running after {:?}",
                in_flight.len(),
                kind,
                self.ctx.config.shutdown_timeout
            );
            interrupt.send_replace(true);

            let reported = tokio::time::timeout(INTERRUPT_GRACE, async {
                while let Some(result) = in_flight.join_next().await {
                    log_join_error(kind, result);
                }
            })
            .await;
            if reported.is_err() {
                in_flight.abort_all();
                while in_flight.join_next().await.is_some() {}
            }
        }

        info!("{} pool stopped", kind);
    }
}

fn log_join_error(kind: JobKind, result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!("{} job task panicked: {}", kind, e);
        }
    }
}

/// Hand an interrupted job back for redelivery.
async fn report_interrupted(transport: &dyn JobTransport, claimed: &ClaimedJob) {
    let logger = JobLogger::new(&claimed.id, claimed.kind(), claimed.job.asset_id());
    logger.log_warning("interrupted by shutdown");
    if let Err(e) = transport
        .fail(claimed, "interrupted by worker shutdown", true)
        .await
    {
        logger.log_error(&format!("failed to requeue interrupted job: {}", e));
    }
}

/// Validate, process and report one claimed job. Returns its terminal state.
pub async fn execute_job(
    ctx: &ProcessorContext,
    transport: &dyn JobTransport,
    claimed: &ClaimedJob,
) -> JobState {
    let kind = claimed.kind();
    let logger = JobLogger::new(&claimed.id, kind, claimed.job.asset_id());
    let span = logger.create_span();

    async {
        logger.log_start(claimed.attempt);
        let _in_flight = metrics::InFlight::start(kind);
        let started = Instant::now();

        let result = match claimed.job.validate() {
            Err(e) => Err(WorkerError::from(e)),
            Ok(()) => {
                let limit = ctx.config.job_timeout(kind);
                match tokio::time::timeout(limit, process_job(ctx, claimed, None)).await {
                    Ok(result) => result,
                    Err(_) => Err(WorkerError::Timeout(limit)),
                }
            }
        };
        let elapsed = started.elapsed();

        let state = match result {
            Ok(output) => {
                if let Err(e) = transport.complete(claimed).await {
                    logger.log_warning(&format!("failed to acknowledge: {}", e));
                }
                if output.is_skipped() {
                    logger.log_progress("skipped, nothing to produce for this media");
                    JobState::Skipped
                } else {
                    JobState::Completed
                }
            }
            Err(e) => {
                report_failure(transport, claimed, &logger, &e).await;
                JobState::Failed
            }
        };

        metrics::record_job_finished(kind, state, elapsed);
        logger.log_completion(state.as_str(), elapsed.as_secs_f64());
        state
    }
    .instrument(span)
    .await
}

async fn report_failure(
    transport: &dyn JobTransport,
    claimed: &ClaimedJob,
    logger: &JobLogger,
    err: &WorkerError,
) {
    let kind = claimed.kind();
    let retryable = err.is_retryable();

    match transport.fail(claimed, &err.to_string(), retryable).await {
        Ok(FailureDisposition::Retrying { attempt, delay }) => {
            metrics::record_job_retried(kind);
            logger.log_warning(&format!(
                "{}; retrying as attempt {} in {:?}",
                err, attempt, delay
            ));
        }
        Ok(FailureDisposition::DeadLettered) => {
            metrics::record_job_dead_lettered(kind);
            logger.log_error(&format!(
                "{}; dead-lettered after {} attempt(s)",
                err, claimed.attempt
            ));
        }
        Err(e) => {
            logger.log_error(&format!("{}; failed to report failure: {}", err, e));
        }
    }
}
