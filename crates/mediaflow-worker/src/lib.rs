//! Media processing worker.
//!
//! This crate provides:
//! - The enqueue service that fans an upload out into typed jobs
//! - Processors for metadata, thumbnails, filmstrips, proxies, waveforms and frame captures
//! - A per-kind pooled runtime with hard timeouts, retry reporting and graceful shutdown
//! - Structured job logging and Prometheus metrics

pub mod config;
pub mod enqueue;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod processors;
pub mod runtime;

pub use config::{ImageFormat, PoolConcurrency, WorkerConfig};
pub use enqueue::{AssetUpload, EnqueueOptions, EnqueueReport, EnqueueService};
pub use error::{WorkerError, WorkerResult};
pub use logging::JobLogger;
pub use processors::{process_job, JobOutput, ProcessorContext};
pub use runtime::{execute_job, WorkerRuntime};
