//! Shared data models for the media processing pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Typed job variants and queue kinds
//! - Job priorities and lifecycle states
//! - Pipeline constant tables (timeouts, retry, thumbnail/proxy/filmstrip/waveform)
//! - Technical metadata and HDR classification results

pub mod config;
pub mod error;
pub mod job;
pub mod media_class;
pub mod metadata;

pub use config::{
    BackoffKind, FilmstripConfig, JobTimeouts, PipelineConfig, ProxyConfig, ProxyResolution,
    RetryPolicy, ThumbnailSize, WaveformConfig, PROXY_AUDIO_BITRATE,
};
pub use error::{ModelError, ModelResult};
pub use job::{
    FilmstripJob, FrameCaptureJob, JobBase, JobId, JobKind, JobPriority, JobState, JobVariant,
    MetadataJob, ProxyJob, ThumbnailJob, WaveformJob,
};
pub use media_class::MediaClass;
pub use metadata::{HdrType, MetadataResult};
