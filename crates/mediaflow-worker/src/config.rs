//! Worker configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use mediaflow_models::{BackoffKind, JobKind, PipelineConfig, RetryPolicy};
use mediaflow_queue::QueueBackend;
use mediaflow_storage::{AssetRecordStore, HttpRecordStore, MemoryRecordStore, StorageResult};
use tracing::warn;

use crate::error::{WorkerError, WorkerResult};

/// Still image encoding for thumbnails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Webp,
    Png,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Png => "png",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Webp => "image/webp",
            Self::Png => "image/png",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::Webp),
            "png" => Ok(Self::Png),
            other => Err(WorkerError::config_error(format!(
                "unsupported THUMBNAIL_FORMAT {:?}",
                other
            ))),
        }
    }
}

/// Per-kind pool sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConcurrency {
    pub metadata: usize,
    pub thumbnail: usize,
    pub filmstrip: usize,
    pub proxy: usize,
    pub waveform: usize,
    pub frame_capture: usize,
}

impl Default for PoolConcurrency {
    fn default() -> Self {
        Self {
            metadata: 8,
            thumbnail: 6,
            filmstrip: 2,
            proxy: 2,
            waveform: 4,
            frame_capture: 4,
        }
    }
}

impl PoolConcurrency {
    pub fn for_kind(&self, kind: JobKind) -> usize {
        match kind {
            JobKind::Metadata => self.metadata,
            JobKind::Thumbnail => self.thumbnail,
            JobKind::Filmstrip => self.filmstrip,
            JobKind::Proxy => self.proxy,
            JobKind::Waveform => self.waveform,
            JobKind::FrameCapture => self.frame_capture,
        }
    }

    fn from_env() -> Self {
        let defaults = Self::default();
        let read = |kind: JobKind, default: usize| {
            env_parse(&format!(
                "WORKER_CONCURRENCY_{}",
                kind.as_str().to_ascii_uppercase()
            ))
            .unwrap_or(default)
        };

        Self {
            metadata: read(JobKind::Metadata, defaults.metadata),
            thumbnail: read(JobKind::Thumbnail, defaults.thumbnail),
            filmstrip: read(JobKind::Filmstrip, defaults.filmstrip),
            proxy: read(JobKind::Proxy, defaults.proxy),
            waveform: read(JobKind::Waveform, defaults.waveform),
            frame_capture: read(JobKind::FrameCapture, defaults.frame_capture),
        }
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Root for per-job scratch directories
    pub temp_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    /// Wall-clock limit for one probe call
    pub probe_timeout: Duration,
    /// Tail of transcoder stderr kept for error reports
    pub max_stderr_bytes: usize,
    pub concurrency: PoolConcurrency,
    pub thumbnail_format: ImageFormat,
    /// Thumbnail quality, 1-100
    pub thumbnail_quality: u8,
    /// x264/x265 preset for proxies
    pub proxy_preset: String,
    /// Reserved for segmented proxy output; parsed but unused
    pub hls_segment_duration: u32,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// Sleep between claims when a queue is empty
    pub poll_interval: Duration,
    /// Prometheus exporter port; disabled when unset
    pub metrics_port: Option<u16>,
    pub pipeline: PipelineConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join("mediaflow"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            probe_timeout: Duration::from_secs(60),
            max_stderr_bytes: 64 * 1024,
            concurrency: PoolConcurrency::default(),
            thumbnail_format: ImageFormat::Jpeg,
            thumbnail_quality: 85,
            proxy_preset: "fast".to_string(),
            hls_segment_duration: 6,
            shutdown_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            metrics_port: None,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Result<Self, WorkerError> {
        let defaults = Self::default();

        let thumbnail_format = match std::env::var("THUMBNAIL_FORMAT") {
            Ok(value) if !value.is_empty() => value.parse()?,
            _ => defaults.thumbnail_format,
        };

        Ok(Self {
            temp_dir: std::env::var("MEDIA_TEMP_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            ffmpeg_path: std::env::var("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffmpeg_path),
            ffprobe_path: std::env::var("FFPROBE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.ffprobe_path),
            probe_timeout: env_parse("FFPROBE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.probe_timeout),
            max_stderr_bytes: env_parse("FFMPEG_MAX_STDERR_BYTES")
                .unwrap_or(defaults.max_stderr_bytes),
            concurrency: PoolConcurrency::from_env(),
            thumbnail_format,
            thumbnail_quality: env_parse::<u8>("THUMBNAIL_QUALITY")
                .map(|q| q.clamp(1, 100))
                .unwrap_or(defaults.thumbnail_quality),
            proxy_preset: std::env::var("PROXY_PRESET").unwrap_or(defaults.proxy_preset),
            hls_segment_duration: env_parse("HLS_SEGMENT_DURATION")
                .unwrap_or(defaults.hls_segment_duration),
            shutdown_timeout: Duration::from_secs(
                env_parse("WORKER_SHUTDOWN_TIMEOUT").unwrap_or(30),
            ),
            poll_interval: Duration::from_millis(
                env_parse("WORKER_POLL_INTERVAL_MS").unwrap_or(500),
            ),
            metrics_port: env_parse("METRICS_PORT"),
            pipeline: PipelineConfig {
                retry: retry_policy(defaults.pipeline.retry, |name| std::env::var(name).ok()),
                ..defaults.pipeline
            },
        })
    }

    /// Hard execution limit for one job of `kind`.
    pub fn job_timeout(&self, kind: JobKind) -> Duration {
        self.pipeline.timeouts.for_kind(kind)
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.parse().ok())
}

/// `QUEUE_MAX_ATTEMPTS`, `QUEUE_BACKOFF` (`exponential|fixed`) and
/// `QUEUE_BACKOFF_MS` applied over `defaults`.
fn retry_policy(defaults: RetryPolicy, read: impl Fn(&str) -> Option<String>) -> RetryPolicy {
    RetryPolicy {
        max_attempts: read("QUEUE_MAX_ATTEMPTS")
            .and_then(|s| s.parse().ok())
            .filter(|n: &u32| *n > 0)
            .unwrap_or(defaults.max_attempts),
        backoff: match read("QUEUE_BACKOFF").map(|s| s.to_ascii_lowercase()).as_deref() {
            Some("fixed") => BackoffKind::Fixed,
            Some("exponential") => BackoffKind::Exponential,
            _ => defaults.backoff,
        },
        base_delay: read("QUEUE_BACKOFF_MS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.base_delay),
    }
}

/// Pick the asset record store for this deployment.
///
/// Keeping record updates in process is only allowed on the memory queue;
/// a shared queue without the records service is a startup error.
pub fn select_record_store(
    backend: QueueBackend,
    http: StorageResult<HttpRecordStore>,
) -> WorkerResult<Arc<dyn AssetRecordStore>> {
    match http {
        Ok(records) => Ok(Arc::new(records)),
        Err(e) if backend == QueueBackend::Memory => {
            warn!("Records service unavailable ({}); keeping updates in memory", e);
            Ok(Arc::new(MemoryRecordStore::new()))
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_store_fallback_only_on_memory_queue() {
        let missing = || Err(mediaflow_storage::StorageError::config_error("RECORDS_API_URL not set"));

        assert!(select_record_store(QueueBackend::Memory, missing()).is_ok());
        assert!(matches!(
            select_record_store(QueueBackend::Redis, missing()),
            Err(WorkerError::Storage(_))
        ));
    }

    #[test]
    fn test_default_pool_sizes() {
        let pools = PoolConcurrency::default();
        assert_eq!(pools.for_kind(JobKind::Metadata), 8);
        assert_eq!(pools.for_kind(JobKind::Thumbnail), 6);
        assert_eq!(pools.for_kind(JobKind::FrameCapture), 4);
        assert_eq!(pools.for_kind(JobKind::Waveform), 4);
        assert_eq!(pools.for_kind(JobKind::Filmstrip), 2);
        assert_eq!(pools.for_kind(JobKind::Proxy), 2);
    }

    #[test]
    fn test_image_format_parse() {
        assert_eq!("JPEG".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);
        assert_eq!("webp".parse::<ImageFormat>().unwrap(), ImageFormat::Webp);
        assert_eq!("png".parse::<ImageFormat>().unwrap().content_type(), "image/png");
        assert!("gif".parse::<ImageFormat>().is_err());
    }

    #[test]
    fn test_job_timeout_uses_pipeline_table() {
        let config = WorkerConfig::default();
        assert_eq!(config.job_timeout(JobKind::Proxy), Duration::from_secs(1800));
        assert_eq!(config.job_timeout(JobKind::Metadata), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_policy_overrides() {
        let env: std::collections::HashMap<&str, &str> = [
            ("QUEUE_MAX_ATTEMPTS", "5"),
            ("QUEUE_BACKOFF", "Fixed"),
            ("QUEUE_BACKOFF_MS", "250"),
        ]
        .into_iter()
        .collect();

        let policy = retry_policy(RetryPolicy::default(), |name| {
            env.get(name).map(|v| v.to_string())
        });
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.backoff, BackoffKind::Fixed);
        assert_eq!(policy.base_delay, Duration::from_millis(250));

        let untouched = retry_policy(RetryPolicy::default(), |name| {
            (name == "QUEUE_MAX_ATTEMPTS").then(|| "0".to_string())
        });
        assert_eq!(untouched, RetryPolicy::default());
    }
}
