//! Job processors.
//!
//! Every processor follows the same shape: create a scratch workspace,
//! download the source, reuse supplied metadata or probe, run the transcoder,
//! verify the output, upload artifacts, optionally update the asset record,
//! then release the workspace. The workspace is released on every path.

mod filmstrip;
mod frame_capture;
mod metadata;
mod proxy;
mod thumbnail;
mod waveform;

#[cfg(test)]
pub(crate) mod testing;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use mediaflow_media::{MediaToolkit, ProbeOutput, TempWorkspace};
use mediaflow_models::{JobBase, JobKind, JobVariant, MetadataResult};
use mediaflow_queue::ClaimedJob;
use mediaflow_storage::{AssetRecordStore, ObjectStore};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

pub use filmstrip::{process_filmstrip, FilmstripOutput};
pub use frame_capture::{process_frame_capture, FrameCaptureOutput};
pub use metadata::process_metadata;
pub use proxy::{native_tier, process_proxy, ProxyOutput, ProxyRendition};
pub use thumbnail::{process_thumbnail, ThumbnailEntry, ThumbnailOutput};
pub use waveform::{process_waveform, WaveformOutput};

/// Shared collaborators for all processors.
#[derive(Clone)]
pub struct ProcessorContext {
    pub toolkit: Arc<dyn MediaToolkit>,
    pub store: Arc<dyn ObjectStore>,
    pub records: Arc<dyn AssetRecordStore>,
    pub config: Arc<WorkerConfig>,
}

impl ProcessorContext {
    pub fn new(
        toolkit: Arc<dyn MediaToolkit>,
        store: Arc<dyn ObjectStore>,
        records: Arc<dyn AssetRecordStore>,
        config: Arc<WorkerConfig>,
    ) -> Self {
        Self {
            toolkit,
            store,
            records,
            config,
        }
    }

    /// Scratch directory owned by one job.
    pub async fn workspace(&self, workspace_id: &str) -> WorkerResult<TempWorkspace> {
        Ok(TempWorkspace::create(&self.config.temp_dir, workspace_id).await?)
    }

    /// Download the job's source into the workspace.
    pub async fn download_source(
        &self,
        workspace: &TempWorkspace,
        base: &JobBase,
    ) -> WorkerResult<PathBuf> {
        let path = workspace.file(&source_file_name(&base.source_filename));
        self.store
            .download_to_file(&base.storage_key, &path)
            .await
            .map_err(WorkerError::download_failed)?;
        debug!("Downloaded source {} to {}", base.storage_key, path.display());
        Ok(path)
    }

    pub async fn probe(&self, path: &Path) -> WorkerResult<ProbeOutput> {
        Ok(self.toolkit.probe(path).await?)
    }

    /// Duration from the job, then supplied metadata, then a probe of the
    /// downloaded source. `None` when nothing yields a positive value.
    pub async fn resolve_duration(
        &self,
        job_duration: f64,
        metadata: Option<&MetadataResult>,
        source: &Path,
    ) -> WorkerResult<Option<f64>> {
        if job_duration.is_finite() && job_duration > 0.0 {
            return Ok(Some(job_duration));
        }
        if let Some(duration) = metadata.and_then(MetadataResult::positive_duration) {
            return Ok(Some(duration));
        }

        let probe = self.probe(source).await?;
        Ok(probe.duration().filter(|d| d.is_finite() && *d > 0.0))
    }
}

/// Local name for the downloaded source, keeping the original extension so
/// the demuxer can use it as a hint.
fn source_file_name(source_filename: &str) -> String {
    match Path::new(source_filename)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
    {
        Some(ext) => format!("source.{}", ext.to_ascii_lowercase()),
        None => "source".to_string(),
    }
}

/// Fail with `MissingOutput` unless the transcoder produced `path`.
pub(crate) async fn ensure_output(path: &Path) -> WorkerResult<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(WorkerError::MissingOutput(path.to_path_buf())),
    }
}

/// Result of one processed job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobOutput {
    Metadata(MetadataResult),
    Thumbnail(ThumbnailOutput),
    Filmstrip(FilmstripOutput),
    Proxy(ProxyOutput),
    Waveform(WaveformOutput),
    FrameCapture(FrameCaptureOutput),
}

impl JobOutput {
    pub fn kind(&self) -> JobKind {
        match self {
            Self::Metadata(_) => JobKind::Metadata,
            Self::Thumbnail(_) => JobKind::Thumbnail,
            Self::Filmstrip(_) => JobKind::Filmstrip,
            Self::Proxy(_) => JobKind::Proxy,
            Self::Waveform(_) => JobKind::Waveform,
            Self::FrameCapture(_) => JobKind::FrameCapture,
        }
    }

    /// Whether the processor declined the job (unsupported media, no duration).
    pub fn is_skipped(&self) -> bool {
        match self {
            Self::Metadata(_) | Self::FrameCapture(_) => false,
            Self::Thumbnail(o) => o.skipped,
            Self::Filmstrip(o) => o.skipped,
            Self::Proxy(o) => o.skipped,
            Self::Waveform(o) => o.skipped,
        }
    }
}

/// Route a claimed job to its processor.
pub async fn process_job(
    ctx: &ProcessorContext,
    claimed: &ClaimedJob,
    metadata: Option<&MetadataResult>,
) -> WorkerResult<JobOutput> {
    let workspace_id = claimed.id.as_str();
    Ok(match &claimed.job {
        JobVariant::Metadata(job) => {
            JobOutput::Metadata(process_metadata(ctx, workspace_id, job).await?)
        }
        JobVariant::Thumbnail(job) => {
            JobOutput::Thumbnail(process_thumbnail(ctx, workspace_id, job).await?)
        }
        JobVariant::Filmstrip(job) => {
            JobOutput::Filmstrip(process_filmstrip(ctx, workspace_id, job, metadata).await?)
        }
        JobVariant::Proxy(job) => {
            JobOutput::Proxy(process_proxy(ctx, workspace_id, job, metadata).await?)
        }
        JobVariant::Waveform(job) => {
            JobOutput::Waveform(process_waveform(ctx, workspace_id, job, metadata).await?)
        }
        JobVariant::FrameCapture(job) => {
            JobOutput::FrameCapture(process_frame_capture(ctx, workspace_id, job).await?)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_file_name_keeps_safe_extension() {
        assert_eq!(source_file_name("Holiday Clip.MOV"), "source.mov");
        assert_eq!(source_file_name("track.flac"), "source.flac");
        assert_eq!(source_file_name("noext"), "source");
        assert_eq!(source_file_name("weird.m$v"), "source");
    }

    #[tokio::test]
    async fn test_ensure_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.jpg");
        assert!(matches!(
            ensure_output(&path).await,
            Err(WorkerError::MissingOutput(_))
        ));

        tokio::fs::write(&path, b"").await.unwrap();
        assert!(ensure_output(&path).await.is_err());

        tokio::fs::write(&path, b"jpeg").await.unwrap();
        assert!(ensure_output(&path).await.is_ok());
    }
}
