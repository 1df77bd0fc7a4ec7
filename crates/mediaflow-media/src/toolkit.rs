//! Media tool seam used by processors.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::command::{check_binary, FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::{FfprobeRunner, ProbeOutput};

/// Default wall-clock limit for a single probe call.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Probe and transcode operations.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Inspect a local media file.
    async fn probe(&self, path: &Path) -> MediaResult<ProbeOutput>;

    /// Run a transcode command, aborting it after `timeout`.
    async fn transcode(&self, cmd: &FfmpegCommand, timeout: Duration) -> MediaResult<()>;
}

/// [`MediaToolkit`] backed by the ffmpeg/ffprobe command line tools.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
    probe_timeout: Duration,
    max_stderr_bytes: Option<usize>,
}

impl FfmpegToolkit {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            max_stderr_bytes: None,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_max_stderr_bytes(mut self, bytes: usize) -> Self {
        self.max_stderr_bytes = Some(bytes);
        self
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg_path
    }

    pub fn ffprobe_path(&self) -> &Path {
        &self.ffprobe_path
    }

    /// Resolve both binaries. Missing tools are logged; returns whether both were found.
    pub fn self_check(&self) -> bool {
        let mut ok = true;
        for (tool, path) in [("ffmpeg", &self.ffmpeg_path), ("ffprobe", &self.ffprobe_path)] {
            match check_binary(tool, path) {
                Ok(resolved) => info!("Using {} at {}", tool, resolved.display()),
                Err(e) => {
                    warn!("{}", e);
                    ok = false;
                }
            }
        }
        ok
    }
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe(&self, path: &Path) -> MediaResult<ProbeOutput> {
        FfprobeRunner::new(&self.ffprobe_path, self.probe_timeout)
            .probe(path)
            .await
    }

    async fn transcode(&self, cmd: &FfmpegCommand, timeout: Duration) -> MediaResult<()> {
        let mut runner = FfmpegRunner::new(&self.ffmpeg_path, timeout);
        if let Some(bytes) = self.max_stderr_bytes {
            runner = runner.with_max_stderr_bytes(bytes);
        }
        runner.run(cmd).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MediaError;

    #[tokio::test]
    async fn test_missing_ffmpeg_binary() {
        let toolkit = FfmpegToolkit::new(
            "/nonexistent/mediaflow-ffmpeg",
            "/nonexistent/mediaflow-ffprobe",
        );
        let cmd = FfmpegCommand::new("in.mp4", "out.mp4");
        let err = toolkit
            .transcode(&cmd, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::ToolNotFound { tool: "ffmpeg", .. }));
        assert!(!toolkit.self_check());
    }

    #[test]
    fn test_configured_limits() {
        let toolkit = FfmpegToolkit::new("ffmpeg", "ffprobe");
        assert_eq!(toolkit.probe_timeout, DEFAULT_PROBE_TIMEOUT);
        assert_eq!(toolkit.max_stderr_bytes, None);

        let toolkit = toolkit
            .with_probe_timeout(Duration::from_secs(5))
            .with_max_stderr_bytes(4096);
        assert_eq!(toolkit.probe_timeout, Duration::from_secs(5));
        assert_eq!(toolkit.max_stderr_bytes, Some(4096));
    }

    #[tokio::test]
    async fn test_probe_missing_file() {
        let toolkit = FfmpegToolkit::new("ffmpeg", "ffprobe");
        let err = toolkit
            .probe(Path::new("/nonexistent/clip.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }
}
