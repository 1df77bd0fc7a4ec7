//! Fakes shared by processor and runtime tests.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use mediaflow_media::{FfmpegCommand, MediaError, MediaResult, MediaToolkit, ProbeOutput};
use mediaflow_models::{JobBase, JobPriority};
use mediaflow_storage::{
    AssetRecordStore, AssetRecordUpdate, MemoryRecordStore, MemoryStore, StorageError,
    StorageResult,
};

use super::ProcessorContext;
use crate::config::WorkerConfig;

pub(crate) const SOURCE_KEY: &str = "uploads/acc/proj/source";

/// How the fake transcoder behaves.
#[derive(Debug, Clone)]
pub(crate) enum Transcode {
    /// Write these bytes to the command's output path.
    Write(Vec<u8>),
    /// Exit non-zero.
    Fail,
    /// Exit non-zero when the output file name contains the marker.
    FailIfOutputContains(&'static str),
    /// Exit zero without producing output.
    NoOutput,
    /// Never finish.
    Hang,
}

pub(crate) struct FakeToolkit {
    probe: MediaResult<ProbeOutput>,
    transcode: Transcode,
    commands: Mutex<Vec<FfmpegCommand>>,
    probed: Mutex<Vec<PathBuf>>,
    probes: AtomicUsize,
}

impl FakeToolkit {
    pub fn new(probe: ProbeOutput, transcode: Transcode) -> Self {
        Self {
            probe: Ok(probe),
            transcode,
            commands: Mutex::new(Vec::new()),
            probed: Mutex::new(Vec::new()),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn failing_probe(transcode: Transcode) -> Self {
        Self {
            probe: Err(MediaError::ffprobe_failed("exit status 1", None)),
            transcode,
            commands: Mutex::new(Vec::new()),
            probed: Mutex::new(Vec::new()),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn commands(&self) -> Vec<FfmpegCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Probed paths in call order.
    pub fn probed_paths(&self) -> Vec<PathBuf> {
        self.probed.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaToolkit for FakeToolkit {
    async fn probe(&self, path: &Path) -> MediaResult<ProbeOutput> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.probed.lock().unwrap().push(path.to_path_buf());
        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }
        match &self.probe {
            Ok(probe) => Ok(probe.clone()),
            Err(_) => Err(MediaError::ffprobe_failed("exit status 1", None)),
        }
    }

    async fn transcode(&self, cmd: &FfmpegCommand, _timeout: Duration) -> MediaResult<()> {
        self.commands.lock().unwrap().push(cmd.clone());

        let fail = || MediaError::ffmpeg_failed("exit status 1", Some("boom".into()), Some(1));
        match &self.transcode {
            Transcode::Write(bytes) => {
                tokio::fs::write(cmd.output(), bytes).await?;
                Ok(())
            }
            Transcode::Fail => Err(fail()),
            Transcode::FailIfOutputContains(marker) => {
                let name = cmd.output().to_string_lossy().to_string();
                if name.contains(marker) {
                    Err(fail())
                } else {
                    tokio::fs::write(cmd.output(), b"media").await?;
                    Ok(())
                }
            }
            Transcode::NoOutput => Ok(()),
            Transcode::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }
        }
    }
}

/// Record service that rejects every update.
pub(crate) struct UnavailableRecords;

#[async_trait]
impl AssetRecordStore for UnavailableRecords {
    async fn update_asset_record(
        &self,
        _asset_id: &str,
        _update: AssetRecordUpdate,
    ) -> StorageResult<()> {
        Err(StorageError::RecordUpdateFailed {
            status: 503,
            message: "unavailable".into(),
        })
    }
}

/// Everything a processor test needs, with the source already uploaded.
pub(crate) struct Harness {
    pub ctx: ProcessorContext,
    pub toolkit: Arc<FakeToolkit>,
    pub store: MemoryStore,
    pub records: MemoryRecordStore,
    pub temp_root: TempDir,
}

impl Harness {
    pub async fn new(toolkit: FakeToolkit) -> Self {
        let temp_root = TempDir::new().unwrap();
        let store = MemoryStore::new();
        store
            .insert(SOURCE_KEY, b"source-bytes".to_vec(), "video/mp4")
            .await;
        let records = MemoryRecordStore::new();
        let toolkit = Arc::new(toolkit);

        let config = WorkerConfig {
            temp_dir: temp_root.path().to_path_buf(),
            ..WorkerConfig::default()
        };

        let ctx = ProcessorContext::new(
            toolkit.clone(),
            Arc::new(store.clone()),
            Arc::new(records.clone()),
            Arc::new(config),
        );

        Self {
            ctx,
            toolkit,
            store,
            records,
            temp_root,
        }
    }

    /// Whether every job workspace has been removed.
    pub fn temp_root_is_empty(&self) -> bool {
        std::fs::read_dir(self.temp_root.path())
            .unwrap()
            .next()
            .is_none()
    }
}

pub(crate) fn base(mime_type: &str) -> JobBase {
    JobBase {
        asset_id: "asset-1".into(),
        account_id: "acc".into(),
        project_id: "proj".into(),
        storage_key: SOURCE_KEY.into(),
        mime_type: mime_type.into(),
        source_filename: "clip.mp4".into(),
        priority: Some(JobPriority::Standard),
    }
}

pub(crate) fn video_probe(width: u32, height: u32, duration: f64, transfer: Option<&str>) -> ProbeOutput {
    let mut stream = serde_json::json!({
        "codec_type": "video",
        "codec_name": "hevc",
        "width": width,
        "height": height,
        "avg_frame_rate": "24/1"
    });
    if let Some(transfer) = transfer {
        stream["color_transfer"] = serde_json::json!(transfer);
        stream["color_space"] = serde_json::json!("bt2020nc");
    }
    serde_json::from_value(serde_json::json!({
        "format": { "format_name": "mov,mp4", "duration": duration.to_string(), "bit_rate": "8000000" },
        "streams": [stream, { "codec_type": "audio", "codec_name": "aac", "sample_rate": "48000", "channels": 2 }]
    }))
    .unwrap()
}

pub(crate) fn audio_probe(duration: f64) -> ProbeOutput {
    serde_json::from_value(serde_json::json!({
        "format": { "format_name": "mp3", "duration": duration.to_string() },
        "streams": [{ "codec_type": "audio", "codec_name": "mp3", "sample_rate": "44100", "channels": 2 }]
    }))
    .unwrap()
}
