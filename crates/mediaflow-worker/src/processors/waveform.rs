//! Audio waveform peaks.

use std::path::Path;

use serde::Serialize;
use tracing::info;

use mediaflow_media::{
    compute_peaks, decode_pcm_s16le, peak_count, FfmpegCommand, TempWorkspace, WaveformData,
};
use mediaflow_models::{JobKind, MediaClass, MetadataResult, WaveformJob};
use mediaflow_storage::{Artifact, AssetKey};

use super::ProcessorContext;
use crate::error::{WorkerError, WorkerResult};

const WAVEFORM_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveformOutput {
    pub skipped: bool,
    pub key: Option<String>,
    pub peak_count: usize,
}

impl WaveformOutput {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Extract mono PCM and reduce it to a fixed number of peaks per second.
pub async fn process_waveform(
    ctx: &ProcessorContext,
    workspace_id: &str,
    job: &WaveformJob,
    metadata: Option<&MetadataResult>,
) -> WorkerResult<WaveformOutput> {
    if !MediaClass::has_audio_track(&job.base.mime_type) {
        info!(
            "Skipping waveform for asset {} ({})",
            job.base.asset_id, job.base.mime_type
        );
        return Ok(WaveformOutput::skipped());
    }

    let workspace = ctx.workspace(workspace_id).await?;
    let result = run(ctx, &workspace, job, metadata).await;
    workspace.cleanup().await;
    result
}

async fn run(
    ctx: &ProcessorContext,
    workspace: &TempWorkspace,
    job: &WaveformJob,
    metadata: Option<&MetadataResult>,
) -> WorkerResult<WaveformOutput> {
    let base = &job.base;
    let source = ctx.download_source(workspace, base).await?;
    let config = &ctx.config.pipeline.waveform;

    let (duration, has_audio) = resolve_source(ctx, job, metadata, &source).await?;
    if !has_audio {
        info!("Skipping waveform for asset {}: no audio stream", base.asset_id);
        return Ok(WaveformOutput::skipped());
    }
    let Some(duration) = duration else {
        info!("Skipping waveform for asset {}: unknown duration", base.asset_id);
        return Ok(WaveformOutput::skipped());
    };

    let pcm = workspace.file("waveform.pcm");
    let cmd = FfmpegCommand::new(&source, &pcm)
        .no_video()
        .audio_channels(1)
        .audio_sample_rate(config.extraction_rate())
        .audio_codec("pcm_s16le")
        .format("s16le");

    ctx.toolkit
        .transcode(&cmd, ctx.config.job_timeout(JobKind::Waveform))
        .await?;

    let bytes = match tokio::fs::read(&pcm).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(WorkerError::MissingOutput(pcm));
        }
        Err(e) => return Err(e.into()),
    };

    let total = peak_count(duration, config.samples_per_second);
    let peaks = compute_peaks(&decode_pcm_s16le(&bytes), total);
    let data = WaveformData {
        version: WAVEFORM_VERSION,
        sample_rate: config.samples_per_second,
        channels: 1,
        duration,
        peaks,
    };

    let key = AssetKey::from(base).derived_key(&Artifact::Waveform);
    ctx.store
        .put_object(&key, serde_json::to_vec(&data)?, "application/json")
        .await?;

    info!(
        "Generated waveform with {} peaks for asset {}",
        total, base.asset_id
    );
    Ok(WaveformOutput {
        skipped: false,
        key: Some(key),
        peak_count: total,
    })
}

/// Duration and whether the source carries audio. Audio mimes are taken at
/// their word; video containers often have no audio track and are checked.
async fn resolve_source(
    ctx: &ProcessorContext,
    job: &WaveformJob,
    metadata: Option<&MetadataResult>,
    source: &Path,
) -> WorkerResult<(Option<f64>, bool)> {
    if !MediaClass::is_video(&job.base.mime_type) {
        let duration = ctx
            .resolve_duration(job.duration_seconds, metadata, source)
            .await?;
        return Ok((duration, true));
    }

    if let Some(meta) = metadata {
        let has_audio = meta.audio_codec.is_some() || meta.channels.is_some();
        let duration = ctx
            .resolve_duration(job.duration_seconds, Some(meta), source)
            .await?;
        return Ok((duration, has_audio));
    }

    let probe = ctx.probe(source).await?;
    let duration = Some(job.duration_seconds)
        .filter(|d| d.is_finite() && *d > 0.0)
        .or_else(|| probe.duration().filter(|d| d.is_finite() && *d > 0.0));
    Ok((duration, probe.audio_stream().is_some()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::testing::{
        audio_probe, base, video_probe, FakeToolkit, Harness, Transcode,
    };
    use mediaflow_media::ProbeOutput;

    fn job(mime: &str, duration: f64) -> WaveformJob {
        WaveformJob {
            base: base(mime),
            duration_seconds: duration,
        }
    }

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[tokio::test]
    async fn test_waveform_document() {
        // 1.0s at 10 peaks/s over 20 samples: windows of 2
        let mut samples = vec![0i16; 20];
        samples[1] = 16384;
        samples[19] = -32768;
        let harness = Harness::new(FakeToolkit::new(
            audio_probe(1.0),
            Transcode::Write(pcm(&samples)),
        ))
        .await;

        let output = process_waveform(&harness.ctx, "job-wave", &job("audio/mpeg", 1.0), None)
            .await
            .unwrap();
        assert!(!output.skipped);
        assert_eq!(output.peak_count, 10);

        let stored = harness
            .store
            .get("acc/proj/asset-1/derived/waveform")
            .await
            .unwrap();
        assert_eq!(stored.content_type, "application/json");
        let data: WaveformData = serde_json::from_slice(&stored.data).unwrap();
        assert_eq!(data.version, 1);
        assert_eq!(data.sample_rate, 10);
        assert_eq!(data.channels, 1);
        assert_eq!(data.peaks.len(), 10);
        assert_eq!(data.peaks[0], 0.5);
        assert_eq!(data.peaks[9], 1.0);

        let commands = harness.toolkit.commands();
        assert!(commands[0].has_output_arg("-vn"));
        assert_eq!(commands[0].output_value("-ar"), Some("1000"));
        assert_eq!(commands[0].output_value("-ac"), Some("1"));
        assert_eq!(commands[0].output_value("-f"), Some("s16le"));
        assert!(harness.temp_root_is_empty());
    }

    #[tokio::test]
    async fn test_short_pcm_pads_with_zeros() {
        let harness = Harness::new(FakeToolkit::new(
            audio_probe(2.35),
            Transcode::Write(pcm(&[32767, 32767, 32767])),
        ))
        .await;

        let output = process_waveform(&harness.ctx, "job-wave", &job("video/mp4", 2.35), None)
            .await
            .unwrap();
        assert_eq!(output.peak_count, 24);

        let stored = harness
            .store
            .get("acc/proj/asset-1/derived/waveform")
            .await
            .unwrap();
        let data: WaveformData = serde_json::from_slice(&stored.data).unwrap();
        assert_eq!(data.peaks.len(), 24);
        assert_eq!(data.peaks[0], 1.0);
        assert!(data.peaks[3..].iter().all(|p| *p == 0.0));
    }

    #[tokio::test]
    async fn test_placeholder_duration_is_reprobed() {
        let harness = Harness::new(FakeToolkit::new(
            audio_probe(3.0),
            Transcode::Write(pcm(&[100; 300])),
        ))
        .await;

        let output = process_waveform(&harness.ctx, "job-wave", &job("audio/wav", 0.0), None)
            .await
            .unwrap();
        assert_eq!(harness.toolkit.probe_count(), 1);
        assert_eq!(output.peak_count, 30);
    }

    #[tokio::test]
    async fn test_unknown_duration_skips() {
        let harness = Harness::new(FakeToolkit::new(ProbeOutput::default(), Transcode::Fail)).await;

        let output = process_waveform(&harness.ctx, "job-wave", &job("audio/wav", 0.0), None)
            .await
            .unwrap();
        assert!(output.skipped);
        assert!(harness.toolkit.commands().is_empty());
        assert!(harness.temp_root_is_empty());
    }

    #[tokio::test]
    async fn test_image_skips() {
        let harness = Harness::new(FakeToolkit::new(audio_probe(1.0), Transcode::Fail)).await;

        let output = process_waveform(&harness.ctx, "job-wave", &job("image/png", 1.0), None)
            .await
            .unwrap();
        assert!(output.skipped);
        assert_eq!(harness.toolkit.probe_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_pcm_is_error() {
        let harness = Harness::new(FakeToolkit::new(audio_probe(1.0), Transcode::NoOutput)).await;

        let err = process_waveform(&harness.ctx, "job-wave", &job("audio/wav", 1.0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::MissingOutput(_)));
        assert!(harness.temp_root_is_empty());
    }

    #[tokio::test]
    async fn test_transcode_failure_is_retryable_and_cleans_up() {
        let harness = Harness::new(FakeToolkit::new(audio_probe(1.0), Transcode::Fail)).await;

        let err = process_waveform(&harness.ctx, "job-wave", &job("audio/wav", 1.0), None)
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Media(_)));
        assert!(err.is_retryable());
        assert!(harness.store.get("acc/proj/asset-1/derived/waveform").await.is_none());
        assert!(harness.temp_root_is_empty());
    }

    #[tokio::test]
    async fn test_silent_video_skips() {
        let mut silent = video_probe(1920, 1080, 8.0, None);
        silent.streams.retain(|s| s.codec_type == "video");
        let harness = Harness::new(FakeToolkit::new(silent, Transcode::Fail)).await;

        let output = process_waveform(&harness.ctx, "job-wave", &job("video/mp4", 8.0), None)
            .await
            .unwrap();
        assert!(output.skipped);
        assert_eq!(harness.toolkit.probe_count(), 1);
        assert!(harness.toolkit.commands().is_empty());
        assert!(harness.temp_root_is_empty());
    }

    #[tokio::test]
    async fn test_metadata_without_audio_skips_without_inspecting_source() {
        let harness = Harness::new(FakeToolkit::new(audio_probe(1.0), Transcode::Fail)).await;
        let metadata = MetadataResult {
            duration: Some(8.0),
            width: Some(1920),
            height: Some(1080),
            ..Default::default()
        };

        let output = process_waveform(
            &harness.ctx,
            "job-wave",
            &job("video/mp4", 0.0),
            Some(&metadata),
        )
        .await
        .unwrap();
        assert!(output.skipped);
        assert_eq!(harness.toolkit.probe_count(), 0);
    }
}
