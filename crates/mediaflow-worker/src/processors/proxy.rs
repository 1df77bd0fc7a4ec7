//! Resolution ladder proxies.
//!
//! Each requested resolution at or below the source height is transcoded on
//! its own; one rung failing does not fail the others. HDR sources keep HDR
//! (10-bit HEVC) on the native tier, the highest ladder rung the source can
//! fill, and are tone mapped to SDR H.264 below it.

use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};

use mediaflow_media::{
    build_scale_filter, build_tonemapped_scale_filter, extract_metadata, FfmpegCommand,
    TempWorkspace,
};
use mediaflow_models::{HdrType, JobKind, MediaClass, MetadataResult, ProxyJob, ProxyResolution};
use mediaflow_storage::{Artifact, AssetKey, AssetRecordUpdate};

use super::{ensure_output, ProcessorContext};
use crate::error::WorkerResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyRendition {
    pub resolution: ProxyResolution,
    pub key: String,
    pub width: u32,
    pub height: u32,
    /// Whether the rendition keeps the source's HDR signal.
    pub hdr: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyOutput {
    pub skipped: bool,
    pub renditions: Vec<ProxyRendition>,
    pub failed: Vec<ProxyResolution>,
    /// Whether the completed ladder reached the asset record.
    pub record_updated: bool,
}

impl ProxyOutput {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Highest ladder rung whose height fits within `source_height`.
pub fn native_tier(source_height: u32) -> Option<ProxyResolution> {
    ProxyResolution::ALL
        .iter()
        .rev()
        .copied()
        .find(|r| r.config().height <= source_height)
}

/// Source geometry and HDR signal used to plan the ladder.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SourceProfile {
    height: u32,
    hdr: Option<HdrType>,
}

pub async fn process_proxy(
    ctx: &ProcessorContext,
    workspace_id: &str,
    job: &ProxyJob,
    metadata: Option<&MetadataResult>,
) -> WorkerResult<ProxyOutput> {
    if !MediaClass::is_video(&job.base.mime_type) {
        info!(
            "Skipping proxies for asset {} ({})",
            job.base.asset_id, job.base.mime_type
        );
        return Ok(ProxyOutput::skipped());
    }

    let workspace = ctx.workspace(workspace_id).await?;
    let result = run(ctx, &workspace, job, metadata).await;
    workspace.cleanup().await;
    result
}

async fn run(
    ctx: &ProcessorContext,
    workspace: &TempWorkspace,
    job: &ProxyJob,
    metadata: Option<&MetadataResult>,
) -> WorkerResult<ProxyOutput> {
    let base = &job.base;
    let source = ctx.download_source(workspace, base).await?;

    let Some(profile) = resolve_profile(ctx, job, metadata, &source).await? else {
        warn!("Skipping proxies for asset {}: unknown source height", base.asset_id);
        return Ok(ProxyOutput::skipped());
    };

    let native = native_tier(profile.height);
    let targets: Vec<ProxyResolution> = job
        .resolutions
        .iter()
        .copied()
        .filter(|r| r.config().height <= profile.height)
        .collect();

    let asset = AssetKey::from(base);
    let mut outcomes = Vec::with_capacity(targets.len());
    for resolution in targets {
        let keep_hdr = profile.hdr.filter(|_| Some(resolution) == native);
        let outcome = render(ctx, workspace, &source, &asset, resolution, profile.hdr, keep_hdr).await;
        outcomes.push((resolution, outcome));
    }

    let mut output = ProxyOutput::default();
    for (resolution, outcome) in outcomes {
        match outcome {
            Ok(rendition) => output.renditions.push(rendition),
            Err(e) => {
                warn!(
                    "Proxy {} failed for asset {}: {}",
                    resolution, base.asset_id, e
                );
                output.failed.push(resolution);
            }
        }
    }

    let completed: Vec<ProxyResolution> = output.renditions.iter().map(|r| r.resolution).collect();
    // Renditions are already uploaded; a record outage must not redo them.
    match ctx
        .records
        .update_asset_record(
            &base.asset_id,
            AssetRecordUpdate::proxy_resolutions(completed),
        )
        .await
    {
        Ok(()) => output.record_updated = true,
        Err(e) => warn!(
            "Failed to record proxy ladder for asset {}: {}",
            base.asset_id, e
        ),
    }

    info!(
        "Generated {} proxy rendition(s) for asset {} ({} failed)",
        output.renditions.len(),
        base.asset_id,
        output.failed.len()
    );
    Ok(output)
}

/// Source height and HDR type from the job, then metadata, then a probe.
async fn resolve_profile(
    ctx: &ProcessorContext,
    job: &ProxyJob,
    metadata: Option<&MetadataResult>,
    source: &Path,
) -> WorkerResult<Option<SourceProfile>> {
    if job.source_height > 0 {
        let hdr = job
            .hdr_type
            .or(if job.is_hdr { Some(HdrType::Hdr10) } else { None });
        return Ok(Some(SourceProfile {
            height: job.source_height,
            hdr,
        }));
    }

    if let Some(meta) = metadata {
        if let Some((_, height)) = meta.dimensions() {
            return Ok(Some(SourceProfile {
                height,
                hdr: meta.hdr_type,
            }));
        }
    }

    let probed = extract_metadata(&ctx.probe(source).await?, &job.base.mime_type);
    Ok(probed.dimensions().map(|(_, height)| SourceProfile {
        height,
        hdr: probed.hdr_type,
    }))
}

fn build_command(
    source: &Path,
    output: &Path,
    resolution: ProxyResolution,
    source_hdr: Option<HdrType>,
    keep_hdr: Option<HdrType>,
    preset: &str,
) -> FfmpegCommand {
    let config = resolution.config();
    let cmd = FfmpegCommand::new(source, output);

    let cmd = match (keep_hdr, source_hdr) {
        (Some(hdr), _) => {
            let transfer = hdr.transfer_characteristic();
            cmd.video_filter(build_scale_filter(config.width, config.height))
                .video_codec("libx265")
                .pixel_format("yuv420p10le")
                .output_args([
                    "-x265-params".to_string(),
                    format!("colorprim=bt2020:transfer={}:colormatrix=bt2020nc", transfer),
                    "-color_primaries".to_string(),
                    "bt2020".to_string(),
                    "-color_trc".to_string(),
                    transfer.to_string(),
                    "-colorspace".to_string(),
                    "bt2020nc".to_string(),
                    "-tag:v".to_string(),
                    "hvc1".to_string(),
                ])
        }
        (None, Some(_)) => cmd
            .video_filter(build_tonemapped_scale_filter(config.width, config.height))
            .video_codec("libx264")
            .pixel_format("yuv420p"),
        (None, None) => cmd
            .video_filter(build_scale_filter(config.width, config.height))
            .video_codec("libx264")
            .pixel_format("yuv420p"),
    };

    cmd.preset(preset)
        .video_bitrate(config.video_bitrate)
        .audio_codec("aac")
        .audio_bitrate(config.audio_bitrate)
        .output_args(["-movflags", "+faststart"])
}

async fn render(
    ctx: &ProcessorContext,
    workspace: &TempWorkspace,
    source: &Path,
    asset: &AssetKey,
    resolution: ProxyResolution,
    source_hdr: Option<HdrType>,
    keep_hdr: Option<HdrType>,
) -> WorkerResult<ProxyRendition> {
    let config = resolution.config();
    let output = workspace.file(&format!("proxy_{}.mp4", resolution.as_str()));
    let cmd = build_command(
        source,
        &output,
        resolution,
        source_hdr,
        keep_hdr,
        &ctx.config.proxy_preset,
    );

    ctx.toolkit
        .transcode(&cmd, ctx.config.job_timeout(JobKind::Proxy))
        .await?;
    ensure_output(&output).await?;

    let key = asset.derived_key(&Artifact::Proxy(resolution));
    ctx.store.upload_file(&output, &key, "video/mp4").await?;

    Ok(ProxyRendition {
        resolution,
        key,
        width: config.width,
        height: config.height,
        hdr: keep_hdr.is_some(),
    })
}
