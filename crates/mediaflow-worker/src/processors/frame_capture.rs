//! User-selected poster frame.

use serde::Serialize;
use tracing::info;

use mediaflow_media::{build_scale_filter, FfmpegCommand, TempWorkspace};
use mediaflow_models::{FrameCaptureJob, JobKind, ThumbnailSize};
use mediaflow_storage::{Artifact, AssetKey, AssetRecordUpdate};

use super::{ensure_output, ProcessorContext};
use crate::error::WorkerResult;

const CAPTURE_SIZE: ThumbnailSize = ThumbnailSize::Medium;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameCaptureOutput {
    pub key: String,
    pub timestamp: f64,
}

/// Grab one frame at the requested timestamp and make it the custom thumbnail.
///
/// Unlike the other processors this never skips: no output is an error.
pub async fn process_frame_capture(
    ctx: &ProcessorContext,
    workspace_id: &str,
    job: &FrameCaptureJob,
) -> WorkerResult<FrameCaptureOutput> {
    let workspace = ctx.workspace(workspace_id).await?;
    let result = run(ctx, &workspace, job).await;
    workspace.cleanup().await;
    result
}

async fn run(
    ctx: &ProcessorContext,
    workspace: &TempWorkspace,
    job: &FrameCaptureJob,
) -> WorkerResult<FrameCaptureOutput> {
    let base = &job.base;
    let source = ctx.download_source(workspace, base).await?;
    let (width, height) = CAPTURE_SIZE.dimensions();

    let output = workspace.file("capture.jpg");
    let cmd = FfmpegCommand::new(&source, &output)
        .seek(job.timestamp)
        .video_filter(build_scale_filter(width, height))
        .single_frame()
        .quality(2);

    ctx.toolkit
        .transcode(&cmd, ctx.config.job_timeout(JobKind::FrameCapture))
        .await?;
    ensure_output(&output).await?;

    let key = AssetKey::from(base).derived_key(&Artifact::CustomThumbnail(CAPTURE_SIZE));
    ctx.store.upload_file(&output, &key, "image/jpeg").await?;
    ctx.records
        .update_asset_record(&base.asset_id, AssetRecordUpdate::custom_thumbnail(&key))
        .await?;

    info!(
        "Captured frame at {:.3}s for asset {}",
        job.timestamp, base.asset_id
    );
    Ok(FrameCaptureOutput {
        key,
        timestamp: job.timestamp,
    })
}
