//! Filmstrip sprite and manifest.

use serde::Serialize;
use tracing::info;

use mediaflow_media::{build_filmstrip_filter, FfmpegCommand, FilmstripLayout, TempWorkspace};
use mediaflow_models::{FilmstripJob, JobKind, MediaClass, MetadataResult};
use mediaflow_storage::{Artifact, AssetKey};

use super::{ensure_output, ProcessorContext};
use crate::error::WorkerResult;

/// JPEG qscale for sprite tiles.
const SPRITE_QSCALE: u8 = 4;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilmstripOutput {
    pub skipped: bool,
    pub sprite_key: Option<String>,
    pub manifest_key: Option<String>,
    pub layout: Option<FilmstripLayout>,
}

impl FilmstripOutput {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Default::default()
        }
    }
}

/// Tile one frame per capture interval into a single sprite.
///
/// Skips non-video sources and sources whose duration cannot be determined.
pub async fn process_filmstrip(
    ctx: &ProcessorContext,
    workspace_id: &str,
    job: &FilmstripJob,
    metadata: Option<&MetadataResult>,
) -> WorkerResult<FilmstripOutput> {
    if !MediaClass::is_video(&job.base.mime_type) {
        info!(
            "Skipping filmstrip for asset {} ({})",
            job.base.asset_id, job.base.mime_type
        );
        return Ok(FilmstripOutput::skipped());
    }

    let workspace = ctx.workspace(workspace_id).await?;
    let result = run(ctx, &workspace, job, metadata).await;
    workspace.cleanup().await;
    result
}

async fn run(
    ctx: &ProcessorContext,
    workspace: &TempWorkspace,
    job: &FilmstripJob,
    metadata: Option<&MetadataResult>,
) -> WorkerResult<FilmstripOutput> {
    let base = &job.base;
    let source = ctx.download_source(workspace, base).await?;
    let config = &ctx.config.pipeline.filmstrip;

    let layout = match ctx
        .resolve_duration(job.duration_seconds, metadata, &source)
        .await?
        .and_then(|duration| FilmstripLayout::compute(duration, config))
    {
        Some(layout) => layout,
        None => {
            info!("Skipping filmstrip for asset {}: unknown duration", base.asset_id);
            return Ok(FilmstripOutput::skipped());
        }
    };

    let sprite = workspace.file("filmstrip.jpg");
    let cmd = FfmpegCommand::new(&source, &sprite)
        .video_filter(build_filmstrip_filter(&layout, config.capture_fps))
        .single_frame()
        .quality(SPRITE_QSCALE);

    ctx.toolkit
        .transcode(&cmd, ctx.config.job_timeout(JobKind::Filmstrip))
        .await?;
    ensure_output(&sprite).await?;

    let asset = AssetKey::from(base);
    let sprite_key = asset.derived_key(&Artifact::Filmstrip);
    let manifest_key = asset.derived_key(&Artifact::FilmstripManifest);

    ctx.store
        .upload_file(&sprite, &sprite_key, "image/jpeg")
        .await?;
    ctx.store
        .put_object(
            &manifest_key,
            serde_json::to_vec(&layout)?,
            "application/json",
        )
        .await?;

    info!(
        "Generated {}x{} filmstrip ({} frames) for asset {}",
        layout.columns, layout.rows, layout.total_frames, base.asset_id
    );
    Ok(FilmstripOutput {
        skipped: false,
        sprite_key: Some(sprite_key),
        manifest_key: Some(manifest_key),
        layout: Some(layout),
    })
}
