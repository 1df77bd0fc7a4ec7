//! Thumbnails at each requested size.

use serde::Serialize;
use tracing::info;

use mediaflow_media::{build_scale_filter, build_thumbnail_filter, FfmpegCommand, TempWorkspace};
use mediaflow_models::{JobKind, MediaClass, ThumbnailJob, ThumbnailSize};
use mediaflow_storage::{Artifact, AssetKey};

use super::{ensure_output, ProcessorContext};
use crate::config::ImageFormat;
use crate::error::WorkerResult;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailEntry {
    pub size: ThumbnailSize,
    pub key: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThumbnailOutput {
    pub skipped: bool,
    pub thumbnails: Vec<ThumbnailEntry>,
}

impl ThumbnailOutput {
    fn skipped() -> Self {
        Self {
            skipped: true,
            thumbnails: Vec::new(),
        }
    }
}

/// Encoder arguments for a still in `format` at `quality` (1-100).
pub(crate) fn still_image_args(format: ImageFormat, quality: u8) -> Vec<String> {
    let quality = quality.clamp(1, 100);
    match format {
        // mjpeg qscale runs 2 (best) to 31 (worst)
        ImageFormat::Jpeg => {
            let qscale = 2 + (u32::from(100 - quality) * 29) / 99;
            vec!["-q:v".into(), qscale.to_string()]
        }
        ImageFormat::Webp => vec![
            "-c:v".into(),
            "libwebp".into(),
            "-quality".into(),
            quality.to_string(),
        ],
        ImageFormat::Png => vec!["-c:v".into(), "png".into()],
    }
}

/// Render one thumbnail per requested size. Sources that are neither video
/// nor image are skipped.
pub async fn process_thumbnail(
    ctx: &ProcessorContext,
    workspace_id: &str,
    job: &ThumbnailJob,
) -> WorkerResult<ThumbnailOutput> {
    let class = MediaClass::from_mime(&job.base.mime_type);
    if !matches!(class, MediaClass::Video | MediaClass::Image) {
        info!(
            "Skipping thumbnails for asset {} ({})",
            job.base.asset_id, job.base.mime_type
        );
        return Ok(ThumbnailOutput::skipped());
    }

    let workspace = ctx.workspace(workspace_id).await?;
    let result = run(ctx, &workspace, job, class).await;
    workspace.cleanup().await;
    result
}

async fn run(
    ctx: &ProcessorContext,
    workspace: &TempWorkspace,
    job: &ThumbnailJob,
    class: MediaClass,
) -> WorkerResult<ThumbnailOutput> {
    let base = &job.base;
    let source = ctx.download_source(workspace, base).await?;
    let asset = AssetKey::from(base);
    let format = ctx.config.thumbnail_format;
    let timeout = ctx.config.job_timeout(JobKind::Thumbnail);

    let mut thumbnails = Vec::with_capacity(job.sizes.len());
    for size in &job.sizes {
        let (width, height) = size.dimensions();
        let output = workspace.file(&format!("thumbnail_{}.{}", size, format.extension()));

        let filter = if class == MediaClass::Video {
            build_thumbnail_filter(width, height)
        } else {
            build_scale_filter(width, height)
        };

        let cmd = FfmpegCommand::new(&source, &output)
            .video_filter(filter)
            .single_frame()
            .output_args(still_image_args(format, ctx.config.thumbnail_quality));

        ctx.toolkit.transcode(&cmd, timeout).await?;
        ensure_output(&output).await?;

        let key = asset.derived_key(&Artifact::Thumbnail(*size));
        ctx.store
            .upload_file(&output, &key, format.content_type())
            .await?;

        thumbnails.push(ThumbnailEntry {
            size: *size,
            key,
            width,
            height,
        });
    }

    info!(
        "Generated {} thumbnail(s) for asset {}",
        thumbnails.len(),
        base.asset_id
    );
    Ok(ThumbnailOutput {
        skipped: false,
        thumbnails,
    })
}
