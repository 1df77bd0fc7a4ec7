//! Technical metadata extraction.

use tracing::info;

use mediaflow_media::{extract_metadata, TempWorkspace};
use mediaflow_models::{MetadataJob, MetadataResult};
use mediaflow_storage::AssetRecordUpdate;

use super::ProcessorContext;
use crate::error::WorkerResult;

/// Probe the source, persist the extracted metadata, and return it.
pub async fn process_metadata(
    ctx: &ProcessorContext,
    workspace_id: &str,
    job: &MetadataJob,
) -> WorkerResult<MetadataResult> {
    let workspace = ctx.workspace(workspace_id).await?;
    let result = run(ctx, &workspace, job).await;
    workspace.cleanup().await;
    result
}

async fn run(
    ctx: &ProcessorContext,
    workspace: &TempWorkspace,
    job: &MetadataJob,
) -> WorkerResult<MetadataResult> {
    let base = &job.base;
    let source = ctx.download_source(workspace, base).await?;
    let probe = ctx.probe(&source).await?;
    let metadata = extract_metadata(&probe, &base.mime_type);

    ctx.records
        .update_asset_record(
            &base.asset_id,
            AssetRecordUpdate::technical_metadata(metadata.clone()),
        )
        .await?;

    info!(
        "Extracted metadata for asset {}: {:?}x{:?}, {:?}s",
        base.asset_id, metadata.width, metadata.height, metadata.duration
    );
    Ok(metadata)
}
