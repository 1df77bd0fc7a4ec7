//! Fan-out of an uploaded asset into processing jobs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use mediaflow_models::{
    JobBase, JobId, JobKind, JobPriority, JobVariant, MediaClass, ProxyResolution, ThumbnailSize,
};
use mediaflow_queue::JobTransport;

use crate::error::WorkerResult;
use crate::metrics;

/// Proxy ladder requested on upload: every rung below 4K.
pub const UPLOAD_PROXY_RESOLUTIONS: [ProxyResolution; 4] = [
    ProxyResolution::P360,
    ProxyResolution::P540,
    ProxyResolution::P720,
    ProxyResolution::P1080,
];

/// A freshly uploaded asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetUpload {
    pub asset_id: String,
    pub account_id: String,
    pub project_id: String,
    pub storage_key: String,
    pub mime_type: String,
    pub source_filename: String,
}

impl AssetUpload {
    fn job_base(&self, priority: JobPriority) -> JobBase {
        JobBase {
            asset_id: self.asset_id.clone(),
            account_id: self.account_id.clone(),
            project_id: self.project_id.clone(),
            storage_key: self.storage_key.clone(),
            mime_type: self.mime_type.clone(),
            source_filename: self.source_filename.clone(),
            priority: Some(priority),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnqueueOptions {
    /// Overrides the bulk/standard choice.
    pub priority: Option<JobPriority>,
    pub is_bulk_upload: bool,
}

impl EnqueueOptions {
    pub fn effective_priority(&self) -> JobPriority {
        match (self.priority, self.is_bulk_upload) {
            (Some(priority), _) => priority,
            (None, true) => JobPriority::BulkUpload,
            (None, false) => JobPriority::Standard,
        }
    }
}

/// Jobs submitted for one asset, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueReport {
    pub asset_id: String,
    pub priority: JobPriority,
    pub jobs: Vec<(JobId, JobKind)>,
}

impl EnqueueReport {
    pub fn kinds(&self) -> Vec<JobKind> {
        self.jobs.iter().map(|(_, kind)| *kind).collect()
    }
}

/// Builds the job set for an asset and submits it to the transport.
#[derive(Clone)]
pub struct EnqueueService {
    transport: Arc<dyn JobTransport>,
}

impl EnqueueService {
    pub fn new(transport: Arc<dyn JobTransport>) -> Self {
        Self { transport }
    }

    /// Submit the processing jobs for a new upload.
    pub async fn enqueue_upload(
        &self,
        asset: &AssetUpload,
        options: EnqueueOptions,
    ) -> WorkerResult<EnqueueReport> {
        self.submit_all(asset, options.effective_priority()).await
    }

    /// Re-run the full job set at user priority.
    pub async fn reprocess(&self, asset: &AssetUpload) -> WorkerResult<EnqueueReport> {
        self.submit_all(asset, JobPriority::UserReprocess).await
    }

    /// Capture a still at `timestamp` seconds as the asset's custom thumbnail.
    pub async fn capture_frame(
        &self,
        asset: &AssetUpload,
        timestamp: f64,
    ) -> WorkerResult<EnqueueReport> {
        let priority = JobPriority::UserReprocess;
        let job = JobVariant::frame_capture(asset.job_base(priority), timestamp)?;
        self.submit(asset, priority, vec![job]).await
    }

    async fn submit_all(
        &self,
        asset: &AssetUpload,
        priority: JobPriority,
    ) -> WorkerResult<EnqueueReport> {
        let jobs = plan_jobs(asset, priority)?;
        self.submit(asset, priority, jobs).await
    }

    async fn submit(
        &self,
        asset: &AssetUpload,
        priority: JobPriority,
        jobs: Vec<JobVariant>,
    ) -> WorkerResult<EnqueueReport> {
        let mut report = EnqueueReport {
            asset_id: asset.asset_id.clone(),
            priority,
            jobs: Vec::with_capacity(jobs.len()),
        };

        for job in jobs {
            let kind = job.kind();
            let id = self.transport.submit(job).await?;
            metrics::record_job_enqueued(kind);
            report.jobs.push((id, kind));
        }

        info!(
            "Enqueued {} job(s) for asset {} at priority {:?}: {:?}",
            report.jobs.len(),
            asset.asset_id,
            priority,
            report.kinds()
        );
        Ok(report)
    }
}

/// Job set for an asset: metadata first, then whatever its media class supports.
pub fn plan_jobs(asset: &AssetUpload, priority: JobPriority) -> WorkerResult<Vec<JobVariant>> {
    let base = || asset.job_base(priority);
    let mut jobs = vec![JobVariant::metadata(base())?];

    match MediaClass::from_mime(&asset.mime_type) {
        MediaClass::Video => {
            jobs.push(JobVariant::thumbnail(base(), ThumbnailSize::ALL)?);
            jobs.push(JobVariant::filmstrip(base(), 0.0)?);
            jobs.push(JobVariant::proxy(base(), UPLOAD_PROXY_RESOLUTIONS, 0, 0, None)?);
            jobs.push(JobVariant::waveform(base(), 0.0)?);
        }
        MediaClass::Audio => jobs.push(JobVariant::waveform(base(), 0.0)?),
        MediaClass::Image => jobs.push(JobVariant::thumbnail(base(), ThumbnailSize::ALL)?),
        MediaClass::Document | MediaClass::Other => {}
    }

    Ok(jobs)
}
