//! Job definitions for queue processing.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{ProxyResolution, ThumbnailSize};
use crate::error::{ModelError, ModelResult};
use crate::metadata::HdrType;

/// Unique identifier for a queued job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dequeue priority. Lower values are claimed first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum JobPriority {
    UserReprocess = 1,
    #[default]
    Standard = 5,
    BulkUpload = 10,
}

impl JobPriority {
    pub fn value(&self) -> u8 {
        *self as u8
    }
}

impl From<JobPriority> for u8 {
    fn from(p: JobPriority) -> Self {
        p.value()
    }
}

impl TryFrom<u8> for JobPriority {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::UserReprocess),
            5 => Ok(Self::Standard),
            10 => Ok(Self::BulkUpload),
            other => Err(format!("unknown job priority {}", other)),
        }
    }
}

/// Payload-free discriminant of a job; one queue per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Metadata,
    Thumbnail,
    Filmstrip,
    Proxy,
    Waveform,
    FrameCapture,
}

impl JobKind {
    pub const ALL: [JobKind; 6] = [
        Self::Metadata,
        Self::Thumbnail,
        Self::Filmstrip,
        Self::Proxy,
        Self::Waveform,
        Self::FrameCapture,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Thumbnail => "thumbnail",
            Self::Filmstrip => "filmstrip",
            Self::Proxy => "proxy",
            Self::Waveform => "waveform",
            Self::FrameCapture => "frame_capture",
        }
    }

    /// Stable queue identifier, e.g. `media:thumbnail`.
    pub fn queue_name(&self) -> String {
        format!("media:{}", self.as_str())
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ModelError::UnknownKind(s.to_string()))
    }
}

/// Lifecycle of a job: pending on the queue, processing in a pool, then one
/// of the terminal outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
    Skipped,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Skipped)
    }
}

/// Fields shared by every job variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobBase {
    pub asset_id: String,
    pub account_id: String,
    pub project_id: String,
    /// Object storage key of the uploaded source.
    pub storage_key: String,
    pub mime_type: String,
    pub source_filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<JobPriority>,
}

impl JobBase {
    fn validate(&self) -> ModelResult<()> {
        if self.asset_id.is_empty() {
            return Err(ModelError::MissingField("assetId"));
        }
        if self.account_id.is_empty() {
            return Err(ModelError::MissingField("accountId"));
        }
        if self.project_id.is_empty() {
            return Err(ModelError::MissingField("projectId"));
        }
        if self.storage_key.is_empty() {
            return Err(ModelError::MissingField("storageKey"));
        }
        if self.mime_type.is_empty() {
            return Err(ModelError::MissingField("mimeType"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataJob {
    #[serde(flatten)]
    pub base: JobBase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailJob {
    #[serde(flatten)]
    pub base: JobBase,
    pub sizes: BTreeSet<ThumbnailSize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilmstripJob {
    #[serde(flatten)]
    pub base: JobBase,
    /// 0 means unknown.
    #[serde(default)]
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyJob {
    #[serde(flatten)]
    pub base: JobBase,
    pub resolutions: BTreeSet<ProxyResolution>,
    #[serde(default)]
    pub source_width: u32,
    #[serde(default)]
    pub source_height: u32,
    #[serde(default, rename = "isHDR")]
    pub is_hdr: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hdr_type: Option<HdrType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveformJob {
    #[serde(flatten)]
    pub base: JobBase,
    #[serde(default)]
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameCaptureJob {
    #[serde(flatten)]
    pub base: JobBase,
    /// Capture position in seconds.
    pub timestamp: f64,
}

/// A unit of work for one queue, discriminated by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobVariant {
    Metadata(MetadataJob),
    Thumbnail(ThumbnailJob),
    Filmstrip(FilmstripJob),
    Proxy(ProxyJob),
    Waveform(WaveformJob),
    FrameCapture(FrameCaptureJob),
}

impl JobVariant {
    pub fn metadata(base: JobBase) -> ModelResult<Self> {
        Self::Metadata(MetadataJob { base }).validated()
    }

    pub fn thumbnail(
        base: JobBase,
        sizes: impl IntoIterator<Item = ThumbnailSize>,
    ) -> ModelResult<Self> {
        Self::Thumbnail(ThumbnailJob {
            base,
            sizes: sizes.into_iter().collect(),
        })
        .validated()
    }

    pub fn filmstrip(base: JobBase, duration_seconds: f64) -> ModelResult<Self> {
        Self::Filmstrip(FilmstripJob {
            base,
            duration_seconds,
        })
        .validated()
    }

    pub fn proxy(
        base: JobBase,
        resolutions: impl IntoIterator<Item = ProxyResolution>,
        source_width: u32,
        source_height: u32,
        hdr_type: Option<HdrType>,
    ) -> ModelResult<Self> {
        Self::Proxy(ProxyJob {
            base,
            resolutions: resolutions.into_iter().collect(),
            source_width,
            source_height,
            is_hdr: hdr_type.is_some(),
            hdr_type,
        })
        .validated()
    }

    pub fn waveform(base: JobBase, duration_seconds: f64) -> ModelResult<Self> {
        Self::Waveform(WaveformJob {
            base,
            duration_seconds,
        })
        .validated()
    }

    pub fn frame_capture(base: JobBase, timestamp: f64) -> ModelResult<Self> {
        Self::FrameCapture(FrameCaptureJob { base, timestamp }).validated()
    }

    fn validated(self) -> ModelResult<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Check construction invariants. Also applied to payloads read off a queue.
    pub fn validate(&self) -> ModelResult<()> {
        self.base().validate()?;
        match self {
            Self::Metadata(_) => Ok(()),
            Self::Thumbnail(j) if j.sizes.is_empty() => Err(ModelError::EmptySizes),
            Self::Thumbnail(_) => Ok(()),
            Self::Filmstrip(FilmstripJob {
                duration_seconds: d,
                ..
            })
            | Self::Waveform(WaveformJob {
                duration_seconds: d,
                ..
            }) => {
                if d.is_finite() && *d >= 0.0 {
                    Ok(())
                } else {
                    Err(ModelError::InvalidDuration(*d))
                }
            }
            Self::Proxy(j) if j.resolutions.is_empty() => Err(ModelError::EmptyResolutions),
            Self::Proxy(_) => Ok(()),
            Self::FrameCapture(j) => {
                if j.timestamp.is_finite() && j.timestamp >= 0.0 {
                    Ok(())
                } else {
                    Err(ModelError::InvalidTimestamp(j.timestamp))
                }
            }
        }
    }

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

    pub fn base(&self) -> &JobBase {
        match self {
            Self::Metadata(j) => &j.base,
            Self::Thumbnail(j) => &j.base,
            Self::Filmstrip(j) => &j.base,
            Self::Proxy(j) => &j.base,
            Self::Waveform(j) => &j.base,
            Self::FrameCapture(j) => &j.base,
        }
    }

    pub fn asset_id(&self) -> &str {
        &self.base().asset_id
    }

    /// Effective priority; unset means standard.
    pub fn priority(&self) -> JobPriority {
        self.base().priority.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn base() -> JobBase {
        JobBase {
            asset_id: "asset-1".to_string(),
            account_id: "acct-1".to_string(),
            project_id: "proj-1".to_string(),
            storage_key: "uploads/asset-1/source.mp4".to_string(),
            mime_type: "video/mp4".to_string(),
            source_filename: "source.mp4".to_string(),
            priority: None,
        }
    }

    #[test]
    fn test_priority_ordering() {
        assert!(JobPriority::UserReprocess < JobPriority::Standard);
        assert!(JobPriority::Standard < JobPriority::BulkUpload);
        assert_eq!(JobPriority::UserReprocess.value(), 1);
        assert_eq!(JobPriority::Standard.value(), 5);
        assert_eq!(JobPriority::BulkUpload.value(), 10);
    }

    #[test]
    fn test_priority_serializes_as_number() {
        let json = serde_json::to_string(&JobPriority::BulkUpload).unwrap();
        assert_eq!(json, "10");
        assert!(serde_json::from_str::<JobPriority>("7").is_err());
    }

    #[test]
    fn test_job_wire_format() {
        let job = JobVariant::thumbnail(base(), ThumbnailSize::ALL).unwrap();
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["type"], "thumbnail");
        assert_eq!(value["assetId"], "asset-1");
        assert_eq!(value["sizes"], serde_json::json!(["small", "medium", "large"]));
        assert!(value.get("priority").is_none());

        let parsed: JobVariant = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, job);
    }

    #[test]
    fn test_proxy_job_wire_format() {
        let json = serde_json::json!({
            "type": "proxy",
            "assetId": "a", "accountId": "b", "projectId": "c",
            "storageKey": "k", "mimeType": "video/mp4", "sourceFilename": "f.mp4",
            "priority": 1,
            "resolutions": ["4k", "360p"],
            "sourceWidth": 3840, "sourceHeight": 2160,
            "isHDR": true, "hdrType": "HDR10"
        });
        let job: JobVariant = serde_json::from_value(json).unwrap();
        assert_eq!(job.kind(), JobKind::Proxy);
        assert_eq!(job.priority(), JobPriority::UserReprocess);
        match job {
            JobVariant::Proxy(p) => {
                assert!(p.is_hdr);
                assert_eq!(p.hdr_type, Some(HdrType::Hdr10));
                assert_eq!(
                    p.resolutions.into_iter().collect::<Vec<_>>(),
                    vec![ProxyResolution::P360, ProxyResolution::Uhd4k]
                );
            }
            other => panic!("unexpected variant {:?}", other),
        }
    }

    #[test]
    fn test_validation() {
        assert_eq!(
            JobVariant::frame_capture(base(), -1.0),
            Err(ModelError::InvalidTimestamp(-1.0))
        );
        assert!(JobVariant::frame_capture(base(), 12.5).is_ok());
        assert_eq!(
            JobVariant::proxy(base(), [], 0, 0, None),
            Err(ModelError::EmptyResolutions)
        );
        assert_eq!(
            JobVariant::thumbnail(base(), []),
            Err(ModelError::EmptySizes)
        );
        assert!(JobVariant::filmstrip(base(), f64::NAN).is_err());

        let mut missing = base();
        missing.asset_id.clear();
        assert_eq!(
            JobVariant::metadata(missing),
            Err(ModelError::MissingField("assetId"))
        );
    }

    #[test]
    fn test_job_state_lifecycle() {
        assert!(!JobState::Pending.is_terminal());
        assert!(!JobState::Processing.is_terminal());
        assert!(JobState::Skipped.is_terminal());
        assert_eq!(serde_json::to_string(&JobState::Processing).unwrap(), "\"processing\"");
    }

    #[test]
    fn test_queue_names() {
        assert_eq!(JobKind::Metadata.queue_name(), "media:metadata");
        assert_eq!(JobKind::FrameCapture.queue_name(), "media:frame_capture");
        assert_eq!("proxy".parse::<JobKind>().unwrap(), JobKind::Proxy);
        assert!("hls".parse::<JobKind>().is_err());
    }
}
