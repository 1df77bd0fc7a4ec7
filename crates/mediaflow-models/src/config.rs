//! Pipeline constant tables.
//!
//! Every processor, pool and the enqueue service read their limits from a
//! [`PipelineConfig`] built once at startup and passed down explicitly.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::job::JobKind;

/// Thumbnail size variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailSize {
    Small,
    Medium,
    Large,
}

impl ThumbnailSize {
    pub const ALL: [ThumbnailSize; 3] = [Self::Small, Self::Medium, Self::Large];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Small => "small",
            Self::Medium => "medium",
            Self::Large => "large",
        }
    }

    /// Target frame dimensions `(width, height)`; all 16:9.
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::Small => (320, 180),
            Self::Medium => (640, 360),
            Self::Large => (1280, 720),
        }
    }
}

impl fmt::Display for ThumbnailSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rungs of the proxy resolution ladder, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ProxyResolution {
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "540p")]
    P540,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "4k")]
    Uhd4k,
}

impl ProxyResolution {
    pub const ALL: [ProxyResolution; 5] = [
        Self::P360,
        Self::P540,
        Self::P720,
        Self::P1080,
        Self::Uhd4k,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::P360 => "360p",
            Self::P540 => "540p",
            Self::P720 => "720p",
            Self::P1080 => "1080p",
            Self::Uhd4k => "4k",
        }
    }

    /// Encoding parameters for this rung.
    pub fn config(&self) -> ProxyConfig {
        let (width, height, video_bitrate) = match self {
            Self::P360 => (640, 360, 800_000),
            Self::P540 => (960, 540, 1_500_000),
            Self::P720 => (1280, 720, 2_500_000),
            Self::P1080 => (1920, 1080, 5_000_000),
            Self::Uhd4k => (3840, 2160, 15_000_000),
        };
        ProxyConfig {
            width,
            height,
            video_bitrate,
            audio_bitrate: PROXY_AUDIO_BITRATE,
        }
    }
}

impl fmt::Display for ProxyResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audio bitrate shared by every proxy rung.
pub const PROXY_AUDIO_BITRATE: u64 = 128_000;

/// Encoding parameters for one proxy rung.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxyConfig {
    pub width: u32,
    pub height: u32,
    pub video_bitrate: u64,
    pub audio_bitrate: u64,
}

/// Filmstrip sprite geometry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilmstripConfig {
    pub tile_width: u32,
    pub tile_height: u32,
    pub columns: u32,
    pub capture_fps: f64,
}

impl Default for FilmstripConfig {
    fn default() -> Self {
        Self {
            tile_width: 160,
            tile_height: 90,
            columns: 10,
            capture_fps: 1.0,
        }
    }
}

/// Waveform sampling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveformConfig {
    pub samples_per_second: u32,
}

impl WaveformConfig {
    /// PCM extraction rate is oversampled 100x relative to the peak rate.
    pub const OVERSAMPLING: u32 = 100;

    pub fn extraction_rate(&self) -> u32 {
        self.samples_per_second * Self::OVERSAMPLING
    }
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            samples_per_second: 10,
        }
    }
}

/// Backoff shape applied by the queue transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    Exponential,
    Fixed,
}

/// Redelivery policy for failed jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: BackoffKind,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffKind::Exponential,
            base_delay: Duration::from_millis(5000),
        }
    }
}

impl RetryPolicy {
    /// Delay before the next delivery after `attempt` (1-based) failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            BackoffKind::Fixed => self.base_delay,
            BackoffKind::Exponential => {
                let exp = attempt.saturating_sub(1).min(16);
                self.base_delay.saturating_mul(1u32 << exp)
            }
        }
    }

    /// Whether another delivery is allowed after `attempt` failed.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Per-kind hard execution timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTimeouts {
    pub metadata: Duration,
    pub thumbnail: Duration,
    pub filmstrip: Duration,
    pub proxy: Duration,
    pub waveform: Duration,
    pub frame_capture: Duration,
}

impl Default for JobTimeouts {
    fn default() -> Self {
        Self {
            metadata: Duration::from_millis(30_000),
            thumbnail: Duration::from_millis(60_000),
            filmstrip: Duration::from_millis(300_000),
            proxy: Duration::from_millis(1_800_000),
            waveform: Duration::from_millis(120_000),
            frame_capture: Duration::from_millis(60_000),
        }
    }
}

impl JobTimeouts {
    pub fn for_kind(&self, kind: JobKind) -> Duration {
        match kind {
            JobKind::Metadata => self.metadata,
            JobKind::Thumbnail => self.thumbnail,
            JobKind::Filmstrip => self.filmstrip,
            JobKind::Proxy => self.proxy,
            JobKind::Waveform => self.waveform,
            JobKind::FrameCapture => self.frame_capture,
        }
    }

    /// Limit of the slowest kind.
    pub fn longest(&self) -> Duration {
        JobKind::ALL
            .into_iter()
            .map(|kind| self.for_kind(kind))
            .max()
            .unwrap_or_default()
    }
}

/// All pipeline constants in one immutable bundle.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub timeouts: JobTimeouts,
    pub retry: RetryPolicy,
    pub filmstrip: FilmstripConfig,
    pub waveform: WaveformConfig,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }
}
