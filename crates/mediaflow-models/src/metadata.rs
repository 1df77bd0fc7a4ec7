//! Technical metadata derived from probing an asset.

use std::fmt;

use serde::{Deserialize, Serialize};

/// High dynamic range flavour of a video stream. SDR is `None` at use sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HdrType {
    #[serde(rename = "HDR10")]
    Hdr10,
    #[serde(rename = "HDR10+")]
    Hdr10Plus,
    #[serde(rename = "HLG")]
    Hlg,
    #[serde(rename = "Dolby Vision")]
    DolbyVision,
}

impl HdrType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hdr10 => "HDR10",
            Self::Hdr10Plus => "HDR10+",
            Self::Hlg => "HLG",
            Self::DolbyVision => "Dolby Vision",
        }
    }

    /// Transfer characteristic signalled when the stream is kept HDR.
    pub fn transfer_characteristic(&self) -> &'static str {
        match self {
            Self::Hlg => "arib-std-b67",
            Self::Hdr10 | Self::Hdr10Plus | Self::DolbyVision => "smpte2084",
        }
    }
}

impl fmt::Display for HdrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the metadata job. Audio-only assets have no video fields and
/// vice versa, so everything is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataResult {
    /// Seconds.
    pub duration: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub video_codec: Option<String>,
    pub video_codec_name: Option<String>,
    pub audio_codec: Option<String>,
    pub audio_codec_name: Option<String>,
    /// Container bit rate in bits/second.
    pub bit_rate: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
    #[serde(rename = "isHDR")]
    pub is_hdr: Option<bool>,
    pub hdr_type: Option<HdrType>,
    pub color_space: Option<String>,
    pub audio_bit_depth: Option<u32>,
    pub format: Option<String>,
}

impl MetadataResult {
    /// Duration if known and positive.
    pub fn positive_duration(&self) -> Option<f64> {
        self.duration.filter(|d| d.is_finite() && *d > 0.0)
    }

    /// `(width, height)` if both are known and non-zero.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hdr_type_names() {
        assert_eq!(
            serde_json::to_string(&HdrType::DolbyVision).unwrap(),
            "\"Dolby Vision\""
        );
        assert_eq!(
            serde_json::from_str::<HdrType>("\"HDR10+\"").unwrap(),
            HdrType::Hdr10Plus
        );
    }

    #[test]
    fn test_metadata_serializes_nulls() {
        let meta = MetadataResult {
            duration: Some(12.5),
            is_hdr: Some(false),
            ..Default::default()
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["duration"], 12.5);
        assert_eq!(value["isHDR"], false);
        assert!(value["hdrType"].is_null());
        assert!(value["width"].is_null());
    }

    #[test]
    fn test_positive_duration() {
        let mut meta = MetadataResult::default();
        assert_eq!(meta.positive_duration(), None);
        meta.duration = Some(0.0);
        assert_eq!(meta.positive_duration(), None);
        meta.duration = Some(3.2);
        assert_eq!(meta.positive_duration(), Some(3.2));
    }
}
