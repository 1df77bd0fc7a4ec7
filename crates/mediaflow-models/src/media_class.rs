//! Mime type classification.

use serde::{Deserialize, Serialize};

/// Broad category of an uploaded asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaClass {
    Video,
    Audio,
    Image,
    Document,
    Other,
}

impl MediaClass {
    /// Classify by mime prefix, then by document substrings.
    pub fn from_mime(mime_type: &str) -> Self {
        let mime = mime_type.trim().to_ascii_lowercase();
        if mime.starts_with("video/") {
            Self::Video
        } else if mime.starts_with("audio/") {
            Self::Audio
        } else if mime.starts_with("image/") {
            Self::Image
        } else if ["pdf", "document", "spreadsheet", "presentation"]
            .iter()
            .any(|needle| mime.contains(needle))
        {
            Self::Document
        } else {
            Self::Other
        }
    }

    pub fn is_video(mime_type: &str) -> bool {
        Self::from_mime(mime_type) == Self::Video
    }

    /// Audio or video, i.e. something with a soundtrack to draw.
    pub fn has_audio_track(mime_type: &str) -> bool {
        matches!(Self::from_mime(mime_type), Self::Video | Self::Audio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(MediaClass::from_mime("video/mp4"), MediaClass::Video);
        assert_eq!(MediaClass::from_mime("Video/QuickTime"), MediaClass::Video);
        assert_eq!(MediaClass::from_mime("audio/wav"), MediaClass::Audio);
        assert_eq!(MediaClass::from_mime("image/png"), MediaClass::Image);
        assert_eq!(MediaClass::from_mime("application/pdf"), MediaClass::Document);
        assert_eq!(
            MediaClass::from_mime("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
            MediaClass::Document
        );
        assert_eq!(
            MediaClass::from_mime("application/vnd.ms-powerpoint.presentation"),
            MediaClass::Document
        );
        assert_eq!(MediaClass::from_mime("application/zip"), MediaClass::Other);
    }

    #[test]
    fn test_helpers() {
        assert!(MediaClass::is_video("video/webm"));
        assert!(!MediaClass::is_video("audio/mpeg"));
        assert!(MediaClass::has_audio_track("audio/mpeg"));
        assert!(!MediaClass::has_audio_track("image/jpeg"));
    }
}
