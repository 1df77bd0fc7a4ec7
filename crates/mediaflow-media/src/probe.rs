//! FFprobe invocation and technical metadata extraction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use mediaflow_models::{HdrType, MediaClass, MetadataResult};

use crate::codec::codec_display_name;
use crate::error::{MediaError, MediaResult};
use crate::process::{run_process, ProcessLimits};

/// FFprobe JSON output (`-show_format -show_streams`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutput {
    #[serde(default)]
    pub format: ProbeFormat,
    #[serde(default)]
    pub streams: Vec<ProbeStream>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeFormat {
    pub format_name: Option<String>,
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeStream {
    #[serde(default)]
    pub codec_type: String,
    pub codec_name: Option<String>,
    pub codec_tag_string: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub avg_frame_rate: Option<String>,
    pub r_frame_rate: Option<String>,
    pub sample_rate: Option<String>,
    pub channels: Option<u32>,
    pub bits_per_sample: Option<u32>,
    pub bits_per_raw_sample: Option<String>,
    pub color_space: Option<String>,
    pub color_transfer: Option<String>,
    pub color_primaries: Option<String>,
    #[serde(default)]
    pub side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeSideData {
    pub side_data_type: Option<String>,
}

impl ProbeOutput {
    /// Parse raw probe JSON.
    pub fn from_json(bytes: &[u8]) -> MediaResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// First video stream, if any.
    pub fn video_stream(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| s.codec_type == "video")
    }

    /// First audio stream, if any.
    pub fn audio_stream(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| s.codec_type == "audio")
    }

    /// Container duration in seconds.
    pub fn duration(&self) -> Option<f64> {
        parse_float(self.format.duration.as_deref())
    }
}

/// Runner for the probe tool.
#[derive(Debug, Clone)]
pub struct FfprobeRunner {
    binary: PathBuf,
    limits: ProcessLimits,
}

impl FfprobeRunner {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            limits: ProcessLimits::new(timeout),
        }
    }

    /// Probe a media file.
    pub async fn probe(&self, path: impl AsRef<Path>) -> MediaResult<ProbeOutput> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(MediaError::FileNotFound(path.to_path_buf()));
        }

        let args: Vec<String> = [
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(path.to_string_lossy().to_string()))
        .collect();

        let output = run_process("ffprobe", &self.binary, &args, self.limits).await?;

        if !output.status.success() {
            return Err(MediaError::ffprobe_failed(
                format!("FFprobe exited with status {:?}", output.status.code()),
                Some(output.stderr_lossy()),
            ));
        }

        debug!("Probed {} in {:?}", path.display(), output.elapsed);
        ProbeOutput::from_json(&output.stdout)
    }
}

/// Parse frame rate string (e.g., "30000/1001" or "29.97").
pub fn parse_frame_rate(s: &str) -> Option<f64> {
    let s = s.trim();
    if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den != 0.0 {
            return Some(num / den);
        }
        return None;
    }
    s.parse().ok()
}

fn parse_float(s: Option<&str>) -> Option<f64> {
    s.and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn stream_frame_rate(stream: &ProbeStream) -> Option<f64> {
    [stream.avg_frame_rate.as_deref(), stream.r_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .filter_map(parse_frame_rate)
        .find(|fps| *fps > 0.0)
}

fn is_dolby_vision_side_data(kind: &str) -> bool {
    kind.contains("DOVI") || kind.contains("Dolby Vision")
}

fn is_hdr10_plus_side_data(kind: &str) -> bool {
    kind.contains("HDR10+") || kind.contains("SMPTE2094-40")
}

/// Classify HDR, first match wins: Dolby Vision, HDR10+, HDR10, HLG, SDR.
pub fn classify_hdr(probe: &ProbeOutput) -> Option<HdrType> {
    let side_data = || {
        probe
            .streams
            .iter()
            .flat_map(|s| s.side_data_list.iter())
            .filter_map(|sd| sd.side_data_type.as_deref())
    };

    let dovi_tag = probe.streams.iter().any(|s| {
        s.codec_tag_string
            .as_deref()
            .map(|tag| tag.to_ascii_lowercase().contains("dovi"))
            .unwrap_or(false)
    });
    if dovi_tag || side_data().any(is_dolby_vision_side_data) {
        return Some(HdrType::DolbyVision);
    }

    if side_data().any(is_hdr10_plus_side_data) {
        return Some(HdrType::Hdr10Plus);
    }

    match probe
        .video_stream()
        .and_then(|v| v.color_transfer.as_deref())
    {
        Some("smpte2084") => Some(HdrType::Hdr10),
        Some("arib-std-b67") => Some(HdrType::Hlg),
        _ => None,
    }
}

/// Build the metadata record from probe output.
///
/// Audio assets ignore video streams (cover art); images keep dimensions
/// but carry no duration or frame rate.
pub fn extract_metadata(probe: &ProbeOutput, mime_type: &str) -> MetadataResult {
    let class = MediaClass::from_mime(mime_type);

    let mut result = MetadataResult {
        duration: probe.duration(),
        bit_rate: parse_float(probe.format.bit_rate.as_deref()),
        format: probe.format.format_name.clone(),
        ..Default::default()
    };

    let video = match class {
        MediaClass::Audio => None,
        _ => probe.video_stream(),
    };

    if let Some(video) = video {
        result.width = video.width;
        result.height = video.height;
        result.frame_rate = stream_frame_rate(video);
        result.video_codec = video.codec_name.clone();
        result.video_codec_name = video.codec_name.as_deref().map(codec_display_name);
        result.color_space = video.color_space.clone();

        let hdr = classify_hdr(probe);
        result.is_hdr = Some(hdr.is_some());
        result.hdr_type = hdr;
    }

    if let Some(audio) = probe.audio_stream() {
        result.audio_codec = audio.codec_name.clone();
        result.audio_codec_name = audio.codec_name.as_deref().map(codec_display_name);
        result.sample_rate = audio
            .sample_rate
            .as_deref()
            .and_then(|s| s.trim().parse().ok());
        result.channels = audio.channels;
        result.audio_bit_depth = audio
            .bits_per_raw_sample
            .as_deref()
            .and_then(|s| s.trim().parse::<u32>().ok())
            .filter(|b| *b > 0)
            .or(audio.bits_per_sample.filter(|b| *b > 0));
    }

    if class == MediaClass::Image {
        result.duration = None;
        result.frame_rate = None;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe_from(json: serde_json::Value) -> ProbeOutput {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("24/1"), Some(24.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_extract_video_metadata() {
        let probe = probe_from(serde_json::json!({
            "format": {"format_name": "mov,mp4,m4a,3gp,3g2,mj2", "duration": "12.345", "bit_rate": "4500000"},
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1920, "height": 1080,
                 "avg_frame_rate": "30000/1001", "r_frame_rate": "30000/1001",
                 "color_space": "bt709", "color_transfer": "bt709"},
                {"codec_type": "audio", "codec_name": "aac", "sample_rate": "48000", "channels": 2,
                 "bits_per_sample": 0}
            ]
        }));

        let meta = extract_metadata(&probe, "video/mp4");
        assert_eq!(meta.duration, Some(12.345));
        assert_eq!(meta.bit_rate, Some(4_500_000.0));
        assert_eq!(meta.width, Some(1920));
        assert_eq!(meta.height, Some(1080));
        assert!((meta.frame_rate.unwrap() - 29.97).abs() < 0.01);
        assert_eq!(meta.video_codec.as_deref(), Some("h264"));
        assert_eq!(meta.video_codec_name.as_deref(), Some("H.264/AVC"));
        assert_eq!(meta.audio_codec_name.as_deref(), Some("AAC"));
        assert_eq!(meta.sample_rate, Some(48_000));
        assert_eq!(meta.channels, Some(2));
        assert_eq!(meta.audio_bit_depth, None);
        assert_eq!(meta.is_hdr, Some(false));
        assert_eq!(meta.hdr_type, None);
        assert_eq!(meta.color_space.as_deref(), Some("bt709"));
    }

    #[test]
    fn test_extract_audio_only() {
        let probe = probe_from(serde_json::json!({
            "format": {"format_name": "wav", "duration": "3.5"},
            "streams": [
                {"codec_type": "audio", "codec_name": "pcm_s24le", "sample_rate": "96000",
                 "channels": 1, "bits_per_sample": 24}
            ]
        }));

        let meta = extract_metadata(&probe, "audio/wav");
        assert_eq!(meta.duration, Some(3.5));
        assert_eq!(meta.width, None);
        assert_eq!(meta.frame_rate, None);
        assert_eq!(meta.is_hdr, None);
        assert_eq!(meta.audio_codec_name.as_deref(), Some("PCM"));
        assert_eq!(meta.audio_bit_depth, Some(24));
        assert_eq!(meta.bit_rate, None);
    }

    #[test]
    fn test_audio_ignores_cover_art() {
        let probe = probe_from(serde_json::json!({
            "format": {"duration": "200.0"},
            "streams": [
                {"codec_type": "audio", "codec_name": "mp3", "sample_rate": "44100", "channels": 2},
                {"codec_type": "video", "codec_name": "mjpeg", "width": 600, "height": 600}
            ]
        }));
        let meta = extract_metadata(&probe, "audio/mpeg");
        assert_eq!(meta.width, None);
        assert_eq!(meta.video_codec, None);
        assert_eq!(meta.audio_codec_name.as_deref(), Some("MP3"));
    }

    #[test]
    fn test_image_has_no_duration() {
        let probe = probe_from(serde_json::json!({
            "format": {"format_name": "png_pipe", "duration": "0.040000"},
            "streams": [{"codec_type": "video", "codec_name": "png", "width": 800, "height": 600,
                         "avg_frame_rate": "25/1"}]
        }));
        let meta = extract_metadata(&probe, "image/png");
        assert_eq!(meta.duration, None);
        assert_eq!(meta.frame_rate, None);
        assert_eq!(meta.width, Some(800));
        assert_eq!(meta.video_codec_name.as_deref(), Some("PNG"));
    }

    #[test]
    fn test_dolby_vision_wins_over_hdr10() {
        let probe = probe_from(serde_json::json!({
            "streams": [{"codec_type": "video", "codec_name": "hevc",
                         "color_transfer": "smpte2084",
                         "side_data_list": [{"side_data_type": "DOVI configuration record"}]}]
        }));
        assert_eq!(classify_hdr(&probe), Some(HdrType::DolbyVision));
    }

    #[test]
    fn test_dolby_vision_codec_tag() {
        let probe = probe_from(serde_json::json!({
            "streams": [{"codec_type": "video", "codec_name": "hevc", "codec_tag_string": "dvh1",
                         "color_transfer": "smpte2084"},
                        {"codec_type": "video", "codec_tag_string": "DOVI"}]
        }));
        assert_eq!(classify_hdr(&probe), Some(HdrType::DolbyVision));
    }

    #[test]
    fn test_hdr10_plus_before_hdr10() {
        let probe = probe_from(serde_json::json!({
            "streams": [{"codec_type": "video", "color_transfer": "smpte2084",
                         "side_data_list": [
                            {"side_data_type": "Mastering display metadata"},
                            {"side_data_type": "HDR Dynamic Metadata SMPTE2094-40 (HDR10+)"}]}]
        }));
        assert_eq!(classify_hdr(&probe), Some(HdrType::Hdr10Plus));
    }

    #[test]
    fn test_transfer_based_classification() {
        let hdr10 = probe_from(serde_json::json!({
            "streams": [{"codec_type": "video", "color_transfer": "smpte2084"}]
        }));
        let hlg = probe_from(serde_json::json!({
            "streams": [{"codec_type": "video", "color_transfer": "arib-std-b67"}]
        }));
        let sdr = probe_from(serde_json::json!({
            "streams": [{"codec_type": "video", "color_transfer": "bt709"}]
        }));
        assert_eq!(classify_hdr(&hdr10), Some(HdrType::Hdr10));
        assert_eq!(classify_hdr(&hlg), Some(HdrType::Hlg));
        assert_eq!(classify_hdr(&sdr), None);

        let meta = extract_metadata(&hdr10, "video/quicktime");
        assert_eq!(meta.is_hdr, Some(true));
        assert_eq!(meta.hdr_type, Some(HdrType::Hdr10));
    }

    #[test]
    fn test_missing_format_fields() {
        let probe = ProbeOutput::from_json(br#"{"streams": []}"#).unwrap();
        let meta = extract_metadata(&probe, "video/mp4");
        assert_eq!(meta, MetadataResult::default());
    }
}
