//! Waveform peak computation from raw PCM.

use serde::{Deserialize, Serialize};

/// Serialized waveform document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveformData {
    pub version: u32,
    /// Peaks per second.
    pub sample_rate: u32,
    pub channels: u32,
    pub duration: f64,
    pub peaks: Vec<f32>,
}

/// Number of peaks for a clip: `ceil(duration * samples_per_second)`.
pub fn peak_count(duration_seconds: f64, samples_per_second: u32) -> usize {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        return 0;
    }
    (duration_seconds * samples_per_second as f64).ceil() as usize
}

/// Decode signed 16-bit little-endian PCM into absolute amplitudes in `[0, 1]`.
/// A trailing odd byte is ignored.
pub fn decode_pcm_s16le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| {
            let sample = i16::from_le_bytes([pair[0], pair[1]]);
            (f32::from(sample).abs() / 32768.0).min(1.0)
        })
        .collect()
}

/// Split `amplitudes` into `total` equal windows and take each window's max.
///
/// Windows are `ceil(len / total)` samples wide; windows past the end of the
/// data are 0. Peaks are rounded to 4 decimals.
pub fn compute_peaks(amplitudes: &[f32], total: usize) -> Vec<f32> {
    if total == 0 {
        return Vec::new();
    }

    let window = amplitudes.len().div_ceil(total).max(1);

    (0..total)
        .map(|i| {
            let start = i * window;
            if start >= amplitudes.len() {
                return 0.0;
            }
            let end = (start + window).min(amplitudes.len());
            let peak = amplitudes[start..end]
                .iter()
                .copied()
                .fold(0.0f32, f32::max);
            (peak * 10_000.0).round() / 10_000.0
        })
        .collect()
}
