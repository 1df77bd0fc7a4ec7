//! FFmpeg CLI wrapper for media artifact generation.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building and bounded process execution
//! - FFprobe JSON parsing, metadata extraction and HDR classification
//! - Filter chains for scaling, tone mapping and filmstrip tiling
//! - Waveform and filmstrip math
//! - Scoped per-job temp workspaces

pub mod codec;
pub mod command;
pub mod error;
pub mod filmstrip;
pub mod filters;
pub mod probe;
pub mod process;
pub mod toolkit;
pub mod waveform;
pub mod workspace;

pub use codec::codec_display_name;
pub use command::{check_binary, FfmpegCommand, FfmpegRunner};
pub use error::{MediaError, MediaResult};
pub use filmstrip::FilmstripLayout;
pub use filters::{
    build_filmstrip_filter, build_scale_filter, build_thumbnail_filter, build_tonemap_filter,
    build_tonemapped_scale_filter,
};
pub use probe::{
    classify_hdr, extract_metadata, parse_frame_rate, FfprobeRunner, ProbeFormat, ProbeOutput,
    ProbeStream,
};
pub use process::{run_process, ProcessLimits, ProcessOutput};
pub use toolkit::{FfmpegToolkit, MediaToolkit};
pub use waveform::{compute_peaks, decode_pcm_s16le, peak_count, WaveformData};
pub use workspace::TempWorkspace;
