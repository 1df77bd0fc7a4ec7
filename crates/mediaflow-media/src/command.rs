//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::{MediaError, MediaResult};
use crate::process::{run_process, ProcessLimits};

/// Builder for FFmpeg commands.
#[derive(Debug, Clone, PartialEq)]
pub struct FfmpegCommand {
    /// Input file path
    input: PathBuf,
    /// Output file path
    output: PathBuf,
    /// Input arguments (before -i)
    input_args: Vec<String>,
    /// Output arguments (after -i)
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    pub fn input(&self) -> &Path {
        &self.input
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before input, so seeking is fast).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set target video bitrate with a matching VBV buffer.
    pub fn video_bitrate(self, bits_per_second: u64) -> Self {
        self.output_arg("-b:v")
            .output_arg(bits_per_second.to_string())
            .output_arg("-maxrate")
            .output_arg(bits_per_second.to_string())
            .output_arg("-bufsize")
            .output_arg((bits_per_second * 2).to_string())
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bits_per_second: u64) -> Self {
        self.output_arg("-b:a").output_arg(bits_per_second.to_string())
    }

    /// Set output pixel format.
    pub fn pixel_format(self, format: impl Into<String>) -> Self {
        self.output_arg("-pix_fmt").output_arg(format)
    }

    /// Extract single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-frames:v").output_arg("1")
    }

    /// Still image quality scale (2 = best for mjpeg).
    pub fn quality(self, qscale: u8) -> Self {
        self.output_arg("-q:v").output_arg(qscale.to_string())
    }

    /// Force the output container/format.
    pub fn format(self, format: impl Into<String>) -> Self {
        self.output_arg("-f").output_arg(format)
    }

    /// Drop video streams.
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    /// Downmix/resample audio.
    pub fn audio_channels(self, channels: u32) -> Self {
        self.output_arg("-ac").output_arg(channels.to_string())
    }

    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.output_arg("-ar").output_arg(rate.to_string())
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Whether any output argument equals `arg`.
    pub fn has_output_arg(&self, arg: &str) -> bool {
        self.output_args.iter().any(|a| a == arg)
    }

    /// Value following `flag` in the output arguments.
    pub fn output_value(&self, flag: &str) -> Option<&str> {
        self.output_args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.output_args.get(i + 1))
            .map(String::as_str)
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-nostdin".to_string());

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        args.extend(self.input_args.clone());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with a hard wall-clock timeout.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    binary: PathBuf,
    limits: ProcessLimits,
}

impl FfmpegRunner {
    /// Create a new runner for the binary at `binary`.
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            limits: ProcessLimits::new(timeout),
        }
    }

    /// Cap the stderr tail kept for error reports.
    pub fn with_max_stderr_bytes(mut self, bytes: usize) -> Self {
        self.limits.max_stderr_bytes = bytes;
        self
    }

    /// Run an FFmpeg command; non-zero exit and timeout are errors.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        let args = cmd.build_args();
        let output = run_process("ffmpeg", &self.binary, &args, self.limits).await?;

        if output.status.success() {
            debug!(
                "FFmpeg finished in {:?}: {}",
                output.elapsed,
                cmd.output().display()
            );
            Ok(())
        } else {
            Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(output.stderr_lossy()),
                output.status.code(),
            ))
        }
    }
}

/// Resolve a configured binary, searching PATH for bare names.
pub fn check_binary(tool: &'static str, binary: impl AsRef<Path>) -> MediaResult<PathBuf> {
    let binary = binary.as_ref();
    which::which(binary).map_err(|_| MediaError::ToolNotFound {
        tool,
        path: binary.to_path_buf(),
    })
}
