//! Engine command builder.

use crate::params::EncodeParams;
use std::path::{Path, PathBuf};

pub const VIDEO_CODEC: &str = "libx264";
pub const VIDEO_PRESET: &str = "fast";
pub const AUDIO_CODEC: &str = "aac";
pub const AUDIO_BITRATE: &str = "128k";

/// Builder for engine invocations.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Arguments placed before `-i`
    input_args: Vec<String>,
    /// Arguments placed after `-i`
    output_args: Vec<String>,
    overwrite: bool,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
        }
    }

    /// The fixed compression policy: constant-quality H.264, AAC audio, fast-start MP4 atoms.
    pub fn compress(params: &EncodeParams, input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        let mut cmd = Self::new(input, output);
        if let Some(start) = &params.start_time {
            cmd = cmd.seek(start);
        }
        if let Some(duration) = &params.duration {
            cmd = cmd.duration(duration);
        }

        cmd.video_filter(params.scale.filter())
            .video_codec(VIDEO_CODEC)
            .crf(params.crf)
            .preset(VIDEO_PRESET)
            .audio_codec(AUDIO_CODEC)
            .audio_bitrate(AUDIO_BITRATE)
            .output_arg("-movflags")
            .output_arg("+faststart")
    }

    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Seek before decoding starts.
    pub fn seek(self, position: impl Into<String>) -> Self {
        self.input_arg("-ss").input_arg(position)
    }

    /// Limit the encoded duration.
    pub fn duration(self, duration: impl Into<String>) -> Self {
        self.output_arg("-t").output_arg(duration)
    }

    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = self.input_args.clone();

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.iter().cloned());

        if self.overwrite {
            args.push("-y".to_string());
        }
        args.push(self.output.to_string_lossy().to_string());

        args
    }
}
