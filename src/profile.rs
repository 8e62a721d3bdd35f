//! Desired output of a build.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::audio::LoudnessNormalization;
use crate::format::{AudioFormat, FrameSize, HardwareAccelerationMode, PixelFormat, VideoFormat};
use crate::graph::placement::WatermarkLocation;
use crate::state::{OutputFormat, StreamMetadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingMode {
    /// Keep the aspect ratio and letterbox onto the output canvas.
    #[default]
    Pad,
    Stretch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioProfile {
    #[serde(default)]
    pub format: AudioFormat,
    #[serde(default = "default_channels")]
    pub channels: u32,
    /// kbit/s
    #[serde(default)]
    pub bitrate: Option<u32>,
    /// kbit
    #[serde(default)]
    pub buffer_size: Option<u32>,
    /// Hz
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub normalize_loudness: LoudnessNormalization,
    /// Pad with silence up to this many seconds.
    #[serde(default)]
    pub pad_duration: Option<f64>,
}

fn default_channels() -> u32 {
    2
}

impl Default for AudioProfile {
    fn default() -> Self {
        Self {
            format: AudioFormat::Aac,
            channels: default_channels(),
            bitrate: None,
            buffer_size: None,
            sample_rate: None,
            normalize_loudness: LoudnessNormalization::None,
            pad_duration: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WatermarkMode {
    #[default]
    Permanent,
    /// Visible for `duration_seconds` once every `frequency_minutes`,
    /// aligned to the wall clock.
    Intermittent {
        frequency_minutes: u32,
        duration_seconds: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatermarkSettings {
    #[serde(default)]
    pub location: WatermarkLocation,
    /// Share of the frame width; 0 keeps the image size.
    #[serde(default)]
    pub width_percent: f64,
    #[serde(default)]
    pub horizontal_margin_percent: f64,
    #[serde(default)]
    pub vertical_margin_percent: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    /// Place relative to the letterboxed content instead of the canvas.
    #[serde(default)]
    pub within_content: bool,
    #[serde(default)]
    pub mode: WatermarkMode,
}

fn default_opacity() -> f64 {
    100.0
}

impl Default for WatermarkSettings {
    fn default() -> Self {
        Self {
            location: WatermarkLocation::default(),
            width_percent: 0.0,
            horizontal_margin_percent: 0.0,
            vertical_margin_percent: 0.0,
            opacity: default_opacity(),
            within_content: false,
            mode: WatermarkMode::Permanent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputProfile {
    #[serde(default)]
    pub acceleration: HardwareAccelerationMode,
    pub video_format: VideoFormat,
    #[serde(default)]
    pub pixel_format: Option<PixelFormat>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub scaling: ScalingMode,
    /// kbit/s
    #[serde(default)]
    pub bitrate: Option<u32>,
    /// kbit
    #[serde(default)]
    pub buffer_size: Option<u32>,
    #[serde(default)]
    pub frame_rate: Option<String>,
    #[serde(default)]
    pub timescale: Option<u32>,
    #[serde(default)]
    pub deinterlace: bool,
    #[serde(default)]
    pub realtime: bool,
    #[serde(default)]
    pub infinite_loop: bool,
    #[serde(default)]
    pub audio: AudioProfile,
    /// Seconds into the source.
    #[serde(default)]
    pub start: Option<f64>,
    /// Seconds of output.
    #[serde(default)]
    pub finish: Option<f64>,
    /// In units of `timescale`.
    #[serde(default)]
    pub pts_offset: i64,
    #[serde(default)]
    pub thread_count: Option<u32>,
    /// Directory for engine reports.
    #[serde(default)]
    pub save_report: Option<PathBuf>,
    #[serde(default)]
    pub metadata: StreamMetadata,
    #[serde(default)]
    pub output: OutputFormat,
    #[serde(default)]
    pub watermark: Option<WatermarkSettings>,
    /// Wall-clock start of the item, for intermittent watermarks.
    #[serde(default)]
    pub item_start: Option<DateTime<Utc>>,
    /// Length of the item in seconds, for intermittent watermarks.
    #[serde(default)]
    pub item_duration: Option<f64>,
}

impl OutputProfile {
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    pub fn start(&self) -> Option<Duration> {
        self.start
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64)
    }

    pub fn finish(&self) -> Option<Duration> {
        self.finish
            .filter(|s| s.is_finite() && *s > 0.0)
            .map(Duration::from_secs_f64)
    }

    pub fn is_copy(&self) -> bool {
        self.video_format == VideoFormat::Copy
    }

    /// A profile with the given codec and size and defaults for the rest.
    pub fn new(video_format: VideoFormat, size: FrameSize) -> Self {
        Self {
            acceleration: HardwareAccelerationMode::None,
            video_format,
            pixel_format: None,
            width: size.width,
            height: size.height,
            scaling: ScalingMode::Pad,
            bitrate: None,
            buffer_size: None,
            frame_rate: None,
            timescale: None,
            deinterlace: false,
            realtime: false,
            infinite_loop: false,
            audio: AudioProfile::default(),
            start: None,
            finish: None,
            pts_offset: 0,
            thread_count: None,
            save_report: None,
            metadata: StreamMetadata::default(),
            output: OutputFormat::MpegTs,
            watermark: None,
            item_start: None,
            item_duration: None,
        }
    }
}

/// Settings of the stream-copy pipelines (concat and segmenter).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CopyProfile {
    #[serde(default)]
    pub thread_count: Option<u32>,
    #[serde(default)]
    pub save_report: Option<PathBuf>,
    #[serde(default)]
    pub metadata: StreamMetadata,
}
