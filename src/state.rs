use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::format::{
    AudioFormat, FrameDataLocation, FrameSize, HardwareAccelerationMode, PixelFormat, VideoFormat,
};

/// Descriptor of the main video stream as it moves through the pipeline.
///
/// Steps never mutate a state; they return a new one from
/// [`PipelineStep::next_state`](crate::step::PipelineStep::next_state).
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FrameState {
    pub location: FrameDataLocation,
    pub pixel_format: Option<PixelFormat>,
    pub video_format: VideoFormat,
    pub audio_format: Option<AudioFormat>,
    pub hardware_acceleration_mode: HardwareAccelerationMode,
    /// Size of the picture content, before padding.
    pub scaled_size: FrameSize,
    /// Size of the output canvas.
    pub padded_size: FrameSize,
    pub frame_rate: Option<String>,
    /// kbit/s
    pub video_bitrate: Option<u32>,
    /// kbit
    pub video_buffer_size: Option<u32>,
    pub video_track_timescale: Option<u32>,
    pub deinterlaced: bool,
    pub start: Option<Duration>,
    pub finish: Option<Duration>,
    /// In units of `video_track_timescale`.
    pub pts_offset: i64,
    pub realtime: bool,
    pub infinite_loop: bool,
}

impl FrameState {
    pub fn bit_depth(&self) -> u8 {
        self.pixel_format.map(|pf| pf.bit_depth()).unwrap_or(8)
    }

    pub fn seeks(&self) -> bool {
        self.start.is_some_and(|start| !start.is_zero())
    }

    pub fn describe(&self) -> String {
        format!(
            "{} {} {} {}",
            self.location,
            self.video_format,
            self.pixel_format
                .map(|pf| pf.ffmpeg_name())
                .unwrap_or("unknown"),
            self.padded_size
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    MpegTs,
    Mp4,
    Mkv,
    Hls {
        playlist: PathBuf,
        segment_template: PathBuf,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreamMetadata {
    #[serde(default)]
    pub service_provider: Option<String>,
    #[serde(default)]
    pub service_name: Option<String>,
    #[serde(default)]
    pub audio_language: Option<String>,
    #[serde(default)]
    pub subtitle_language: Option<String>,
    #[serde(default)]
    pub subtitle_title: Option<String>,
    #[serde(default)]
    pub do_not_map_metadata: bool,
}

/// Settings of one engine invocation that are not properties of the frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineState {
    pub decoder_mode: HardwareAccelerationMode,
    pub encoder_mode: HardwareAccelerationMode,
    pub thread_count: Option<u32>,
    pub save_report: Option<PathBuf>,
    pub metadata: StreamMetadata,
    pub output_format: OutputFormat,
    pub vaapi_device: Option<String>,
    pub vaapi_driver: Option<String>,
    pub supports_readrate_initial_burst: bool,
}

impl EngineState {
    pub fn uses_hardware(&self) -> bool {
        self.decoder_mode.is_hardware() || self.encoder_mode.is_hardware()
    }
}
