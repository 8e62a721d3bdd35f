//! Probed stream descriptors and the input files of a build.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::format::{FrameSize, PixelFormat, VideoFormat};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoStreamInfo {
    #[serde(default)]
    pub index: usize,
    pub codec: VideoFormat,
    #[serde(default)]
    pub pixel_format: Option<PixelFormat>,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub frame_rate: Option<String>,
    #[serde(default)]
    pub interlaced: bool,
    /// Cover art and other single-picture streams.
    #[serde(default)]
    pub still_image: bool,
}

impl VideoStreamInfo {
    pub fn size(&self) -> FrameSize {
        FrameSize::new(self.width, self.height)
    }

    pub fn bit_depth(&self) -> u8 {
        self.pixel_format.map(|pf| pf.bit_depth()).unwrap_or(8)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioStreamInfo {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub channels: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInput {
    pub path: PathBuf,
    pub stream: VideoStreamInfo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioInput {
    pub path: PathBuf,
    pub stream: AudioStreamInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleKind {
    /// srt, ass and other text formats, rendered by the `subtitles` filter.
    Text,
    /// dvd, pgs and other bitmap formats, composited as an overlay.
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubtitleMethod {
    #[default]
    Burn,
    Copy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleInput {
    pub path: PathBuf,
    #[serde(default)]
    pub stream_index: usize,
    pub kind: SubtitleKind,
    #[serde(default)]
    pub method: SubtitleMethod,
    /// Ordinal among the file's subtitle streams, for embedded text.
    #[serde(default)]
    pub subtitle_ordinal: Option<usize>,
    #[serde(default)]
    pub fonts_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatermarkInput {
    pub path: PathBuf,
    #[serde(default)]
    pub stream_index: usize,
    /// Animated images (gif, apng) loop through their own frames.
    #[serde(default)]
    pub animated: bool,
}

/// Raw RGBA frames written by an external graphics engine, usually `pipe:0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphicsInput {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcatInput {
    pub url: String,
}

/// Everything a transcode build reads. Only `video` is required.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildInputs {
    #[serde(default)]
    pub video: Option<VideoInput>,
    #[serde(default)]
    pub audio: Option<AudioInput>,
    #[serde(default)]
    pub subtitle: Option<SubtitleInput>,
    #[serde(default)]
    pub watermark: Option<WatermarkInput>,
    #[serde(default)]
    pub graphics: Option<GraphicsInput>,
}
