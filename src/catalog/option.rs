//! Global, input and output option steps.
//!
//! Options are plain argument emitters. The few that describe the frame
//! (bitrate, frame rate, timing) also record themselves in the state.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::PipelineError;
use crate::format::{
    FrameDataLocation, FrameSize, PixelFormat, format_seconds, format_timestamp, parse_frame_rate,
};
use crate::state::FrameState;
use crate::step::{InputKind, PipelineStep, StepCategory, args};

const HLS_SEGMENT_SECONDS: u32 = 4;

/// Option with a fixed argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticOption {
    name: &'static str,
    category: StepCategory,
    arguments: &'static [&'static str],
}

impl StaticOption {
    const fn global(name: &'static str, arguments: &'static [&'static str]) -> Self {
        Self {
            name,
            category: StepCategory::Global,
            arguments,
        }
    }

    const fn output(name: &'static str, arguments: &'static [&'static str]) -> Self {
        Self {
            name,
            category: StepCategory::Output,
            arguments,
        }
    }

    const fn encoder(name: &'static str, arguments: &'static [&'static str]) -> Self {
        Self {
            name,
            category: StepCategory::Encoder,
            arguments,
        }
    }

    pub const fn no_standard_input() -> Self {
        Self::global("no-standard-input", &["-nostdin"])
    }

    pub const fn hide_banner() -> Self {
        Self::global("hide-banner", &["-hide_banner"])
    }

    pub const fn no_stats() -> Self {
        Self::global("no-stats", &["-nostats"])
    }

    pub const fn loglevel_error() -> Self {
        Self::global("loglevel-error", &["-loglevel", "error"])
    }

    pub const fn standard_format_flags() -> Self {
        Self::global(
            "standard-format-flags",
            &["-fflags", "+genpts+discardcorrupt+igndts"],
        )
    }

    pub const fn no_demux_decode_delay() -> Self {
        Self::output("no-demux-decode-delay", &["-muxdelay", "0", "-muxpreload", "0"])
    }

    pub const fn fast_start() -> Self {
        Self::output("fast-start", &["-movflags", "+faststart"])
    }

    pub const fn fragmented_mp4() -> Self {
        Self::output(
            "fragmented-mp4",
            &[
                "-movflags",
                "+faststart+frag_keyframe+separate_moof+omit_tfhd_offset+empty_moov+delay_moov",
            ],
        )
    }

    pub const fn closed_gop() -> Self {
        Self::output("closed-gop", &["-flags", "cgop"])
    }

    pub const fn no_b_frames() -> Self {
        Self::output("no-b-frames", &["-bf", "0"])
    }

    pub const fn map_all_streams() -> Self {
        Self::output("map-all-streams", &["-map", "0"])
    }

    pub const fn do_not_map_metadata() -> Self {
        Self::output("do-not-map-metadata", &["-map_metadata", "-1"])
    }

    pub const fn pipe() -> Self {
        Self::output("pipe", &["pipe:1"])
    }

    pub const fn copy_all() -> Self {
        Self::encoder("copy-all", &["-c", "copy"])
    }

    pub const fn copy_subtitles() -> Self {
        Self::encoder("copy-subtitles", &["-c:s", "copy"])
    }
}

impl PipelineStep for StaticOption {
    fn name(&self) -> &'static str {
        self.name
    }

    fn category(&self) -> StepCategory {
        self.category
    }

    fn global_options(&self) -> Vec<String> {
        if self.category == StepCategory::Global {
            self.arguments.iter().map(|a| a.to_string()).collect()
        } else {
            Vec::new()
        }
    }

    fn output_options(&self) -> Vec<String> {
        if self.category == StepCategory::Global {
            Vec::new()
        } else {
            self.arguments.iter().map(|a| a.to_string()).collect()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadCount(pub u32);

impl PipelineStep for ThreadCount {
    fn name(&self) -> &'static str {
        "thread-count"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Global
    }

    fn global_options(&self) -> Vec<String> {
        vec!["-threads".to_string(), self.0.to_string()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSeek(pub Duration);

impl PipelineStep for StreamSeek {
    fn name(&self) -> &'static str {
        "stream-seek"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Input
    }

    fn input_options(&self, _kind: InputKind) -> Vec<String> {
        vec!["-ss".to_string(), format_timestamp(self.0)]
    }

    fn applies_to(&self, kind: InputKind) -> bool {
        matches!(kind, InputKind::Video | InputKind::Audio)
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        FrameState {
            start: Some(self.0),
            ..current.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeLimit(pub Duration);

impl PipelineStep for TimeLimit {
    fn name(&self) -> &'static str {
        "time-limit"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Output
    }

    fn output_options(&self) -> Vec<String> {
        vec!["-t".to_string(), format_timestamp(self.0)]
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        FrameState {
            finish: Some(self.0),
            ..current.clone()
        }
    }
}

/// Input pacing. An initial burst lets the engine race ahead before
/// settling into realtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readrate {
    pub initial_burst: u32,
    pub supports_initial_burst: bool,
}

impl Readrate {
    pub fn realtime() -> Self {
        Self {
            initial_burst: 0,
            supports_initial_burst: false,
        }
    }
}

impl PipelineStep for Readrate {
    fn name(&self) -> &'static str {
        "readrate"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Input
    }

    fn input_options(&self, _kind: InputKind) -> Vec<String> {
        match (self.initial_burst, self.supports_initial_burst) {
            (0, _) => args(["-readrate", "1.0"]),
            (burst, true) => vec![
                "-readrate".to_string(),
                "1.0".to_string(),
                "-readrate_initial_burst".to_string(),
                burst.to_string(),
            ],
            (_, false) => args(["-readrate", "1.05"]),
        }
    }

    fn applies_to(&self, kind: InputKind) -> bool {
        matches!(kind, InputKind::Video | InputKind::Audio | InputKind::Concat)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InfiniteLoop;

impl PipelineStep for InfiniteLoop {
    fn name(&self) -> &'static str {
        "infinite-loop"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Input
    }

    fn input_options(&self, _kind: InputKind) -> Vec<String> {
        args(["-stream_loop", "-1"])
    }

    fn applies_to(&self, kind: InputKind) -> bool {
        matches!(
            kind,
            InputKind::Video | InputKind::Audio | InputKind::Concat | InputKind::Watermark
        )
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        FrameState {
            infinite_loop: true,
            ..current.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConcatInputFormat;

impl PipelineStep for ConcatInputFormat {
    fn name(&self) -> &'static str {
        "concat-input-format"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Input
    }

    fn input_options(&self, _kind: InputKind) -> Vec<String> {
        args([
            "-f",
            "concat",
            "-safe",
            "0",
            "-protocol_whitelist",
            "file,http,tcp,https,tcp,tls",
            "-probesize",
            "32",
        ])
    }

    fn applies_to(&self, kind: InputKind) -> bool {
        kind == InputKind::Concat
    }
}

/// Keeps source timestamps so text subtitles line up after a seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CopyTimestamps;

impl PipelineStep for CopyTimestamps {
    fn name(&self) -> &'static str {
        "copy-timestamps"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Input
    }

    fn input_options(&self, _kind: InputKind) -> Vec<String> {
        args(["-copyts"])
    }

    fn applies_to(&self, kind: InputKind) -> bool {
        kind == InputKind::Video
    }
}

/// Animated watermarks loop on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DoNotIgnoreLoop;

impl PipelineStep for DoNotIgnoreLoop {
    fn name(&self) -> &'static str {
        "do-not-ignore-loop"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Input
    }

    fn input_options(&self, _kind: InputKind) -> Vec<String> {
        args(["-ignore_loop", "0"])
    }

    fn applies_to(&self, kind: InputKind) -> bool {
        kind == InputKind::Watermark
    }
}

/// Raw RGBA frames produced by an external graphics engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphicsEngineInputFormat {
    pub size: FrameSize,
    pub frame_rate: String,
}

impl PipelineStep for GraphicsEngineInputFormat {
    fn name(&self) -> &'static str {
        "graphics-engine-input-format"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Input
    }

    fn input_options(&self, _kind: InputKind) -> Vec<String> {
        vec![
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgba".to_string(),
            "-s".to_string(),
            self.size.to_string(),
            "-r".to_string(),
            self.frame_rate.clone(),
        ]
    }

    fn applies_to(&self, kind: InputKind) -> bool {
        kind == InputKind::GraphicsEngine
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoBitrate(pub u32);

impl PipelineStep for VideoBitrate {
    fn name(&self) -> &'static str {
        "video-bitrate"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Output
    }

    fn output_options(&self) -> Vec<String> {
        vec![
            "-b:v".to_string(),
            format!("{}k", self.0),
            "-maxrate:v".to_string(),
            format!("{}k", self.0),
        ]
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        FrameState {
            video_bitrate: Some(self.0),
            ..current.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoBufferSize(pub u32);

impl PipelineStep for VideoBufferSize {
    fn name(&self) -> &'static str {
        "video-buffer-size"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Output
    }

    fn output_options(&self) -> Vec<String> {
        vec!["-bufsize:v".to_string(), format!("{}k", self.0)]
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        FrameState {
            video_buffer_size: Some(self.0),
            ..current.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRate(pub String);

impl PipelineStep for FrameRate {
    fn name(&self) -> &'static str {
        "frame-rate"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Output
    }

    fn output_options(&self) -> Vec<String> {
        vec![
            "-r".to_string(),
            self.0.clone(),
            "-vsync".to_string(),
            "cfr".to_string(),
        ]
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        FrameState {
            frame_rate: Some(self.0.clone()),
            ..current.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoTrackTimescale(pub u32);

impl PipelineStep for VideoTrackTimescale {
    fn name(&self) -> &'static str {
        "video-track-timescale"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Output
    }

    fn output_options(&self) -> Vec<String> {
        vec!["-video_track_timescale".to_string(), self.0.to_string()]
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        FrameState {
            video_track_timescale: Some(self.0),
            ..current.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneDetect(pub u32);

impl SceneDetect {
    pub const DISABLED: u32 = 1_000_000_000;
}

impl PipelineStep for SceneDetect {
    fn name(&self) -> &'static str {
        "scene-detect"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Output
    }

    fn output_options(&self) -> Vec<String> {
        vec!["-sc_threshold".to_string(), self.0.to_string()]
    }
}

/// `-pix_fmt`, converted by the engine's implicit software scaler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormatOutput(pub PixelFormat);

impl PipelineStep for PixelFormatOutput {
    fn name(&self) -> &'static str {
        "pixel-format-output"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Output
    }

    fn output_options(&self) -> Vec<String> {
        vec!["-pix_fmt".to_string(), self.0.name().to_string()]
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        FrameState {
            pixel_format: Some(self.0.without_surface()),
            ..current.clone()
        }
    }

    fn check(&self, current: &FrameState) -> Result<(), PipelineError> {
        if current.location == FrameDataLocation::Hardware {
            return Err(PipelineError::missing_precondition(
                self.name(),
                "software frames",
                current.location.to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputTsOffset {
    pub pts_offset: i64,
    pub timescale: u32,
}

impl PipelineStep for OutputTsOffset {
    fn name(&self) -> &'static str {
        "output-ts-offset"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Output
    }

    fn output_options(&self) -> Vec<String> {
        let seconds = self.pts_offset as f64 / f64::from(self.timescale.max(1));
        vec!["-output_ts_offset".to_string(), format_seconds(seconds)]
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        FrameState {
            pts_offset: self.pts_offset,
            ..current.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataOption {
    ServiceProvider(String),
    ServiceName(String),
    AudioLanguage(String),
    SubtitleLanguage(String),
    SubtitleTitle(String),
}

impl PipelineStep for MetadataOption {
    fn name(&self) -> &'static str {
        match self {
            Self::ServiceProvider(_) => "metadata-service-provider",
            Self::ServiceName(_) => "metadata-service-name",
            Self::AudioLanguage(_) => "metadata-audio-language",
            Self::SubtitleLanguage(_) => "metadata-subtitle-language",
            Self::SubtitleTitle(_) => "metadata-subtitle-title",
        }
    }

    fn category(&self) -> StepCategory {
        StepCategory::Output
    }

    fn output_options(&self) -> Vec<String> {
        let (key, value) = match self {
            Self::ServiceProvider(v) => ("-metadata", format!("service_provider=\"{v}\"")),
            Self::ServiceName(v) => ("-metadata", format!("service_name=\"{v}\"")),
            Self::AudioLanguage(v) => ("-metadata:s:a:0", format!("language={v}")),
            Self::SubtitleLanguage(v) => ("-metadata:s:s:0", format!("language={v}")),
            Self::SubtitleTitle(v) => ("-metadata:s:s:0", format!("title=\"{v}\"")),
        };
        vec![key.to_string(), value]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerFormat {
    MpegTs { initial_discontinuity: bool },
    Mp4,
    Mkv,
    Hls {
        frame_rate: Option<String>,
        playlist: PathBuf,
        segment_template: PathBuf,
    },
}

impl PipelineStep for ContainerFormat {
    fn name(&self) -> &'static str {
        match self {
            Self::MpegTs { .. } => "output-format-mpegts",
            Self::Mp4 => "output-format-mp4",
            Self::Mkv => "output-format-mkv",
            Self::Hls { .. } => "output-format-hls",
        }
    }

    fn category(&self) -> StepCategory {
        StepCategory::Output
    }

    fn output_options(&self) -> Vec<String> {
        match self {
            Self::MpegTs {
                initial_discontinuity: true,
            } => args(["-f", "mpegts", "-mpegts_flags", "+initial_discontinuity"]),
            Self::MpegTs {
                initial_discontinuity: false,
            } => args(["-f", "mpegts"]),
            Self::Mp4 => args(["-f", "mp4"]),
            Self::Mkv => args(["-f", "matroska"]),
            Self::Hls {
                frame_rate,
                playlist,
                segment_template,
            } => {
                let rate = frame_rate
                    .as_deref()
                    .and_then(parse_frame_rate)
                    .unwrap_or(24.0);
                let gop = (rate * f64::from(HLS_SEGMENT_SECONDS)).round() as u32;
                vec![
                    "-g".to_string(),
                    gop.to_string(),
                    "-keyint_min".to_string(),
                    gop.to_string(),
                    "-force_key_frames".to_string(),
                    format!("expr:gte(t,n_forced*{HLS_SEGMENT_SECONDS})"),
                    "-f".to_string(),
                    "hls".to_string(),
                    "-hls_time".to_string(),
                    HLS_SEGMENT_SECONDS.to_string(),
                    "-hls_list_size".to_string(),
                    "0".to_string(),
                    "-segment_list_flags".to_string(),
                    "+live".to_string(),
                    "-hls_segment_filename".to_string(),
                    segment_template.to_string_lossy().to_string(),
                    "-hls_flags".to_string(),
                    "program_date_time+append_list+omit_endlist+independent_segments".to_string(),
                    "-mpegts_flags".to_string(),
                    "+initial_discontinuity".to_string(),
                    playlist.to_string_lossy().to_string(),
                ]
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutput(pub PathBuf);

impl PipelineStep for FileOutput {
    fn name(&self) -> &'static str {
        "file-output"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Output
    }

    fn output_options(&self) -> Vec<String> {
        vec![self.0.to_string_lossy().to_string()]
    }
}

/// Simple `-vf` chain for single-input pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimpleVideoFilter(pub Vec<String>);

impl PipelineStep for SimpleVideoFilter {
    fn name(&self) -> &'static str {
        "video-filter"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter_options(&self) -> Vec<String> {
        if self.0.is_empty() {
            return Vec::new();
        }
        vec!["-vf".to_string(), self.0.join(",")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readrate_variants() {
        assert_eq!(
            Readrate::realtime().input_options(InputKind::Video),
            vec!["-readrate", "1.0"]
        );
        let burst = Readrate {
            initial_burst: 180,
            supports_initial_burst: false,
        };
        assert_eq!(burst.input_options(InputKind::Video), vec!["-readrate", "1.05"]);
        let supported = Readrate {
            supports_initial_burst: true,
            ..burst
        };
        assert_eq!(
            supported.input_options(InputKind::Audio),
            vec!["-readrate", "1.0", "-readrate_initial_burst", "180"]
        );
        assert!(!burst.applies_to(InputKind::Watermark));
    }

    #[test]
    fn static_options_pick_their_category() {
        let banner = StaticOption::hide_banner();
        assert_eq!(banner.global_options(), vec!["-hide_banner"]);
        assert!(banner.output_options().is_empty());
        let gop = StaticOption::closed_gop();
        assert!(gop.global_options().is_empty());
        assert_eq!(gop.output_options(), vec!["-flags", "cgop"]);
    }

    #[test]
    fn hls_gop_follows_frame_rate() {
        let hls = ContainerFormat::Hls {
            frame_rate: Some("30000/1001".into()),
            playlist: PathBuf::from("/tmp/live.m3u8"),
            segment_template: PathBuf::from("/tmp/live%06d.ts"),
        };
        let options = hls.output_options();
        assert_eq!(&options[..4], &["-g", "120", "-keyint_min", "120"]);
        assert_eq!(options.last().map(String::as_str), Some("/tmp/live.m3u8"));
    }

    #[test]
    fn ts_offset_is_expressed_in_seconds() {
        let offset = OutputTsOffset {
            pts_offset: 135_000,
            timescale: 90_000,
        };
        assert_eq!(offset.output_options(), vec!["-output_ts_offset", "1.5"]);
    }

    #[test]
    fn pixel_format_output_rejects_hardware_frames() {
        let state = FrameState {
            location: FrameDataLocation::Hardware,
            ..FrameState::default()
        };
        assert!(PixelFormatOutput(PixelFormat::YUV420P).check(&state).is_err());
    }
}
