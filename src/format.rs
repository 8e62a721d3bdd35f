//! Codec, pixel format and hardware identities shared by every step.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Where frame data currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameDataLocation {
    #[default]
    Unknown,
    Software,
    Hardware,
}

impl fmt::Display for FrameDataLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unknown => "unknown",
            Self::Software => "software",
            Self::Hardware => "hardware",
        };
        f.write_str(label)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Default,
    Serialize,
    Deserialize,
    ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[value(rename_all = "lowercase")]
pub enum HardwareAccelerationMode {
    #[default]
    None,
    Nvenc,
    Qsv,
    Vaapi,
    VideoToolbox,
    Amf,
    Rkmpp,
    V4l2m2m,
}

impl HardwareAccelerationMode {
    pub const ALL: [HardwareAccelerationMode; 8] = [
        Self::None,
        Self::Nvenc,
        Self::Qsv,
        Self::Vaapi,
        Self::VideoToolbox,
        Self::Amf,
        Self::Rkmpp,
        Self::V4l2m2m,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Nvenc => "nvenc",
            Self::Qsv => "qsv",
            Self::Vaapi => "vaapi",
            Self::VideoToolbox => "videotoolbox",
            Self::Amf => "amf",
            Self::Rkmpp => "rkmpp",
            Self::V4l2m2m => "v4l2m2m",
        }
    }

    pub fn is_hardware(&self) -> bool {
        *self != Self::None
    }
}

impl fmt::Display for HardwareAccelerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Video codec identity.
///
/// `Other` keeps probed codec names that no rule knows about so that
/// selection can reject them by name instead of guessing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VideoFormat {
    H264,
    Hevc,
    Mpeg1Video,
    Mpeg2Video,
    Vc1,
    MsMpeg4V2,
    MsMpeg4V3,
    Mpeg4,
    Vp9,
    Av1,
    #[default]
    Undetermined,
    Copy,
    GeneratedImage,
    Other(String),
}

impl VideoFormat {
    /// Every codec with a software decoder.
    pub const DECODABLE: [VideoFormat; 10] = [
        Self::H264,
        Self::Hevc,
        Self::Mpeg1Video,
        Self::Mpeg2Video,
        Self::Vc1,
        Self::MsMpeg4V2,
        Self::MsMpeg4V3,
        Self::Mpeg4,
        Self::Vp9,
        Self::Av1,
    ];

    pub fn name(&self) -> &str {
        match self {
            Self::H264 => "h264",
            Self::Hevc => "hevc",
            Self::Mpeg1Video => "mpeg1video",
            Self::Mpeg2Video => "mpeg2video",
            Self::Vc1 => "vc1",
            Self::MsMpeg4V2 => "msmpeg4v2",
            Self::MsMpeg4V3 => "msmpeg4v3",
            Self::Mpeg4 => "mpeg4",
            Self::Vp9 => "vp9",
            Self::Av1 => "av1",
            Self::Undetermined => "undetermined",
            Self::Copy => "copy",
            Self::GeneratedImage => "generated-image",
            Self::Other(name) => name,
        }
    }

    pub fn parse(value: &str) -> Self {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "h264" | "avc" => Self::H264,
            "hevc" | "h265" => Self::Hevc,
            "mpeg1video" => Self::Mpeg1Video,
            "mpeg2video" | "mpeg2" => Self::Mpeg2Video,
            "vc1" => Self::Vc1,
            "msmpeg4v2" => Self::MsMpeg4V2,
            "msmpeg4v3" => Self::MsMpeg4V3,
            "mpeg4" => Self::Mpeg4,
            "vp9" => Self::Vp9,
            "av1" => Self::Av1,
            "" | "undetermined" => Self::Undetermined,
            "copy" => Self::Copy,
            "generated-image" | "generated_image" => Self::GeneratedImage,
            _ => Self::Other(normalized),
        }
    }
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<String> for VideoFormat {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<VideoFormat> for String {
    fn from(value: VideoFormat) -> Self {
        value.name().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Aac,
    Ac3,
    Copy,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aac => "aac",
            Self::Ac3 => "ac3",
            Self::Copy => "copy",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormatName {
    Yuv420p,
    Yuvj420p,
    Yuv420p10le,
    Yuv444p,
    Yuv444p10le,
    Yuv420p12le,
    Yuv444p12le,
    Yuva420p,
    Rgba,
    /// A probed format no rule knows, kept with its bit depth.
    Unknown(u8),
}

impl PixelFormatName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Yuv420p => "yuv420p",
            Self::Yuvj420p => "yuvj420p",
            Self::Yuv420p10le => "yuv420p10le",
            Self::Yuv444p => "yuv444p",
            Self::Yuv444p10le => "yuv444p10le",
            Self::Yuv420p12le => "yuv420p12le",
            Self::Yuv444p12le => "yuv444p12le",
            Self::Yuva420p => "yuva420p",
            Self::Rgba => "rgba",
            Self::Unknown(_) => "unknown",
        }
    }

    pub const fn bit_depth(&self) -> u8 {
        match self {
            Self::Yuv420p10le | Self::Yuv444p10le => 10,
            Self::Yuv420p12le | Self::Yuv444p12le => 12,
            Self::Unknown(depth) => *depth,
            _ => 8,
        }
    }

    /// Bit depth read from the trailing digits of an engine format name:
    /// `gbrp12le` is 12-bit, `rgb48be` 16-bit, `yuv410p` 8-bit.
    fn guess_bit_depth(name: &str) -> u8 {
        let stem = name
            .strip_suffix("le")
            .or_else(|| name.strip_suffix("be"))
            .unwrap_or(name);
        let digits = stem.len() - stem.trim_end_matches(|c: char| c.is_ascii_digit()).len();
        match stem[stem.len() - digits..].parse::<u32>() {
            Ok(depth @ 9..=16) => depth as u8,
            Ok(48 | 64) => 16,
            _ => 8,
        }
    }
}

/// Layout a hardware decoder or upload uses for a logical pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HardwareSurface {
    Nv12,
    P010,
}

impl HardwareSurface {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nv12 => "nv12",
            Self::P010 => "p010le",
        }
    }
}

/// A named pixel format with its bit depth and hardware-name mapping.
///
/// `name()` is always the logical software name (`yuv420p10le`), while
/// `ffmpeg_name()` is what the engine sees, which differs once the frame
/// has been mapped onto a hardware surface (`p010le`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PixelFormat {
    name: PixelFormatName,
    surface: Option<HardwareSurface>,
}

impl PixelFormat {
    pub const YUV420P: PixelFormat = PixelFormat::software(PixelFormatName::Yuv420p);
    pub const YUVJ420P: PixelFormat = PixelFormat::software(PixelFormatName::Yuvj420p);
    pub const YUV420P10LE: PixelFormat = PixelFormat::software(PixelFormatName::Yuv420p10le);
    pub const YUV444P: PixelFormat = PixelFormat::software(PixelFormatName::Yuv444p);
    pub const YUV444P10LE: PixelFormat = PixelFormat::software(PixelFormatName::Yuv444p10le);
    pub const YUV420P12LE: PixelFormat = PixelFormat::software(PixelFormatName::Yuv420p12le);
    pub const YUV444P12LE: PixelFormat = PixelFormat::software(PixelFormatName::Yuv444p12le);
    pub const YUVA420P: PixelFormat = PixelFormat::software(PixelFormatName::Yuva420p);
    pub const RGBA: PixelFormat = PixelFormat::software(PixelFormatName::Rgba);
    pub const NV12: PixelFormat = PixelFormat::YUV420P.on_hardware();
    pub const P010LE: PixelFormat = PixelFormat::YUV420P10LE.on_hardware();

    pub const fn software(name: PixelFormatName) -> Self {
        Self {
            name,
            surface: None,
        }
    }

    /// Same logical format mapped onto the hardware layout for its depth.
    pub const fn on_hardware(self) -> Self {
        let surface = if self.name.bit_depth() > 8 {
            HardwareSurface::P010
        } else {
            HardwareSurface::Nv12
        };
        Self {
            name: self.name,
            surface: Some(surface),
        }
    }

    pub fn without_surface(self) -> Self {
        Self::software(self.name)
    }

    pub fn name(&self) -> &'static str {
        self.name.as_str()
    }

    pub fn ffmpeg_name(&self) -> &'static str {
        match self.surface {
            Some(surface) => surface.as_str(),
            None => self.name.as_str(),
        }
    }

    pub fn bit_depth(&self) -> u8 {
        self.name.bit_depth()
    }

    pub fn surface(&self) -> Option<HardwareSurface> {
        self.surface
    }

    /// False for probed formats outside the named set; those are never
    /// handed to the engine as a conversion target.
    pub fn is_known(&self) -> bool {
        !matches!(self.name, PixelFormatName::Unknown(_))
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

impl FromStr for PixelFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let format = match value.trim().to_lowercase().as_str() {
            "yuv420p" => Self::YUV420P,
            "yuvj420p" => Self::YUVJ420P,
            "yuv420p10le" => Self::YUV420P10LE,
            "yuv444p" => Self::YUV444P,
            "yuv444p10le" => Self::YUV444P10LE,
            "yuv420p12le" => Self::YUV420P12LE,
            "yuv444p12le" => Self::YUV444P12LE,
            "yuva420p" => Self::YUVA420P,
            "rgba" => Self::RGBA,
            "nv12" => Self::NV12,
            "p010le" | "p010" => Self::P010LE,
            "" => return Err("empty pixel format".to_string()),
            other => Self::software(PixelFormatName::Unknown(PixelFormatName::guess_bit_depth(
                other,
            ))),
        };
        Ok(format)
    }
}

impl TryFrom<String> for PixelFormat {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<PixelFormat> for String {
    fn from(value: PixelFormat) -> Self {
        value.ffmpeg_name().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Largest even-sized rectangle with this aspect ratio that fits `target`.
    pub fn fit_within(&self, target: FrameSize) -> FrameSize {
        if self.width == 0 || self.height == 0 {
            return target;
        }
        let scale = f64::min(
            f64::from(target.width) / f64::from(self.width),
            f64::from(target.height) / f64::from(self.height),
        );
        let even = |value: f64, limit: u32| -> u32 {
            let rounded = (value.round() as u32).min(limit);
            rounded - rounded % 2
        };
        FrameSize::new(
            even(f64::from(self.width) * scale, target.width),
            even(f64::from(self.height) * scale, target.height),
        )
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Parses `30`, `29.97` or `30000/1001`.
pub fn parse_frame_rate(value: &str) -> Option<f64> {
    let value = value.trim();
    let rate = match value.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => value.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

/// `HH:MM:SS` with a seven digit fraction when the duration is not whole.
pub fn format_timestamp(duration: Duration) -> String {
    let total = duration.as_secs();
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    let ticks = duration.subsec_nanos() / 100;
    if ticks == 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{seconds:02}.{ticks:07}")
    }
}

/// Seconds with at most three decimals and no trailing zeros.
pub fn format_seconds(seconds: f64) -> String {
    let rendered = format!("{seconds:.3}");
    let trimmed = rendered.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_surface_keeps_logical_name() {
        let p010 = PixelFormat::YUV420P10LE.on_hardware();
        assert_eq!(p010.name(), "yuv420p10le");
        assert_eq!(p010.ffmpeg_name(), "p010le");
        assert_eq!(p010.bit_depth(), 10);
        assert_eq!(PixelFormat::YUV420P.on_hardware().ffmpeg_name(), "nv12");
        assert_eq!(p010.without_surface(), PixelFormat::YUV420P10LE);
    }

    #[test]
    fn parses_pixel_formats() {
        assert_eq!("nv12".parse::<PixelFormat>(), Ok(PixelFormat::NV12));
        assert_eq!("YUV420P".parse::<PixelFormat>(), Ok(PixelFormat::YUV420P));
        assert!("".parse::<PixelFormat>().is_err());
    }

    #[test]
    fn twelve_bit_and_unknown_formats_keep_their_depth() {
        let twelve: PixelFormat = "yuv420p12le".parse().unwrap();
        assert_eq!(twelve, PixelFormat::YUV420P12LE);
        assert_eq!(twelve.bit_depth(), 12);
        assert_eq!(PixelFormat::YUV444P12LE.name(), "yuv444p12le");

        let gbrp: PixelFormat = "gbrp12le".parse().unwrap();
        assert!(!gbrp.is_known());
        assert_eq!(gbrp.bit_depth(), 12);
        assert_eq!("rgb48be".parse::<PixelFormat>().unwrap().bit_depth(), 16);
        assert_eq!("yuv410p".parse::<PixelFormat>().unwrap().bit_depth(), 8);
        assert_eq!("p010".parse::<PixelFormat>(), Ok(PixelFormat::P010LE));
    }

    #[test]
    fn unknown_codecs_are_kept_by_name() {
        assert_eq!(VideoFormat::parse("h265"), VideoFormat::Hevc);
        assert_eq!(
            VideoFormat::parse("ProRes"),
            VideoFormat::Other("prores".into())
        );
        assert_eq!(VideoFormat::parse(""), VideoFormat::Undetermined);
    }

    #[test]
    fn timestamps_match_engine_syntax() {
        assert_eq!(format_timestamp(Duration::from_secs(1)), "00:00:01");
        assert_eq!(
            format_timestamp(Duration::from_millis(873_619)),
            "00:14:33.6190000"
        );
        assert_eq!(format_seconds(125.5), "125.5");
        assert_eq!(format_seconds(60.0), "60");
    }

    #[test]
    fn fit_within_letterboxes() {
        let source = FrameSize::new(1920, 800);
        assert_eq!(
            source.fit_within(FrameSize::new(1280, 720)),
            FrameSize::new(1280, 532)
        );
        assert_eq!(
            FrameSize::new(640, 480).fit_within(FrameSize::new(1920, 1080)),
            FrameSize::new(1440, 1080)
        );
    }

    #[test]
    fn frame_rates() {
        let ntsc = parse_frame_rate("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("1/0"), None);
    }
}
