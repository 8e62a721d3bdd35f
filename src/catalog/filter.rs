//! Video filters with their software and device variants.

use std::path::PathBuf;

use serde::Serialize;

use crate::error::PipelineError;
use crate::format::{FrameDataLocation, FrameSize, HardwareAccelerationMode, PixelFormat};
use crate::state::FrameState;
use crate::step::{PipelineStep, StepCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterBackend {
    Software,
    Cuda,
    Qsv,
    Vaapi,
}

/// Operations a filter backend may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterOp {
    Deinterlace,
    Scale,
    Pad,
    PixelFormat,
    Overlay,
    Subtitles,
}

impl FilterOp {
    pub const ALL: [FilterOp; 6] = [
        Self::Deinterlace,
        Self::Scale,
        Self::Pad,
        Self::PixelFormat,
        Self::Overlay,
        Self::Subtitles,
    ];
}

impl FilterBackend {
    pub const ALL: [FilterBackend; 4] = [Self::Software, Self::Cuda, Self::Qsv, Self::Vaapi];

    pub fn for_mode(mode: HardwareAccelerationMode) -> Option<Self> {
        match mode {
            HardwareAccelerationMode::Nvenc => Some(Self::Cuda),
            HardwareAccelerationMode::Qsv => Some(Self::Qsv),
            HardwareAccelerationMode::Vaapi => Some(Self::Vaapi),
            _ => None,
        }
    }

    pub fn supports(&self, op: FilterOp) -> bool {
        match self {
            Self::Software => true,
            Self::Cuda | Self::Qsv => matches!(
                op,
                FilterOp::Deinterlace | FilterOp::Scale | FilterOp::Overlay | FilterOp::PixelFormat
            ),
            Self::Vaapi => matches!(
                op,
                FilterOp::Deinterlace | FilterOp::Scale | FilterOp::PixelFormat
            ),
        }
    }

    pub fn is_hardware(&self) -> bool {
        *self != Self::Software
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Software => "software",
            Self::Cuda => "cuda",
            Self::Qsv => "qsv",
            Self::Vaapi => "vaapi",
        }
    }

    /// Location a filter of this backend consumes.
    pub(crate) fn check(&self, step: &str, current: &FrameState) -> Result<(), PipelineError> {
        let ok = if self.is_hardware() {
            current.location == FrameDataLocation::Hardware
        } else {
            current.location != FrameDataLocation::Hardware
        };
        if ok {
            Ok(())
        } else {
            let expected = if self.is_hardware() {
                "hardware frames"
            } else {
                "software frames"
            };
            Err(PipelineError::missing_precondition(
                step,
                expected,
                current.location.to_string(),
            ))
        }
    }

    fn pixel_format(&self, format: PixelFormat) -> PixelFormat {
        if self.is_hardware() {
            format.on_hardware()
        } else {
            format
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleFilter {
    pub backend: FilterBackend,
    pub size: FrameSize,
    /// Conversion folded into the scaler.
    pub format: Option<PixelFormat>,
}

impl PipelineStep for ScaleFilter {
    fn name(&self) -> &'static str {
        match self.backend {
            FilterBackend::Software => "scale",
            FilterBackend::Cuda => "scale-cuda",
            FilterBackend::Qsv => "scale-qsv",
            FilterBackend::Vaapi => "scale-vaapi",
        }
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter(&self) -> Option<String> {
        let FrameSize { width, height } = self.size;
        let format = self.format.map(|pf| self.backend.pixel_format(pf).ffmpeg_name());
        let filter = match self.backend {
            FilterBackend::Software => {
                let mut filter = format!("scale={width}:{height}:flags=fast_bilinear,setsar=1");
                if let Some(format) = format {
                    filter.push_str(&format!(",format={format}"));
                }
                filter
            }
            FilterBackend::Cuda => hardware_scale("scale_cuda", &format!("{width}:{height}"), format),
            FilterBackend::Qsv => {
                hardware_scale("vpp_qsv", &format!("w={width}:h={height}"), format)
            }
            FilterBackend::Vaapi => {
                hardware_scale("scale_vaapi", &format!("w={width}:h={height}"), format)
            }
        };
        Some(filter)
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        FrameState {
            scaled_size: self.size,
            padded_size: self.size,
            pixel_format: self
                .format
                .map(|pf| self.backend.pixel_format(pf))
                .or(current.pixel_format),
            ..current.clone()
        }
    }

    fn check(&self, current: &FrameState) -> Result<(), PipelineError> {
        self.backend.check(self.name(), current)
    }
}

fn hardware_scale(filter: &str, size: &str, format: Option<&str>) -> String {
    match format {
        Some(format) => format!("{filter}={size}:format={format}"),
        None => format!("{filter}={size}"),
    }
}

/// Letterbox onto the output canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PadFilter {
    pub size: FrameSize,
}

impl PipelineStep for PadFilter {
    fn name(&self) -> &'static str {
        "pad"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter(&self) -> Option<String> {
        Some(format!(
            "pad={}:{}:-1:-1:color=black",
            self.size.width, self.size.height
        ))
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        FrameState {
            padded_size: self.size,
            ..current.clone()
        }
    }

    fn check(&self, current: &FrameState) -> Result<(), PipelineError> {
        FilterBackend::Software.check(self.name(), current)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeinterlaceFilter {
    pub backend: FilterBackend,
}

impl PipelineStep for DeinterlaceFilter {
    fn name(&self) -> &'static str {
        match self.backend {
            FilterBackend::Software => "deinterlace",
            FilterBackend::Cuda => "deinterlace-cuda",
            FilterBackend::Qsv => "deinterlace-qsv",
            FilterBackend::Vaapi => "deinterlace-vaapi",
        }
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter(&self) -> Option<String> {
        let filter = match self.backend {
            FilterBackend::Software => "yadif=1",
            FilterBackend::Cuda => "yadif_cuda",
            FilterBackend::Qsv => "deinterlace_qsv",
            FilterBackend::Vaapi => "deinterlace_vaapi",
        };
        Some(filter.to_string())
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        FrameState {
            deinterlaced: true,
            ..current.clone()
        }
    }

    fn check(&self, current: &FrameState) -> Result<(), PipelineError> {
        self.backend.check(self.name(), current)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormatFilter {
    pub backend: FilterBackend,
    pub format: PixelFormat,
}

impl PixelFormatFilter {
    pub fn software(format: PixelFormat) -> Self {
        Self {
            backend: FilterBackend::Software,
            format,
        }
    }
}

impl PipelineStep for PixelFormatFilter {
    fn name(&self) -> &'static str {
        match self.backend {
            FilterBackend::Software => "pixel-format",
            FilterBackend::Cuda => "pixel-format-cuda",
            FilterBackend::Qsv => "pixel-format-qsv",
            FilterBackend::Vaapi => "pixel-format-vaapi",
        }
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter(&self) -> Option<String> {
        let target = self.backend.pixel_format(self.format).ffmpeg_name();
        let filter = match self.backend {
            FilterBackend::Software => format!("format={target}"),
            FilterBackend::Cuda => format!("scale_cuda=format={target}"),
            FilterBackend::Qsv => format!("vpp_qsv=format={target}"),
            FilterBackend::Vaapi => format!("scale_vaapi=format={target}"),
        };
        Some(filter)
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        FrameState {
            pixel_format: Some(self.backend.pixel_format(self.format)),
            ..current.clone()
        }
    }

    fn check(&self, current: &FrameState) -> Result<(), PipelineError> {
        self.backend.check(self.name(), current)
    }
}

/// Copies device frames back to system memory in their surface layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareDownload {
    pub format: Option<PixelFormat>,
}

impl HardwareDownload {
    pub fn from_state(current: &FrameState) -> Self {
        Self {
            format: current.pixel_format,
        }
    }
}

impl PipelineStep for HardwareDownload {
    fn name(&self) -> &'static str {
        "hardware-download"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter(&self) -> Option<String> {
        let format = self
            .format
            .map(|pf| pf.on_hardware().ffmpeg_name())
            .unwrap_or("nv12");
        Some(format!("hwdownload,format={format}"))
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        FrameState {
            location: FrameDataLocation::Software,
            pixel_format: self.format.map(|pf| pf.on_hardware()),
            ..current.clone()
        }
    }

    fn check(&self, current: &FrameState) -> Result<(), PipelineError> {
        if current.location == FrameDataLocation::Hardware {
            Ok(())
        } else {
            Err(PipelineError::missing_precondition(
                self.name(),
                "hardware frames",
                current.location.to_string(),
            ))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HardwareUpload {
    mode: HardwareAccelerationMode,
    format: Option<PixelFormat>,
}

impl HardwareUpload {
    pub fn for_mode(mode: HardwareAccelerationMode) -> Result<Self, PipelineError> {
        match mode {
            HardwareAccelerationMode::Nvenc
            | HardwareAccelerationMode::Qsv
            | HardwareAccelerationMode::Vaapi => Ok(Self { mode, format: None }),
            other => Err(PipelineError::CapabilityGap {
                mode: other,
                detail: "no upload filter for this mode".to_string(),
            }),
        }
    }

    /// Format of the uploaded frames, which picks the VAAPI surface layout.
    pub fn with_format(self, format: Option<PixelFormat>) -> Self {
        Self { format, ..self }
    }

    pub fn mode(&self) -> HardwareAccelerationMode {
        self.mode
    }
}

impl PipelineStep for HardwareUpload {
    fn name(&self) -> &'static str {
        match self.mode {
            HardwareAccelerationMode::Nvenc => "hardware-upload-cuda",
            HardwareAccelerationMode::Qsv => "hardware-upload-qsv",
            _ => "hardware-upload-vaapi",
        }
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter(&self) -> Option<String> {
        let filter = match self.mode {
            HardwareAccelerationMode::Nvenc => "hwupload_cuda".to_string(),
            HardwareAccelerationMode::Qsv => "hwupload=extra_hw_frames=64".to_string(),
            _ => {
                let surface = self
                    .format
                    .map(|pf| pf.on_hardware().ffmpeg_name())
                    .unwrap_or("nv12");
                format!("format={surface}|vaapi,hwupload")
            }
        };
        Some(filter)
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        FrameState {
            location: FrameDataLocation::Hardware,
            pixel_format: current.pixel_format.map(|pf| pf.on_hardware()),
            hardware_acceleration_mode: self.mode,
            ..current.clone()
        }
    }

    fn check(&self, current: &FrameState) -> Result<(), PipelineError> {
        if current.location == FrameDataLocation::Hardware {
            Err(PipelineError::missing_precondition(
                self.name(),
                "software frames",
                current.location.to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

/// Burns text subtitles (srt, ass) into the picture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubtitlesFilter {
    pub path: PathBuf,
    pub stream_index: Option<usize>,
    pub fonts_dir: Option<PathBuf>,
}

impl PipelineStep for SubtitlesFilter {
    fn name(&self) -> &'static str {
        "subtitles"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter(&self) -> Option<String> {
        let mut filter = format!(
            "subtitles='{}'",
            escape_filter_path(&self.path.to_string_lossy())
        );
        if let Some(index) = self.stream_index {
            filter.push_str(&format!(":si={index}"));
        }
        if let Some(fonts) = &self.fonts_dir {
            filter.push_str(&format!(
                ":fontsdir='{}'",
                escape_filter_path(&fonts.to_string_lossy())
            ));
        }
        Some(filter)
    }

    fn check(&self, current: &FrameState) -> Result<(), PipelineError> {
        FilterBackend::Software.check(self.name(), current)
    }
}

/// Paths inside a filter graph need `\`, `'` and `:` escaped.
pub fn escape_filter_path(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for ch in path.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\\\\\"),
            '\'' => escaped.push_str("\\\\\\'"),
            ':' => escaped.push_str("\\\\:"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Image scale used for image subtitles and stills. Missing dimensions
/// keep the aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageScaleFilter {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ImageScaleFilter {
    pub fn to_size(size: FrameSize) -> Self {
        Self {
            width: Some(size.width),
            height: Some(size.height),
        }
    }
}

impl PipelineStep for ImageScaleFilter {
    fn name(&self) -> &'static str {
        "image-scale"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter(&self) -> Option<String> {
        let dimension = |value: Option<u32>| value.map_or_else(|| "-1".to_string(), |v| v.to_string());
        Some(format!(
            "scale={}:{}:force_original_aspect_ratio=decrease",
            dimension(self.width),
            dimension(self.height)
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hardware_state(pf: PixelFormat) -> FrameState {
        FrameState {
            location: FrameDataLocation::Hardware,
            pixel_format: Some(pf.on_hardware()),
            ..FrameState::default()
        }
    }

    #[test]
    fn vaapi_has_no_overlay() {
        assert!(!FilterBackend::Vaapi.supports(FilterOp::Overlay));
        assert!(FilterBackend::Cuda.supports(FilterOp::Overlay));
        assert!(!FilterBackend::Qsv.supports(FilterOp::Pad));
        assert_eq!(
            FilterBackend::for_mode(HardwareAccelerationMode::VideoToolbox),
            None
        );
    }

    #[test]
    fn download_keeps_surface_layout() {
        let state = hardware_state(PixelFormat::YUV420P10LE);
        let download = HardwareDownload::from_state(&state);
        assert_eq!(download.filter().unwrap(), "hwdownload,format=p010le");
        let next = download.next_state(&state);
        assert_eq!(next.location, FrameDataLocation::Software);
        assert_eq!(next.pixel_format, Some(PixelFormat::P010LE));
    }

    #[test]
    fn hardware_scale_with_format() {
        let scale = ScaleFilter {
            backend: FilterBackend::Cuda,
            size: FrameSize::new(1280, 720),
            format: Some(PixelFormat::YUV420P),
        };
        assert_eq!(scale.filter().unwrap(), "scale_cuda=1280:720:format=nv12");
        let qsv = ScaleFilter {
            backend: FilterBackend::Qsv,
            size: FrameSize::new(1280, 720),
            format: None,
        };
        assert_eq!(qsv.filter().unwrap(), "vpp_qsv=w=1280:h=720");
        assert!(qsv.check(&FrameState::default()).is_err());
    }

    #[test]
    fn uploads_per_mode() {
        let filters: Vec<_> = [
            HardwareAccelerationMode::Nvenc,
            HardwareAccelerationMode::Qsv,
            HardwareAccelerationMode::Vaapi,
        ]
        .into_iter()
        .map(|mode| HardwareUpload::for_mode(mode).unwrap().filter().unwrap())
        .collect();
        assert_eq!(
            filters,
            vec![
                "hwupload_cuda",
                "hwupload=extra_hw_frames=64",
                "format=nv12|vaapi,hwupload"
            ]
        );
        assert!(HardwareUpload::for_mode(HardwareAccelerationMode::Amf).is_err());
        let ten_bit = HardwareUpload::for_mode(HardwareAccelerationMode::Vaapi)
            .unwrap()
            .with_format(Some(PixelFormat::YUV420P10LE));
        assert_eq!(ten_bit.filter().unwrap(), "format=p010le|vaapi,hwupload");
    }

    #[test]
    fn pad_requires_software_frames() {
        let pad = PadFilter {
            size: FrameSize::new(1920, 1080),
        };
        assert_eq!(pad.filter().unwrap(), "pad=1920:1080:-1:-1:color=black");
        assert!(pad.check(&hardware_state(PixelFormat::YUV420P)).is_err());
    }

    #[test]
    fn image_scale_keeps_aspect_for_missing_dimension() {
        let scale = ImageScaleFilter {
            width: None,
            height: Some(200),
        };
        assert_eq!(
            scale.filter().unwrap(),
            "scale=-1:200:force_original_aspect_ratio=decrease"
        );
    }

    #[test]
    fn subtitle_paths_are_escaped() {
        let filter = SubtitlesFilter {
            path: PathBuf::from("/media/it's.srt"),
            stream_index: None,
            fonts_dir: None,
        };
        assert_eq!(filter.filter().unwrap(), "subtitles='/media/it\\\\\\'s.srt'");
    }
}
