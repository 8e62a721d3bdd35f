use serde::Serialize;

use crate::error::PipelineError;
use crate::format::{AudioFormat, FrameDataLocation, HardwareAccelerationMode, VideoFormat};
use crate::state::FrameState;
use crate::step::{PipelineStep, StepCategory, args};

/// Where an encoder expects its frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocationRequirement {
    Software,
    Hardware,
    /// Device encoders that import system memory frames on their own.
    Either,
}

impl LocationRequirement {
    pub fn accepts(&self, location: FrameDataLocation) -> bool {
        match self {
            Self::Software => location == FrameDataLocation::Software,
            Self::Hardware => location == FrameDataLocation::Hardware,
            Self::Either => location != FrameDataLocation::Unknown,
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Software => "software frames",
            Self::Hardware => "hardware frames",
            Self::Either => "a known frame location",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoEncoder {
    engine_name: Option<&'static str>,
    mode: HardwareAccelerationMode,
    format: VideoFormat,
    requirement: Option<LocationRequirement>,
}

impl VideoEncoder {
    pub fn software(format: &VideoFormat) -> Option<Self> {
        let (name, format) = match format {
            VideoFormat::Hevc => ("libx265", VideoFormat::Hevc),
            VideoFormat::H264 => ("libx264", VideoFormat::H264),
            VideoFormat::Mpeg2Video => ("mpeg2video", VideoFormat::Mpeg2Video),
            VideoFormat::Av1 => ("libsvtav1", VideoFormat::Av1),
            _ => return None,
        };
        Some(Self {
            engine_name: Some(name),
            mode: HardwareAccelerationMode::None,
            format,
            requirement: Some(LocationRequirement::Software),
        })
    }

    /// Device encoder of `mode` for `format`, when the mode has one.
    pub fn hardware(mode: HardwareAccelerationMode, format: &VideoFormat) -> Option<Self> {
        use HardwareAccelerationMode as Mode;

        let name = match (mode, format) {
            (Mode::Nvenc, VideoFormat::H264) => "h264_nvenc",
            (Mode::Nvenc, VideoFormat::Hevc) => "hevc_nvenc",
            (Mode::Nvenc, VideoFormat::Av1) => "av1_nvenc",
            (Mode::Qsv, VideoFormat::H264) => "h264_qsv",
            (Mode::Qsv, VideoFormat::Hevc) => "hevc_qsv",
            (Mode::Qsv, VideoFormat::Av1) => "av1_qsv",
            (Mode::Vaapi, VideoFormat::H264) => "h264_vaapi",
            (Mode::Vaapi, VideoFormat::Hevc) => "hevc_vaapi",
            (Mode::Vaapi, VideoFormat::Av1) => "av1_vaapi",
            (Mode::VideoToolbox, VideoFormat::H264) => "h264_videotoolbox",
            (Mode::VideoToolbox, VideoFormat::Hevc) => "hevc_videotoolbox",
            (Mode::Amf, VideoFormat::H264) => "h264_amf",
            (Mode::Amf, VideoFormat::Hevc) => "hevc_amf",
            (Mode::Rkmpp, VideoFormat::H264) => "h264_rkmpp",
            (Mode::Rkmpp, VideoFormat::Hevc) => "hevc_rkmpp",
            (Mode::V4l2m2m, VideoFormat::H264) => "h264_v4l2m2m",
            _ => return None,
        };
        let requirement = match mode {
            Mode::Qsv | Mode::Vaapi => LocationRequirement::Hardware,
            Mode::Nvenc | Mode::VideoToolbox | Mode::Rkmpp => LocationRequirement::Either,
            _ => LocationRequirement::Software,
        };
        Some(Self {
            engine_name: Some(name),
            mode,
            format: format.clone(),
            requirement: Some(requirement),
        })
    }

    pub fn copy() -> Self {
        Self {
            engine_name: Some("copy"),
            mode: HardwareAccelerationMode::None,
            format: VideoFormat::Copy,
            requirement: None,
        }
    }

    pub fn implicit() -> Self {
        Self {
            engine_name: None,
            mode: HardwareAccelerationMode::None,
            format: VideoFormat::Undetermined,
            requirement: None,
        }
    }

    pub fn engine_name(&self) -> Option<&'static str> {
        self.engine_name
    }

    pub fn mode(&self) -> HardwareAccelerationMode {
        self.mode
    }

    pub fn format(&self) -> &VideoFormat {
        &self.format
    }

    pub fn requirement(&self) -> Option<LocationRequirement> {
        self.requirement
    }

    pub fn label(&self) -> &'static str {
        self.engine_name.unwrap_or("implicit")
    }
}

impl PipelineStep for VideoEncoder {
    fn name(&self) -> &'static str {
        match (self.engine_name, self.mode) {
            (Some("copy"), _) => "encoder-copy-video",
            (None, _) => "encoder-implicit-video",
            (Some(_), HardwareAccelerationMode::None) => "encoder-software",
            (Some(_), _) => "encoder-hardware",
        }
    }

    fn category(&self) -> StepCategory {
        StepCategory::Encoder
    }

    fn output_options(&self) -> Vec<String> {
        let Some(name) = self.engine_name else {
            return Vec::new();
        };
        let mut options = vec!["-c:v".to_string(), name.to_string()];
        match name {
            "libx265" => options.extend(args([
                "-tag:v",
                "hvc1",
                "-x265-params",
                "log-level=error",
            ])),
            "h264_qsv" | "hevc_qsv" => {
                if name == "hevc_qsv" {
                    options.extend(args(["-tag:v", "hvc1"]));
                }
                options.extend(args(["-low_power", "0", "-look_ahead", "0"]));
            }
            _ if self.format == VideoFormat::Hevc => options.extend(args(["-tag:v", "hvc1"])),
            _ => {}
        }
        options
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        let location = match self.requirement {
            Some(LocationRequirement::Software) => FrameDataLocation::Software,
            Some(LocationRequirement::Hardware) => FrameDataLocation::Hardware,
            Some(LocationRequirement::Either) | None => current.location,
        };
        let video_format = match self.format {
            VideoFormat::Undetermined => current.video_format.clone(),
            ref format => format.clone(),
        };
        FrameState {
            location,
            video_format,
            hardware_acceleration_mode: if self.mode.is_hardware() {
                self.mode
            } else {
                current.hardware_acceleration_mode
            },
            ..current.clone()
        }
    }

    fn check(&self, current: &FrameState) -> Result<(), PipelineError> {
        match self.requirement {
            Some(requirement) if !requirement.accepts(current.location) => {
                Err(PipelineError::missing_precondition(
                    self.label(),
                    requirement.describe(),
                    current.location.to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioEncoder(pub AudioFormat);

impl PipelineStep for AudioEncoder {
    fn name(&self) -> &'static str {
        match self.0 {
            AudioFormat::Aac => "encoder-aac",
            AudioFormat::Ac3 => "encoder-ac3",
            AudioFormat::Copy => "encoder-copy-audio",
        }
    }

    fn category(&self) -> StepCategory {
        StepCategory::Encoder
    }

    fn output_options(&self) -> Vec<String> {
        vec!["-c:a".to_string(), self.0.as_str().to_string()]
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        FrameState {
            audio_format: Some(self.0),
            ..current.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn libx265_tags_output_for_players() {
        let encoder = VideoEncoder::software(&VideoFormat::Hevc).unwrap();
        assert_eq!(
            encoder.output_options(),
            vec![
                "-c:v",
                "libx265",
                "-tag:v",
                "hvc1",
                "-x265-params",
                "log-level=error"
            ]
        );
    }

    #[test]
    fn qsv_encoders_require_hardware_frames() {
        let encoder = VideoEncoder::hardware(HardwareAccelerationMode::Qsv, &VideoFormat::H264)
            .unwrap();
        let software = FrameState {
            location: FrameDataLocation::Software,
            ..FrameState::default()
        };
        assert!(matches!(
            encoder.check(&software),
            Err(PipelineError::MissingPrecondition { .. })
        ));
    }

    #[test]
    fn nvenc_keeps_the_frame_location() {
        let encoder = VideoEncoder::hardware(HardwareAccelerationMode::Nvenc, &VideoFormat::H264)
            .unwrap();
        let hardware = FrameState {
            location: FrameDataLocation::Hardware,
            ..FrameState::default()
        };
        assert!(encoder.check(&hardware).is_ok());
        assert_eq!(
            encoder.next_state(&hardware).location,
            FrameDataLocation::Hardware
        );
        assert!(encoder.check(&FrameState::default()).is_err());
    }

    #[test]
    fn copy_has_no_location_requirement() {
        assert!(VideoEncoder::copy().check(&FrameState::default()).is_ok());
        assert_eq!(VideoEncoder::copy().output_options(), vec!["-c:v", "copy"]);
        assert!(VideoEncoder::implicit().output_options().is_empty());
    }
}
