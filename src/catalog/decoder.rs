use serde::Serialize;

use crate::format::{FrameDataLocation, HardwareAccelerationMode, VideoFormat};
use crate::state::FrameState;
use crate::step::{InputKind, PipelineStep, StepCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecoderFamily {
    Software,
    Cuvid,
    Qsv,
    Rkmpp,
    V4l2m2m,
    /// No `-c:v`; the engine picks, optionally through `-hwaccel`.
    Implicit,
}

/// Video decoder attached to the main video input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoder {
    family: DecoderFamily,
    mode: HardwareAccelerationMode,
    engine_name: Option<&'static str>,
    output: FrameDataLocation,
}

impl Decoder {
    pub fn software(format: &VideoFormat) -> Option<Self> {
        let name = match format {
            VideoFormat::Hevc => "hevc",
            VideoFormat::H264 => "h264",
            VideoFormat::Mpeg1Video => "mpeg1video",
            VideoFormat::Mpeg2Video => "mpeg2video",
            VideoFormat::Vc1 => "vc1",
            VideoFormat::MsMpeg4V2 => "msmpeg4v2",
            VideoFormat::MsMpeg4V3 => "msmpeg4v3",
            VideoFormat::Mpeg4 => "mpeg4",
            VideoFormat::Vp9 => "vp9",
            VideoFormat::Av1 => "libdav1d",
            _ => return None,
        };
        Some(Self {
            family: DecoderFamily::Software,
            mode: HardwareAccelerationMode::None,
            engine_name: Some(name),
            output: FrameDataLocation::Software,
        })
    }

    pub fn cuvid(format: &VideoFormat) -> Option<Self> {
        let name = match format {
            VideoFormat::Hevc => "hevc_cuvid",
            VideoFormat::H264 => "h264_cuvid",
            VideoFormat::Mpeg2Video => "mpeg2_cuvid",
            VideoFormat::Vc1 => "vc1_cuvid",
            VideoFormat::Vp9 => "vp9_cuvid",
            VideoFormat::Mpeg4 => "mpeg4_cuvid",
            VideoFormat::Av1 => "av1_cuvid",
            _ => return None,
        };
        Some(Self::hardware(
            DecoderFamily::Cuvid,
            HardwareAccelerationMode::Nvenc,
            name,
        ))
    }

    pub fn qsv(format: &VideoFormat) -> Option<Self> {
        let name = match format {
            VideoFormat::Hevc => "hevc_qsv",
            VideoFormat::H264 => "h264_qsv",
            VideoFormat::Mpeg2Video => "mpeg2_qsv",
            VideoFormat::Vc1 => "vc1_qsv",
            VideoFormat::Vp9 => "vp9_qsv",
            VideoFormat::Av1 => "av1_qsv",
            _ => return None,
        };
        Some(Self::hardware(
            DecoderFamily::Qsv,
            HardwareAccelerationMode::Qsv,
            name,
        ))
    }

    pub fn rkmpp(format: &VideoFormat) -> Option<Self> {
        let name = match format {
            VideoFormat::H264 => "h264_rkmpp",
            VideoFormat::Hevc => "hevc_rkmpp",
            VideoFormat::Vp9 => "vp9_rkmpp",
            VideoFormat::Mpeg2Video => "mpeg2_rkmpp",
            VideoFormat::Mpeg4 => "mpeg4_rkmpp",
            VideoFormat::Av1 => "av1_rkmpp",
            _ => return None,
        };
        Some(Self::hardware(
            DecoderFamily::Rkmpp,
            HardwareAccelerationMode::Rkmpp,
            name,
        ))
    }

    /// M2M decoders hand frames back in system memory.
    pub fn v4l2m2m(format: &VideoFormat) -> Option<Self> {
        let name = match format {
            VideoFormat::H264 => "h264_v4l2m2m",
            VideoFormat::Hevc => "hevc_v4l2m2m",
            VideoFormat::Mpeg2Video => "mpeg2_v4l2m2m",
            VideoFormat::Mpeg4 => "mpeg4_v4l2m2m",
            VideoFormat::Vp9 => "vp9_v4l2m2m",
            _ => return None,
        };
        Some(Self {
            family: DecoderFamily::V4l2m2m,
            mode: HardwareAccelerationMode::V4l2m2m,
            engine_name: Some(name),
            output: FrameDataLocation::Software,
        })
    }

    pub fn implicit_software() -> Self {
        Self {
            family: DecoderFamily::Implicit,
            mode: HardwareAccelerationMode::None,
            engine_name: None,
            output: FrameDataLocation::Software,
        }
    }

    /// Decoding through `-hwaccel`, leaving frames on the device.
    pub fn implicit_hardware(mode: HardwareAccelerationMode) -> Self {
        Self {
            family: DecoderFamily::Implicit,
            mode,
            engine_name: None,
            output: FrameDataLocation::Hardware,
        }
    }

    fn hardware(
        family: DecoderFamily,
        mode: HardwareAccelerationMode,
        engine_name: &'static str,
    ) -> Self {
        Self {
            family,
            mode,
            engine_name: Some(engine_name),
            output: FrameDataLocation::Hardware,
        }
    }

    pub fn family(&self) -> DecoderFamily {
        self.family
    }

    pub fn mode(&self) -> HardwareAccelerationMode {
        self.mode
    }

    pub fn engine_name(&self) -> Option<&'static str> {
        self.engine_name
    }

    pub fn output_location(&self) -> FrameDataLocation {
        self.output
    }

    pub fn is_hardware(&self) -> bool {
        self.output == FrameDataLocation::Hardware
    }

    pub fn label(&self) -> String {
        match self.engine_name {
            Some(name) => name.to_string(),
            None if self.is_hardware() => format!("implicit-{}", self.mode),
            None => "implicit".to_string(),
        }
    }
}

impl PipelineStep for Decoder {
    fn name(&self) -> &'static str {
        match self.family {
            DecoderFamily::Software => "decoder-software",
            DecoderFamily::Cuvid => "decoder-cuvid",
            DecoderFamily::Qsv => "decoder-qsv",
            DecoderFamily::Rkmpp => "decoder-rkmpp",
            DecoderFamily::V4l2m2m => "decoder-v4l2m2m",
            DecoderFamily::Implicit => "decoder-implicit",
        }
    }

    fn category(&self) -> StepCategory {
        StepCategory::Decoder
    }

    fn input_options(&self, _kind: InputKind) -> Vec<String> {
        match self.engine_name {
            Some(name) => vec!["-c:v".to_string(), name.to_string()],
            None => Vec::new(),
        }
    }

    fn applies_to(&self, kind: InputKind) -> bool {
        kind == InputKind::Video
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        let pixel_format = current.pixel_format.map(|pf| {
            if self.is_hardware() {
                pf.on_hardware()
            } else {
                pf.without_surface()
            }
        });
        FrameState {
            location: self.output,
            pixel_format,
            hardware_acceleration_mode: self.mode,
            ..current.clone()
        }
    }
}

/// Device setup and `-hwaccel` flags for one acceleration mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccelerationInit {
    pub mode: HardwareAccelerationMode,
    pub hardware_decode: bool,
    pub vaapi_device: Option<String>,
}

pub const DEFAULT_VAAPI_DEVICE: &str = "/dev/dri/renderD128";

impl PipelineStep for AccelerationInit {
    fn name(&self) -> &'static str {
        "acceleration-init"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Global
    }

    fn global_options(&self) -> Vec<String> {
        let mut options = Vec::new();
        let hwaccel = match self.mode {
            HardwareAccelerationMode::Nvenc => Some(("cuda", "cuda")),
            HardwareAccelerationMode::Qsv => {
                options.extend(
                    ["-init_hw_device", "qsv=hw", "-filter_hw_device", "hw"]
                        .iter()
                        .map(|s| s.to_string()),
                );
                Some(("qsv", "qsv"))
            }
            HardwareAccelerationMode::Vaapi => {
                options.push("-vaapi_device".to_string());
                options.push(
                    self.vaapi_device
                        .clone()
                        .unwrap_or_else(|| DEFAULT_VAAPI_DEVICE.to_string()),
                );
                Some(("vaapi", "vaapi"))
            }
            HardwareAccelerationMode::VideoToolbox => Some(("videotoolbox", "videotoolbox_vld")),
            _ => None,
        };
        if self.hardware_decode
            && let Some((accel, output_format)) = hwaccel
        {
            options.push("-hwaccel".to_string());
            options.push(accel.to_string());
            options.push("-hwaccel_output_format".to_string());
            options.push(output_format.to_string());
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PixelFormat;

    #[test]
    fn hardware_decoders_map_pixel_format_onto_surface() {
        let decoder = Decoder::cuvid(&VideoFormat::Hevc).unwrap();
        let state = FrameState {
            pixel_format: Some(PixelFormat::YUV420P10LE),
            ..FrameState::default()
        };
        let next = decoder.next_state(&state);
        assert_eq!(next.location, FrameDataLocation::Hardware);
        assert_eq!(next.pixel_format.map(|pf| pf.ffmpeg_name()), Some("p010le"));
        assert_eq!(decoder.input_options(InputKind::Video), vec!["-c:v", "hevc_cuvid"]);
    }

    #[test]
    fn v4l2m2m_decodes_to_system_memory() {
        let decoder = Decoder::v4l2m2m(&VideoFormat::H264).unwrap();
        assert_eq!(decoder.output_location(), FrameDataLocation::Software);
        assert!(Decoder::v4l2m2m(&VideoFormat::Av1).is_none());
    }

    #[test]
    fn implicit_decoders_emit_nothing() {
        assert!(Decoder::implicit_software()
            .input_options(InputKind::Video)
            .is_empty());
        assert_eq!(
            Decoder::implicit_hardware(HardwareAccelerationMode::Vaapi).label(),
            "implicit-vaapi"
        );
    }

    #[test]
    fn qsv_init_is_emitted_without_hardware_decode() {
        let init = AccelerationInit {
            mode: HardwareAccelerationMode::Qsv,
            hardware_decode: false,
            vaapi_device: None,
        };
        assert_eq!(
            init.global_options(),
            vec!["-init_hw_device", "qsv=hw", "-filter_hw_device", "hw"]
        );
        let vaapi = AccelerationInit {
            mode: HardwareAccelerationMode::Vaapi,
            hardware_decode: true,
            vaapi_device: None,
        };
        assert_eq!(
            vaapi.global_options(),
            vec![
                "-vaapi_device",
                DEFAULT_VAAPI_DEVICE,
                "-hwaccel",
                "vaapi",
                "-hwaccel_output_format",
                "vaapi"
            ]
        );
    }
}
