use tracing::{debug, warn};

use crate::capabilities::HardwareCapabilities;
use crate::catalog::encoder::VideoEncoder;
use crate::error::PipelineError;
use crate::format::{HardwareAccelerationMode, VideoFormat};

/// Picks the video encoder for `target` under the resolved encoder `mode`.
///
/// The device encoder is used only when the capability report lists the
/// target codec at `bit_depth`; otherwise the software encoder is used.
pub fn select_encoder(
    mode: HardwareAccelerationMode,
    target: &VideoFormat,
    bit_depth: u8,
    capabilities: &HardwareCapabilities,
) -> Result<VideoEncoder, PipelineError> {
    match target {
        VideoFormat::Copy => return Ok(VideoEncoder::copy()),
        VideoFormat::Undetermined => return Ok(VideoEncoder::implicit()),
        _ => {}
    }

    if mode.is_hardware() {
        if capabilities.can_encode(mode, target, bit_depth) {
            if let Some(encoder) = VideoEncoder::hardware(mode, target) {
                debug!(mode = %mode, codec = %target, encoder = encoder.label(), "selected encoder");
                return Ok(encoder);
            }
        } else {
            warn!(
                mode = %mode,
                codec = %target,
                bit_depth,
                "hardware encode unavailable; using software encoder"
            );
        }
    }

    VideoEncoder::software(target).ok_or_else(|| PipelineError::UnsupportedCombination {
        stage: "encoder",
        mode,
        video_format: target.clone(),
        pixel_format: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_encoder_requires_capability() {
        let caps = HardwareCapabilities::nvidia((6, 1));
        let nvenc = HardwareAccelerationMode::Nvenc;
        let encoder = select_encoder(nvenc, &VideoFormat::Hevc, 10, &caps).unwrap();
        assert_eq!(encoder.engine_name(), Some("hevc_nvenc"));
        let encoder = select_encoder(nvenc, &VideoFormat::Av1, 8, &caps).unwrap();
        assert_eq!(encoder.engine_name(), Some("libsvtav1"));
    }

    #[test]
    fn software_targets() {
        let caps = HardwareCapabilities::software();
        let none = HardwareAccelerationMode::None;
        let names: Vec<_> = [
            VideoFormat::Hevc,
            VideoFormat::H264,
            VideoFormat::Mpeg2Video,
            VideoFormat::Av1,
            VideoFormat::Copy,
        ]
        .iter()
        .map(|f| select_encoder(none, f, 8, &caps).unwrap().label())
        .collect();
        assert_eq!(names, vec!["libx265", "libx264", "mpeg2video", "libsvtav1", "copy"]);
        assert_eq!(
            select_encoder(none, &VideoFormat::Undetermined, 8, &caps)
                .unwrap()
                .engine_name(),
            None
        );
    }

    #[test]
    fn unknown_targets_are_rejected() {
        let caps = HardwareCapabilities::software();
        let result = select_encoder(HardwareAccelerationMode::None, &VideoFormat::Vp9, 8, &caps);
        assert!(matches!(
            result,
            Err(PipelineError::UnsupportedCombination { stage: "encoder", .. })
        ));
    }
}
