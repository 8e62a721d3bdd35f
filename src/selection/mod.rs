//! Pure selection rules: which catalog entries a build uses.

pub mod decoder;
pub mod encoder;
pub mod filter;

use tracing::info;

use crate::capabilities::HardwareCapabilities;
use crate::error::PipelineError;
use crate::format::{HardwareAccelerationMode, VideoFormat};

pub use self::decoder::{DecoderContext, select_decoder};
pub use self::encoder::select_encoder;
pub use self::filter::{PixelFormatPlan, VideoChain, plan_pixel_format};

/// Acceleration modes after checking the capability report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolvedAcceleration {
    pub decoder_mode: HardwareAccelerationMode,
    pub encoder_mode: HardwareAccelerationMode,
}

impl ResolvedAcceleration {
    /// Mode whose device the engine has to initialize.
    pub fn device_mode(&self) -> HardwareAccelerationMode {
        if self.decoder_mode.is_hardware() {
            self.decoder_mode
        } else {
            self.encoder_mode
        }
    }
}

/// Splits the requested mode into decoder and encoder modes. Each half
/// degrades to software on its own when the report lacks the codec at
/// the given bit depth.
pub fn resolve_acceleration(
    requested: HardwareAccelerationMode,
    source: (&VideoFormat, u8),
    target: (&VideoFormat, u8),
    capabilities: &HardwareCapabilities,
) -> Result<ResolvedAcceleration, PipelineError> {
    if !requested.is_hardware() {
        return Ok(ResolvedAcceleration::default());
    }
    if !capabilities.has_mode(requested) {
        return Err(PipelineError::CapabilityGap {
            mode: requested,
            detail: "not present in the capability report".to_string(),
        });
    }

    let (source_codec, source_depth) = source;
    let (target_codec, target_depth) = target;

    let decoder_mode = if capabilities.can_decode(requested, source_codec, source_depth) {
        requested
    } else {
        info!(
            mode = %requested,
            codec = %source_codec,
            bit_depth = source_depth,
            "hardware decode unavailable; decoding in software"
        );
        HardwareAccelerationMode::None
    };

    let encoder_mode = match target_codec {
        VideoFormat::Copy | VideoFormat::Undetermined => HardwareAccelerationMode::None,
        codec if capabilities.can_encode(requested, codec, target_depth) => requested,
        codec => {
            info!(
                mode = %requested,
                codec = %codec,
                bit_depth = target_depth,
                "hardware encode unavailable; encoding in software"
            );
            HardwareAccelerationMode::None
        }
    };

    Ok(ResolvedAcceleration {
        decoder_mode,
        encoder_mode,
    })
}
