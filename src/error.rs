use thiserror::Error;

use crate::format::{HardwareAccelerationMode, VideoFormat};
use crate::step::InputKind;

/// Failures returned by the pipeline builders.
///
/// Every variant is a build-time failure; nothing here is produced by the
/// external engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error(
        "no {stage} for hardware acceleration {mode}, video format {video_format}, pixel format {}",
        pixel_format.as_deref().unwrap_or("unknown")
    )]
    UnsupportedCombination {
        stage: &'static str,
        mode: HardwareAccelerationMode,
        video_format: VideoFormat,
        pixel_format: Option<String>,
    },

    #[error("step '{step}' does not apply to {input} inputs")]
    InconsistentStep { step: String, input: InputKind },

    #[error("step '{step}' requires {expected} but the frame is {actual}")]
    MissingPrecondition {
        step: String,
        expected: String,
        actual: String,
    },

    #[error("hardware acceleration {mode} is unavailable: {detail}")]
    CapabilityGap {
        mode: HardwareAccelerationMode,
        detail: String,
    },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl PipelineError {
    pub fn missing_precondition(
        step: &str,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::MissingPrecondition {
            step: step.to_string(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Short variant name, used as a metrics label.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::UnsupportedCombination { .. } => "unsupported-combination",
            Self::InconsistentStep { .. } => "inconsistent-step",
            Self::MissingPrecondition { .. } => "missing-precondition",
            Self::CapabilityGap { .. } => "capability-gap",
            Self::InvalidRequest(_) => "invalid-request",
        }
    }

    /// Whether retrying without hardware acceleration could succeed.
    pub fn is_hardware_related(&self) -> bool {
        match self {
            Self::CapabilityGap { .. } => true,
            Self::UnsupportedCombination { mode, .. } => *mode != HardwareAccelerationMode::None,
            _ => false,
        }
    }
}
