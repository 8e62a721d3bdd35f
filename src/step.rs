use std::fmt;

use serde::Serialize;

use crate::error::PipelineError;
use crate::state::FrameState;

/// Kind of input file an input option is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InputKind {
    Video,
    Audio,
    Concat,
    GraphicsEngine,
    Watermark,
    Subtitle,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Concat => "concat",
            Self::GraphicsEngine => "graphics engine",
            Self::Watermark => "watermark",
            Self::Subtitle => "subtitle",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepCategory {
    Environment,
    Global,
    Input,
    Decoder,
    Filter,
    Encoder,
    Output,
}

impl fmt::Display for StepCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Environment => "environment",
            Self::Global => "global",
            Self::Input => "input",
            Self::Decoder => "decoder",
            Self::Filter => "filter",
            Self::Encoder => "encoder",
            Self::Output => "output",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentVariable {
    pub key: String,
    pub value: String,
}

impl EnvironmentVariable {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Unit of composition for a compiled pipeline.
///
/// Every method has an empty default so that a step only describes the
/// argument categories it contributes to.
pub trait PipelineStep: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn category(&self) -> StepCategory;

    fn environment_variables(&self) -> Vec<EnvironmentVariable> {
        Vec::new()
    }

    fn global_options(&self) -> Vec<String> {
        Vec::new()
    }

    fn input_options(&self, _kind: InputKind) -> Vec<String> {
        Vec::new()
    }

    /// Fragment placed inside a filter chain.
    fn filter(&self) -> Option<String> {
        None
    }

    /// Arguments emitted in the filter category (`-vf`, `-filter_complex`).
    fn filter_options(&self) -> Vec<String> {
        Vec::new()
    }

    fn output_options(&self) -> Vec<String> {
        Vec::new()
    }

    fn next_state(&self, current: &FrameState) -> FrameState {
        current.clone()
    }

    fn applies_to(&self, _kind: InputKind) -> bool {
        false
    }

    /// Verifies the state this step receives.
    fn check(&self, _current: &FrameState) -> Result<(), PipelineError> {
        Ok(())
    }
}

pub type BoxedStep = Box<dyn PipelineStep>;

pub(crate) fn args<const N: usize>(values: [&str; N]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
