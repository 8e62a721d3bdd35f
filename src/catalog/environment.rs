use std::path::PathBuf;

use crate::step::{EnvironmentVariable, PipelineStep, StepCategory};

/// Makes the engine write a report log into `directory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfReport {
    pub directory: PathBuf,
}

impl PipelineStep for FfReport {
    fn name(&self) -> &'static str {
        "ffreport"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Environment
    }

    fn environment_variables(&self) -> Vec<EnvironmentVariable> {
        let file = self.directory.join("ffmpeg-%t.log");
        vec![EnvironmentVariable::new(
            "FFREPORT",
            format!("file={}:level=32", file.to_string_lossy()),
        )]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibvaDriver(pub String);

impl PipelineStep for LibvaDriver {
    fn name(&self) -> &'static str {
        "libva-driver"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Environment
    }

    fn environment_variables(&self) -> Vec<EnvironmentVariable> {
        vec![EnvironmentVariable::new("LIBVA_DRIVER_NAME", self.0.clone())]
    }
}
