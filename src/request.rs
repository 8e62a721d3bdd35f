//! YAML job descriptions consumed by the CLI.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use glob::glob;
use serde::{Deserialize, Serialize};

use crate::assembler::CompiledPipeline;
use crate::builder::PipelineBuilder;
use crate::capabilities::{AccelPolicy, HardwareCapabilities};
use crate::error::PipelineError;
use crate::input::{BuildInputs, ConcatInput};
use crate::observability::BuildKind;
use crate::profile::{CopyProfile, OutputProfile};

pub const REQUEST_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeRequest {
    pub version: u32,
    /// Capability report: a path relative to the request file, or inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<CapabilitySource>,
    pub job: Job,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CapabilitySource {
    Path(PathBuf),
    Inline(HardwareCapabilities),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Job {
    Build {
        inputs: BuildInputs,
        profile: OutputProfile,
    },
    Concat {
        input: ConcatInput,
        #[serde(default)]
        settings: CopyProfile,
    },
    Segmenter {
        input: ConcatInput,
        #[serde(default)]
        settings: CopyProfile,
    },
    Resize {
        input: PathBuf,
        output: PathBuf,
        #[serde(default)]
        width: Option<u32>,
        #[serde(default)]
        height: Option<u32>,
    },
}

impl Job {
    pub fn kind(&self) -> BuildKind {
        match self {
            Self::Build { .. } => BuildKind::Transcode,
            Self::Concat { .. } => BuildKind::Concat,
            Self::Segmenter { .. } => BuildKind::Segmenter,
            Self::Resize { .. } => BuildKind::Resize,
        }
    }
}

impl TranscodeRequest {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file: {}", path.display()))?;
        let request: TranscodeRequest = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse request YAML: {}", path.display()))?;
        Ok(request)
    }

    /// The capability report of this request. Relative paths are resolved
    /// against `base_dir`; without a report the host is software only.
    pub fn load_capabilities(&self, base_dir: &Path) -> Result<HardwareCapabilities> {
        match &self.capabilities {
            None => Ok(HardwareCapabilities::software()),
            Some(CapabilitySource::Inline(report)) => Ok(report.clone()),
            Some(CapabilitySource::Path(path)) => {
                let resolved = if path.is_relative() {
                    base_dir.join(path)
                } else {
                    path.clone()
                };
                HardwareCapabilities::load(&resolved)
            }
        }
    }

    pub fn compile(
        &self,
        builder: &PipelineBuilder,
        policy: AccelPolicy,
    ) -> Result<CompiledPipeline, PipelineError> {
        match &self.job {
            Job::Build { inputs, profile } => builder.build_with_policy(inputs, profile, policy),
            Job::Concat { input, settings } => builder.concat(input, settings),
            Job::Segmenter { input, settings } => builder.wrap_segmenter(input, settings),
            Job::Resize {
                input,
                output,
                width,
                height,
            } => builder.resize(input, output, *width, *height),
        }
    }
}

/// Request files matching any of `patterns`.
pub fn expand_patterns(patterns: &[String]) -> Result<Vec<PathBuf>> {
    let mut resolved = Vec::new();
    for pattern in patterns {
        let matches =
            glob(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?;
        let mut found = false;
        for entry in matches {
            let path = entry?;
            if path.is_file() {
                resolved.push(path);
                found = true;
            }
        }
        if !found {
            anyhow::bail!("No request files matched pattern: {}", pattern);
        }
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{HardwareAccelerationMode, VideoFormat};

    #[test]
    fn parses_a_build_request() {
        let yaml = r#"
version: 1
capabilities:
  modes:
    nvenc:
      decode:
        - codec: h264
      encode:
        - codec: hevc
          bit_depths: [8, 10]
job:
  kind: build
  inputs:
    video:
      path: /media/movie.mkv
      stream:
        codec: h264
        pixel_format: yuv420p
        width: 1920
        height: 1080
  profile:
    acceleration: nvenc
    video_format: hevc
    width: 1920
    height: 1080
"#;
        let request: TranscodeRequest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(request.version, REQUEST_VERSION);
        assert_eq!(request.job.kind(), BuildKind::Transcode);
        let caps = request.load_capabilities(Path::new(".")).unwrap();
        assert!(caps.can_encode(HardwareAccelerationMode::Nvenc, &VideoFormat::Hevc, 10));
        assert!(!caps.can_decode(HardwareAccelerationMode::Nvenc, &VideoFormat::Hevc, 8));
    }

    #[test]
    fn capability_paths_resolve_next_to_the_request() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("caps.yaml"), "readrate_initial_burst: true\n").unwrap();
        let yaml = r#"
version: 1
capabilities: caps.yaml
job:
  kind: concat
  input:
    url: http://localhost:8080/ffmpeg/concat/1
"#;
        let request: TranscodeRequest = serde_yaml::from_str(yaml).unwrap();
        let caps = request.load_capabilities(dir.path()).unwrap();
        assert!(caps.readrate_initial_burst);
        assert_eq!(request.job.kind(), BuildKind::Concat);
    }

    #[test]
    fn unmatched_patterns_fail() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/*.yaml", dir.path().display());
        assert!(expand_patterns(&[pattern]).is_err());
    }
}
