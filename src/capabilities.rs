//! What the host can accelerate, supplied by the caller as a value.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::format::{HardwareAccelerationMode, VideoFormat};

/// What the CLI does when a hardware build fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AccelPolicy {
    /// Report the failure.
    Strict,
    /// Retry the build without acceleration.
    #[default]
    Fallback,
    /// Never use acceleration.
    SoftwareOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecSupport {
    pub codec: VideoFormat,
    #[serde(default = "default_bit_depths")]
    pub bit_depths: Vec<u8>,
}

fn default_bit_depths() -> Vec<u8> {
    vec![8]
}

impl CodecSupport {
    pub fn new(codec: VideoFormat, bit_depths: &[u8]) -> Self {
        Self {
            codec,
            bit_depths: bit_depths.to_vec(),
        }
    }

    fn covers(&self, codec: &VideoFormat, bit_depth: u8) -> bool {
        self.codec == *codec && self.bit_depths.contains(&bit_depth)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AcceleratorSupport {
    #[serde(default)]
    pub device: Option<String>,
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub decode: Vec<CodecSupport>,
    #[serde(default)]
    pub encode: Vec<CodecSupport>,
}

/// Per-mode codec support plus engine feature flags. Modes missing from
/// `modes` are unavailable on the host.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HardwareCapabilities {
    #[serde(default)]
    pub modes: BTreeMap<HardwareAccelerationMode, AcceleratorSupport>,
    #[serde(default)]
    pub readrate_initial_burst: bool,
}

impl HardwareCapabilities {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read capability report: {}", path.display()))?;
        let report: Self = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse capability report: {}", path.display()))?;
        Ok(report)
    }

    /// A host without any accelerator.
    pub fn software() -> Self {
        Self::default()
    }

    /// NVDEC/NVENC support by CUDA compute capability.
    pub fn nvidia(compute: (u32, u32)) -> Self {
        let at_least = |major: u32, minor: u32| compute >= (major, minor);
        let mut decode = vec![
            CodecSupport::new(VideoFormat::Mpeg2Video, &[8]),
            CodecSupport::new(VideoFormat::Mpeg4, &[8]),
            CodecSupport::new(VideoFormat::Vc1, &[8]),
            CodecSupport::new(VideoFormat::H264, &[8]),
        ];
        let mut encode = vec![CodecSupport::new(VideoFormat::H264, &[8])];

        if at_least(6, 0) {
            decode.push(CodecSupport::new(VideoFormat::Hevc, &[8, 10]));
            encode.push(CodecSupport::new(VideoFormat::Hevc, &[8, 10]));
        } else if at_least(5, 2) {
            decode.push(CodecSupport::new(VideoFormat::Hevc, &[8]));
            encode.push(CodecSupport::new(VideoFormat::Hevc, &[8]));
        }
        if at_least(6, 1) {
            decode.push(CodecSupport::new(VideoFormat::Vp9, &[8, 10]));
        } else if at_least(6, 0) {
            decode.push(CodecSupport::new(VideoFormat::Vp9, &[8]));
        }
        if at_least(8, 6) {
            decode.push(CodecSupport::new(VideoFormat::Av1, &[8, 10]));
        }
        if at_least(8, 9) {
            encode.push(CodecSupport::new(VideoFormat::Av1, &[8, 10]));
        }

        let mut modes = BTreeMap::new();
        modes.insert(
            HardwareAccelerationMode::Nvenc,
            AcceleratorSupport {
                device: None,
                driver: None,
                decode,
                encode,
            },
        );
        Self {
            modes,
            readrate_initial_burst: true,
        }
    }

    pub fn accelerator(&self, mode: HardwareAccelerationMode) -> Option<&AcceleratorSupport> {
        self.modes.get(&mode)
    }

    pub fn has_mode(&self, mode: HardwareAccelerationMode) -> bool {
        mode == HardwareAccelerationMode::None || self.modes.contains_key(&mode)
    }

    pub fn can_decode(
        &self,
        mode: HardwareAccelerationMode,
        codec: &VideoFormat,
        bit_depth: u8,
    ) -> bool {
        self.accelerator(mode)
            .is_some_and(|support| support.decode.iter().any(|c| c.covers(codec, bit_depth)))
    }

    pub fn can_encode(
        &self,
        mode: HardwareAccelerationMode,
        codec: &VideoFormat,
        bit_depth: u8,
    ) -> bool {
        self.accelerator(mode)
            .is_some_and(|support| support.encode.iter().any(|c| c.covers(codec, bit_depth)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pascal_decodes_ten_bit_hevc() {
        let caps = HardwareCapabilities::nvidia((6, 1));
        let nvenc = HardwareAccelerationMode::Nvenc;
        assert!(caps.can_decode(nvenc, &VideoFormat::Hevc, 10));
        assert!(caps.can_decode(nvenc, &VideoFormat::Vp9, 10));
        assert!(!caps.can_decode(nvenc, &VideoFormat::H264, 10));
        assert!(!caps.can_decode(nvenc, &VideoFormat::Av1, 8));
        assert!(!caps.can_encode(nvenc, &VideoFormat::Av1, 8));
    }

    #[test]
    fn missing_modes_are_unavailable() {
        let caps = HardwareCapabilities::software();
        assert!(caps.has_mode(HardwareAccelerationMode::None));
        assert!(!caps.has_mode(HardwareAccelerationMode::Qsv));
        assert!(!caps.can_encode(HardwareAccelerationMode::Qsv, &VideoFormat::H264, 8));
    }

    #[test]
    fn parses_yaml_report() {
        let yaml = r#"
modes:
  vaapi:
    device: /dev/dri/renderD129
    driver: iHD
    decode:
      - codec: h264
      - codec: hevc
        bit_depths: [8, 10]
    encode:
      - codec: h264
readrate_initial_burst: true
"#;
        let caps: HardwareCapabilities = serde_yaml::from_str(yaml).unwrap();
        let vaapi = HardwareAccelerationMode::Vaapi;
        assert!(caps.can_decode(vaapi, &VideoFormat::H264, 8));
        assert!(caps.can_decode(vaapi, &VideoFormat::Hevc, 10));
        assert!(!caps.can_encode(vaapi, &VideoFormat::Hevc, 8));
        assert_eq!(
            caps.accelerator(vaapi).and_then(|a| a.driver.as_deref()),
            Some("iHD")
        );
        assert!(caps.readrate_initial_burst);
    }
}
