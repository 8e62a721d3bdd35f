use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::builder::PipelineBuilder;
use crate::capabilities::{AccelPolicy, HardwareCapabilities};
use crate::format::{HardwareAccelerationMode, parse_frame_rate};
use crate::input::{BuildInputs, SubtitleMethod};
use crate::profile::{OutputProfile, WatermarkMode};
use crate::request::{Job, REQUEST_VERSION, TranscodeRequest};

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Checks a request without running anything. `base_dir` resolves a
/// capability report given as a relative path.
pub fn validate_request(request: &TranscodeRequest, base_dir: &Path) -> ValidationReport {
    let mut report = ValidationReport::default();

    if request.version != REQUEST_VERSION {
        report
            .errors
            .push(format!("Unsupported request version: {}", request.version));
    }

    let capabilities = match request
        .load_capabilities(base_dir)
        .context("Capability report is unusable")
    {
        Ok(capabilities) => capabilities,
        Err(err) => {
            report.errors.push(format!("{err:#}"));
            return report;
        }
    };

    match &request.job {
        Job::Build { inputs, profile } => {
            report.merge(validate_build(inputs, profile, &capabilities));
        }
        Job::Concat { input, .. } | Job::Segmenter { input, .. } => {
            if input.url.trim().is_empty() {
                report.errors.push("Input URL cannot be empty".into());
            }
        }
        Job::Resize { width, height, .. } => {
            if width.is_none() && height.is_none() {
                report
                    .errors
                    .push("Resize needs a width, a height, or both".into());
            }
            if *width == Some(0) || *height == Some(0) {
                report.errors.push("Resize dimensions must be positive".into());
            }
        }
    }

    if report.is_ok() {
        report.merge(
            validate_compile(request, capabilities).unwrap_or_else(|err| ValidationReport {
                errors: vec![format!("{err:#}")],
                warnings: vec![],
            }),
        );
    }

    report
}

fn validate_build(
    inputs: &BuildInputs,
    profile: &OutputProfile,
    capabilities: &HardwareCapabilities,
) -> ValidationReport {
    let mut report = ValidationReport::default();

    if inputs.video.is_none() {
        report
            .errors
            .push("A build requires a video input".into());
    }
    if profile.width == 0 || profile.height == 0 {
        report.errors.push(format!(
            "Output size must be positive, got {}x{}",
            profile.width, profile.height
        ));
    }
    if let Some(format) = profile.pixel_format
        && !format.is_known()
    {
        report
            .errors
            .push("Output pixel format is not one the engine can target".into());
    }
    if let Some(format) = inputs.video.as_ref().and_then(|video| video.stream.pixel_format)
        && !format.is_known()
    {
        report.warnings.push(format!(
            "Source pixel format is unrecognised; treating it as {}-bit",
            format.bit_depth()
        ));
    }
    if let Some(rate) = &profile.frame_rate
        && parse_frame_rate(rate).is_none()
    {
        report
            .errors
            .push(format!("Frame rate '{rate}' is not a number or ratio"));
    }

    if let Some(watermark) = &profile.watermark {
        if inputs.watermark.is_none() {
            report
                .warnings
                .push("Watermark settings without a watermark input are ignored".into());
        }
        if !(0.0..=100.0).contains(&watermark.opacity) {
            report.errors.push(format!(
                "Watermark opacity must be within 0..=100, got {}",
                watermark.opacity
            ));
        }
        if matches!(watermark.mode, WatermarkMode::Intermittent { .. })
            && (profile.item_start.is_none() || profile.item_duration.is_none())
        {
            report.errors.push(
                "Intermittent watermarks need item_start and item_duration".into(),
            );
        }
    }

    if profile.is_copy() {
        let burns_subtitle = inputs
            .subtitle
            .as_ref()
            .is_some_and(|subtitle| subtitle.method == SubtitleMethod::Burn);
        if inputs.watermark.is_some() || inputs.graphics.is_some() || burns_subtitle {
            report.warnings.push(
                "Copied video cannot carry overlays; watermark, graphics and burned subtitles are skipped"
                    .into(),
            );
        }
    }

    if profile.acceleration != HardwareAccelerationMode::None
        && !capabilities.has_mode(profile.acceleration)
    {
        report.warnings.push(format!(
            "Capability report has no entry for {}; the build is software only unless the report changes",
            profile.acceleration
        ));
    }

    report
}

fn validate_compile(
    request: &TranscodeRequest,
    capabilities: HardwareCapabilities,
) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();
    let builder = PipelineBuilder::new(capabilities);

    match request.compile(&builder, AccelPolicy::Strict) {
        Ok(_) => {}
        Err(err) if err.is_hardware_related() => {
            report
                .warnings
                .push(format!("Hardware build fails, fallback applies: {err}"));
            request
                .compile(&builder, AccelPolicy::SoftwareOnly)
                .context("Software build failed")?;
        }
        Err(err) => {
            return Err(anyhow::Error::new(err).context("Build failed"));
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{FrameSize, PixelFormat, VideoFormat};
    use crate::input::{VideoInput, VideoStreamInfo, WatermarkInput};
    use crate::profile::WatermarkSettings;

    fn request(inputs: BuildInputs, profile: OutputProfile) -> TranscodeRequest {
        TranscodeRequest {
            version: REQUEST_VERSION,
            capabilities: None,
            job: Job::Build { inputs, profile },
        }
    }

    fn video() -> BuildInputs {
        BuildInputs {
            video: Some(VideoInput {
                path: "/media/movie.mkv".into(),
                stream: VideoStreamInfo {
                    index: 0,
                    codec: VideoFormat::H264,
                    pixel_format: Some(PixelFormat::YUV420P),
                    width: 1920,
                    height: 1080,
                    frame_rate: None,
                    interlaced: false,
                    still_image: false,
                },
            }),
            ..BuildInputs::default()
        }
    }

    #[test]
    fn rejects_unknown_versions_and_missing_video() {
        let mut request = request(
            BuildInputs::default(),
            OutputProfile::new(VideoFormat::H264, FrameSize::new(1280, 720)),
        );
        request.version = 2;
        let report = validate_request(&request, Path::new("."));
        assert!(!report.is_ok());
        assert!(report.errors.iter().any(|e| e.contains("version")));
        assert!(report.errors.iter().any(|e| e.contains("video input")));
    }

    #[test]
    fn unavailable_hardware_is_a_warning() {
        let mut profile = OutputProfile::new(VideoFormat::H264, FrameSize::new(1280, 720));
        profile.acceleration = HardwareAccelerationMode::Qsv;
        let report = validate_request(&request(video(), profile), Path::new("."));
        assert!(report.is_ok(), "{:?}", report.errors);
        assert!(report.warnings.iter().any(|w| w.contains("qsv")));
        assert!(report.warnings.iter().any(|w| w.contains("fallback")));
    }

    #[test]
    fn unrecognised_pixel_formats_are_reported() {
        let mut inputs = video();
        if let Some(video) = inputs.video.as_mut() {
            video.stream.pixel_format = "gbrp12le".parse().ok();
        }
        let profile = OutputProfile::new(VideoFormat::H264, FrameSize::new(1280, 720));
        let report = validate_request(&request(inputs.clone(), profile.clone()), Path::new("."));
        assert!(report.is_ok(), "{:?}", report.errors);
        assert!(report.warnings.iter().any(|w| w.contains("12-bit")));

        let mut profile = profile;
        profile.pixel_format = "xyz12le".parse().ok();
        let report = validate_request(&request(inputs, profile), Path::new("."));
        assert!(report.errors.iter().any(|e| e.contains("pixel format")));
    }

    #[test]
    fn intermittent_watermarks_need_an_item_window() {
        let mut inputs = video();
        inputs.watermark = Some(WatermarkInput {
            path: "/media/logo.png".into(),
            stream_index: 0,
            animated: false,
        });
        let mut profile = OutputProfile::new(VideoFormat::H264, FrameSize::new(1280, 720));
        profile.watermark = Some(WatermarkSettings {
            mode: WatermarkMode::Intermittent {
                frequency_minutes: 15,
                duration_seconds: 10,
            },
            ..WatermarkSettings::default()
        });
        let report = validate_request(&request(inputs, profile), Path::new("."));
        assert!(report.errors.iter().any(|e| e.contains("item_start")));
    }
}
