use std::fs;
use std::path::PathBuf;

use tempfile::tempdir;
use tvpipe::capabilities::{AccelPolicy, HardwareCapabilities};
use tvpipe::format::{FrameSize, PixelFormat, VideoFormat};
use tvpipe::input::{BuildInputs, GraphicsInput, VideoInput, VideoStreamInfo};
use tvpipe::lockfile::{generate_lock, lock_for};
use tvpipe::profile::OutputProfile;
use tvpipe::request::{CapabilitySource, Job, TranscodeRequest};
use tvpipe::validation::validate_request;
use tvpipe::PipelineBuilder;

fn base_request(profile: OutputProfile) -> TranscodeRequest {
    TranscodeRequest {
        version: 1,
        capabilities: None,
        job: Job::Build {
            inputs: BuildInputs {
                video: Some(VideoInput {
                    path: PathBuf::from("/media/movie.mkv"),
                    stream: VideoStreamInfo {
                        index: 0,
                        codec: VideoFormat::H264,
                        pixel_format: Some(PixelFormat::YUV420P),
                        width: 1920,
                        height: 1080,
                        frame_rate: Some("24".to_string()),
                        interlaced: false,
                        still_image: false,
                    },
                }),
                ..BuildInputs::default()
            },
            profile,
        },
    }
}

#[test]
fn validation_catches_empty_output_size() {
    let request = base_request(OutputProfile::new(VideoFormat::H264, FrameSize::new(0, 720)));
    let report = validate_request(&request, &PathBuf::from("."));
    assert!(!report.is_ok());
    assert!(
        report.errors.iter().any(|e| e.contains("0x720")),
        "unexpected errors: {:?}",
        report.errors
    );
}

#[test]
fn validation_reports_unparsable_frame_rates() {
    let mut profile = OutputProfile::new(VideoFormat::H264, FrameSize::new(1280, 720));
    profile.frame_rate = Some("fast".to_string());
    let report = validate_request(&base_request(profile), &PathBuf::from("."));
    assert!(report.errors.iter().any(|e| e.contains("fast")));
}

#[test]
fn validation_warns_about_overlays_on_copied_video() {
    let mut request = base_request(OutputProfile::new(VideoFormat::Copy, FrameSize::new(1920, 1080)));
    if let Job::Build { inputs, .. } = &mut request.job {
        inputs.graphics = Some(GraphicsInput {
            path: PathBuf::from("pipe:0"),
        });
    }
    let report = validate_request(&request, &PathBuf::from("."));
    assert!(report.is_ok(), "{:?}", report.errors);
    assert!(report.warnings.iter().any(|w| w.contains("overlays")));
}

#[test]
fn validation_reports_missing_capability_files() {
    let temp = tempdir().unwrap();
    let mut request = base_request(OutputProfile::new(VideoFormat::H264, FrameSize::new(1280, 720)));
    request.capabilities = Some(CapabilitySource::Path(PathBuf::from("missing.yaml")));
    let report = validate_request(&request, temp.path());
    assert!(!report.is_ok());
    assert!(report.errors[0].contains("Capability report"));
}

#[test]
fn lockfile_is_stable_for_identical_builds() {
    let temp = tempdir().unwrap();
    let request = base_request(OutputProfile::new(VideoFormat::Hevc, FrameSize::new(1280, 720)));

    let path = temp.path().join("first.lock");
    let written = generate_lock(&request, temp.path(), AccelPolicy::Fallback, &path).unwrap();
    assert!(path.is_file());
    assert!(fs::read_to_string(&path).unwrap().contains("capabilities_hash"));

    let capabilities = HardwareCapabilities::software();
    let compiled = request
        .compile(&PipelineBuilder::new(capabilities.clone()), AccelPolicy::Fallback)
        .unwrap();
    let again = lock_for(&request, AccelPolicy::Fallback, &capabilities, &compiled);
    assert_eq!(written.arguments_hash, again.arguments_hash);
    assert_eq!(written.capabilities_hash, again.capabilities_hash);
    assert_eq!(written.steps.len(), compiled.steps.len());

    let nvidia = HardwareCapabilities::nvidia((7, 5));
    let other = lock_for(&request, AccelPolicy::Fallback, &nvidia, &compiled);
    assert_ne!(written.capabilities_hash, other.capabilities_hash);
}
