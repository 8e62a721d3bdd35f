use std::fs;

use tempfile::tempdir;
use tvpipe::presets::{PRESET_NAMES, generate_preset};
use tvpipe::request::TranscodeRequest;
use tvpipe::validation::validate_request;

#[test]
fn generate_channel_preset_writes_file() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("requests/channel.yaml");
    let generated = generate_preset("channel", &path).expect("preset generation");
    assert!(generated.exists());
    let contents = fs::read_to_string(&generated).expect("read preset");
    assert!(contents.contains("kind: build"));
    assert!(contents.contains("video_format: hevc"));
}

#[test]
fn every_preset_loads_and_validates() {
    let temp = tempdir().unwrap();
    for name in PRESET_NAMES {
        let path = generate_preset(name, &temp.path().join(format!("{name}.yaml"))).unwrap();
        let request = TranscodeRequest::load(&path).unwrap();
        let report = validate_request(&request, temp.path());
        assert!(report.is_ok(), "{name}: {:?}", report.errors);
    }
}

#[test]
fn nvidia_preset_carries_its_capabilities() {
    let temp = tempdir().unwrap();
    let path = generate_preset("nvidia", &temp.path().join("nvidia.yaml")).unwrap();
    let contents = fs::read_to_string(&path).unwrap();
    assert!(contents.contains("nvenc:"));
    assert!(contents.contains("readrate_initial_burst: true"));
}
