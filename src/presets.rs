use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::capabilities::HardwareCapabilities;
use crate::format::{AudioFormat, FrameSize, HardwareAccelerationMode, PixelFormat, VideoFormat};
use crate::graph::placement::WatermarkLocation;
use crate::input::{
    AudioInput, AudioStreamInfo, BuildInputs, ConcatInput, VideoInput, VideoStreamInfo,
    WatermarkInput,
};
use crate::profile::{AudioProfile, CopyProfile, OutputProfile, WatermarkSettings};
use crate::request::{CapabilitySource, Job, REQUEST_VERSION, TranscodeRequest};
use crate::state::{OutputFormat, StreamMetadata};

pub const PRESET_NAMES: [&str; 7] = [
    "channel",
    "hls-direct",
    "nvidia",
    "watermark",
    "concat",
    "segmenter",
    "resize",
];

pub fn generate_preset(name: &str, destination: &Path) -> Result<PathBuf> {
    let preset = preset(name)?;

    let rendered = serde_yaml::to_string(&preset)?;
    if let Some(parent) = destination.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    fs::write(destination, rendered)
        .with_context(|| format!("Failed to write request: {}", destination.display()))?;

    Ok(destination.to_path_buf())
}

pub fn preset(name: &str) -> Result<TranscodeRequest> {
    let job = match name {
        "channel" => channel_job(),
        "hls-direct" => hls_direct_job(),
        "nvidia" => nvidia_job(),
        "watermark" => watermark_job(),
        "concat" => Job::Concat {
            input: ConcatInput {
                url: "http://localhost:8409/ffmpeg/concat/1".into(),
            },
            settings: copy_settings(),
        },
        "segmenter" => Job::Segmenter {
            input: ConcatInput {
                url: "http://localhost:8409/iptv/channel/1.m3u8?mode=segmenter".into(),
            },
            settings: copy_settings(),
        },
        "resize" => Job::Resize {
            input: "./artwork/poster.png".into(),
            output: "./cache/poster-200.jpg".into(),
            width: None,
            height: Some(200),
        },
        other => anyhow::bail!(
            "Unknown preset '{other}' (expected one of: {})",
            PRESET_NAMES.join(", ")
        ),
    };

    let capabilities = (name == "nvidia")
        .then(|| CapabilitySource::Inline(HardwareCapabilities::nvidia((8, 6))));

    Ok(TranscodeRequest {
        version: REQUEST_VERSION,
        capabilities,
        job,
    })
}

fn channel_job() -> Job {
    let mut profile = OutputProfile::new(VideoFormat::Hevc, FrameSize::new(1920, 1080));
    profile.bitrate = Some(2000);
    profile.buffer_size = Some(4000);
    profile.timescale = Some(90000);
    profile.realtime = true;
    profile.audio = AudioProfile {
        format: AudioFormat::Aac,
        bitrate: Some(192),
        buffer_size: Some(384),
        sample_rate: Some(48000),
        ..AudioProfile::default()
    };
    profile.metadata = channel_metadata();

    Job::Build {
        inputs: movie_inputs(),
        profile,
    }
}

fn hls_direct_job() -> Job {
    let mut profile = OutputProfile::new(VideoFormat::Copy, FrameSize::new(1920, 1080));
    profile.realtime = true;
    profile.output = OutputFormat::Mp4;
    profile.audio = AudioProfile {
        format: AudioFormat::Copy,
        ..AudioProfile::default()
    };

    Job::Build {
        inputs: movie_inputs(),
        profile,
    }
}

fn nvidia_job() -> Job {
    let mut profile = OutputProfile::new(VideoFormat::H264, FrameSize::new(1280, 720));
    profile.acceleration = HardwareAccelerationMode::Nvenc;
    profile.bitrate = Some(4000);
    profile.buffer_size = Some(8000);
    profile.deinterlace = true;
    profile.metadata = channel_metadata();

    Job::Build {
        inputs: movie_inputs(),
        profile,
    }
}

fn watermark_job() -> Job {
    let mut inputs = movie_inputs();
    inputs.watermark = Some(WatermarkInput {
        path: "./artwork/logo.png".into(),
        stream_index: 0,
        animated: false,
    });

    let mut profile = OutputProfile::new(VideoFormat::H264, FrameSize::new(1280, 720));
    profile.watermark = Some(WatermarkSettings {
        location: WatermarkLocation::BottomRight,
        width_percent: 15.0,
        horizontal_margin_percent: 5.0,
        vertical_margin_percent: 5.0,
        opacity: 80.0,
        ..WatermarkSettings::default()
    });
    profile.metadata = channel_metadata();

    Job::Build { inputs, profile }
}

fn movie_inputs() -> BuildInputs {
    let path = PathBuf::from("./media/movie.mkv");
    BuildInputs {
        video: Some(VideoInput {
            path: path.clone(),
            stream: VideoStreamInfo {
                index: 0,
                codec: VideoFormat::H264,
                pixel_format: Some(PixelFormat::YUV420P),
                width: 1920,
                height: 1080,
                frame_rate: Some("24000/1001".into()),
                interlaced: false,
                still_image: false,
            },
        }),
        audio: Some(AudioInput {
            path,
            stream: AudioStreamInfo {
                index: 1,
                codec: Some("ac3".into()),
                channels: Some(6),
            },
        }),
        ..BuildInputs::default()
    }
}

fn channel_metadata() -> StreamMetadata {
    StreamMetadata {
        service_provider: Some("tvpipe".into()),
        service_name: Some("Channel 1".into()),
        do_not_map_metadata: true,
        ..StreamMetadata::default()
    }
}

fn copy_settings() -> CopyProfile {
    CopyProfile {
        metadata: channel_metadata(),
        ..CopyProfile::default()
    }
}
