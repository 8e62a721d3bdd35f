use std::collections::BTreeSet;
use std::path::PathBuf;

use tvpipe::capabilities::HardwareCapabilities;
use tvpipe::format::{FrameSize, HardwareAccelerationMode, PixelFormat, VideoFormat};
use tvpipe::graph::placement::WatermarkLocation;
use tvpipe::input::{
    BuildInputs, GraphicsInput, SubtitleInput, SubtitleKind, SubtitleMethod, VideoInput,
    VideoStreamInfo, WatermarkInput,
};
use tvpipe::profile::{OutputProfile, WatermarkMode, WatermarkSettings};
use tvpipe::{CompiledPipeline, PipelineBuilder};

fn video(width: u32, height: u32) -> VideoInput {
    VideoInput {
        path: PathBuf::from("/media/show.mkv"),
        stream: VideoStreamInfo {
            index: 0,
            codec: VideoFormat::H264,
            pixel_format: Some(PixelFormat::YUV420P),
            width,
            height,
            frame_rate: Some("30".to_string()),
            interlaced: false,
            still_image: false,
        },
    }
}

fn logo() -> WatermarkInput {
    WatermarkInput {
        path: PathBuf::from("/media/logo.png"),
        stream_index: 0,
        animated: false,
    }
}

fn corner_watermark(margin: f64) -> WatermarkSettings {
    WatermarkSettings {
        location: WatermarkLocation::TopLeft,
        horizontal_margin_percent: margin,
        vertical_margin_percent: margin,
        ..WatermarkSettings::default()
    }
}

fn expression(compiled: &CompiledPipeline) -> String {
    let position = compiled
        .filter_options
        .iter()
        .position(|option| option == "-filter_complex")
        .expect("filter_complex present");
    compiled.filter_options[position + 1].clone()
}

fn source_labels(expression: &str) -> BTreeSet<String> {
    expression
        .split('[')
        .skip(1)
        .filter_map(|chunk| chunk.split_once(']').map(|(label, _)| label.to_string()))
        .filter(|label| label.contains(':'))
        .collect()
}

#[test]
fn watermark_and_graphics_share_one_output() {
    let builder = PipelineBuilder::new(HardwareCapabilities::software());
    let inputs = BuildInputs {
        video: Some(video(1280, 720)),
        watermark: Some(logo()),
        graphics: Some(GraphicsInput {
            path: PathBuf::from("pipe:0"),
        }),
        ..BuildInputs::default()
    };
    let mut profile = OutputProfile::new(VideoFormat::H264, FrameSize::new(1280, 720));
    profile.watermark = Some(corner_watermark(10.0));

    let compiled = builder.build(&inputs, &profile).unwrap();
    let expression = expression(&compiled);

    assert_eq!(compiled.inputs.len(), 3);
    assert_eq!(
        source_labels(&expression),
        BTreeSet::from(["0:0".to_string(), "1:0".to_string(), "2:0".to_string()])
    );
    assert!(expression.contains("overlay=x=128:y=72"), "{expression}");
    assert!(expression.contains("overlay=x=(W-w)/2:y=(H-h)/2"), "{expression}");

    let maps: Vec<&String> = compiled
        .filter_options
        .iter()
        .skip_while(|option| *option != "-map")
        .collect();
    assert_eq!(maps.iter().filter(|option| ***option == "-map").count(), 2);
    assert!(maps[1].starts_with('['));
    assert!(expression.ends_with(maps[1].as_str()));

    let graphics = &compiled.inputs[2];
    assert!(graphics.options.contains(&"rawvideo".to_string()));
}

#[test]
fn margins_double_with_the_frame() {
    let builder = PipelineBuilder::new(HardwareCapabilities::software());
    let build = |width: u32, height: u32| {
        let inputs = BuildInputs {
            video: Some(video(width, height)),
            watermark: Some(logo()),
            ..BuildInputs::default()
        };
        let mut profile = OutputProfile::new(VideoFormat::H264, FrameSize::new(width, height));
        profile.watermark = Some(corner_watermark(10.0));
        expression(&builder.build(&inputs, &profile).unwrap())
    };

    assert!(build(1280, 720).contains("overlay=x=128:y=72"));
    assert!(build(2560, 1440).contains("overlay=x=256:y=144"));
}

#[test]
fn watermark_within_content_follows_the_letterbox() {
    let builder = PipelineBuilder::new(HardwareCapabilities::software());
    let inputs = BuildInputs {
        video: Some(video(1920, 800)),
        watermark: Some(logo()),
        ..BuildInputs::default()
    };
    let mut profile = OutputProfile::new(VideoFormat::H264, FrameSize::new(1280, 720));
    profile.watermark = Some(WatermarkSettings {
        within_content: true,
        width_percent: 10.0,
        ..corner_watermark(10.0)
    });

    let expression = expression(&builder.build(&inputs, &profile).unwrap());
    // 532 rows of content centred in 720: 0.1 * 532 + 94
    assert!(expression.contains("overlay=x=128:y=147"), "{expression}");
    assert!(expression.contains("scale=128:-1"), "{expression}");
}

#[test]
fn pillarboxed_watermark_scales_with_the_canvas() {
    let builder = PipelineBuilder::new(HardwareCapabilities::software());
    let inputs = BuildInputs {
        video: Some(video(960, 720)),
        watermark: Some(logo()),
        ..BuildInputs::default()
    };
    let mut profile = OutputProfile::new(VideoFormat::H264, FrameSize::new(1280, 720));
    profile.watermark = Some(WatermarkSettings {
        within_content: true,
        width_percent: 10.0,
        ..corner_watermark(10.0)
    });

    let expression = expression(&builder.build(&inputs, &profile).unwrap());
    assert!(expression.contains("scale=128:-1"), "{expression}");
    // 960 columns of content centred in 1280: 0.1 * 960 + 160
    assert!(expression.contains("overlay=x=256:y=72"), "{expression}");
}

#[test]
fn watermark_gains_alpha_before_opacity() {
    let builder = PipelineBuilder::new(HardwareCapabilities::software());
    let inputs = BuildInputs {
        video: Some(video(1280, 720)),
        watermark: Some(WatermarkInput {
            path: PathBuf::from("/media/logo.jpg"),
            stream_index: 0,
            animated: false,
        }),
        ..BuildInputs::default()
    };
    let mut profile = OutputProfile::new(VideoFormat::H264, FrameSize::new(1280, 720));
    profile.watermark = Some(WatermarkSettings {
        opacity: 50.0,
        width_percent: 10.0,
        ..corner_watermark(5.0)
    });

    let expression = expression(&builder.build(&inputs, &profile).unwrap());
    assert!(
        expression.contains("[1:0]format=yuva420p,scale=128:-1,colorchannelmixer=aa=0.50[wm]"),
        "{expression}"
    );
}

#[test]
fn intermittent_watermark_fades_in_and_out() {
    let builder = PipelineBuilder::new(HardwareCapabilities::software());
    let inputs = BuildInputs {
        video: Some(video(1280, 720)),
        watermark: Some(logo()),
        ..BuildInputs::default()
    };
    let mut profile = OutputProfile::new(VideoFormat::H264, FrameSize::new(1280, 720));
    profile.watermark = Some(WatermarkSettings {
        mode: WatermarkMode::Intermittent {
            frequency_minutes: 15,
            duration_seconds: 10,
        },
        ..corner_watermark(5.0)
    });
    profile.item_start = "2026-03-01T10:05:00Z".parse().ok();
    profile.item_duration = Some(1800.0);

    let compiled = builder.build(&inputs, &profile).unwrap();
    let expression = expression(&compiled);
    assert!(expression.contains("fade=in"), "{expression}");
    assert!(expression.contains("fade=out"), "{expression}");
    assert!(compiled.inputs[1].options.contains(&"-stream_loop".to_string()));
}

#[test]
fn image_subtitles_overlay_before_watermarks() {
    let builder = PipelineBuilder::new(HardwareCapabilities::software());
    let inputs = BuildInputs {
        video: Some(video(1280, 720)),
        subtitle: Some(SubtitleInput {
            path: PathBuf::from("/media/show.mkv"),
            stream_index: 3,
            kind: SubtitleKind::Image,
            method: SubtitleMethod::Burn,
            subtitle_ordinal: None,
            fonts_dir: None,
        }),
        watermark: Some(logo()),
        ..BuildInputs::default()
    };
    let profile = OutputProfile::new(VideoFormat::H264, FrameSize::new(1280, 720));

    let compiled = builder.build(&inputs, &profile).unwrap();
    let expression = expression(&compiled);
    let subtitle = expression.find("[vst]").expect("subtitle overlay");
    let watermark = expression.find("[vwm]").expect("watermark overlay");
    assert!(subtitle < watermark, "{expression}");
    assert!(expression.contains("[0:3]"));
    assert_eq!(compiled.inputs.len(), 2);
}

#[test]
fn copied_video_skips_overlays() {
    let builder = PipelineBuilder::new(HardwareCapabilities::software());
    let inputs = BuildInputs {
        video: Some(video(1280, 720)),
        watermark: Some(logo()),
        ..BuildInputs::default()
    };
    let mut profile = OutputProfile::new(VideoFormat::Copy, FrameSize::new(1280, 720));
    profile.acceleration = HardwareAccelerationMode::None;
    profile.watermark = Some(corner_watermark(10.0));

    let compiled = builder.build(&inputs, &profile).unwrap();
    assert_eq!(compiled.inputs.len(), 1);
    assert!(!compiled.command_line().contains("overlay"));
}

#[test]
fn nvenc_watermarks_composite_on_the_device() {
    let builder = PipelineBuilder::new(HardwareCapabilities::nvidia((8, 6)));
    let inputs = BuildInputs {
        video: Some(video(1920, 1080)),
        watermark: Some(logo()),
        ..BuildInputs::default()
    };
    let mut profile = OutputProfile::new(VideoFormat::H264, FrameSize::new(1280, 720));
    profile.acceleration = HardwareAccelerationMode::Nvenc;
    profile.watermark = Some(corner_watermark(10.0));

    let compiled = builder.build(&inputs, &profile).unwrap();
    let expression = expression(&compiled);
    assert!(expression.contains("scale_cuda=1280:720"), "{expression}");
    assert!(expression.contains("hwupload_cuda"), "{expression}");
    assert!(expression.contains("overlay_cuda=x=128:y=72"), "{expression}");
    assert!(compiled.has_step("overlay-watermark-hardware"));
}
