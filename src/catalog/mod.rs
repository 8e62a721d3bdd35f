//! Every step the builders can place into a pipeline.

pub mod audio;
pub mod decoder;
pub mod encoder;
pub mod environment;
pub mod filter;
pub mod option;
pub mod overlay;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::format::{AudioFormat, FrameSize, HardwareAccelerationMode, PixelFormat, VideoFormat};
use crate::step::{BoxedStep, StepCategory};

use self::audio::{
    AudioBitrate, AudioBufferSize, AudioChannels, AudioPad, AudioResample, AudioSampleRate,
    LoudnessNormalization,
};
use self::decoder::{AccelerationInit, Decoder};
use self::encoder::{AudioEncoder, VideoEncoder};
use self::environment::{FfReport, LibvaDriver};
use self::filter::{
    DeinterlaceFilter, FilterBackend, HardwareDownload, HardwareUpload, ImageScaleFilter,
    PadFilter, PixelFormatFilter, ScaleFilter, SubtitlesFilter,
};
use self::option::*;
use self::overlay::{
    AlphaFormat, FadeDirection, OverlayFilter, OverlayKind, WatermarkFade, WatermarkOpacity,
    WatermarkScale,
};

/// Step names grouped by category, as shown by `tvpipe list-steps`.
pub fn known_steps() -> Vec<(StepCategory, &'static str)> {
    let mut steps: Vec<BoxedStep> = vec![
        Box::new(FfReport {
            directory: PathBuf::new(),
        }),
        Box::new(LibvaDriver(String::new())),
        Box::new(StaticOption::no_standard_input()),
        Box::new(StaticOption::hide_banner()),
        Box::new(StaticOption::no_stats()),
        Box::new(StaticOption::loglevel_error()),
        Box::new(StaticOption::standard_format_flags()),
        Box::new(ThreadCount(1)),
        Box::new(StreamSeek(Duration::ZERO)),
        Box::new(TimeLimit(Duration::ZERO)),
        Box::new(Readrate::realtime()),
        Box::new(InfiniteLoop),
        Box::new(ConcatInputFormat),
        Box::new(CopyTimestamps),
        Box::new(DoNotIgnoreLoop),
        Box::new(GraphicsEngineInputFormat {
            size: FrameSize::default(),
            frame_rate: String::new(),
        }),
        Box::new(StaticOption::no_demux_decode_delay()),
        Box::new(StaticOption::fast_start()),
        Box::new(StaticOption::fragmented_mp4()),
        Box::new(StaticOption::closed_gop()),
        Box::new(StaticOption::no_b_frames()),
        Box::new(StaticOption::map_all_streams()),
        Box::new(StaticOption::do_not_map_metadata()),
        Box::new(StaticOption::pipe()),
        Box::new(StaticOption::copy_all()),
        Box::new(StaticOption::copy_subtitles()),
        Box::new(VideoBitrate(0)),
        Box::new(VideoBufferSize(0)),
        Box::new(FrameRate(String::new())),
        Box::new(VideoTrackTimescale(0)),
        Box::new(SceneDetect(0)),
        Box::new(PixelFormatOutput(PixelFormat::YUV420P)),
        Box::new(OutputTsOffset {
            pts_offset: 0,
            timescale: 1,
        }),
        Box::new(FileOutput(PathBuf::new())),
        Box::new(SimpleVideoFilter(Vec::new())),
        Box::new(ContainerFormat::MpegTs {
            initial_discontinuity: true,
        }),
        Box::new(ContainerFormat::Mp4),
        Box::new(ContainerFormat::Mkv),
        Box::new(ContainerFormat::Hls {
            frame_rate: None,
            playlist: PathBuf::new(),
            segment_template: PathBuf::new(),
        }),
        Box::new(MetadataOption::ServiceProvider(String::new())),
        Box::new(MetadataOption::ServiceName(String::new())),
        Box::new(MetadataOption::AudioLanguage(String::new())),
        Box::new(MetadataOption::SubtitleLanguage(String::new())),
        Box::new(MetadataOption::SubtitleTitle(String::new())),
        Box::new(AccelerationInit {
            mode: HardwareAccelerationMode::None,
            hardware_decode: false,
            vaapi_device: None,
        }),
        Box::new(Decoder::implicit_software()),
        Box::new(VideoEncoder::copy()),
        Box::new(VideoEncoder::implicit()),
        Box::new(AudioEncoder(AudioFormat::Aac)),
        Box::new(AudioEncoder(AudioFormat::Ac3)),
        Box::new(AudioEncoder(AudioFormat::Copy)),
        Box::new(AudioChannels(2)),
        Box::new(AudioBitrate(0)),
        Box::new(AudioBufferSize(0)),
        Box::new(AudioSampleRate(0)),
        Box::new(AudioResample),
        Box::new(LoudnessNormalization::Loudnorm),
        Box::new(LoudnessNormalization::Dynaudnorm),
        Box::new(AudioPad(Duration::ZERO)),
        Box::new(PadFilter {
            size: FrameSize::default(),
        }),
        Box::new(HardwareDownload { format: None }),
        Box::new(SubtitlesFilter {
            path: PathBuf::new(),
            stream_index: None,
            fonts_dir: None,
        }),
        Box::new(ImageScaleFilter {
            width: None,
            height: None,
        }),
        Box::new(WatermarkScale {
            width_percent: 0.0,
            frame_width: 0,
        }),
        Box::new(WatermarkOpacity { percent: 100.0 }),
        Box::new(AlphaFormat),
    ];

    for format in VideoFormat::DECODABLE {
        steps.extend(Decoder::software(&format).map(|d| Box::new(d) as BoxedStep));
        steps.extend(Decoder::cuvid(&format).map(|d| Box::new(d) as BoxedStep));
        steps.extend(Decoder::qsv(&format).map(|d| Box::new(d) as BoxedStep));
        steps.extend(Decoder::rkmpp(&format).map(|d| Box::new(d) as BoxedStep));
        steps.extend(Decoder::v4l2m2m(&format).map(|d| Box::new(d) as BoxedStep));
        steps.extend(VideoEncoder::software(&format).map(|e| Box::new(e) as BoxedStep));
        for mode in HardwareAccelerationMode::ALL {
            steps.extend(VideoEncoder::hardware(mode, &format).map(|e| Box::new(e) as BoxedStep));
        }
    }

    for backend in FilterBackend::ALL {
        let size = FrameSize::default();
        steps.push(Box::new(ScaleFilter {
            backend,
            size,
            format: None,
        }));
        steps.push(Box::new(DeinterlaceFilter { backend }));
        steps.push(Box::new(PixelFormatFilter {
            backend,
            format: PixelFormat::YUV420P,
        }));
        for kind in [
            OverlayKind::ImageSubtitle,
            OverlayKind::Watermark,
            OverlayKind::Graphics,
        ] {
            steps.push(Box::new(OverlayFilter::new(backend, kind, "")));
        }
    }

    for mode in HardwareAccelerationMode::ALL {
        if let Ok(upload) = HardwareUpload::for_mode(mode) {
            steps.push(Box::new(upload));
        }
    }

    for direction in [FadeDirection::In, FadeDirection::Out] {
        steps.push(Box::new(WatermarkFade {
            direction,
            start: 0.0,
            enable_from: 0.0,
            enable_until: 0.0,
        }));
    }

    let unique: BTreeMap<(u8, &'static str), StepCategory> = steps
        .iter()
        .map(|step| ((category_rank(step.category()), step.name()), step.category()))
        .collect();
    unique
        .into_iter()
        .map(|((_, name), category)| (category, name))
        .collect()
}

fn category_rank(category: StepCategory) -> u8 {
    match category {
        StepCategory::Environment => 0,
        StepCategory::Global => 1,
        StepCategory::Input => 2,
        StepCategory::Decoder => 3,
        StepCategory::Filter => 4,
        StepCategory::Encoder => 5,
        StepCategory::Output => 6,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn listing_is_grouped_and_unique() {
        let steps = known_steps();
        assert_eq!(steps.first().map(|(c, _)| *c), Some(StepCategory::Environment));
        assert_eq!(steps.last().map(|(c, _)| *c), Some(StepCategory::Output));
        let names: BTreeSet<_> = steps.iter().map(|(_, name)| *name).collect();
        assert_eq!(names.len(), steps.len());
        assert!(names.contains("decoder-cuvid"));
        assert!(names.contains("hardware-upload-vaapi"));
    }
}
