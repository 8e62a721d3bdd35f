//! Turns inputs and an output profile into a compiled pipeline.
//!
//! The builder decides which steps to use and in what order; the
//! [`Assembler`] then replays the same steps to check every transition
//! and to collect the arguments.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::assembler::{Assembler, Attachment, CompiledPipeline, FilterSlot};
use crate::capabilities::{AccelPolicy, HardwareCapabilities};
use crate::catalog::audio::{
    AudioBitrate, AudioBufferSize, AudioChannels, AudioPad, AudioResample, AudioSampleRate,
    LoudnessNormalization,
};
use crate::catalog::decoder::{AccelerationInit, Decoder};
use crate::catalog::encoder::AudioEncoder;
use crate::catalog::environment::{FfReport, LibvaDriver};
use crate::catalog::filter::{
    FilterBackend, FilterOp, HardwareUpload, ImageScaleFilter, SubtitlesFilter,
};
use crate::catalog::option::{
    ConcatInputFormat, ContainerFormat, CopyTimestamps, DoNotIgnoreLoop, FileOutput, FrameRate,
    GraphicsEngineInputFormat, InfiniteLoop, MetadataOption, OutputTsOffset, Readrate,
    SceneDetect, SimpleVideoFilter, StaticOption, StreamSeek, ThreadCount, TimeLimit,
    VideoBitrate, VideoBufferSize, VideoTrackTimescale,
};
use crate::catalog::overlay::{
    AlphaFormat, OverlayFilter, OverlayKind, WatermarkFade, WatermarkOpacity, WatermarkScale,
};
use crate::error::PipelineError;
use crate::format::{AudioFormat, HardwareAccelerationMode, PixelFormat, VideoFormat};
use crate::graph::placement::Margins;
use crate::graph::{FilterGraphBuilder, StreamRef};
use crate::input::{
    BuildInputs, ConcatInput, SubtitleInput, SubtitleKind, SubtitleMethod, WatermarkInput,
};
use crate::observability::{BuildKind, MetricsCollector};
use crate::profile::{CopyProfile, OutputProfile, ScalingMode, WatermarkMode, WatermarkSettings};
use crate::selection::{
    DecoderContext, VideoChain, plan_pixel_format, resolve_acceleration, select_decoder,
    select_encoder,
};
use crate::state::{EngineState, FrameState, OutputFormat, StreamMetadata};
use crate::step::{InputKind, PipelineStep};
use crate::watermark::{fade_filters, fade_points};

const NON_REALTIME_BURST: u32 = 180;
const DEFAULT_GRAPHICS_FRAME_RATE: &str = "30";

#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    capabilities: HardwareCapabilities,
    metrics: MetricsCollector,
}

impl PipelineBuilder {
    pub fn new(capabilities: HardwareCapabilities) -> Self {
        Self {
            capabilities,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn capabilities(&self) -> &HardwareCapabilities {
        &self.capabilities
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    /// Transcode pipeline for `inputs` producing `profile`.
    #[instrument(skip_all, fields(mode = %profile.acceleration, codec = %profile.video_format))]
    pub fn build(
        &self,
        inputs: &BuildInputs,
        profile: &OutputProfile,
    ) -> Result<CompiledPipeline, PipelineError> {
        let _timer = self.metrics.start_build(BuildKind::Transcode);
        self.observe(self.transcode(inputs, profile))
    }

    /// [`build`](Self::build) with a caller-side policy for hardware
    /// failures.
    pub fn build_with_policy(
        &self,
        inputs: &BuildInputs,
        profile: &OutputProfile,
        policy: AccelPolicy,
    ) -> Result<CompiledPipeline, PipelineError> {
        if !profile.acceleration.is_hardware() {
            return self.build(inputs, profile);
        }
        match policy {
            AccelPolicy::SoftwareOnly => self.build(inputs, &software(profile)),
            AccelPolicy::Strict => self.build(inputs, profile),
            AccelPolicy::Fallback => match self.build(inputs, profile) {
                Err(error) if error.is_hardware_related() => {
                    warn!(
                        mode = %profile.acceleration,
                        error = %error,
                        "Hardware build failed; retrying without acceleration"
                    );
                    self.metrics.record_fallback();
                    self.build(inputs, &software(profile))
                }
                other => other,
            },
        }
    }

    /// Loops a concat playlist and copies its streams into MPEG-TS.
    #[instrument(skip_all, fields(url = %input.url))]
    pub fn concat(
        &self,
        input: &ConcatInput,
        profile: &CopyProfile,
    ) -> Result<CompiledPipeline, PipelineError> {
        let _timer = self.metrics.start_build(BuildKind::Concat);
        let mut assembler = Assembler::new();
        push_standard_globals(&mut assembler);

        let index = assembler.add_input(input.url.clone(), InputKind::Concat);
        assembler.push(ConcatInputFormat, Attachment::Input(index));
        assembler.push(Readrate::realtime(), Attachment::Input(index));
        assembler.push(InfiniteLoop, Attachment::Input(index));

        assembler.push(StaticOption::no_demux_decode_delay(), Attachment::Pipeline);
        assembler.push(StaticOption::fast_start(), Attachment::Pipeline);
        assembler.push(StaticOption::closed_gop(), Attachment::Pipeline);
        if let Some(threads) = profile.thread_count {
            assembler.insert(0, ThreadCount(threads), Attachment::Pipeline);
        }
        if let Some(directory) = &profile.save_report {
            assembler.push(
                FfReport {
                    directory: directory.clone(),
                },
                Attachment::Pipeline,
            );
        }
        assembler.push(SceneDetect(0), Attachment::Pipeline);
        assembler.push(StaticOption::copy_all(), Attachment::Pipeline);
        assembler.push(StaticOption::do_not_map_metadata(), Attachment::Pipeline);
        for option in metadata_options(&profile.metadata) {
            assembler.push(option, Attachment::Pipeline);
        }
        assembler.push(
            ContainerFormat::MpegTs {
                initial_discontinuity: true,
            },
            Attachment::Pipeline,
        );
        assembler.push(StaticOption::pipe(), Attachment::Pipeline);

        self.observe(assembler.assemble(FrameState::default()))
    }

    /// Re-muxes a segmented stream into a continuous MPEG-TS.
    #[instrument(skip_all, fields(url = %input.url))]
    pub fn wrap_segmenter(
        &self,
        input: &ConcatInput,
        profile: &CopyProfile,
    ) -> Result<CompiledPipeline, PipelineError> {
        let _timer = self.metrics.start_build(BuildKind::Segmenter);
        let mut assembler = Assembler::new();
        assembler.push(StaticOption::no_standard_input(), Attachment::Pipeline);
        assembler.push(ThreadCount(1), Attachment::Pipeline);
        assembler.push(StaticOption::hide_banner(), Attachment::Pipeline);
        assembler.push(StaticOption::loglevel_error(), Attachment::Pipeline);
        assembler.push(StaticOption::no_stats(), Attachment::Pipeline);
        assembler.push(StaticOption::standard_format_flags(), Attachment::Pipeline);
        if let Some(directory) = &profile.save_report {
            assembler.push(
                FfReport {
                    directory: directory.clone(),
                },
                Attachment::Pipeline,
            );
        }

        let index = assembler.add_input(input.url.clone(), InputKind::Video);
        assembler.push(Readrate::realtime(), Attachment::Input(index));

        assembler.push(StaticOption::map_all_streams(), Attachment::Pipeline);
        assembler.push(StaticOption::copy_all(), Attachment::Pipeline);
        for option in metadata_options(&profile.metadata) {
            assembler.push(option, Attachment::Pipeline);
        }
        assembler.push(
            ContainerFormat::MpegTs {
                initial_discontinuity: false,
            },
            Attachment::Pipeline,
        );
        assembler.push(StaticOption::pipe(), Attachment::Pipeline);

        self.observe(assembler.assemble(FrameState::default()))
    }

    /// Scales a still image into `output`, keeping its aspect ratio.
    #[instrument(skip_all, fields(input = %input.display()))]
    pub fn resize(
        &self,
        input: &Path,
        output: &Path,
        width: Option<u32>,
        height: Option<u32>,
    ) -> Result<CompiledPipeline, PipelineError> {
        let _timer = self.metrics.start_build(BuildKind::Resize);
        if width.is_none() && height.is_none() {
            return self.observe(Err(PipelineError::InvalidRequest(
                "resize needs a width or a height".to_string(),
            )));
        }

        let mut assembler = Assembler::new();
        assembler.push(StaticOption::no_standard_input(), Attachment::Pipeline);
        assembler.push(StaticOption::hide_banner(), Attachment::Pipeline);
        assembler.push(StaticOption::no_stats(), Attachment::Pipeline);
        assembler.push(StaticOption::loglevel_error(), Attachment::Pipeline);
        assembler.add_input(input.to_string_lossy(), InputKind::Video);

        let scale = ImageScaleFilter { width, height };
        assembler.push(
            SimpleVideoFilter(scale.filter().into_iter().collect()),
            Attachment::Pipeline,
        );
        assembler.push(FileOutput(output.to_path_buf()), Attachment::Pipeline);

        self.observe(assembler.assemble(FrameState::default()))
    }

    fn observe(
        &self,
        result: Result<CompiledPipeline, PipelineError>,
    ) -> Result<CompiledPipeline, PipelineError> {
        match &result {
            Ok(compiled) => debug!(steps = compiled.steps.len(), "Pipeline compiled"),
            Err(error) => self.metrics.record_failure(error.reason()),
        }
        result
    }

    fn transcode(
        &self,
        inputs: &BuildInputs,
        profile: &OutputProfile,
    ) -> Result<CompiledPipeline, PipelineError> {
        let video = inputs.video.as_ref().ok_or_else(|| {
            PipelineError::InvalidRequest("a transcode build needs a video input".to_string())
        })?;
        let target = profile.size();
        if target.width == 0 || target.height == 0 {
            return Err(PipelineError::InvalidRequest(format!(
                "output size {target} is empty"
            )));
        }

        if profile.pixel_format.is_some_and(|pf| !pf.is_known()) {
            return Err(PipelineError::InvalidRequest(
                "output pixel format is not a known engine format".to_string(),
            ));
        }

        let source = &video.stream;
        let copy = profile.is_copy();
        let desired_format = profile
            .pixel_format
            .or(source.pixel_format.filter(PixelFormat::is_known))
            .map(PixelFormat::without_surface)
            .unwrap_or(PixelFormat::YUV420P);

        let resolved = resolve_acceleration(
            profile.acceleration,
            (&source.codec, source.bit_depth()),
            (&profile.video_format, desired_format.bit_depth()),
            &self.capabilities,
        )?;

        let scaled = match profile.scaling {
            ScalingMode::Pad => source.size().fit_within(target),
            ScalingMode::Stretch => target,
        };
        let needs_scale = !copy && source.size() != scaled;
        let needs_pad = !copy && profile.scaling == ScalingMode::Pad && scaled != target;
        let deinterlace = !copy && profile.deinterlace && source.interlaced;

        let subtitle = inputs.subtitle.as_ref();
        let burned = |kind: SubtitleKind| {
            subtitle.filter(|s| !copy && s.method == SubtitleMethod::Burn && s.kind == kind)
        };
        let burn_text = burned(SubtitleKind::Text);
        let burn_image = burned(SubtitleKind::Image);
        let copied_subtitle = subtitle.filter(|s| s.method == SubtitleMethod::Copy);

        let watermark = if copy {
            None
        } else {
            self.plan_watermark(inputs.watermark.as_ref(), profile)?
        };
        let graphics = inputs.graphics.as_ref().filter(|_| !copy);
        if copy && (inputs.watermark.is_some() || inputs.graphics.is_some() || burned_any(subtitle)) {
            debug!("Video is copied; overlays and burned subtitles are skipped");
        }

        let decoder = if copy {
            None
        } else {
            let context = DecoderContext {
                deinterlace,
                has_watermark: watermark.is_some(),
                has_subtitle: burn_text.is_some() || burn_image.is_some(),
                scaling: needs_scale || needs_pad,
            };
            Some(select_decoder(
                resolved.decoder_mode,
                &source.codec,
                source.pixel_format,
                context,
                &self.capabilities,
            )?)
        };
        let encoder = select_encoder(
            resolved.encoder_mode,
            &profile.video_format,
            desired_format.bit_depth(),
            &self.capabilities,
        )?;
        if let Some(decoder) = &decoder {
            self.metrics.record_selection("decoder", &decoder.label());
        }
        self.metrics.record_selection("encoder", encoder.label());

        let engine = self.engine_state(decoder.as_ref(), encoder.mode(), profile);
        let device_mode = if engine.decoder_mode.is_hardware() {
            engine.decoder_mode
        } else {
            engine.encoder_mode
        };

        let initial = FrameState {
            pixel_format: source.pixel_format,
            video_format: source.codec.clone(),
            scaled_size: source.size(),
            padded_size: source.size(),
            frame_rate: source.frame_rate.clone(),
            realtime: profile.realtime,
            ..FrameState::default()
        };

        let mut assembler = Assembler::new();
        push_standard_globals(&mut assembler);
        assembler.push(StaticOption::no_demux_decode_delay(), Attachment::Pipeline);
        if engine.output_format == OutputFormat::Mp4 {
            assembler.push(StaticOption::fragmented_mp4(), Attachment::Pipeline);
        } else {
            assembler.push(StaticOption::fast_start(), Attachment::Pipeline);
        }
        assembler.push(StaticOption::closed_gop(), Attachment::Pipeline);
        if !copy {
            assembler.push(StaticOption::no_b_frames(), Attachment::Pipeline);
        }

        let start = profile.start();
        let thread_count = if engine.uses_hardware() || (profile.realtime && start.is_some()) {
            Some(1)
        } else {
            engine.thread_count
        };
        if let Some(threads) = thread_count {
            info!(threads, "Limiting engine threads");
            assembler.insert(0, ThreadCount(threads), Attachment::Pipeline);
        }

        let disable_scene_detect = source.codec == VideoFormat::Mpeg2Video
            || profile.video_format == VideoFormat::Mpeg2Video
            || engine.decoder_mode == HardwareAccelerationMode::VideoToolbox;
        let threshold = if disable_scene_detect {
            SceneDetect::DISABLED
        } else {
            0
        };
        assembler.push(SceneDetect(threshold), Attachment::Pipeline);

        if let Some(directory) = &engine.save_report {
            assembler.push(
                FfReport {
                    directory: directory.clone(),
                },
                Attachment::Pipeline,
            );
        }

        let video_index = assembler.add_input(video.path.to_string_lossy(), InputKind::Video);
        let audio = inputs.audio.as_ref().map(|audio| {
            let index = assembler.add_input(audio.path.to_string_lossy(), InputKind::Audio);
            (index, audio)
        });
        let separate_audio = audio
            .map(|(index, _)| index)
            .filter(|index| *index != video_index);

        if let Some(start) = start {
            assembler.push(StreamSeek(start), Attachment::Input(video_index));
            if let Some(index) = separate_audio {
                assembler.push(StreamSeek(start), Attachment::Input(index));
            }
            if burn_text.is_some() {
                assembler.push(CopyTimestamps, Attachment::Input(video_index));
            }
        }
        if let Some(finish) = profile.finish() {
            assembler.push(TimeLimit(finish), Attachment::Pipeline);
        }
        if copied_subtitle.is_some() {
            assembler.push(StaticOption::copy_subtitles(), Attachment::Pipeline);
        }

        if device_mode.is_hardware() {
            let hardware_decode = decoder.as_ref().is_some_and(Decoder::is_hardware)
                && matches!(
                    device_mode,
                    HardwareAccelerationMode::Nvenc
                        | HardwareAccelerationMode::Qsv
                        | HardwareAccelerationMode::Vaapi
                        | HardwareAccelerationMode::VideoToolbox
                );
            assembler.push(
                AccelerationInit {
                    mode: device_mode,
                    hardware_decode,
                    vaapi_device: engine.vaapi_device.clone(),
                },
                Attachment::Pipeline,
            );
            if device_mode == HardwareAccelerationMode::Vaapi
                && let Some(driver) = &engine.vaapi_driver
            {
                assembler.push(LibvaDriver(driver.clone()), Attachment::Pipeline);
            }
        }

        let decoded = match &decoder {
            Some(decoder) => {
                assembler.push(decoder.clone(), Attachment::Input(video_index));
                decoder.next_state(&initial)
            }
            None => initial.clone(),
        };

        if source.still_image {
            assembler.push(InfiniteLoop, Attachment::Input(video_index));
        }

        let burst = if profile.realtime {
            profile.audio.normalize_loudness.realtime_burst()
        } else {
            NON_REALTIME_BURST
        };
        let readrate = Readrate {
            initial_burst: burst,
            supports_initial_burst: engine.supports_readrate_initial_burst,
        };
        assembler.push(readrate, Attachment::Input(video_index));
        if let Some(index) = separate_audio {
            assembler.push(readrate, Attachment::Input(index));
        }

        if profile.infinite_loop {
            if let Some(index) = separate_audio {
                assembler.push(InfiniteLoop, Attachment::Input(index));
            }
            if !source.still_image {
                assembler.push(InfiniteLoop, Attachment::Input(video_index));
            }
        }

        if !copy {
            if let Some(rate) = &profile.frame_rate {
                assembler.push(FrameRate(rate.clone()), Attachment::Pipeline);
            }
            if let Some(timescale) = profile.timescale {
                assembler.push(VideoTrackTimescale(timescale), Attachment::Pipeline);
            }
            if let Some(bitrate) = profile.bitrate {
                assembler.push(VideoBitrate(bitrate), Attachment::Pipeline);
            }
            if let Some(buffer) = profile.buffer_size {
                assembler.push(VideoBufferSize(buffer), Attachment::Pipeline);
            }
        }

        let mut layers: Vec<(OverlayKind, StreamRef)> = Vec::new();
        let composited = if copy {
            decoded
        } else {
            let mut chain = VideoChain::new(decoded);
            if deinterlace {
                chain.deinterlace();
            }
            if needs_scale {
                chain.scale(scaled);
            }
            if needs_pad {
                chain.pad(target);
            }
            if let Some(subtitle) = burn_text {
                chain.burn_subtitles(SubtitlesFilter {
                    path: subtitle.path.clone(),
                    stream_index: subtitle.subtitle_ordinal,
                    fonts_dir: subtitle.fonts_dir.clone(),
                });
            }
            let has_layers = burn_image.is_some() || watermark.is_some() || graphics.is_some();
            let backend = if has_layers {
                chain.backend_for(FilterOp::Overlay)
            } else {
                FilterBackend::Software
            };
            let (steps, state) = chain.into_steps();
            for step in steps {
                assembler.push_boxed(step, Attachment::Filter(FilterSlot::Video));
            }

            let upload = if backend.is_hardware() {
                Some(HardwareUpload::for_mode(state.hardware_acceleration_mode)?)
            } else {
                None
            };
            let mut layer = LayerContext {
                assembler: &mut assembler,
                layers: &mut layers,
                backend,
                upload,
            };

            if let Some(subtitle) = burn_image {
                let index = layer
                    .assembler
                    .add_input(subtitle.path.to_string_lossy(), InputKind::Subtitle);
                let slot = layer.begin(OverlayKind::ImageSubtitle, StreamRef::new(index, subtitle.stream_index));
                if needs_scale || needs_pad {
                    layer.source(slot, ImageScaleFilter::to_size(target));
                }
                layer.finish(slot, OverlayKind::ImageSubtitle, OverlayFilter::CENTERED.to_string());
            }

            if let Some(plan) = &watermark {
                let index = layer
                    .assembler
                    .add_input(plan.input.path.to_string_lossy(), InputKind::Watermark);
                if plan.input.animated {
                    layer.assembler.push(DoNotIgnoreLoop, Attachment::Input(index));
                } else if !plan.fades.is_empty() {
                    layer.assembler.push(InfiniteLoop, Attachment::Input(index));
                }
                let slot = layer.begin(
                    OverlayKind::Watermark,
                    StreamRef::new(index, plan.input.stream_index),
                );
                let settings = &plan.settings;
                let content = settings.within_content.then_some(state.scaled_size);
                layer.alpha(slot);
                // size follows the canvas; only the margins follow the content
                if settings.width_percent > 0.0 {
                    layer.source(
                        slot,
                        WatermarkScale {
                            width_percent: settings.width_percent,
                            frame_width: target.width,
                        },
                    );
                }
                if settings.opacity < 100.0 {
                    layer.source(
                        slot,
                        WatermarkOpacity {
                            percent: settings.opacity,
                        },
                    );
                }
                for fade in &plan.fades {
                    layer.source(slot, *fade);
                }
                let margins = Margins::from_percent(
                    settings.horizontal_margin_percent,
                    settings.vertical_margin_percent,
                    target,
                    content,
                );
                layer.finish(slot, OverlayKind::Watermark, settings.location.position(margins));
            }

            if let Some(graphics) = graphics {
                let index = layer
                    .assembler
                    .add_input(graphics.path.to_string_lossy(), InputKind::GraphicsEngine);
                let frame_rate = profile
                    .frame_rate
                    .clone()
                    .or_else(|| source.frame_rate.clone())
                    .unwrap_or_else(|| DEFAULT_GRAPHICS_FRAME_RATE.to_string());
                layer.assembler.push(
                    GraphicsEngineInputFormat {
                        size: target,
                        frame_rate,
                    },
                    Attachment::Input(index),
                );
                let slot = layer.begin(OverlayKind::Graphics, StreamRef::new(index, 0));
                if layer.upload.is_some() {
                    layer.alpha(slot);
                }
                layer.finish(slot, OverlayKind::Graphics, OverlayFilter::CENTERED.to_string());
            }

            state
        };

        let plan = plan_pixel_format(&composited, desired_format, &encoder)?;
        for step in plan.filters {
            assembler.push_boxed(step, Attachment::Filter(FilterSlot::PixelFormat));
        }
        if let Some(output) = plan.output {
            assembler.push(output, Attachment::Pipeline);
        }
        assembler.push(encoder.clone(), Attachment::Pipeline);

        if profile.pts_offset > 0
            && let Some(timescale) = profile.timescale
        {
            assembler.push(
                OutputTsOffset {
                    pts_offset: profile.pts_offset,
                    timescale,
                },
                Attachment::Pipeline,
            );
        }

        let audio_format = if audio.is_some() {
            profile.audio.format
        } else {
            AudioFormat::Copy
        };
        assembler.push(AudioEncoder(audio_format), Attachment::Pipeline);
        if let Some((_, audio)) = audio
            && audio_format != AudioFormat::Copy
        {
            let settings = &profile.audio;
            if let Some(channels) =
                AudioChannels::required(audio_format, audio.stream.channels, settings.channels)
            {
                assembler.push(channels, Attachment::Pipeline);
            }
            if let Some(bitrate) = settings.bitrate {
                assembler.push(AudioBitrate(bitrate), Attachment::Pipeline);
            }
            if let Some(buffer) = settings.buffer_size {
                assembler.push(AudioBufferSize(buffer), Attachment::Pipeline);
            }
            if let Some(rate) = settings.sample_rate {
                assembler.push(AudioSampleRate(rate), Attachment::Pipeline);
            }

            let slot = Attachment::Filter(FilterSlot::Audio);
            assembler.push(AudioResample, slot);
            if settings.normalize_loudness != LoudnessNormalization::None {
                assembler.push(settings.normalize_loudness, slot);
            }
            if let Some(pad) = settings
                .pad_duration
                .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
            {
                assembler.push(AudioPad(Duration::from_secs_f64(pad)), slot);
            }
        }

        if engine.metadata.do_not_map_metadata {
            assembler.push(StaticOption::do_not_map_metadata(), Attachment::Pipeline);
        }
        for option in metadata_options(&engine.metadata) {
            assembler.push(option, Attachment::Pipeline);
        }
        push_container(&mut assembler, &engine.output_format, profile, source.frame_rate.clone());

        let mut graph = FilterGraphBuilder::new().video(
            StreamRef::new(video_index, source.index),
            assembler.filters(FilterSlot::Video),
        );
        graph = match audio {
            Some((index, audio)) => graph.audio(
                StreamRef::new(index, audio.stream.index),
                assembler.filters(FilterSlot::Audio),
            ),
            None => graph.audio_fallback(format!("{video_index}:a")),
        };
        for (slot, (kind, source)) in layers.iter().enumerate() {
            let overlay = assembler.filters(FilterSlot::LayerOverlay(slot)).join(",");
            graph = graph.layer(
                *kind,
                *source,
                assembler.filters(FilterSlot::LayerSource(slot)),
                overlay,
            );
        }
        graph = graph.pixel_format(assembler.filters(FilterSlot::PixelFormat));
        if let Some(subtitle) = copied_subtitle {
            let index = assembler.add_input(subtitle.path.to_string_lossy(), InputKind::Subtitle);
            graph = graph.copy_subtitle(StreamRef::new(index, subtitle.stream_index));
        }
        assembler.push(graph.build(), Attachment::Pipeline);

        let compiled = assembler.assemble(initial)?;
        info!(
            decoder = %decoder.as_ref().map(Decoder::label).unwrap_or_else(|| "none".to_string()),
            encoder = encoder.label(),
            state = %compiled.final_state.describe(),
            "Transcode pipeline compiled"
        );
        Ok(compiled)
    }

    fn engine_state(
        &self,
        decoder: Option<&Decoder>,
        encoder_mode: HardwareAccelerationMode,
        profile: &OutputProfile,
    ) -> EngineState {
        let decoder_mode = decoder
            .map(Decoder::mode)
            .filter(|mode| mode.is_hardware())
            .unwrap_or_default();
        let vaapi = self.capabilities.accelerator(HardwareAccelerationMode::Vaapi);
        EngineState {
            decoder_mode,
            encoder_mode,
            thread_count: profile.thread_count,
            save_report: profile.save_report.clone(),
            metadata: profile.metadata.clone(),
            output_format: profile.output.clone(),
            vaapi_device: vaapi.and_then(|support| support.device.clone()),
            vaapi_driver: vaapi.and_then(|support| support.driver.clone()),
            supports_readrate_initial_burst: self.capabilities.readrate_initial_burst,
        }
    }

    fn plan_watermark<'a>(
        &self,
        input: Option<&'a WatermarkInput>,
        profile: &OutputProfile,
    ) -> Result<Option<WatermarkPlan<'a>>, PipelineError> {
        let Some(input) = input else {
            return Ok(None);
        };
        let settings = profile.watermark.clone().unwrap_or_default();
        let fades = match settings.mode {
            WatermarkMode::Permanent => Vec::new(),
            WatermarkMode::Intermittent {
                frequency_minutes,
                duration_seconds,
            } => {
                let (Some(item_start), Some(item_length)) =
                    (profile.item_start, profile.item_duration)
                else {
                    return Err(PipelineError::InvalidRequest(
                        "an intermittent watermark needs item_start and item_duration".to_string(),
                    ));
                };
                let points = fade_points(item_start, item_length, frequency_minutes, duration_seconds);
                if points.is_empty() {
                    info!(
                        frequency_minutes,
                        item_length, "Watermark has no visible window in this item; omitting it"
                    );
                    return Ok(None);
                }
                fade_filters(&points, item_length)
            }
        };
        Ok(Some(WatermarkPlan {
            input,
            settings,
            fades,
        }))
    }
}

#[derive(Debug)]
struct WatermarkPlan<'a> {
    input: &'a WatermarkInput,
    settings: WatermarkSettings,
    fades: Vec<WatermarkFade>,
}

/// Pushes the source and overlay steps of overlay layers.
struct LayerContext<'a> {
    assembler: &'a mut Assembler,
    layers: &'a mut Vec<(OverlayKind, StreamRef)>,
    backend: FilterBackend,
    upload: Option<HardwareUpload>,
}

impl LayerContext<'_> {
    fn begin(&mut self, kind: OverlayKind, source: StreamRef) -> usize {
        self.layers.push((kind, source));
        self.layers.len() - 1
    }

    fn source(&mut self, slot: usize, step: impl PipelineStep + 'static) {
        self.assembler
            .push(step, Attachment::Filter(FilterSlot::LayerSource(slot)));
    }

    fn alpha(&mut self, slot: usize) {
        self.source(slot, AlphaFormat);
    }

    /// Uploads the layer when the overlay runs on the device, then
    /// composites it.
    fn finish(&mut self, slot: usize, kind: OverlayKind, position: String) {
        if let Some(upload) = self.upload {
            if kind == OverlayKind::ImageSubtitle {
                self.alpha(slot);
            }
            self.source(slot, upload);
        }
        self.assembler.push(
            OverlayFilter::new(self.backend, kind, position),
            Attachment::Filter(FilterSlot::LayerOverlay(slot)),
        );
    }
}

fn burned_any(subtitle: Option<&SubtitleInput>) -> bool {
    subtitle.is_some_and(|s| s.method == SubtitleMethod::Burn)
}

fn software(profile: &OutputProfile) -> OutputProfile {
    OutputProfile {
        acceleration: HardwareAccelerationMode::None,
        ..profile.clone()
    }
}

fn push_standard_globals(assembler: &mut Assembler) {
    assembler.push(StaticOption::no_standard_input(), Attachment::Pipeline);
    assembler.push(StaticOption::hide_banner(), Attachment::Pipeline);
    assembler.push(StaticOption::no_stats(), Attachment::Pipeline);
    assembler.push(StaticOption::loglevel_error(), Attachment::Pipeline);
    assembler.push(StaticOption::standard_format_flags(), Attachment::Pipeline);
}

fn metadata_options(metadata: &StreamMetadata) -> Vec<MetadataOption> {
    let mut options = Vec::new();
    if let Some(provider) = &metadata.service_provider {
        options.push(MetadataOption::ServiceProvider(provider.clone()));
    }
    if let Some(name) = &metadata.service_name {
        options.push(MetadataOption::ServiceName(name.clone()));
    }
    if let Some(language) = &metadata.audio_language {
        options.push(MetadataOption::AudioLanguage(language.clone()));
    }
    if let Some(language) = &metadata.subtitle_language {
        options.push(MetadataOption::SubtitleLanguage(language.clone()));
    }
    if let Some(title) = &metadata.subtitle_title {
        options.push(MetadataOption::SubtitleTitle(title.clone()));
    }
    options
}

fn push_container(
    assembler: &mut Assembler,
    output: &OutputFormat,
    profile: &OutputProfile,
    source_frame_rate: Option<String>,
) {
    let container = match output {
        OutputFormat::MpegTs => ContainerFormat::MpegTs {
            initial_discontinuity: true,
        },
        OutputFormat::Mp4 => ContainerFormat::Mp4,
        OutputFormat::Mkv => ContainerFormat::Mkv,
        OutputFormat::Hls {
            playlist,
            segment_template,
        } => ContainerFormat::Hls {
            frame_rate: profile.frame_rate.clone().or(source_frame_rate),
            playlist: playlist.clone(),
            segment_template: segment_template.clone(),
        },
    };
    let is_hls = matches!(container, ContainerFormat::Hls { .. });
    assembler.push(container, Attachment::Pipeline);
    if !is_hls {
        assembler.push(StaticOption::pipe(), Attachment::Pipeline);
    }
}
