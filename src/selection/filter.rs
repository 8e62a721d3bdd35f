//! Placement of video filters on hardware or software.

use crate::catalog::encoder::{LocationRequirement, VideoEncoder};
use crate::catalog::filter::{
    DeinterlaceFilter, FilterBackend, FilterOp, HardwareDownload, HardwareUpload, PadFilter,
    PixelFormatFilter, ScaleFilter, SubtitlesFilter,
};
use crate::catalog::option::PixelFormatOutput;
use crate::error::PipelineError;
use crate::format::{FrameDataLocation, FrameSize, PixelFormat};
use crate::state::FrameState;
use crate::step::{BoxedStep, PipelineStep};

/// The main video chain under construction, with the state it leaves
/// the frame in.
#[derive(Debug)]
pub struct VideoChain {
    state: FrameState,
    steps: Vec<BoxedStep>,
}

impl VideoChain {
    pub fn new(state: FrameState) -> Self {
        Self {
            state,
            steps: Vec::new(),
        }
    }

    pub fn state(&self) -> &FrameState {
        &self.state
    }

    fn push(&mut self, step: impl PipelineStep + 'static) {
        self.state = step.next_state(&self.state);
        self.steps.push(Box::new(step));
    }

    /// Backend that runs `op` on the current frame, downloading first
    /// when the frame is on a device without that filter.
    pub fn backend_for(&mut self, op: FilterOp) -> FilterBackend {
        if self.state.location != FrameDataLocation::Hardware {
            return FilterBackend::Software;
        }
        match FilterBackend::for_mode(self.state.hardware_acceleration_mode) {
            Some(backend) if backend.supports(op) => backend,
            _ => {
                self.download();
                FilterBackend::Software
            }
        }
    }

    pub fn download(&mut self) {
        if self.state.location == FrameDataLocation::Hardware {
            let download = HardwareDownload::from_state(&self.state);
            self.push(download);
        }
    }

    pub fn deinterlace(&mut self) {
        let backend = self.backend_for(FilterOp::Deinterlace);
        self.push(DeinterlaceFilter { backend });
    }

    pub fn scale(&mut self, size: FrameSize) {
        let backend = self.backend_for(FilterOp::Scale);
        self.push(ScaleFilter {
            backend,
            size,
            format: None,
        });
    }

    pub fn pad(&mut self, size: FrameSize) {
        self.backend_for(FilterOp::Pad);
        self.push(PadFilter { size });
    }

    pub fn burn_subtitles(&mut self, filter: SubtitlesFilter) {
        self.backend_for(FilterOp::Subtitles);
        self.push(filter);
    }

    pub fn into_steps(self) -> (Vec<BoxedStep>, FrameState) {
        (self.steps, self.state)
    }
}

/// Conversion between the composited frame and what the encoder takes.
#[derive(Debug, Default)]
pub struct PixelFormatPlan {
    /// Filters of the pixel format chain.
    pub filters: Vec<BoxedStep>,
    /// `-pix_fmt`, emitted before the encoder.
    pub output: Option<PixelFormatOutput>,
    pub state: FrameState,
}

impl PixelFormatPlan {
    fn push(&mut self, step: impl PipelineStep + 'static) {
        self.state = step.next_state(&self.state);
        self.filters.push(Box::new(step));
    }

    fn pix_fmt_if_needed(&mut self, desired: PixelFormat) {
        if self.state.pixel_format != Some(desired) {
            let output = PixelFormatOutput(desired);
            self.state = output.next_state(&self.state);
            self.output = Some(output);
        }
    }

    fn download(&mut self) {
        if self.state.location == FrameDataLocation::Hardware {
            let download = HardwareDownload::from_state(&self.state);
            self.push(download);
        }
    }
}

fn same_logical_format(current: Option<PixelFormat>, desired: PixelFormat) -> bool {
    current.is_some_and(|pf| pf.name() == desired.name())
}

/// Plans the pixel format conversion and the location transfer in front
/// of `encoder`.
pub fn plan_pixel_format(
    state: &FrameState,
    desired: PixelFormat,
    encoder: &VideoEncoder,
) -> Result<PixelFormatPlan, PipelineError> {
    let mut plan = PixelFormatPlan {
        state: state.clone(),
        ..PixelFormatPlan::default()
    };
    let Some(requirement) = encoder.requirement() else {
        return Ok(plan);
    };

    let on_device = plan.state.location == FrameDataLocation::Hardware;
    let foreign_device = on_device
        && encoder.mode().is_hardware()
        && encoder.mode() != plan.state.hardware_acceleration_mode;

    if (on_device && requirement == LocationRequirement::Software) || foreign_device {
        plan.download();
    }

    if plan.state.location == FrameDataLocation::Hardware {
        if !same_logical_format(plan.state.pixel_format, desired) {
            match FilterBackend::for_mode(plan.state.hardware_acceleration_mode) {
                Some(backend) => plan.push(PixelFormatFilter {
                    backend,
                    format: desired,
                }),
                None => {
                    plan.download();
                    plan.pix_fmt_if_needed(desired);
                }
            }
        }
        return Ok(plan);
    }

    if requirement == LocationRequirement::Hardware {
        if !same_logical_format(plan.state.pixel_format, desired) {
            plan.push(PixelFormatFilter::software(desired));
        }
        let upload = HardwareUpload::for_mode(encoder.mode())?.with_format(Some(desired));
        plan.push(upload);
    } else {
        plan.pix_fmt_if_needed(desired);
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{HardwareAccelerationMode, VideoFormat};

    fn on_device(mode: HardwareAccelerationMode, pf: PixelFormat) -> FrameState {
        FrameState {
            location: FrameDataLocation::Hardware,
            pixel_format: Some(pf.on_hardware()),
            hardware_acceleration_mode: mode,
            scaled_size: FrameSize::new(1920, 1080),
            padded_size: FrameSize::new(1920, 1080),
            ..FrameState::default()
        }
    }

    fn names(steps: &[BoxedStep]) -> Vec<String> {
        steps.iter().filter_map(|s| s.filter()).collect()
    }

    #[test]
    fn cuda_scales_on_device_but_pads_in_software() {
        let mut chain = VideoChain::new(on_device(
            HardwareAccelerationMode::Nvenc,
            PixelFormat::YUV420P,
        ));
        chain.scale(FrameSize::new(1280, 532));
        chain.pad(FrameSize::new(1280, 720));
        let (steps, state) = chain.into_steps();
        assert_eq!(
            names(&steps),
            vec![
                "scale_cuda=1280:532",
                "hwdownload,format=nv12",
                "pad=1280:720:-1:-1:color=black"
            ]
        );
        assert_eq!(state.location, FrameDataLocation::Software);
        assert_eq!(state.scaled_size, FrameSize::new(1280, 532));
        assert_eq!(state.padded_size, FrameSize::new(1280, 720));
    }

    #[test]
    fn videotoolbox_filters_download_first() {
        let mut chain = VideoChain::new(on_device(
            HardwareAccelerationMode::VideoToolbox,
            PixelFormat::YUV420P,
        ));
        chain.deinterlace();
        let (steps, _) = chain.into_steps();
        assert_eq!(names(&steps), vec!["hwdownload,format=nv12", "yadif=1"]);
    }

    #[test]
    fn software_encoder_downloads_and_converts() {
        let state = on_device(HardwareAccelerationMode::Nvenc, PixelFormat::YUV420P);
        let encoder = VideoEncoder::software(&VideoFormat::H264).unwrap();
        let plan = plan_pixel_format(&state, PixelFormat::YUV420P, &encoder).unwrap();
        assert_eq!(names(&plan.filters), vec!["hwdownload,format=nv12"]);
        assert_eq!(plan.output, Some(PixelFormatOutput(PixelFormat::YUV420P)));
        assert_eq!(plan.state.location, FrameDataLocation::Software);
    }

    #[test]
    fn qsv_encoder_uploads_software_frames() {
        let state = FrameState {
            location: FrameDataLocation::Software,
            pixel_format: Some(PixelFormat::YUV420P10LE),
            ..FrameState::default()
        };
        let encoder =
            VideoEncoder::hardware(HardwareAccelerationMode::Qsv, &VideoFormat::H264).unwrap();
        let plan = plan_pixel_format(&state, PixelFormat::YUV420P, &encoder).unwrap();
        assert_eq!(
            names(&plan.filters),
            vec!["format=yuv420p", "hwupload=extra_hw_frames=64"]
        );
        assert_eq!(plan.state.location, FrameDataLocation::Hardware);
        assert!(encoder.check(&plan.state).is_ok());
    }

    #[test]
    fn matching_device_frames_need_nothing() {
        let state = on_device(HardwareAccelerationMode::Nvenc, PixelFormat::YUV420P);
        let encoder =
            VideoEncoder::hardware(HardwareAccelerationMode::Nvenc, &VideoFormat::H264).unwrap();
        let plan = plan_pixel_format(&state, PixelFormat::YUV420P, &encoder).unwrap();
        assert!(plan.filters.is_empty());
        assert!(plan.output.is_none());

        let ten_bit = plan_pixel_format(&state, PixelFormat::YUV420P10LE, &encoder).unwrap();
        assert_eq!(names(&ten_bit.filters), vec!["scale_cuda=format=p010le"]);
    }
}
