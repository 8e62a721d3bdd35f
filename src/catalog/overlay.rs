//! Layer source filters (watermarks, image subtitles, graphics) and the
//! overlay filters that composite them onto the main video.

use serde::Serialize;

use crate::catalog::filter::FilterBackend;
use crate::error::PipelineError;
use crate::format::format_seconds as seconds;
use crate::state::FrameState;
use crate::step::{PipelineStep, StepCategory};

/// Scales a watermark to a share of the frame width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatermarkScale {
    pub width_percent: f64,
    pub frame_width: u32,
}

impl WatermarkScale {
    pub fn width(&self) -> u32 {
        (self.width_percent / 100.0 * f64::from(self.frame_width)).round() as u32
    }
}

impl PipelineStep for WatermarkScale {
    fn name(&self) -> &'static str {
        "watermark-scale"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter(&self) -> Option<String> {
        Some(format!("scale={}:-1", self.width()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatermarkOpacity {
    pub percent: f64,
}

impl PipelineStep for WatermarkOpacity {
    fn name(&self) -> &'static str {
        "watermark-opacity"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter(&self) -> Option<String> {
        Some(format!("colorchannelmixer=aa={:.2}", self.percent / 100.0))
    }
}

/// `format=yuva420p` so that fades and opacity have an alpha plane to act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlphaFormat;

impl PipelineStep for AlphaFormat {
    fn name(&self) -> &'static str {
        "alpha-format"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter(&self) -> Option<String> {
        Some("format=yuva420p".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FadeDirection {
    In,
    Out,
}

/// One alpha fade of an intermittent watermark, active only inside
/// `enable_from..=enable_until` (seconds into the item).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatermarkFade {
    pub direction: FadeDirection,
    pub start: f64,
    pub enable_from: f64,
    pub enable_until: f64,
}

impl PipelineStep for WatermarkFade {
    fn name(&self) -> &'static str {
        match self.direction {
            FadeDirection::In => "watermark-fade-in",
            FadeDirection::Out => "watermark-fade-out",
        }
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter(&self) -> Option<String> {
        let direction = match self.direction {
            FadeDirection::In => "in",
            FadeDirection::Out => "out",
        };
        Some(format!(
            "fade={direction}:st={}:d=1:alpha=1:enable='between(t,{},{})'",
            seconds(self.start),
            seconds(self.enable_from),
            seconds(self.enable_until)
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayKind {
    ImageSubtitle,
    Watermark,
    Graphics,
}

impl OverlayKind {
    /// Label base of the layer's source chain.
    pub fn source_label(&self) -> &'static str {
        match self {
            Self::ImageSubtitle => "st",
            Self::Watermark => "wm",
            Self::Graphics => "gr",
        }
    }

    /// Label base of the composited video.
    pub fn output_label(&self) -> &'static str {
        match self {
            Self::ImageSubtitle => "vst",
            Self::Watermark => "vwm",
            Self::Graphics => "vgr",
        }
    }
}

/// Composites one layer onto the main video at `position`
/// (an `x=...:y=...` expression).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayFilter {
    pub backend: FilterBackend,
    pub kind: OverlayKind,
    pub position: String,
}

impl OverlayFilter {
    pub const CENTERED: &'static str = "x=(W-w)/2:y=(H-h)/2";

    pub fn new(backend: FilterBackend, kind: OverlayKind, position: impl Into<String>) -> Self {
        Self {
            backend,
            kind,
            position: position.into(),
        }
    }
}

impl PipelineStep for OverlayFilter {
    fn name(&self) -> &'static str {
        match (self.kind, self.backend) {
            (OverlayKind::ImageSubtitle, FilterBackend::Software) => "overlay-subtitle",
            (OverlayKind::ImageSubtitle, _) => "overlay-subtitle-hardware",
            (OverlayKind::Watermark, FilterBackend::Software) => "overlay-watermark",
            (OverlayKind::Watermark, _) => "overlay-watermark-hardware",
            (OverlayKind::Graphics, FilterBackend::Software) => "overlay-graphics",
            (OverlayKind::Graphics, _) => "overlay-graphics-hardware",
        }
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter(&self) -> Option<String> {
        let filter = match self.backend {
            FilterBackend::Cuda => "overlay_cuda",
            FilterBackend::Qsv => "overlay_qsv",
            FilterBackend::Software | FilterBackend::Vaapi => "overlay",
        };
        Some(format!("{filter}={}", self.position))
    }

    fn check(&self, current: &FrameState) -> Result<(), PipelineError> {
        self.backend.check(self.name(), current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watermark_scale_rounds_to_pixels() {
        let scale = WatermarkScale {
            width_percent: 15.0,
            frame_width: 1280,
        };
        assert_eq!(scale.filter().unwrap(), "scale=192:-1");
    }

    #[test]
    fn opacity_uses_two_decimals() {
        let opacity = WatermarkOpacity { percent: 65.0 };
        assert_eq!(opacity.filter().unwrap(), "colorchannelmixer=aa=0.65");
    }

    #[test]
    fn fades_carry_enable_windows() {
        let fade = WatermarkFade {
            direction: FadeDirection::Out,
            start: 125.0,
            enable_from: 116.0,
            enable_until: 300.5,
        };
        assert_eq!(
            fade.filter().unwrap(),
            "fade=out:st=125:d=1:alpha=1:enable='between(t,116,300.5)'"
        );
    }

    #[test]
    fn cuda_overlay() {
        let overlay = OverlayFilter::new(
            FilterBackend::Cuda,
            OverlayKind::Watermark,
            "x=W-w-128:y=H-h-72",
        );
        assert_eq!(overlay.filter().unwrap(), "overlay_cuda=x=W-w-128:y=H-h-72");
        assert!(overlay.check(&FrameState::default()).is_err());
    }
}
