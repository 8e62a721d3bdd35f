//! Overlay positions with margins relative to the frame or the content.

use serde::{Deserialize, Serialize};

use crate::format::FrameSize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WatermarkLocation {
    TopLeft,
    TopMiddle,
    TopRight,
    LeftMiddle,
    Center,
    RightMiddle,
    BottomLeft,
    BottomMiddle,
    #[default]
    BottomRight,
}

/// Pixel margins of an overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Margins {
    pub horizontal: u32,
    pub vertical: u32,
}

impl Margins {
    /// Percentage margins of `frame`. With `content`, margins are measured
    /// from the edge of the letterboxed content inside `frame`.
    pub fn from_percent(
        horizontal_percent: f64,
        vertical_percent: f64,
        frame: FrameSize,
        content: Option<FrameSize>,
    ) -> Self {
        let margin = |percent: f64, frame: u32, content: Option<u32>| -> u32 {
            let value = match content {
                Some(content) => {
                    percent / 100.0 * f64::from(content)
                        + (f64::from(frame) - f64::from(content)) / 2.0
                }
                None => percent / 100.0 * f64::from(frame),
            };
            value.round().max(0.0) as u32
        };
        Self {
            horizontal: margin(
                horizontal_percent,
                frame.width,
                content.map(|c| c.width),
            ),
            vertical: margin(vertical_percent, frame.height, content.map(|c| c.height)),
        }
    }
}

impl WatermarkLocation {
    /// Overlay position expression (`x=..:y=..`).
    pub fn position(&self, margins: Margins) -> String {
        let Margins {
            horizontal: h,
            vertical: v,
        } = margins;
        match self {
            Self::TopLeft => format!("x={h}:y={v}"),
            Self::TopMiddle => format!("x=(W-w)/2:y={v}"),
            Self::TopRight => format!("x=W-w-{h}:y={v}"),
            Self::LeftMiddle => format!("x={h}:y=(H-h)/2"),
            Self::Center => "x=(W-w)/2:y=(H-h)/2".to_string(),
            Self::RightMiddle => format!("x=W-w-{h}:y=(H-h)/2"),
            Self::BottomLeft => format!("x={h}:y=H-h-{v}"),
            Self::BottomMiddle => format!("x=(W-w)/2:y=H-h-{v}"),
            Self::BottomRight => format!("x=W-w-{h}:y=H-h-{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margins_scale_with_resolution() {
        let small = Margins::from_percent(10.0, 10.0, FrameSize::new(1280, 720), None);
        let large = Margins::from_percent(10.0, 10.0, FrameSize::new(2560, 1440), None);
        assert_eq!(small, Margins { horizontal: 128, vertical: 72 });
        assert!(large.horizontal.abs_diff(small.horizontal * 2) <= 1);
        assert!(large.vertical.abs_diff(small.vertical * 2) <= 1);
    }

    #[test]
    fn margins_within_content_skip_the_bars() {
        let margins = Margins::from_percent(
            5.0,
            5.0,
            FrameSize::new(1920, 1080),
            Some(FrameSize::new(1440, 1080)),
        );
        assert_eq!(margins, Margins { horizontal: 312, vertical: 54 });
    }

    #[test]
    fn default_is_bottom_right() {
        let margins = Margins {
            horizontal: 128,
            vertical: 72,
        };
        assert_eq!(
            WatermarkLocation::default().position(margins),
            "x=W-w-128:y=H-h-72"
        );
        assert_eq!(WatermarkLocation::LeftMiddle.position(margins), "x=128:y=(H-h)/2");
    }
}
