//! Audio output options and the audio filter chain.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::format::{AudioFormat, format_seconds};
use crate::step::{PipelineStep, StepCategory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioChannels(pub u32);

impl AudioChannels {
    /// `-ac` is needed when the layout changes, and always for aac above
    /// stereo since the encoder would otherwise downmix.
    pub fn required(format: AudioFormat, source: Option<u32>, desired: u32) -> Option<Self> {
        let changes = source.is_some_and(|channels| channels != desired);
        let wide_aac = format == AudioFormat::Aac && desired > 2;
        (changes || wide_aac).then_some(Self(desired))
    }
}

impl PipelineStep for AudioChannels {
    fn name(&self) -> &'static str {
        "audio-channels"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Output
    }

    fn output_options(&self) -> Vec<String> {
        vec!["-ac".to_string(), self.0.to_string()]
    }
}

/// kbit/s
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioBitrate(pub u32);

impl PipelineStep for AudioBitrate {
    fn name(&self) -> &'static str {
        "audio-bitrate"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Output
    }

    fn output_options(&self) -> Vec<String> {
        vec![
            "-b:a".to_string(),
            format!("{}k", self.0),
            "-maxrate:a".to_string(),
            format!("{}k", self.0),
        ]
    }
}

/// kbit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioBufferSize(pub u32);

impl PipelineStep for AudioBufferSize {
    fn name(&self) -> &'static str {
        "audio-buffer-size"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Output
    }

    fn output_options(&self) -> Vec<String> {
        vec!["-bufsize:a".to_string(), format!("{}k", self.0)]
    }
}

/// Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSampleRate(pub u32);

impl PipelineStep for AudioSampleRate {
    fn name(&self) -> &'static str {
        "audio-sample-rate"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Output
    }

    fn output_options(&self) -> Vec<String> {
        let khz = format_seconds(f64::from(self.0) / 1000.0);
        vec!["-ar".to_string(), format!("{khz}k")]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AudioResample;

impl PipelineStep for AudioResample {
    fn name(&self) -> &'static str {
        "audio-resample"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter(&self) -> Option<String> {
        Some("aresample=async=1".to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoudnessNormalization {
    #[default]
    None,
    Loudnorm,
    Dynaudnorm,
}

impl LoudnessNormalization {
    /// Seconds of input the engine may read ahead in realtime mode so
    /// the normalizer has a window to analyse.
    pub fn realtime_burst(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Loudnorm => 5,
            Self::Dynaudnorm => 15,
        }
    }
}

impl PipelineStep for LoudnessNormalization {
    fn name(&self) -> &'static str {
        match self {
            Self::None => "loudness-none",
            Self::Loudnorm => "loudness-loudnorm",
            Self::Dynaudnorm => "loudness-dynaudnorm",
        }
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter(&self) -> Option<String> {
        match self {
            Self::None => None,
            Self::Loudnorm => Some("loudnorm=I=-16:LRA=21:TP=-1".to_string()),
            Self::Dynaudnorm => Some("dynaudnorm=f=500:g=31".to_string()),
        }
    }
}

/// Pads audio with silence up to the item duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioPad(pub Duration);

impl PipelineStep for AudioPad {
    fn name(&self) -> &'static str {
        "audio-pad"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter(&self) -> Option<String> {
        Some(format!("apad=whole_dur={}ms", self.0.as_millis()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channels_only_when_needed() {
        assert_eq!(AudioChannels::required(AudioFormat::Aac, Some(2), 2), None);
        assert_eq!(
            AudioChannels::required(AudioFormat::Aac, Some(2), 6),
            Some(AudioChannels(6))
        );
        assert_eq!(
            AudioChannels::required(AudioFormat::Aac, Some(6), 6),
            Some(AudioChannels(6))
        );
        assert_eq!(AudioChannels::required(AudioFormat::Ac3, Some(6), 6), None);
    }

    #[test]
    fn sample_rate_in_kilohertz() {
        assert_eq!(AudioSampleRate(48_000).output_options(), vec!["-ar", "48k"]);
        assert_eq!(AudioSampleRate(44_100).output_options(), vec!["-ar", "44.1k"]);
    }

    #[test]
    fn pad_uses_milliseconds() {
        let pad = AudioPad(Duration::from_secs_f64(1800.5));
        assert_eq!(pad.filter().unwrap(), "apad=whole_dur=1800500ms");
    }

    #[test]
    fn loudness_filters() {
        assert_eq!(LoudnessNormalization::None.filter(), None);
        assert_eq!(LoudnessNormalization::Dynaudnorm.realtime_burst(), 15);
    }
}
