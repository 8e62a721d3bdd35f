//! Composition of multi-source `-filter_complex` expressions.

pub mod placement;

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::catalog::overlay::OverlayKind;
use crate::step::{PipelineStep, StepCategory};

/// Stream `stream` of the `input`-th distinct input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct StreamRef {
    pub input: usize,
    pub stream: usize,
}

impl StreamRef {
    pub fn new(input: usize, stream: usize) -> Self {
        Self { input, stream }
    }

    /// `[i:s]` as used inside an expression.
    pub fn label(&self) -> String {
        format!("[{self}]")
    }
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.input, self.stream)
    }
}

/// Hands out intermediate labels; a base used twice gets a numeric suffix.
#[derive(Debug, Default)]
pub struct LabelAllocator {
    counts: HashMap<String, usize>,
}

impl LabelAllocator {
    pub fn next(&mut self, base: &str) -> String {
        let count = self.counts.entry(base.to_string()).or_insert(0);
        let label = if *count == 0 {
            format!("[{base}]")
        } else {
            format!("[{base}{count}]")
        };
        *count += 1;
        label
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Chain {
    source: StreamRef,
    filters: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Layer {
    kind: OverlayKind,
    source: Chain,
    overlay: String,
}

/// Collects the chains of one graph. Chains are rendered in a fixed
/// order regardless of the order they were added in.
#[derive(Debug, Clone, Default)]
pub struct FilterGraphBuilder {
    video: Option<Chain>,
    audio: Option<Chain>,
    audio_fallback: Option<String>,
    layers: Vec<Layer>,
    pixel_format: Vec<String>,
    subtitle_copies: Vec<StreamRef>,
}

impl FilterGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn video(mut self, source: StreamRef, filters: Vec<String>) -> Self {
        self.video = Some(Chain { source, filters });
        self
    }

    pub fn audio(mut self, source: StreamRef, filters: Vec<String>) -> Self {
        self.audio = Some(Chain { source, filters });
        self
    }

    /// Map used when there is no audio input, such as `0:a`.
    pub fn audio_fallback(mut self, map: impl Into<String>) -> Self {
        self.audio_fallback = Some(map.into());
        self
    }

    pub fn layer(
        mut self,
        kind: OverlayKind,
        source: StreamRef,
        source_filters: Vec<String>,
        overlay: String,
    ) -> Self {
        self.layers.push(Layer {
            kind,
            source: Chain {
                source,
                filters: source_filters,
            },
            overlay,
        });
        self
    }

    pub fn pixel_format(mut self, filters: Vec<String>) -> Self {
        self.pixel_format = filters;
        self
    }

    pub fn copy_subtitle(mut self, source: StreamRef) -> Self {
        self.subtitle_copies.push(source);
        self
    }

    pub fn build(self) -> FilterGraph {
        let mut labels = LabelAllocator::default();
        let mut sources = Vec::new();
        let mut allocated = Vec::new();

        let mut audio_chains = Vec::new();
        let audio_label = match &self.audio {
            Some(chain) => {
                sources.push(chain.source);
                if chain.filters.is_empty() {
                    Some(chain.source.to_string())
                } else {
                    let label = labels.next("a");
                    audio_chains.push(render(&chain.source.label(), &chain.filters, &label));
                    allocated.push(label.clone());
                    Some(label)
                }
            }
            None => self.audio_fallback.clone(),
        };

        let mut video_chains = Vec::new();
        let mut video_label = match &self.video {
            Some(chain) => {
                sources.push(chain.source);
                if chain.filters.is_empty() {
                    Some(chain.source.to_string())
                } else {
                    let label = labels.next("v");
                    video_chains.push(render(&chain.source.label(), &chain.filters, &label));
                    allocated.push(label.clone());
                    Some(label)
                }
            }
            None => None,
        };

        let mut layer_chains = Vec::new();
        let mut layer_labels = Vec::new();
        for layer in &self.layers {
            sources.push(layer.source.source);
            if layer.source.filters.is_empty() {
                layer_labels.push(layer.source.source.label());
            } else {
                let label = labels.next(layer.kind.source_label());
                layer_chains.push(render(
                    &layer.source.source.label(),
                    &layer.source.filters,
                    &label,
                ));
                allocated.push(label.clone());
                layer_labels.push(label);
            }
        }

        let mut overlay_chains = Vec::new();
        if let Some(mut current) = video_label.clone() {
            for (layer, layer_label) in self.layers.iter().zip(&layer_labels) {
                let label = labels.next(layer.kind.output_label());
                overlay_chains.push(format!(
                    "{}{}{}{}",
                    bracketed(&current),
                    layer_label,
                    layer.overlay,
                    label
                ));
                allocated.push(label.clone());
                current = label;
            }
            video_label = Some(current);
        }

        let mut pixel_format_chains = Vec::new();
        if let Some(current) = video_label.clone()
            && !self.pixel_format.is_empty()
        {
            let label = labels.next("vpf");
            pixel_format_chains.push(render(&bracketed(&current), &self.pixel_format, &label));
            allocated.push(label.clone());
            video_label = Some(label);
        }

        let expression = [
            audio_chains,
            video_chains,
            layer_chains,
            overlay_chains,
            pixel_format_chains,
        ]
        .concat()
        .join(";");

        let mut maps = Vec::new();
        if let Some(video) = &video_label {
            maps.push(video.clone());
        }
        if let Some(audio) = &audio_label {
            maps.push(audio.clone());
        }
        for subtitle in &self.subtitle_copies {
            sources.push(*subtitle);
            maps.push(subtitle.to_string());
        }

        FilterGraph {
            expression: (!expression.is_empty()).then_some(expression),
            maps,
            sources,
            labels: allocated,
            video_label,
        }
    }
}

fn render(input: &str, filters: &[String], output: &str) -> String {
    format!("{input}{}{output}", filters.join(","))
}

fn bracketed(label: &str) -> String {
    if label.starts_with('[') {
        label.to_string()
    } else {
        format!("[{label}]")
    }
}

/// Compiled graph: a `-filter_complex` expression and the `-map`s of
/// its outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterGraph {
    expression: Option<String>,
    maps: Vec<String>,
    sources: Vec<StreamRef>,
    labels: Vec<String>,
    video_label: Option<String>,
}

impl FilterGraph {
    pub fn expression(&self) -> Option<&str> {
        self.expression.as_deref()
    }

    pub fn maps(&self) -> &[String] {
        &self.maps
    }

    /// Every input stream the graph reads.
    pub fn sources(&self) -> &[StreamRef] {
        &self.sources
    }

    /// Intermediate labels, in allocation order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Label or stream the video output is mapped from.
    pub fn video_output(&self) -> Option<&str> {
        self.video_label.as_deref()
    }
}

impl PipelineStep for FilterGraph {
    fn name(&self) -> &'static str {
        "filter-graph"
    }

    fn category(&self) -> StepCategory {
        StepCategory::Filter
    }

    fn filter_options(&self) -> Vec<String> {
        let mut options = Vec::new();
        if let Some(expression) = &self.expression {
            options.push("-filter_complex".to_string());
            options.push(expression.clone());
        }
        for map in &self.maps {
            options.push("-map".to_string());
            options.push(map.clone());
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_get_suffixes() {
        let mut labels = LabelAllocator::default();
        assert_eq!(labels.next("wm"), "[wm]");
        assert_eq!(labels.next("wm"), "[wm1]");
        assert_eq!(labels.next("v"), "[v]");
    }

    #[test]
    fn unfiltered_streams_are_mapped_directly() {
        let graph = FilterGraphBuilder::new()
            .video(StreamRef::new(0, 0), Vec::new())
            .audio(StreamRef::new(0, 1), Vec::new())
            .build();
        assert_eq!(graph.expression(), None);
        assert_eq!(graph.filter_options(), vec!["-map", "0:0", "-map", "0:1"]);
    }

    #[test]
    fn audio_chain_comes_first() {
        let graph = FilterGraphBuilder::new()
            .video(StreamRef::new(0, 0), vec!["yadif=1".to_string()])
            .audio(StreamRef::new(1, 0), vec!["aresample=async=1".to_string()])
            .copy_subtitle(StreamRef::new(0, 2))
            .build();
        assert_eq!(
            graph.filter_options(),
            vec![
                "-filter_complex",
                "[1:0]aresample=async=1[a];[0:0]yadif=1[v]",
                "-map",
                "[v]",
                "-map",
                "[a]",
                "-map",
                "0:2"
            ]
        );
    }

    #[test]
    fn overlays_chain_from_the_previous_output() {
        let graph = FilterGraphBuilder::new()
            .video(StreamRef::new(0, 0), Vec::new())
            .audio_fallback("0:a")
            .layer(
                OverlayKind::Watermark,
                StreamRef::new(1, 0),
                vec!["format=yuva420p".to_string()],
                "overlay=x=W-w-10:y=H-h-10".to_string(),
            )
            .layer(
                OverlayKind::Graphics,
                StreamRef::new(2, 0),
                Vec::new(),
                "overlay=x=(W-w)/2:y=(H-h)/2".to_string(),
            )
            .pixel_format(vec!["format=yuv420p".to_string()])
            .build();
        assert_eq!(
            graph.expression(),
            Some(
                "[1:0]format=yuva420p[wm];[0:0][wm]overlay=x=W-w-10:y=H-h-10[vwm];\
                 [vwm][2:0]overlay=x=(W-w)/2:y=(H-h)/2[vgr];[vgr]format=yuv420p[vpf]"
            )
        );
        assert_eq!(graph.maps(), ["[vpf]", "0:a"]);
        assert_eq!(graph.video_output(), Some("[vpf]"));
        assert_eq!(graph.sources().len(), 3);
    }

    #[test]
    fn repeated_layers_never_reuse_labels() {
        let graph = FilterGraphBuilder::new()
            .video(StreamRef::new(0, 0), Vec::new())
            .layer(
                OverlayKind::Watermark,
                StreamRef::new(1, 0),
                vec!["format=yuva420p".to_string()],
                "overlay=x=0:y=0".to_string(),
            )
            .layer(
                OverlayKind::Watermark,
                StreamRef::new(2, 0),
                vec!["format=yuva420p".to_string()],
                "overlay=x=W-w:y=0".to_string(),
            )
            .build();
        assert_eq!(graph.labels(), ["[wm]", "[wm1]", "[vwm]", "[vwm1]"]);
    }
}
