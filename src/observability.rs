use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use once_cell::sync::Lazy;
use serde::Serialize;
use tracing::{debug, info};

/// Pipeline flavours the builder compiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildKind {
    Transcode,
    Concat,
    Segmenter,
    Resize,
}

impl BuildKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transcode => "transcode",
            Self::Concat => "concat",
            Self::Segmenter => "segmenter",
            Self::Resize => "resize",
        }
    }
}

impl fmt::Display for BuildKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub builds: BTreeMap<String, BuildMetrics>,
    /// Selected decoders and encoders by label.
    pub selections: BTreeMap<String, u64>,
    /// Failures by error variant.
    pub failures: BTreeMap<String, u64>,
    pub software_fallbacks: u64,
}

#[derive(Debug, Default, Serialize, Clone)]
pub struct BuildMetrics {
    pub calls: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

#[derive(Debug, Default, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsSnapshot>>,
}

impl MetricsCollector {
    pub fn global() -> &'static MetricsCollector {
        static INSTANCE: Lazy<MetricsCollector> = Lazy::new(|| MetricsCollector {
            inner: Arc::new(Mutex::new(MetricsSnapshot::default())),
        });
        &INSTANCE
    }

    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsSnapshot::default())),
        }
    }

    pub fn start_build(&self, kind: BuildKind) -> BuildTimer {
        BuildTimer {
            kind,
            started_at: Instant::now(),
            collector: self.inner.clone(),
            recorded: false,
        }
    }

    /// Counts one use of `label` in `stage` ("decoder" or "encoder").
    pub fn record_selection(&self, stage: &str, label: &str) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard
                .selections
                .entry(format!("{stage}:{label}"))
                .or_default() += 1;
        }
    }

    pub fn record_failure(&self, reason: &str) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard.failures.entry(reason.to_string()).or_default() += 1;
        }
    }

    pub fn record_fallback(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.software_fallbacks += 1;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().map(|g| g.clone()).unwrap_or_default()
    }

    pub fn reset(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = MetricsSnapshot::default();
        }
    }
}

/// Records the duration of one build when dropped.
pub struct BuildTimer {
    kind: BuildKind,
    started_at: Instant,
    collector: Arc<Mutex<MetricsSnapshot>>,
    recorded: bool,
}

impl BuildTimer {
    fn record(&mut self) {
        if self.recorded {
            return;
        }
        let duration_ms = self.started_at.elapsed().as_secs_f64() * 1_000.0;
        if let Ok(mut guard) = self.collector.lock() {
            let metrics = guard.builds.entry(self.kind.to_string()).or_default();
            metrics.calls += 1;
            metrics.total_duration_ms += duration_ms;
            if duration_ms > metrics.max_duration_ms {
                metrics.max_duration_ms = duration_ms;
            }
        }
        debug!(kind = %self.kind, duration_ms, "Build duration recorded");
        self.recorded = true;
    }
}

impl Drop for BuildTimer {
    fn drop(&mut self) {
        self.record();
    }
}

pub fn log_snapshot(snapshot: &MetricsSnapshot) {
    info!(
        build_kinds = snapshot.builds.len(),
        software_fallbacks = snapshot.software_fallbacks,
        failures = snapshot.failures.values().sum::<u64>(),
        "Build metrics summary"
    );
    for (kind, metrics) in &snapshot.builds {
        info!(
            kind = kind.as_str(),
            calls = metrics.calls,
            total_ms = metrics.total_duration_ms,
            max_ms = metrics.max_duration_ms,
            "Build metrics"
        );
    }
    for (selection, count) in &snapshot.selections {
        debug!(selection = selection.as_str(), count, "Selection metrics");
    }
}

impl MetricsSnapshot {
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();
        output.push_str("# HELP tvpipe_builds_total Pipeline builds by kind\n");
        output.push_str("# TYPE tvpipe_builds_total counter\n");
        output.push_str(
            "# HELP tvpipe_build_duration_seconds_total Accumulated build duration in seconds\n",
        );
        output.push_str("# TYPE tvpipe_build_duration_seconds_total counter\n");
        output.push_str("# HELP tvpipe_build_duration_seconds_max Maximum build duration in seconds\n");
        output.push_str("# TYPE tvpipe_build_duration_seconds_max gauge\n");
        for (kind, metrics) in &self.builds {
            output.push_str(&format!(
                "tvpipe_builds_total{{kind=\"{}\"}} {}\n",
                kind, metrics.calls
            ));
            output.push_str(&format!(
                "tvpipe_build_duration_seconds_total{{kind=\"{}\"}} {:.6}\n",
                kind,
                metrics.total_duration_ms / 1_000.0
            ));
            output.push_str(&format!(
                "tvpipe_build_duration_seconds_max{{kind=\"{}\"}} {:.6}\n",
                kind,
                metrics.max_duration_ms / 1_000.0
            ));
        }
        output.push_str("# HELP tvpipe_selections_total Selected decoders and encoders\n");
        output.push_str("# TYPE tvpipe_selections_total counter\n");
        for (selection, count) in &self.selections {
            let (stage, label) = selection.split_once(':').unwrap_or(("", selection));
            output.push_str(&format!(
                "tvpipe_selections_total{{stage=\"{stage}\",name=\"{label}\"}} {count}\n"
            ));
        }
        output.push_str("# HELP tvpipe_build_failures_total Failed builds by reason\n");
        output.push_str("# TYPE tvpipe_build_failures_total counter\n");
        for (reason, count) in &self.failures {
            output.push_str(&format!(
                "tvpipe_build_failures_total{{reason=\"{reason}\"}} {count}\n"
            ));
        }
        output.push_str(
            "# HELP tvpipe_software_fallbacks_total Hardware builds retried in software\n",
        );
        output.push_str("# TYPE tvpipe_software_fallbacks_total counter\n");
        output.push_str(&format!(
            "tvpipe_software_fallbacks_total {}\n",
            self.software_fallbacks
        ));
        output
    }
}
