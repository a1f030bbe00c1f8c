use std::collections::BTreeMap;
use std::time::Instant;

pub const STAGE_READ: &str = "read";
pub const STAGE_LOCATE: &str = "locate";
pub const STAGE_EMBED: &str = "embed";
pub const STAGE_RENDER: &str = "render";
pub const STAGE_EMIT: &str = "emit";

pub const METRIC_FACES: &str = "faces_per_processed_frame";

/// Cross-cutting logger for recognition session events.
///
/// Keeps the loop free of output concerns; the CLI reports through
/// `log`, tests discard everything.
pub trait PipelineLogger: Send {
    /// Report acquisition progress. `total` is 0 for live sources.
    fn progress(&mut self, frames_read: usize, total: usize);

    /// Record how long a named stage took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. faces found on a frame).
    fn metric(&mut self, name: &str, value: f64);

    /// Emit an end-of-session summary. Default: no-op.
    fn summary(&self) {}
}

/// Silent logger that discards all events.
pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn progress(&mut self, _frames_read: usize, _total: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
}

/// Running total of a sampled value. Constant size regardless of how many
/// samples a session records.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStat {
    pub count: usize,
    pub sum: f64,
    pub max: f64,
}

impl RunningStat {
    fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.max = self.max.max(value);
    }

    pub fn mean(&self) -> f64 {
        self.sum / self.count.max(1) as f64
    }
}

/// Logger that aggregates per-stage timings and metrics and reports
/// through the `log` facade.
///
/// Progress lines are throttled to one every `throttle_frames` frames.
pub struct StdoutPipelineLogger {
    throttle_frames: usize,
    timings: BTreeMap<String, RunningStat>,
    metrics: BTreeMap<String, RunningStat>,
    start_time: Instant,
    frames_read: usize,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: BTreeMap::new(),
            metrics: BTreeMap::new(),
            start_time: Instant::now(),
            frames_read: 0,
        }
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }
        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Session summary ({} frames, {elapsed_s:.1}s):",
            self.frames_read
        )];

        for (stage, stat) in &self.timings {
            lines.push(format!(
                "  {stage:8}: avg {:6.1}ms, max {:6.1}ms over {:5} calls",
                stat.mean(),
                stat.max,
                stat.count
            ));
        }
        for (name, stat) in &self.metrics {
            lines.push(format!("  {name}: avg {:.1}", stat.mean()));
        }
        if self.frames_read > 0 && elapsed_s > 0.0 {
            let fps = self.frames_read as f64 / elapsed_s;
            lines.push(format!("  Throughput: {fps:.1} fps"));
        }
        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<RunningStat> {
        self.timings.get(stage).copied()
    }

    pub fn metrics_for(&self, name: &str) -> Option<RunningStat> {
        self.metrics.get(name).copied()
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(300)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn progress(&mut self, frames_read: usize, total: usize) {
        self.frames_read = frames_read;
        let due = frames_read % self.throttle_frames == 0;
        if total > 0 && (due || frames_read == total) {
            let pct = frames_read as f64 / total as f64 * 100.0;
            log::info!("Processing: {frames_read}/{total} frames ({pct:.1}%)");
        } else if total == 0 && due {
            log::info!("Processing: {frames_read} frames");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .add(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().add(value);
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
