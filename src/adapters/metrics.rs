//! Metrics sinks
//!
//! Sinks allow composable metric reporting without coupling the training
//! loop to a specific output.

use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::Path,
    sync::Arc,
};

use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    Result,
    error::Error,
    ports::{Metrics, MetricsSink},
};

#[derive(Serialize)]
struct MetricsLine<'a> {
    step: u64,
    #[serde(flatten)]
    metrics: &'a Metrics,
}

/// JSONL sink - one JSON object per `log` call
///
/// Appends to an existing file so a resumed run continues the same log.
pub struct JsonlMetricsSink {
    writer: BufWriter<File>,
}

impl JsonlMetricsSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| Error::Io {
                operation: format!("create metrics directory {parent:?}"),
                source,
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| Error::Io {
                operation: format!("open metrics log {path:?}"),
                source,
            })?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl MetricsSink for JsonlMetricsSink {
    fn log(&mut self, step: u64, metrics: &Metrics) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &MetricsLine { step, metrics })?;
        writeln!(&mut self.writer)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Progress bar sink - Shows training progress
pub struct ProgressSink {
    progress_bar: Option<ProgressBar>,
    hidden: bool,
}

impl ProgressSink {
    pub fn new() -> Self {
        Self {
            progress_bar: None,
            hidden: false,
        }
    }

    /// A sink that tracks progress without drawing
    pub fn hidden() -> Self {
        Self {
            progress_bar: None,
            hidden: true,
        }
    }

    pub fn position(&self) -> Option<u64> {
        self.progress_bar.as_ref().map(ProgressBar::position)
    }

    fn summary(metrics: &Metrics) -> String {
        let mut parts = Vec::new();
        if let Some(loss) = metrics.get("train/actor_loss") {
            parts.push(format!("actor {loss:.3}"));
        }
        if let Some(loss) = metrics.get("train/critic_loss") {
            parts.push(format!("critic {loss:.3}"));
        }
        if let Some(rate) = metrics.get("val/win_rate") {
            parts.push(format!("win {:.0}%", rate * 100.0));
        }
        parts.join(" ")
    }
}

impl Default for ProgressSink {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for ProgressSink {
    fn on_training_start(&mut self, total_batches: u64) -> Result<()> {
        let pb = if self.hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(total_batches)
        };
        pb.set_length(total_batches);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} batches ({msg})")
                .map_err(|e| Error::ProgressBarTemplate {
                    message: e.to_string(),
                })?
                .progress_chars("=>-"),
        );
        self.progress_bar = Some(pb);
        Ok(())
    }

    fn log(&mut self, step: u64, metrics: &Metrics) -> Result<()> {
        if let Some(pb) = &self.progress_bar {
            pb.set_position(step);
            let summary = Self::summary(metrics);
            if !summary.is_empty() {
                pb.set_message(summary);
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(pb) = &self.progress_bar {
            pb.finish();
        }
        Ok(())
    }
}

/// Recorded sink state
#[derive(Debug, Clone, Default)]
pub struct MemoryLog {
    pub total_batches: Option<u64>,
    pub entries: Vec<(u64, Metrics)>,
    pub finished: bool,
}

impl MemoryLog {
    /// Values of one metric in logging order
    pub fn series(&self, name: &str) -> Vec<(u64, f64)> {
        self.entries
            .iter()
            .filter_map(|(step, metrics)| metrics.get(name).map(|v| (*step, *v)))
            .collect()
    }
}

/// In-memory sink for tests. Clones share the same log.
#[derive(Clone, Default)]
pub struct MemorySink {
    log: Arc<Mutex<MemoryLog>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MemoryLog {
        self.log.lock().clone()
    }
}

impl MetricsSink for MemorySink {
    fn on_training_start(&mut self, total_batches: u64) -> Result<()> {
        self.log.lock().total_batches = Some(total_batches);
        Ok(())
    }

    fn log(&mut self, step: u64, metrics: &Metrics) -> Result<()> {
        self.log.lock().entries.push((step, metrics.clone()));
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.log.lock().finished = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn metrics(loss: f64) -> Metrics {
        Metrics::from([("train/actor_loss".to_string(), loss)])
    }

    #[test]
    fn test_jsonl_sink_writes_one_line_per_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run").join("metrics.jsonl");

        let mut sink = JsonlMetricsSink::new(&path).unwrap();
        sink.log(1, &metrics(0.5)).unwrap();
        sink.log(2, &metrics(0.25)).unwrap();
        sink.finish().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["step"], 2);
        assert_eq!(lines[1]["train/actor_loss"], 0.25);
    }

    #[test]
    fn test_jsonl_sink_appends_on_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metrics.jsonl");
        for step in 0..2 {
            let mut sink = JsonlMetricsSink::new(&path).unwrap();
            sink.log(step, &metrics(1.0)).unwrap();
            sink.finish().unwrap();
        }
        assert_eq!(fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_progress_sink_tracks_position() {
        let mut sink = ProgressSink::hidden();
        sink.on_training_start(10).unwrap();
        sink.log(4, &metrics(0.1)).unwrap();
        assert_eq!(sink.position(), Some(4));
        sink.finish().unwrap();
    }

    #[test]
    fn test_memory_sink_clones_share_log() {
        let sink = MemorySink::new();
        let mut writer = sink.clone();
        writer.on_training_start(5).unwrap();
        writer.log(3, &metrics(0.7)).unwrap();
        writer.finish().unwrap();

        let log = sink.snapshot();
        assert_eq!(log.total_batches, Some(5));
        assert_eq!(log.series("train/actor_loss"), vec![(3, 0.7)]);
        assert!(log.finished);
    }
}
