//! Metrics port - abstraction for experiment tracking
//!
//! Sinks receive flat metric dictionaries from the training loop, allowing
//! composable reporting without coupling the loop to a tracking backend.

use std::collections::BTreeMap;

use crate::Result;

/// Named scalar metrics for one logging step
pub type Metrics = BTreeMap<String, f64>;

/// Sink for training metrics
///
/// # Event Sequence
///
/// 1. `on_training_start(total_batches)` - once, before the first update
/// 2. `log(step, metrics)` - any number of times, with non-decreasing steps
/// 3. `finish()` - once, after the last epoch or when the run aborts
pub trait MetricsSink: Send {
    /// Called when training starts.
    ///
    /// # Default Implementation
    ///
    /// Does nothing.
    fn on_training_start(&mut self, _total_batches: u64) -> Result<()> {
        Ok(())
    }

    /// Record `metrics` at training-batch `step`.
    fn log(&mut self, step: u64, metrics: &Metrics) -> Result<()>;

    /// Flush and close the sink.
    ///
    /// # Default Implementation
    ///
    /// Does nothing.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}
