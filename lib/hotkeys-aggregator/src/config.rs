use std::time::Duration;

use hotkeys_sketch::CountMinSketch;
use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt as _};

use crate::error::{AggregatorError, InvalidConfigurationSnafu, SketchSnafu};

const fn default_top_k() -> usize {
    10
}

const fn default_emit_interval_ms() -> u64 {
    1000
}

const fn default_reset_on_emit() -> bool {
    true
}

const fn default_queue_capacity() -> usize {
    10_000
}

const fn default_emission_buffer() -> usize {
    1
}

const fn default_sketch_depth() -> usize {
    5
}

const fn default_sketch_width() -> usize {
    10_000
}

/// Error rate and confidence used to size the frequency sketch.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct ErrorBounds {
    /// Maximum over-count, as a fraction of the total of all counts in the window.
    pub epsilon: f64,

    /// Probability that an estimate stays within `epsilon`.
    pub delta: f64,
}

/// Stream aggregator configuration.
///
/// ## Emission
///
/// Every `emit_interval_ms`, the aggregator drains its current top-K entries and publishes them, ascending by estimated
/// count. Publishing waits for room in an emission buffer of `emission_buffer` snapshots. While the worker is waiting,
/// no events are processed, so a consumer that falls behind eventually applies backpressure all the way back to
/// producers rather than causing snapshots or events to be dropped.
///
/// ## Sketch sizing
///
/// By default the sketch is `sketch_depth` rows of `sketch_width` counters. When `sketch_error_bounds` is set, the
/// dimensions are derived from the error bounds instead and the explicit dimensions are ignored.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct AggregatorConfiguration {
    /// Number of keys to track.
    ///
    /// Defaults to 10.
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// How often to publish the current top-K, in milliseconds.
    ///
    /// Defaults to 1000 milliseconds.
    #[serde(default = "default_emit_interval_ms")]
    pub emit_interval_ms: u64,

    /// Whether to clear all counts after each emission.
    ///
    /// When enabled, each emission covers only the events received since the previous one. When disabled, counts
    /// accumulate until the aggregator is reset manually.
    ///
    /// Defaults to `true`.
    #[serde(default = "default_reset_on_emit")]
    pub reset_on_emit: bool,

    /// Maximum number of events waiting to be processed before producers are made to wait.
    ///
    /// Defaults to 10000.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Maximum number of published snapshots waiting to be consumed before the worker is made to wait.
    ///
    /// Defaults to 1.
    #[serde(default = "default_emission_buffer")]
    pub emission_buffer: usize,

    /// Number of rows in the frequency sketch.
    ///
    /// Defaults to 5.
    #[serde(default = "default_sketch_depth")]
    pub sketch_depth: usize,

    /// Number of counters per row in the frequency sketch.
    ///
    /// Defaults to 10000.
    #[serde(default = "default_sketch_width")]
    pub sketch_width: usize,

    /// Error bounds used to size the frequency sketch, overriding `sketch_depth` and `sketch_width`.
    #[serde(default)]
    pub sketch_error_bounds: Option<ErrorBounds>,
}

impl AggregatorConfiguration {
    /// Creates a new `AggregatorConfiguration` with default values.
    pub fn with_defaults() -> Self {
        Self {
            top_k: default_top_k(),
            emit_interval_ms: default_emit_interval_ms(),
            reset_on_emit: default_reset_on_emit(),
            queue_capacity: default_queue_capacity(),
            emission_buffer: default_emission_buffer(),
            sketch_depth: default_sketch_depth(),
            sketch_width: default_sketch_width(),
            sketch_error_bounds: None,
        }
    }

    /// Sets the number of keys to track.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Sets the emission interval.
    ///
    /// The interval is stored with millisecond precision.
    pub fn with_emit_interval(mut self, interval: Duration) -> Self {
        self.emit_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Sets whether all counts are cleared after each emission.
    pub fn with_reset_on_emit(mut self, reset_on_emit: bool) -> Self {
        self.reset_on_emit = reset_on_emit;
        self
    }

    /// Sets the ingestion queue capacity.
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Sets the number of snapshots that can be published ahead of the consumer.
    pub fn with_emission_buffer(mut self, emission_buffer: usize) -> Self {
        self.emission_buffer = emission_buffer;
        self
    }

    /// Sets the sketch dimensions explicitly, clearing any error bounds.
    pub fn with_sketch_dimensions(mut self, depth: usize, width: usize) -> Self {
        self.sketch_depth = depth;
        self.sketch_width = width;
        self.sketch_error_bounds = None;
        self
    }

    /// Sets the error bounds used to size the sketch.
    pub fn with_sketch_error_bounds(mut self, epsilon: f64, delta: f64) -> Self {
        self.sketch_error_bounds = Some(ErrorBounds { epsilon, delta });
        self
    }

    /// Returns the emission interval.
    pub fn emit_interval(&self) -> Duration {
        Duration::from_millis(self.emit_interval_ms)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// If any setting is out of range, an error is returned describing the first offending setting.
    pub fn validate(&self) -> Result<(), AggregatorError> {
        ensure!(
            self.top_k > 0,
            InvalidConfigurationSnafu {
                field: "top_k",
                reason: "must be greater than zero",
            }
        );
        ensure!(
            self.emit_interval_ms > 0,
            InvalidConfigurationSnafu {
                field: "emit_interval_ms",
                reason: "must be greater than zero",
            }
        );
        ensure!(
            self.queue_capacity > 0,
            InvalidConfigurationSnafu {
                field: "queue_capacity",
                reason: "must be greater than zero",
            }
        );
        ensure!(
            self.emission_buffer > 0,
            InvalidConfigurationSnafu {
                field: "emission_buffer",
                reason: "must be greater than zero",
            }
        );

        Ok(())
    }

    /// Builds the frequency sketch described by this configuration.
    pub(crate) fn build_sketch(&self) -> Result<CountMinSketch, AggregatorError> {
        let sketch = match self.sketch_error_bounds {
            Some(ErrorBounds { epsilon, delta }) => CountMinSketch::with_error_bounds(epsilon, delta),
            None => CountMinSketch::new(self.sketch_depth, self.sketch_width),
        };
        sketch.context(SketchSnafu)
    }
}

impl Default for AggregatorConfiguration {
    fn default() -> Self {
        Self::with_defaults()
    }
}
