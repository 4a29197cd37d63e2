use hotkeys_sketch::SketchError;
use snafu::Snafu;

/// Stream aggregator error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AggregatorError {
    /// A configuration setting was out of range.
    #[snafu(display("Invalid value for '{}': {}", field, reason))]
    InvalidConfiguration {
        /// Name of the offending setting.
        field: &'static str,

        /// Description of the accepted range.
        reason: String,
    },

    /// The frequency sketch could not be created.
    #[snafu(display("Failed to create frequency sketch."))]
    Sketch {
        /// Error source.
        source: SketchError,
    },

    /// No Tokio runtime was available to spawn the worker on.
    #[snafu(display("Aggregator must be created from within a Tokio runtime."))]
    NoRuntime {
        /// Error source.
        source: tokio::runtime::TryCurrentError,
    },

    /// The aggregator is no longer running.
    #[snafu(display("Aggregator has been shut down."))]
    Closed,
}
