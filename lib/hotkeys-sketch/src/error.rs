use snafu::Snafu;

/// Sketch error.
#[derive(Clone, Debug, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SketchError {
    /// A construction parameter was out of range.
    #[snafu(display("Invalid value for parameter '{}': {}", name, reason))]
    InvalidParameter {
        /// Name of the offending parameter.
        name: &'static str,

        /// Description of the accepted range.
        reason: String,
    },

    /// Two sketches could not be merged because their dimensions differ.
    #[snafu(display(
        "Cannot merge sketches of different shapes: {}x{} vs {}x{} (depth x width).",
        depth,
        width,
        other_depth,
        other_width
    ))]
    ShapeMismatch {
        /// Depth of the sketch being merged into.
        depth: usize,

        /// Width of the sketch being merged into.
        width: usize,

        /// Depth of the sketch being merged from.
        other_depth: usize,

        /// Width of the sketch being merged from.
        other_width: usize,
    },
}
