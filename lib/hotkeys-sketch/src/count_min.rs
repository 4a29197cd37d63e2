use std::hash::Hasher as _;

use fnv::FnvHasher;
use snafu::ensure;

use crate::error::{InvalidParameterSnafu, ShapeMismatchSnafu, SketchError};

/// Largest number of counters a sketch can hold, bounded by the largest allocation a `Vec<u64>` can make.
const MAX_COUNTERS: usize = isize::MAX as usize / std::mem::size_of::<u64>();

/// A Count-Min sketch.
///
/// The sketch is a `depth x width` matrix of counters. Every key maps to exactly one counter per row, and the estimate
/// for a key is the smallest of its counters. Since collisions can only ever add to a counter, the estimate is never
/// smaller than the true count for the key, and exceeds it by more than `epsilon * N` (where `N` is the total of all
/// updates) with probability at most `1 - delta`, when the sketch was sized via
/// [`with_error_bounds`][Self::with_error_bounds].
///
/// ## Row selection
///
/// Rather than hashing the key once per row, the key is hashed a single time with 64-bit FNV-1a, and the hash is split
/// into two 32-bit halves `a` (lower) and `b` (upper). The column for row `r` is then `(a + b * r) mod width`. The rows
/// are slightly less independent than with `depth` unrelated hash functions, but the error bounds above still hold in
/// practice and the hashing cost no longer scales with depth.
///
/// # Example
///
/// ```
/// use hotkeys_sketch::CountMinSketch;
///
/// let mut sketch = CountMinSketch::new(5, 10_000).unwrap();
/// sketch.update("example.com", 3);
/// sketch.update("example.com", 2);
///
/// assert!(sketch.estimate("example.com") >= 5);
/// ```
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CountMinSketch {
    depth: usize,
    width: usize,

    /// Row-major counter matrix, `depth * width` entries long.
    counters: Vec<u64>,
}

impl CountMinSketch {
    /// Creates a new `CountMinSketch` with the given depth (number of rows) and width (counters per row).
    ///
    /// # Errors
    ///
    /// If either `depth` or `width` is zero, an error is returned.
    pub fn new(depth: usize, width: usize) -> Result<Self, SketchError> {
        ensure!(
            depth > 0,
            InvalidParameterSnafu {
                name: "depth",
                reason: "must be greater than zero",
            }
        );
        ensure!(
            width > 0,
            InvalidParameterSnafu {
                name: "width",
                reason: "must be greater than zero",
            }
        );

        let len = depth
            .checked_mul(width)
            .filter(|len| *len <= MAX_COUNTERS)
            .ok_or_else(|| SketchError::InvalidParameter {
                name: "width",
                reason: format!("depth x width ({} x {}) exceeds the addressable size", depth, width),
            })?;

        let mut counters = Vec::new();
        counters
            .try_reserve_exact(len)
            .map_err(|e| SketchError::InvalidParameter {
                name: "width",
                reason: format!("failed to allocate {} x {} counters: {}", depth, width, e),
            })?;
        counters.resize(len, 0);

        Ok(Self {
            depth,
            width,
            counters,
        })
    }

    /// Creates a new `CountMinSketch` sized for the given error rate and confidence.
    ///
    /// The width is `ceil(2 / epsilon)` and the depth is `ceil(ln(1 - delta) / ln(0.5))`.
    ///
    /// # Errors
    ///
    /// If `epsilon` or `delta` is not strictly between `0` and `1`, an error is returned.
    pub fn with_error_bounds(epsilon: f64, delta: f64) -> Result<Self, SketchError> {
        ensure!(
            epsilon > 0.0 && epsilon < 1.0,
            InvalidParameterSnafu {
                name: "epsilon",
                reason: format!("must be in the range (0, 1), got {}", epsilon),
            }
        );
        ensure!(
            delta > 0.0 && delta < 1.0,
            InvalidParameterSnafu {
                name: "delta",
                reason: format!("must be in the range (0, 1), got {}", delta),
            }
        );

        let width = (2.0 / epsilon).ceil();
        ensure!(
            width <= MAX_COUNTERS as f64,
            InvalidParameterSnafu {
                name: "epsilon",
                reason: format!("{} requires a width of {} which exceeds the addressable size", epsilon, width),
            }
        );

        // `delta` is strictly below 1, so this is at most 53.
        let depth = ((1.0 - delta).ln() / 0.5f64.ln()).ceil();

        Self::new(depth as usize, width as usize)
    }

    /// Returns the number of rows in the sketch.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the number of counters per row.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Adds `delta` to the count for `key`, returning the updated estimate.
    ///
    /// The returned value is identical to what [`estimate`][Self::estimate] would return immediately afterwards.
    pub fn update<K>(&mut self, key: &K, delta: u64) -> u64
    where
        K: AsRef<[u8]> + ?Sized,
    {
        let (a, b) = base_hashes(key.as_ref());

        let mut estimate = 0;
        for row in 0..self.depth {
            let slot = self.slot(row, a, b);
            let counter = &mut self.counters[slot];
            *counter = counter.saturating_add(delta);

            if row == 0 || *counter < estimate {
                estimate = *counter;
            }
        }

        estimate
    }

    /// Returns the estimated count for `key`.
    ///
    /// Keys that have never been updated may still have a non-zero estimate due to collisions.
    pub fn estimate<K>(&self, key: &K) -> u64
    where
        K: AsRef<[u8]> + ?Sized,
    {
        let (a, b) = base_hashes(key.as_ref());

        let mut estimate = 0;
        for row in 0..self.depth {
            let counter = self.counters[self.slot(row, a, b)];
            if row == 0 || counter < estimate {
                estimate = counter;
            }
        }

        estimate
    }

    /// Merges another sketch into this one by adding their counters together.
    ///
    /// # Errors
    ///
    /// If the two sketches do not have the same depth and width, an error is returned and this sketch is left
    /// untouched.
    pub fn merge(&mut self, other: &Self) -> Result<(), SketchError> {
        ensure!(
            self.depth == other.depth && self.width == other.width,
            ShapeMismatchSnafu {
                depth: self.depth,
                width: self.width,
                other_depth: other.depth,
                other_width: other.width,
            }
        );

        for (counter, other_counter) in self.counters.iter_mut().zip(other.counters.iter()) {
            *counter = counter.saturating_add(*other_counter);
        }

        Ok(())
    }

    /// Returns `true` if no counter has been incremented since creation or the last reset.
    pub fn is_empty(&self) -> bool {
        self.counters.iter().all(|counter| *counter == 0)
    }

    /// Zeroes every counter in the sketch.
    pub fn reset(&mut self) {
        self.counters.fill(0);
    }

    fn slot(&self, row: usize, a: u32, b: u32) -> usize {
        // Wrapping 64-bit arithmetic, then reduce into the row.
        let column = u64::from(a).wrapping_add(u64::from(b).wrapping_mul(row as u64)) % self.width as u64;
        row * self.width + column as usize
    }
}

/// Splits a single 64-bit FNV-1a hash of `key` into two 32-bit halves, `(lower, upper)`.
fn base_hashes(key: &[u8]) -> (u32, u32) {
    let mut hasher = FnvHasher::default();
    hasher.write(key);
    let hash = hasher.finish();

    (hash as u32, (hash >> 32) as u32)
}
