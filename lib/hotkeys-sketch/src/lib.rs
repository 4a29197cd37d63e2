//! Bounded-memory building blocks for approximate top-K tracking.
//!
//! This crate provides the two data structures that a top-K aggregator is assembled from:
//!
//! - [`CountMinSketch`]: a fixed-size counting matrix that estimates how often a key has been seen, never
//!   under-counting and over-counting only with bounded probability.
//! - [`TopKHeap`]: a fixed-capacity min-heap of [`TopEntry`] values, which only admits a new key once it is at least as
//!   frequent as the weakest entry currently held.
//!
//! Neither structure is synchronized. They are meant to be owned by a single writer.
#![deny(warnings)]
#![deny(missing_docs)]

mod count_min;
pub use self::count_min::CountMinSketch;

mod error;
pub use self::error::SketchError;

mod heap;
pub use self::heap::{TopEntry, TopKHeap};
