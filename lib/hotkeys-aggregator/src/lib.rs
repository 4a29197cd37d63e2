//! Sliding-window top-K aggregation over a stream of keyed events.
//!
//! [`StreamAggregator`] owns a [`CountMinSketch`] and a [`TopKHeap`], and runs a single worker task which is the only
//! thing that ever touches them. Producers push `(key, count)` events through a bounded queue, and on every emission
//! interval the worker drains the heap and publishes the current top-K, in ascending order of estimated count.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use hotkeys_aggregator::StreamAggregator;
//!
//! # async fn run() -> Result<(), hotkeys_aggregator::AggregatorError> {
//! let mut aggregator = StreamAggregator::new(10, Duration::from_secs(1), true)?;
//! aggregator.receive("example.com", 1).await?;
//!
//! if let Some(top) = aggregator.next_emission().await {
//!     for entry in top.iter().rev() {
//!         println!("{}", entry);
//!     }
//! }
//!
//! let _unread = aggregator.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! [`CountMinSketch`]: hotkeys_sketch::CountMinSketch
//! [`TopKHeap`]: hotkeys_sketch::TopKHeap
#![deny(warnings)]
#![deny(missing_docs)]

pub use hotkeys_sketch::TopEntry;

mod aggregator;
pub use self::aggregator::{AggregatorHandle, StreamAggregator};

mod config;
pub use self::config::{AggregatorConfiguration, ErrorBounds};

mod error;
pub use self::error::AggregatorError;

mod telemetry;

mod worker;
