use std::time::Duration;

use hotkeys_sketch::{CountMinSketch, TopEntry, TopKHeap};
use tokio::{
    select,
    sync::{mpsc, oneshot},
    time::{interval_at, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::telemetry::Telemetry;

/// A request sent to the worker over the ingestion queue.
pub(crate) enum Message {
    /// A key was seen `count` times.
    Event { key: String, count: u64 },

    /// Clear the sketch and heap.
    Reset,

    /// Drain the heap, reply with the final snapshot, and stop.
    Shutdown(oneshot::Sender<Vec<TopEntry>>),
}

/// The sketch and heap, kept consistent with each other.
pub(crate) struct AggregationState {
    sketch: CountMinSketch,
    heap: TopKHeap,
    telemetry: Telemetry,
}

impl AggregationState {
    pub fn new(sketch: CountMinSketch, top_k: usize, telemetry: Telemetry) -> Self {
        Self {
            sketch,
            heap: TopKHeap::new(top_k),
            telemetry,
        }
    }

    /// Counts `key`, then refreshes or offers its heap entry using the sketch's new estimate.
    pub fn ingest(&mut self, key: String, count: u64) {
        let estimate = self.sketch.update(key.as_str(), count);

        match self.heap.find(&key) {
            Some((index, _)) => self.heap.set_count(index, estimate),
            None => {
                if !self.heap.push(TopEntry::new(key, estimate)) {
                    trace!(estimate, "Key not admitted to top-K.");
                }
            }
        }

        self.telemetry.events_processed().increment(1);
        self.telemetry.tracked_keys().set(self.heap.len() as f64);
    }

    /// Removes every tracked entry, returning them in ascending order of estimated count.
    ///
    /// The sketch is left untouched.
    pub fn drain(&mut self) -> Vec<TopEntry> {
        let drained = self.heap.drain_ascending();
        self.telemetry.tracked_keys().set(0.0);
        drained
    }

    pub fn reset(&mut self) {
        self.sketch.reset();
        self.heap.reset();

        self.telemetry.resets().increment(1);
        self.telemetry.tracked_keys().set(0.0);
    }
}

/// The single task that owns and mutates the aggregation state.
pub(crate) struct Worker {
    state: AggregationState,
    messages: mpsc::Receiver<Message>,
    emissions: mpsc::Sender<Vec<TopEntry>>,
    emit_interval: Duration,
    reset_on_emit: bool,
    shutdown: CancellationToken,
    telemetry: Telemetry,
}

impl Worker {
    pub fn new(
        state: AggregationState, messages: mpsc::Receiver<Message>, emissions: mpsc::Sender<Vec<TopEntry>>,
        emit_interval: Duration, reset_on_emit: bool, shutdown: CancellationToken, telemetry: Telemetry,
    ) -> Self {
        Self {
            state,
            messages,
            emissions,
            emit_interval,
            reset_on_emit,
            shutdown,
            telemetry,
        }
    }

    pub async fn run(mut self) {
        // The first emission happens one full interval after startup, not immediately.
        let mut emit = interval_at(Instant::now() + self.emit_interval, self.emit_interval);
        emit.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!("Aggregator worker started.");

        loop {
            select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    debug!("Aggregator worker cancelled.");
                    break;
                },
                _ = emit.tick() => {
                    if !self.publish().await {
                        break;
                    }
                },
                maybe_message = self.messages.recv() => match maybe_message {
                    Some(Message::Event { key, count }) => self.state.ingest(key, count),
                    Some(Message::Reset) => {
                        debug!("Resetting aggregation state.");
                        self.state.reset();
                    },
                    Some(Message::Shutdown(reply)) => {
                        let snapshot = self.state.drain();
                        debug!(entries = snapshot.len(), "Aggregator worker stopping. Handing off final snapshot.");

                        if reply.send(snapshot).is_err() {
                            debug!("Shutdown requester went away before receiving the final snapshot.");
                        }
                        break;
                    },
                    None => {
                        debug!("Ingestion queue closed.");
                        break;
                    },
                },
            }
        }

        debug!("Aggregator worker stopped.");
    }

    /// Drains the heap and publishes it, waiting for the consumer if the emission buffer is full.
    ///
    /// No events are processed while waiting. Returns `false` if the worker should stop.
    async fn publish(&mut self) -> bool {
        let snapshot = self.state.drain();
        let entries = snapshot.len();

        select! {
            biased;

            _ = self.shutdown.cancelled() => {
                debug!("Aggregator worker cancelled while publishing.");
                return false;
            },
            result = self.emissions.send(snapshot) => if result.is_err() {
                debug!("Emission consumer went away.");
                return false;
            },
        }

        self.telemetry.emissions_published().increment(1);
        debug!(entries, "Published top-K snapshot.");

        if self.reset_on_emit {
            self.state.reset();
        }

        true
    }
}
