use std::time::Duration;

use hotkeys_sketch::TopEntry;
use snafu::ResultExt as _;
use tokio::{
    runtime::Handle,
    select,
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, Instrument as _};

use crate::{
    config::AggregatorConfiguration,
    error::{AggregatorError, ClosedSnafu, NoRuntimeSnafu},
    telemetry::Telemetry,
    worker::{AggregationState, Message, Worker},
};

/// A cloneable handle for feeding events into a [`StreamAggregator`].
///
/// Every handle shares the same bounded ingestion queue. Events from a single handle are processed in the order they
/// were received.
#[derive(Clone, Debug)]
pub struct AggregatorHandle {
    messages: mpsc::Sender<Message>,
}

impl AggregatorHandle {
    /// Records that `key` was seen `count` times.
    ///
    /// Waits for room in the ingestion queue if it is full.
    ///
    /// # Errors
    ///
    /// If the aggregator has been shut down, an error is returned.
    pub async fn receive<K: Into<String>>(&self, key: K, count: u64) -> Result<(), AggregatorError> {
        let message = Message::Event { key: key.into(), count };
        self.messages.send(message).await.map_err(|_| ClosedSnafu.build())
    }

    /// Records that `key` was seen `count` times, blocking the current thread while the ingestion queue is full.
    ///
    /// This is meant for producers running outside of the asynchronous runtime.
    ///
    /// # Errors
    ///
    /// If the aggregator has been shut down, an error is returned.
    ///
    /// # Panics
    ///
    /// Panics if called from within an asynchronous execution context.
    pub fn blocking_receive<K: Into<String>>(&self, key: K, count: u64) -> Result<(), AggregatorError> {
        let message = Message::Event { key: key.into(), count };
        self.messages.blocking_send(message).map_err(|_| ClosedSnafu.build())
    }

    /// Clears all counts and tracked keys.
    ///
    /// The reset is queued behind any events already received, so it applies to everything sent before it and nothing
    /// sent after it.
    ///
    /// # Errors
    ///
    /// If the aggregator has been shut down, an error is returned.
    pub async fn reset(&self) -> Result<(), AggregatorError> {
        self.messages.send(Message::Reset).await.map_err(|_| ClosedSnafu.build())
    }

    /// Returns `true` if the aggregator is no longer accepting events.
    pub fn is_closed(&self) -> bool {
        self.messages.is_closed()
    }
}

/// Approximate top-K tracker over a stream of keyed events.
///
/// A `StreamAggregator` spawns a single worker task which owns a Count-Min sketch and a bounded top-K heap. Events are
/// passed to the worker through a bounded queue, and every emission interval the worker drains the heap and publishes
/// the result, which is read with [`next_emission`][Self::next_emission]. Nothing else ever touches the sketch or the
/// heap, so no locking is involved.
///
/// ## Backpressure
///
/// Producers wait when the ingestion queue is full. The worker, in turn, waits when the emission buffer is full, and
/// processes no events while doing so. A consumer that stops reading emissions therefore eventually stalls producers.
///
/// ## Lifecycle
///
/// [`shutdown`][Self::shutdown] stops the worker gracefully, after it has processed every event received before the
/// call, and hands back every snapshot not yet read. Dropping the aggregator stops the worker immediately, discarding
/// anything still queued.
pub struct StreamAggregator {
    handle: AggregatorHandle,
    emissions: mpsc::Receiver<Vec<TopEntry>>,
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl StreamAggregator {
    /// Creates a new `StreamAggregator` tracking the `top_k` most frequent keys, emitting every `emit_interval`, using
    /// the default values for all other settings.
    ///
    /// # Errors
    ///
    /// If `top_k` is zero, `emit_interval` is shorter than a millisecond, or this is not called from within a Tokio
    /// runtime, an error is returned.
    pub fn new(top_k: usize, emit_interval: Duration, reset_on_emit: bool) -> Result<Self, AggregatorError> {
        let config = AggregatorConfiguration::with_defaults()
            .with_top_k(top_k)
            .with_emit_interval(emit_interval)
            .with_reset_on_emit(reset_on_emit);

        Self::from_configuration(&config)
    }

    /// Creates a new `StreamAggregator` from the given configuration, and starts its worker task.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, the sketch dimensions are invalid, or this is not called from within a Tokio
    /// runtime, an error is returned and nothing is spawned.
    pub fn from_configuration(config: &AggregatorConfiguration) -> Result<Self, AggregatorError> {
        config.validate()?;
        let sketch = config.build_sketch()?;
        let runtime = Handle::try_current().context(NoRuntimeSnafu)?;

        let span = info_span!(
            "hotkeys_aggregator",
            top_k = config.top_k,
            sketch_depth = sketch.depth(),
            sketch_width = sketch.width(),
        );

        let (messages_tx, messages_rx) = mpsc::channel(config.queue_capacity);
        let (emissions_tx, emissions_rx) = mpsc::channel(config.emission_buffer);
        let shutdown = CancellationToken::new();
        let telemetry = Telemetry::new();

        let worker = Worker::new(
            AggregationState::new(sketch, config.top_k, telemetry.clone()),
            messages_rx,
            emissions_tx,
            config.emit_interval(),
            config.reset_on_emit,
            shutdown.clone(),
            telemetry,
        );
        let worker = runtime.spawn(worker.run().instrument(span));

        Ok(Self {
            handle: AggregatorHandle { messages: messages_tx },
            emissions: emissions_rx,
            shutdown,
            worker: Some(worker),
        })
    }

    /// Returns a new handle for feeding events into this aggregator.
    pub fn handle(&self) -> AggregatorHandle {
        self.handle.clone()
    }

    /// Records that `key` was seen `count` times.
    ///
    /// Waits for room in the ingestion queue if it is full.
    ///
    /// # Errors
    ///
    /// If the worker is no longer running, an error is returned.
    pub async fn receive<K: Into<String>>(&self, key: K, count: u64) -> Result<(), AggregatorError> {
        self.handle.receive(key, count).await
    }

    /// Clears all counts and tracked keys, starting a fresh window.
    ///
    /// # Errors
    ///
    /// If the worker is no longer running, an error is returned.
    pub async fn reset(&self) -> Result<(), AggregatorError> {
        self.handle.reset().await
    }

    /// Waits for the next published top-K snapshot.
    ///
    /// Entries are in ascending order of estimated count, and there are at most `top_k` of them. Returns `None` once
    /// the worker has stopped and every published snapshot has been read.
    pub async fn next_emission(&mut self) -> Option<Vec<TopEntry>> {
        self.emissions.recv().await
    }

    /// Returns the next published top-K snapshot if one is ready, without waiting.
    pub fn try_next_emission(&mut self) -> Option<Vec<TopEntry>> {
        self.emissions.try_recv().ok()
    }

    /// Stops the worker gracefully, returning every snapshot that has not been read yet.
    ///
    /// Every event received before this call is processed first. The returned snapshots are in publication order: any
    /// published but unread ones, followed by the top-K entries accumulated since the last emission. The last snapshot
    /// is always present, and is empty if nothing was received since the last emission or the worker had already
    /// stopped.
    pub async fn shutdown(mut self) -> Vec<Vec<TopEntry>> {
        let messages = self.handle.messages.clone();
        let (reply_tx, reply_rx) = oneshot::channel();
        let stop = async move {
            messages.send(Message::Shutdown(reply_tx)).await.ok()?;
            reply_rx.await.ok()
        };
        tokio::pin!(stop);

        // Keep reading emissions while we wait, since the worker can't get to our request while it's blocked
        // publishing.
        let mut snapshots = Vec::new();
        let final_snapshot = loop {
            select! {
                result = &mut stop => break result.unwrap_or_default(),
                Some(snapshot) = self.emissions.recv() => snapshots.push(snapshot),
            }
        };

        // The worker publishes nothing after replying, but anything it published before may still be buffered.
        while let Ok(snapshot) = self.emissions.try_recv() {
            snapshots.push(snapshot);
        }

        debug!(
            unread = snapshots.len(),
            entries = final_snapshot.len(),
            "Handing off remaining snapshots."
        );
        snapshots.push(final_snapshot);

        self.shutdown.cancel();
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!(error = %e, "Aggregator worker task failed.");
            }
        }

        snapshots
    }
}

impl Drop for StreamAggregator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
