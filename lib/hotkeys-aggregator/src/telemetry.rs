use metrics::{counter, gauge, Counter, Gauge};

#[derive(Clone)]
pub struct Telemetry {
    events_processed: Counter,
    emissions_published: Counter,
    resets: Counter,
    tracked_keys: Gauge,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            events_processed: counter!("hotkeys_aggregator_events_processed_total"),
            emissions_published: counter!("hotkeys_aggregator_emissions_published_total"),
            resets: counter!("hotkeys_aggregator_resets_total"),
            tracked_keys: gauge!("hotkeys_aggregator_tracked_keys"),
        }
    }

    #[cfg(test)]
    pub fn noop() -> Self {
        Self {
            events_processed: Counter::noop(),
            emissions_published: Counter::noop(),
            resets: Counter::noop(),
            tracked_keys: Gauge::noop(),
        }
    }

    pub fn events_processed(&self) -> &Counter {
        &self.events_processed
    }

    pub fn emissions_published(&self) -> &Counter {
        &self.emissions_published
    }

    pub fn resets(&self) -> &Counter {
        &self.resets
    }

    pub fn tracked_keys(&self) -> &Gauge {
        &self.tracked_keys
    }
}
