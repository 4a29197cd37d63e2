use std::time::Duration;

use hotkeys_aggregator::{AggregatorConfiguration, AggregatorError, StreamAggregator, TopEntry};
use tokio::time::{sleep, timeout};

/// Feeds one ingestion cycle: `baiduN.com` is seen `N * 10` times, one event at a time, for `N` in `0..100`.
async fn feed_cycle(aggregator: &StreamAggregator) {
    for i in 0..100 {
        let key = format!("baidu{}.com", i);
        for _ in 0..i * 10 {
            aggregator.receive(key.as_str(), 1).await.unwrap();
        }
    }
}

fn rendered(entries: &[TopEntry]) -> Vec<String> {
    entries.iter().map(ToString::to_string).collect()
}

#[tokio::test(start_paused = true)]
async fn emits_top_k_per_window() {
    let mut aggregator = StreamAggregator::new(10, Duration::from_millis(500), true).unwrap();
    let expected = (0..10).map(|i| format!("baidu9{}.com:9{}0", i, i)).collect::<Vec<_>>();

    for _ in 0..2 {
        feed_cycle(&aggregator).await;

        let emission = aggregator.next_emission().await.unwrap();
        assert_eq!(emission.len(), 10);
        assert_eq!(rendered(&emission), expected);
    }
}

#[tokio::test(start_paused = true)]
async fn counts_accumulate_without_reset_on_emit() {
    let mut aggregator = StreamAggregator::new(10, Duration::from_millis(500), false).unwrap();

    feed_cycle(&aggregator).await;
    let first = aggregator.next_emission().await.unwrap();
    assert_eq!(first.last(), Some(&TopEntry::new("baidu99.com", 990)));

    feed_cycle(&aggregator).await;
    let second = aggregator.next_emission().await.unwrap();
    let expected = (0..10)
        .map(|i| format!("baidu9{}.com:{}", i, 1800 + 20 * i))
        .collect::<Vec<_>>();
    assert_eq!(rendered(&second), expected);
}

#[tokio::test(start_paused = true)]
async fn empty_window_emits_empty_snapshot() {
    let mut aggregator = StreamAggregator::new(10, Duration::from_secs(1), true).unwrap();

    assert_eq!(aggregator.try_next_emission(), None);
    assert_eq!(aggregator.next_emission().await, Some(Vec::new()));
}

#[tokio::test(start_paused = true)]
async fn fewer_keys_than_capacity() {
    let mut aggregator = StreamAggregator::new(10, Duration::from_secs(1), true).unwrap();
    aggregator.receive("c", 3).await.unwrap();
    aggregator.receive("a", 1).await.unwrap();
    aggregator.receive("b", 2).await.unwrap();

    let emission = aggregator.next_emission().await.unwrap();
    assert_eq!(
        emission,
        vec![TopEntry::new("a", 1), TopEntry::new("b", 2), TopEntry::new("c", 3)]
    );
}

#[tokio::test(start_paused = true)]
async fn reset_is_ordered_with_events() {
    let mut aggregator = StreamAggregator::new(10, Duration::from_secs(1), false).unwrap();
    aggregator.receive("a", 5).await.unwrap();
    aggregator.reset().await.unwrap();
    aggregator.receive("b", 1).await.unwrap();

    let emission = aggregator.next_emission().await.unwrap();
    assert_eq!(emission, vec![TopEntry::new("b", 1)]);
}

#[tokio::test(start_paused = true)]
async fn handles_share_one_worker() {
    let mut aggregator = StreamAggregator::new(5, Duration::from_secs(1), true).unwrap();

    let producers = (0..4)
        .map(|_| {
            let handle = aggregator.handle();
            tokio::spawn(async move {
                for _ in 0..250 {
                    handle.receive("shared", 1).await.unwrap();
                }
            })
        })
        .collect::<Vec<_>>();
    for producer in producers {
        producer.await.unwrap();
    }

    let emission = aggregator.next_emission().await.unwrap();
    assert_eq!(emission, vec![TopEntry::new("shared", 1000)]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_returns_final_snapshot() {
    let aggregator = StreamAggregator::new(2, Duration::from_secs(60), true).unwrap();
    let handle = aggregator.handle();

    aggregator.receive("x", 1).await.unwrap();
    aggregator.receive("y", 7).await.unwrap();
    aggregator.receive("z", 4).await.unwrap();

    let remaining = aggregator.shutdown().await;
    assert_eq!(remaining, vec![vec![TopEntry::new("z", 4), TopEntry::new("y", 7)]]);

    assert!(handle.is_closed());
    assert!(matches!(handle.receive("x", 1).await, Err(AggregatorError::Closed)));
    assert!(matches!(handle.reset().await, Err(AggregatorError::Closed)));
}

#[tokio::test(start_paused = true)]
async fn unread_emissions_apply_backpressure() {
    let config = AggregatorConfiguration::with_defaults()
        .with_emit_interval(Duration::from_millis(100))
        .with_queue_capacity(1)
        .with_emission_buffer(1);
    let mut aggregator = StreamAggregator::from_configuration(&config).unwrap();

    // The first snapshot fills the emission buffer and the worker then stalls publishing the second.
    sleep(Duration::from_millis(250)).await;

    aggregator.receive("a", 1).await.unwrap();
    let blocked = timeout(Duration::from_secs(1), aggregator.receive("b", 1)).await;
    assert!(blocked.is_err());

    assert_eq!(aggregator.next_emission().await, Some(Vec::new()));
}

#[tokio::test(start_paused = true)]
async fn shutdown_hands_back_unread_emission() {
    let aggregator = StreamAggregator::new(10, Duration::from_millis(100), true).unwrap();
    aggregator.receive("a", 1).await.unwrap();

    // The window holding "a" is published and cleared, but never read.
    sleep(Duration::from_millis(150)).await;
    aggregator.receive("b", 2).await.unwrap();

    let remaining = aggregator.shutdown().await;
    assert_eq!(
        remaining,
        vec![vec![TopEntry::new("a", 1)], vec![TopEntry::new("b", 2)]]
    );
}

#[tokio::test(start_paused = true)]
async fn shutdown_while_stalled_on_publish() {
    let config = AggregatorConfiguration::with_defaults().with_emit_interval(Duration::from_millis(100));
    let aggregator = StreamAggregator::from_configuration(&config).unwrap();
    aggregator.receive("a", 1).await.unwrap();

    // The first window fills the emission buffer, and the worker stalls publishing the second.
    sleep(Duration::from_millis(250)).await;

    let remaining = timeout(Duration::from_secs(5), aggregator.shutdown()).await.unwrap();
    assert_eq!(remaining, vec![vec![TopEntry::new("a", 1)], Vec::new(), Vec::new()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_producers() {
    let aggregator = StreamAggregator::new(3, Duration::from_secs(3600), true).unwrap();

    let handle = aggregator.handle();
    tokio::task::spawn_blocking(move || {
        for i in 1..=5u64 {
            handle.blocking_receive(format!("key{}", i), i).unwrap();
        }
    })
    .await
    .unwrap();

    let remaining = aggregator.shutdown().await;
    assert_eq!(
        remaining,
        vec![vec![
            TopEntry::new("key3", 3),
            TopEntry::new("key4", 4),
            TopEntry::new("key5", 5),
        ]]
    );
}

#[tokio::test]
async fn invalid_configuration_is_rejected() {
    let config = AggregatorConfiguration::with_defaults().with_queue_capacity(0);
    assert!(matches!(
        StreamAggregator::from_configuration(&config),
        Err(AggregatorError::InvalidConfiguration {
            field: "queue_capacity",
            ..
        })
    ));

    let config = AggregatorConfiguration::with_defaults().with_sketch_error_bounds(0.01, 1.0);
    assert!(matches!(
        StreamAggregator::from_configuration(&config),
        Err(AggregatorError::Sketch { .. })
    ));
}
