use mediation_core::metrics::{Metrics, Timer};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[test]
fn test_metrics_new() {
    let snapshot = Metrics::new().snapshot();
    assert_eq!(snapshot.auctions_requested, 0);
    assert_eq!(snapshot.ads_loaded, 0);
    assert_eq!(snapshot.wins_sent, 0);
    assert_eq!(snapshot.average_auction_time_ms, 0.0);
    assert_eq!(snapshot.fill_rate, 0.0);
}

#[test]
fn test_auction_fill_rate() {
    let metrics = Metrics::new();
    metrics.record_auction(3, Duration::from_millis(10));
    metrics.record_auction(1, Duration::from_millis(20));
    metrics.record_auction(0, Duration::from_millis(30));
    metrics.record_auction(2, Duration::from_millis(40));

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.auctions_requested, 4);
    assert_eq!(snapshot.auctions_failed, 1);
    assert_eq!(snapshot.bids_received, 6);
    assert_eq!(snapshot.fill_rate, 75.0);
    assert_eq!(snapshot.average_auction_time_ms, 25.0);
}

#[test]
fn test_ad_and_notification_counters() {
    let metrics = Metrics::new();
    metrics.record_ad_load(true);
    metrics.record_ad_load(false);
    metrics.record_ad_load_timeout();
    metrics.record_ad_shown();
    metrics.record_notification(true);
    metrics.record_notification(false);
    metrics.record_notification(false);
    metrics.record_notification_persisted();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.ads_loaded, 1);
    // Timeouts also count as failures
    assert_eq!(snapshot.ad_load_failures, 2);
    assert_eq!(snapshot.ad_load_timeouts, 1);
    assert_eq!(snapshot.ads_shown, 1);
    assert_eq!(snapshot.wins_sent, 1);
    assert_eq!(snapshot.losses_sent, 2);
    assert_eq!(snapshot.notifications_persisted, 1);
}

#[test]
fn test_metrics_shared_across_threads() {
    let metrics = Arc::new(Metrics::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let metrics = metrics.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    metrics.record_ad_shown();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(metrics.ads_shown.load(Ordering::Relaxed), 800);
}

#[test]
fn test_snapshot_serializes() {
    let metrics = Metrics::new();
    metrics.record_auction(1, Duration::from_millis(5));
    let json = serde_json::to_value(metrics.snapshot()).unwrap();
    assert_eq!(json["auctions_requested"], 1);
    assert_eq!(json["fill_rate"], 100.0);
}

#[test]
fn test_timer() {
    let timer = Timer::start();
    std::thread::sleep(Duration::from_millis(5));
    assert!(timer.elapsed() >= Duration::from_millis(5));
}
