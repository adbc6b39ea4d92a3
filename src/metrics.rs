use std::sync::Arc;
/// Mediation counters shared by every placement
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Metrics collector for auction, cache and notification activity
#[derive(Clone, Debug)]
pub struct Metrics {
    /// Bid requests sent
    pub auctions_requested: Arc<AtomicU64>,
    /// Bid requests that ended without bids
    pub auctions_failed: Arc<AtomicU64>,
    /// Bids received across all auctions
    pub bids_received: Arc<AtomicU64>,
    /// Total auction round-trip time in microseconds
    pub total_auction_time_us: Arc<AtomicU64>,
    /// Adapter loads that ended in the cache
    pub ads_loaded: Arc<AtomicU64>,
    /// Adapter loads that failed
    pub ad_load_failures: Arc<AtomicU64>,
    /// Adapter loads that hit the deadline
    pub ad_load_timeouts: Arc<AtomicU64>,
    /// Ads handed to a surface and shown
    pub ads_shown: Arc<AtomicU64>,
    /// Win notifications delivered
    pub wins_sent: Arc<AtomicU64>,
    /// Loss notifications delivered
    pub losses_sent: Arc<AtomicU64>,
    /// Notifications that failed and were persisted
    pub notifications_persisted: Arc<AtomicU64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            auctions_requested: Arc::new(AtomicU64::new(0)),
            auctions_failed: Arc::new(AtomicU64::new(0)),
            bids_received: Arc::new(AtomicU64::new(0)),
            total_auction_time_us: Arc::new(AtomicU64::new(0)),
            ads_loaded: Arc::new(AtomicU64::new(0)),
            ad_load_failures: Arc::new(AtomicU64::new(0)),
            ad_load_timeouts: Arc::new(AtomicU64::new(0)),
            ads_shown: Arc::new(AtomicU64::new(0)),
            wins_sent: Arc::new(AtomicU64::new(0)),
            losses_sent: Arc::new(AtomicU64::new(0)),
            notifications_persisted: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a finished auction round-trip
    pub fn record_auction(&self, bids: u64, duration: Duration) {
        self.auctions_requested.fetch_add(1, Ordering::Relaxed);
        if bids == 0 {
            self.auctions_failed.fetch_add(1, Ordering::Relaxed);
        }
        self.bids_received.fetch_add(bids, Ordering::Relaxed);
        self.total_auction_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    /// Record an adapter load outcome
    pub fn record_ad_load(&self, success: bool) {
        if success {
            self.ads_loaded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.ad_load_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_ad_load_timeout(&self) {
        self.ad_load_timeouts.fetch_add(1, Ordering::Relaxed);
        self.ad_load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ad_shown(&self) {
        self.ads_shown.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivered win or loss notification
    pub fn record_notification(&self, is_win: bool) {
        if is_win {
            self.wins_sent.fetch_add(1, Ordering::Relaxed);
        } else {
            self.losses_sent.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_notification_persisted(&self) {
        self.notifications_persisted.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let auctions = self.auctions_requested.load(Ordering::Relaxed);
        let failed = self.auctions_failed.load(Ordering::Relaxed);
        let total_time_us = self.total_auction_time_us.load(Ordering::Relaxed);

        MetricsSnapshot {
            auctions_requested: auctions,
            auctions_failed: failed,
            bids_received: self.bids_received.load(Ordering::Relaxed),
            ads_loaded: self.ads_loaded.load(Ordering::Relaxed),
            ad_load_failures: self.ad_load_failures.load(Ordering::Relaxed),
            ad_load_timeouts: self.ad_load_timeouts.load(Ordering::Relaxed),
            ads_shown: self.ads_shown.load(Ordering::Relaxed),
            wins_sent: self.wins_sent.load(Ordering::Relaxed),
            losses_sent: self.losses_sent.load(Ordering::Relaxed),
            notifications_persisted: self.notifications_persisted.load(Ordering::Relaxed),
            average_auction_time_ms: if auctions > 0 {
                (total_time_us as f64 / auctions as f64) / 1000.0
            } else {
                0.0
            },
            fill_rate: if auctions > 0 {
                ((auctions - failed) as f64 / auctions as f64) * 100.0
            } else {
                0.0
            },
        }
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub auctions_requested: u64,
    pub auctions_failed: u64,
    pub bids_received: u64,
    pub ads_loaded: u64,
    pub ad_load_failures: u64,
    pub ad_load_timeouts: u64,
    pub ads_shown: u64,
    pub wins_sent: u64,
    pub losses_sent: u64,
    pub notifications_persisted: u64,
    pub average_auction_time_ms: f64,
    pub fill_rate: f64,
}

/// Helper for timing operations
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed time
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
