use super::entry::CachedAdEntry;
use super::queue::AdCacheQueue;
use crate::adapter::EntryId;
use crate::config::{AppConfig, PlacementConfig, RetryConfig};
use crate::error::{CacheError, MediationError, MediationResult};
use crate::session::MediationServices;
use crate::types::LossReason;
use crate::utils::BackoffStrategy;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Where a placement's fill loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    AuctionPending,
    LoadingCandidate,
    Cached,
    Destroyed,
}

/// Fill loop notifications for surfaces
#[derive(Debug, Clone)]
pub enum CacheEvent {
    AdCached {
        entry: EntryId,
        auction_id: String,
        price: f64,
    },
    LoadFailed(MediationError),
}

/// Tunables of one placement's fill loop
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub cache_size: usize,
    pub load_timeout: Duration,
    pub tmax: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: Option<u32>,
    pub retries: RetryConfig,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig, placement: &PlacementConfig) -> Self {
        Self {
            cache_size: config.cache_size_for(placement),
            load_timeout: config.bid_load_timeout(),
            tmax: config.tmax(),
            initial_backoff: Duration::from_millis(config.waterfall.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.waterfall.max_backoff_ms),
            max_attempts: config.waterfall.max_attempts,
            retries: config.retries.clone(),
        }
    }

    fn backoff(&self) -> BackoffStrategy {
        match self.max_attempts {
            Some(max) => {
                BackoffStrategy::with_max_attempts(self.initial_backoff, self.max_backoff, max)
            }
            None => BackoffStrategy::new(self.initial_backoff, self.max_backoff),
        }
    }
}

struct Inner {
    placement: PlacementConfig,
    settings: OrchestratorSettings,
    queue: Arc<AdCacheQueue>,
    services: Arc<MediationServices>,
    state: Mutex<OrchestratorState>,
    suspended: AtomicBool,
    parked: AtomicBool,
    destroyed: AtomicBool,
    shutdown: watch::Sender<bool>,
    wake: Notify,
    restart: Notify,
    events: broadcast::Sender<CacheEvent>,
    live_auctions: Mutex<HashSet<String>>,
}

/// Keeps one placement's cache full.
///
/// A background loop runs auctions while the queue has room, walks each
/// auction's bids in rank order until one loads, records the outcome and
/// fires win/loss notifications. Exhausted waterfalls back off exponentially;
/// retries can be switched off per ad type. Dropping the orchestrator
/// destroys it.
pub struct CacheOrchestrator {
    inner: Arc<Inner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CacheOrchestrator {
    pub fn new(
        placement: PlacementConfig,
        settings: OrchestratorSettings,
        services: Arc<MediationServices>,
    ) -> Self {
        let queue = AdCacheQueue::new(
            placement.id.clone(),
            settings.cache_size,
            services.reporter.clone(),
            services.metrics.clone(),
        );
        let (shutdown, _) = watch::channel(false);
        let (events, _) = broadcast::channel(16);

        Self {
            inner: Arc::new(Inner {
                placement,
                settings,
                queue,
                services,
                state: Mutex::new(OrchestratorState::Idle),
                suspended: AtomicBool::new(false),
                parked: AtomicBool::new(false),
                destroyed: AtomicBool::new(false),
                shutdown,
                wake: Notify::new(),
                restart: Notify::new(),
                events,
                live_auctions: Mutex::new(HashSet::new()),
            }),
            task: Mutex::new(None),
        }
    }

    /// Start the fill loop, or restart it after a terminal failure
    pub fn start(&self) {
        if self.is_destroyed() {
            return;
        }
        let mut task = self.task.lock();
        match task.as_ref() {
            Some(handle) if !handle.is_finished() => {
                if self.inner.unpark() {
                    debug!("Restarting fill loop for {}", self.inner.placement.id);
                }
            }
            _ => {
                info!(
                    "Starting fill loop for placement {} ({}, cache size {})",
                    self.inner.placement.id,
                    self.inner.placement.ad_type,
                    self.inner.settings.cache_size
                );
                *task = Some(tokio::spawn(Inner::run(self.inner.clone())));
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// Take the best cached ad; the loop refills behind it
    pub fn pop_ad(&self) -> Option<CachedAdEntry> {
        self.inner.queue.pop_ad()
    }

    /// Hand back an ad that left the cache: forgets its auction and
    /// destroys the adapter.
    pub fn release(&self, entry: CachedAdEntry) {
        self.inner.forget_auction(entry.auction_id());
        drop(entry);
    }

    /// Stop starting new auctions; loads in flight finish
    pub fn suspend(&self) {
        if !self.inner.suspended.swap(true, Ordering::SeqCst) {
            info!("Suspended placement {}", self.inner.placement.id);
        }
    }

    pub fn resume(&self) {
        if self.inner.suspended.swap(false, Ordering::SeqCst) {
            info!("Resumed placement {}", self.inner.placement.id);
            self.inner.wake.notify_one();
            self.inner.unpark();
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.suspended.load(Ordering::SeqCst)
    }

    /// Terminal: destroy the queue, forget live auctions, stop the loop.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.send_replace(true);
        self.inner.queue.destroy();

        let auctions: Vec<String> = self.inner.live_auctions.lock().drain().collect();
        for auction_id in &auctions {
            self.inner.services.bid_manager.clear_auction(auction_id);
            self.inner.services.notifier.forget_auction(auction_id);
        }
        self.inner.set_state(OrchestratorState::Destroyed);
        self.inner
            .publish(CacheEvent::LoadFailed(CacheError::Destroyed.into()));
        info!(
            "Destroyed placement {} ({} live auction(s) cleared)",
            self.inner.placement.id,
            auctions.len()
        );
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_destroyed()
    }

    pub fn state(&self) -> OrchestratorState {
        *self.inner.state.lock()
    }

    pub fn queue(&self) -> &Arc<AdCacheQueue> {
        &self.inner.queue
    }

    pub fn placement(&self) -> &PlacementConfig {
        &self.inner.placement
    }

    pub fn live_auctions(&self) -> usize {
        self.inner.live_auctions.lock().len()
    }
}

impl Drop for CacheOrchestrator {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl Inner {
    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: OrchestratorState) {
        let mut current = self.state.lock();
        if *current != OrchestratorState::Destroyed {
            *current = state;
        }
    }

    fn resting_state(&self) -> OrchestratorState {
        if self.queue.is_empty() {
            OrchestratorState::Idle
        } else {
            OrchestratorState::Cached
        }
    }

    fn publish(&self, event: CacheEvent) {
        let _ = self.events.send(event);
    }

    fn has_room(&self) -> bool {
        self.queue.is_enough_space() && self.queue.len() < self.settings.cache_size
    }

    fn forget_auction(&self, auction_id: &str) {
        self.live_auctions.lock().remove(auction_id);
        self.services.bid_manager.clear_auction(auction_id);
        self.services.notifier.forget_auction(auction_id);
    }

    /// Release a loop parked after a terminal failure; no-op otherwise
    fn unpark(&self) -> bool {
        let was_parked = self
            .parked
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if was_parked {
            self.restart.notify_one();
        }
        was_parked
    }

    async fn run(inner: Arc<Inner>) {
        let mut backoff = inner.settings.backoff();
        let mut shutdown = inner.shutdown.subscribe();
        let ad_type = inner.placement.ad_type;

        loop {
            if inner.is_destroyed() {
                break;
            }
            for auction_id in inner.queue.take_evicted_auctions() {
                inner.forget_auction(&auction_id);
            }

            if inner.suspended.load(Ordering::SeqCst) {
                inner.set_state(inner.resting_state());
                tokio::select! {
                    _ = inner.wake.notified() => {}
                    _ = shutdown.wait_for(|d| *d) => break,
                }
                continue;
            }

            if !inner.has_room() {
                inner.set_state(inner.resting_state());
                tokio::select! {
                    _ = inner.queue.changed() => {}
                    _ = inner.wake.notified() => {}
                    _ = shutdown.wait_for(|d| *d) => break,
                }
                continue;
            }

            let error = match inner.run_cycle(&mut shutdown).await {
                Ok(()) => {
                    backoff.reset();
                    continue;
                }
                Err(MediationError::Cache(CacheError::Destroyed)) => break,
                Err(e) => e,
            };

            inner.set_state(inner.resting_state());

            let next_delay = if inner.settings.retries.is_enabled(ad_type) {
                backoff.next_delay().map_err(MediationError::from)
            } else {
                Err(MediationError::RetriesDisabled { ad_type })
            };

            match next_delay {
                Ok(delay) => {
                    inner.publish(CacheEvent::LoadFailed(error));
                    debug!(
                        "Placement {} retrying in {:?} (attempt {})",
                        inner.placement.id,
                        delay,
                        backoff.attempt()
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.wait_for(|d| *d) => break,
                    }
                }
                Err(terminal) => {
                    warn!(
                        "Placement {} stopped loading: {}",
                        inner.placement.id, terminal
                    );
                    // Parked before the failure is published
                    inner.parked.store(true, Ordering::SeqCst);
                    inner.publish(CacheEvent::LoadFailed(error));
                    inner.publish(CacheEvent::LoadFailed(terminal));
                    let mut stopped = false;
                    while inner.parked.load(Ordering::SeqCst) {
                        tokio::select! {
                            _ = inner.restart.notified() => {}
                            _ = shutdown.wait_for(|d| *d) => {
                                stopped = true;
                                break;
                            }
                        }
                    }
                    if stopped {
                        break;
                    }
                    backoff.reset();
                }
            }
        }

        inner.set_state(OrchestratorState::Destroyed);
        debug!("Fill loop for {} exited", inner.placement.id);
    }

    /// One auction and its waterfall
    async fn run_cycle(&self, shutdown: &mut watch::Receiver<bool>) -> MediationResult<()> {
        let services = &self.services;
        let bid_manager = &services.bid_manager;
        let ad_type = self.placement.ad_type;

        self.set_state(OrchestratorState::AuctionPending);
        let request = services.request_builder.build(
            &self.placement,
            services.registry.adapter_info(),
            self.settings.tmax,
        );
        let response = tokio::select! {
            result = services.client.request_bids(&request, self.settings.tmax) => result?,
            _ = shutdown.wait_for(|d| *d) => return Err(CacheError::Destroyed.into()),
        };

        let response = Arc::new(response);
        let auction_id = response.auction_id.clone();
        for bid in response.bids() {
            bid_manager.add_bid(&auction_id, bid.clone());
        }
        self.live_auctions.lock().insert(auction_id.clone());

        let mut winner = None;
        let mut overflowed = false;
        for bid in response.bids() {
            if self.is_destroyed() {
                break;
            }
            self.set_state(OrchestratorState::LoadingCandidate);

            let ad = match services.registry.resolve(&bid.adapter_code) {
                Some(factory) => factory.create(ad_type, bid),
                None => {
                    warn!("No adapter registered for network {}", bid.adapter_code);
                    None
                }
            };
            let outcome = match ad {
                Some(ad) => {
                    self.queue
                        .enqueue_ad(
                            bid.price,
                            self.settings.load_timeout,
                            bid.clone(),
                            response.clone(),
                            Some(ad),
                        )
                        .await
                }
                None => Err(CacheError::FailedToCreateAd {
                    network: bid.adapter_code.clone(),
                }),
            };

            match outcome {
                Ok(entry) => {
                    winner = Some((bid.clone(), entry));
                    break;
                }
                Err(CacheError::Destroyed) => break,
                Err(CacheError::QueueOverflow { .. }) => {
                    overflowed = true;
                    break;
                }
                Err(e) => {
                    debug!(
                        "Bid {} ({}) failed, moving down the waterfall: {}",
                        bid.id, bid.adapter_code, e
                    );
                    bid_manager.set_bid_load_result(
                        &auction_id,
                        &bid.id,
                        false,
                        Some(LossReason::TechnicalError),
                    );
                }
            }
        }

        if self.is_destroyed() {
            self.forget_auction(&auction_id);
            return Err(CacheError::Destroyed.into());
        }

        match winner {
            Some((bid, entry)) => {
                bid_manager.set_bid_load_result(&auction_id, &bid.id, true, None);
                if let Err(e) = bid_manager.set_winner(&auction_id, &bid.id) {
                    warn!("Could not record winner of auction {}: {}", auction_id, e);
                }
                let losers: Vec<_> = response
                    .bids()
                    .iter()
                    .filter(|other| other.id != bid.id)
                    .collect();
                for other in &losers {
                    bid_manager.set_bid_load_result(
                        &auction_id,
                        &other.id,
                        false,
                        Some(LossReason::LostToHigherBid),
                    );
                }

                services.notifier.send_win(&auction_id, &bid.id);
                for other in &losers {
                    services.notifier.send_loss(&auction_id, &other.id);
                }

                self.set_state(OrchestratorState::Cached);
                self.publish(CacheEvent::AdCached {
                    entry,
                    auction_id,
                    price: bid.price,
                });
                Ok(())
            }
            None => {
                // Bids the waterfall never reached lose to the ads already cached
                let untried = if overflowed {
                    LossReason::LostToHigherBid
                } else {
                    LossReason::TechnicalError
                };
                for bid in response.bids() {
                    bid_manager.set_bid_load_result(&auction_id, &bid.id, false, Some(untried));
                    services.notifier.send_loss(&auction_id, &bid.id);
                }
                self.forget_auction(&auction_id);

                if overflowed {
                    debug!("Queue for {} filled up mid-waterfall", self.placement.id);
                    return Ok(());
                }
                Err(CacheError::FailedToLoad {
                    reason: format!(
                        "waterfall exhausted, {} bid(s) failed to load",
                        response.len()
                    ),
                }
                .into())
            }
        }
    }
}
