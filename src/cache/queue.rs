use super::entry::CachedAdEntry;
use crate::adapter::{
    AdEvent, AdEventSender, AdapterAd, AdapterEvent, EntryId, destroy_guarded, load_guarded,
};
use crate::auction::{Bid, BidResponse};
use crate::error::CacheError;
use crate::metrics::Metrics;
use crate::reporting::ErrorReporter;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Notify, mpsc, oneshot};
use tracing::{debug, info, warn};

struct PendingLoad {
    bid_id: String,
    done: oneshot::Sender<Result<(), CacheError>>,
}

#[derive(Default)]
struct QueueState {
    /// Cached entry ids, highest price first, FIFO among equal prices
    order: Vec<EntryId>,
    entries: HashMap<EntryId, CachedAdEntry>,
    loading: HashMap<EntryId, PendingLoad>,
    reservations: usize,
    evicted_auctions: Vec<String>,
}

impl QueueState {
    fn holds_bid(&self, bid_id: &str) -> bool {
        self.loading.values().any(|p| p.bid_id == bid_id)
            || self.entries.values().any(|e| e.bid().id == bid_id)
    }
}

/// Bounded, price-ordered store of loaded ads for one placement.
///
/// Capacity counts cached entries plus loads in flight, so the queue never
/// starts more loads than it could hold. Adapter callbacks arrive on a
/// channel drained by a dispatcher task; a callback for an entry whose load
/// already resolved is ignored.
pub struct AdCacheQueue {
    placement_id: String,
    max_capacity: usize,
    state: Mutex<QueueState>,
    destroyed: AtomicBool,
    next_id: AtomicU64,
    events_tx: mpsc::UnboundedSender<AdEvent>,
    lifecycle: Mutex<Option<mpsc::UnboundedSender<AdEvent>>>,
    changed: Notify,
    shutdown: Arc<Notify>,
    reporter: Arc<dyn ErrorReporter>,
    metrics: Arc<Metrics>,
}

impl AdCacheQueue {
    /// Create a queue and start its callback dispatcher. Must be called
    /// inside a Tokio runtime.
    pub fn new(
        placement_id: impl Into<String>,
        max_capacity: usize,
        reporter: Arc<dyn ErrorReporter>,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shutdown = Arc::new(Notify::new());
        let queue = Arc::new(Self {
            placement_id: placement_id.into(),
            max_capacity,
            state: Mutex::new(QueueState::default()),
            destroyed: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
            events_tx,
            lifecycle: Mutex::new(None),
            changed: Notify::new(),
            shutdown: shutdown.clone(),
            reporter,
            metrics,
        });
        tokio::spawn(Self::dispatch(Arc::downgrade(&queue), events_rx, shutdown));
        queue
    }

    async fn dispatch(
        queue: Weak<Self>,
        mut events: mpsc::UnboundedReceiver<AdEvent>,
        shutdown: Arc<Notify>,
    ) {
        loop {
            let event = tokio::select! {
                _ = shutdown.notified() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            let Some(queue) = queue.upgrade() else {
                break;
            };
            queue.handle_event(event);
        }
        debug!("Cache queue dispatcher stopped");
    }

    fn handle_event(&self, event: AdEvent) {
        if self.is_destroyed() {
            return;
        }
        match &event.event {
            AdapterEvent::Loaded => {
                self.resolve_load(event.entry, Ok(()));
            }
            AdapterEvent::FailedToLoad { reason } => {
                self.resolve_load(
                    event.entry,
                    Err(CacheError::FailedToLoad {
                        reason: reason.clone(),
                    }),
                );
            }
            AdapterEvent::Expired => {
                let was_loading = self.resolve_load(
                    event.entry,
                    Err(CacheError::FailedToLoad {
                        reason: "ad expired while loading".to_string(),
                    }),
                );
                if !was_loading {
                    if self.remove_ad(event.entry) {
                        info!(
                            "Evicted expired ad {} from placement {}",
                            event.entry, self.placement_id
                        );
                    }
                    self.forward(event);
                }
            }
            _ => self.forward(event),
        }
    }

    fn resolve_load(&self, entry: EntryId, outcome: Result<(), CacheError>) -> bool {
        let pending = self.state.lock().loading.remove(&entry);
        match pending {
            Some(pending) => {
                let _ = pending.done.send(outcome);
                true
            }
            None => {
                debug!(
                    "Ignoring load callback for resolved entry {} on placement {}",
                    entry, self.placement_id
                );
                false
            }
        }
    }

    fn forward(&self, event: AdEvent) {
        if let Some(tx) = self.lifecycle.lock().as_ref() {
            let _ = tx.send(event);
        }
    }

    /// Receive show/click/close/expire callbacks for entries of this queue.
    /// A new subscription replaces the previous one.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<AdEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        if !self.is_destroyed() {
            *self.lifecycle.lock() = Some(tx);
        }
        rx
    }

    fn reserve(
        &self,
        bid_id: &str,
    ) -> Result<(EntryId, oneshot::Receiver<Result<(), CacheError>>), CacheError> {
        let mut state = self.state.lock();
        if self.is_destroyed() {
            return Err(CacheError::Destroyed);
        }
        if state.order.len() + state.reservations >= self.max_capacity {
            return Err(CacheError::QueueOverflow {
                capacity: self.max_capacity,
            });
        }
        if state.holds_bid(bid_id) {
            return Err(CacheError::DuplicateBid {
                bid_id: bid_id.to_string(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (done, rx) = oneshot::channel();
        state.reservations += 1;
        state.loading.insert(
            id,
            PendingLoad {
                bid_id: bid_id.to_string(),
                done,
            },
        );
        Ok((id, rx))
    }

    /// Load `ad` and cache it once the adapter confirms.
    ///
    /// Holds a reservation for the whole load. On failure, timeout or destroy
    /// the reservation is released and the ad destroyed.
    pub async fn enqueue_ad(
        &self,
        price: f64,
        load_timeout: Duration,
        bid: Arc<Bid>,
        response: Arc<BidResponse>,
        ad: Option<Box<dyn AdapterAd>>,
    ) -> Result<EntryId, CacheError> {
        let Some(mut ad) = ad else {
            warn!(
                "Bid {} on placement {} has no ad object",
                bid.id, self.placement_id
            );
            return Err(CacheError::AdIsNil);
        };

        let (id, done) = match self.reserve(&bid.id) {
            Ok(reserved) => reserved,
            Err(e) => {
                destroy_guarded(ad.as_mut(), self.reporter.as_ref());
                return Err(e);
            }
        };

        debug!(
            "Loading {} bid {} (price {}) into placement {} as entry {}",
            ad.network(),
            bid.id,
            price,
            self.placement_id,
            id
        );
        load_guarded(
            ad.as_mut(),
            AdEventSender::new(id, self.events_tx.clone()),
            self.reporter.as_ref(),
        );

        let outcome = match tokio::time::timeout(load_timeout, done).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(CacheError::Destroyed),
            Err(_) => Err(CacheError::Timeout {
                timeout: load_timeout,
            }),
        };

        self.complete_load(id, price, bid, response, ad, outcome)
    }

    fn complete_load(
        &self,
        id: EntryId,
        price: f64,
        bid: Arc<Bid>,
        response: Arc<BidResponse>,
        ad: Box<dyn AdapterAd>,
        outcome: Result<(), CacheError>,
    ) -> Result<EntryId, CacheError> {
        let bid_id = bid.id.clone();
        let mut rejected = None;
        let result = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            state.loading.remove(&id);
            state.reservations = state.reservations.saturating_sub(1);

            match outcome {
                Ok(()) if !self.is_destroyed() => {
                    let position = state
                        .order
                        .iter()
                        .position(|other| state.entries.get(other).is_none_or(|e| e.price() < price))
                        .unwrap_or(state.order.len());
                    state.order.insert(position, id);
                    state.entries.insert(
                        id,
                        CachedAdEntry::new(id, price, bid, response, ad, self.reporter.clone()),
                    );
                    Ok(id)
                }
                Ok(()) => {
                    rejected = Some(ad);
                    Err(CacheError::Destroyed)
                }
                Err(e) => {
                    rejected = Some(ad);
                    Err(e)
                }
            }
        };

        if let Some(mut ad) = rejected {
            destroy_guarded(ad.as_mut(), self.reporter.as_ref());
        }

        match &result {
            Ok(_) => {
                self.metrics.record_ad_load(true);
                info!(
                    "Cached bid {} on placement {} ({} ready)",
                    bid_id,
                    self.placement_id,
                    self.len()
                );
            }
            Err(CacheError::Timeout { timeout }) => {
                self.metrics.record_ad_load_timeout();
                warn!(
                    "Bid {} on placement {} did not load within {:?}",
                    bid_id, self.placement_id, timeout
                );
            }
            Err(CacheError::Destroyed) => {
                debug!("Load of bid {} abandoned, queue destroyed", bid_id);
            }
            Err(e) => {
                self.metrics.record_ad_load(false);
                warn!(
                    "Bid {} on placement {} failed to load: {}",
                    bid_id, self.placement_id, e
                );
            }
        }
        self.changed.notify_one();
        result
    }

    /// Take the best cached ad. The caller owns it from here on.
    pub fn pop_ad(&self) -> Option<CachedAdEntry> {
        let entry = {
            let mut state = self.state.lock();
            if state.order.is_empty() {
                return None;
            }
            let id = state.order.remove(0);
            state.entries.remove(&id)
        };
        if entry.is_some() {
            self.changed.notify_one();
        }
        entry
    }

    /// Drop a cached entry and destroy its ad. Returns `false` for unknown ids.
    pub fn remove_ad(&self, id: EntryId) -> bool {
        let entry = {
            let mut state = self.state.lock();
            let entry = state.entries.remove(&id);
            if let Some(entry) = &entry {
                state.order.retain(|other| *other != id);
                state.evicted_auctions.push(entry.auction_id().to_string());
            }
            entry
        };
        match entry {
            Some(entry) => {
                drop(entry);
                self.changed.notify_one();
                true
            }
            None => false,
        }
    }

    /// Auctions whose entries were evicted since the last call
    pub fn take_evicted_auctions(&self) -> Vec<String> {
        mem::take(&mut self.state.lock().evicted_auctions)
    }

    /// Tear down: destroy every cached ad and fail every load in flight.
    /// Callbacks arriving later are ignored. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shutdown.notify_one();

        let (entries, loading) = {
            let mut state = self.state.lock();
            state.order.clear();
            state.evicted_auctions.clear();
            (mem::take(&mut state.entries), mem::take(&mut state.loading))
        };
        let cached = entries.len();
        let in_flight = loading.len();
        drop(loading);
        drop(entries);
        self.lifecycle.lock().take();
        self.changed.notify_one();

        info!(
            "Destroyed cache queue for placement {} ({} cached, {} loading)",
            self.placement_id, cached, in_flight
        );
    }

    /// Resolves after the queue content or reservations change
    pub async fn changed(&self) {
        self.changed.notified().await
    }

    pub fn placement_id(&self) -> &str {
        &self.placement_id
    }

    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn reservations(&self) -> usize {
        self.state.lock().reservations
    }

    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// Room for one more load
    pub fn is_enough_space(&self) -> bool {
        let state = self.state.lock();
        state.order.len() + state.reservations < self.max_capacity
    }

    pub fn peek_price(&self) -> Option<f64> {
        let state = self.state.lock();
        state
            .order
            .first()
            .and_then(|id| state.entries.get(id))
            .map(|e| e.price())
    }

    /// Cached prices in pop order
    pub fn prices(&self) -> Vec<f64> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.entries.get(id).map(|e| e.price()))
            .collect()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }
}

impl Drop for AdCacheQueue {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}
