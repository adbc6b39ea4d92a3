use super::resolver::{FieldResolver, PayloadContext};
use super::store::{PendingEventStore, PendingWinLossEvent};
use crate::auction::AuctionBidManager;
use crate::metrics::Metrics;
use crate::transport::HttpTransport;
use crate::utils::expand_macros;
use bytes::Bytes;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
struct NotifierSettings {
    app_key: Option<String>,
    endpoint: Option<String>,
    resolver: FieldResolver,
    fire_tracking_urls: bool,
}

/// Reports auction outcomes to the win/loss endpoint.
///
/// Sends are spawned and never block the caller. Each (auction, bid, outcome)
/// is sent at most once while the auction is live; failed deliveries land in
/// the pending store and are retried by [`WinLossNotifier::flush_pending`].
/// Sent keys are dropped by [`WinLossNotifier::forget_auction`].
pub struct WinLossNotifier {
    settings: RwLock<NotifierSettings>,
    bids: Arc<AuctionBidManager>,
    transport: Arc<dyn HttpTransport>,
    store: Arc<dyn PendingEventStore>,
    /// Auction id -> keys already sent for it
    sent: DashMap<String, HashSet<String>>,
    metrics: Arc<Metrics>,
    send_timeout: Duration,
}

impl WinLossNotifier {
    pub fn new(
        bids: Arc<AuctionBidManager>,
        transport: Arc<dyn HttpTransport>,
        store: Arc<dyn PendingEventStore>,
        metrics: Arc<Metrics>,
        send_timeout: Duration,
    ) -> Self {
        Self {
            settings: RwLock::new(NotifierSettings::default()),
            bids,
            transport,
            store,
            sent: DashMap::new(),
            metrics,
            send_timeout,
        }
    }

    pub fn set_app_key(&self, app_key: impl Into<String>) {
        self.settings.write().app_key = Some(app_key.into());
    }

    pub fn set_endpoint(&self, endpoint: Option<String>) {
        self.settings.write().endpoint = endpoint;
    }

    /// Install the payload key -> field template mapping
    pub fn set_config(&self, mapping: HashMap<String, String>) {
        self.settings.write().resolver = FieldResolver::new(mapping);
    }

    pub fn set_fire_tracking_urls(&self, enabled: bool) {
        self.settings.write().fire_tracking_urls = enabled;
    }

    pub fn send_win(&self, auction_id: &str, bid_id: &str) -> Option<JoinHandle<()>> {
        self.send(auction_id, bid_id, true)
    }

    pub fn send_loss(&self, auction_id: &str, bid_id: &str) -> Option<JoinHandle<()>> {
        self.send(auction_id, bid_id, false)
    }

    /// Build the payload now, deliver it in the background.
    ///
    /// Returns `None` when nothing was scheduled: not configured, bid unknown,
    /// or this notification was already sent.
    fn send(&self, auction_id: &str, bid_id: &str, is_win: bool) -> Option<JoinHandle<()>> {
        let (event, tracking_url) = {
            let settings = self.settings.read();
            let (Some(endpoint), Some(app_key)) = (&settings.endpoint, &settings.app_key) else {
                debug!("Win/loss endpoint or app key not set, skipping notification");
                return None;
            };
            if settings.resolver.is_empty() {
                debug!("No win/loss payload mapping, skipping notification");
                return None;
            }

            let Some(bid) = self.bids.get_bid(auction_id, bid_id) else {
                warn!(
                    "Cannot notify unknown bid {} of auction {}",
                    bid_id, auction_id
                );
                return None;
            };
            let loss_reason = if is_win {
                None
            } else {
                self.bids.get_loss_reason(auction_id, bid_id)
            };
            let ctx = PayloadContext {
                auction_id,
                bid: Some(bid.as_ref()),
                is_win,
                loss_reason,
                loaded_bid_price: self.bids.get_winning_price(auction_id),
            };
            let payload = settings.resolver.build_payload(&ctx)?;

            let tracking_url = if settings.fire_tracking_urls {
                let template = if is_win { &bid.nurl } else { &bid.lurl };
                template.as_deref().map(|url| {
                    let price = if ctx.loaded_bid_price > 0.0 {
                        ctx.loaded_bid_price
                    } else {
                        bid.price
                    };
                    let loss = loss_reason.map(|r| r.code().to_string()).unwrap_or_default();
                    expand_macros(
                        url,
                        &[("AUCTION_PRICE", price.to_string()), ("AUCTION_LOSS", loss)],
                    )
                })
            } else {
                None
            };

            (
                PendingWinLossEvent::new(auction_id, bid_id, is_win, endpoint, app_key, payload),
                tracking_url,
            )
        };

        let fresh = self
            .sent
            .entry(auction_id.to_string())
            .or_default()
            .insert(event.key.clone());
        if !fresh {
            debug!("Notification {} already sent", event.key);
            return None;
        }

        let transport = self.transport.clone();
        let store = self.store.clone();
        let metrics = self.metrics.clone();
        let timeout = self.send_timeout;

        Some(tokio::spawn(async move {
            let mut event = event;
            match deliver(transport.as_ref(), &event, timeout).await {
                Ok(()) => {
                    metrics.record_notification(event.is_win);
                    debug!("Delivered notification {}", event.key);
                }
                Err(reason) => {
                    warn!(
                        "Notification {} failed ({}), queued for retry",
                        event.key, reason
                    );
                    event.attempts += 1;
                    match store.save(event) {
                        Ok(()) => metrics.record_notification_persisted(),
                        Err(e) => error!("Failed to persist notification: {}", e),
                    }
                }
            }

            if let Some(url) = tracking_url {
                match transport.get(&url, timeout).await {
                    Ok(response) if response.is_success() => {
                        debug!("Fired tracking URL {}", url);
                    }
                    Ok(response) => {
                        warn!("Tracking URL {} returned {}", url, response.status);
                    }
                    Err(e) => warn!("Tracking URL failed: {}", e),
                }
            }
        }))
    }

    /// Retry every stored notification once. Returns how many were delivered.
    pub async fn flush_pending(&self) -> usize {
        let events = match self.store.load_all() {
            Ok(events) => events,
            Err(e) => {
                warn!("Failed to read pending notifications: {}", e);
                return 0;
            }
        };
        if events.is_empty() {
            return 0;
        }

        info!("Retrying {} pending win/loss notification(s)", events.len());
        let transport = self.transport.as_ref();
        let timeout = self.send_timeout;
        let results = join_all(events.into_iter().map(|event| async move {
            let result = deliver(transport, &event, timeout).await;
            (event, result)
        }))
        .await;

        let mut delivered = 0;
        for (mut event, result) in results {
            match result {
                Ok(()) => {
                    delivered += 1;
                    self.metrics.record_notification(event.is_win);
                    if let Err(e) = self.store.remove(&event.key) {
                        warn!("Failed to drop delivered notification {}: {}", event.key, e);
                    }
                }
                Err(reason) => {
                    debug!("Notification {} still failing: {}", event.key, reason);
                    event.attempts += 1;
                    if let Err(e) = self.store.save(event) {
                        warn!("Failed to update pending notification: {}", e);
                    }
                }
            }
        }
        delivered
    }

    /// Spawn [`Self::flush_pending`]
    pub fn try_sending_pending_win_loss_events(self: &Arc<Self>) -> JoinHandle<usize> {
        let notifier = self.clone();
        tokio::spawn(async move { notifier.flush_pending().await })
    }

    pub fn pending_count(&self) -> usize {
        self.store.len()
    }

    /// Drop the sent-once bookkeeping of a cleared auction
    pub fn forget_auction(&self, auction_id: &str) {
        self.sent.remove(auction_id);
    }

    /// Notifications remembered as sent, across live auctions
    pub fn sent_count(&self) -> usize {
        self.sent.iter().map(|keys| keys.len()).sum()
    }
}

async fn deliver(
    transport: &dyn HttpTransport,
    event: &PendingWinLossEvent,
    timeout: Duration,
) -> Result<(), String> {
    let body = serde_json::to_vec(&Value::Object(event.payload.clone())).map_err(|e| e.to_string())?;
    let headers = vec![(
        "authorization".to_string(),
        format!("Bearer {}", event.app_key),
    )];
    let response = transport
        .post_json(&event.endpoint, &headers, Bytes::from(body), timeout)
        .await
        .map_err(|e| e.to_string())?;
    if response.is_success() {
        Ok(())
    } else {
        Err(format!("status {}", response.status))
    }
}
