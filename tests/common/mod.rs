#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use mediation_core::adapter::{AdEventSender, AdapterAd, AdapterEvent, AdapterFactory};
use mediation_core::auction::{Bid, BidResponse};
use mediation_core::config::{AppConfig, PlacementConfig};
use mediation_core::error::TransportError;
use mediation_core::reporting::ErrorReporter;
use mediation_core::transport::{HttpResponse, HttpTransport};
use mediation_core::{AdType, SurfaceHandle};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::time::Duration;

pub const AUCTION_URL: &str = "http://auction.test/openrtb2/auction";
pub const WIN_LOSS_URL: &str = "http://events.test/win-loss";
pub const APP_KEY: &str = "test-app-key";

/// Wait until `condition` holds or `timeout` passes
pub async fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// Scripted reply for the auction endpoint
#[derive(Debug, Clone)]
pub enum AuctionReply {
    Body(String),
    Status(u16),
    Fail,
    Hang,
    /// Answer with the body after a pause
    Delayed(Duration, String),
}

/// In-memory transport: auction replies come from a script, every other
/// POST answers with a configurable status.
pub struct MockTransport {
    auction_replies: Mutex<VecDeque<AuctionReply>>,
    requests: Mutex<Vec<RecordedRequest>>,
    notify_status: AtomicU16,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            auction_replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            notify_status: AtomicU16::new(200),
        })
    }

    pub fn push_auction(&self, reply: AuctionReply) {
        self.auction_replies.lock().push_back(reply);
    }

    pub fn set_notify_status(&self, status: u16) {
        self.notify_status.store(status, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().clone()
    }

    pub fn auction_requests(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url == AUCTION_URL)
            .collect()
    }

    pub fn notifications(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url == WIN_LOSS_URL)
            .collect()
    }

    pub fn gets(&self) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == "GET")
            .collect()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Bytes,
        _timeout: Duration,
    ) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(RecordedRequest {
            method: "POST",
            url: url.to_string(),
            headers: headers.to_vec(),
            body: serde_json::from_slice(&body).unwrap_or(Value::Null),
        });

        if url != AUCTION_URL {
            return Ok(HttpResponse {
                status: self.notify_status.load(Ordering::SeqCst),
                body: Bytes::new(),
            });
        }

        let reply = self
            .auction_replies
            .lock()
            .pop_front()
            .unwrap_or(AuctionReply::Status(204));
        match reply {
            AuctionReply::Body(body) => Ok(HttpResponse {
                status: 200,
                body: Bytes::from(body),
            }),
            AuctionReply::Status(status) => Ok(HttpResponse {
                status,
                body: Bytes::new(),
            }),
            AuctionReply::Fail => Err(TransportError::RequestFailed {
                url: url.to_string(),
                reason: "connection refused".to_string(),
            }),
            AuctionReply::Delayed(delay, body) => {
                tokio::time::sleep(delay).await;
                Ok(HttpResponse {
                    status: 200,
                    body: Bytes::from(body),
                })
            }
            AuctionReply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TransportError::RequestFailed {
                    url: url.to_string(),
                    reason: "unreachable".to_string(),
                })
            }
        }
    }

    async fn get(&self, url: &str, _timeout: Duration) -> Result<HttpResponse, TransportError> {
        self.requests.lock().push(RecordedRequest {
            method: "GET",
            url: url.to_string(),
            headers: Vec::new(),
            body: Value::Null,
        });
        Ok(HttpResponse {
            status: 200,
            body: Bytes::new(),
        })
    }
}

/// Adapter whose behaviour is chosen by the bid's `adm`:
/// `load`, `fail`, `hang`, `slow:<ms>`, `panic` (loads, panics on destroy)
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    pub created: Arc<AtomicUsize>,
    pub destroyed: Arc<AtomicUsize>,
    pub shown: Arc<AtomicUsize>,
    senders: Arc<Mutex<Vec<AdEventSender>>>,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn shown(&self) -> usize {
        self.shown.load(Ordering::SeqCst)
    }

    /// Event sender handed to the most recent `load`
    pub fn last_sender(&self) -> Option<AdEventSender> {
        self.senders.lock().last().cloned()
    }

    pub fn sender_for(&self, entry: u64) -> Option<AdEventSender> {
        self.senders
            .lock()
            .iter()
            .find(|s| s.entry() == entry)
            .cloned()
    }
}

impl AdapterFactory for ScriptedFactory {
    fn create(&self, _ad_type: AdType, bid: &Bid) -> Option<Box<dyn AdapterAd>> {
        if bid.adm.as_deref() == Some("nil") {
            return None;
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(ScriptedAd {
            script: bid.adm.clone().unwrap_or_else(|| "load".to_string()),
            factory: self.clone(),
            events: None,
        }))
    }

    fn bidder_info(&self) -> HashMap<String, String> {
        HashMap::from([("token".to_string(), "scripted-token".to_string())])
    }
}

pub struct ScriptedAd {
    script: String,
    factory: ScriptedFactory,
    events: Option<AdEventSender>,
}

impl ScriptedAd {
    pub fn boxed(factory: &ScriptedFactory, script: &str) -> Box<dyn AdapterAd> {
        factory.created.fetch_add(1, Ordering::SeqCst);
        Box::new(Self {
            script: script.to_string(),
            factory: factory.clone(),
            events: None,
        })
    }
}

impl AdapterAd for ScriptedAd {
    fn network(&self) -> &str {
        "scripted"
    }

    fn load(&mut self, events: AdEventSender) {
        self.factory.senders.lock().push(events.clone());
        self.events = Some(events.clone());
        let script = self.script.clone();
        tokio::spawn(async move {
            match script.as_str() {
                "fail" => {
                    events.failed_to_load("no fill from network");
                }
                "hang" => {}
                slow if slow.starts_with("slow:") => {
                    let ms = slow[5..].parse().unwrap_or(10);
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    events.loaded();
                }
                _ => {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    events.loaded();
                }
            }
        });
    }

    fn show(&mut self, _surface: &SurfaceHandle) {
        self.factory.shown.fetch_add(1, Ordering::SeqCst);
        if let Some(events) = &self.events {
            events.send(AdapterEvent::Shown);
            events.send(AdapterEvent::Impression);
        }
    }

    fn destroy(&mut self) {
        self.factory.destroyed.fetch_add(1, Ordering::SeqCst);
        if self.script == "panic" {
            panic!("adapter exploded");
        }
    }
}

/// Reporter that keeps every report
#[derive(Default)]
pub struct RecordingReporter {
    pub reports: Mutex<Vec<(String, String)>>,
}

impl RecordingReporter {
    pub fn count(&self) -> usize {
        self.reports.lock().len()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, context: &str, message: &str) {
        self.reports
            .lock()
            .push((context.to_string(), message.to_string()));
    }
}

pub fn wire_bid(id: &str, price: f64, adm: &str, rank: u32) -> Value {
    json!({
        "id": id,
        "impid": "imp-1",
        "price": price,
        "adm": adm,
        "nurl": format!("http://track.test/win/{}?price=${{AUCTION_PRICE}}", id),
        "lurl": format!("http://track.test/loss/{}?reason=${{AUCTION_LOSS}}", id),
        "ext": {
            "prebid": { "meta": { "adaptercode": "scripted" } },
            "cloudx": { "rank": rank }
        }
    })
}

pub fn auction_body(auction_id: &str, bids: Vec<Value>) -> String {
    json!({
        "id": auction_id,
        "cur": "USD",
        "seatbid": [{ "seat": "scripted", "bid": bids }]
    })
    .to_string()
}

pub fn bid(id: &str, price: f64) -> Bid {
    Bid {
        id: id.to_string(),
        imp_id: "imp-1".to_string(),
        price,
        adm: Some("load".to_string()),
        ad_id: None,
        nurl: None,
        lurl: None,
        burl: None,
        deal_id: None,
        adapter_code: "scripted".to_string(),
        rank: None,
        adapter_extras: HashMap::new(),
        seat: None,
    }
}

pub fn response_for(auction_id: &str, bids: &[Bid]) -> Arc<BidResponse> {
    Arc::new(BidResponse::new(auction_id, bids.to_vec()))
}

pub fn placement(id: &str, ad_type: AdType) -> PlacementConfig {
    PlacementConfig {
        id: id.to_string(),
        name: format!("{} placement", id),
        ad_type,
        refresh_interval_ms: None,
        suspend_when_hidden: false,
        cache_size: Some(1),
    }
}

/// Config pointing at the mock endpoints with fast timings
pub fn test_config(placements: Vec<PlacementConfig>) -> AppConfig {
    let mut config = AppConfig::default();
    config.sdk.app_key = APP_KEY.to_string();
    config.auction.endpoint = AUCTION_URL.to_string();
    config.auction.tmax_ms = 500;
    config.cache.bid_load_timeout_ms = 200;
    config.waterfall.initial_backoff_ms = 10;
    config.waterfall.max_backoff_ms = 40;
    config.win_loss.endpoint = Some(WIN_LOSS_URL.to_string());
    config.win_loss.payload = HashMap::from([
        ("auctionId".to_string(), "auction.id".to_string()),
        ("bidId".to_string(), "bid.id".to_string()),
        ("type".to_string(), "sdk.notificationType".to_string()),
        ("lossReason".to_string(), "sdk.lossReason".to_string()),
    ]);
    config.placements = placements;
    config
}
