//! In-process adapter used by the demo binary and integration tests.
//!
//! A bid whose `adm` is missing or equals `"fail"` fails to load after the
//! configured delay; every other bid loads.

use super::{AdEventSender, AdapterAd, AdapterEvent, AdapterFactory};
use crate::auction::Bid;
use crate::types::{AdType, SurfaceHandle};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

pub const DEMO_NETWORK: &str = "demo";

#[derive(Debug, Clone)]
pub struct DemoAdapterFactory {
    load_delay: Duration,
    destroyed: Arc<AtomicUsize>,
}

impl DemoAdapterFactory {
    pub fn new(load_delay: Duration) -> Self {
        Self {
            load_delay,
            destroyed: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of demo ads destroyed so far
    pub fn destroyed_count(&self) -> usize {
        self.destroyed.load(Ordering::Relaxed)
    }
}

impl Default for DemoAdapterFactory {
    fn default() -> Self {
        Self::new(Duration::from_millis(50))
    }
}

impl AdapterFactory for DemoAdapterFactory {
    fn create(&self, ad_type: AdType, bid: &Bid) -> Option<Box<dyn AdapterAd>> {
        Some(Box::new(DemoAd {
            bid_id: bid.id.clone(),
            ad_type,
            fill: bid.adm.as_deref().is_some_and(|adm| adm != "fail"),
            load_delay: self.load_delay,
            events: None,
            load_task: None,
            destroyed: self.destroyed.clone(),
        }))
    }

    fn bidder_info(&self) -> HashMap<String, String> {
        HashMap::from([("sdk_version".to_string(), env!("CARGO_PKG_VERSION").to_string())])
    }
}

struct DemoAd {
    bid_id: String,
    ad_type: AdType,
    fill: bool,
    load_delay: Duration,
    events: Option<AdEventSender>,
    load_task: Option<JoinHandle<()>>,
    destroyed: Arc<AtomicUsize>,
}

impl AdapterAd for DemoAd {
    fn network(&self) -> &str {
        DEMO_NETWORK
    }

    fn load(&mut self, events: AdEventSender) {
        let sender = events.clone();
        let fill = self.fill;
        let delay = self.load_delay;
        self.events = Some(events);
        self.load_task = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if fill {
                sender.loaded();
            } else {
                sender.failed_to_load("demo bid without creative");
            }
        }));
    }

    fn show(&mut self, surface: &SurfaceHandle) {
        debug!("Demo ad {} rendering into {}", self.bid_id, surface.id);
        if let Some(events) = &self.events {
            events.send(AdapterEvent::Shown);
            events.send(AdapterEvent::Impression);
            if self.ad_type.is_fullscreen() {
                events.send(AdapterEvent::Closed);
            }
        }
    }

    fn destroy(&mut self) {
        if let Some(task) = self.load_task.take() {
            task.abort();
        }
        self.events = None;
        self.destroyed.fetch_add(1, Ordering::Relaxed);
    }
}
