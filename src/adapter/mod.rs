//! Adapter boundary: the narrow contract every third-party network implements.
//!
//! Adapters never call back into the engine directly. They report progress as
//! [`AdapterEvent`] messages through the [`AdEventSender`] handed to `load`,
//! and the owning placement consumes them in order. Events that arrive after
//! a load was resolved (timeout, destroy) are dropped.

pub mod demo;

use crate::auction::Bid;
use crate::reporting::ErrorReporter;
use crate::types::{AdType, SurfaceHandle};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Handle of an ad inside a placement's cache
pub type EntryId = u64;

/// Callback from an adapter, delivered as a message
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    Loaded,
    FailedToLoad { reason: String },
    Shown,
    FailedToShow { reason: String },
    Clicked,
    Impression,
    Closed,
    Expired,
}

/// An adapter event tagged with the cache entry it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct AdEvent {
    pub entry: EntryId,
    pub event: AdapterEvent,
}

/// Sending side of a placement's adapter event channel
#[derive(Debug, Clone)]
pub struct AdEventSender {
    entry: EntryId,
    tx: mpsc::UnboundedSender<AdEvent>,
}

impl AdEventSender {
    pub fn new(entry: EntryId, tx: mpsc::UnboundedSender<AdEvent>) -> Self {
        Self { entry, tx }
    }

    pub fn entry(&self) -> EntryId {
        self.entry
    }

    /// Deliver an event. Returns `false` once the placement is gone, which
    /// adapters may treat as a signal to stop work.
    pub fn send(&self, event: AdapterEvent) -> bool {
        self.tx
            .send(AdEvent {
                entry: self.entry,
                event,
            })
            .is_ok()
    }

    pub fn loaded(&self) -> bool {
        self.send(AdapterEvent::Loaded)
    }

    pub fn failed_to_load(&self, reason: impl Into<String>) -> bool {
        self.send(AdapterEvent::FailedToLoad {
            reason: reason.into(),
        })
    }
}

/// A single creative instance owned by the engine
pub trait AdapterAd: Send + Sync {
    /// Network name, used in logs and notifications
    fn network(&self) -> &str;

    /// Start loading; completion is reported through `events`, which the ad
    /// keeps for later show/click/close callbacks.
    fn load(&mut self, events: AdEventSender);

    fn show(&mut self, surface: &SurfaceHandle);

    /// Release network resources. Called exactly once by the engine.
    fn destroy(&mut self);
}

/// Creates ads for one network
pub trait AdapterFactory: Send + Sync {
    /// Build an ad for a bid; `None` when the network cannot serve it
    fn create(&self, ad_type: AdType, bid: &Bid) -> Option<Box<dyn AdapterAd>>;

    /// Bidder token key/values sent with every bid request
    fn bidder_info(&self) -> HashMap<String, String> {
        HashMap::new()
    }
}

/// Adapter name -> factory, resolved once at session start
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    factories: HashMap<String, Arc<dyn AdapterFactory>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory; a later registration under the same name replaces it
    pub fn register(&mut self, name: impl Into<String>, factory: Arc<dyn AdapterFactory>) {
        let name = name.into();
        debug!("Registered adapter: {}", name);
        self.factories.insert(name, factory);
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<dyn AdapterFactory>> {
        self.factories.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// `ext.adapter_info` block for bid requests
    pub fn adapter_info(&self) -> HashMap<String, HashMap<String, String>> {
        self.factories
            .iter()
            .map(|(name, factory)| (name.clone(), factory.bidder_info()))
            .collect()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Call `destroy` on an adapter, containing any panic it raises.
///
/// Adapter teardown faults are reported and never reach engine state.
pub fn destroy_guarded(ad: &mut dyn AdapterAd, reporter: &dyn ErrorReporter) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| ad.destroy())) {
        let message = panic_message(panic.as_ref());
        reporter.report(
            "adapter.destroy",
            &format!("{} adapter panicked during destroy: {}", ad.network(), message),
        );
    }
}

/// Call `load` on an adapter; a panic becomes a load failure event.
pub fn load_guarded(ad: &mut dyn AdapterAd, events: AdEventSender, reporter: &dyn ErrorReporter) {
    let fallback = events.clone();
    if let Err(panic) = catch_unwind(AssertUnwindSafe(|| ad.load(events))) {
        let message = panic_message(panic.as_ref());
        reporter.report(
            "adapter.load",
            &format!("{} adapter panicked during load: {}", ad.network(), message),
        );
        fallback.failed_to_load(message);
    }
}
