//! Host-facing ad controllers.
//!
//! A surface owns one placement's [`CacheOrchestrator`], takes loaded ads out
//! of its cache, renders them and translates adapter callbacks into
//! [`SurfaceEvent`]s for the host.

pub mod banner;
pub mod fullscreen;

pub use banner::BannerAd;
pub use fullscreen::FullscreenAd;

use crate::adapter::{AdEvent, AdapterEvent};
use crate::cache::{CacheEvent, CacheOrchestrator, CachedAdEntry};
use crate::error::{MediationError, MediationResult, SurfaceError};
use crate::metrics::Metrics;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceState {
    NoAd,
    Loading,
    Ready,
    Showing,
    Closed,
    Destroyed,
}

/// Notifications delivered to the host
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    Loaded { price: f64, network: String },
    LoadFailed(MediationError),
    Shown,
    Impression,
    Clicked,
    Closed,
    Expired,
    ShowFailed { reason: String },
    /// Banner swapped in a fresh ad
    Refreshed { price: f64, network: String },
}

pub(crate) struct SurfaceCore {
    orchestrator: CacheOrchestrator,
    state: Mutex<SurfaceState>,
    current: Mutex<Option<CachedAdEntry>>,
    host: mpsc::UnboundedSender<SurfaceEvent>,
    destroyed: AtomicBool,
    metrics: Arc<Metrics>,
}

impl SurfaceCore {
    pub(crate) fn new(
        orchestrator: CacheOrchestrator,
        metrics: Arc<Metrics>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<SurfaceEvent>) {
        let (host, host_rx) = mpsc::unbounded_channel();
        let lifecycle = orchestrator.queue().subscribe();
        let core = Arc::new(Self {
            orchestrator,
            state: Mutex::new(SurfaceState::NoAd),
            current: Mutex::new(None),
            host,
            destroyed: AtomicBool::new(false),
            metrics,
        });
        tokio::spawn(Self::pump(Arc::downgrade(&core), lifecycle));
        (core, host_rx)
    }

    async fn pump(core: Weak<Self>, mut lifecycle: mpsc::UnboundedReceiver<AdEvent>) {
        while let Some(event) = lifecycle.recv().await {
            let Some(core) = core.upgrade() else {
                break;
            };
            core.handle_ad_event(event);
        }
    }

    fn handle_ad_event(&self, event: AdEvent) {
        if self.is_destroyed() {
            return;
        }
        let is_current = self
            .current
            .lock()
            .as_ref()
            .is_some_and(|entry| entry.id() == event.entry);
        if !is_current {
            debug!("Ignoring {:?} for entry {} not on screen", event.event, event.entry);
            return;
        }

        match event.event {
            AdapterEvent::Shown => {
                self.set_state(SurfaceState::Showing);
                self.metrics.record_ad_shown();
                self.emit(SurfaceEvent::Shown);
            }
            AdapterEvent::Impression => self.emit(SurfaceEvent::Impression),
            AdapterEvent::Clicked => self.emit(SurfaceEvent::Clicked),
            AdapterEvent::Closed => {
                self.release_current();
                self.set_state(SurfaceState::Closed);
                self.emit(SurfaceEvent::Closed);
            }
            AdapterEvent::Expired => {
                self.release_current();
                self.set_state(SurfaceState::NoAd);
                self.emit(SurfaceEvent::Expired);
            }
            AdapterEvent::FailedToShow { reason } => {
                self.release_current();
                self.set_state(SurfaceState::NoAd);
                self.emit(SurfaceEvent::ShowFailed { reason });
            }
            AdapterEvent::Loaded | AdapterEvent::FailedToLoad { .. } => {}
        }
    }

    /// Wait for the orchestrator to produce an ad and take it
    pub(crate) async fn next_entry(&self) -> MediationResult<CachedAdEntry> {
        let mut events = self.orchestrator.subscribe();
        self.orchestrator.start();
        loop {
            if self.is_destroyed() {
                return Err(SurfaceError::Destroyed.into());
            }
            if let Some(entry) = self.orchestrator.pop_ad() {
                return Ok(entry);
            }
            match events.recv().await {
                Ok(CacheEvent::AdCached { .. }) => continue,
                Ok(CacheEvent::LoadFailed(e)) => return Err(e),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(SurfaceError::Destroyed.into());
                }
            }
        }
    }

    /// Put `entry` on screen slot; the previous occupant is released
    pub(crate) fn install(&self, entry: CachedAdEntry) {
        let previous = self.current.lock().replace(entry);
        if let Some(previous) = previous {
            self.orchestrator.release(previous);
        }
    }

    pub(crate) fn with_current<R>(&self, f: impl FnOnce(&mut CachedAdEntry) -> R) -> Option<R> {
        self.current.lock().as_mut().map(f)
    }

    pub(crate) fn release_current(&self) {
        let entry = self.current.lock().take();
        if let Some(entry) = entry {
            self.orchestrator.release(entry);
        }
    }

    pub(crate) fn has_current(&self) -> bool {
        self.current.lock().is_some()
    }

    pub(crate) fn emit(&self, event: SurfaceEvent) {
        let _ = self.host.send(event);
    }

    pub(crate) fn state(&self) -> SurfaceState {
        *self.state.lock()
    }

    pub(crate) fn set_state(&self, state: SurfaceState) {
        let mut current = self.state.lock();
        if *current != SurfaceState::Destroyed {
            *current = state;
        }
    }

    pub(crate) fn orchestrator(&self) -> &CacheOrchestrator {
        &self.orchestrator
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub(crate) fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.state.lock() = SurfaceState::Destroyed;
        self.release_current();
        self.orchestrator.destroy();
        info!(
            "Destroyed surface for placement {}",
            self.orchestrator.placement().id
        );
    }
}
