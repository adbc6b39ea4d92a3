use super::{SurfaceCore, SurfaceEvent, SurfaceState};
use crate::cache::CacheOrchestrator;
use crate::error::{MediationResult, SurfaceError};
use crate::metrics::Metrics;
use crate::types::SurfaceHandle;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

struct BannerInner {
    core: Arc<SurfaceCore>,
    handle: Mutex<Option<SurfaceHandle>>,
    visible: AtomicBool,
    suspend_when_hidden: bool,
}

impl BannerInner {
    /// Swap the next cached ad in, or ask the fill loop for one
    fn refresh(&self) {
        if self.core.is_destroyed() || !self.visible.load(Ordering::SeqCst) {
            return;
        }
        let Some(handle) = self.handle.lock().clone() else {
            return;
        };

        match self.core.orchestrator().pop_ad() {
            Some(entry) => {
                let refreshed = SurfaceEvent::Refreshed {
                    price: entry.price(),
                    network: entry.network().to_string(),
                };
                debug!(
                    "Refreshing banner {} with bid {}",
                    self.core.orchestrator().placement().id,
                    entry.bid().id
                );
                self.core.install(entry);
                self.core.with_current(|entry| entry.show(&handle));
                self.core.set_state(SurfaceState::Showing);
                self.core.emit(refreshed);
            }
            None => {
                debug!(
                    "No cached ad for banner {} refresh, keeping current",
                    self.core.orchestrator().placement().id
                );
            }
        }
        // Wakes a parked fill loop; a running one refills on its own
        self.core.orchestrator().start();
    }
}

/// Banner or MREC: shows as soon as an ad loads, swaps in a fresh ad on a
/// timer while visible, and can pause the fill loop when off screen.
pub struct BannerAd {
    inner: Arc<BannerInner>,
    refresh_interval: Option<Duration>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl BannerAd {
    pub fn new(
        orchestrator: CacheOrchestrator,
        metrics: Arc<Metrics>,
    ) -> (Self, mpsc::UnboundedReceiver<SurfaceEvent>) {
        let refresh_interval = orchestrator.placement().refresh_interval();
        let suspend_when_hidden = orchestrator.placement().suspend_when_hidden;
        let (core, events) = SurfaceCore::new(orchestrator, metrics);
        (
            Self {
                inner: Arc::new(BannerInner {
                    core,
                    handle: Mutex::new(None),
                    visible: AtomicBool::new(true),
                    suspend_when_hidden,
                }),
                refresh_interval,
                refresh_task: Mutex::new(None),
            },
            events,
        )
    }

    /// Load an ad and render it into `handle`; starts auto-refresh
    pub async fn load(&self, handle: SurfaceHandle) -> MediationResult<()> {
        let core = &self.inner.core;
        if core.is_destroyed() {
            return Err(SurfaceError::Destroyed.into());
        }
        *self.inner.handle.lock() = Some(handle.clone());
        core.set_state(SurfaceState::Loading);

        match core.next_entry().await {
            Ok(entry) => {
                if core.is_destroyed() {
                    core.orchestrator().release(entry);
                    return Err(SurfaceError::Destroyed.into());
                }
                let loaded = SurfaceEvent::Loaded {
                    price: entry.price(),
                    network: entry.network().to_string(),
                };
                core.install(entry);
                core.emit(loaded);
                core.with_current(|entry| entry.show(&handle));
                core.set_state(SurfaceState::Showing);
                self.start_refresh();
                Ok(())
            }
            Err(e) => {
                core.set_state(SurfaceState::NoAd);
                core.emit(SurfaceEvent::LoadFailed(e.clone()));
                Err(e)
            }
        }
    }

    fn start_refresh(&self) {
        let Some(period) = self.refresh_interval else {
            return;
        };
        let mut task = self.refresh_task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }
        info!(
            "Auto-refresh every {:?} for banner {}",
            period,
            self.placement_id()
        );
        *task = Some(tokio::spawn(Self::refresh_loop(
            Arc::downgrade(&self.inner),
            period,
        )));
    }

    async fn refresh_loop(inner: Weak<BannerInner>, period: Duration) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            if inner.core.is_destroyed() {
                break;
            }
            inner.refresh();
        }
    }

    /// Force a refresh now instead of waiting for the timer
    pub fn refresh(&self) {
        self.inner.refresh();
    }

    /// Track on-screen visibility. Hidden banners skip refreshes and, when
    /// configured, suspend the fill loop.
    pub fn set_visible(&self, visible: bool) {
        let was = self.inner.visible.swap(visible, Ordering::SeqCst);
        if was == visible {
            return;
        }
        debug!("Banner {} visible: {}", self.placement_id(), visible);
        if self.inner.suspend_when_hidden {
            let orchestrator = self.inner.core.orchestrator();
            if visible {
                orchestrator.resume();
            } else {
                orchestrator.suspend();
            }
        }
    }

    pub fn is_visible(&self) -> bool {
        self.inner.visible.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> SurfaceState {
        self.inner.core.state()
    }

    pub fn placement_id(&self) -> &str {
        &self.inner.core.orchestrator().placement().id
    }

    pub fn is_suspended(&self) -> bool {
        self.inner.core.orchestrator().is_suspended()
    }

    pub fn destroy(&self) {
        if let Some(task) = self.refresh_task.lock().take() {
            task.abort();
        }
        self.inner.core.destroy();
    }
}

impl Drop for BannerAd {
    fn drop(&mut self) {
        self.destroy();
    }
}
