use super::{SurfaceCore, SurfaceEvent, SurfaceState};
use crate::cache::CacheOrchestrator;
use crate::error::{MediationResult, SurfaceError};
use crate::metrics::Metrics;
use crate::types::{AdType, SurfaceHandle};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Interstitial, rewarded or native ad: one cached ad per explicit `load()`,
/// shown on demand, never refreshed.
pub struct FullscreenAd {
    core: Arc<SurfaceCore>,
    ad_type: AdType,
    load_lock: tokio::sync::Mutex<()>,
}

impl FullscreenAd {
    pub fn new(
        orchestrator: CacheOrchestrator,
        metrics: Arc<Metrics>,
    ) -> (Self, mpsc::UnboundedReceiver<SurfaceEvent>) {
        let ad_type = orchestrator.placement().ad_type;
        let (core, events) = SurfaceCore::new(orchestrator, metrics);
        (
            Self {
                core,
                ad_type,
                load_lock: tokio::sync::Mutex::new(()),
            },
            events,
        )
    }

    /// Take one ad from the cache, waiting for the fill loop if needed.
    /// Already-ready surfaces return immediately.
    pub async fn load(&self) -> MediationResult<()> {
        let _loading = self.load_lock.lock().await;
        if self.core.is_destroyed() {
            return Err(SurfaceError::Destroyed.into());
        }
        match self.core.state() {
            SurfaceState::Ready => return Ok(()),
            SurfaceState::Showing => return Err(SurfaceError::AlreadyShowing.into()),
            _ => {}
        }

        self.core.set_state(SurfaceState::Loading);
        match self.core.next_entry().await {
            Ok(entry) => {
                if self.core.is_destroyed() {
                    self.core.orchestrator().release(entry);
                    return Err(SurfaceError::Destroyed.into());
                }
                debug!(
                    "{} placement {} ready with bid {} ({})",
                    self.ad_type,
                    self.placement_id(),
                    entry.bid().id,
                    entry.network()
                );
                let loaded = SurfaceEvent::Loaded {
                    price: entry.price(),
                    network: entry.network().to_string(),
                };
                self.core.install(entry);
                self.core.set_state(SurfaceState::Ready);
                self.core.emit(loaded);
                Ok(())
            }
            Err(e) => {
                self.core.set_state(SurfaceState::NoAd);
                self.core.emit(SurfaceEvent::LoadFailed(e.clone()));
                Err(e)
            }
        }
    }

    /// Render the loaded ad into `surface`
    pub fn show(&self, surface: &SurfaceHandle) -> MediationResult<()> {
        if self.core.is_destroyed() {
            return Err(SurfaceError::Destroyed.into());
        }
        match self.core.state() {
            SurfaceState::Ready => {}
            SurfaceState::Showing => return Err(SurfaceError::AlreadyShowing.into()),
            _ => return Err(SurfaceError::NotReady.into()),
        }

        self.core.set_state(SurfaceState::Showing);
        match self.core.with_current(|entry| entry.show(surface)) {
            Some(()) => Ok(()),
            None => {
                self.core.set_state(SurfaceState::NoAd);
                Err(SurfaceError::Expired.into())
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.core.state() == SurfaceState::Ready && self.core.has_current()
    }

    pub fn state(&self) -> SurfaceState {
        self.core.state()
    }

    pub fn ad_type(&self) -> AdType {
        self.ad_type
    }

    pub fn placement_id(&self) -> &str {
        &self.core.orchestrator().placement().id
    }

    /// Cached ads waiting behind the current one
    pub fn cached(&self) -> usize {
        self.core.orchestrator().queue().len()
    }

    pub fn destroy(&self) {
        self.core.destroy();
    }
}

impl Drop for FullscreenAd {
    fn drop(&mut self) {
        self.core.destroy();
    }
}
