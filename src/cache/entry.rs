use crate::adapter::{AdapterAd, EntryId, destroy_guarded};
use crate::auction::{Bid, BidResponse};
use crate::reporting::ErrorReporter;
use crate::types::SurfaceHandle;
use std::fmt;
use std::sync::Arc;

/// A loaded ad together with the bid and auction it came from.
///
/// The entry owns its adapter ad. Dropping the entry destroys the ad, so the
/// adapter sees exactly one `destroy` however the entry leaves the engine.
pub struct CachedAdEntry {
    id: EntryId,
    price: f64,
    loaded_at: std::time::Instant,
    bid: Arc<Bid>,
    response: Arc<BidResponse>,
    ad: Option<Box<dyn AdapterAd>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl CachedAdEntry {
    pub(crate) fn new(
        id: EntryId,
        price: f64,
        bid: Arc<Bid>,
        response: Arc<BidResponse>,
        ad: Box<dyn AdapterAd>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            id,
            price,
            loaded_at: std::time::Instant::now(),
            bid,
            response,
            ad: Some(ad),
            reporter,
        }
    }

    pub fn id(&self) -> EntryId {
        self.id
    }

    pub fn price(&self) -> f64 {
        self.price
    }

    pub fn bid(&self) -> &Arc<Bid> {
        &self.bid
    }

    pub fn auction_id(&self) -> &str {
        &self.response.auction_id
    }

    pub fn response(&self) -> &Arc<BidResponse> {
        &self.response
    }

    pub fn impression_id(&self) -> &str {
        &self.bid.imp_id
    }

    pub fn network(&self) -> &str {
        self.ad.as_deref().map(|ad| ad.network()).unwrap_or_default()
    }

    pub fn age(&self) -> std::time::Duration {
        self.loaded_at.elapsed()
    }

    /// Render the ad; a no-op once destroyed
    pub fn show(&mut self, surface: &SurfaceHandle) {
        if let Some(ad) = self.ad.as_deref_mut() {
            ad.show(surface);
        }
    }

    /// Release the adapter now instead of at drop
    pub fn destroy(&mut self) {
        if let Some(mut ad) = self.ad.take() {
            destroy_guarded(ad.as_mut(), self.reporter.as_ref());
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.ad.is_none()
    }
}

impl Drop for CachedAdEntry {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl fmt::Debug for CachedAdEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedAdEntry")
            .field("id", &self.id)
            .field("price", &self.price)
            .field("bid_id", &self.bid.id)
            .field("auction_id", &self.response.auction_id)
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
