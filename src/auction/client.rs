use super::bid::BidResponse;
use super::request::BidRequest;
use crate::error::{AuctionError, TransportError};
use crate::metrics::{Metrics, Timer};
use crate::transport::HttpTransport;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Runs one bid request round-trip against the auction endpoint.
///
/// Stateless with respect to the cache and bid bookkeeping; every call is an
/// independent auction.
pub struct BidAuctionClient {
    endpoint: String,
    app_key: String,
    transport: Arc<dyn HttpTransport>,
    metrics: Arc<Metrics>,
}

impl BidAuctionClient {
    pub fn new(
        endpoint: impl Into<String>,
        app_key: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            app_key: app_key.into(),
            transport,
            metrics,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Send `request` and return its bids in waterfall order.
    ///
    /// `tmax` is a hard deadline: the request is abandoned and
    /// [`AuctionError::RequestTimeout`] returned once it passes.
    pub async fn request_bids(
        &self,
        request: &BidRequest,
        tmax: Duration,
    ) -> Result<BidResponse, AuctionError> {
        let placement_id = request
            .imp
            .first()
            .map(|imp| imp.tagid.clone())
            .unwrap_or_default();

        let body = serde_json::to_vec(request).map_err(|e| AuctionError::InvalidResponse {
            reason: format!("Failed to encode bid request: {}", e),
        })?;
        let headers = vec![(
            "authorization".to_string(),
            format!("Bearer {}", self.app_key),
        )];

        debug!(
            "Requesting bids for placement {} (request {}, tmax {:?})",
            placement_id, request.id, tmax
        );

        let timer = Timer::start();
        let exchange = self
            .transport
            .post_json(&self.endpoint, &headers, Bytes::from(body), tmax);
        let result = match tokio::time::timeout(tmax, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                url: self.endpoint.clone(),
                timeout: tmax,
            }),
        };

        let outcome = match result {
            Ok(response) => match response.status {
                204 => Err(AuctionError::NoFill {
                    placement_id: placement_id.clone(),
                }),
                200..=299 => BidResponse::parse(&response.body, &request.id).and_then(|parsed| {
                    if parsed.is_empty() {
                        Err(AuctionError::NoFill {
                            placement_id: placement_id.clone(),
                        })
                    } else {
                        Ok(parsed)
                    }
                }),
                status => Err(AuctionError::Server { status }),
            },
            Err(TransportError::Timeout { timeout, .. }) => {
                Err(AuctionError::RequestTimeout { timeout })
            }
            Err(e) => Err(AuctionError::Network {
                endpoint: self.endpoint.clone(),
                reason: e.to_string(),
            }),
        };

        let elapsed = timer.elapsed();
        match &outcome {
            Ok(response) => {
                self.metrics.record_auction(response.len() as u64, elapsed);
                let ranking: Vec<String> = response
                    .bids()
                    .iter()
                    .map(|b| {
                        format!(
                            "bidder: {}, rank: {}, price: {}",
                            b.adapter_code,
                            b.rank.unwrap_or_default(),
                            b.price
                        )
                    })
                    .collect();
                info!(
                    "Auction {} for placement {} returned {} bid(s) in {:?}",
                    response.auction_id,
                    placement_id,
                    response.len(),
                    elapsed
                );
                debug!("Auction ranking: {}", ranking.join("; "));
            }
            Err(e) => {
                self.metrics.record_auction(0, elapsed);
                warn!("Auction for placement {} failed: {}", placement_id, e);
            }
        }
        outcome
    }
}
