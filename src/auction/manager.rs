use super::bid::Bid;
use crate::error::AuctionStateError;
use crate::types::LossReason;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Terminal load outcome recorded for a bid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidLoadResult {
    Loaded,
    Failed(LossReason),
}

#[derive(Debug, Default)]
struct AuctionRecord {
    bids: Vec<Arc<Bid>>,
    results: HashMap<String, BidLoadResult>,
    winner: Option<String>,
}

impl AuctionRecord {
    fn bid(&self, bid_id: &str) -> Option<&Arc<Bid>> {
        self.bids.iter().find(|b| b.id == bid_id)
    }
}

/// Per-auction bid bookkeeping: who bid, who won, why the others lost.
///
/// Each auction lives in its own map shard entry, so concurrent callbacks for
/// one auction are serialized while different auctions never contend.
#[derive(Debug, Default)]
pub struct AuctionBidManager {
    auctions: DashMap<String, AuctionRecord>,
}

impl AuctionBidManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a bid; adding the same bid id twice is a no-op.
    pub fn add_bid(&self, auction_id: &str, bid: Arc<Bid>) {
        let mut record = self.auctions.entry(auction_id.to_string()).or_default();
        if record.bid(&bid.id).is_none() {
            record.bids.push(bid);
        }
    }

    /// Record whether a bid loaded.
    ///
    /// The first terminal result per bid wins; later calls for the same bid
    /// (duplicate adapter callbacks) are ignored and return `false`. A failure
    /// without a reason is recorded as [`LossReason::TechnicalError`].
    pub fn set_bid_load_result(
        &self,
        auction_id: &str,
        bid_id: &str,
        success: bool,
        loss_reason: Option<LossReason>,
    ) -> bool {
        let Some(mut record) = self.auctions.get_mut(auction_id) else {
            debug!("Ignoring load result for unknown auction {}", auction_id);
            return false;
        };
        if record.bid(bid_id).is_none() || record.results.contains_key(bid_id) {
            return false;
        }

        let result = if success {
            BidLoadResult::Loaded
        } else {
            BidLoadResult::Failed(loss_reason.unwrap_or(LossReason::TechnicalError))
        };
        record.results.insert(bid_id.to_string(), result);
        true
    }

    /// Mark the winning bid.
    ///
    /// The first winner sticks: setting the same id again succeeds, a
    /// different id is rejected with [`AuctionStateError::WinnerAlreadySet`].
    /// A bid that already failed to load cannot win.
    pub fn set_winner(&self, auction_id: &str, winning_bid_id: &str) -> Result<(), AuctionStateError> {
        let mut record =
            self.auctions
                .get_mut(auction_id)
                .ok_or_else(|| AuctionStateError::UnknownAuction {
                    auction_id: auction_id.to_string(),
                })?;

        if record.bid(winning_bid_id).is_none() {
            return Err(AuctionStateError::UnknownBid {
                auction_id: auction_id.to_string(),
                bid_id: winning_bid_id.to_string(),
            });
        }

        match &record.winner {
            Some(existing) if existing == winning_bid_id => return Ok(()),
            Some(existing) => {
                return Err(AuctionStateError::WinnerAlreadySet {
                    auction_id: auction_id.to_string(),
                    existing: existing.clone(),
                });
            }
            None => {}
        }

        if let Some(BidLoadResult::Failed(_)) = record.results.get(winning_bid_id) {
            return Err(AuctionStateError::BidAlreadyFailed {
                bid_id: winning_bid_id.to_string(),
            });
        }

        record.winner = Some(winning_bid_id.to_string());
        debug!("Auction {} winner: {}", auction_id, winning_bid_id);
        Ok(())
    }

    pub fn get_bid(&self, auction_id: &str, bid_id: &str) -> Option<Arc<Bid>> {
        self.auctions
            .get(auction_id)
            .and_then(|record| record.bid(bid_id).cloned())
    }

    /// All tracked bids of an auction in insertion order
    pub fn bids(&self, auction_id: &str) -> Vec<Arc<Bid>> {
        self.auctions
            .get(auction_id)
            .map(|record| record.bids.clone())
            .unwrap_or_default()
    }

    pub fn get_load_result(&self, auction_id: &str, bid_id: &str) -> Option<BidLoadResult> {
        self.auctions
            .get(auction_id)
            .and_then(|record| record.results.get(bid_id).copied())
    }

    pub fn get_loss_reason(&self, auction_id: &str, bid_id: &str) -> Option<LossReason> {
        match self.get_load_result(auction_id, bid_id) {
            Some(BidLoadResult::Failed(reason)) => Some(reason),
            _ => None,
        }
    }

    pub fn get_winner(&self, auction_id: &str) -> Option<String> {
        self.auctions
            .get(auction_id)
            .and_then(|record| record.winner.clone())
    }

    /// Price of the winning bid, or 0.0 when no winner is recorded
    pub fn get_winning_price(&self, auction_id: &str) -> f64 {
        self.auctions
            .get(auction_id)
            .and_then(|record| {
                let winner = record.winner.as_deref()?;
                record.bid(winner).map(|b| b.price)
            })
            .unwrap_or(0.0)
    }

    /// Forget an auction. Safe for auctions that were never populated.
    pub fn clear_auction(&self, auction_id: &str) {
        if self.auctions.remove(auction_id).is_some() {
            debug!("Cleared auction {}", auction_id);
        }
    }

    pub fn contains(&self, auction_id: &str) -> bool {
        self.auctions.contains_key(auction_id)
    }

    pub fn auction_count(&self) -> usize {
        self.auctions.len()
    }
}
