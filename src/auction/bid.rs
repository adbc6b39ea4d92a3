use crate::error::AuctionError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One candidate from an auction response. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bid {
    pub id: String,
    pub imp_id: String,
    pub price: f64,
    /// Opaque creative markup handed to the adapter
    pub adm: Option<String>,
    pub ad_id: Option<String>,
    /// Win notice URL
    pub nurl: Option<String>,
    /// Loss notice URL
    pub lurl: Option<String>,
    /// Billing URL
    pub burl: Option<String>,
    pub deal_id: Option<String>,
    /// Adapter (network) that must render this bid
    pub adapter_code: String,
    /// Server-assigned waterfall position, lower loads first
    pub rank: Option<u32>,
    pub adapter_extras: HashMap<String, String>,
    pub seat: Option<String>,
}

/// Parsed auction: id plus bids in waterfall order
#[derive(Debug, Clone)]
pub struct BidResponse {
    pub auction_id: String,
    pub currency: Option<String>,
    bids: Vec<Arc<Bid>>,
}

impl BidResponse {
    /// Build a response from already-parsed bids; ranks them.
    pub fn new(auction_id: impl Into<String>, bids: Vec<Bid>) -> Self {
        let mut bids: Vec<Arc<Bid>> = bids.into_iter().map(Arc::new).collect();
        rank_bids(&mut bids);
        Self {
            auction_id: auction_id.into(),
            currency: None,
            bids,
        }
    }

    /// Decode an OpenRTB-shaped body.
    ///
    /// `fallback_auction_id` is used when the server omits `id` (the request
    /// id is echoed in that case).
    pub fn parse(body: &[u8], fallback_auction_id: &str) -> Result<Self, AuctionError> {
        let wire: WireBidResponse =
            serde_json::from_slice(body).map_err(|e| AuctionError::InvalidResponse {
                reason: format!("Failed to decode bid response: {}", e),
            })?;

        let mut bids = Vec::new();
        for seat in wire.seatbid {
            for bid in seat.bid {
                bids.push(bid.into_bid(seat.seat.as_deref())?);
            }
        }

        let auction_id = wire
            .id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| fallback_auction_id.to_string());

        let mut response = Self::new(auction_id, bids);
        response.currency = wire.cur;
        Ok(response)
    }

    /// Bids in waterfall order
    pub fn bids(&self) -> &[Arc<Bid>] {
        &self.bids
    }

    pub fn bid(&self, bid_id: &str) -> Option<&Arc<Bid>> {
        self.bids.iter().find(|b| b.id == bid_id)
    }

    pub fn len(&self) -> usize {
        self.bids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty()
    }
}

/// Rank ascending, unranked last, ties broken by price descending
fn rank_bids(bids: &mut [Arc<Bid>]) {
    bids.sort_by(|a, b| {
        let ra = a.rank.unwrap_or(u32::MAX);
        let rb = b.rank.unwrap_or(u32::MAX);
        ra.cmp(&rb).then_with(|| b.price.total_cmp(&a.price))
    });
}

#[derive(Debug, Deserialize)]
struct WireBidResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    seatbid: Vec<WireSeatBid>,
    #[serde(default)]
    cur: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireSeatBid {
    #[serde(default)]
    bid: Vec<WireBid>,
    #[serde(default)]
    seat: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireBid {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    impid: Option<String>,
    #[serde(default)]
    price: f64,
    #[serde(default)]
    adm: Option<String>,
    #[serde(default)]
    adid: Option<String>,
    #[serde(default)]
    nurl: Option<String>,
    #[serde(default)]
    lurl: Option<String>,
    #[serde(default)]
    burl: Option<String>,
    #[serde(default)]
    dealid: Option<String>,
    #[serde(default)]
    ext: Option<WireBidExt>,
}

#[derive(Debug, Default, Deserialize)]
struct WireBidExt {
    #[serde(default)]
    cloudx: Option<WireRankExt>,
    #[serde(default)]
    prebid: Option<WirePrebidExt>,
    #[serde(default)]
    adapter: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireRankExt {
    #[serde(default)]
    rank: Option<u32>,
    #[serde(default, rename = "adapterExtras")]
    adapter_extras: Option<HashMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
struct WirePrebidExt {
    #[serde(default)]
    meta: Option<WirePrebidMeta>,
}

#[derive(Debug, Default, Deserialize)]
struct WirePrebidMeta {
    #[serde(default)]
    adaptercode: Option<String>,
}

impl WireBid {
    fn into_bid(self, seat: Option<&str>) -> Result<Bid, AuctionError> {
        let id = self
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AuctionError::InvalidResponse {
                reason: "bid without id".to_string(),
            })?;
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(AuctionError::InvalidResponse {
                reason: format!("bid {} has invalid price {}", id, self.price),
            });
        }

        let ext = self.ext.unwrap_or_default();
        let adapter_code = ext
            .prebid
            .and_then(|p| p.meta)
            .and_then(|m| m.adaptercode)
            .or(ext.adapter)
            .or_else(|| seat.map(str::to_string))
            .unwrap_or_default();
        let (rank, adapter_extras) = match ext.cloudx {
            Some(rank_ext) => (rank_ext.rank, rank_ext.adapter_extras.unwrap_or_default()),
            None => (None, HashMap::new()),
        };

        Ok(Bid {
            imp_id: self.impid.unwrap_or_default(),
            id,
            price: self.price,
            adm: self.adm,
            ad_id: self.adid,
            nurl: self.nurl,
            lurl: self.lurl,
            burl: self.burl,
            deal_id: self.dealid,
            adapter_code,
            rank,
            adapter_extras,
            seat: seat.map(str::to_string),
        })
    }
}
