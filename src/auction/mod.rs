pub mod bid;
pub mod client;
pub mod manager;
pub mod request;

pub use bid::{Bid, BidResponse};
pub use client::BidAuctionClient;
pub use manager::{AuctionBidManager, BidLoadResult};
pub use request::{BidRequest, BidRequestBuilder, RequestContextProvider, StaticContext};
