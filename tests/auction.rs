mod common;

use bytes::Bytes;
use common::*;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use mediation_core::auction::{
    AuctionBidManager, BidAuctionClient, BidLoadResult, BidRequestBuilder, BidResponse,
    StaticContext,
};
use mediation_core::error::{AuctionError, AuctionStateError};
use mediation_core::metrics::Metrics;
use mediation_core::transport::HyperTransport;
use mediation_core::{AdType, AppConfig, LossReason};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

fn client_with(transport: Arc<MockTransport>) -> (BidAuctionClient, Arc<Metrics>) {
    let metrics = Arc::new(Metrics::new());
    (
        BidAuctionClient::new(AUCTION_URL, APP_KEY, transport, metrics.clone()),
        metrics,
    )
}

fn request() -> mediation_core::auction::BidRequest {
    let config = AppConfig::default();
    let builder = BidRequestBuilder::new(
        Arc::new(StaticContext::from_config(&config.sdk)),
        "pub-1",
        0.05,
    );
    builder.build(
        &placement("banner-1", AdType::Banner),
        HashMap::new(),
        Duration::from_millis(500),
    )
}

#[test]
fn test_parse_orders_by_rank_then_price() {
    let body = auction_body(
        "auction-1",
        vec![
            wire_bid("low-rank", 9.0, "load", 3),
            wire_bid("first", 1.0, "load", 1),
            wire_bid("second", 2.0, "load", 2),
        ],
    );
    let response = BidResponse::parse(body.as_bytes(), "request-1").unwrap();

    assert_eq!(response.auction_id, "auction-1");
    assert_eq!(response.currency.as_deref(), Some("USD"));
    let ids: Vec<&str> = response.bids().iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec!["first", "second", "low-rank"]);
    assert_eq!(response.bids()[0].adapter_code, "scripted");
}

#[test]
fn test_parse_unranked_bids_by_price() {
    let body = json!({
        "seatbid": [{
            "seat": "network-a",
            "bid": [
                { "id": "cheap", "impid": "1", "price": 0.5 },
                { "id": "rich", "impid": "1", "price": 4.0, "ext": { "adapter": "network-b" } }
            ]
        }]
    })
    .to_string();
    let response = BidResponse::parse(body.as_bytes(), "request-7").unwrap();

    // Missing id falls back to the request id
    assert_eq!(response.auction_id, "request-7");
    assert_eq!(response.bids()[0].id, "rich");
    assert_eq!(response.bids()[0].adapter_code, "network-b");
    assert_eq!(response.bids()[1].adapter_code, "network-a");
}

#[test]
fn test_parse_rejects_bid_without_id() {
    let body = json!({ "id": "a", "seatbid": [{ "bid": [{ "price": 1.0 }] }] }).to_string();
    let result = BidResponse::parse(body.as_bytes(), "r");
    assert!(matches!(result, Err(AuctionError::InvalidResponse { .. })));
}

#[test]
fn test_parse_rejects_garbage() {
    let result = BidResponse::parse(b"not json", "r");
    assert!(matches!(result, Err(AuctionError::InvalidResponse { .. })));
}

#[test]
fn test_request_builder_fills_impression() {
    let req = request();
    assert_eq!(req.imp.len(), 1);
    assert_eq!(req.imp[0].tagid, "banner-1");
    assert_eq!(req.imp[0].bidfloor, 0.05);
    assert_eq!(req.imp[0].instl, 0);
    assert_eq!(req.tmax, 500);
    assert_eq!(req.ext.publisher_id, "pub-1");

    let encoded = serde_json::to_value(&req).unwrap();
    assert_eq!(encoded["imp"][0]["ext"]["adtype"], "BANNER");
}

#[tokio::test]
async fn test_client_returns_ranked_bids() {
    let transport = MockTransport::new();
    transport.push_auction(AuctionReply::Body(auction_body(
        "auction-2",
        vec![wire_bid("b2", 2.0, "load", 2), wire_bid("b1", 1.0, "load", 1)],
    )));
    let (client, metrics) = client_with(transport.clone());

    let response = client
        .request_bids(&request(), Duration::from_millis(500))
        .await
        .unwrap();
    assert_eq!(response.len(), 2);
    assert_eq!(response.bids()[0].id, "b1");

    let sent = transport.auction_requests();
    assert_eq!(sent.len(), 1);
    assert!(
        sent[0]
            .headers
            .contains(&("authorization".to_string(), format!("Bearer {}", APP_KEY)))
    );
    assert_eq!(sent[0].body["imp"][0]["tagid"], "banner-1");

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.auctions_requested, 1);
    assert_eq!(snapshot.bids_received, 2);
}

#[tokio::test]
async fn test_client_maps_no_content_to_no_fill() {
    let transport = MockTransport::new();
    transport.push_auction(AuctionReply::Status(204));
    let (client, metrics) = client_with(transport);

    let err = client
        .request_bids(&request(), Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(matches!(err, AuctionError::NoFill { ref placement_id } if placement_id == "banner-1"));
    assert_eq!(metrics.snapshot().auctions_failed, 1);
}

#[tokio::test]
async fn test_client_empty_seatbid_is_no_fill() {
    let transport = MockTransport::new();
    transport.push_auction(AuctionReply::Body(auction_body("a", vec![])));
    let (client, _) = client_with(transport);

    let err = client
        .request_bids(&request(), Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(matches!(err, AuctionError::NoFill { .. }));
}

#[tokio::test]
async fn test_client_server_and_network_errors() {
    let transport = MockTransport::new();
    transport.push_auction(AuctionReply::Status(503));
    transport.push_auction(AuctionReply::Fail);
    let (client, _) = client_with(transport);

    let err = client
        .request_bids(&request(), Duration::from_millis(500))
        .await
        .unwrap_err();
    assert_eq!(err, AuctionError::Server { status: 503 });

    let err = client
        .request_bids(&request(), Duration::from_millis(500))
        .await
        .unwrap_err();
    assert!(matches!(err, AuctionError::Network { .. }));
}

#[tokio::test]
async fn test_client_enforces_tmax() {
    let transport = MockTransport::new();
    transport.push_auction(AuctionReply::Hang);
    let (client, _) = client_with(transport);

    let started = std::time::Instant::now();
    let err = client
        .request_bids(&request(), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, AuctionError::RequestTimeout { .. }));
    assert!(started.elapsed() < Duration::from_secs(2));
}

async fn spawn_bid_server(body: String) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let body = body.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let body = body.clone();
                    async move {
                        let authorized = req
                            .headers()
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            == Some("Bearer server-key");
                        let response = if authorized {
                            Response::builder()
                                .status(200)
                                .body(Full::new(Bytes::from(body)))
                        } else {
                            Response::builder().status(401).body(Full::new(Bytes::new()))
                        };
                        Ok::<_, Infallible>(response.unwrap())
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });
    addr
}

#[tokio::test]
async fn test_client_round_trip_over_http() {
    let addr = spawn_bid_server(auction_body(
        "live-auction",
        vec![wire_bid("x", 1.5, "load", 1)],
    ))
    .await;
    let endpoint = format!("http://{}/openrtb2/auction", addr);
    let transport = Arc::new(HyperTransport::new("mediation-core-tests"));
    let metrics = Arc::new(Metrics::new());

    let client = BidAuctionClient::new(&endpoint, "server-key", transport.clone(), metrics.clone());
    let response = client
        .request_bids(&request(), Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(response.auction_id, "live-auction");
    assert_eq!(response.bids()[0].price, 1.5);

    let rejected = BidAuctionClient::new(&endpoint, "wrong-key", transport, metrics);
    let err = rejected
        .request_bids(&request(), Duration::from_secs(2))
        .await
        .unwrap_err();
    assert_eq!(err, AuctionError::Server { status: 401 });
}

fn manager_with(auction: &str, ids: &[(&str, f64)]) -> AuctionBidManager {
    let manager = AuctionBidManager::new();
    for (id, price) in ids {
        manager.add_bid(auction, Arc::new(bid(id, *price)));
    }
    manager
}

#[test]
fn test_first_load_result_wins() {
    let manager = manager_with("a1", &[("b1", 1.0)]);
    assert!(manager.set_bid_load_result("a1", "b1", false, None));
    // Duplicate callback is ignored
    assert!(!manager.set_bid_load_result("a1", "b1", true, None));
    assert_eq!(
        manager.get_load_result("a1", "b1"),
        Some(BidLoadResult::Failed(LossReason::TechnicalError))
    );
    assert_eq!(
        manager.get_loss_reason("a1", "b1"),
        Some(LossReason::TechnicalError)
    );
}

#[test]
fn test_single_winner_per_auction() {
    let manager = manager_with("a1", &[("b1", 3.0), ("b2", 2.0)]);
    manager.set_winner("a1", "b1").unwrap();
    // Same winner again is fine
    manager.set_winner("a1", "b1").unwrap();
    assert_eq!(
        manager.set_winner("a1", "b2"),
        Err(AuctionStateError::WinnerAlreadySet {
            auction_id: "a1".to_string(),
            existing: "b1".to_string(),
        })
    );
    assert_eq!(manager.get_winner("a1").as_deref(), Some("b1"));
    assert_eq!(manager.get_winning_price("a1"), 3.0);
}

#[test]
fn test_failed_bid_cannot_win() {
    let manager = manager_with("a1", &[("b1", 3.0)]);
    manager.set_bid_load_result("a1", "b1", false, Some(LossReason::TechnicalError));
    assert!(matches!(
        manager.set_winner("a1", "b1"),
        Err(AuctionStateError::BidAlreadyFailed { .. })
    ));
}

#[test]
fn test_unknown_auction_and_bid() {
    let manager = manager_with("a1", &[("b1", 1.0)]);
    assert!(matches!(
        manager.set_winner("nope", "b1"),
        Err(AuctionStateError::UnknownAuction { .. })
    ));
    assert!(matches!(
        manager.set_winner("a1", "nope"),
        Err(AuctionStateError::UnknownBid { .. })
    ));
    assert!(!manager.set_bid_load_result("nope", "b1", true, None));
    assert_eq!(manager.get_winning_price("nope"), 0.0);
}

#[test]
fn test_clear_auction_is_safe() {
    let manager = manager_with("a1", &[("b1", 1.0)]);
    manager.add_bid("a1", Arc::new(bid("b1", 1.0)));
    assert_eq!(manager.bids("a1").len(), 1);

    manager.clear_auction("a1");
    manager.clear_auction("a1");
    manager.clear_auction("never-existed");
    assert!(!manager.contains("a1"));
    assert_eq!(manager.auction_count(), 0);
    assert!(manager.get_bid("a1", "b1").is_none());
}

#[tokio::test]
async fn test_concurrent_results_keep_one_winner() {
    let manager = Arc::new(manager_with(
        "a1",
        &[("b1", 1.0), ("b2", 2.0), ("b3", 3.0), ("b4", 4.0)],
    ));
    let mut tasks = Vec::new();
    for id in ["b1", "b2", "b3", "b4"] {
        let manager = manager.clone();
        tasks.push(tokio::spawn(async move {
            manager.set_bid_load_result("a1", id, true, None);
            manager.set_winner("a1", id).is_ok()
        }));
    }
    let mut winners = 0;
    for task in tasks {
        if task.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
    assert!(manager.get_winner("a1").is_some());
}
