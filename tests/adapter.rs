mod common;

use common::*;
use mediation_core::adapter::demo::{DEMO_NETWORK, DemoAdapterFactory};
use mediation_core::adapter::{
    AdEvent, AdEventSender, AdapterEvent, AdapterFactory, AdapterRegistry, destroy_guarded,
    load_guarded,
};
use mediation_core::{AdType, SurfaceHandle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct PanickyAd;

impl mediation_core::AdapterAd for PanickyAd {
    fn network(&self) -> &str {
        "panicky"
    }

    fn load(&mut self, _events: AdEventSender) {
        panic!("load blew up");
    }

    fn show(&mut self, _surface: &SurfaceHandle) {}

    fn destroy(&mut self) {
        panic!("{} exploded", "destroy");
    }
}

#[test]
fn test_registry_resolves_by_name() {
    let mut registry = AdapterRegistry::new();
    assert!(registry.is_empty());
    registry.register("scripted", ScriptedFactory::new());
    registry.register(DEMO_NETWORK, Arc::new(DemoAdapterFactory::default()));

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.names(), vec!["demo", "scripted"]);
    assert!(registry.resolve("scripted").is_some());
    assert!(registry.resolve("missing").is_none());

    let info = registry.adapter_info();
    assert_eq!(info["scripted"]["token"], "scripted-token");
    assert!(info["demo"].contains_key("sdk_version"));
}

#[test]
fn test_sender_reports_closed_channel() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let sender = AdEventSender::new(7, tx);
    assert_eq!(sender.entry(), 7);
    assert!(sender.loaded());
    assert_eq!(
        rx.try_recv().unwrap(),
        AdEvent {
            entry: 7,
            event: AdapterEvent::Loaded
        }
    );

    drop(rx);
    assert!(!sender.failed_to_load("gone"));
}

#[test]
fn test_guarded_calls_contain_panics() {
    let reporter = RecordingReporter::default();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut ad = PanickyAd;

    load_guarded(&mut ad, AdEventSender::new(1, tx), &reporter);
    assert_eq!(
        rx.try_recv().unwrap().event,
        AdapterEvent::FailedToLoad {
            reason: "load blew up".to_string()
        }
    );

    destroy_guarded(&mut ad, &reporter);
    let reports = reporter.reports.lock().clone();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].0, "adapter.load");
    assert_eq!(reports[1].0, "adapter.destroy");
    assert!(reports[1].1.contains("destroy exploded"));
}

#[tokio::test]
async fn test_demo_adapter_loads_and_shows() {
    let factory = DemoAdapterFactory::new(Duration::from_millis(5));
    let mut ad = factory.create(AdType::Interstitial, &bid("b1", 1.0)).unwrap();
    assert_eq!(ad.network(), DEMO_NETWORK);

    let (tx, mut rx) = mpsc::unbounded_channel();
    ad.load(AdEventSender::new(3, tx));
    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.event, AdapterEvent::Loaded);

    ad.show(&SurfaceHandle::new("screen"));
    let shown: Vec<AdapterEvent> = std::iter::from_fn(|| rx.try_recv().ok())
        .map(|e| e.event)
        .collect();
    assert_eq!(
        shown,
        vec![
            AdapterEvent::Shown,
            AdapterEvent::Impression,
            AdapterEvent::Closed
        ]
    );

    ad.destroy();
    assert_eq!(factory.destroyed_count(), 1);
}

#[tokio::test]
async fn test_demo_adapter_fails_without_creative() {
    let factory = DemoAdapterFactory::new(Duration::from_millis(1));
    let mut failing = bid("b1", 1.0);
    failing.adm = None;
    let mut ad = factory.create(AdType::Banner, &failing).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    ad.load(AdEventSender::new(1, tx));
    let event = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(event.event, AdapterEvent::FailedToLoad { .. }));
}
