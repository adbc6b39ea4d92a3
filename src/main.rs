use anyhow::{Context, Result};
use mediation_core::adapter::demo::{DEMO_NETWORK, DemoAdapterFactory};
use mediation_core::{AdType, AppConfig, Session, SurfaceHandle, logging};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|e| anyhow::anyhow!("Failed to install default crypto provider: {:?}", e))?;

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    // Load config first (before logging init) to get logging config
    let config = AppConfig::load_or_default(&config_path);
    config
        .validate()
        .context("Configuration validation failed")?;

    let _guard =
        logging::init_logging(&config.logging).context("Failed to initialize logging system")?;

    info!("Mediation demo starting...");
    info!(
        "Logging initialized - level: {}, file: {:?}, json: {}",
        config.logging.level, config.logging.file, config.logging.json
    );

    let session = Session::builder(config.clone())
        .register_adapter(DEMO_NETWORK, Arc::new(DemoAdapterFactory::default()))
        .build()
        .context("Failed to build mediation session")?;

    let delivered = session.start().await;
    info!("Delivered {} pending notification(s)", delivered);

    let mut banners = Vec::new();
    let mut fullscreen = Vec::new();
    for placement in &config.placements {
        match placement.ad_type {
            AdType::Banner | AdType::Mrec => {
                let (banner, _events) = session.create_banner(&placement.id)?;
                let handle = SurfaceHandle::new(format!("view-{}", placement.id));
                if let Err(e) = banner.load(handle).await {
                    warn!("Banner {} failed to load: {}", placement.id, e);
                }
                banners.push(banner);
            }
            _ => {
                let (ad, _events) = session.create_fullscreen(&placement.id)?;
                if let Err(e) = ad.load().await {
                    warn!("{} {} failed to load: {}", placement.ad_type, placement.id, e);
                }
                fullscreen.push(ad);
            }
        }
    }

    info!("Placements primed. Press Ctrl+C to shutdown.");

    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = serde_json::to_string(&session.metrics().snapshot())
                    .unwrap_or_default();
                info!("Metrics: {}", snapshot);
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for shutdown signal")?;
                break;
            }
        }
    }

    info!("Shutdown signal received, shutting down gracefully...");
    for banner in &banners {
        banner.destroy();
    }
    for ad in &fullscreen {
        ad.destroy();
    }
    Ok(())
}
