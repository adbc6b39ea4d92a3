use crate::types::AdType;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub sdk: SdkConfig,
    pub auction: AuctionConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub waterfall: WaterfallConfig,
    #[serde(default)]
    pub retries: RetryConfig,
    #[serde(default)]
    pub win_loss: WinLossConfig,
    #[serde(default)]
    pub placements: Vec<PlacementConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Log file path; console only when unset
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub json: bool,
    /// Daily rotation for the log file
    #[serde(default)]
    pub rotation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdkConfig {
    pub app_key: String,
    pub publisher_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub app_bundle: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuctionConfig {
    /// Bid endpoint (http or https)
    pub endpoint: String,
    /// Hard deadline for one bid round-trip
    #[serde(default = "default_tmax_ms")]
    pub tmax_ms: u64,
    #[serde(default = "default_bid_floor")]
    pub bid_floor: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Loaded ads kept ready per placement
    pub size: usize,
    /// Hard deadline for one adapter load
    pub bid_load_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Failed auction cycles tolerated before giving up; unlimited when unset
    #[serde(default)]
    pub max_attempts: Option<u32>,
}

/// Per-ad-type retry switches, all off unless configured
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub banner: bool,
    #[serde(default)]
    pub interstitial: bool,
    #[serde(default)]
    pub rewarded: bool,
    #[serde(default)]
    pub native: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinLossConfig {
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Payload key -> field template, as delivered by the server
    #[serde(default)]
    pub payload: HashMap<String, String>,
    /// Fire bid nurl/lurl in addition to the server notification
    #[serde(default)]
    pub fire_tracking_urls: bool,
    /// JSON file holding undelivered notifications; memory only when unset
    #[serde(default)]
    pub store_path: Option<String>,
    #[serde(default = "default_max_pending_events")]
    pub max_pending_events: usize,
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementConfig {
    pub id: String,
    pub name: String,
    pub ad_type: AdType,
    /// Banner auto-refresh period
    #[serde(default)]
    pub refresh_interval_ms: Option<u64>,
    /// Pause the waterfall while a banner is off screen
    #[serde(default)]
    pub suspend_when_hidden: bool,
    /// Overrides `cache.size` for this placement
    #[serde(default)]
    pub cache_size: Option<usize>,
}

fn default_tmax_ms() -> u64 {
    3000
}

fn default_bid_floor() -> f64 {
    0.01
}

fn default_max_pending_events() -> usize {
    500
}

fn default_send_timeout_ms() -> u64 {
    10_000
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            json: false,
            rotation: false,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size: 2,
            bid_load_timeout_ms: 10_000,
        }
    }
}

impl Default for WaterfallConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1000,
            max_backoff_ms: 60_000,
            max_attempts: None,
        }
    }
}

impl Default for WinLossConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            payload: HashMap::new(),
            fire_tracking_urls: false,
            store_path: None,
            max_pending_events: default_max_pending_events(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            sdk: SdkConfig {
                app_key: "demo-app-key".to_string(),
                publisher_id: "demo-publisher".to_string(),
                user_id: None,
                app_bundle: None,
            },
            auction: AuctionConfig {
                endpoint: "http://127.0.0.1:8080/openrtb2/auction".to_string(),
                tmax_ms: default_tmax_ms(),
                bid_floor: default_bid_floor(),
            },
            cache: CacheConfig::default(),
            waterfall: WaterfallConfig::default(),
            retries: RetryConfig::default(),
            win_loss: WinLossConfig::default(),
            placements: vec![
                PlacementConfig {
                    id: "banner-home".to_string(),
                    name: "Home banner".to_string(),
                    ad_type: AdType::Banner,
                    refresh_interval_ms: Some(30_000),
                    suspend_when_hidden: true,
                    cache_size: Some(1),
                },
                PlacementConfig {
                    id: "interstitial-level-end".to_string(),
                    name: "Level end".to_string(),
                    ad_type: AdType::Interstitial,
                    refresh_interval_ms: None,
                    suspend_when_hidden: false,
                    cache_size: None,
                },
            ],
        }
    }
}

impl RetryConfig {
    /// Whether a failed waterfall may be retried for this ad type
    pub fn is_enabled(&self, ad_type: AdType) -> bool {
        match ad_type {
            AdType::Banner | AdType::Mrec => self.banner,
            AdType::Interstitial => self.interstitial,
            AdType::Rewarded => self.rewarded,
            AdType::Native => self.native,
        }
    }
}

impl PlacementConfig {
    pub fn refresh_interval(&self) -> Option<Duration> {
        self.refresh_interval_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        Ok(config)
    }

    /// Load configuration from file or use default
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        Self::from_file(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config file, using defaults: {}", e);
            Self::default()
        })
    }

    /// Check invariants the engine relies on
    pub fn validate(&self) -> Result<()> {
        if self.sdk.app_key.trim().is_empty() {
            anyhow::bail!("sdk.app_key must not be empty");
        }
        if !is_http_url(&self.auction.endpoint) {
            anyhow::bail!(
                "auction.endpoint must be an http(s) URL: {}",
                self.auction.endpoint
            );
        }
        if self.auction.tmax_ms == 0 {
            anyhow::bail!("auction.tmax_ms must be greater than zero");
        }
        if self.cache.size == 0 {
            anyhow::bail!("cache.size must be at least 1");
        }
        if self.cache.bid_load_timeout_ms == 0 {
            anyhow::bail!("cache.bid_load_timeout_ms must be greater than zero");
        }
        if self.waterfall.initial_backoff_ms > self.waterfall.max_backoff_ms {
            anyhow::bail!(
                "waterfall.initial_backoff_ms ({}) exceeds max_backoff_ms ({})",
                self.waterfall.initial_backoff_ms,
                self.waterfall.max_backoff_ms
            );
        }
        if let Some(endpoint) = &self.win_loss.endpoint
            && !is_http_url(endpoint)
        {
            anyhow::bail!("win_loss.endpoint must be an http(s) URL: {}", endpoint);
        }

        let mut seen = std::collections::HashSet::new();
        for placement in &self.placements {
            if placement.id.trim().is_empty() {
                anyhow::bail!("placement '{}' has an empty id", placement.name);
            }
            if !seen.insert(placement.id.as_str()) {
                anyhow::bail!("duplicate placement id: {}", placement.id);
            }
            if placement.cache_size == Some(0) {
                anyhow::bail!("placement {} cache_size must be at least 1", placement.id);
            }
        }
        Ok(())
    }

    /// Look up a placement by id
    pub fn placement(&self, id: &str) -> Option<&PlacementConfig> {
        self.placements.iter().find(|p| p.id == id)
    }

    /// Effective cache size for a placement
    pub fn cache_size_for(&self, placement: &PlacementConfig) -> usize {
        placement.cache_size.unwrap_or(self.cache.size)
    }

    pub fn bid_load_timeout(&self) -> Duration {
        Duration::from_millis(self.cache.bid_load_timeout_ms)
    }

    pub fn tmax(&self) -> Duration {
        Duration::from_millis(self.auction.tmax_ms)
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
