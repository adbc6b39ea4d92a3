use mediation_core::AdType;
use mediation_core::config::*;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_default_config() {
    let config = AppConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.placements.len(), 2);
    assert_eq!(config.cache.size, 2);
    assert_eq!(config.tmax(), Duration::from_secs(3));
    assert!(config.win_loss.endpoint.is_none());
    assert!(!config.retries.is_enabled(AdType::Interstitial));
}

#[test]
fn test_config_from_toml() {
    let file = write_config(
        r#"
[sdk]
app_key = "key-123"
publisher_id = "pub-9"

[auction]
endpoint = "https://bid.example.test/openrtb2/auction"
tmax_ms = 1500

[cache]
size = 3
bid_load_timeout_ms = 5000

[waterfall]
initial_backoff_ms = 500
max_backoff_ms = 8000
max_attempts = 4

[retries]
banner = true
rewarded = true

[win_loss]
endpoint = "https://events.example.test/win-loss"
store_path = "/tmp/pending.json"

[win_loss.payload]
auctionId = "auction.id"
result = "sdk.[win|loss]"

[[placements]]
id = "home"
name = "Home banner"
ad_type = "BANNER"
refresh_interval_ms = 30000
suspend_when_hidden = true

[[placements]]
id = "reward"
name = "Bonus coins"
ad_type = "REWARD_VIDEO"
cache_size = 1
"#,
    );

    let config = AppConfig::from_file(file.path()).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.sdk.app_key, "key-123");
    assert_eq!(config.tmax(), Duration::from_millis(1500));
    assert_eq!(config.auction.bid_floor, 0.01);
    assert_eq!(config.bid_load_timeout(), Duration::from_secs(5));
    assert_eq!(config.waterfall.max_attempts, Some(4));
    assert!(config.retries.is_enabled(AdType::Banner));
    assert!(config.retries.is_enabled(AdType::Mrec));
    assert!(config.retries.is_enabled(AdType::Rewarded));
    assert!(!config.retries.is_enabled(AdType::Native));
    assert_eq!(config.win_loss.payload.len(), 2);
    assert_eq!(config.win_loss.max_pending_events, 500);
    assert_eq!(config.logging.level, "info");

    let home = config.placement("home").unwrap();
    assert_eq!(home.ad_type, AdType::Banner);
    assert_eq!(home.refresh_interval(), Some(Duration::from_secs(30)));
    assert_eq!(config.cache_size_for(home), 3);

    let reward = config.placement("reward").unwrap();
    assert_eq!(reward.ad_type, AdType::Rewarded);
    assert_eq!(reward.refresh_interval(), None);
    assert_eq!(config.cache_size_for(reward), 1);
    assert!(config.placement("missing").is_none());
}

#[test]
fn test_zero_refresh_interval_disables_refresh() {
    let mut placement = AppConfig::default().placements[0].clone();
    placement.refresh_interval_ms = Some(0);
    assert_eq!(placement.refresh_interval(), None);
}

#[test]
fn test_missing_file_and_bad_toml() {
    assert!(AppConfig::from_file("/nonexistent/mediation.toml").is_err());

    let file = write_config("[sdk\napp_key = ");
    let err = AppConfig::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));

    // Falls back to defaults
    let config = AppConfig::load_or_default(file.path());
    assert_eq!(config.placements.len(), 2);
}

#[test]
fn test_validate_rejects_bad_values() {
    let cases: [(fn(&mut AppConfig), &str); 10] = [
        (|c: &mut AppConfig| c.sdk.app_key = " ".to_string(), "app_key"),
        (|c: &mut AppConfig| c.auction.endpoint = "ftp://x".to_string(), "auction.endpoint"),
        (|c: &mut AppConfig| c.auction.tmax_ms = 0, "tmax_ms"),
        (|c: &mut AppConfig| c.cache.size = 0, "cache.size"),
        (|c: &mut AppConfig| c.cache.bid_load_timeout_ms = 0, "bid_load_timeout_ms"),
        (|c: &mut AppConfig| c.waterfall.initial_backoff_ms = 120_000, "initial_backoff_ms"),
        (
            |c: &mut AppConfig| c.win_loss.endpoint = Some("events".to_string()),
            "win_loss.endpoint",
        ),
        (|c: &mut AppConfig| c.placements[0].cache_size = Some(0), "cache_size"),
        (|c: &mut AppConfig| c.placements[1].id = c.placements[0].id.clone(), "duplicate"),
        (|c: &mut AppConfig| c.placements[0].id = String::new(), "empty id"),
    ];

    for (mutate, expected) in cases {
        let mut config = AppConfig::default();
        mutate(&mut config);
        let err = config.validate().unwrap_err();
        assert!(
            err.to_string().contains(expected),
            "expected '{}' in '{}'",
            expected,
            err
        );
    }
}
