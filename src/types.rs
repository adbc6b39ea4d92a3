use serde::{Deserialize, Serialize};
use std::fmt;

/// Ad formats the engine can mediate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdType {
    Banner,
    Mrec,
    Interstitial,
    #[serde(rename = "REWARD_VIDEO")]
    Rewarded,
    Native,
}

impl AdType {
    /// Interstitial and rewarded take over the whole screen
    pub fn is_fullscreen(&self) -> bool {
        matches!(self, AdType::Interstitial | AdType::Rewarded)
    }

    /// Value used for `imp.ext.adtype` in bid requests
    pub fn as_str(&self) -> &'static str {
        match self {
            AdType::Banner => "banner",
            AdType::Mrec => "mrec",
            AdType::Interstitial => "interstitial",
            AdType::Rewarded => "rewarded",
            AdType::Native => "native",
        }
    }
}

impl fmt::Display for AdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a bid did not win, as reported in loss notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LossReason {
    /// Adapter missing, creation failed, load failed or timed out
    TechnicalError,
    /// Another bid in the same auction loaded first
    LostToHigherBid,
}

impl LossReason {
    /// Wire code used in `${AUCTION_LOSS}` and payload fields
    pub fn code(&self) -> u8 {
        match self {
            LossReason::TechnicalError => 1,
            LossReason::LostToHigherBid => 4,
        }
    }
}

/// Opaque handle to the host view an adapter renders into
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SurfaceHandle {
    pub id: String,
}

impl SurfaceHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}
