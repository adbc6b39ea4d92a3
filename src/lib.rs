pub mod adapter;
pub mod auction;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod reporting;
pub mod session;
pub mod surface;
pub mod transport;
pub mod types;
pub mod utils;
pub mod winloss;

// Re-export commonly used types for convenience
pub use adapter::{AdEventSender, AdapterAd, AdapterEvent, AdapterFactory, AdapterRegistry};
pub use config::AppConfig;
pub use error::{MediationError, MediationResult};
pub use session::{Session, SessionBuilder};
pub use surface::{BannerAd, FullscreenAd, SurfaceEvent, SurfaceState};
pub use types::{AdType, LossReason, SurfaceHandle};
