/// Error types for the mediation engine
use crate::types::AdType;
use thiserror::Error;

/// Main error type for mediation operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MediationError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Bid auction errors
    #[error("Auction failed: {0}")]
    Auction(#[from] AuctionError),

    /// Ad cache queue errors
    #[error("Ad cache error: {0}")]
    Cache(#[from] CacheError),

    /// Waterfall backoff exhausted
    #[error("Waterfall backoff error: {0}")]
    Backoff(#[from] BackoffError),

    /// Retrying is switched off for this ad type
    #[error("Retries disabled for {ad_type} placements")]
    RetriesDisabled { ad_type: AdType },

    /// Auction bookkeeping errors
    #[error("Bid state error: {0}")]
    BidState(#[from] AuctionStateError),

    /// HTTP transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Pending event store errors
    #[error("Event store error: {0}")]
    Store(#[from] StoreError),

    /// Ad surface errors
    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Errors produced by one bid request round-trip
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuctionError {
    /// Auction returned no bids
    #[error("No fill for placement {placement_id}")]
    NoFill { placement_id: String },

    /// Connection or transfer failure
    #[error("Network error talking to {endpoint}: {reason}")]
    Network { endpoint: String, reason: String },

    /// Response could not be interpreted
    #[error("Invalid auction response: {reason}")]
    InvalidResponse { reason: String },

    /// Auction server returned an error status
    #[error("Auction server returned status {status}")]
    Server { status: u16 },

    /// Request exceeded tmax
    #[error("Auction request timeout after {timeout:?}")]
    RequestTimeout { timeout: std::time::Duration },
}

/// Ad cache queue errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CacheError {
    /// No ad object was supplied
    #[error("Ad is nil")]
    AdIsNil,

    /// Adapter reported a load failure
    #[error("Ad failed to load: {reason}")]
    FailedToLoad { reason: String },

    /// Adapter did not answer before the load deadline
    #[error("Ad load timeout after {timeout:?}")]
    Timeout { timeout: std::time::Duration },

    /// No capacity left for another load
    #[error("Cache queue is full (capacity {capacity})")]
    QueueOverflow { capacity: usize },

    /// No adapter could produce an ad for the bid
    #[error("Failed to create ad for network {network}")]
    FailedToCreateAd { network: String },

    /// Bid is already cached or loading
    #[error("Bid {bid_id} is already queued")]
    DuplicateBid { bid_id: String },

    /// Queue was torn down
    #[error("Cache queue destroyed")]
    Destroyed,
}

/// Backoff strategy errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackoffError {
    #[error("Max attempts reached ({max_attempts})")]
    MaxAttemptsReached { max_attempts: u32 },
}

/// Auction bid manager errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuctionStateError {
    #[error("Unknown auction: {auction_id}")]
    UnknownAuction { auction_id: String },

    #[error("Unknown bid {bid_id} in auction {auction_id}")]
    UnknownBid { auction_id: String, bid_id: String },

    #[error("Auction {auction_id} already has winner {existing}")]
    WinnerAlreadySet { auction_id: String, existing: String },

    #[error("Bid {bid_id} already failed to load and cannot win")]
    BidAlreadyFailed { bid_id: String },
}

/// HTTP transport errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("Failed to build request to {url}: {reason}")]
    InvalidRequest { url: String, reason: String },

    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("Request to {url} timed out after {timeout:?}")]
    Timeout {
        url: String,
        timeout: std::time::Duration,
    },

    #[error("Failed to initialize HTTP client: {reason}")]
    ClientInit { reason: String },
}

/// Pending win/loss event store errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Failed to read event store {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to write event store {path}: {reason}")]
    Write { path: String, reason: String },

    #[error("Corrupt event store {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Ad surface errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SurfaceError {
    #[error("Ad is not ready to be shown")]
    NotReady,

    #[error("Ad is already showing")]
    AlreadyShowing,

    #[error("Ad expired before it was shown")]
    Expired,

    #[error("Ad failed to show: {reason}")]
    ShowFailed { reason: String },

    #[error("Surface destroyed")]
    Destroyed,
}

impl MediationError {
    /// Stable numeric code the host app can branch on.
    ///
    /// Ranges: 200-299 network, 300-399 ad loading, 400-499 display,
    /// 500-599 configuration.
    pub fn code(&self) -> u16 {
        match self {
            MediationError::Config(_) => 500,
            MediationError::InvalidInput(_) => 301,
            MediationError::Auction(e) => match e {
                AuctionError::NoFill { .. } => 300,
                AuctionError::Network { .. } => 200,
                AuctionError::RequestTimeout { .. } => 201,
                AuctionError::InvalidResponse { .. } => 202,
                AuctionError::Server { .. } => 203,
            },
            MediationError::Cache(e) => match e {
                CacheError::Timeout { .. } => 303,
                CacheError::FailedToLoad { .. } => 304,
                CacheError::AdIsNil => 305,
                CacheError::Destroyed => 307,
                CacheError::QueueOverflow { .. } => 309,
                CacheError::FailedToCreateAd { .. } => 310,
                CacheError::DuplicateBid { .. } => 311,
            },
            MediationError::Backoff(_) => 306,
            MediationError::RetriesDisabled { .. } => 308,
            MediationError::BidState(_) => 312,
            MediationError::Transport(e) => match e {
                TransportError::Timeout { .. } => 201,
                _ => 200,
            },
            MediationError::Store(_) => 505,
            MediationError::Surface(e) => match e {
                SurfaceError::NotReady => 400,
                SurfaceError::AlreadyShowing => 401,
                SurfaceError::Expired => 402,
                SurfaceError::ShowFailed { .. } => 404,
                SurfaceError::Destroyed => 405,
            },
        }
    }

    /// Whether calling `load()` again later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            MediationError::Auction(_) => true,
            MediationError::Cache(CacheError::Destroyed) => false,
            MediationError::Cache(_) => true,
            MediationError::Transport(_) => true,
            MediationError::Surface(SurfaceError::NotReady | SurfaceError::Expired) => true,
            MediationError::Backoff(_)
            | MediationError::RetriesDisabled { .. }
            | MediationError::Config(_)
            | MediationError::InvalidInput(_)
            | MediationError::BidState(_)
            | MediationError::Store(_)
            | MediationError::Surface(_) => false,
        }
    }
}

/// Result type alias for convenience
pub type MediationResult<T> = Result<T, MediationError>;

/// Helper trait to convert errors to [`MediationError`].
///
/// Wraps errors from external operations (parsing, validation) into
/// [`MediationError::InvalidInput`] with additional context.
///
/// # Example
///
/// ```rust
/// use mediation_core::error::ToMediationError;
///
/// let result: Result<String, &'static str> = Err("invalid format");
/// let converted = result.to_mediation_error("JSON parsing").unwrap_err();
/// assert_eq!(converted.code(), 301);
/// ```
pub trait ToMediationError<T> {
    /// Convert the result to a [`MediationResult`] with context.
    fn to_mediation_error(self, context: &str) -> Result<T, MediationError>;
}

impl<T, E: std::fmt::Display> ToMediationError<T> for Result<T, E> {
    fn to_mediation_error(self, context: &str) -> Result<T, MediationError> {
        self.map_err(|e| MediationError::InvalidInput(format!("{}: {}", context, e)))
    }
}
