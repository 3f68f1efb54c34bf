// =============================================================================
// Error types for exchange-facing operations
// =============================================================================
//
// Fetch failures are classified so the retry layer and the scan cycle can
// react differently: rate limits and transient outages are worth retrying,
// an empty or malformed payload is not.

use thiserror::Error;

/// Failure of a single kline fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The exchange answered 429 or 418. Back off before trying again.
    #[error("rate limited by the exchange")]
    RateLimited,

    /// Transport failure or a non-success HTTP status other than a rate
    /// limit.
    #[error("exchange unavailable: {0}")]
    Unavailable(String),

    /// The exchange answered 200 but the payload held no usable candles.
    #[error("empty or malformed kline payload")]
    EmptyResult,
}

impl FetchError {
    /// Whether a retry with backoff has any chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Unavailable(_))
    }
}

/// Failure while loading the tradable-symbol catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("exchange info unavailable: {0}")]
    Unavailable(String),

    /// The exchange answered but nothing matched the quote asset filter.
    #[error("exchange info contained no tradable symbols")]
    NoSymbols,
}
