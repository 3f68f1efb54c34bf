// =============================================================================
// Kline Fetcher — lookback-window sizing and retry-with-backoff
// =============================================================================
//
// Translates a (interval, range in days) pair into the exchange's kline
// request limit and wraps the raw client call in a bounded retry loop.
// Only retryable failures (rate limits, outages) are retried; an empty
// payload fails immediately because repeating it returns the same answer.
// =============================================================================

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::binance::FuturesClient;
use crate::config::RetrySettings;
use crate::error::FetchError;
use crate::types::{Candle, Interval};

/// Hard cap the exchange places on a single kline request.
pub const MAX_KLINE_LIMIT: u32 = 1000;

/// Number of candles to request for a lookback of `range_days` at `interval`,
/// clamped to the exchange maximum. The multiply saturates, so oversized
/// lookbacks land on the cap instead of overflowing.
pub fn candle_limit(interval: Interval, range_days: u32) -> u32 {
    interval
        .candles_per_day()
        .saturating_mul(range_days)
        .min(MAX_KLINE_LIMIT)
}

/// Run `attempt` up to `policy.max_attempts` times, sleeping
/// `policy.backoff_ms` between tries. Non-retryable errors short-circuit.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetrySettings,
    mut attempt: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt_no = 0;

    loop {
        attempt_no += 1;
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt_no < max_attempts => {
                warn!(
                    attempt = attempt_no,
                    max_attempts,
                    error = %err,
                    "retryable fetch failure, backing off"
                );
                tokio::time::sleep(Duration::from_millis(policy.backoff_ms)).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Fetches candle history for one symbol, applying the retry policy.
#[derive(Debug, Clone)]
pub struct KlineFetcher {
    client: FuturesClient,
    policy: RetrySettings,
}

impl KlineFetcher {
    pub fn new(client: FuturesClient, policy: RetrySettings) -> Self {
        Self { client, policy }
    }

    /// Fetch the lookback window for `symbol` at `interval`.
    ///
    /// Guaranteed non-empty on success: zero usable candles surfaces as
    /// [`FetchError::EmptyResult`] from the client.
    pub async fn fetch(
        &self,
        symbol: &str,
        interval: Interval,
        range_days: u32,
    ) -> Result<Vec<Candle>, FetchError> {
        let limit = candle_limit(interval, range_days);
        let client = self.client.clone();
        let symbol_owned = symbol.to_string();

        retry_with_policy(&self.policy, move || {
            let client = client.clone();
            let symbol = symbol_owned.clone();
            async move { client.klines(&symbol, interval, limit).await }
        })
        .await
    }
}
