// =============================================================================
// Binance Futures REST API Client — public market-data endpoints
// =============================================================================
//
// The screener only reads public data, so no request signing is involved.
// Errors are classified into typed variants (rate limit vs outage vs empty
// payload) because the retry layer and the scan cycle treat them differently.
// =============================================================================

use tracing::{debug, instrument, warn};

use crate::error::{CatalogError, FetchError};
use crate::types::{Candle, Interval, SymbolInfo};

/// Base URL for the USD-M futures REST API.
const FUTURES_BASE_URL: &str = "https://fapi.binance.com";

/// Binance futures REST client for the public market-data endpoints.
#[derive(Debug, Clone)]
pub struct FuturesClient {
    base_url: String,
    client: reqwest::Client,
}

impl FuturesClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    pub fn new() -> Self {
        Self::with_base_url(FUTURES_BASE_URL)
    }

    /// Client pointed at an alternate host, e.g. the futures testnet.
    pub fn with_base_url(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        debug!("FuturesClient initialised (base_url={base_url})");

        Self {
            base_url: base_url.to_string(),
            client,
        }
    }

    // -------------------------------------------------------------------------
    // Exchange info
    // -------------------------------------------------------------------------

    /// GET /fapi/v1/exchangeInfo — every listed instrument, tradable or not.
    ///
    /// Filtering by status and quote asset is left to the caller; entries
    /// that fail to deserialise are skipped with a warning.
    #[instrument(skip(self), name = "binance::exchange_info")]
    pub async fn exchange_info(&self) -> Result<Vec<SymbolInfo>, CatalogError> {
        let url = format!("{}/fapi/v1/exchangeInfo", self.base_url);

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(format!("request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CatalogError::Unavailable(format!(
                "exchange info request returned {status}"
            )));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| CatalogError::Unavailable(format!("unreadable response body: {e}")))?;

        let raw = body["symbols"]
            .as_array()
            .ok_or_else(|| {
                CatalogError::Unavailable("response missing 'symbols' array".to_string())
            })?;

        let mut symbols = Vec::with_capacity(raw.len());
        for entry in raw {
            match serde_json::from_value::<SymbolInfo>(entry.clone()) {
                Ok(info) => symbols.push(info),
                Err(e) => warn!(error = %e, "skipping unparseable exchange info entry"),
            }
        }

        debug!(count = symbols.len(), "exchange info retrieved");
        Ok(symbols)
    }

    // -------------------------------------------------------------------------
    // Klines
    // -------------------------------------------------------------------------

    /// GET /fapi/v1/klines — up to `limit` bars of `interval` for `symbol`.
    ///
    /// Parses Binance's array-of-arrays response format. Array indices:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
    ///   [6] closeTime, [7] quoteAssetVolume, ...
    ///
    /// Numeric fields arrive as JSON strings; a row that cannot be parsed
    /// makes the whole response [`FetchError::EmptyResult`].
    #[instrument(skip(self), name = "binance::klines")]
    pub async fn klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: u32,
    ) -> Result<Vec<Candle>, FetchError> {
        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::Unavailable(format!("request failed: {e}")))?;

        let status = resp.status();
        // 418 is the exchange's auto-ban escalation of 429.
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            warn!(symbol, %status, "kline request rate limited");
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::Unavailable(format!(
                "kline request returned {status}"
            )));
        }

        let raw: Vec<serde_json::Value> = resp.json().await.map_err(|e| {
            warn!(symbol, error = %e, "kline response body was not a JSON array");
            FetchError::EmptyResult
        })?;

        if raw.is_empty() {
            return Err(FetchError::EmptyResult);
        }

        let mut candles = Vec::with_capacity(raw.len());
        for entry in &raw {
            candles.push(Self::parse_kline_row(entry).ok_or(FetchError::EmptyResult)?);
        }

        debug!(symbol, %interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    fn parse_kline_row(entry: &serde_json::Value) -> Option<Candle> {
        let arr = entry.as_array()?;
        if arr.len() < 6 {
            warn!("kline row has only {} elements", arr.len());
            return None;
        }

        let open_time = arr[0].as_i64()?;
        let open = Self::parse_str_f64(&arr[1])?;
        let high = Self::parse_str_f64(&arr[2])?;
        let low = Self::parse_str_f64(&arr[3])?;
        let close = Self::parse_str_f64(&arr[4])?;
        let volume = Self::parse_str_f64(&arr[5])?;

        Some(Candle::new(open_time, open, high, low, close, volume))
    }

    /// Parse a JSON value that may be either a string or a number into `f64`.
    fn parse_str_f64(val: &serde_json::Value) -> Option<f64> {
        if let Some(s) = val.as_str() {
            s.parse::<f64>().ok()
        } else {
            val.as_f64()
        }
    }
}

impl Default for FuturesClient {
    fn default() -> Self {
        Self::new()
    }
}
