// =============================================================================
// Screener Configuration — Hot-reloadable scan settings with atomic save
// =============================================================================
//
// Central configuration hub for the Flowboard screener.  Every tunable
// parameter lives here so that scan behaviour can be changed at runtime
// through the API without a restart.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::Interval;

/// On-disk location of the screener config, relative to the working directory.
pub const CONFIG_PATH: &str = "flowboard.json";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_range_days() -> u32 {
    3
}

fn default_batch_size() -> usize {
    8
}

fn default_batch_pause_ms() -> u64 {
    200
}

fn default_refresh_cooldown_secs() -> u64 {
    30
}

fn default_universe_size() -> usize {
    50
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    1000
}

// =============================================================================
// RetrySettings
// =============================================================================

/// Retry policy for kline fetches that fail with a retryable error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per fetch, including the first one. Floored at 1.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between attempts, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

// =============================================================================
// ScreenerConfig
// =============================================================================

/// Top-level configuration for the Flowboard screener.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerConfig {
    // --- Scan shape ----------------------------------------------------------

    /// Kline interval every tracked symbol is scanned at.
    #[serde(default)]
    pub interval: Interval,

    /// Lookback window in days. Together with `interval` this decides the
    /// kline request limit.
    #[serde(default = "default_range_days")]
    pub range_days: u32,

    /// Whether spike-event smoothing is applied on top of the base
    /// pressure series.
    #[serde(default = "default_true")]
    pub smoothing: bool,

    // --- Universe ------------------------------------------------------------

    /// Quote asset the tracked universe is filtered to.
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    /// Maximum number of symbols kept after popularity ranking.
    #[serde(default = "default_universe_size")]
    pub universe_size: usize,

    // --- Pacing --------------------------------------------------------------
    // The exchange weighs kline requests; these keep a full-universe scan
    // under the per-minute budget.

    /// Symbols fetched concurrently per group.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between consecutive groups, in milliseconds.
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,

    // --- Refresh -------------------------------------------------------------

    /// Whether the background loop re-runs the scan on its own.
    #[serde(default)]
    pub auto_refresh: bool,

    /// Seconds between the end of one auto-refresh cycle and the start of
    /// the next.
    #[serde(default = "default_refresh_cooldown_secs")]
    pub refresh_cooldown_secs: u64,

    // --- Fetch retry ---------------------------------------------------------

    #[serde(default)]
    pub retry: RetrySettings,
}

impl Default for ScreenerConfig {
    fn default() -> Self {
        Self {
            interval: Interval::H1,
            range_days: default_range_days(),
            smoothing: true,
            quote_asset: default_quote_asset(),
            universe_size: default_universe_size(),
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            auto_refresh: false,
            refresh_cooldown_secs: default_refresh_cooldown_secs(),
            retry: RetrySettings::default(),
        }
    }
}

impl ScreenerConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read screener config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse screener config from {}", path.display()))?;

        info!(
            path = %path.display(),
            interval = %config.interval,
            range_days = config.range_days,
            smoothing = config.smoothing,
            "screener config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    ///
    /// This prevents corruption if the process crashes mid-write.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise screener config to JSON")?;

        // Atomic write: write to a temporary sibling file, then rename.
        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "screener config saved (atomic)");
        Ok(())
    }
}
