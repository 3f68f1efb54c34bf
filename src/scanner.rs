// =============================================================================
// Scan Engine — full-universe refresh cycles
// =============================================================================
//
// One cycle walks the tracked universe in fixed-size groups: every symbol in
// a group is fetched and evaluated concurrently, the board is updated for
// the successes, failures keep their previous row, and the engine pauses
// between groups to stay inside the exchange's request weight budget.
//
// A single atomic guard serialises cycles: manual triggers and the
// auto-refresh loop share it, and a trigger that arrives mid-cycle is
// discarded, never queued.
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::join_all;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ScreenerConfig;
use crate::error::FetchError;
use crate::fetcher::KlineFetcher;
use crate::observer::CycleObserver;
use crate::ranking::MetricsUpdate;
use crate::signal_detector::{bars_ago, detect_signals, latest_signal};
use crate::state::ScreenerState;
use crate::types::Candle;
use crate::volume_profile::calculate_volume_profile;

/// Summary of one finished scan cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: String,
    pub total: usize,
    pub updated: usize,
    pub failed: usize,
    pub started_at_ms: i64,
    pub elapsed_ms: u64,
}

/// Outcome of a refresh request.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(CycleReport),
    Failed,
    /// A cycle was already in flight; the request was discarded.
    Skipped,
}

/// Clears the busy flag when dropped, so a cycle that panics mid-flight
/// cannot leave the engine stuck refusing every later trigger.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives fetch + profile + detection across the tracked universe.
pub struct ScanEngine {
    state: Arc<ScreenerState>,
    fetcher: KlineFetcher,
    observers: RwLock<Vec<Arc<dyn CycleObserver>>>,
}

impl ScanEngine {
    pub fn new(state: Arc<ScreenerState>, fetcher: KlineFetcher) -> Self {
        Self {
            state,
            fetcher,
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn state(&self) -> &Arc<ScreenerState> {
        &self.state
    }

    pub fn fetcher(&self) -> &KlineFetcher {
        &self.fetcher
    }

    pub fn add_observer(&self, observer: Arc<dyn CycleObserver>) {
        self.observers.write().push(observer);
    }

    /// Run one cycle now, unless one is already in flight.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if !self.try_begin() {
            debug!("refresh request discarded: cycle already running");
            return CycleOutcome::Skipped;
        }
        self.execute_and_finish().await
    }

    /// Fire-and-forget variant for API handlers: reports whether a new
    /// cycle was started without waiting for it to finish.
    pub fn spawn_cycle(self: Arc<Self>) -> bool {
        if !self.try_begin() {
            debug!("refresh request discarded: cycle already running");
            return false;
        }
        tokio::spawn(async move {
            self.execute_and_finish().await;
        });
        true
    }

    /// Background loop driving periodic refreshes. The cooldown re-arms
    /// after each pass completes, so slow cycles stretch the period instead
    /// of stacking up.
    pub async fn run_refresh_loop(self: Arc<Self>) {
        loop {
            let (enabled, cooldown_secs) = {
                let cfg = self.state.config.read();
                (cfg.auto_refresh, cfg.refresh_cooldown_secs)
            };

            if enabled {
                match self.run_cycle().await {
                    CycleOutcome::Completed(report) => debug!(
                        cycle_id = %report.cycle_id,
                        updated = report.updated,
                        failed = report.failed,
                        "auto-refresh cycle finished"
                    ),
                    CycleOutcome::Skipped => {
                        debug!("auto-refresh tick discarded: cycle already running")
                    }
                    // Failures are reported through the observers.
                    CycleOutcome::Failed => {}
                }
            }

            tokio::time::sleep(Duration::from_secs(cooldown_secs.max(1))).await;
        }
    }

    fn try_begin(&self) -> bool {
        self.state
            .cycle_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Must only be called with the busy flag held; the flag is released
    /// when the guard drops, on return and on unwind alike.
    async fn execute_and_finish(&self) -> CycleOutcome {
        let _guard = CycleGuard(&self.state.cycle_running);
        match self.execute_cycle().await {
            Ok(report) => {
                *self.state.last_report.write() = Some(report.clone());
                for observer in self.observers.read().iter() {
                    observer.on_cycle_complete(&report);
                }
                CycleOutcome::Completed(report)
            }
            Err(err) => {
                for observer in self.observers.read().iter() {
                    observer.on_cycle_error(&err);
                }
                CycleOutcome::Failed
            }
        }
    }

    async fn execute_cycle(&self) -> anyhow::Result<CycleReport> {
        let cfg = self.state.config_snapshot();
        let symbols = self.state.board.symbols();
        if symbols.is_empty() {
            anyhow::bail!("tracked universe is empty");
        }

        let cycle_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let started_at_ms = Utc::now().timestamp_millis();

        info!(
            cycle_id = %cycle_id,
            symbols = symbols.len(),
            interval = %cfg.interval,
            range_days = cfg.range_days,
            "scan cycle started"
        );

        let mut updated = 0usize;
        let mut failed = 0usize;

        let group_size = cfg.batch_size.max(1);
        let groups: Vec<&[String]> = symbols.chunks(group_size).collect();
        let group_count = groups.len();

        for (group_no, group) in groups.into_iter().enumerate() {
            let results =
                join_all(group.iter().map(|symbol| self.evaluate_symbol(symbol, &cfg))).await;

            for (symbol, result) in group.iter().zip(results) {
                match result {
                    Ok(update) => {
                        if self.state.board.apply_update(symbol, update) {
                            updated += 1;
                        } else {
                            failed += 1;
                            warn!(symbol = %symbol, "symbol vanished from the board mid-cycle");
                        }
                    }
                    Err(err) => {
                        failed += 1;
                        warn!(symbol = %symbol, error = %err, "symbol skipped this cycle");
                    }
                }
            }

            // Breathe between groups; the final group has nothing after it.
            if group_no + 1 < group_count {
                tokio::time::sleep(Duration::from_millis(cfg.batch_pause_ms)).await;
            }
        }

        Ok(CycleReport {
            cycle_id,
            total: symbols.len(),
            updated,
            failed,
            started_at_ms,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn evaluate_symbol(
        &self,
        symbol: &str,
        cfg: &ScreenerConfig,
    ) -> Result<MetricsUpdate, FetchError> {
        let candles = self
            .fetcher
            .fetch(symbol, cfg.interval, cfg.range_days)
            .await?;
        build_metrics(&candles, cfg.smoothing).ok_or(FetchError::EmptyResult)
    }
}

/// Full per-symbol evaluation: candles → pressure profile → latest strong
/// signal. `None` only for an empty candle slice.
pub fn build_metrics(candles: &[Candle], smoothing: bool) -> Option<MetricsUpdate> {
    let last = candles.last()?;

    let series = calculate_volume_profile(candles, smoothing);
    let (positive_pct, negative_pct, buy_pct, sell_pct) = series.last_values()?;

    let signals = detect_signals(candles, &series);
    let last_signal = latest_signal(&signals).cloned();
    let last_signal_bars_ago = last_signal.as_ref().and_then(|s| bars_ago(candles, s));

    Some(MetricsUpdate {
        last_price: last.close,
        positive_pct,
        negative_pct,
        buy_pct,
        sell_pct,
        last_update_ms: last.open_time,
        last_signal,
        last_signal_bars_ago,
    })
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::binance::FuturesClient;
    use crate::config::RetrySettings;
    use crate::types::{SignalKind, SymbolInfo};
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicUsize;

    fn test_engine() -> (Arc<ScreenerState>, Arc<ScanEngine>) {
        let state = Arc::new(ScreenerState::new(ScreenerConfig::default()));
        let fetcher = KlineFetcher::new(FuturesClient::new(), RetrySettings::default());
        let engine = Arc::new(ScanEngine::new(state.clone(), fetcher));
        (state, engine)
    }

    /// Engine pointed at a stub exchange, with retries and group pauses
    /// disabled so failures surface immediately.
    fn stub_engine(base_url: &str) -> (Arc<ScreenerState>, Arc<ScanEngine>) {
        let no_retry = RetrySettings {
            max_attempts: 1,
            backoff_ms: 0,
        };
        let config = ScreenerConfig {
            batch_pause_ms: 0,
            retry: no_retry.clone(),
            ..ScreenerConfig::default()
        };
        let state = Arc::new(ScreenerState::new(config));
        let fetcher = KlineFetcher::new(FuturesClient::with_base_url(base_url), no_retry);
        let engine = Arc::new(ScanEngine::new(state.clone(), fetcher));
        (state, engine)
    }

    fn info(symbol: &str, base: &str) -> SymbolInfo {
        SymbolInfo {
            symbol: symbol.to_string(),
            base_asset: base.to_string(),
            quote_asset: "USDT".to_string(),
            status: "TRADING".to_string(),
        }
    }

    /// Serves canned klines on a local port; `FLAKYUSDT` always gets a 500.
    /// The candle set matches the reference scenario used in the
    /// `build_metrics` tests, so the resulting rows are predictable.
    async fn spawn_stub_exchange() -> String {
        async fn klines(Query(params): Query<HashMap<String, String>>) -> Response {
            if params.get("symbol").map(String::as_str) == Some("FLAKYUSDT") {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "code": -1000, "msg": "internal error" })),
                )
                    .into_response();
            }
            Json(json!([
                [0, "100.0", "100.5", "99.5", "100.0", "10.0"],
                [3_600_000, "101.0", "101.5", "100.5", "101.0", "10.0"],
                [7_200_000, "102.0", "102.5", "101.5", "102.0", "10.0"],
                [10_800_000, "101.0", "101.5", "100.5", "101.0", "10.0"],
                [14_400_000, "104.0", "105.0", "104.0", "105.0", "50.0"],
            ]))
            .into_response()
        }

        let app = Router::new().route("/fapi/v1/klines", get(klines));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    struct CountingObserver {
        completed: AtomicUsize,
        errors: AtomicUsize,
    }

    impl CountingObserver {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                completed: AtomicUsize::new(0),
                errors: AtomicUsize::new(0),
            })
        }
    }

    impl CycleObserver for CountingObserver {
        fn on_cycle_complete(&self, _report: &CycleReport) {
            self.completed.fetch_add(1, Ordering::SeqCst);
        }

        fn on_cycle_error(&self, _error: &anyhow::Error) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }
    }

    // ---- build_metrics ---------------------------------------------------

    #[test]
    fn build_metrics_needs_at_least_one_candle() {
        assert!(build_metrics(&[], true).is_none());
    }

    #[test]
    fn build_metrics_reads_the_latest_bar() {
        // Reference scenario: quiet mid-range bars, then a close-at-high
        // bar on 5x volume that also crosses the strong-buy threshold.
        let candles = vec![
            Candle::new(0, 100.0, 100.5, 99.5, 100.0, 10.0),
            Candle::new(3_600_000, 101.0, 101.5, 100.5, 101.0, 10.0),
            Candle::new(7_200_000, 102.0, 102.5, 101.5, 102.0, 10.0),
            Candle::new(10_800_000, 101.0, 101.5, 100.5, 101.0, 10.0),
            Candle::new(14_400_000, 104.0, 105.0, 104.0, 105.0, 50.0),
        ];

        let update = build_metrics(&candles, false).unwrap();
        assert!((update.last_price - 105.0).abs() < f64::EPSILON);
        assert_eq!(update.last_update_ms, 14_400_000);
        assert!((update.buy_pct - 81.25).abs() < 1e-10);
        assert!((update.sell_pct - 18.75).abs() < 1e-10);

        // The final bar crosses buy_pct 70 from 50, so it carries a signal.
        let signal = update.last_signal.unwrap();
        assert_eq!(signal.kind, SignalKind::Buy);
        assert_eq!(signal.time, 14_400_000);
        assert!((signal.strength - 3.75).abs() < 1e-10);
        assert!((signal.price - 104.0 * 0.996).abs() < 1e-10);
        assert_eq!(update.last_signal_bars_ago, Some(0));
    }

    #[test]
    fn build_metrics_without_crossing_has_no_signal() {
        let candles: Vec<Candle> = (0..6)
            .map(|i| {
                let c = 100.0 + 0.1 * i as f64;
                Candle::new(i as i64 * 3_600_000, c, c + 0.5, c - 0.5, c, 10.0)
            })
            .collect();

        let update = build_metrics(&candles, false).unwrap();
        assert!(update.last_signal.is_none());
        assert!(update.last_signal_bars_ago.is_none());
    }

    // ---- cycle guard -----------------------------------------------------

    #[tokio::test]
    async fn trigger_while_running_is_skipped() {
        let (state, engine) = test_engine();
        state.cycle_running.store(true, Ordering::SeqCst);

        let outcome = engine.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Skipped));
        // The foreign guard is left untouched.
        assert!(state.is_cycle_running());
    }

    #[tokio::test]
    async fn spawn_cycle_reports_skip_without_spawning() {
        let (state, engine) = test_engine();
        state.cycle_running.store(true, Ordering::SeqCst);
        assert!(!engine.spawn_cycle());
    }

    #[tokio::test]
    async fn empty_universe_notifies_error_and_returns_to_idle() {
        let (state, engine) = test_engine();
        let observer = CountingObserver::new();
        engine.add_observer(observer.clone());

        let outcome = engine.run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Failed));
        assert_eq!(observer.errors.load(Ordering::SeqCst), 1);
        assert_eq!(observer.completed.load(Ordering::SeqCst), 0);
        assert!(!state.is_cycle_running());
        assert!(state.last_report.read().is_none());
    }

    #[test]
    fn busy_flag_clears_even_when_a_cycle_unwinds() {
        let flag = AtomicBool::new(true);
        let result = std::panic::catch_unwind(|| {
            let _guard = CycleGuard(&flag);
            panic!("mid-cycle failure");
        });
        assert!(result.is_err());
        assert!(!flag.load(Ordering::SeqCst));
    }

    // ---- full cycle against a stub exchange ------------------------------

    #[tokio::test]
    async fn failed_symbol_keeps_stale_row_and_cycle_still_completes() {
        let base_url = spawn_stub_exchange().await;
        let (state, engine) = stub_engine(&base_url);
        state.board.seed(&[
            info("ALPHAUSDT", "ALPHA"),
            info("FLAKYUSDT", "FLAKY"),
            info("BETAUSDT", "BETA"),
        ]);

        // Give the flaky symbol a previous row so there is something to keep.
        state.board.apply_update(
            "FLAKYUSDT",
            MetricsUpdate {
                last_price: 9.0,
                positive_pct: 60.0,
                negative_pct: 40.0,
                buy_pct: 33.0,
                sell_pct: 67.0,
                last_update_ms: 1,
                last_signal: None,
                last_signal_bars_ago: None,
            },
        );

        let observer = CountingObserver::new();
        engine.add_observer(observer.clone());

        let report = match engine.run_cycle().await {
            CycleOutcome::Completed(report) => report,
            other => panic!("expected a completed cycle, got {other:?}"),
        };

        assert_eq!(report.total, 3);
        assert_eq!(report.updated, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(observer.completed.load(Ordering::SeqCst), 1);
        assert_eq!(observer.errors.load(Ordering::SeqCst), 0);
        assert!(!state.is_cycle_running());
        assert!(state.last_report.read().is_some());

        // Both healthy symbols were refreshed from the stub's candles.
        for symbol in ["ALPHAUSDT", "BETAUSDT"] {
            let row = state.board.get(symbol).unwrap();
            assert_eq!(row.last_price, Some(105.0));
            assert!((row.buy_pct.unwrap() - 81.25).abs() < 1e-10);
        }

        // The failing symbol kept its previous row untouched.
        let stale = state.board.get("FLAKYUSDT").unwrap();
        assert_eq!(stale.last_price, Some(9.0));
        assert_eq!(stale.buy_pct, Some(33.0));
        assert_eq!(stale.last_update_ms, Some(1));
    }
}
