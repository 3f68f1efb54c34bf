// =============================================================================
// Central Screener State
// =============================================================================
//
// The single source of truth for the screener process. Background tasks and
// API handlers share it via `Arc<ScreenerState>`.
//
// Thread safety:
//   - An atomic flag guards against overlapping scan cycles.
//   - parking_lot::RwLock for all mutable shared values.
//   - RankingBoard manages its own interior mutability.
// =============================================================================

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::config::ScreenerConfig;
use crate::ranking::RankingBoard;
use crate::scanner::CycleReport;

/// Shared screener state. Wrapped in `Arc` immediately after construction.
pub struct ScreenerState {
    // ── Configuration ───────────────────────────────────────────────────
    pub config: RwLock<ScreenerConfig>,

    // ── Metrics table ───────────────────────────────────────────────────
    pub board: RankingBoard,

    // ── Cycle coordination ──────────────────────────────────────────────
    /// True while a scan cycle is in flight. Refresh requests arriving in
    /// that window are discarded, never queued.
    pub cycle_running: AtomicBool,
    pub last_report: RwLock<Option<CycleReport>>,

    // ── Timing ──────────────────────────────────────────────────────────
    pub start_time: std::time::Instant,
}

impl ScreenerState {
    pub fn new(config: ScreenerConfig) -> Self {
        Self {
            config: RwLock::new(config),
            board: RankingBoard::new(),
            cycle_running: AtomicBool::new(false),
            last_report: RwLock::new(None),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn is_cycle_running(&self) -> bool {
        self.cycle_running.load(Ordering::SeqCst)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Cheap clone of the current configuration for use across awaits
    /// without holding the lock.
    pub fn config_snapshot(&self) -> ScreenerConfig {
        self.config.read().clone()
    }
}
