// =============================================================================
// Ranking Board — latest per-symbol metrics with a sortable view
// =============================================================================
//
// One row per tracked symbol. Rows are seeded with all computed fields unset
// and mutated in place after each successful fetch; a failed fetch simply
// leaves the previous values standing. Unset values sort AFTER any real
// value regardless of direction, so fresh rows sink to the bottom of the
// table instead of polluting the top ranks.
// =============================================================================

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::signal_detector::Signal;
use crate::types::SymbolInfo;

/// Market label attached to every row. The screener only scans USD-M
/// futures instruments.
const MARKET_LABEL: &str = "Futures";

// =============================================================================
// Row types
// =============================================================================

/// Latest known metrics for one symbol. Computed fields are `None` until
/// the first successful scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolMetrics {
    pub symbol: String,
    pub base_asset: String,
    pub quote_asset: String,
    pub market: String,
    pub last_price: Option<f64>,
    pub positive_pct: Option<f64>,
    pub negative_pct: Option<f64>,
    pub buy_pct: Option<f64>,
    pub sell_pct: Option<f64>,
    /// Open time of the newest candle seen, epoch ms.
    pub last_update_ms: Option<i64>,
    pub last_signal: Option<Signal>,
    pub last_signal_bars_ago: Option<usize>,
}

impl SymbolMetrics {
    fn seeded(info: &SymbolInfo) -> Self {
        Self {
            symbol: info.symbol.clone(),
            base_asset: info.base_asset.clone(),
            quote_asset: info.quote_asset.clone(),
            market: MARKET_LABEL.to_string(),
            last_price: None,
            positive_pct: None,
            negative_pct: None,
            buy_pct: None,
            sell_pct: None,
            last_update_ms: None,
            last_signal: None,
            last_signal_bars_ago: None,
        }
    }
}

/// Result of one successful symbol evaluation, applied onto the row.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsUpdate {
    pub last_price: f64,
    pub positive_pct: f64,
    pub negative_pct: f64,
    pub buy_pct: f64,
    pub sell_pct: f64,
    pub last_update_ms: i64,
    pub last_signal: Option<Signal>,
    pub last_signal_bars_ago: Option<usize>,
}

// =============================================================================
// Sort state
// =============================================================================

/// Column the table is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Symbol,
    LastPrice,
    PositivePct,
    NegativePct,
    BuyPct,
    SellPct,
    SignalStrength,
    BarsAgo,
}

impl SortField {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Symbol => "symbol",
            Self::LastPrice => "last_price",
            Self::PositivePct => "positive_pct",
            Self::NegativePct => "negative_pct",
            Self::BuyPct => "buy_pct",
            Self::SellPct => "sell_pct",
            Self::SignalStrength => "signal_strength",
            Self::BarsAgo => "bars_ago",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "symbol" => Some(Self::Symbol),
            "last_price" => Some(Self::LastPrice),
            "positive_pct" => Some(Self::PositivePct),
            "negative_pct" => Some(Self::NegativePct),
            "buy_pct" => Some(Self::BuyPct),
            "sell_pct" => Some(Self::SellPct),
            "signal_strength" => Some(Self::SignalStrength),
            "bars_ago" => Some(Self::BarsAgo),
            _ => None,
        }
    }
}

impl std::fmt::Display for SortField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    fn flip(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }

    fn apply(self, ord: Ordering) -> Ordering {
        match self {
            Self::Asc => ord,
            Self::Desc => ord.reverse(),
        }
    }
}

/// Current table ordering. Toggling the active column flips the direction;
/// switching columns resets to descending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortState {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortState {
    fn default() -> Self {
        Self {
            field: SortField::BuyPct,
            direction: SortDirection::Desc,
        }
    }
}

impl SortState {
    fn toggle(&mut self, field: SortField) {
        if self.field == field {
            self.direction = self.direction.flip();
        } else {
            self.field = field;
            self.direction = SortDirection::Desc;
        }
    }
}

// =============================================================================
// Board
// =============================================================================

/// Thread-safe store of every tracked symbol's metrics plus the sticky
/// sort state.
pub struct RankingBoard {
    rows: RwLock<Vec<SymbolMetrics>>,
    sort: RwLock<SortState>,
}

impl RankingBoard {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            sort: RwLock::new(SortState::default()),
        }
    }

    /// Replace the tracked universe. Every row starts with computed fields
    /// unset; the first scan cycle fills them in.
    pub fn seed(&self, universe: &[SymbolInfo]) {
        let mut rows = self.rows.write();
        *rows = universe.iter().map(SymbolMetrics::seeded).collect();
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Symbols in seeding (popularity) order, for cycle iteration.
    pub fn symbols(&self) -> Vec<String> {
        self.rows.read().iter().map(|r| r.symbol.clone()).collect()
    }

    pub fn get(&self, symbol: &str) -> Option<SymbolMetrics> {
        self.rows.read().iter().find(|r| r.symbol == symbol).cloned()
    }

    /// Overwrite one row's computed fields. Returns false when the symbol
    /// is not part of the tracked universe.
    pub fn apply_update(&self, symbol: &str, update: MetricsUpdate) -> bool {
        let mut rows = self.rows.write();
        let Some(row) = rows.iter_mut().find(|r| r.symbol == symbol) else {
            return false;
        };

        row.last_price = Some(update.last_price);
        row.positive_pct = Some(update.positive_pct);
        row.negative_pct = Some(update.negative_pct);
        row.buy_pct = Some(update.buy_pct);
        row.sell_pct = Some(update.sell_pct);
        row.last_update_ms = Some(update.last_update_ms);
        row.last_signal = update.last_signal;
        row.last_signal_bars_ago = update.last_signal_bars_ago;
        true
    }

    pub fn sort_state(&self) -> SortState {
        *self.sort.read()
    }

    /// Column-header click semantics; returns the new state.
    pub fn toggle_sort(&self, field: SortField) -> SortState {
        let mut sort = self.sort.write();
        sort.toggle(field);
        *sort
    }

    /// Rows ordered by an explicit field/direction, without touching the
    /// stored sort state.
    pub fn sorted_rows(&self, field: SortField, direction: SortDirection) -> Vec<SymbolMetrics> {
        let mut rows = self.rows.read().clone();
        rows.sort_by(|a, b| compare_rows(a, b, field, direction));
        rows
    }

    /// Rows ordered by the stored sort state.
    pub fn sorted_rows_current(&self) -> (Vec<SymbolMetrics>, SortState) {
        let state = self.sort_state();
        (self.sorted_rows(state.field, state.direction), state)
    }
}

impl Default for RankingBoard {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Comparators
// =============================================================================

fn compare_rows(
    a: &SymbolMetrics,
    b: &SymbolMetrics,
    field: SortField,
    direction: SortDirection,
) -> Ordering {
    if field == SortField::Symbol {
        let ord = a.symbol.to_lowercase().cmp(&b.symbol.to_lowercase());
        return direction.apply(ord);
    }
    compare_optional(numeric_key(a, field), numeric_key(b, field), direction)
}

fn numeric_key(row: &SymbolMetrics, field: SortField) -> Option<f64> {
    match field {
        SortField::Symbol => None,
        SortField::LastPrice => row.last_price,
        SortField::PositivePct => row.positive_pct,
        SortField::NegativePct => row.negative_pct,
        SortField::BuyPct => row.buy_pct,
        SortField::SellPct => row.sell_pct,
        SortField::SignalStrength => row.last_signal.as_ref().map(|s| s.strength),
        SortField::BarsAgo => row.last_signal_bars_ago.map(|v| v as f64),
    }
}

/// Missing values order after present ones in BOTH directions; only the
/// comparison between two present values honours the direction.
fn compare_optional(a: Option<f64>, b: Option<f64>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => direction.apply(x.partial_cmp(&y).unwrap_or(Ordering::Equal)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
