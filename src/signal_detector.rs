// =============================================================================
// Strong-Signal Detector — threshold crossings on the pressure series
// =============================================================================
//
// A strong buy fires on the bar where buy_pct crosses ABOVE 70 (previous bar
// at or below 70) while buy pressure dominates sell pressure. Strong sells
// are symmetric on sell_pct. This is an edge trigger: staying above the
// threshold emits nothing until the series dips back to 70 or below and
// crosses again.
//
// Strength maps the headroom above the threshold onto [0, 10]:
//   strength = (pct - 70) / 30 * 10
// The anchor price is offset slightly beyond the bar extreme: 0.4% below the
// low for buys, 0.4% above the high for sells.
// =============================================================================

use serde::Serialize;

use crate::types::{Candle, SignalKind};
use crate::volume_profile::PressureSeries;

/// Pressure percentage a series must cross to count as a strong signal.
pub const STRONG_THRESHOLD: f64 = 70.0;

const BUY_ANCHOR_DISCOUNT: f64 = 0.996;
const SELL_ANCHOR_PREMIUM: f64 = 1.004;

/// One strong buy/sell signal anchored to a candle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Signal {
    /// Open time of the bar that triggered the crossing, epoch ms.
    pub time: i64,
    /// Suggested anchor price, offset slightly beyond the bar extreme.
    pub price: f64,
    /// Headroom above the threshold mapped onto [0, 10].
    pub strength: f64,
    pub kind: SignalKind,
}

/// Scan the series for threshold crossings.
///
/// `candles` and `series` must come from the same evaluation; extra length
/// on either side is ignored. Signals are emitted in ascending bar order,
/// so the last element is always the most recent.
pub fn detect_signals(candles: &[Candle], series: &PressureSeries) -> Vec<Signal> {
    let n = candles.len().min(series.len());
    let mut signals = Vec::new();

    for i in 1..n {
        let buy = series.buy_pct[i];
        let sell = series.sell_pct[i];

        if buy > STRONG_THRESHOLD && series.buy_pct[i - 1] <= STRONG_THRESHOLD && buy > sell {
            signals.push(Signal {
                time: candles[i].open_time,
                price: candles[i].low * BUY_ANCHOR_DISCOUNT,
                strength: signal_strength(buy),
                kind: SignalKind::Buy,
            });
        }

        if sell > STRONG_THRESHOLD && series.sell_pct[i - 1] <= STRONG_THRESHOLD && sell > buy {
            signals.push(Signal {
                time: candles[i].open_time,
                price: candles[i].high * SELL_ANCHOR_PREMIUM,
                strength: signal_strength(sell),
                kind: SignalKind::Sell,
            });
        }
    }

    signals
}

/// Most recent signal of either kind, if any.
pub fn latest_signal(signals: &[Signal]) -> Option<&Signal> {
    signals.last()
}

/// How many bars back `signal` fired, counted from the newest candle.
///
/// Returns `None` when the signal's time matches no candle (stale signal
/// against a refetched series).
pub fn bars_ago(candles: &[Candle], signal: &Signal) -> Option<usize> {
    candles
        .iter()
        .position(|c| c.open_time == signal.time)
        .map(|idx| candles.len() - 1 - idx)
}

fn signal_strength(pct: f64) -> f64 {
    (pct - STRONG_THRESHOLD) / 30.0 * 10.0
}
