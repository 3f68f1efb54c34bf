// =============================================================================
// Volume Profile — cumulative buy/sell pressure with spike smoothing
// =============================================================================
//
// Splits each bar's volume into a buy and a sell share by where the close
// sits inside the bar's range, then tracks the cumulative shares as
// percentages.
//
// Step 1 — Accumulate directional price movement:
//            cum_positive += max(close[i] - close[i-1], 0)
//            cum_negative += max(close[i-1] - close[i], 0)
// Step 2 — Split bar volume by close position inside the range:
//            buy_volume  = (close - low)  / range * volume
//            sell_volume = (high - close) / range * volume
// Step 3 — Express the running totals as percentages of their pair sum,
//          clamped to [0, 100]. Index 0 has no predecessor and is fixed
//          at the neutral 50.
// Step 4 — (optional) Spike smoothing: bars with outsized 5-bar momentum
//          or volume become events that redistribute pressure onto their
//          neighbours with linear falloff.
//
// After smoothing, buy_pct + sell_pct no longer has to sum to 100; every
// value is still clamped to [0, 100] independently.
// =============================================================================

use serde::Serialize;

use crate::types::{Candle, SignalKind};

/// Floor for range and cumulative-sum denominators so flat bars and the
/// first accumulation steps never divide by zero.
const EPSILON: f64 = 1e-4;

/// The four percentage series, index-aligned with the candle sequence.
///
/// `positive_pct`/`negative_pct` track directional price movement,
/// `buy_pct`/`sell_pct` track the volume split. All values in [0, 100].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PressureSeries {
    pub positive_pct: Vec<f64>,
    pub negative_pct: Vec<f64>,
    pub buy_pct: Vec<f64>,
    pub sell_pct: Vec<f64>,
}

impl PressureSeries {
    /// All four series at the neutral 50, `len` entries each.
    fn neutral(len: usize) -> Self {
        Self {
            positive_pct: vec![50.0; len],
            negative_pct: vec![50.0; len],
            buy_pct: vec![50.0; len],
            sell_pct: vec![50.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.buy_pct.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buy_pct.is_empty()
    }

    /// Most recent `(positive, negative, buy, sell)` values, if any.
    pub fn last_values(&self) -> Option<(f64, f64, f64, f64)> {
        Some((
            *self.positive_pct.last()?,
            *self.negative_pct.last()?,
            *self.buy_pct.last()?,
            *self.sell_pct.last()?,
        ))
    }
}

/// A bar flagged as a momentum/volume spike during the smoothing pass.
#[derive(Debug, Clone, Copy, PartialEq)]
struct SpikeEvent {
    index: usize,
    direction: SignalKind,
    magnitude: f64,
}

/// Compute the full pressure profile for `candles`.
///
/// Pure: identical input always produces identical output. The returned
/// series have exactly `candles.len()` entries each.
///
/// # Edge cases
/// - Empty input => empty series.
/// - A single candle => all series are `[50.0]` (no predecessor to compare).
/// - Fewer than 6 candles => the smoothing pass finds no spikes (it needs a
///   5-bar lookback), so `smoothing` has no effect.
pub fn calculate_volume_profile(candles: &[Candle], smoothing: bool) -> PressureSeries {
    let n = candles.len();
    if n < 2 {
        return PressureSeries::neutral(n);
    }

    let mut series = base_series(candles);

    if smoothing {
        apply_spikes(candles, &mut series);
    }

    series
}

// =============================================================================
// Base accumulation
// =============================================================================

fn base_series(candles: &[Candle]) -> PressureSeries {
    let n = candles.len();
    let mut series = PressureSeries::neutral(n);

    let mut cum_positive = 0.0_f64;
    let mut cum_negative = 0.0_f64;
    let mut cum_buy = 0.0_f64;
    let mut cum_sell = 0.0_f64;

    for i in 1..n {
        let price_change = candles[i].close - candles[i - 1].close;
        cum_positive += price_change.max(0.0);
        cum_negative += (-price_change).max(0.0);

        let range = (candles[i].high - candles[i].low).max(EPSILON);
        cum_buy += (candles[i].close - candles[i].low) / range * candles[i].volume;
        cum_sell += (candles[i].high - candles[i].close) / range * candles[i].volume;

        let total_move = (cum_positive + cum_negative).max(EPSILON);
        let total_volume = (cum_buy + cum_sell).max(EPSILON);

        series.positive_pct[i] = clamp_pct(100.0 * cum_positive / total_move);
        series.negative_pct[i] = clamp_pct(100.0 * cum_negative / total_move);
        series.buy_pct[i] = clamp_pct(100.0 * cum_buy / total_volume);
        series.sell_pct[i] = clamp_pct(100.0 * cum_sell / total_volume);
    }

    series
}

// =============================================================================
// Spike smoothing
// =============================================================================

/// Flag bars whose 5-bar price change and volume stand out from the series.
///
/// A bar is a spike when its 5-bar move exceeds 2% on above-average volume
/// (ratio > 1.5), or its volume alone exceeds twice the average. Direction
/// follows the sign of the 5-bar move. A zero average volume produces a NaN
/// ratio whose comparisons are all false, so dead series yield no spikes.
fn detect_spikes(candles: &[Candle]) -> Vec<SpikeEvent> {
    let n = candles.len();
    let avg_volume = candles.iter().map(|c| c.volume).sum::<f64>() / n as f64;

    let mut spikes = Vec::new();
    for i in 5..n {
        let lookback_close = candles[i - 5].close;
        let recent_change = (candles[i].close - lookback_close).abs() / lookback_close;
        let volume_ratio = candles[i].volume / avg_volume;

        let is_spike =
            (recent_change > 0.02 && volume_ratio > 1.5) || volume_ratio > 2.0;
        if !is_spike {
            continue;
        }

        let direction = if candles[i].close > lookback_close {
            SignalKind::Buy
        } else {
            SignalKind::Sell
        };

        spikes.push(SpikeEvent {
            index: i,
            direction,
            magnitude: (1.0 + recent_change * 2.0).min(3.0),
        });
    }

    spikes
}

/// Redistribute pressure around each spike with linear falloff.
///
/// The influence radius grows with magnitude (floor(m * 6), clamped to
/// [5, 15] bars). The spiking side gains twice what the opposite side
/// loses; every adjusted value is re-clamped immediately.
fn apply_spikes(candles: &[Candle], series: &mut PressureSeries) {
    let n = candles.len() as i64;

    for spike in detect_spikes(candles) {
        let influence = ((spike.magnitude * 6.0).floor() as i64).clamp(5, 15);
        let center = spike.index as i64;

        let lo = (center - influence).max(0);
        let hi = (center + influence).min(n - 1);

        for j in lo..=hi {
            let distance = (j - center).abs() as f64 / influence as f64;
            let effect = (1.0 - distance) * spike.magnitude;
            let idx = j as usize;

            match spike.direction {
                SignalKind::Buy => {
                    series.buy_pct[idx] = clamp_pct(series.buy_pct[idx] + effect * 6.0);
                    series.positive_pct[idx] = clamp_pct(series.positive_pct[idx] + effect * 6.0);
                    series.sell_pct[idx] = clamp_pct(series.sell_pct[idx] - effect * 3.0);
                    series.negative_pct[idx] = clamp_pct(series.negative_pct[idx] - effect * 3.0);
                }
                SignalKind::Sell => {
                    series.sell_pct[idx] = clamp_pct(series.sell_pct[idx] + effect * 6.0);
                    series.negative_pct[idx] = clamp_pct(series.negative_pct[idx] + effect * 6.0);
                    series.buy_pct[idx] = clamp_pct(series.buy_pct[idx] - effect * 3.0);
                    series.positive_pct[idx] = clamp_pct(series.positive_pct[idx] - effect * 3.0);
                }
            }
        }
    }
}

fn clamp_pct(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    /// Bar with the close centered in a 1.0-wide range.
    fn mid_bar(i: usize, close: f64, volume: f64) -> Candle {
        Candle::new(
            i as i64 * 3_600_000,
            close,
            close + 0.5,
            close - 0.5,
            close,
            volume,
        )
    }

    fn mid_bars(rows: &[(f64, f64)]) -> Vec<Candle> {
        rows.iter()
            .enumerate()
            .map(|(i, &(close, volume))| mid_bar(i, close, volume))
            .collect()
    }

    fn assert_in_bounds(series: &PressureSeries) {
        for v in series
            .positive_pct
            .iter()
            .chain(&series.negative_pct)
            .chain(&series.buy_pct)
            .chain(&series.sell_pct)
        {
            assert!((0.0..=100.0).contains(v), "value {v} out of [0, 100]");
            assert!(v.is_finite(), "non-finite value {v}");
        }
    }

    // ---- degenerate inputs -----------------------------------------------

    #[test]
    fn empty_input_yields_empty_series() {
        let series = calculate_volume_profile(&[], true);
        assert!(series.is_empty());
        assert_eq!(series.len(), 0);
        assert!(series.last_values().is_none());
    }

    #[test]
    fn single_candle_is_all_neutral() {
        let series = calculate_volume_profile(&[mid_bar(0, 100.0, 10.0)], false);
        assert_eq!(series.positive_pct, vec![50.0]);
        assert_eq!(series.negative_pct, vec![50.0]);
        assert_eq!(series.buy_pct, vec![50.0]);
        assert_eq!(series.sell_pct, vec![50.0]);
    }

    #[test]
    fn index_zero_is_always_neutral() {
        let candles = mid_bars(&[(100.0, 10.0), (104.0, 30.0), (99.0, 20.0)]);
        let series = calculate_volume_profile(&candles, false);
        assert_eq!(series.positive_pct[0], 50.0);
        assert_eq!(series.negative_pct[0], 50.0);
        assert_eq!(series.buy_pct[0], 50.0);
        assert_eq!(series.sell_pct[0], 50.0);
    }

    #[test]
    fn series_length_matches_candle_count() {
        for n in [0, 1, 2, 7, 30] {
            let candles: Vec<Candle> =
                (0..n).map(|i| mid_bar(i, 100.0 + i as f64, 10.0)).collect();
            let series = calculate_volume_profile(&candles, true);
            assert_eq!(series.positive_pct.len(), n);
            assert_eq!(series.negative_pct.len(), n);
            assert_eq!(series.buy_pct.len(), n);
            assert_eq!(series.sell_pct.len(), n);
        }
    }

    // ---- base accumulation -----------------------------------------------

    #[test]
    fn strictly_rising_closes_max_out_positive_pct() {
        let candles: Vec<Candle> =
            (0..10).map(|i| mid_bar(i, 100.0 + i as f64, 10.0)).collect();
        let series = calculate_volume_profile(&candles, false);
        for i in 1..candles.len() {
            assert!(
                (series.positive_pct[i] - 100.0).abs() < 1e-10,
                "positive_pct[{i}] = {}",
                series.positive_pct[i]
            );
            assert!(series.negative_pct[i].abs() < 1e-10);
        }
    }

    #[test]
    fn strictly_falling_closes_max_out_negative_pct() {
        let candles: Vec<Candle> =
            (0..10).map(|i| mid_bar(i, 200.0 - i as f64, 10.0)).collect();
        let series = calculate_volume_profile(&candles, false);
        for i in 1..candles.len() {
            assert!((series.negative_pct[i] - 100.0).abs() < 1e-10);
            assert!(series.positive_pct[i].abs() < 1e-10);
        }
    }

    #[test]
    fn close_at_high_assigns_all_volume_to_buys() {
        // Both bars close at their high: every unit of volume is buy-side.
        let candles = vec![
            Candle::new(0, 100.0, 100.0, 99.0, 100.0, 10.0),
            Candle::new(1, 100.0, 101.0, 100.0, 101.0, 10.0),
        ];
        let series = calculate_volume_profile(&candles, false);
        assert!((series.buy_pct[1] - 100.0).abs() < 1e-10);
        assert!(series.sell_pct[1].abs() < 1e-10);
    }

    #[test]
    fn flat_bar_range_is_floored_not_divided_by_zero() {
        // high == low: the range floor keeps the split finite.
        let candles = vec![
            Candle::new(0, 100.0, 100.0, 100.0, 100.0, 10.0),
            Candle::new(1, 100.0, 100.0, 100.0, 100.0, 10.0),
        ];
        let series = calculate_volume_profile(&candles, false);
        assert_in_bounds(&series);
    }

    #[test]
    fn zero_volume_series_stays_finite() {
        let candles = mid_bars(&[
            (100.0, 0.0),
            (101.0, 0.0),
            (102.0, 0.0),
            (101.0, 0.0),
            (103.0, 0.0),
            (104.0, 0.0),
            (105.0, 0.0),
        ]);
        let base = calculate_volume_profile(&candles, false);
        let smoothed = calculate_volume_profile(&candles, true);
        assert_in_bounds(&base);
        // Zero average volume => NaN volume ratios => no spikes detected.
        assert_eq!(base, smoothed);
    }

    #[test]
    fn repeated_runs_are_identical() {
        let candles = mid_bars(&[
            (100.0, 10.0),
            (101.5, 25.0),
            (100.8, 12.0),
            (102.0, 40.0),
            (101.2, 18.0),
            (103.5, 55.0),
            (104.0, 22.0),
        ]);
        let a = calculate_volume_profile(&candles, true);
        let b = calculate_volume_profile(&candles, true);
        assert_eq!(a, b);
    }

    // ---- spike detection -------------------------------------------------

    #[test]
    fn momentum_with_elevated_volume_flags_a_buy_spike() {
        // Bar 6 moves ~5.8% over 5 bars on well above average volume.
        let candles = mid_bars(&[
            (100.0, 10.0),
            (100.2, 10.0),
            (100.1, 10.0),
            (100.3, 10.0),
            (100.2, 10.0),
            (100.4, 10.0),
            (106.0, 60.0),
            (106.5, 12.0),
        ]);
        let spikes = detect_spikes(&candles);
        assert_eq!(spikes.len(), 1);
        assert_eq!(spikes[0].index, 6);
        assert_eq!(spikes[0].direction, SignalKind::Buy);
        assert!(spikes[0].magnitude > 1.0 && spikes[0].magnitude <= 3.0);
    }

    #[test]
    fn volume_alone_flags_a_spike_when_doubled() {
        // Flat closes (no momentum), one bar with > 2x average volume.
        let candles = mid_bars(&[
            (100.0, 10.0),
            (100.0, 10.0),
            (100.0, 10.0),
            (100.0, 10.0),
            (100.0, 10.0),
            (100.0, 10.0),
            (100.0, 50.0),
            (100.0, 10.0),
        ]);
        let spikes = detect_spikes(&candles);
        assert_eq!(spikes.len(), 1);
        assert_eq!(spikes[0].index, 6);
        // No upward 5-bar move, so the direction falls to the sell side.
        assert_eq!(spikes[0].direction, SignalKind::Sell);
        assert!((spikes[0].magnitude - 1.0).abs() < 1e-10);
    }

    #[test]
    fn quiet_series_has_no_spikes() {
        let candles = mid_bars(&[
            (100.0, 10.0),
            (100.1, 11.0),
            (100.0, 9.0),
            (100.2, 10.0),
            (100.1, 10.0),
            (100.2, 11.0),
            (100.1, 10.0),
        ]);
        assert!(detect_spikes(&candles).is_empty());
    }

    #[test]
    fn magnitude_is_capped_at_three() {
        // A doubling in price over 5 bars would imply magnitude 3.0+.
        let candles = mid_bars(&[
            (100.0, 10.0),
            (100.0, 10.0),
            (100.0, 10.0),
            (100.0, 10.0),
            (100.0, 10.0),
            (100.0, 10.0),
            (220.0, 80.0),
        ]);
        let spikes = detect_spikes(&candles);
        assert_eq!(spikes.len(), 1);
        assert!((spikes[0].magnitude - 3.0).abs() < 1e-10);
    }

    // ---- smoothing -------------------------------------------------------

    #[test]
    fn buy_spike_lifts_buy_pressure_around_the_event() {
        let candles = mid_bars(&[
            (100.0, 10.0),
            (100.2, 10.0),
            (100.1, 10.0),
            (100.3, 10.0),
            (100.2, 10.0),
            (100.4, 10.0),
            (106.0, 60.0),
            (106.5, 12.0),
        ]);
        let base = calculate_volume_profile(&candles, false);
        let smoothed = calculate_volume_profile(&candles, true);

        assert!(smoothed.buy_pct[6] > base.buy_pct[6]);
        assert!(smoothed.positive_pct[6] > base.positive_pct[6]);
        assert!(smoothed.sell_pct[6] < base.sell_pct[6]);
        // Neighbours inside the influence radius move too, with falloff.
        assert!(smoothed.buy_pct[5] > base.buy_pct[5]);
        assert!(smoothed.buy_pct[6] - base.buy_pct[6] > smoothed.buy_pct[5] - base.buy_pct[5]);
        assert_in_bounds(&smoothed);
    }

    #[test]
    fn smoothing_never_escapes_percentage_bounds() {
        // Aggressive repeated spikes; clamping must hold everywhere.
        let mut rows = Vec::new();
        for i in 0..30 {
            let close = 100.0 * (1.0 + 0.04 * i as f64);
            let volume = if i % 3 == 0 { 90.0 } else { 10.0 };
            rows.push((close, volume));
        }
        let candles = mid_bars(&rows);
        let smoothed = calculate_volume_profile(&candles, true);
        assert_in_bounds(&smoothed);
    }

    #[test]
    fn short_series_smoothing_is_a_no_op() {
        // 5 bars: the 5-bar lookback leaves no index eligible for spikes.
        let candles = mid_bars(&[
            (100.0, 10.0),
            (101.0, 10.0),
            (102.0, 10.0),
            (101.0, 10.0),
            (105.0, 50.0),
        ]);
        let base = calculate_volume_profile(&candles, false);
        let smoothed = calculate_volume_profile(&candles, true);
        assert_eq!(base, smoothed);
    }

    // ---- reference scenario ----------------------------------------------

    #[test]
    fn late_upmove_on_heavy_volume_raises_buy_pct() {
        // Four quiet mid-range bars, then a strong close-at-high bar on
        // 5x volume. The late bar must dominate the cumulative split.
        let mut candles = mid_bars(&[
            (100.0, 10.0),
            (101.0, 10.0),
            (102.0, 10.0),
            (101.0, 10.0),
            (105.0, 50.0),
        ]);
        // Final bar closes at its high.
        candles[4] = Candle::new(4 * 3_600_000, 104.0, 105.0, 104.0, 105.0, 50.0);

        let base = calculate_volume_profile(&candles, false);
        assert!(base.buy_pct[4] > base.buy_pct[1]);
        assert!((base.buy_pct[4] - 81.25).abs() < 1e-10);
        assert!((base.sell_pct[4] - 18.75).abs() < 1e-10);

        let smoothed = calculate_volume_profile(&candles, true);
        assert!(smoothed.buy_pct[4] >= base.buy_pct[4]);
        assert_in_bounds(&smoothed);
    }
}
