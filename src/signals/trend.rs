//! Trend detection
//!
//! Confirms an established up/down trend from price structure, moving average
//! alignment, momentum, volume and stability, then requires an entry trigger:
//! a fresh short/mid average cross or a pullback that resumed.

use super::core::{Detection, Detector, DetectorKind, Direction, InstrumentView, SignalCategory, strictly_monotonic};
use crate::config::TrendConfig;
use crate::indicators::{capped_mean, sma, volatility_ratio, volume_averages};
use crate::stats::rolling_mean;

#[derive(Debug, Clone)]
pub struct TrendDetector {
    pub config: TrendConfig,
}

impl Default for TrendDetector {
    fn default() -> Self {
        Self::new(TrendConfig::default())
    }
}

impl TrendDetector {
    pub fn new(config: TrendConfig) -> Self {
        Self { config }
    }

    fn min_history(&self) -> usize {
        let c = &self.config;
        [
            c.lookback,
            c.ma_mid + 1,
            c.volume_window * 2,
            c.volatility_window,
            3,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    fn detect_direction(&self, view: &InstrumentView<'_>, direction: Direction) -> Option<Detection> {
        let c = &self.config;
        let history = view.history();
        let closes = history.closes();
        let len = closes.len();
        if len < self.min_history() {
            return None;
        }

        // Price structure: last N highs and lows strictly ordered
        let highs = &history.highs()[len - c.lookback..];
        let lows = &history.lows()[len - c.lookback..];
        if !strictly_monotonic(highs, direction) || !strictly_monotonic(lows, direction) {
            return None;
        }

        let short = sma(closes, c.ma_short)?;
        let mid = sma(closes, c.ma_mid)?;
        let long = capped_mean(closes, c.ma_long)?;
        if !(direction.beyond(short, mid) && direction.beyond(mid, long)) {
            return None;
        }

        let rsi = view.indicators.rsi()?;
        let rsi_ok = match direction {
            Direction::Up => rsi > c.rsi_up_threshold,
            Direction::Down => rsi < c.rsi_down_threshold,
        };
        if !rsi_ok {
            return None;
        }

        let histogram = view.indicators.histogram()?;
        if !direction.beyond(histogram, 0.0) {
            return None;
        }

        let (recent_volume, past_volume) = volume_averages(history.volumes(), c.volume_window)?;
        if !(recent_volume > past_volume) {
            return None;
        }

        let volatility = volatility_ratio(closes, c.volatility_window)?;
        if !(volatility < c.max_volatility) {
            return None;
        }

        let crossed = crossed_recently(closes, c.ma_short, c.ma_mid, direction, 2);
        let resumed = pullback_resumed(closes, c.pullback_lookback, direction);
        if !(crossed || resumed) {
            return None;
        }

        let category = match direction {
            Direction::Up => SignalCategory::Uptrend,
            Direction::Down => SignalCategory::Downtrend,
        };
        let ratio = if past_volume > 0.0 {
            recent_volume / past_volume
        } else {
            f64::INFINITY
        };
        Some(Detection::new(category).with_level(mid).with_volume_ratio(ratio))
    }
}

impl Detector for TrendDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Trend
    }

    fn detect(&self, view: &InstrumentView<'_>) -> Option<Detection> {
        self.detect_direction(view, Direction::Up)
            .or_else(|| self.detect_direction(view, Direction::Down))
    }
}

/// Short average crossed the mid average in `direction` within the last
/// `bars` bar transitions.
pub(crate) fn crossed_recently(
    closes: &[f64],
    short: usize,
    mid: usize,
    direction: Direction,
    bars: usize,
) -> bool {
    let short_ma = rolling_mean(closes, short);
    let mid_ma = rolling_mean(closes, mid);
    let len = closes.len();

    (0..bars).any(|k| {
        let Some(i) = len.checked_sub(1 + k) else {
            return false;
        };
        if i == 0 {
            return false;
        }
        match (short_ma[i - 1], mid_ma[i - 1], short_ma[i], mid_ma[i]) {
            (Some(s0), Some(m0), Some(s1), Some(m1)) => {
                !direction.beyond(s0, m0) && direction.beyond(s1, m1)
            }
            _ => false,
        }
    })
}

/// Within the last `lookback` bars a close moved against the trend and the
/// next close recovered past it.
pub(crate) fn pullback_resumed(closes: &[f64], lookback: usize, direction: Direction) -> bool {
    let len = closes.len();
    let start = len.saturating_sub(lookback).max(2);
    (start..len).any(|i| {
        let dipped = direction.beyond(closes[i - 2], closes[i - 1]);
        let resumed = direction.beyond(closes[i], closes[i - 1]);
        dipped && resumed
    })
}
