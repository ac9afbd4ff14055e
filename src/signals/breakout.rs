//! Breakout detection
//!
//! The current price clears the extreme of the prior lookback window (the
//! latest bar is excluded) on expanding volume.

use super::core::{Detection, Detector, DetectorKind, InstrumentView, SignalCategory};
use crate::config::BreakoutConfig;
use crate::indicators::volatility_pair;
use crate::stats::trailing_mean;

#[derive(Debug, Clone)]
pub struct BreakoutDetector {
    pub config: BreakoutConfig,
}

impl Default for BreakoutDetector {
    fn default() -> Self {
        Self::new(BreakoutConfig::default())
    }
}

impl BreakoutDetector {
    pub fn new(config: BreakoutConfig) -> Self {
        Self { config }
    }

    fn volatility_expanding(&self, closes: &[f64]) -> bool {
        let c = &self.config;
        match volatility_pair(closes, c.volatility_window) {
            Some((current, past)) => current > past * c.volatility_ratio,
            None => false,
        }
    }
}

impl Detector for BreakoutDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Breakout
    }

    fn detect(&self, view: &InstrumentView<'_>) -> Option<Detection> {
        let c = &self.config;
        let history = view.history();
        let len = history.len();
        if c.lookback == 0 || len < c.lookback + 1 {
            return None;
        }

        let prior = len - 1 - c.lookback..len - 1;
        let highs = &history.highs()[prior.clone()];
        let lows = &history.lows()[prior.clone()];
        if highs.iter().chain(lows).any(|v| !v.is_finite()) {
            return None;
        }
        let window_high = highs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let window_low = lows.iter().copied().fold(f64::INFINITY, f64::min);

        let price = view.current_price();
        if !price.is_finite() {
            return None;
        }
        let (category, level) = if price > window_high {
            (SignalCategory::BreakoutLong, window_high)
        } else if price < window_low {
            (SignalCategory::BreakoutShort, window_low)
        } else {
            return None;
        };

        let volumes = history.volumes();
        let average_volume = trailing_mean(&volumes[prior], c.lookback)?;
        let current_volume = *volumes.last()?;
        if !(current_volume > average_volume * c.volume_ratio) {
            return None;
        }

        if c.use_volatility_filter && !self.volatility_expanding(history.closes()) {
            return None;
        }

        let mut detection = Detection::new(category).with_level(level);
        if average_volume > 0.0 {
            detection = detection.with_volume_ratio(current_volume / average_volume);
        }
        Some(detection)
    }
}
