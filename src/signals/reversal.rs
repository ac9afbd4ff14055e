//! Double top / double bottom detection
//!
//! Two comparable pivots inside the lookback window, separated by an interior
//! extreme (the neckline) that the current price has just broken through.

use super::core::{Detection, Detector, DetectorKind, Direction, InstrumentView, SignalCategory};
use crate::config::DoublePatternConfig;
use crate::stats::{rolling_std, trailing_mean};

/// A local extreme at `index` (position in the full history).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pivot {
    pub index: usize,
    pub price: f64,
}

/// Strict local extremes of `values[start..]`. Both neighbours must lie in the
/// same range, so the first and last points are never pivots.
pub fn find_pivots(values: &[f64], start: usize, direction: Direction) -> Vec<Pivot> {
    if values.len() < start + 3 {
        return Vec::new();
    }
    (start + 1..values.len() - 1)
        .filter(|&i| {
            direction.beyond(values[i], values[i - 1]) && direction.beyond(values[i], values[i + 1])
        })
        .map(|i| Pivot {
            index: i,
            price: values[i],
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct DoublePatternDetector {
    pub config: DoublePatternConfig,
}

impl Default for DoublePatternDetector {
    fn default() -> Self {
        Self::new(DoublePatternConfig::default())
    }
}

impl DoublePatternDetector {
    pub fn new(config: DoublePatternConfig) -> Self {
        Self { config }
    }

    /// `Direction::Up` looks for a double top (peaks in highs, breakdown),
    /// `Direction::Down` for a double bottom (valleys in lows, breakout).
    fn detect_pattern(&self, view: &InstrumentView<'_>, pivot_side: Direction) -> Option<Detection> {
        let c = &self.config;
        let history = view.history();
        let len = history.len();
        if c.lookback < 3 || len < c.lookback {
            return None;
        }
        let start = len - c.lookback;

        let (pivot_values, neckline_values) = match pivot_side {
            Direction::Up => (history.highs(), history.lows()),
            Direction::Down => (history.lows(), history.highs()),
        };
        if pivot_values[start..]
            .iter()
            .chain(&neckline_values[start..])
            .any(|v| !v.is_finite())
        {
            return None;
        }

        let pivots = find_pivots(pivot_values, start, pivot_side);
        let [first, second] = pivots.get(pivots.len().checked_sub(2)?..)? else {
            return None;
        };

        let mean = (first.price + second.price) / 2.0;
        if mean <= 0.0 || (first.price - second.price).abs() / mean > c.tolerance {
            return None;
        }

        // Interior extreme on the opposite side between the two pivots
        let between = &neckline_values[first.index + 1..second.index];
        let neckline = match pivot_side {
            Direction::Up => between.iter().copied().fold(f64::INFINITY, f64::min),
            Direction::Down => between.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        };
        if !neckline.is_finite() {
            return None;
        }

        let price = view.current_price();
        let broken = match pivot_side {
            Direction::Up => price < neckline,
            Direction::Down => price > neckline,
        };
        if !broken {
            return None;
        }

        let volumes = history.volumes();
        let average_volume = trailing_mean(volumes, c.lookback)?;
        let threshold = average_volume * c.volume_ratio;
        if !(volumes[first.index] > threshold && volumes[second.index] > threshold) {
            return None;
        }

        if c.use_volatility_filter && !self.volatility_expanding(history.closes()) {
            return None;
        }

        let category = match pivot_side {
            Direction::Up => SignalCategory::DoubleTop,
            Direction::Down => SignalCategory::DoubleBottom,
        };
        let mut detection = Detection::new(category).with_level(neckline);
        if average_volume > 0.0 {
            let pivot_volume = volumes[first.index].min(volumes[second.index]);
            detection = detection.with_volume_ratio(pivot_volume / average_volume);
        }
        Some(detection)
    }

    /// Latest rolling std above the window's average rolling std by the
    /// configured ratio.
    fn volatility_expanding(&self, closes: &[f64]) -> bool {
        let c = &self.config;
        let stds = rolling_std(closes, c.volatility_window);
        let recent: Vec<f64> = stds[closes.len().saturating_sub(c.lookback)..]
            .iter()
            .flatten()
            .copied()
            .collect();
        let (Some(&current), Some(average)) = (recent.last(), trailing_mean(&recent, recent.len()))
        else {
            return false;
        };
        current > average * c.volatility_ratio
    }
}

impl Detector for DoublePatternDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::DoublePattern
    }

    fn detect(&self, view: &InstrumentView<'_>) -> Option<Detection> {
        self.detect_pattern(view, Direction::Up)
            .or_else(|| self.detect_pattern(view, Direction::Down))
    }
}
