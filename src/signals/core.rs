//! Core signal types and the detector interface
//!
//! Every detector consumes an [`InstrumentView`] and either declines or returns
//! a [`Detection`]. The coordinator turns detections into immutable
//! [`SignalRecord`]s for one cycle.

use crate::indicators::Macd;
use crate::market_data::{InstrumentSeries, PriceHistory, QuoteSnapshot};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete label assigned to an instrument for one cycle. Declaration order
/// is the report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SignalCategory {
    Uptrend,
    GoldenCross,
    BreakoutLong,
    DoubleBottom,
    BoxBuy,
    SpikeContinuationBuy,
    SpikeReversalBuy,
    TrendFollowBuy,
    ContrarianBuy,
    ScoredBuy,
    Downtrend,
    DeadCross,
    BreakoutShort,
    DoubleTop,
    BoxSell,
    SpikeContinuationSell,
    SpikeReversalSell,
    TrendFollowSell,
    ContrarianSell,
    ScoredSell,
}

impl SignalCategory {
    pub const ALL: [SignalCategory; 20] = [
        SignalCategory::Uptrend,
        SignalCategory::GoldenCross,
        SignalCategory::BreakoutLong,
        SignalCategory::DoubleBottom,
        SignalCategory::BoxBuy,
        SignalCategory::SpikeContinuationBuy,
        SignalCategory::SpikeReversalBuy,
        SignalCategory::TrendFollowBuy,
        SignalCategory::ContrarianBuy,
        SignalCategory::ScoredBuy,
        SignalCategory::Downtrend,
        SignalCategory::DeadCross,
        SignalCategory::BreakoutShort,
        SignalCategory::DoubleTop,
        SignalCategory::BoxSell,
        SignalCategory::SpikeContinuationSell,
        SignalCategory::SpikeReversalSell,
        SignalCategory::TrendFollowSell,
        SignalCategory::ContrarianSell,
        SignalCategory::ScoredSell,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SignalCategory::Uptrend => "Uptrend",
            SignalCategory::GoldenCross => "Golden cross",
            SignalCategory::BreakoutLong => "Breakout (long)",
            SignalCategory::DoubleBottom => "Double bottom",
            SignalCategory::BoxBuy => "Box range buy",
            SignalCategory::SpikeContinuationBuy => "Volume spike continuation (buy)",
            SignalCategory::SpikeReversalBuy => "Volume spike reversal (buy)",
            SignalCategory::TrendFollowBuy => "Trend-following buy",
            SignalCategory::ContrarianBuy => "Contrarian buy",
            SignalCategory::ScoredBuy => "Scored buy",
            SignalCategory::Downtrend => "Downtrend",
            SignalCategory::DeadCross => "Dead cross",
            SignalCategory::BreakoutShort => "Breakout (short)",
            SignalCategory::DoubleTop => "Double top",
            SignalCategory::BoxSell => "Box range sell",
            SignalCategory::SpikeContinuationSell => "Volume spike continuation (sell)",
            SignalCategory::SpikeReversalSell => "Volume spike reversal (sell)",
            SignalCategory::TrendFollowSell => "Trend-following sell",
            SignalCategory::ContrarianSell => "Contrarian sell",
            SignalCategory::ScoredSell => "Scored sell",
        }
    }
}

impl fmt::Display for SignalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// `a` beats `b` in this direction.
    pub fn beyond(&self, a: f64, b: f64) -> bool {
        match self {
            Direction::Up => a > b,
            Direction::Down => a < b,
        }
    }
}

/// Identifies a detector in the configured priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Trend,
    Crossover,
    Breakout,
    VolumeSpike,
    DoublePattern,
    BoxRange,
    Momentum,
}

impl DetectorKind {
    pub fn default_order() -> Vec<DetectorKind> {
        vec![
            DetectorKind::Trend,
            DetectorKind::Crossover,
            DetectorKind::Breakout,
            DetectorKind::VolumeSpike,
            DetectorKind::DoublePattern,
            DetectorKind::BoxRange,
            DetectorKind::Momentum,
        ]
    }
}

/// How detectors are combined into a final label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierPolicy {
    /// Detectors in priority order; the first detection wins
    FirstMatch,
    /// Weighted conditions summed per side and thresholded
    WeightedScore,
}

/// Indicator readings computed once per instrument per cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct IndicatorSnapshot {
    pub rsi: Option<f64>,
    pub macd: Option<Macd>,
}

impl IndicatorSnapshot {
    pub fn histogram(&self) -> Option<f64> {
        self.macd.map(|m| m.histogram).filter(|h| h.is_finite())
    }

    pub fn rsi(&self) -> Option<f64> {
        self.rsi.filter(|r| r.is_finite())
    }
}

/// Read-only input shared by every detector for one instrument.
#[derive(Debug, Clone, Copy)]
pub struct InstrumentView<'a> {
    pub series: &'a InstrumentSeries,
    pub indicators: IndicatorSnapshot,
    /// Batch-relative volume spike flag from the statistics phase
    pub volume_spike: bool,
}

impl<'a> InstrumentView<'a> {
    pub fn history(&self) -> &'a PriceHistory {
        &self.series.history
    }

    pub fn latest(&self) -> &'a QuoteSnapshot {
        &self.series.latest
    }

    pub fn current_price(&self) -> f64 {
        self.series.latest.current_price
    }
}

/// Output of a single detector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub category: SignalCategory,
    /// Reference price: neckline, breakout level or box edge position
    pub level: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub rating: Option<u8>,
}

impl Detection {
    pub fn new(category: SignalCategory) -> Self {
        Self {
            category,
            level: None,
            volume_ratio: None,
            rating: None,
        }
    }

    pub fn with_level(mut self, level: f64) -> Self {
        self.level = Some(level);
        self
    }

    pub fn with_volume_ratio(mut self, ratio: f64) -> Self {
        self.volume_ratio = Some(ratio);
        self
    }

    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }
}

/// Category specific diagnostic values carried into the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub rsi: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub level: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub score: Option<f64>,
    pub rating: Option<u8>,
}

/// Final classification of one instrument for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRecord {
    pub code: String,
    pub name: String,
    pub category: SignalCategory,
    pub price: f64,
    pub diagnostics: Diagnostics,
}

impl SignalRecord {
    pub fn from_detection(view: &InstrumentView<'_>, detection: Detection) -> Self {
        Self {
            code: view.series.instrument.code.clone(),
            name: view.series.instrument.name.clone(),
            category: detection.category,
            price: view.current_price(),
            diagnostics: Diagnostics {
                rsi: view.indicators.rsi(),
                macd_histogram: view.indicators.histogram(),
                level: detection.level,
                volume_ratio: detection.volume_ratio,
                score: None,
                rating: detection.rating,
            },
        }
    }
}

/// Base trait for all pattern detectors.
pub trait Detector: Send + Sync {
    fn kind(&self) -> DetectorKind;

    /// Evaluate one instrument. `None` covers both "pattern absent" and
    /// "not enough data".
    fn detect(&self, view: &InstrumentView<'_>) -> Option<Detection>;
}

/// Shared helpers for detectors and the scorer.
pub(crate) fn strictly_monotonic(values: &[f64], direction: Direction) -> bool {
    values.len() >= 2
        && values.iter().all(|v| v.is_finite())
        && values.windows(2).all(|w| direction.beyond(w[1], w[0]))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::IndicatorConfig;
    use crate::indicators;
    use crate::market_data::{Instrument, PriceHistory};

    /// Build a series whose bars are `closes`, with highs/lows offset by
    /// `spread` and the given volumes.
    pub(crate) fn series_from(closes: &[f64], volumes: &[f64], spread: f64) -> InstrumentSeries {
        let mut history = PriceHistory::new();
        for (i, &close) in closes.iter().enumerate() {
            history.insert(
                &format!("{:04}", i),
                close,
                close + spread,
                close - spread,
                volumes.get(i).copied().unwrap_or(0.0),
            );
        }
        let current = closes.last().copied().unwrap_or(f64::NAN);
        InstrumentSeries {
            instrument: Instrument {
                code: "9999".to_string(),
                name: "Test".to_string(),
            },
            latest: QuoteSnapshot {
                instrument: Instrument {
                    code: "9999".to_string(),
                    name: "Test".to_string(),
                },
                timestamp: None,
                current_price: current,
                high: current + spread,
                low: current - spread,
                previous_close: current,
                open: current,
                volume: volumes.last().copied().unwrap_or(0.0),
                bid_quantities: vec![100.0; 5],
                ask_quantities: vec![100.0; 5],
                margin_buy: 0.0,
                margin_sell: 0.0,
                bar_prices: Vec::new(),
                bar_volumes: Vec::new(),
            },
            history,
        }
    }

    /// Series built from separate high/low/close columns.
    pub(crate) fn series_from_bars(
        closes: &[f64],
        highs: &[f64],
        lows: &[f64],
        volumes: &[f64],
    ) -> InstrumentSeries {
        let mut series = series_from(closes, volumes, 0.0);
        let mut history = PriceHistory::new();
        for i in 0..closes.len() {
            history.insert(&format!("{:04}", i), closes[i], highs[i], lows[i], volumes[i]);
        }
        series.history = history;
        series
    }

    pub(crate) fn view_of(series: &InstrumentSeries) -> InstrumentView<'_> {
        let config = IndicatorConfig::default();
        let closes = series.history.closes();
        InstrumentView {
            series,
            indicators: IndicatorSnapshot {
                rsi: indicators::rsi(closes, config.rsi_period),
                macd: indicators::macd(closes, config.macd_short, config.macd_long, config.macd_signal),
            },
            volume_spike: false,
        }
    }

    #[test]
    fn test_category_order_and_side() {
        assert!(SignalCategory::Uptrend < SignalCategory::ScoredBuy);
        assert!(SignalCategory::ScoredBuy < SignalCategory::Downtrend);
        assert!(SignalCategory::BoxBuy < SignalCategory::SpikeReversalBuy);
        assert!(SignalCategory::SpikeReversalSell < SignalCategory::TrendFollowSell);
        let mut sorted = SignalCategory::ALL.to_vec();
        sorted.sort();
        assert_eq!(sorted, SignalCategory::ALL.to_vec());
    }

    #[test]
    fn test_strictly_monotonic() {
        assert!(strictly_monotonic(&[1.0, 2.0, 3.0], Direction::Up));
        assert!(!strictly_monotonic(&[1.0, 2.0, 2.0], Direction::Up));
        assert!(strictly_monotonic(&[3.0, 2.0, 1.0], Direction::Down));
        assert!(!strictly_monotonic(&[1.0, f64::NAN, 3.0], Direction::Up));
        assert!(!strictly_monotonic(&[1.0], Direction::Up));
    }

    #[test]
    fn test_indicator_snapshot_filters_non_finite() {
        let snapshot = IndicatorSnapshot {
            rsi: Some(f64::NAN),
            macd: Some(Macd {
                macd: 1.0,
                signal: 0.5,
                histogram: 0.5,
            }),
        };
        assert_eq!(snapshot.rsi(), None);
        assert_eq!(snapshot.histogram(), Some(0.5));
    }
}
