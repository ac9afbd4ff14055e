//! Volume-spike-confirmed reversal and continuation
//!
//! Only instruments flagged by the batch spike threshold are considered. The
//! latest price move against the previous bar picks the side; whether that
//! move follows or opposes the prior short/mid average ordering decides
//! between continuation and reversal.

use super::core::{Detection, Detector, DetectorKind, Direction, InstrumentView, SignalCategory};
use crate::config::SpikeDetectorConfig;
use crate::indicators::rsi_series;
use crate::stats::trailing_mean;

#[derive(Debug, Clone)]
pub struct VolumeSpikeDetector {
    pub config: SpikeDetectorConfig,
}

impl Default for VolumeSpikeDetector {
    fn default() -> Self {
        Self::new(SpikeDetectorConfig::default())
    }
}

impl VolumeSpikeDetector {
    pub fn new(config: SpikeDetectorConfig) -> Self {
        Self { config }
    }

    /// Continuation: momentum agrees with the move.
    fn continuation(&self, view: &InstrumentView<'_>, side: Direction) -> Option<SignalCategory> {
        let rsi = view.indicators.rsi()?;
        let histogram = view.indicators.histogram()?;
        if !(side.beyond(rsi, self.config.rsi_midline) && side.beyond(histogram, 0.0)) {
            return None;
        }
        Some(match side {
            Direction::Up => SignalCategory::SpikeContinuationBuy,
            Direction::Down => SignalCategory::SpikeContinuationSell,
        })
    }

    /// Reversal: RSI reached the opposite extreme within the recent bars.
    fn reversal(&self, closes: &[f64], side: Direction) -> Option<SignalCategory> {
        let c = &self.config;
        let series = rsi_series(closes, c.rsi_period);
        let recent = series[series.len().saturating_sub(c.reversal_lookback.max(1))..]
            .iter()
            .flatten()
            .copied()
            .filter(|r| r.is_finite());

        let stretched = match side {
            Direction::Up => recent.fold(f64::INFINITY, f64::min) <= c.rsi_oversold,
            Direction::Down => recent.fold(f64::NEG_INFINITY, f64::max) >= c.rsi_overbought,
        };
        if !stretched {
            return None;
        }
        Some(match side {
            Direction::Up => SignalCategory::SpikeReversalBuy,
            Direction::Down => SignalCategory::SpikeReversalSell,
        })
    }
}

impl Detector for VolumeSpikeDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::VolumeSpike
    }

    fn detect(&self, view: &InstrumentView<'_>) -> Option<Detection> {
        if !view.volume_spike {
            return None;
        }

        let c = &self.config;
        let closes = view.history().closes();
        let len = closes.len();
        if len < c.ma_mid + 1 {
            return None;
        }

        // Prior ordering of the averages, measured on the bar before the latest
        let before = &closes[..len - 1];
        let short = trailing_mean(before, c.ma_short)?;
        let mid = trailing_mean(before, c.ma_mid)?;
        let prior = if short > mid {
            Direction::Up
        } else if short < mid {
            Direction::Down
        } else {
            return None;
        };

        let reference = closes[len - 2];
        let current = view.current_price();
        if !(current.is_finite() && reference.is_finite()) {
            return None;
        }
        let side = if current > reference {
            Direction::Up
        } else if current < reference {
            Direction::Down
        } else {
            return None;
        };

        let category = if side == prior {
            self.continuation(view, side)?
        } else {
            self.reversal(closes, side)?
        };
        Some(Detection::new(category).with_level(reference))
    }
}
