//! Momentum classifier
//!
//! Splits instruments into trend-following and contrarian buy/sell cues from
//! RSI, the MACD histogram and short vs whole-series price averages, and
//! attaches an overall 1-5 rating.

use super::core::{Detection, Detector, DetectorKind, InstrumentView, SignalCategory};
use crate::config::MomentumConfig;
use crate::indicators::{capped_mean, sma};

/// Inputs of the momentum decision for one instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MomentumReading {
    pub rsi: f64,
    pub histogram: f64,
    pub current: f64,
    pub short_trend: f64,
    pub long_trend: f64,
    pub day_low: f64,
}

impl MomentumReading {
    fn trend_up(&self) -> bool {
        self.current > self.short_trend && self.short_trend > self.long_trend
    }

    fn trend_down(&self) -> bool {
        self.current < self.short_trend && self.short_trend < self.long_trend
    }
}

#[derive(Debug, Clone)]
pub struct MomentumDetector {
    pub config: MomentumConfig,
}

impl Default for MomentumDetector {
    fn default() -> Self {
        Self::new(MomentumConfig::default())
    }
}

impl MomentumDetector {
    pub fn new(config: MomentumConfig) -> Self {
        Self { config }
    }

    pub fn reading(&self, view: &InstrumentView<'_>) -> Option<MomentumReading> {
        let closes = view.history().closes();
        let reading = MomentumReading {
            rsi: view.indicators.rsi()?,
            histogram: view.indicators.histogram()?,
            current: view.current_price(),
            short_trend: sma(closes, self.config.trend_lookback)?,
            long_trend: capped_mean(closes, closes.len())?,
            day_low: view.latest().low,
        };
        reading.current.is_finite().then_some(reading)
    }

    pub fn classify(&self, r: &MomentumReading) -> Option<SignalCategory> {
        let c = &self.config;
        if r.rsi > c.rsi_trend_buy_threshold && r.histogram > 0.0 && r.trend_up() {
            Some(SignalCategory::TrendFollowBuy)
        } else if r.rsi <= c.rsi_buy_threshold && r.histogram > 0.0 {
            Some(SignalCategory::ContrarianBuy)
        } else if r.rsi < c.rsi_trend_sell_threshold && r.histogram < 0.0 && r.trend_down() {
            Some(SignalCategory::TrendFollowSell)
        } else if r.rsi >= c.rsi_sell_threshold && r.histogram < 0.0 {
            Some(SignalCategory::ContrarianSell)
        } else {
            None
        }
    }

    /// Overall rating, clamped to 1..=5.
    pub fn rating(&self, r: &MomentumReading) -> u8 {
        let c = &self.config;
        let mut score: u8 = 0;
        if r.rsi <= c.rsi_buy_threshold {
            score += 2;
        } else if r.rsi > c.rsi_trend_buy_threshold {
            score += 1;
        }
        if r.histogram > 0.0 {
            score += 1;
        }
        if r.trend_up() {
            score += 1;
        }
        if r.current < r.day_low * c.support_threshold {
            score += 1;
        }
        score.clamp(1, 5)
    }
}

impl Detector for MomentumDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Momentum
    }

    fn detect(&self, view: &InstrumentView<'_>) -> Option<Detection> {
        let reading = self.reading(view)?;
        let category = self.classify(&reading)?;
        Some(Detection::new(category).with_rating(self.rating(&reading)))
    }
}
