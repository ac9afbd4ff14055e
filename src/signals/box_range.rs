//! Box range edge detection
//!
//! An instrument is "in a box" when its current price sits close to the mean
//! of the lookback window. A touch of the lower edge is a buy cue, a touch of
//! the upper edge a sell cue.

use super::core::{Detection, Detector, DetectorKind, InstrumentView, SignalCategory};
use crate::config::BoxRangeConfig;
use crate::indicators::{volatility_pair, volume_averages};
use crate::stats::trailing_mean;
use log::debug;

#[derive(Debug, Clone)]
pub struct BoxRangeDetector {
    pub config: BoxRangeConfig,
}

impl Default for BoxRangeDetector {
    fn default() -> Self {
        Self::new(BoxRangeConfig::default())
    }
}

impl BoxRangeDetector {
    pub fn new(config: BoxRangeConfig) -> Self {
        Self { config }
    }

    fn volume_confirmed(&self, volumes: &[f64]) -> bool {
        let c = &self.config;
        match volume_averages(volumes, c.volume_window) {
            Some((recent, past)) => recent > past * c.volume_ratio,
            None => false,
        }
    }

    fn volatility_stable(&self, closes: &[f64]) -> bool {
        let c = &self.config;
        match volatility_pair(closes, c.volatility_window) {
            Some((current, past)) => current <= past * c.stability_ratio,
            None => false,
        }
    }
}

impl Detector for BoxRangeDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::BoxRange
    }

    fn detect(&self, view: &InstrumentView<'_>) -> Option<Detection> {
        let c = &self.config;
        let history = view.history();
        let closes = history.closes();
        if c.lookback < 2 || closes.len() < c.lookback {
            return None;
        }

        let window = &closes[closes.len() - c.lookback..];
        let current = view.current_price();
        let mean = trailing_mean(window, c.lookback);
        let mean = match mean {
            Some(m) if m > 0.0 && m.is_finite() && current.is_finite() => m,
            _ => {
                debug!(
                    "{}: box range skipped, window mean undefined",
                    view.series.instrument.code
                );
                return None;
            }
        };

        if (current - mean).abs() / mean > c.mean_tolerance {
            return None;
        }

        let max = window.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = window.iter().copied().fold(f64::INFINITY, f64::min);
        let band = max - min;
        if band <= 0.0 {
            return None;
        }

        let position = (current - min) / band;
        let category = if position <= 1.0 - c.edge_threshold {
            SignalCategory::BoxBuy
        } else if position >= c.edge_threshold {
            SignalCategory::BoxSell
        } else {
            return None;
        };

        if c.use_volume_filter && !self.volume_confirmed(history.volumes()) {
            return None;
        }
        if c.use_volatility_filter && !self.volatility_stable(closes) {
            return None;
        }

        Some(Detection::new(category).with_level(position))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::core::tests::{series_from, view_of};

    /// Oscillates between 990 and 1010 and ends on `last`.
    fn box_series(last: f64) -> Vec<f64> {
        let mut closes: Vec<f64> = (0..25)
            .map(|i| if i % 2 == 0 { 990.0 } else { 1010.0 })
            .collect();
        closes.push(last);
        closes
    }

    #[test]
    fn test_lower_edge_is_box_buy() {
        let closes = box_series(992.0);
        let series = series_from(&closes, &vec![1000.0; closes.len()], 0.0);
        let detection = BoxRangeDetector::default().detect(&view_of(&series)).unwrap();
        assert_eq!(detection.category, SignalCategory::BoxBuy);
        assert!((detection.level.unwrap() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_upper_edge_is_box_sell() {
        let closes = box_series(1008.0);
        let series = series_from(&closes, &vec![1000.0; closes.len()], 0.0);
        let detection = BoxRangeDetector::default().detect(&view_of(&series)).unwrap();
        assert_eq!(detection.category, SignalCategory::BoxSell);
    }

    #[test]
    fn test_middle_of_box_is_silent() {
        let closes = box_series(1000.0);
        let series = series_from(&closes, &vec![1000.0; closes.len()], 0.0);
        assert!(BoxRangeDetector::default().detect(&view_of(&series)).is_none());
    }

    #[test]
    fn test_far_from_mean_is_not_a_box() {
        let mut closes = box_series(1000.0);
        *closes.last_mut().unwrap() = 1100.0;
        let series = series_from(&closes, &vec![1000.0; closes.len()], 0.0);
        assert!(BoxRangeDetector::default().detect(&view_of(&series)).is_none());
    }

    #[test]
    fn test_flat_series_never_signals() {
        let closes = vec![1500.0; 30];
        let series = series_from(&closes, &vec![1000.0; 30], 0.0);
        assert!(BoxRangeDetector::default().detect(&view_of(&series)).is_none());
    }

    #[test]
    fn test_volume_filter_requires_growth() {
        let closes = box_series(992.0);
        let detector = BoxRangeDetector::new(BoxRangeConfig {
            use_volume_filter: true,
            ..BoxRangeConfig::default()
        });

        let flat = series_from(&closes, &vec![1000.0; closes.len()], 0.0);
        assert!(detector.detect(&view_of(&flat)).is_none());

        let volumes: Vec<f64> = (0..closes.len())
            .map(|i| if i + 5 >= closes.len() { 2000.0 } else { 1000.0 })
            .collect();
        let rising = series_from(&closes, &volumes, 0.0);
        assert!(detector.detect(&view_of(&rising)).is_some());
    }

    #[test]
    fn test_volatility_filter_requires_stable_box() {
        // Last five bars: std 10.62 against 10.95 for the five before
        let closes = box_series(992.0);
        let series = series_from(&closes, &vec![1000.0; closes.len()], 0.0);

        let stable = BoxRangeDetector::new(BoxRangeConfig {
            use_volatility_filter: true,
            ..BoxRangeConfig::default()
        });
        assert!(stable.detect(&view_of(&series)).is_some());

        let strict = BoxRangeDetector::new(BoxRangeConfig {
            use_volatility_filter: true,
            stability_ratio: 0.9,
            ..BoxRangeConfig::default()
        });
        assert!(strict.detect(&view_of(&series)).is_none());
    }

    #[test]
    fn test_short_history_never_signals() {
        let closes = box_series(992.0);
        let series = series_from(&closes[..10], &vec![1000.0; 10], 0.0);
        assert!(BoxRangeDetector::default().detect(&view_of(&series)).is_none());
    }
}
