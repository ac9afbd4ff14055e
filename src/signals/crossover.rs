//! Golden/dead cross detection between a short and a mid moving average.

use super::core::{Detection, Detector, DetectorKind, Direction, InstrumentView, SignalCategory};
use crate::config::CrossoverConfig;
use crate::indicators::volatility_ratio;
use crate::stats::rolling_mean;

#[derive(Debug, Clone)]
pub struct CrossoverDetector {
    pub config: CrossoverConfig,
}

impl Default for CrossoverDetector {
    fn default() -> Self {
        Self::new(CrossoverConfig::default())
    }
}

impl CrossoverDetector {
    pub fn new(config: CrossoverConfig) -> Self {
        Self { config }
    }

    fn detect_direction(&self, view: &InstrumentView<'_>, direction: Direction) -> Option<Detection> {
        let c = &self.config;
        let closes = view.history().closes();
        let len = closes.len();
        if len < c.ma_mid + 1 {
            return None;
        }

        let short = rolling_mean(closes, c.ma_short);
        let mid = rolling_mean(closes, c.ma_mid);
        let t = len - 1;

        let (s_prev, m_prev, s_now, m_now) = (short[t - 1]?, mid[t - 1]?, short[t]?, mid[t]?);
        if direction.beyond(s_prev, m_prev) || !direction.beyond(s_now, m_now) {
            return None;
        }

        if c.use_slope_filter {
            let back = t.checked_sub(c.slope_lookback.max(1))?;
            let (s_then, m_then) = (short[back]?, mid[back]?);
            if !(direction.beyond(s_now, s_then) && direction.beyond(m_now, m_then)) {
                return None;
            }
        }

        if c.use_confirmation {
            // The averages must have sat in the opposite order before the cross
            for j in 1..=c.confirm_bars {
                let i = t.checked_sub(j)?;
                let (s, m) = (short[i]?, mid[i]?);
                if direction.beyond(s, m) {
                    return None;
                }
            }
        }

        if c.use_volatility_filter {
            let volatility = volatility_ratio(closes, c.volatility_window)?;
            if !(volatility < c.max_volatility) {
                return None;
            }
        }

        if c.use_rsi_filter {
            let rsi = view.indicators.rsi()?;
            if !direction.beyond(rsi, c.rsi_midline) {
                return None;
            }
        }

        let category = match direction {
            Direction::Up => SignalCategory::GoldenCross,
            Direction::Down => SignalCategory::DeadCross,
        };
        Some(Detection::new(category).with_level(m_now))
    }
}

impl Detector for CrossoverDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Crossover
    }

    fn detect(&self, view: &InstrumentView<'_>) -> Option<Detection> {
        self.detect_direction(view, Direction::Up)
            .or_else(|| self.detect_direction(view, Direction::Down))
    }
}
