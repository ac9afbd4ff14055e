//! Weighted-score classification
//!
//! Each independent condition adds its configured weight to the buy or sell
//! score (some to both). A side whose score reaches the threshold emits a
//! scored signal. Missing or non-finite inputs never satisfy a condition.

use super::core::{Detection, InstrumentView, SignalCategory, SignalRecord};
use crate::config::ScoringConfig;
use crate::indicators::{board_balance, capped_mean, sma, volatility_ratio};
use serde::{Deserialize, Serialize};

/// Buy and sell scores for one instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreCard {
    pub buy: f64,
    pub sell: f64,
}

#[derive(Debug, Clone)]
pub struct WeightedScorer {
    pub config: ScoringConfig,
}

impl Default for WeightedScorer {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl WeightedScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, view: &InstrumentView<'_>) -> ScoreCard {
        let c = &self.config;
        let w = &c.weights;
        let latest = view.latest();
        let closes = view.history().closes();
        let current = view.current_price();
        let mut card = ScoreCard::default();

        if let Some(rsi) = view.indicators.rsi() {
            if rsi <= c.rsi_buy_threshold {
                card.buy += w.rsi;
            }
            if rsi >= c.rsi_sell_threshold {
                card.sell += w.rsi;
            }
        }

        if let Some(histogram) = view.indicators.histogram() {
            if histogram > 0.0 {
                card.buy += w.macd;
            } else if histogram < 0.0 {
                card.sell += w.macd;
            }
        }

        if let (Some(short), Some(long)) = (
            sma(closes, c.trend_lookback),
            capped_mean(closes, closes.len()),
        ) {
            if current > short && short > long {
                card.buy += w.trend;
            }
            if current < short && short < long {
                card.sell += w.trend;
            }
        }

        if view.volume_spike {
            card.buy += w.volume_spike;
            card.sell += w.volume_spike;
        }

        let balance = board_balance(&latest.bid_quantities, &latest.ask_quantities);
        if !balance.is_nan() {
            if balance > c.board_balance_buy_threshold {
                card.buy += w.board_balance;
            }
            if balance < c.board_balance_sell_threshold {
                card.sell += w.board_balance;
            }
        }

        if latest.previous_close > 0.0 {
            let gap = (latest.open - latest.previous_close) / latest.previous_close;
            if gap >= c.gap_threshold {
                card.buy += w.gap;
            }
            if gap <= -c.gap_threshold {
                card.sell += w.gap;
            }
        }

        if current < latest.low * c.support_threshold {
            card.buy += w.support_resistance;
        }
        if current > latest.high * c.resistance_threshold {
            card.sell += w.support_resistance;
        }

        if let Some(volatility) = volatility_ratio(closes, c.volatility_window) {
            if volatility < c.max_volatility {
                card.buy += w.low_volatility;
                card.sell += w.low_volatility;
            }
        }

        card
    }

    /// Scored records for each side at or above the threshold.
    pub fn classify(&self, view: &InstrumentView<'_>) -> Vec<SignalRecord> {
        let card = self.score(view);
        [
            (SignalCategory::ScoredBuy, card.buy),
            (SignalCategory::ScoredSell, card.sell),
        ]
        .into_iter()
        .filter(|(_, score)| *score >= self.config.threshold)
        .map(|(category, score)| {
            let mut record = SignalRecord::from_detection(view, Detection::new(category));
            record.diagnostics.score = Some(score);
            record
        })
        .collect()
    }
}
