//! Technical indicators
//!
//! Stateless functions over price and volume slices (oldest value first).
//! Insufficient history or degenerate arithmetic yields `None` rather than a
//! neutral default, so callers can tell "no data" from a real reading.

use crate::stats::{trailing_mean, trailing_std};
use serde::{Deserialize, Serialize};

/// Latest MACD reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Relative Strength Index over the last `period` price changes.
///
/// RSI = 100 - 100 / (1 + RS), RS = mean gain / mean loss.
/// Needs `period + 1` prices. A window with gains but no losses reads exactly
/// 100; a window with neither (flat prices) is undefined.
pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }
    let window = &prices[prices.len() - period - 1..];
    if window.iter().any(|p| !p.is_finite()) {
        return None;
    }

    let (gain_sum, loss_sum) = window.windows(2).fold((0.0, 0.0), |(g, l), w| {
        let change = w[1] - w[0];
        if change > 0.0 {
            (g + change, l)
        } else {
            (g, l - change)
        }
    });
    let avg_gain = gain_sum / period as f64;
    let avg_loss = loss_sum / period as f64;

    if avg_loss == 0.0 {
        return if avg_gain > 0.0 { Some(100.0) } else { None };
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

/// RSI evaluated at every bar, aligned with the input.
pub fn rsi_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    (0..prices.len())
        .map(|i| rsi(&prices[..=i], period))
        .collect()
}

/// Exponential moving average without bias adjustment:
/// `ema[0] = x[0]`, `ema[t] = a * x[t] + (1 - a) * ema[t-1]`, `a = 2 / (span + 1)`.
pub fn ema(values: &[f64], span: usize) -> Vec<f64> {
    if span == 0 {
        return Vec::new();
    }
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut result = Vec::with_capacity(values.len());
    for &value in values {
        let next = match result.last() {
            Some(&prev) => alpha * value + (1.0 - alpha) * prev,
            None => value,
        };
        result.push(next);
    }
    result
}

/// MACD line, signal line and histogram at the latest bar.
pub fn macd(prices: &[f64], short: usize, long: usize, signal: usize) -> Option<Macd> {
    if prices.len() < 2 || prices.iter().any(|p| !p.is_finite()) {
        return None;
    }
    let fast = ema(prices, short);
    let slow = ema(prices, long);
    if fast.is_empty() || slow.is_empty() {
        return None;
    }

    let line: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();
    let signal_line = ema(&line, signal);

    let macd = *line.last()?;
    let signal = *signal_line.last()?;
    Some(Macd {
        macd,
        signal,
        histogram: macd - signal,
    })
}

/// Simple moving average of the last `window` values.
pub fn sma(values: &[f64], window: usize) -> Option<f64> {
    trailing_mean(values, window)
}

/// Mean of the last `window` values, or of the whole series when it is
/// shorter than the window.
pub fn capped_mean(values: &[f64], window: usize) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    trailing_mean(values, window.min(values.len()))
}

/// Coefficient of variation over the last `window` values (sample std divided
/// by the mean). Scale free, so one threshold serves every price level.
pub fn volatility_ratio(values: &[f64], window: usize) -> Option<f64> {
    let mean = trailing_mean(values, window)?;
    if mean <= 0.0 {
        return None;
    }
    let std = trailing_std(values, window)?;
    Some(std / mean)
}

/// Sample std of the last `window` values and of the `window` values before
/// them, as `(current, past)`.
pub fn volatility_pair(values: &[f64], window: usize) -> Option<(f64, f64)> {
    if values.len() < window * 2 {
        return None;
    }
    let current = trailing_std(values, window)?;
    let past = trailing_std(&values[..values.len() - window], window)?;
    Some((current, past))
}

/// Average of the last `window` volumes and of the `window` volumes before
/// them, as `(recent, past)`.
pub fn volume_averages(volumes: &[f64], window: usize) -> Option<(f64, f64)> {
    if volumes.len() < window * 2 {
        return None;
    }
    let recent = trailing_mean(volumes, window)?;
    let past = trailing_mean(&volumes[..volumes.len() - window], window)?;
    Some((recent, past))
}

/// `(latest - oldest) / oldest` over the last `window` volumes.
pub fn volume_change_ratio(volumes: &[f64], window: usize) -> Option<f64> {
    if window < 2 || volumes.len() < window {
        return None;
    }
    let oldest = volumes[volumes.len() - window];
    let latest = *volumes.last()?;
    if !oldest.is_finite() || !latest.is_finite() || oldest == 0.0 {
        return None;
    }
    Some((latest - oldest) / oldest)
}

/// Buy-side over sell-side quantity at the top levels of the book.
/// An empty sell side reads as `+inf`.
pub fn board_balance(bids: &[f64], asks: &[f64]) -> f64 {
    let bid_total: f64 = bids.iter().sum();
    let ask_total: f64 = asks.iter().sum();
    if ask_total == 0.0 {
        return f64::INFINITY;
    }
    bid_total / ask_total
}
