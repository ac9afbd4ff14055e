use crate::config::PriceBandConfig;
use log::{debug, info};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    pub code: String,
    pub name: String,
}

/// Reasons a snapshot row is rejected at the loading boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuoteError {
    #[error("missing column `{0}`")]
    MissingColumn(String),
    #[error("empty instrument code")]
    EmptyCode,
    #[error("non-numeric value {value:?} in column `{column}`")]
    NotNumeric { column: String, value: String },
    #[error("non-positive price {value} in column `{column}`")]
    NonPositivePrice { column: String, value: f64 },
    #[error("bar column {needed} out of range, row has {available} columns")]
    BarOutOfRange { needed: usize, available: usize },
    #[error("empty timestamp tag")]
    EmptyTimestamp,
}

/// One instrument's state at one capture time.
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteSnapshot {
    pub instrument: Instrument,
    pub timestamp: Option<String>,
    pub current_price: f64,
    pub high: f64,
    pub low: f64,
    pub previous_close: f64,
    pub open: f64,
    pub volume: f64,
    pub bid_quantities: Vec<f64>,
    pub ask_quantities: Vec<f64>,
    pub margin_buy: f64,
    pub margin_sell: f64,
    /// Embedded trailing bar prices, oldest first
    pub bar_prices: Vec<f64>,
    pub bar_volumes: Vec<f64>,
}

/// A row that failed validation, kept for the cycle diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    pub row: usize,
    pub code: Option<String>,
    pub reason: QuoteError,
}

/// Time-ordered bars for one instrument, stored as parallel columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceHistory {
    timestamps: Vec<String>,
    closes: Vec<f64>,
    highs: Vec<f64>,
    lows: Vec<f64>,
    volumes: Vec<f64>,
}

impl PriceHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a series from a row's embedded bars. Bar highs and lows equal
    /// the bar price; missing bar volumes are treated as zero.
    pub fn from_bars(prices: &[f64], volumes: &[f64]) -> Self {
        let mut history = Self::new();
        for (i, &price) in prices.iter().enumerate() {
            let volume = volumes.get(i).copied().unwrap_or(0.0);
            history.timestamps.push(format!("bar{:03}", i));
            history.closes.push(price);
            history.highs.push(price);
            history.lows.push(price);
            history.volumes.push(volume);
        }
        history
    }

    /// Insert a bar keeping timestamps ascending. A bar with an already
    /// present timestamp replaces the earlier one.
    pub fn insert(&mut self, timestamp: &str, close: f64, high: f64, low: f64, volume: f64) {
        match self.timestamps.binary_search_by(|t| t.as_str().cmp(timestamp)) {
            Ok(idx) => {
                debug!("Replacing duplicate bar at {}", timestamp);
                self.closes[idx] = close;
                self.highs[idx] = high;
                self.lows[idx] = low;
                self.volumes[idx] = volume;
            }
            Err(idx) => {
                self.timestamps.insert(idx, timestamp.to_string());
                self.closes.insert(idx, close);
                self.highs.insert(idx, high);
                self.lows.insert(idx, low);
                self.volumes.insert(idx, volume);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }

    pub fn timestamps(&self) -> &[String] {
        &self.timestamps
    }

    pub fn closes(&self) -> &[f64] {
        &self.closes
    }

    pub fn highs(&self) -> &[f64] {
        &self.highs
    }

    pub fn lows(&self) -> &[f64] {
        &self.lows
    }

    pub fn volumes(&self) -> &[f64] {
        &self.volumes
    }

    pub fn max_price(&self) -> Option<f64> {
        self.highs.iter().copied().reduce(f64::max)
    }

    pub fn min_price(&self) -> Option<f64> {
        self.lows.iter().copied().reduce(f64::min)
    }
}

/// Everything the detectors see for one instrument.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentSeries {
    pub instrument: Instrument,
    pub latest: QuoteSnapshot,
    pub history: PriceHistory,
}

/// Typed quote table produced for one analysis cycle.
#[derive(Debug, Clone, Default)]
pub struct QuoteTable {
    instruments: BTreeMap<String, InstrumentSeries>,
    skipped: Vec<SkippedRow>,
    filtered_out: Vec<String>,
}

impl QuoteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-snapshot mode: every row carries its own trailing history.
    pub fn from_single_snapshot(rows: Vec<QuoteSnapshot>, skipped: Vec<SkippedRow>) -> Self {
        let mut table = Self {
            skipped,
            ..Self::default()
        };
        for row in rows {
            let history = PriceHistory::from_bars(&row.bar_prices, &row.bar_volumes);
            let code = row.instrument.code.clone();
            if table.instruments.contains_key(&code) {
                debug!("Duplicate row for {} in snapshot, keeping the later one", code);
            }
            table.instruments.insert(
                code,
                InstrumentSeries {
                    instrument: row.instrument.clone(),
                    latest: row,
                    history,
                },
            );
        }
        table
    }

    /// Multi-snapshot mode: one bar per row, grouped per instrument and
    /// ordered by capture timestamp.
    pub fn from_snapshots(rows: Vec<QuoteSnapshot>, skipped: Vec<SkippedRow>) -> Self {
        let mut table = Self {
            skipped,
            ..Self::default()
        };
        for row in rows {
            let timestamp = row.timestamp.clone().unwrap_or_default();
            let entry = table
                .instruments
                .entry(row.instrument.code.clone())
                .or_insert_with(|| InstrumentSeries {
                    instrument: row.instrument.clone(),
                    latest: row.clone(),
                    history: PriceHistory::new(),
                });
            entry
                .history
                .insert(&timestamp, row.current_price, row.high, row.low, row.volume);

            let is_latest = entry
                .latest
                .timestamp
                .as_deref()
                .is_none_or(|t| t <= timestamp.as_str());
            if is_latest {
                entry.instrument = row.instrument.clone();
                entry.latest = row;
            }
        }
        table
    }

    /// Drop instruments whose series leaves the configured price band.
    pub fn apply_price_band(&mut self, band: &PriceBandConfig) {
        if !band.enabled {
            return;
        }
        let mut removed = Vec::new();
        self.instruments.retain(|code, series| {
            let inside = match (series.history.min_price(), series.history.max_price()) {
                (Some(min), Some(max)) => min >= band.min_price && max <= band.max_price,
                _ => false,
            };
            if !inside {
                removed.push(code.clone());
            }
            inside
        });
        if !removed.is_empty() {
            info!(
                "Price band [{}, {}] excluded {} instruments",
                band.min_price,
                band.max_price,
                removed.len()
            );
        }
        self.filtered_out.extend(removed);
    }

    pub fn get(&self, code: &str) -> Option<&InstrumentSeries> {
        self.instruments.get(code)
    }

    /// Instruments in ascending code order.
    pub fn iter(&self) -> impl Iterator<Item = &InstrumentSeries> {
        self.instruments.values()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn skipped(&self) -> &[SkippedRow] {
        &self.skipped
    }

    pub fn filtered_out(&self) -> &[String] {
        &self.filtered_out
    }
}
