//! Signal Coordinator
//!
//! Runs one analysis cycle over a [`QuoteTable`] in two explicit phases:
//! batch statistics across every instrument first, then per-instrument
//! classification under the configured policy. Per-instrument failures are
//! logged and skipped; they never abort the cycle.

use super::box_range::BoxRangeDetector;
use super::breakout::BreakoutDetector;
use super::core::{
    ClassifierPolicy, Detector, DetectorKind, IndicatorSnapshot, InstrumentView, SignalRecord,
};
use super::crossover::CrossoverDetector;
use super::momentum::MomentumDetector;
use super::reversal::DoublePatternDetector;
use super::scoring::WeightedScorer;
use super::trend::TrendDetector;
use super::volume_spike::VolumeSpikeDetector;
use crate::config::{AppConfig, DetectorConfig, IndicatorConfig, VolumeSpikeConfig};
use crate::indicators::{self, volume_change_ratio};
use crate::market_data::{InstrumentSeries, QuoteTable};
use crate::stats::iqr_threshold;
use anyhow::{Result, bail};
use log::{debug, info, warn};
use std::collections::BTreeMap;

/// Cross-sectional statistics computed once per cycle before any
/// instrument is classified.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchStats {
    /// IQR upper fence over every instrument's volume change ratio
    pub volume_spike_threshold: Option<f64>,
    pub volume_ratios: BTreeMap<String, f64>,
}

impl BatchStats {
    /// Strictly above the batch threshold. Instruments without a ratio never
    /// spike.
    pub fn is_volume_spike(&self, code: &str) -> bool {
        match (self.volume_spike_threshold, self.volume_ratios.get(code)) {
            (Some(threshold), Some(&ratio)) => ratio > threshold,
            _ => false,
        }
    }
}

/// Result of one cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleOutcome {
    pub records: Vec<SignalRecord>,
    /// Instruments that reached classification
    pub considered: usize,
    pub skipped: usize,
    pub filtered_out: usize,
    pub failed: usize,
}

/// Signal coordination engine
pub struct SignalCoordinator {
    indicators: IndicatorConfig,
    volume_spike: VolumeSpikeConfig,
    policy: ClassifierPolicy,
    detectors: Vec<Box<dyn Detector>>,
    scorer: WeightedScorer,
}

impl SignalCoordinator {
    /// Build the detector chain and scorer from configuration.
    ///
    /// # Arguments
    /// * `config` - Full application configuration; validated here
    ///
    /// # Returns
    /// * `Result<SignalCoordinator>` - Coordinator or validation error
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;

        let detectors = config
            .classifier
            .detector_order
            .iter()
            .map(|&kind| build_detector(kind, &config.detectors))
            .collect();

        Ok(Self {
            indicators: config.indicators.clone(),
            volume_spike: config.volume_spike.clone(),
            policy: config.classifier.policy,
            detectors,
            scorer: WeightedScorer::new(config.classifier.scoring.clone()),
        })
    }

    /// Detector kinds in evaluation order.
    pub fn detector_kinds(&self) -> Vec<DetectorKind> {
        self.detectors.iter().map(|d| d.kind()).collect()
    }

    /// Phase 1: statistics that depend on the whole batch.
    pub fn batch_stats(&self, table: &QuoteTable) -> BatchStats {
        let volume_ratios: BTreeMap<String, f64> = table
            .iter()
            .filter_map(|series| {
                volume_change_ratio(series.history.volumes(), self.volume_spike.window)
                    .map(|ratio| (series.instrument.code.clone(), ratio))
            })
            .collect();

        let values: Vec<f64> = volume_ratios.values().copied().collect();
        let volume_spike_threshold = if values.is_empty() {
            None
        } else {
            match iqr_threshold(&values, self.volume_spike.iqr_multiplier) {
                Ok(threshold) => Some(threshold),
                Err(e) => {
                    warn!("Volume spike threshold unavailable: {}", e);
                    None
                }
            }
        };

        debug!(
            "Batch stats: {} volume ratios, spike threshold {:?}",
            values.len(),
            volume_spike_threshold
        );
        BatchStats {
            volume_spike_threshold,
            volume_ratios,
        }
    }

    fn indicator_snapshot(&self, series: &InstrumentSeries) -> IndicatorSnapshot {
        let closes = series.history.closes();
        let ind = &self.indicators;
        IndicatorSnapshot {
            rsi: indicators::rsi(closes, ind.rsi_period),
            macd: indicators::macd(closes, ind.macd_short, ind.macd_long, ind.macd_signal),
        }
    }

    /// Phase 2 for one instrument.
    pub fn classify(&self, series: &InstrumentSeries, stats: &BatchStats) -> Result<Vec<SignalRecord>> {
        let code = &series.instrument.code;
        let price = series.latest.current_price;
        if !price.is_finite() || price <= 0.0 {
            bail!("Instrument {} has unusable current price {}", code, price);
        }

        let view = InstrumentView {
            series,
            indicators: self.indicator_snapshot(series),
            volume_spike: stats.is_volume_spike(code),
        };

        let records = match self.policy {
            ClassifierPolicy::FirstMatch => self
                .detectors
                .iter()
                .find_map(|detector| detector.detect(&view))
                .map(|detection| SignalRecord::from_detection(&view, detection))
                .into_iter()
                .collect(),
            ClassifierPolicy::WeightedScore => self.scorer.classify(&view),
        };
        Ok(records)
    }

    /// Run both phases over the table.
    pub fn run_cycle(&self, table: &QuoteTable) -> CycleOutcome {
        let stats = self.batch_stats(table);

        let mut outcome = CycleOutcome {
            skipped: table.skipped().len(),
            filtered_out: table.filtered_out().len(),
            ..CycleOutcome::default()
        };

        for series in table.iter() {
            outcome.considered += 1;
            match self.classify(series, &stats) {
                Ok(records) => outcome.records.extend(records),
                Err(e) => {
                    outcome.failed += 1;
                    warn!("Classification failed for {}: {:#}", series.instrument.code, e);
                }
            }
        }

        info!(
            "Cycle complete: {} considered, {} signals, {} skipped rows, {} outside price band",
            outcome.considered,
            outcome.records.len(),
            outcome.skipped,
            outcome.filtered_out
        );
        outcome
    }
}

fn build_detector(kind: DetectorKind, config: &DetectorConfig) -> Box<dyn Detector> {
    match kind {
        DetectorKind::Trend => Box::new(TrendDetector::new(config.trend.clone())),
        DetectorKind::Crossover => Box::new(CrossoverDetector::new(config.crossover.clone())),
        DetectorKind::Breakout => Box::new(BreakoutDetector::new(config.breakout.clone())),
        DetectorKind::VolumeSpike => Box::new(VolumeSpikeDetector::new(config.volume_spike.clone())),
        DetectorKind::DoublePattern => {
            Box::new(DoublePatternDetector::new(config.double_pattern.clone()))
        }
        DetectorKind::BoxRange => Box::new(BoxRangeDetector::new(config.box_range.clone())),
        DetectorKind::Momentum => Box::new(MomentumDetector::new(config.momentum.clone())),
    }
}
