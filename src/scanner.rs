//! One analysis cycle end to end: fetch, load, classify, report, notify.

use crate::config::{AppConfig, SnapshotMode};
use crate::loader::QuoteLoader;
use crate::market_data::QuoteTable;
use crate::notify::Notifier;
use crate::report::{self, Report, ReportCounts};
use crate::signals::SignalCoordinator;
use crate::source::SnapshotSource;
use anyhow::Result;
use log::{error, info, warn};

pub struct Scanner<S: SnapshotSource, N: Notifier> {
    config: AppConfig,
    loader: QuoteLoader,
    coordinator: SignalCoordinator,
    source: S,
    notifier: N,
}

impl<S: SnapshotSource, N: Notifier> Scanner<S, N> {
    pub fn new(config: AppConfig, source: S, notifier: N) -> Result<Self> {
        let coordinator = SignalCoordinator::from_config(&config)?;
        let loader = QuoteLoader::new(config.columns.clone(), config.price_band.clone());
        Ok(Self {
            config,
            loader,
            coordinator,
            source,
            notifier,
        })
    }

    /// Table for the cycle keyed by `date`/`time`, `None` when the source has
    /// nothing for it yet.
    pub fn load_table(&mut self, date: &str, time: &str) -> Result<Option<QuoteTable>> {
        match self.config.source.mode {
            SnapshotMode::Single => match self.source.fetch(date, time)? {
                Some(bytes) => Ok(Some(self.loader.load_snapshot(&bytes)?)),
                None => Ok(None),
            },
            SnapshotMode::Tagged => match self.source.fetch(date, time)? {
                Some(bytes) => Ok(Some(self.loader.load_tagged(&bytes)?)),
                None => Ok(None),
            },
            SnapshotMode::Multi => {
                let times: Vec<String> = self
                    .source
                    .list(date)?
                    .into_iter()
                    .filter(|t| t.as_str() <= time)
                    .collect();

                let mut snapshots = Vec::with_capacity(times.len());
                for t in times {
                    match self.source.fetch(date, &t) {
                        Ok(Some(bytes)) => snapshots.push((t, bytes)),
                        Ok(None) => warn!("Snapshot {} {} listed but missing", date, t),
                        Err(e) => warn!("Snapshot {} {} unavailable: {:#}", date, t, e),
                    }
                }
                if snapshots.is_empty() {
                    return Ok(None);
                }
                Ok(Some(self.loader.load_snapshots(&snapshots)?))
            }
        }
    }

    /// Classify a loaded table and group the result.
    pub fn analyze(&self, table: &QuoteTable) -> Report {
        let outcome = self.coordinator.run_cycle(table);
        let counts = ReportCounts::from(&outcome);
        Report::build(outcome.records, counts, &self.config.report)
    }

    /// Run one cycle. Returns the report that was handed to the notifier, or
    /// `None` when no snapshot was available. Notification failures are
    /// logged, not returned.
    pub fn run_cycle(&mut self, date: &str, time: &str) -> Result<Option<Report>> {
        let Some(table) = self.load_table(date, time)? else {
            info!("No snapshot for {} {}", date, time);
            return Ok(None);
        };

        let report = self.analyze(&table);
        let subject = report::subject(&self.config.report.subject_prefix, date, time);
        if let Err(e) = self.notifier.send(&report, &subject) {
            error!("Failed to deliver report {}: {:#}", subject, e);
        }
        Ok(Some(report))
    }

    /// Run one cycle and log its outcome. Returns `true` only when a report
    /// was produced.
    pub fn poll(&mut self, date: &str, time: &str) -> bool {
        match self.run_cycle(date, time) {
            Ok(Some(report)) => {
                info!(
                    "Cycle {} {}: {} signals",
                    date,
                    time,
                    report.signal_count()
                );
                true
            }
            Ok(None) => false,
            Err(e) => {
                error!("Cycle {} {} failed: {:#}", date, time, e);
                false
            }
        }
    }
}
