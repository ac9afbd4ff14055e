//! End-to-end classification over loaded snapshots

mod common;

use anyhow::Result;
use common::{Row, snapshot_csv};
use signalscan::config::{AppConfig, ColumnLayout, PriceBandConfig};
use signalscan::loader::QuoteLoader;
use signalscan::report::{Report, ReportCounts};
use signalscan::signals::{SignalCategory, SignalCoordinator};

fn loader() -> QuoteLoader {
    QuoteLoader::new(ColumnLayout::default(), PriceBandConfig::default())
}

/// Flat for most of the session, a two bar dip, then a steady climb that
/// pulls the 5-bar average over the 25-bar average on the final bar.
fn uptrend_row(code: &str) -> Row {
    let mut prices = vec![1000.0];
    prices.extend(std::iter::repeat_n(1100.0, 19));
    prices.extend([1075.0, 1050.0, 1080.0, 1110.0, 1140.0, 1170.0]);
    let mut volumes = vec![1000.0; 21];
    volumes.extend([2000.0; 5]);
    Row::new(code, prices, volumes)
}

/// Two equal peaks with heavy volume, closing under the valley between them.
fn double_top_row(code: &str) -> Row {
    let prices = vec![
        1000.0, 1000.0, 1000.0, 1000.0, 1000.0, 1000.0, 1010.0, 1020.0, 1030.0, 1040.0, 1050.0,
        1040.0, 1030.0, 1020.0, 1010.0, 1020.0, 1030.0, 1040.0, 1050.0, 1040.0, 1030.0, 1020.0,
        1010.0, 1005.0, 1000.0, 990.0,
    ];
    let mut volumes = vec![1000.0; 26];
    volumes[10] = 2000.0;
    volumes[18] = 2000.0;
    Row::new(code, prices, volumes)
}

#[test]
fn test_fresh_cross_in_uptrend_is_labelled_uptrend() -> Result<()> {
    let table = loader().load_snapshot(&snapshot_csv(&[uptrend_row("7203")]))?;
    let coordinator = SignalCoordinator::from_config(&AppConfig::default())?;
    let outcome = coordinator.run_cycle(&table);

    assert_eq!(outcome.considered, 1);
    assert_eq!(outcome.records.len(), 1);
    let record = &outcome.records[0];
    assert_eq!(record.code, "7203");
    assert_eq!(record.category, SignalCategory::Uptrend);
    assert_eq!(record.price, 1170.0);
    let level = record.diagnostics.level.expect("mid average reported");
    assert!((level - 1101.0).abs() < 1e-9);
    Ok(())
}

#[test]
fn test_double_top_reports_neckline() -> Result<()> {
    let table = loader().load_snapshot(&snapshot_csv(&[double_top_row("6758")]))?;
    let coordinator = SignalCoordinator::from_config(&AppConfig::default())?;
    let outcome = coordinator.run_cycle(&table);

    assert_eq!(outcome.records.len(), 1);
    let record = &outcome.records[0];
    assert_eq!(record.category, SignalCategory::DoubleTop);
    assert_eq!(record.diagnostics.level, Some(1010.0));
    Ok(())
}

#[test]
fn test_bad_row_is_counted_not_fatal() -> Result<()> {
    let mut rows: Vec<Row> = (0..9)
        .map(|i| Row::flat(&format!("{}", 2000 + i), 1500.0))
        .collect();
    let mut bad = Row::flat("2999", 1500.0);
    bad.current = "abc".to_string();
    rows.insert(4, bad);

    let table = loader().load_snapshot(&snapshot_csv(&rows))?;
    assert_eq!(table.len(), 9);
    assert_eq!(table.skipped().len(), 1);
    assert_eq!(table.skipped()[0].code.as_deref(), Some("2999"));

    let config = AppConfig::default();
    let coordinator = SignalCoordinator::from_config(&config)?;
    let outcome = coordinator.run_cycle(&table);
    assert_eq!(outcome.considered, 9);
    assert_eq!(outcome.skipped, 1);
    assert_eq!(outcome.failed, 0);

    let counts = ReportCounts::from(&outcome);
    let report = Report::build(outcome.records, counts, &config.report);
    assert_eq!(report.counts.considered, 9);
    assert!(report.render_text().contains("Considered 9 instruments (1 rows skipped"));
    Ok(())
}

#[test]
fn test_out_of_band_instruments_are_not_classified() -> Result<()> {
    let rows = vec![Row::flat("3001", 300.0), uptrend_row("3002")];
    let table = loader().load_snapshot(&snapshot_csv(&rows))?;
    let coordinator = SignalCoordinator::from_config(&AppConfig::default())?;
    let outcome = coordinator.run_cycle(&table);

    assert_eq!(outcome.considered, 1);
    assert_eq!(outcome.filtered_out, 1);
    assert!(outcome.records.iter().all(|r| r.code == "3002"));
    Ok(())
}

#[test]
fn test_repeated_cycles_are_identical() -> Result<()> {
    let rows = vec![
        uptrend_row("7203"),
        double_top_row("6758"),
        Row::flat("9984", 1500.0),
    ];
    let csv = snapshot_csv(&rows);
    let config = AppConfig::default();
    let coordinator = SignalCoordinator::from_config(&config)?;

    let run = || -> Result<Report> {
        let table = loader().load_snapshot(&csv)?;
        let outcome = coordinator.run_cycle(&table);
        let counts = ReportCounts::from(&outcome);
        Ok(Report::build(outcome.records, counts, &config.report))
    };

    let first = run()?;
    let second = run()?;
    assert_eq!(first.signal_count(), 2);
    assert_eq!(first.sections, second.sections);
    assert_eq!(first.counts, second.counts);
    assert_eq!(first.render_text(), second.render_text());
    assert_eq!(first.render_html(), second.render_html());
    Ok(())
}

#[test]
fn test_weighted_policy_attaches_scores() -> Result<()> {
    let mut config = AppConfig::default();
    config.classifier.policy = signalscan::signals::ClassifierPolicy::WeightedScore;
    config.classifier.scoring.threshold = 1.0;

    let table = loader().load_snapshot(&snapshot_csv(&[uptrend_row("7203")]))?;
    let coordinator = SignalCoordinator::from_config(&config)?;
    let outcome = coordinator.run_cycle(&table);

    assert!(!outcome.records.is_empty());
    assert!(outcome.records.iter().all(|r| r.diagnostics.score.is_some()));
    Ok(())
}
