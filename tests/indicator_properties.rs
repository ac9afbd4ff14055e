use proptest::prelude::*;
use signalscan::config::AppConfig;
use signalscan::indicators::{board_balance, macd, rsi};
use signalscan::market_data::{Instrument, QuoteSnapshot, QuoteTable};
use signalscan::signals::SignalCoordinator;

fn row(code: &str, bars: &[f64]) -> QuoteSnapshot {
    let price = bars.last().copied().unwrap_or(1000.0);
    QuoteSnapshot {
        instrument: Instrument {
            code: code.to_string(),
            name: code.to_string(),
        },
        timestamp: None,
        current_price: price,
        high: price,
        low: price,
        previous_close: price,
        open: price,
        volume: 1000.0,
        bid_quantities: vec![100.0; 5],
        ask_quantities: vec![100.0; 5],
        margin_buy: 0.0,
        margin_sell: 0.0,
        bar_prices: bars.to_vec(),
        bar_volumes: vec![1000.0; bars.len()],
    }
}

proptest! {
    #[test]
    fn rsi_stays_within_bounds(prices in prop::collection::vec(100.0f64..10000.0, 15..80)) {
        if let Some(value) = rsi(&prices, 14) {
            prop_assert!((0.0..=100.0).contains(&value));
        }
    }

    #[test]
    fn macd_of_constant_series_is_zero(price in 1.0f64..50000.0, len in 2usize..120) {
        let prices = vec![price; len];
        let result = macd(&prices, 12, 26, 9).unwrap();
        prop_assert!(result.macd.abs() < 1e-6 * price);
        prop_assert!(result.histogram.abs() < 1e-6 * price);
    }

    #[test]
    fn short_history_yields_no_signal(bars in prop::collection::vec(500.0f64..5000.0, 1..15)) {
        let table = QuoteTable::from_single_snapshot(vec![row("1301", &bars)], Vec::new());
        let coordinator = SignalCoordinator::from_config(&AppConfig::default()).unwrap();
        let outcome = coordinator.run_cycle(&table);
        prop_assert_eq!(outcome.considered, 1);
        prop_assert!(outcome.records.is_empty());
    }

    #[test]
    fn flat_session_yields_no_signal(price in 500.0f64..20000.0) {
        let table = QuoteTable::from_single_snapshot(vec![row("1301", &[price; 26])], Vec::new());
        let coordinator = SignalCoordinator::from_config(&AppConfig::default()).unwrap();
        prop_assert!(coordinator.run_cycle(&table).records.is_empty());
    }

    #[test]
    fn board_balance_is_symmetric(qty in 1.0f64..1e6) {
        let book = vec![qty; 5];
        prop_assert!((board_balance(&book, &book) - 1.0).abs() < 1e-12);
    }
}

#[test]
fn empty_ask_side_reads_as_infinite_balance() {
    assert_eq!(board_balance(&[100.0, 50.0], &[0.0, 0.0]), f64::INFINITY);
}

/// One instrument per ratio, codes 1300, 1301, ... in order.
fn table_with_volume_ratios(ratios: &[f64]) -> QuoteTable {
    let rows = ratios
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let mut snapshot = row(&format!("130{}", i), &[1000.0; 6]);
            if let Some(last) = snapshot.bar_volumes.last_mut() {
                *last = 1000.0 * (1.0 + r);
            }
            snapshot
        })
        .collect();
    QuoteTable::from_single_snapshot(rows, Vec::new())
}

#[test]
fn ratio_on_the_fence_is_not_a_spike() {
    // Q1 = 0.25, Q3 = 0.75, fence = 0.75 + 1.5 * 0.5 = 1.5
    let table = table_with_volume_ratios(&[0.0, 0.25, 0.5, 0.75, 1.5]);
    let coordinator = SignalCoordinator::from_config(&AppConfig::default()).unwrap();

    let stats = coordinator.batch_stats(&table);
    assert_eq!(stats.volume_spike_threshold, Some(1.5));
    assert_eq!(stats.volume_ratios.get("1304"), Some(&1.5));
    assert!(!stats.is_volume_spike("1304"));
}

#[test]
fn ratio_above_the_fence_is_a_spike() {
    let table = table_with_volume_ratios(&[0.0, 0.25, 0.5, 0.75, 2.0]);
    let coordinator = SignalCoordinator::from_config(&AppConfig::default()).unwrap();

    let stats = coordinator.batch_stats(&table);
    assert_eq!(stats.volume_spike_threshold, Some(1.5));
    assert!(stats.is_volume_spike("1304"));
    assert!(!stats.is_volume_spike("1303"));
}
