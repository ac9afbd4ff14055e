//! Snapshot CSV loading
//!
//! Decodes raw snapshot bytes with polars (every column read as text) and
//! validates each row once into a typed [`QuoteSnapshot`]. Rows that fail
//! validation are skipped and reported, never abort the batch.

use crate::config::{ColumnLayout, PriceBandConfig};
use crate::market_data::{Instrument, QuoteError, QuoteSnapshot, QuoteTable, SkippedRow};
use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use polars::prelude::*;
use std::collections::HashMap;
use std::io::Cursor;

/// Header-normalised text table.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawTable {
    fn column_index(&self) -> HashMap<&str, usize> {
        self.headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.as_str(), i))
            .collect()
    }
}

/// Strip ASCII whitespace and full-width spaces from a header name.
pub fn normalize_header(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{3000}')
        .collect()
}

/// Decode CSV bytes into a text table.
pub fn read_csv_table(bytes: &[u8]) -> Result<RawTable> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .into_reader_with_file_handle(Cursor::new(bytes.to_vec()))
        .finish()
        .context("Failed to decode snapshot CSV")?;

    let headers: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| normalize_header(name.as_str()))
        .collect();

    let columns = df
        .get_columns()
        .iter()
        .map(|column| column.str())
        .collect::<PolarsResult<Vec<&StringChunked>>>()?;

    let rows = (0..df.height())
        .map(|i| {
            columns
                .iter()
                .map(|column| column.get(i).map(str::to_string))
                .collect()
        })
        .collect();

    Ok(RawTable { headers, rows })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Required {
    /// Must be numeric and strictly positive
    Price,
    /// Empty cells become NaN, anything else must be numeric
    Optional,
}

fn cell<'a>(row: &'a [Option<String>], idx: usize) -> Option<&'a str> {
    row.get(idx)
        .and_then(|v| v.as_deref())
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "-")
}

fn parse_number(
    row: &[Option<String>],
    idx: usize,
    column: &str,
    required: Required,
) -> Result<f64, QuoteError> {
    let Some(raw) = cell(row, idx) else {
        return match required {
            Required::Optional => Ok(f64::NAN),
            Required::Price => Err(QuoteError::NotNumeric {
                column: column.to_string(),
                value: String::new(),
            }),
        };
    };

    let value: f64 = raw
        .replace(',', "")
        .parse()
        .map_err(|_| QuoteError::NotNumeric {
            column: column.to_string(),
            value: raw.to_string(),
        })?;

    if required == Required::Price && !(value.is_finite() && value > 0.0) {
        return Err(QuoteError::NonPositivePrice {
            column: column.to_string(),
            value,
        });
    }
    Ok(value)
}

/// Resolved column positions for one table.
struct ColumnMap {
    code: usize,
    name: usize,
    current_price: usize,
    high: usize,
    low: usize,
    previous_close: usize,
    open: usize,
    volume: Option<usize>,
    bids: Vec<usize>,
    asks: Vec<usize>,
    margin_buy: Option<usize>,
    margin_sell: Option<usize>,
    timestamp: Option<usize>,
}

impl ColumnMap {
    fn resolve(table: &RawTable, layout: &ColumnLayout, tagged: bool) -> Result<Self, QuoteError> {
        let index = table.column_index();
        let find = |name: &str| index.get(normalize_header(name).as_str()).copied();
        let require = |name: &str| find(name).ok_or_else(|| QuoteError::MissingColumn(name.to_string()));

        let timestamp = if tagged {
            Some(require(&layout.timestamp)?)
        } else {
            None
        };

        Ok(Self {
            code: require(&layout.code)?,
            name: require(&layout.name)?,
            current_price: require(&layout.current_price)?,
            high: require(&layout.high)?,
            low: require(&layout.low)?,
            previous_close: require(&layout.previous_close)?,
            open: require(&layout.open)?,
            volume: find(&layout.volume),
            bids: layout
                .bid_quantities
                .iter()
                .map(|c| require(c))
                .collect::<Result<_, _>>()?,
            asks: layout
                .ask_quantities
                .iter()
                .map(|c| require(c))
                .collect::<Result<_, _>>()?,
            margin_buy: find(&layout.margin_buy),
            margin_sell: find(&layout.margin_sell),
            timestamp,
        })
    }
}

/// Converts snapshot bytes into a validated [`QuoteTable`].
#[derive(Debug, Clone)]
pub struct QuoteLoader {
    layout: ColumnLayout,
    price_band: PriceBandConfig,
}

impl QuoteLoader {
    pub fn new(layout: ColumnLayout, price_band: PriceBandConfig) -> Self {
        Self { layout, price_band }
    }

    /// Load one snapshot whose rows embed their own bar history.
    pub fn load_snapshot(&self, bytes: &[u8]) -> Result<QuoteTable> {
        let table = read_csv_table(bytes)?;
        let (rows, skipped) = self.parse_rows(&table, None, true);
        info!(
            "Parsed snapshot: {} rows accepted, {} skipped",
            rows.len(),
            skipped.len()
        );
        let mut quotes = QuoteTable::from_single_snapshot(rows, skipped);
        quotes.apply_price_band(&self.price_band);
        Ok(quotes)
    }

    /// Load a day of snapshots given as `(time, bytes)` pairs. Snapshots that
    /// fail to decode are logged and left out; if none decode the whole batch
    /// fails.
    pub fn load_snapshots(&self, snapshots: &[(String, Vec<u8>)]) -> Result<QuoteTable> {
        let mut all_rows = Vec::new();
        let mut all_skipped = Vec::new();
        let mut decoded = 0;

        for (time, bytes) in snapshots {
            let table = match read_csv_table(bytes) {
                Ok(table) => table,
                Err(e) => {
                    warn!("Skipping unreadable snapshot {}: {:#}", time, e);
                    continue;
                }
            };
            decoded += 1;
            let (rows, skipped) = self.parse_rows(&table, Some(time), false);
            debug!("Snapshot {}: {} rows, {} skipped", time, rows.len(), skipped.len());
            all_rows.extend(rows);
            all_skipped.extend(skipped);
        }

        if decoded == 0 {
            return Err(anyhow!("No readable snapshots among {}", snapshots.len()));
        }

        let mut quotes = QuoteTable::from_snapshots(all_rows, all_skipped);
        quotes.apply_price_band(&self.price_band);
        Ok(quotes)
    }

    /// Load one file holding several snapshots distinguished by the
    /// timestamp tag column.
    pub fn load_tagged(&self, bytes: &[u8]) -> Result<QuoteTable> {
        let table = read_csv_table(bytes)?;
        let (rows, skipped) = self.parse_tagged_rows(&table);
        let mut quotes = QuoteTable::from_snapshots(rows, skipped);
        quotes.apply_price_band(&self.price_band);
        Ok(quotes)
    }

    fn parse_tagged_rows(&self, table: &RawTable) -> (Vec<QuoteSnapshot>, Vec<SkippedRow>) {
        let columns = match ColumnMap::resolve(table, &self.layout, true) {
            Ok(columns) => columns,
            Err(e) => return (Vec::new(), self.skip_all(table, e)),
        };
        let mut rows = Vec::new();
        let mut skipped = Vec::new();
        for (i, row) in table.rows.iter().enumerate() {
            let tag = columns.timestamp.and_then(|idx| cell(row, idx));
            let result = match tag {
                Some(tag) => self.parse_row(row, &columns, Some(tag), false),
                None => Err(QuoteError::EmptyTimestamp),
            };
            self.collect(i, row, &columns, result, &mut rows, &mut skipped);
        }
        (rows, skipped)
    }

    fn parse_rows(
        &self,
        table: &RawTable,
        timestamp: Option<&str>,
        with_bars: bool,
    ) -> (Vec<QuoteSnapshot>, Vec<SkippedRow>) {
        let columns = match ColumnMap::resolve(table, &self.layout, false) {
            Ok(columns) => columns,
            Err(e) => return (Vec::new(), self.skip_all(table, e)),
        };
        let mut rows = Vec::new();
        let mut skipped = Vec::new();
        for (i, row) in table.rows.iter().enumerate() {
            let result = self.parse_row(row, &columns, timestamp, with_bars);
            self.collect(i, row, &columns, result, &mut rows, &mut skipped);
        }
        (rows, skipped)
    }

    fn collect(
        &self,
        index: usize,
        row: &[Option<String>],
        columns: &ColumnMap,
        result: Result<QuoteSnapshot, QuoteError>,
        rows: &mut Vec<QuoteSnapshot>,
        skipped: &mut Vec<SkippedRow>,
    ) {
        match result {
            Ok(snapshot) => rows.push(snapshot),
            Err(reason) => {
                let code = cell(row, columns.code).map(str::to_string);
                warn!(
                    "Skipping row {} ({}): {}",
                    index,
                    code.as_deref().unwrap_or("?"),
                    reason
                );
                skipped.push(SkippedRow {
                    row: index,
                    code,
                    reason,
                });
            }
        }
    }

    fn skip_all(&self, table: &RawTable, reason: QuoteError) -> Vec<SkippedRow> {
        warn!("Every row rejected: {}", reason);
        (0..table.rows.len())
            .map(|row| SkippedRow {
                row,
                code: None,
                reason: reason.clone(),
            })
            .collect()
    }

    fn parse_row(
        &self,
        row: &[Option<String>],
        columns: &ColumnMap,
        timestamp: Option<&str>,
        with_bars: bool,
    ) -> Result<QuoteSnapshot, QuoteError> {
        let layout = &self.layout;
        let code = cell(row, columns.code).ok_or(QuoteError::EmptyCode)?;
        let name = cell(row, columns.name).unwrap_or_default();

        let number = |idx: usize, column: &str| parse_number(row, idx, column, Required::Optional);
        let optional = |idx: Option<usize>, column: &str| match idx {
            Some(idx) => number(idx, column),
            None => Ok(f64::NAN),
        };

        let current_price =
            parse_number(row, columns.current_price, &layout.current_price, Required::Price)?;
        let bid_quantities = columns
            .bids
            .iter()
            .zip(&layout.bid_quantities)
            .map(|(&idx, column)| number(idx, column))
            .collect::<Result<Vec<_>, _>>()?;
        let ask_quantities = columns
            .asks
            .iter()
            .zip(&layout.ask_quantities)
            .map(|(&idx, column)| number(idx, column))
            .collect::<Result<Vec<_>, _>>()?;

        let (bar_prices, bar_volumes) = if with_bars {
            self.parse_bars(row)?
        } else {
            (Vec::new(), Vec::new())
        };

        Ok(QuoteSnapshot {
            instrument: Instrument {
                code: code.to_string(),
                name: name.to_string(),
            },
            timestamp: timestamp.map(str::to_string),
            current_price,
            high: number(columns.high, &layout.high)?,
            low: number(columns.low, &layout.low)?,
            previous_close: number(columns.previous_close, &layout.previous_close)?,
            open: number(columns.open, &layout.open)?,
            volume: optional(columns.volume, &layout.volume)?,
            bid_quantities,
            ask_quantities,
            margin_buy: optional(columns.margin_buy, &layout.margin_buy)?,
            margin_sell: optional(columns.margin_sell, &layout.margin_sell)?,
            bar_prices,
            bar_volumes,
        })
    }

    fn parse_bars(&self, row: &[Option<String>]) -> Result<(Vec<f64>, Vec<f64>), QuoteError> {
        let layout = &self.layout;
        let available = row.len();
        let price_end = layout.price_bar_start + layout.bar_count;
        if price_end > available {
            return Err(QuoteError::BarOutOfRange {
                needed: price_end,
                available,
            });
        }
        let prices = (layout.price_bar_start..price_end)
            .map(|idx| parse_number(row, idx, &format!("bar#{}", idx), Required::Price))
            .collect::<Result<Vec<_>, _>>()?;

        let volumes = match layout.volume_bar_start {
            Some(start) if start + layout.bar_count <= available => (start..start + layout.bar_count)
                .map(|idx| parse_number(row, idx, &format!("bar#{}", idx), Required::Optional))
                .map(|v| v.map(|v| if v.is_nan() { 0.0 } else { v }))
                .collect::<Result<Vec<_>, _>>()?,
            _ => Vec::new(),
        };

        Ok((prices, volumes))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Build a snapshot CSV in the default layout: 31 leading columns, 26
    /// bar prices and 26 bar volumes.
    pub(crate) fn snapshot_csv(rows: &[(String, String, Vec<f64>, Vec<f64>)]) -> Vec<u8> {
        let layout = ColumnLayout::default();
        let mut headers: Vec<String> = vec![
            layout.code.clone(),
            format!(" {}　", layout.name),
            layout.current_price.clone(),
            layout.high.clone(),
            layout.low.clone(),
            layout.previous_close.clone(),
            layout.open.clone(),
            layout.volume.clone(),
        ];
        headers.extend(layout.bid_quantities.iter().cloned());
        headers.extend(layout.ask_quantities.iter().cloned());
        headers.push(layout.margin_buy.clone());
        headers.push(layout.margin_sell.clone());
        while headers.len() < layout.price_bar_start {
            headers.push(format!("extra{}", headers.len()));
        }
        headers.extend((0..layout.bar_count).map(|i| format!("price{}", i)));
        headers.extend((0..layout.bar_count).map(|i| format!("volume{}", i)));

        let mut out = headers.join(",");
        out.push('\n');
        for (code, current, prices, volumes) in rows {
            let last = prices.last().copied().unwrap_or(0.0);
            let mut cells: Vec<String> = vec![
                code.clone(),
                format!("Name{}", code),
                current.clone(),
                format!("{}", last + 10.0),
                format!("{}", last - 10.0),
                format!("{}", last),
                format!("{}", last),
                "100000".to_string(),
            ];
            cells.extend((0..5).map(|_| "200".to_string()));
            cells.extend((0..5).map(|_| "100".to_string()));
            cells.push("5000".to_string());
            cells.push("3000".to_string());
            while cells.len() < layout.price_bar_start {
                cells.push(String::new());
            }
            cells.extend(prices.iter().map(|p| p.to_string()));
            cells.extend(volumes.iter().map(|v| v.to_string()));
            out.push_str(&cells.join(","));
            out.push('\n');
        }
        out.into_bytes()
    }

    fn flat_row(code: &str, current: &str, price: f64) -> (String, String, Vec<f64>, Vec<f64>) {
        (
            code.to_string(),
            current.to_string(),
            vec![price; 26],
            vec![1000.0; 26],
        )
    }

    #[test]
    fn test_normalize_header_strips_full_width_space() {
        assert_eq!(normalize_header(" 現在値　"), "現在値");
        assert_eq!(normalize_header("最良 買気配数量1"), "最良買気配数量1");
    }

    #[test]
    fn test_load_snapshot_parses_typed_rows() {
        let csv = snapshot_csv(&[flat_row("7203", "2500", 2500.0)]);
        let loader = QuoteLoader::new(ColumnLayout::default(), PriceBandConfig::default());
        let table = loader.load_snapshot(&csv).unwrap();

        assert_eq!(table.len(), 1);
        let series = table.get("7203").unwrap();
        assert_eq!(series.instrument.name, "Name7203");
        assert_eq!(series.latest.current_price, 2500.0);
        assert_eq!(series.latest.high, 2510.0);
        assert_eq!(series.latest.bid_quantities, vec![200.0; 5]);
        assert_eq!(series.latest.margin_buy, 5000.0);
        assert_eq!(series.history.len(), 26);
        assert_eq!(series.history.volumes()[0], 1000.0);
    }

    #[test]
    fn test_non_numeric_price_skips_only_that_row() {
        let csv = snapshot_csv(&[
            flat_row("1111", "abc", 1000.0),
            flat_row("2222", "1000", 1000.0),
        ]);
        let loader = QuoteLoader::new(ColumnLayout::default(), PriceBandConfig::default());
        let table = loader.load_snapshot(&csv).unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.skipped().len(), 1);
        assert_eq!(table.skipped()[0].code.as_deref(), Some("1111"));
        assert!(matches!(
            table.skipped()[0].reason,
            QuoteError::NotNumeric { .. }
        ));
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let csv = snapshot_csv(&[flat_row("1111", "0", 1000.0)]);
        let loader = QuoteLoader::new(ColumnLayout::default(), PriceBandConfig::default());
        let table = loader.load_snapshot(&csv).unwrap();
        assert!(table.is_empty());
        assert!(matches!(
            table.skipped()[0].reason,
            QuoteError::NonPositivePrice { .. }
        ));
    }

    #[test]
    fn test_missing_required_column_skips_every_row() {
        let csv = "code,price\n1111,100\n2222,200\n";
        let loader = QuoteLoader::new(ColumnLayout::default(), PriceBandConfig::default());
        let table = loader.load_snapshot(csv.as_bytes()).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.skipped().len(), 2);
        assert!(matches!(
            table.skipped()[0].reason,
            QuoteError::MissingColumn(_)
        ));
    }

    #[test]
    fn test_load_snapshots_orders_by_time() {
        let layout = ColumnLayout {
            bar_count: 0,
            volume_bar_start: None,
            ..ColumnLayout::default()
        };
        let loader = QuoteLoader::new(layout, PriceBandConfig::default());
        let later = snapshot_csv(&[flat_row("7203", "2520", 2520.0)]);
        let earlier = snapshot_csv(&[flat_row("7203", "2500", 2500.0)]);
        let snapshots = vec![
            ("1010".to_string(), later),
            ("1000".to_string(), earlier),
            ("1020".to_string(), b"\xff\xfe not csv".to_vec()),
        ];

        let table = loader.load_snapshots(&snapshots).unwrap();
        let series = table.get("7203").unwrap();
        assert_eq!(series.history.closes(), &[2500.0, 2520.0]);
        assert_eq!(series.history.timestamps(), &["1000", "1010"]);
        assert_eq!(series.latest.current_price, 2520.0);
    }

    #[test]
    fn test_load_tagged_concatenates_per_instrument() {
        let csv = "取得時刻,銘柄コード,銘柄名称,現在値,高値,安値,前日終値,始値,出来高,\
最良買気配数量1,最良買気配数量2,最良買気配数量3,最良買気配数量4,最良買気配数量5,\
最良売気配数量1,最良売気配数量2,最良売気配数量3,最良売気配数量4,最良売気配数量5\n\
1010,7203,Toyota,2510,2515,2490,2480,2490,2000,1,1,1,1,1,1,1,1,1,1\n\
1000,7203,Toyota,2500,2505,2490,2480,2490,1000,1,1,1,1,1,1,1,1,1,1\n\
1000,6758,Sony,3000,3010,2990,2990,2995,500,1,1,1,1,1,1,1,1,1,1\n\
,6758,Sony,3000,3010,2990,2990,2995,500,1,1,1,1,1,1,1,1,1,1\n";
        let loader = QuoteLoader::new(ColumnLayout::default(), PriceBandConfig::default());
        let table = loader.load_tagged(csv.as_bytes()).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.skipped().len(), 1);
        assert_eq!(table.skipped()[0].reason, QuoteError::EmptyTimestamp);
        let toyota = table.get("7203").unwrap();
        assert_eq!(toyota.history.closes(), &[2500.0, 2510.0]);
        assert_eq!(toyota.history.highs(), &[2505.0, 2515.0]);
        assert_eq!(toyota.history.volumes(), &[1000.0, 2000.0]);
        assert!(toyota.latest.margin_buy.is_nan());
    }
}
