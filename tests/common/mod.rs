use signalscan::config::ColumnLayout;

/// One instrument row of a default-layout snapshot.
pub struct Row {
    pub code: String,
    pub current: String,
    pub prices: Vec<f64>,
    pub volumes: Vec<f64>,
}

impl Row {
    pub fn new(code: &str, prices: Vec<f64>, volumes: Vec<f64>) -> Self {
        let current = prices.last().copied().unwrap_or(0.0).to_string();
        Self {
            code: code.to_string(),
            current,
            prices,
            volumes,
        }
    }

    pub fn flat(code: &str, price: f64) -> Self {
        Self::new(code, vec![price; 26], vec![1000.0; 26])
    }
}

/// Snapshot CSV with padded headers, filler columns up to the bar block, 26
/// bar prices and 26 bar volumes.
pub fn snapshot_csv(rows: &[Row]) -> Vec<u8> {
    let layout = ColumnLayout::default();
    let mut headers = vec![
        format!(" {} ", layout.code),
        layout.name.clone(),
        format!("{}　", layout.current_price),
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
        headers.push(format!("misc{}", headers.len()));
    }
    headers.extend((0..layout.bar_count).map(|i| format!("bar{}", i)));
    headers.extend((0..layout.bar_count).map(|i| format!("barvol{}", i)));

    let mut out = headers.join(",");
    out.push('\n');
    for row in rows {
        let last = row.prices.last().copied().unwrap_or(0.0);
        let mut cells = vec![
            row.code.clone(),
            format!("Company {}", row.code),
            row.current.clone(),
            (last + 10.0).to_string(),
            (last - 10.0).to_string(),
            last.to_string(),
            last.to_string(),
            "250000".to_string(),
        ];
        cells.extend((0..5).map(|_| "300".to_string()));
        cells.extend((0..5).map(|_| "300".to_string()));
        cells.push("12000".to_string());
        cells.push("8000".to_string());
        while cells.len() < layout.price_bar_start {
            cells.push(String::new());
        }
        cells.extend(row.prices.iter().map(|p| p.to_string()));
        cells.extend(row.volumes.iter().map(|v| v.to_string()));
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out.into_bytes()
}
