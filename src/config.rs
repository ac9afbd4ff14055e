use crate::report::ReportFormat;
use crate::signals::core::{ClassifierPolicy, DetectorKind};
use anyhow::{Result, anyhow};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub columns: ColumnLayout,
    #[serde(default)]
    pub price_band: PriceBandConfig,
    #[serde(default)]
    pub indicators: IndicatorConfig,
    #[serde(default)]
    pub volume_spike: VolumeSpikeConfig,
    #[serde(default)]
    pub detectors: DetectorConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

/// How snapshots are turned into series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotMode {
    /// One file per cycle, each row carrying its own embedded bar history
    Single,
    /// Every snapshot of the day concatenated per instrument
    Multi,
    /// One file per cycle holding several snapshots told apart by the
    /// timestamp tag column
    Tagged,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
    pub mode: SnapshotMode,
    pub poll_interval_secs: u64,
    /// Exchange offset from UTC used to build the date/time keys
    pub utc_offset_hours: i32,
    /// Environment variable holding the store access token, if the store
    /// needs one
    pub token_env: Option<String>,
    pub token_lifetime_secs: i64,
    /// Fixed date (`YYYYMMDD`) to replay instead of the live clock
    pub replay_date: Option<String>,
    /// Times (`HHMM`) processed in replay mode
    pub replay_times: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("snapshots"),
            file_prefix: "kabuteku".to_string(),
            mode: SnapshotMode::Single,
            poll_interval_secs: 60,
            utc_offset_hours: 9,
            token_env: None,
            token_lifetime_secs: 4 * 60 * 60,
            replay_date: None,
            replay_times: Vec::new(),
        }
    }
}

/// Header names (after whitespace stripping) and positional bar blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnLayout {
    pub code: String,
    pub name: String,
    pub current_price: String,
    pub high: String,
    pub low: String,
    pub previous_close: String,
    pub open: String,
    pub volume: String,
    pub bid_quantities: Vec<String>,
    pub ask_quantities: Vec<String>,
    pub margin_buy: String,
    pub margin_sell: String,
    /// Tag column used when several snapshots share one file
    pub timestamp: String,
    /// Zero-based position of the first embedded bar price column
    pub price_bar_start: usize,
    pub bar_count: usize,
    /// Zero-based position of the first embedded bar volume column
    pub volume_bar_start: Option<usize>,
}

impl Default for ColumnLayout {
    fn default() -> Self {
        Self {
            code: "銘柄コード".to_string(),
            name: "銘柄名称".to_string(),
            current_price: "現在値".to_string(),
            high: "高値".to_string(),
            low: "安値".to_string(),
            previous_close: "前日終値".to_string(),
            open: "始値".to_string(),
            volume: "出来高".to_string(),
            bid_quantities: (1..=5).map(|i| format!("最良買気配数量{}", i)).collect(),
            ask_quantities: (1..=5).map(|i| format!("最良売気配数量{}", i)).collect(),
            margin_buy: "信用買残".to_string(),
            margin_sell: "信用売残".to_string(),
            timestamp: "取得時刻".to_string(),
            price_bar_start: 31,
            bar_count: 26,
            volume_bar_start: Some(57),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceBandConfig {
    pub enabled: bool,
    pub min_price: f64,
    pub max_price: f64,
}

impl Default for PriceBandConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_price: 500.0,
            max_price: 20000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub rsi_period: usize,
    pub macd_short: usize,
    pub macd_long: usize,
    pub macd_signal: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            rsi_period: 14,
            macd_short: 12,
            macd_long: 26,
            macd_signal: 9,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeSpikeConfig {
    /// Bars spanned by the volume change ratio (oldest bar to latest bar)
    pub window: usize,
    pub iqr_multiplier: f64,
}

impl Default for VolumeSpikeConfig {
    fn default() -> Self {
        Self {
            window: 5,
            iqr_multiplier: 1.5,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub trend: TrendConfig,
    pub crossover: CrossoverConfig,
    pub box_range: BoxRangeConfig,
    pub breakout: BreakoutConfig,
    pub volume_spike: SpikeDetectorConfig,
    pub double_pattern: DoublePatternConfig,
    pub momentum: MomentumConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    /// Number of trailing highs/lows that must be strictly ordered
    pub lookback: usize,
    pub ma_short: usize,
    pub ma_mid: usize,
    pub ma_long: usize,
    pub rsi_up_threshold: f64,
    pub rsi_down_threshold: f64,
    pub volume_window: usize,
    pub volatility_window: usize,
    pub max_volatility: f64,
    pub pullback_lookback: usize,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            lookback: 5,
            ma_short: 5,
            ma_mid: 25,
            ma_long: 60,
            rsi_up_threshold: 40.0,
            rsi_down_threshold: 60.0,
            volume_window: 5,
            volatility_window: 10,
            max_volatility: 0.05,
            pullback_lookback: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrossoverConfig {
    pub ma_short: usize,
    pub ma_mid: usize,
    pub use_slope_filter: bool,
    pub slope_lookback: usize,
    pub use_confirmation: bool,
    pub confirm_bars: usize,
    pub use_volatility_filter: bool,
    pub volatility_window: usize,
    pub max_volatility: f64,
    pub use_rsi_filter: bool,
    pub rsi_midline: f64,
}

impl Default for CrossoverConfig {
    fn default() -> Self {
        Self {
            ma_short: 5,
            ma_mid: 20,
            use_slope_filter: true,
            slope_lookback: 1,
            use_confirmation: true,
            confirm_bars: 3,
            use_volatility_filter: false,
            volatility_window: 10,
            max_volatility: 0.05,
            use_rsi_filter: false,
            rsi_midline: 50.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxRangeConfig {
    pub lookback: usize,
    /// Maximum distance of the current price from the window mean, as a fraction
    pub mean_tolerance: f64,
    /// Position ratio at or above which the top edge counts as touched
    pub edge_threshold: f64,
    pub use_volume_filter: bool,
    pub volume_window: usize,
    pub volume_ratio: f64,
    pub use_volatility_filter: bool,
    pub volatility_window: usize,
    pub stability_ratio: f64,
}

impl Default for BoxRangeConfig {
    fn default() -> Self {
        Self {
            lookback: 20,
            mean_tolerance: 0.05,
            edge_threshold: 0.8,
            use_volume_filter: false,
            volume_window: 5,
            volume_ratio: 1.2,
            use_volatility_filter: false,
            volatility_window: 5,
            stability_ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakoutConfig {
    pub lookback: usize,
    pub volume_ratio: f64,
    pub use_volatility_filter: bool,
    pub volatility_window: usize,
    pub volatility_ratio: f64,
}

impl Default for BreakoutConfig {
    fn default() -> Self {
        Self {
            lookback: 20,
            volume_ratio: 1.5,
            use_volatility_filter: false,
            volatility_window: 5,
            volatility_ratio: 1.2,
        }
    }
}

/// Reversal/continuation call on instruments flagged by the batch volume
/// spike threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeDetectorConfig {
    pub ma_short: usize,
    pub ma_mid: usize,
    pub rsi_period: usize,
    pub rsi_midline: f64,
    /// A reversal up needs RSI at or below this within `reversal_lookback` bars
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub reversal_lookback: usize,
}

impl Default for SpikeDetectorConfig {
    fn default() -> Self {
        Self {
            ma_short: 5,
            ma_mid: 20,
            rsi_period: 14,
            rsi_midline: 50.0,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            reversal_lookback: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DoublePatternConfig {
    pub lookback: usize,
    /// Maximum relative difference between the two pivots
    pub tolerance: f64,
    pub volume_ratio: f64,
    pub use_volatility_filter: bool,
    pub volatility_window: usize,
    pub volatility_ratio: f64,
}

impl Default for DoublePatternConfig {
    fn default() -> Self {
        Self {
            lookback: 20,
            tolerance: 0.02,
            volume_ratio: 1.5,
            use_volatility_filter: false,
            volatility_window: 5,
            volatility_ratio: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    pub rsi_buy_threshold: f64,
    pub rsi_sell_threshold: f64,
    pub rsi_trend_buy_threshold: f64,
    pub rsi_trend_sell_threshold: f64,
    /// Bars in the short trend average; the long average spans the whole series
    pub trend_lookback: usize,
    pub support_threshold: f64,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            rsi_buy_threshold: 45.0,
            rsi_sell_threshold: 55.0,
            rsi_trend_buy_threshold: 40.0,
            rsi_trend_sell_threshold: 60.0,
            trend_lookback: 5,
            support_threshold: 1.05,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub policy: ClassifierPolicy,
    pub detector_order: Vec<DetectorKind>,
    pub scoring: ScoringConfig,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            policy: ClassifierPolicy::FirstMatch,
            detector_order: DetectorKind::default_order(),
            scoring: ScoringConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub threshold: f64,
    pub rsi_buy_threshold: f64,
    pub rsi_sell_threshold: f64,
    pub trend_lookback: usize,
    pub board_balance_buy_threshold: f64,
    pub board_balance_sell_threshold: f64,
    pub gap_threshold: f64,
    pub support_threshold: f64,
    pub resistance_threshold: f64,
    pub volatility_window: usize,
    pub max_volatility: f64,
    pub weights: ScoreWeights,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            threshold: 4.0,
            rsi_buy_threshold: 45.0,
            rsi_sell_threshold: 55.0,
            trend_lookback: 5,
            board_balance_buy_threshold: 1.0,
            board_balance_sell_threshold: 1.0,
            gap_threshold: 0.01,
            support_threshold: 1.05,
            resistance_threshold: 0.95,
            volatility_window: 26,
            max_volatility: 0.05,
            weights: ScoreWeights::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub rsi: f64,
    pub macd: f64,
    pub trend: f64,
    pub volume_spike: f64,
    pub board_balance: f64,
    pub gap: f64,
    pub support_resistance: f64,
    pub low_volatility: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            rsi: 2.0,
            macd: 1.0,
            trend: 1.0,
            volume_spike: 1.0,
            board_balance: 1.0,
            gap: 0.5,
            support_resistance: 1.0,
            low_volatility: 0.5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub show_empty_categories: bool,
    pub format: ReportFormat,
    pub subject_prefix: String,
    pub disclaimer: Vec<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            show_empty_categories: false,
            format: ReportFormat::Text,
            subject_prefix: "Signal report".to_string(),
            disclaimer: vec![
                "This report is generated automatically from intraday quote snapshots.".to_string(),
                "It is informational only and is not a recommendation to trade.".to_string(),
                "Indicator values may be incomplete when history is short.".to_string(),
            ],
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file, falling back to defaults when the
    /// file does not exist.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: AppConfig = match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) => {
                warn!(
                    "Config file {} not readable ({}), using defaults",
                    path.display(),
                    e
                );
                AppConfig::default()
            }
        };

        config.validate()?;
        info!(
            "Loaded configuration: mode={:?}, policy={:?}, {} detectors",
            config.source.mode,
            config.classifier.policy,
            config.classifier.detector_order.len()
        );
        Ok(config)
    }

    /// Reject parameter combinations that make a detector meaningless.
    pub fn validate(&self) -> Result<()> {
        let ind = &self.indicators;
        if ind.rsi_period == 0 || ind.macd_short == 0 || ind.macd_long == 0 || ind.macd_signal == 0 {
            return Err(anyhow!("Indicator periods must be positive"));
        }
        if ind.macd_short >= ind.macd_long {
            return Err(anyhow!(
                "MACD short span ({}) must be below long span ({})",
                ind.macd_short,
                ind.macd_long
            ));
        }

        let trend = &self.detectors.trend;
        if !(trend.ma_short < trend.ma_mid && trend.ma_mid <= trend.ma_long) {
            return Err(anyhow!(
                "Trend moving averages must satisfy short < mid <= long, got {}/{}/{}",
                trend.ma_short,
                trend.ma_mid,
                trend.ma_long
            ));
        }

        let cross = &self.detectors.crossover;
        if cross.ma_short == 0 || cross.ma_short >= cross.ma_mid {
            return Err(anyhow!(
                "Crossover short MA ({}) must be positive and below mid MA ({})",
                cross.ma_short,
                cross.ma_mid
            ));
        }

        let spike = &self.detectors.volume_spike;
        if spike.ma_short == 0 || spike.ma_short >= spike.ma_mid || spike.rsi_period == 0 {
            return Err(anyhow!(
                "Volume spike detector needs 0 < short MA ({}) < mid MA ({}) and a positive RSI period",
                spike.ma_short,
                spike.ma_mid
            ));
        }

        let edge = self.detectors.box_range.edge_threshold;
        if !(0.5..=1.0).contains(&edge) {
            return Err(anyhow!(
                "Box edge threshold must be within [0.5, 1.0], got {}",
                edge
            ));
        }

        if self.price_band.enabled && self.price_band.min_price > self.price_band.max_price {
            return Err(anyhow!(
                "Price band min ({}) exceeds max ({})",
                self.price_band.min_price,
                self.price_band.max_price
            ));
        }

        if self.classifier.detector_order.is_empty()
            && self.classifier.policy == ClassifierPolicy::FirstMatch
        {
            return Err(anyhow!("First-match policy needs at least one detector"));
        }

        let layout = &self.columns;
        if layout.bid_quantities.len() != layout.ask_quantities.len() {
            return Err(anyhow!(
                "Bid and ask quantity columns must have equal depth ({} vs {})",
                layout.bid_quantities.len(),
                layout.ask_quantities.len()
            ));
        }

        Ok(())
    }
}
