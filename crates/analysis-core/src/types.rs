use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// Hard cap on the fetchable date window, in days.
pub const MAX_RANGE_DAYS: i64 = 400;

/// Window used when the caller omits the start date, in days.
pub const DEFAULT_LOOKBACK_DAYS: i64 = 300;

/// A validated ticker symbol: 2-10 uppercase alphanumerics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Normalize (trim + uppercase) and validate a raw symbol.
    pub fn parse(raw: &str) -> Result<Self, AnalysisError> {
        let normalized = raw.trim().to_uppercase();
        if normalized.len() < 2 || normalized.len() > 10 {
            return Err(AnalysisError::Validation(format!(
                "symbol '{raw}' must be 2-10 characters"
            )));
        }
        if !normalized.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AnalysisError::Validation(format!(
                "symbol '{raw}' must be alphanumeric"
            )));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bar interval supported by the market-data vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    Min1,
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1H")]
    Hour1,
    #[serde(rename = "4H")]
    Hour4,
    #[default]
    #[serde(rename = "1D")]
    Day1,
    #[serde(rename = "1W")]
    Week1,
    #[serde(rename = "1M")]
    Month1,
}

impl Interval {
    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Min1 => "1m",
            Interval::Min5 => "5m",
            Interval::Min15 => "15m",
            Interval::Min30 => "30m",
            Interval::Hour1 => "1H",
            Interval::Hour4 => "4H",
            Interval::Day1 => "1D",
            Interval::Week1 => "1W",
            Interval::Month1 => "1M",
        }
    }

    /// Parse the wire label; empty input falls back to the default (1D).
    pub fn parse(raw: &str) -> Result<Self, AnalysisError> {
        match raw.trim() {
            "" => Ok(Interval::default()),
            "1m" => Ok(Interval::Min1),
            "5m" => Ok(Interval::Min5),
            "15m" => Ok(Interval::Min15),
            "30m" => Ok(Interval::Min30),
            "1H" => Ok(Interval::Hour1),
            "4H" => Ok(Interval::Hour4),
            "1D" => Ok(Interval::Day1),
            "1W" => Ok(Interval::Week1),
            "1M" => Ok(Interval::Month1),
            other => Err(AnalysisError::Validation(format!(
                "unknown interval '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three Vietnamese exchanges making up the investable universe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    #[serde(rename = "HOSE")]
    Hose,
    #[serde(rename = "HNX")]
    Hnx,
    #[serde(rename = "UPCOM")]
    Upcom,
}

impl Exchange {
    pub const ALL: [Exchange; 3] = [Exchange::Hose, Exchange::Hnx, Exchange::Upcom];

    pub fn as_str(&self) -> &'static str {
        match self {
            Exchange::Hose => "HOSE",
            Exchange::Hnx => "HNX",
            Exchange::Upcom => "UPCOM",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, AnalysisError> {
        match raw.trim().to_uppercase().as_str() {
            "HOSE" => Ok(Exchange::Hose),
            "HNX" => Ok(Exchange::Hnx),
            "UPCOM" => Ok(Exchange::Upcom),
            other => Err(AnalysisError::Validation(format!(
                "unknown exchange '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated request for one symbol's price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataQuery {
    pub symbol: Symbol,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub interval: Interval,
}

impl MarketDataQuery {
    /// Build and validate a query. Empty `end_date` defaults to today, empty
    /// `start_date` to `end_date - 300 days`. The window must satisfy
    /// start <= end <= today and span at most 400 days.
    pub fn new(
        symbol: Symbol,
        start_date: &str,
        end_date: &str,
        interval: Interval,
    ) -> Result<Self, AnalysisError> {
        Self::new_as_of(symbol, start_date, end_date, interval, Utc::now().date_naive())
    }

    /// Like [`MarketDataQuery::new`] with an explicit "today" for testability.
    pub fn new_as_of(
        symbol: Symbol,
        start_date: &str,
        end_date: &str,
        interval: Interval,
        today: NaiveDate,
    ) -> Result<Self, AnalysisError> {
        let end = if end_date.trim().is_empty() {
            today
        } else {
            parse_date(end_date)?
        };
        let start = if start_date.trim().is_empty() {
            end - Duration::days(DEFAULT_LOOKBACK_DAYS)
        } else {
            parse_date(start_date)?
        };

        if end < start {
            return Err(AnalysisError::Validation(format!(
                "end_date {end} is before start_date {start}"
            )));
        }
        if end > today {
            return Err(AnalysisError::Validation(format!(
                "end_date {end} is in the future"
            )));
        }
        let span = (end - start).num_days();
        if span > MAX_RANGE_DAYS {
            return Err(AnalysisError::Validation(format!(
                "date range of {span} days exceeds the {MAX_RANGE_DAYS}-day limit"
            )));
        }

        Ok(Self {
            symbol,
            start_date: start,
            end_date: end,
            interval,
        })
    }
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, AnalysisError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AnalysisError::Validation(format!("invalid date '{raw}', expected YYYY-MM-DD")))
}

/// One daily OHLCV bar, validated on ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl PriceBar {
    pub fn new(
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: i64,
    ) -> Result<Self, AnalysisError> {
        for (name, value) in [("open", open), ("high", high), ("low", low), ("close", close)] {
            if !value.is_finite() || value < 0.0 {
                return Err(AnalysisError::Validation(format!(
                    "{name} price {value} on {date} is not a finite non-negative number"
                )));
            }
        }
        if high < low {
            return Err(AnalysisError::Validation(format!(
                "high {high} below low {low} on {date}"
            )));
        }
        if close > high || close < low {
            return Err(AnalysisError::Validation(format!(
                "close {close} outside [{low}, {high}] on {date}"
            )));
        }
        if volume < 0 {
            return Err(AnalysisError::Validation(format!(
                "negative volume {volume} on {date}"
            )));
        }
        Ok(Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

/// One symbol's normalized price history from the vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockData {
    pub symbol: String,
    pub price_history: Vec<PriceBar>,
}

/// A (symbol, exchange) pair from the vendor's universe listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockListing {
    pub symbol: String,
    pub exchange: Exchange,
}

/// A close-price point augmented with its Wilder RSI value.
/// RSI is 0.0 inside the first `period` bars (undefined zone).
#[derive(Debug, Clone, PartialEq)]
pub struct PriceDataWithRsi {
    pub index: usize,
    pub date: NaiveDate,
    pub close: f64,
    pub rsi: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PivotKind {
    High,
    Low,
}

/// A confirmed local extremum in the RSI series.
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot {
    pub index: usize,
    pub date: NaiveDate,
    pub price: f64,
    pub rsi: f64,
    pub kind: PivotKind,
}

/// Polarity of a detected divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DivergenceType {
    #[default]
    None,
    Bullish,
    Bearish,
}

impl DivergenceType {
    pub fn label(&self) -> &'static str {
        match self {
            DivergenceType::None => "None",
            DivergenceType::Bullish => "Bullish",
            DivergenceType::Bearish => "Bearish",
        }
    }
}

/// Outcome of one divergence analysis for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub symbol: String,
    pub divergence_type: DivergenceType,
    pub divergence_found: bool,
    pub current_price: f64,
    pub current_rsi: f64,
    pub description: String,
    pub processing_time_ms: u64,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub interval: Interval,
    pub rsi_period: usize,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_signal_detected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub early_description: Option<String>,
}

/// Price ratios over the five ranking windows. A ratio is 0.0 iff the
/// series is too short for that window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodReturns {
    pub p1: f64,
    pub p3: f64,
    pub p6: f64,
    pub p9: f64,
    pub p12: f64,
}

/// Per-symbol screener metrics with cross-sectional percentile ranks.
/// RS fields are 0 (no data) or 1..=99.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMetrics {
    pub symbol: String,
    pub exchange: Exchange,
    pub period_returns: PeriodReturns,
    pub current_volume: i64,
    pub volume_sma20: f64,
    pub rs_1m: i64,
    pub rs_3m: i64,
    pub rs_6m: i64,
    pub rs_9m: i64,
    pub rs_52w: i64,
}

/// Immutable result of one refresh run. Published wholesale; readers see
/// either this snapshot or the previous one, never a mix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMetricsSnapshot {
    pub calculated_at: DateTime<Utc>,
    pub stocks: Vec<StockMetrics>,
}

/// One predicate of a screener filter request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    #[serde(alias = "operator")]
    pub op: String,
    pub value: f64,
}

/// Compound screener filter: conditions joined by `logic`, optionally
/// restricted to an exchange allow-list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerFilterRequest {
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    #[serde(default = "default_filter_logic")]
    pub logic: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchanges: Option<Vec<String>>,
}

fn default_filter_logic() -> String {
    "and".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbol_normalizes_case_and_whitespace() {
        let s = Symbol::parse("  vnm ").unwrap();
        assert_eq!(s.as_str(), "VNM");
    }

    #[test]
    fn symbol_rejects_bad_input() {
        assert!(Symbol::parse("A").is_err());
        assert!(Symbol::parse("TOOLONGSYMBOL").is_err());
        assert!(Symbol::parse("VN-M").is_err());
    }

    #[test]
    fn interval_round_trips_wire_labels() {
        for label in ["1m", "5m", "15m", "30m", "1H", "4H", "1D", "1W", "1M"] {
            assert_eq!(Interval::parse(label).unwrap().as_str(), label);
        }
        assert_eq!(Interval::parse("").unwrap(), Interval::Day1);
        assert!(Interval::parse("2D").is_err());
    }

    #[test]
    fn query_defaults_empty_dates() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
        let q = MarketDataQuery::new_as_of(
            Symbol::parse("FPT").unwrap(),
            "",
            "",
            Interval::Day1,
            today,
        )
        .unwrap();
        assert_eq!(q.end_date, today);
        assert_eq!(q.start_date, today - Duration::days(DEFAULT_LOOKBACK_DAYS));
    }

    #[test]
    fn query_rejects_bad_windows() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 28).unwrap();
        let sym = || Symbol::parse("FPT").unwrap();
        // end before start
        assert!(
            MarketDataQuery::new_as_of(sym(), "2024-06-10", "2024-06-01", Interval::Day1, today)
                .is_err()
        );
        // end in the future
        assert!(
            MarketDataQuery::new_as_of(sym(), "2024-06-01", "2024-07-01", Interval::Day1, today)
                .is_err()
        );
        // wider than 400 days
        assert!(
            MarketDataQuery::new_as_of(sym(), "2023-01-01", "2024-06-01", Interval::Day1, today)
                .is_err()
        );
    }

    #[test]
    fn price_bar_enforces_ohlc_invariants() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        assert!(PriceBar::new(date, 10.0, 11.0, 9.0, 10.5, 1000).is_ok());
        // high below low
        assert!(PriceBar::new(date, 10.0, 9.0, 11.0, 10.0, 1000).is_err());
        // close above high
        assert!(PriceBar::new(date, 10.0, 11.0, 9.0, 12.0, 1000).is_err());
        // negative price
        assert!(PriceBar::new(date, -1.0, 11.0, 9.0, 10.0, 1000).is_err());
        // non-finite price
        assert!(PriceBar::new(date, f64::NAN, 11.0, 9.0, 10.0, 1000).is_err());
    }
}
