use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, ScreenerFilterRequest, Symbol};

/// Parameters of the pivot/divergence scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergenceConfig {
    /// Bars to the left of a candidate pivot that must be strictly lower
    /// (highs) or higher (lows).
    pub lookback_left: usize,
    /// Bars to the right, truncated at the series edge.
    pub lookback_right: usize,
    /// Minimum index distance between paired pivots.
    pub range_min: usize,
    /// Maximum index distance between paired pivots.
    pub range_max: usize,
    /// Tail window (bar count) the analysis operates on.
    pub indices_recent: usize,
}

impl Default for DivergenceConfig {
    fn default() -> Self {
        Self {
            lookback_left: 5,
            lookback_right: 5,
            range_min: 5,
            range_max: 60,
            indices_recent: 100,
        }
    }
}

impl DivergenceConfig {
    /// Minimum series length for any pivot to be confirmable.
    pub fn min_data_points(&self) -> usize {
        self.lookback_left + self.lookback_right + 1
    }

    /// Collect field-level violations into `messages`.
    pub fn collect_violations(&self, messages: &mut Vec<String>) {
        if self.lookback_left == 0 {
            messages.push("divergence.lookback_left must be positive".to_string());
        }
        if self.lookback_right == 0 {
            messages.push("divergence.lookback_right must be positive".to_string());
        }
        if self.range_min == 0 {
            messages.push("divergence.range_min must be positive".to_string());
        }
        if self.range_max == 0 {
            messages.push("divergence.range_max must be positive".to_string());
        }
        if self.indices_recent == 0 {
            messages.push("divergence.indices_recent must be positive".to_string());
        }
        if self.range_min > self.range_max {
            messages.push(format!(
                "divergence.range_min {} exceeds range_max {}",
                self.range_min, self.range_max
            ));
        }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        let mut messages = Vec::new();
        self.collect_violations(&mut messages);
        if messages.is_empty() {
            Ok(())
        } else {
            Err(AnalysisError::ConfigValidation(messages))
        }
    }
}

/// Per-config Telegram notification settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramSettings {
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
}

/// A named, saved screener filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenerFilterPreset {
    pub name: String,
    pub request: ScreenerFilterRequest,
}

/// Which watchlist a mutation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchlistKind {
    Bullish,
    Bearish,
}

/// A keyed analysis profile: RSI/divergence parameters, watchlists and
/// notification settings. CRUD-managed through the config repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    pub id: String,
    pub rsi_period: usize,
    /// Days of history pulled for each scheduled analysis.
    pub start_date_offset: i64,
    pub divergence: DivergenceConfig,
    pub early_detection_enabled: bool,
    #[serde(default)]
    pub bearish_symbols: Vec<String>,
    #[serde(default)]
    pub bullish_symbols: Vec<String>,
    #[serde(default)]
    pub telegram: TelegramSettings,
    #[serde(default)]
    pub screener_filter_presets: Vec<ScreenerFilterPreset>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TradingConfig {
    /// A fresh config with library defaults for the given id.
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            rsi_period: 14,
            start_date_offset: 90,
            divergence: DivergenceConfig::default(),
            early_detection_enabled: false,
            bearish_symbols: Vec::new(),
            bullish_symbols: Vec::new(),
            telegram: TelegramSettings::default(),
            screener_filter_presets: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Validate every invariant, accumulating per-field messages.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let mut messages = Vec::new();

        if !valid_config_id(&self.id) {
            messages.push(format!(
                "id '{}' must be 2-50 characters of [A-Za-z0-9_-]",
                self.id
            ));
        }
        if self.rsi_period == 0 {
            messages.push("rsi_period must be positive".to_string());
        }
        if self.start_date_offset <= 0 {
            messages.push("start_date_offset must be positive".to_string());
        }
        self.divergence.collect_violations(&mut messages);
        if self.bearish_symbols.is_empty() && self.bullish_symbols.is_empty() {
            messages.push("at least one of bearish_symbols/bullish_symbols must be non-empty".to_string());
        }
        if self.telegram.enabled {
            if self.telegram.bot_token.trim().is_empty() {
                messages.push("telegram.bot_token required when telegram is enabled".to_string());
            }
            if self.telegram.chat_id.trim().is_empty() {
                messages.push("telegram.chat_id required when telegram is enabled".to_string());
            }
        }

        if messages.is_empty() {
            Ok(())
        } else {
            Err(AnalysisError::ConfigValidation(messages))
        }
    }

    pub fn symbols_for(&self, kind: WatchlistKind) -> &[String] {
        match kind {
            WatchlistKind::Bullish => &self.bullish_symbols,
            WatchlistKind::Bearish => &self.bearish_symbols,
        }
    }

    /// Set union: appends symbols not already present, preserving order.
    pub fn add_symbols(&mut self, kind: WatchlistKind, symbols: &[Symbol]) {
        let list = self.symbols_for_mut(kind);
        for sym in symbols {
            if !list.iter().any(|s| s == sym.as_str()) {
                list.push(sym.as_str().to_string());
            }
        }
        self.updated_at = Utc::now();
    }

    /// Set difference: removes exactly the given symbols.
    pub fn remove_symbols(&mut self, kind: WatchlistKind, symbols: &[Symbol]) {
        let list = self.symbols_for_mut(kind);
        list.retain(|s| !symbols.iter().any(|sym| sym.as_str() == s));
        self.updated_at = Utc::now();
    }

    fn symbols_for_mut(&mut self, kind: WatchlistKind) -> &mut Vec<String> {
        match kind {
            WatchlistKind::Bullish => &mut self.bullish_symbols,
            WatchlistKind::Bearish => &mut self.bearish_symbols,
        }
    }
}

fn valid_config_id(id: &str) -> bool {
    (2..=50).contains(&id.len())
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> TradingConfig {
        let mut cfg = TradingConfig::new("desk-1");
        cfg.bearish_symbols = vec!["VNM".to_string(), "FPT".to_string()];
        cfg
    }

    #[test]
    fn default_config_with_watchlist_is_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn validation_accumulates_field_messages() {
        let mut cfg = valid_config();
        cfg.id = "x".to_string();
        cfg.rsi_period = 0;
        cfg.divergence.range_min = 50;
        cfg.divergence.range_max = 10;
        let err = cfg.validate().unwrap_err();
        match err {
            AnalysisError::ConfigValidation(messages) => {
                assert_eq!(messages.len(), 3);
            }
            other => panic!("expected ConfigValidation, got {other:?}"),
        }
    }

    #[test]
    fn empty_watchlists_are_rejected() {
        let cfg = TradingConfig::new("desk-1");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn telegram_requires_token_and_chat() {
        let mut cfg = valid_config();
        cfg.telegram.enabled = true;
        let err = cfg.validate().unwrap_err();
        match err {
            AnalysisError::ConfigValidation(messages) => assert_eq!(messages.len(), 2),
            other => panic!("expected ConfigValidation, got {other:?}"),
        }
    }

    #[test]
    fn add_symbols_is_idempotent() {
        let mut cfg = valid_config();
        let syms = vec![Symbol::parse("HPG").unwrap(), Symbol::parse("VNM").unwrap()];
        cfg.add_symbols(WatchlistKind::Bearish, &syms);
        cfg.add_symbols(WatchlistKind::Bearish, &syms);
        assert_eq!(cfg.bearish_symbols, vec!["VNM", "FPT", "HPG"]);
    }

    #[test]
    fn remove_symbols_removes_exactly_the_given_set() {
        let mut cfg = valid_config();
        cfg.remove_symbols(WatchlistKind::Bearish, &[Symbol::parse("VNM").unwrap()]);
        assert_eq!(cfg.bearish_symbols, vec!["FPT"]);
    }
}
