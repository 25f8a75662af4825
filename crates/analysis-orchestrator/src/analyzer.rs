use std::sync::Arc;
use std::time::Instant;

use analysis_core::{
    AnalysisError, AnalysisResult, ConfigRepository, DivergenceType, MarketDataGateway,
    MarketDataQuery, SymbolAnalyzer,
};
use async_trait::async_trait;
use chrono::Utc;
use technical_analysis::{rsi_series, DivergenceDetector};
use tokio_util::sync::CancellationToken;

/// One-symbol divergence analysis: fetch, RSI-augment the tail, scan pivot
/// pairs. Parameters come fresh from the stored config on every call, so
/// the analyzer itself carries no tunable state beyond its polarity.
pub struct DivergenceAnalyzer {
    gateway: Arc<dyn MarketDataGateway>,
    configs: Arc<dyn ConfigRepository>,
    polarity: DivergenceType,
}

impl DivergenceAnalyzer {
    pub fn new(
        gateway: Arc<dyn MarketDataGateway>,
        configs: Arc<dyn ConfigRepository>,
        polarity: DivergenceType,
    ) -> Self {
        Self {
            gateway,
            configs,
            polarity,
        }
    }
}

#[async_trait]
impl SymbolAnalyzer for DivergenceAnalyzer {
    async fn execute(
        &self,
        ctx: &CancellationToken,
        query: &MarketDataQuery,
        config_id: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        let started = Instant::now();

        let config = self.configs.get_config(config_id).await?;
        let stock_data = self.gateway.fetch_stock_data(ctx, query).await?;

        let indices_recent = config.divergence.indices_recent;
        let history = &stock_data.price_history;
        if history.len() < indices_recent {
            return Err(AnalysisError::InsufficientData(format!(
                "{}: {} bars fetched, {} required",
                query.symbol,
                history.len(),
                indices_recent
            )));
        }
        let tail = &history[history.len() - indices_recent..];

        let with_rsi = rsi_series(tail, config.rsi_period);
        if with_rsi.is_empty() {
            return Err(AnalysisError::InsufficientData(format!(
                "{}: {} bars cannot seed a {}-period RSI",
                query.symbol,
                tail.len(),
                config.rsi_period
            )));
        }

        let detector = DivergenceDetector::new(config.divergence)?;
        let detection = detector.detect(self.polarity, &with_rsi);

        // Latest bar with a defined RSI value, scanning from the tail back.
        let (current_price, current_rsi) = with_rsi
            .iter()
            .rev()
            .find(|d| d.rsi != 0.0)
            .map(|d| (d.close, d.rsi))
            .unwrap_or((0.0, 0.0));

        let mut result = AnalysisResult {
            symbol: query.symbol.to_string(),
            divergence_type: detection.divergence_type,
            divergence_found: detection.found,
            current_price,
            current_rsi,
            description: detection.description,
            processing_time_ms: started.elapsed().as_millis() as u64,
            start_date: query.start_date,
            end_date: query.end_date,
            interval: query.interval,
            rsi_period: config.rsi_period,
            timestamp: Utc::now(),
            early_signal_detected: None,
            early_description: None,
        };

        if self.polarity == DivergenceType::Bearish && config.early_detection_enabled {
            if let Some(description) = detector.detect_forming_bearish(&with_rsi) {
                result.early_signal_detected = Some(true);
                result.early_description = Some(description);
            }
        }

        Ok(result)
    }

    fn polarity(&self) -> DivergenceType {
        self.polarity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{
        Exchange, PriceBar, StockData, StockListing, Symbol, TradingConfig,
    };
    use chrono::NaiveDate;

    struct FixedGateway {
        bars: Vec<PriceBar>,
    }

    #[async_trait]
    impl MarketDataGateway for FixedGateway {
        async fn fetch_stock_data(
            &self,
            _ctx: &CancellationToken,
            query: &MarketDataQuery,
        ) -> Result<StockData, AnalysisError> {
            Ok(StockData {
                symbol: query.symbol.to_string(),
                price_history: self.bars.clone(),
            })
        }

        async fn list_all_stocks(
            &self,
            _ctx: &CancellationToken,
            _exchange: Exchange,
        ) -> Result<Vec<StockListing>, AnalysisError> {
            Ok(vec![])
        }
    }

    struct FixedConfigs {
        config: Option<TradingConfig>,
    }

    #[async_trait]
    impl ConfigRepository for FixedConfigs {
        async fn create_config(&self, _config: &TradingConfig) -> Result<(), AnalysisError> {
            Ok(())
        }

        async fn get_config(&self, id: &str) -> Result<TradingConfig, AnalysisError> {
            self.config
                .clone()
                .ok_or_else(|| AnalysisError::ConfigNotFound(id.to_string()))
        }

        async fn update_config(&self, _config: &TradingConfig) -> Result<(), AnalysisError> {
            Ok(())
        }

        async fn delete_config(&self, _id: &str) -> Result<(), AnalysisError> {
            Ok(())
        }
    }

    fn bars(count: usize) -> Vec<PriceBar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..count)
            .map(|i| {
                // Mild oscillation so the RSI is defined and unremarkable.
                let close = 50.0 + ((i % 7) as f64) * 0.3;
                PriceBar::new(
                    start + chrono::Duration::days(i as i64),
                    close,
                    close + 0.5,
                    close - 0.5,
                    close,
                    100_000,
                )
                .unwrap()
            })
            .collect()
    }

    fn config(indices_recent: usize, rsi_period: usize) -> TradingConfig {
        let mut cfg = TradingConfig::new("desk-1");
        cfg.bearish_symbols = vec!["VNM".to_string()];
        cfg.divergence.indices_recent = indices_recent;
        cfg.rsi_period = rsi_period;
        cfg
    }

    fn analyzer(
        bars_count: usize,
        cfg: Option<TradingConfig>,
        polarity: DivergenceType,
    ) -> DivergenceAnalyzer {
        DivergenceAnalyzer::new(
            Arc::new(FixedGateway {
                bars: bars(bars_count),
            }),
            Arc::new(FixedConfigs { config: cfg }),
            polarity,
        )
    }

    fn query() -> MarketDataQuery {
        MarketDataQuery {
            symbol: Symbol::parse("VNM").unwrap(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap(),
            interval: Default::default(),
        }
    }

    #[tokio::test]
    async fn missing_config_is_a_typed_failure() {
        let a = analyzer(60, None, DivergenceType::Bearish);
        let err = a
            .execute(&CancellationToken::new(), &query(), "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigNotFound(_)));
    }

    #[tokio::test]
    async fn short_history_is_insufficient_data() {
        let a = analyzer(30, Some(config(60, 14)), DivergenceType::Bearish);
        let err = a
            .execute(&CancellationToken::new(), &query(), "desk-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData(_)));
    }

    #[tokio::test]
    async fn ten_bars_cannot_seed_a_fourteen_period_rsi() {
        let a = analyzer(10, Some(config(10, 14)), DivergenceType::Bearish);
        let err = a
            .execute(&CancellationToken::new(), &query(), "desk-1")
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData(_)));
    }

    #[tokio::test]
    async fn quiet_series_reports_no_divergence_with_current_readings() {
        let a = analyzer(120, Some(config(100, 14)), DivergenceType::Bearish);
        let result = a
            .execute(&CancellationToken::new(), &query(), "desk-1")
            .await
            .unwrap();

        assert!(!result.divergence_found);
        assert_eq!(result.divergence_type, DivergenceType::None);
        assert!(result.current_price > 0.0);
        assert!(result.current_rsi > 0.0);
        assert_eq!(result.rsi_period, 14);
        assert_eq!(result.symbol, "VNM");
        assert!(result.early_signal_detected.is_none());
    }

    #[tokio::test]
    async fn early_probe_runs_only_when_enabled_and_bearish() {
        let mut cfg = config(100, 14);
        cfg.early_detection_enabled = true;
        let a = analyzer(120, Some(cfg), DivergenceType::Bullish);
        let result = a
            .execute(&CancellationToken::new(), &query(), "desk-1")
            .await
            .unwrap();
        // Bullish analyzers never populate the early bearish fields.
        assert!(result.early_signal_detected.is_none());
        assert!(result.early_description.is_none());
    }
}
