use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{
    AnalysisError, AnalysisResult, DivergenceType, Exchange, Interval, MarketDataQuery, StockData,
    StockListing, StockMetricsSnapshot, TradingConfig,
};

/// Gateway to the market-data vendor. Implementations are rate-limited and
/// honor the cancellation token on every blocking wait.
#[async_trait]
pub trait MarketDataGateway: Send + Sync {
    async fn fetch_stock_data(
        &self,
        ctx: &CancellationToken,
        query: &MarketDataQuery,
    ) -> Result<StockData, AnalysisError>;

    async fn list_all_stocks(
        &self,
        ctx: &CancellationToken,
        exchange: Exchange,
    ) -> Result<Vec<StockListing>, AnalysisError>;
}

/// Persistence contract for ranked snapshots. Safe for concurrent use.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    async fn save_snapshot(&self, snapshot: &StockMetricsSnapshot) -> Result<(), AnalysisError>;

    async fn load_latest_snapshot(&self) -> Result<Option<StockMetricsSnapshot>, AnalysisError>;
}

/// CRUD contract for trading configs. Safe for concurrent use.
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn create_config(&self, config: &TradingConfig) -> Result<(), AnalysisError>;

    /// Returns [`AnalysisError::ConfigNotFound`] on a miss.
    async fn get_config(&self, id: &str) -> Result<TradingConfig, AnalysisError>;

    async fn update_config(&self, config: &TradingConfig) -> Result<(), AnalysisError>;

    async fn delete_config(&self, id: &str) -> Result<(), AnalysisError>;
}

/// Outbound notification sink for positive divergence signals. Failures are
/// logged by callers and never abort a batch.
#[async_trait]
pub trait DivergenceNotifier: Send + Sync {
    async fn handle_divergence_result(
        &self,
        polarity: DivergenceType,
        interval: Interval,
        symbol: &str,
        result: &AnalysisResult,
    ) -> Result<(), AnalysisError>;
}

/// One-symbol divergence analysis, parameterized by a stored config.
/// The scheduler fans out over this seam.
#[async_trait]
pub trait SymbolAnalyzer: Send + Sync {
    async fn execute(
        &self,
        ctx: &CancellationToken,
        query: &MarketDataQuery,
        config_id: &str,
    ) -> Result<AnalysisResult, AnalysisError>;

    /// The polarity this analyzer scans for.
    fn polarity(&self) -> DivergenceType;
}
