use analysis_core::{
    AnalysisError, ConfigRepository, SnapshotRepository, StockMetrics, StockMetricsSnapshot,
    TradingConfig,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

/// How many historical snapshots to keep around. Only the latest matters
/// for warm-start; the rest are a small debugging window.
const SNAPSHOT_RETENTION: i64 = 5;

/// SQLite-backed adapter for the snapshot and config repositories.
///
/// Nested structures are stored as JSON payload columns next to the fields
/// that get queried.
pub struct MarketStore {
    pool: SqlitePool,
}

impl MarketStore {
    pub async fn connect(database_url: &str) -> Result<Self, AnalysisError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| AnalysisError::Persistence(e.to_string()))?;
        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    /// Private in-memory database, used by tests.
    pub async fn in_memory() -> Result<Self, AnalysisError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| AnalysisError::Persistence(e.to_string()))?;
        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<(), AnalysisError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS stock_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                calculated_at TEXT NOT NULL,
                stocks_json TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(persistence)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS trading_configs (
                id TEXT PRIMARY KEY,
                config_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(persistence)?;

        Ok(())
    }
}

fn persistence(e: sqlx::Error) -> AnalysisError {
    AnalysisError::Persistence(e.to_string())
}

#[async_trait]
impl SnapshotRepository for MarketStore {
    async fn save_snapshot(&self, snapshot: &StockMetricsSnapshot) -> Result<(), AnalysisError> {
        let stocks_json = serde_json::to_string(&snapshot.stocks)
            .map_err(|e| AnalysisError::Persistence(e.to_string()))?;

        sqlx::query("INSERT INTO stock_snapshots (calculated_at, stocks_json) VALUES (?, ?)")
            .bind(snapshot.calculated_at)
            .bind(&stocks_json)
            .execute(&self.pool)
            .await
            .map_err(persistence)?;

        sqlx::query(
            "DELETE FROM stock_snapshots WHERE id NOT IN (
                SELECT id FROM stock_snapshots ORDER BY id DESC LIMIT ?
            )",
        )
        .bind(SNAPSHOT_RETENTION)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;

        Ok(())
    }

    async fn load_latest_snapshot(&self) -> Result<Option<StockMetricsSnapshot>, AnalysisError> {
        let row: Option<(DateTime<Utc>, String)> = sqlx::query_as(
            "SELECT calculated_at, stocks_json FROM stock_snapshots ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(persistence)?;

        match row {
            Some((calculated_at, stocks_json)) => {
                let stocks: Vec<StockMetrics> = serde_json::from_str(&stocks_json)
                    .map_err(|e| AnalysisError::Persistence(e.to_string()))?;
                Ok(Some(StockMetricsSnapshot {
                    calculated_at,
                    stocks,
                }))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ConfigRepository for MarketStore {
    async fn create_config(&self, config: &TradingConfig) -> Result<(), AnalysisError> {
        let config_json = serde_json::to_string(config)
            .map_err(|e| AnalysisError::Persistence(e.to_string()))?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO trading_configs (id, config_json, created_at, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&config.id)
        .bind(&config_json)
        .bind(config.created_at)
        .bind(config.updated_at)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;

        if result.rows_affected() == 0 {
            return Err(AnalysisError::Conflict(format!(
                "config '{}' already exists",
                config.id
            )));
        }
        Ok(())
    }

    async fn get_config(&self, id: &str) -> Result<TradingConfig, AnalysisError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT config_json FROM trading_configs WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(persistence)?;

        match row {
            Some((config_json,)) => serde_json::from_str(&config_json)
                .map_err(|e| AnalysisError::Persistence(e.to_string())),
            None => Err(AnalysisError::ConfigNotFound(id.to_string())),
        }
    }

    async fn update_config(&self, config: &TradingConfig) -> Result<(), AnalysisError> {
        let config_json = serde_json::to_string(config)
            .map_err(|e| AnalysisError::Persistence(e.to_string()))?;

        let result = sqlx::query(
            "UPDATE trading_configs SET config_json = ?, updated_at = ? WHERE id = ?",
        )
        .bind(&config_json)
        .bind(config.updated_at)
        .bind(&config.id)
        .execute(&self.pool)
        .await
        .map_err(persistence)?;

        if result.rows_affected() == 0 {
            return Err(AnalysisError::ConfigNotFound(config.id.clone()));
        }
        Ok(())
    }

    async fn delete_config(&self, id: &str) -> Result<(), AnalysisError> {
        let result = sqlx::query("DELETE FROM trading_configs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(persistence)?;

        if result.rows_affected() == 0 {
            return Err(AnalysisError::ConfigNotFound(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::{Exchange, PeriodReturns};

    fn sample_config(id: &str) -> TradingConfig {
        let mut config = TradingConfig::new(id);
        config.bearish_symbols = vec!["VNM".to_string(), "HPG".to_string()];
        config.bullish_symbols = vec!["FPT".to_string()];
        config
    }

    fn sample_snapshot(symbols: &[&str]) -> StockMetricsSnapshot {
        StockMetricsSnapshot {
            calculated_at: Utc::now(),
            stocks: symbols
                .iter()
                .map(|s| StockMetrics {
                    symbol: s.to_string(),
                    exchange: Exchange::Hose,
                    period_returns: PeriodReturns {
                        p1: 1.05,
                        p3: 1.1,
                        p6: 1.2,
                        p9: 1.3,
                        p12: 1.4,
                    },
                    current_volume: 1_000_000,
                    volume_sma20: 800_000.0,
                    rs_1m: 80,
                    rs_3m: 70,
                    rs_6m: 60,
                    rs_9m: 55,
                    rs_52w: 90,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn config_create_then_get_round_trips() {
        let store = MarketStore::in_memory().await.unwrap();
        let config = sample_config("desk-1");
        store.create_config(&config).await.unwrap();

        let loaded = store.get_config("desk-1").await.unwrap();
        assert_eq!(loaded.id, config.id);
        assert_eq!(loaded.rsi_period, config.rsi_period);
        assert_eq!(loaded.bearish_symbols, config.bearish_symbols);
        assert_eq!(loaded.bullish_symbols, config.bullish_symbols);
    }

    #[tokio::test]
    async fn duplicate_create_conflicts() {
        let store = MarketStore::in_memory().await.unwrap();
        store.create_config(&sample_config("desk-1")).await.unwrap();
        let err = store
            .create_config(&sample_config("desk-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_then_get_returns_merged_config() {
        let store = MarketStore::in_memory().await.unwrap();
        let mut config = sample_config("desk-1");
        store.create_config(&config).await.unwrap();

        config.rsi_period = 21;
        config.bearish_symbols.push("SSI".to_string());
        config.updated_at = Utc::now();
        store.update_config(&config).await.unwrap();

        let loaded = store.get_config("desk-1").await.unwrap();
        assert_eq!(loaded.rsi_period, 21);
        assert!(loaded.bearish_symbols.contains(&"SSI".to_string()));
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let store = MarketStore::in_memory().await.unwrap();
        store.create_config(&sample_config("desk-1")).await.unwrap();
        store.delete_config("desk-1").await.unwrap();

        let err = store.get_config("desk-1").await.unwrap_err();
        assert!(matches!(err, AnalysisError::ConfigNotFound(_)));
    }

    #[tokio::test]
    async fn missing_config_operations_are_not_found() {
        let store = MarketStore::in_memory().await.unwrap();
        assert!(matches!(
            store.get_config("ghost").await.unwrap_err(),
            AnalysisError::ConfigNotFound(_)
        ));
        assert!(matches!(
            store.delete_config("ghost").await.unwrap_err(),
            AnalysisError::ConfigNotFound(_)
        ));
        assert!(matches!(
            store.update_config(&sample_config("ghost")).await.unwrap_err(),
            AnalysisError::ConfigNotFound(_)
        ));
    }

    #[tokio::test]
    async fn latest_snapshot_survives_save_and_load() {
        let store = MarketStore::in_memory().await.unwrap();
        assert!(store.load_latest_snapshot().await.unwrap().is_none());

        store
            .save_snapshot(&sample_snapshot(&["AAA", "BBB"]))
            .await
            .unwrap();
        store
            .save_snapshot(&sample_snapshot(&["CCC"]))
            .await
            .unwrap();

        let loaded = store.load_latest_snapshot().await.unwrap().unwrap();
        assert_eq!(loaded.stocks.len(), 1);
        assert_eq!(loaded.stocks[0].symbol, "CCC");
        assert_eq!(loaded.stocks[0].rs_52w, 90);
    }

    #[tokio::test]
    async fn snapshot_history_is_pruned() {
        let store = MarketStore::in_memory().await.unwrap();
        for i in 0..10 {
            store
                .save_snapshot(&sample_snapshot(&[format!("S{i}").as_str()]))
                .await
                .unwrap();
        }

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stock_snapshots")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, SNAPSHOT_RETENTION);
    }
}
