use std::collections::HashMap;
use std::sync::Arc;

use analysis_core::{
    AnalysisError, Exchange, Interval, MarketDataGateway, MarketDataQuery, SnapshotRepository,
    StockListing, StockMetrics, StockMetricsSnapshot, Symbol,
};
use chrono::{DateTime, Duration, Utc};
use market_screener::{compute_stock_metrics, rank_all, ScreenerCache};
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Upper bound on concurrently running per-symbol fetch workers; the
/// gateway's token bucket governs the actual request rate underneath.
pub const MAX_IN_FLIGHT_FETCHES: usize = 10;

/// Daily history pulled for each symbol during a refresh.
const HISTORY_DAYS: i64 = 400;

/// How many per-symbol failures get spelled out in the refresh log.
const FAILURE_LOG_SAMPLE: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct RefreshSummary {
    pub total_stocks: usize,
    pub stocks_ranked: usize,
    pub calculated_at: DateTime<Utc>,
}

/// Full-universe refresh: list every symbol on the three exchanges, fetch
/// histories through a bounded worker pool, rank the aggregate and publish
/// one immutable snapshot. At most one refresh runs at a time.
pub struct RefreshPipeline {
    gateway: Arc<dyn MarketDataGateway>,
    repository: Arc<dyn SnapshotRepository>,
    cache: Arc<ScreenerCache>,
    running: Mutex<()>,
}

impl RefreshPipeline {
    pub fn new(
        gateway: Arc<dyn MarketDataGateway>,
        repository: Arc<dyn SnapshotRepository>,
        cache: Arc<ScreenerCache>,
    ) -> Self {
        Self {
            gateway,
            repository,
            cache,
            running: Mutex::new(()),
        }
    }

    pub async fn refresh(&self, ctx: &CancellationToken) -> Result<RefreshSummary, AnalysisError> {
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| AnalysisError::Conflict("a refresh is already running".to_string()))?;

        let listings = self.list_universe(ctx).await?;
        let total_stocks = listings.len();
        tracing::info!(total_stocks, "starting stock universe refresh");

        let end_date = Utc::now().date_naive();
        let start_date = end_date - Duration::days(HISTORY_DAYS);

        let semaphore = Arc::new(Semaphore::new(MAX_IN_FLIGHT_FETCHES));
        let mut workers = JoinSet::new();
        for listing in listings {
            let gateway = Arc::clone(&self.gateway);
            let semaphore = Arc::clone(&semaphore);
            let ctx = ctx.clone();
            workers.spawn(async move {
                let symbol_name = listing.symbol.clone();
                let outcome =
                    fetch_one(gateway, semaphore, ctx, listing, start_date, end_date).await;
                (symbol_name, outcome)
            });
        }

        let mut metrics: Vec<StockMetrics> = Vec::new();
        let mut failures: HashMap<String, AnalysisError> = HashMap::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((_, Ok(stock_metrics))) => metrics.push(stock_metrics),
                Ok((symbol, Err(error))) => {
                    failures.insert(symbol, error);
                }
                Err(join_error) => {
                    tracing::error!(error = %join_error, "refresh worker aborted");
                }
            }
        }

        if ctx.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }
        log_fetch_failures(&failures);

        let ranked = rank_all(metrics);
        let snapshot = StockMetricsSnapshot {
            calculated_at: Utc::now(),
            stocks: ranked,
        };
        let summary = RefreshSummary {
            total_stocks,
            stocks_ranked: snapshot.stocks.len(),
            calculated_at: snapshot.calculated_at,
        };

        if let Err(error) = self.repository.save_snapshot(&snapshot).await {
            tracing::warn!(error = %error, "snapshot persistence failed; in-memory publish proceeds");
        }
        self.cache.publish(snapshot);

        tracing::info!(
            total_stocks = summary.total_stocks,
            stocks_ranked = summary.stocks_ranked,
            "refresh complete, snapshot published"
        );
        Ok(summary)
    }

    /// Fetch the three exchange listings concurrently. Partial failure is
    /// tolerated; only a clean sweep of failures aborts the refresh.
    async fn list_universe(
        &self,
        ctx: &CancellationToken,
    ) -> Result<Vec<StockListing>, AnalysisError> {
        let fetches = Exchange::ALL.map(|exchange| {
            let gateway = Arc::clone(&self.gateway);
            let ctx = ctx.clone();
            async move { (exchange, gateway.list_all_stocks(&ctx, exchange).await) }
        });
        let results = futures_util::future::join_all(fetches).await;

        if ctx.is_cancelled() {
            return Err(AnalysisError::Cancelled);
        }

        let mut listings = Vec::new();
        let mut failed = 0usize;
        for (exchange, result) in results {
            match result {
                Ok(mut batch) => {
                    tracing::debug!(exchange = %exchange, symbols = batch.len(), "exchange listed");
                    listings.append(&mut batch);
                }
                Err(error) => {
                    failed += 1;
                    tracing::warn!(exchange = %exchange, error = %error, "exchange listing failed");
                }
            }
        }

        if failed == Exchange::ALL.len() {
            return Err(AnalysisError::Fetch(
                "every exchange listing fetch failed".to_string(),
            ));
        }
        Ok(listings)
    }
}

async fn fetch_one(
    gateway: Arc<dyn MarketDataGateway>,
    semaphore: Arc<Semaphore>,
    ctx: CancellationToken,
    listing: StockListing,
    start_date: chrono::NaiveDate,
    end_date: chrono::NaiveDate,
) -> Result<StockMetrics, AnalysisError> {
    let _permit = semaphore
        .acquire_owned()
        .await
        .map_err(|_| AnalysisError::Cancelled)?;
    if ctx.is_cancelled() {
        return Err(AnalysisError::Cancelled);
    }

    let symbol = Symbol::parse(&listing.symbol)?;
    let query = MarketDataQuery {
        symbol,
        start_date,
        end_date,
        interval: Interval::Day1,
    };
    let data = gateway.fetch_stock_data(&ctx, &query).await?;

    compute_stock_metrics(&listing.symbol, listing.exchange, &data.price_history).ok_or_else(
        || {
            AnalysisError::InsufficientData(format!(
                "{}: only {} bars of history",
                listing.symbol,
                data.price_history.len()
            ))
        },
    )
}

fn log_fetch_failures(failures: &HashMap<String, AnalysisError>) {
    if failures.is_empty() {
        return;
    }
    let sample: Vec<String> = failures
        .iter()
        .take(FAILURE_LOG_SAMPLE)
        .map(|(symbol, error)| format!("{symbol}: {error}"))
        .collect();
    let residual = failures.len().saturating_sub(sample.len());
    tracing::warn!(
        failed = failures.len(),
        sample = ?sample,
        residual,
        "per-symbol fetches failed during refresh"
    );
}
