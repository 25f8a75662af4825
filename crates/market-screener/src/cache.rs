use std::sync::{Arc, RwLock};

use analysis_core::{
    AnalysisError, ScreenerFilterRequest, SnapshotRepository, StockMetricsSnapshot,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::filter::{evaluate_filter, FilterResponse};

/// Read-optimized holder of the latest ranked snapshot.
///
/// Readers clone the inner Arc and work off an immutable snapshot; the
/// refresh pipeline replaces the pointer wholesale, so a reader never sees
/// a partially ranked population.
#[derive(Default)]
pub struct ScreenerCache {
    snapshot: RwLock<Option<Arc<StockMetricsSnapshot>>>,
}

/// What `GET /stocks/cache-info` reports.
#[derive(Debug, Clone, Serialize)]
pub struct CacheInfo {
    pub cached: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_stocks: Option<usize>,
}

impl ScreenerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace the published snapshot.
    pub fn publish(&self, snapshot: StockMetricsSnapshot) {
        let mut guard = self.snapshot.write().expect("screener cache lock poisoned");
        *guard = Some(Arc::new(snapshot));
    }

    /// The current snapshot, if any refresh has completed.
    pub fn snapshot(&self) -> Option<Arc<StockMetricsSnapshot>> {
        self.snapshot
            .read()
            .expect("screener cache lock poisoned")
            .clone()
    }

    pub fn cache_info(&self) -> CacheInfo {
        match self.snapshot() {
            Some(snapshot) => CacheInfo {
                cached: true,
                cached_at: Some(snapshot.calculated_at),
                total_stocks: Some(snapshot.stocks.len()),
            },
            None => CacheInfo {
                cached: false,
                cached_at: None,
                total_stocks: None,
            },
        }
    }

    /// Warm-start from the latest persisted snapshot. Returns whether the
    /// cache is populated afterwards.
    pub async fn load_from_db(
        &self,
        repository: &dyn SnapshotRepository,
    ) -> Result<bool, AnalysisError> {
        match repository.load_latest_snapshot().await? {
            Some(snapshot) => {
                tracing::info!(
                    total_stocks = snapshot.stocks.len(),
                    calculated_at = %snapshot.calculated_at,
                    "screener cache warm-started from repository"
                );
                self.publish(snapshot);
                Ok(true)
            }
            None => {
                tracing::info!("no persisted snapshot; screener cache stays empty");
                Ok(false)
            }
        }
    }

    /// Evaluate a compound filter against the published snapshot.
    pub fn filter(&self, request: &ScreenerFilterRequest) -> Result<FilterResponse, AnalysisError> {
        let snapshot = self.snapshot().ok_or(AnalysisError::CacheNotReady)?;
        evaluate_filter(&snapshot, request)
    }
}
