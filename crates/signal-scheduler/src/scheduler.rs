use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use analysis_core::{
    AnalysisError, DivergenceNotifier, DivergenceType, Interval, MarketDataQuery, Symbol,
    SymbolAnalyzer,
};
use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

/// Hard deadline for one scheduled batch.
const FIRING_TIMEOUT: Duration = Duration::from_secs(600);

/// Cron settings for one analysis interval.
#[derive(Debug, Clone)]
pub struct IntervalSchedule {
    pub enabled: bool,
    pub cron: String,
}

/// interval -> cron settings, for the {30m, 1H, 1D, 1W} intervals.
pub type ScheduleMap = HashMap<Interval, IntervalSchedule>;

/// Row of `GET /scheduler/status`.
#[derive(Debug, Clone, Serialize)]
pub struct IntervalStatus {
    pub interval: Interval,
    pub enabled: bool,
    pub cron: String,
}

/// Cron-driven watchlist analysis for one polarity.
///
/// Each enabled interval registers one UTC cron entry; every firing fans
/// out one analysis per watchlist symbol and pushes positive signals to the
/// notifier. `stop` halts future firings but lets in-flight batches finish.
pub struct DivergenceScheduler {
    inner: Arc<SchedulerInner>,
    schedules: Vec<(Interval, IntervalSchedule)>,
    state: Mutex<Option<JobScheduler>>,
    running: AtomicBool,
}

struct SchedulerInner {
    polarity: DivergenceType,
    config_id: String,
    start_date_offset: i64,
    symbols: RwLock<Vec<String>>,
    analyzer: Arc<dyn SymbolAnalyzer>,
    notifier: Arc<dyn DivergenceNotifier>,
}

/// Counters reported after every firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BatchOutcome {
    pub analyzed: usize,
    pub signals: usize,
}

impl DivergenceScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        polarity: DivergenceType,
        config_id: impl Into<String>,
        symbols: Vec<String>,
        start_date_offset: i64,
        schedules: ScheduleMap,
        analyzer: Arc<dyn SymbolAnalyzer>,
        notifier: Arc<dyn DivergenceNotifier>,
    ) -> Self {
        let mut ordered: Vec<(Interval, IntervalSchedule)> = schedules.into_iter().collect();
        ordered.sort_by_key(|(interval, _)| interval.as_str());

        Self {
            inner: Arc::new(SchedulerInner {
                polarity,
                config_id: config_id.into(),
                start_date_offset,
                symbols: RwLock::new(symbols),
                analyzer,
                notifier,
            }),
            schedules: ordered,
            state: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Register one cron entry per enabled interval and start the loop.
    pub async fn start(&self) -> Result<usize, AnalysisError> {
        let mut state = self.state.lock().await;
        if state.is_some() {
            return Err(AnalysisError::Conflict(format!(
                "{} scheduler is already running",
                self.inner.polarity.label().to_lowercase()
            )));
        }

        let enabled: Vec<&(Interval, IntervalSchedule)> =
            self.schedules.iter().filter(|(_, s)| s.enabled).collect();
        if enabled.is_empty() {
            return Err(AnalysisError::Validation(
                "no intervals enabled".to_string(),
            ));
        }

        let registered = enabled.len();
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AnalysisError::Internal(e.to_string()))?;

        for (interval, schedule) in enabled {
            // Capture the interval by value; the closure outlives this loop.
            let interval = *interval;
            let inner = Arc::clone(&self.inner);
            let job = Job::new_async(schedule.cron.as_str(), move |_uuid, _scheduler| {
                let inner = Arc::clone(&inner);
                Box::pin(async move {
                    // Detached so a shutdown never cuts a batch short.
                    tokio::spawn(async move {
                        inner.run_firing(interval).await;
                    });
                })
            })
            .map_err(|e| {
                AnalysisError::Validation(format!(
                    "bad cron expression for {}: {e}",
                    interval.as_str()
                ))
            })?;
            scheduler
                .add(job)
                .await
                .map_err(|e| AnalysisError::Internal(e.to_string()))?;
        }

        scheduler
            .start()
            .await
            .map_err(|e| AnalysisError::Internal(e.to_string()))?;
        *state = Some(scheduler);
        self.running.store(true, Ordering::SeqCst);

        tracing::info!(
            polarity = self.inner.polarity.label(),
            intervals = registered,
            "divergence scheduler started"
        );
        Ok(registered)
    }

    /// Halt future firings. In-flight analyses run to completion.
    pub async fn stop(&self) -> Result<(), AnalysisError> {
        let mut state = self.state.lock().await;
        let Some(mut scheduler) = state.take() else {
            return Err(AnalysisError::Conflict(format!(
                "{} scheduler is not running",
                self.inner.polarity.label().to_lowercase()
            )));
        };
        scheduler
            .shutdown()
            .await
            .map_err(|e| AnalysisError::Internal(e.to_string()))?;
        self.running.store(false, Ordering::SeqCst);
        tracing::info!(
            polarity = self.inner.polarity.label(),
            "divergence scheduler stopped"
        );
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn polarity(&self) -> DivergenceType {
        self.inner.polarity
    }

    /// Replace the watchlist atomically; the next firing sees the new list.
    pub fn update_symbols(&self, symbols: Vec<String>) {
        let mut guard = self
            .inner
            .symbols
            .write()
            .expect("scheduler symbol lock poisoned");
        *guard = symbols;
    }

    pub fn schedule_overview(&self) -> Vec<IntervalStatus> {
        self.schedules
            .iter()
            .map(|(interval, schedule)| IntervalStatus {
                interval: *interval,
                enabled: schedule.enabled,
                cron: schedule.cron.clone(),
            })
            .collect()
    }
}

impl SchedulerInner {
    async fn run_firing(&self, interval: Interval) -> BatchOutcome {
        let ctx = CancellationToken::new();
        let deadline = ctx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(FIRING_TIMEOUT).await;
            deadline.cancel();
        });

        let outcome = self.run_batch(&ctx, interval).await;
        timer.abort();

        tracing::info!(
            polarity = self.polarity.label(),
            interval = interval.as_str(),
            analyzed = outcome.analyzed,
            signals = outcome.signals,
            "scheduled divergence batch finished"
        );
        outcome
    }

    async fn run_batch(&self, ctx: &CancellationToken, interval: Interval) -> BatchOutcome {
        let symbols = self
            .symbols
            .read()
            .expect("scheduler symbol lock poisoned")
            .clone();
        if symbols.is_empty() {
            tracing::debug!(
                polarity = self.polarity.label(),
                "empty watchlist, skipping firing"
            );
            return BatchOutcome {
                analyzed: 0,
                signals: 0,
            };
        }

        let end_date = Utc::now().date_naive();
        let start_date = end_date - chrono::Duration::days(self.start_date_offset);
        let analyzed = symbols.len();

        let mut tasks = JoinSet::new();
        for raw_symbol in symbols {
            let analyzer = Arc::clone(&self.analyzer);
            let config_id = self.config_id.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let result = match Symbol::parse(&raw_symbol) {
                    Ok(symbol) => {
                        let query = MarketDataQuery {
                            symbol,
                            start_date,
                            end_date,
                            interval,
                        };
                        analyzer.execute(&ctx, &query, &config_id).await
                    }
                    Err(e) => Err(e),
                };
                (raw_symbol, result)
            });
        }

        let mut signals = 0usize;
        while let Some(joined) = tasks.join_next().await {
            let (symbol, result) = match joined {
                Ok(pair) => pair,
                Err(join_error) => {
                    tracing::error!(error = %join_error, "analysis task aborted");
                    continue;
                }
            };
            let analysis = match result {
                Ok(analysis) => analysis,
                Err(AnalysisError::Cancelled) => {
                    tracing::warn!(symbol = %symbol, "analysis cancelled by firing deadline");
                    continue;
                }
                Err(error) => {
                    tracing::warn!(symbol = %symbol, error = %error, "scheduled analysis failed");
                    continue;
                }
            };

            if analysis.divergence_found && analysis.divergence_type == self.polarity {
                signals += 1;
                if let Err(error) = self
                    .notifier
                    .handle_divergence_result(self.polarity, interval, &symbol, &analysis)
                    .await
                {
                    tracing::warn!(symbol = %symbol, error = %error, "notification dispatch failed");
                }
            }
        }

        BatchOutcome { analyzed, signals }
    }
}
