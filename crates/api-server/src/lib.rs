pub mod analyze_routes;
pub mod config;
pub mod config_routes;
pub mod scheduler_routes;
pub mod stock_routes;

use std::sync::Arc;

use analysis_core::{
    AnalysisError, ConfigRepository, DivergenceType, SymbolAnalyzer, TelegramSettings,
    TradingConfig,
};
use analysis_orchestrator::{DivergenceAnalyzer, RefreshPipeline};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use market_screener::ScreenerCache;
use market_store::MarketStore;
use notification_service::TelegramNotifier;
use signal_scheduler::DivergenceScheduler;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use vietstock_client::VietstockClient;

use crate::config::ServerConfig;

/// Shared handles every route works against.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<ScreenerCache>,
    pub refresh: Arc<RefreshPipeline>,
    pub configs: Arc<dyn ConfigRepository>,
    pub bullish_analyzer: Arc<dyn SymbolAnalyzer>,
    pub bearish_analyzer: Arc<dyn SymbolAnalyzer>,
    pub bullish_scheduler: Arc<DivergenceScheduler>,
    pub bearish_scheduler: Arc<DivergenceScheduler>,
    /// Config the schedulers analyze with; watchlist edits to it are pushed
    /// into the running schedulers.
    pub scheduler_config_id: String,
    pub default_config_id: Option<String>,
    pub environment: String,
}

/// Maps the core failure taxonomy onto HTTP status codes at the boundary.
pub struct AppError(pub AnalysisError);

impl From<AnalysisError> for AppError {
    fn from(error: AnalysisError) -> Self {
        Self(error)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AnalysisError::Validation(_) | AnalysisError::ConfigValidation(_) => {
                StatusCode::BAD_REQUEST
            }
            AnalysisError::ConfigNotFound(_) => StatusCode::NOT_FOUND,
            AnalysisError::CacheNotReady => StatusCode::SERVICE_UNAVAILABLE,
            AnalysisError::Conflict(_) => StatusCode::CONFLICT,
            AnalysisError::InsufficientData(_)
            | AnalysisError::Fetch(_)
            | AnalysisError::RateLimitExhausted(_)
            | AnalysisError::Cancelled
            | AnalysisError::Persistence(_)
            | AnalysisError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        match &self.0 {
            AnalysisError::Cancelled => {}
            AnalysisError::InsufficientData(_) => {
                tracing::warn!(error = %self.0, "request failed")
            }
            _ if status.is_server_error() => tracing::error!(error = %self.0, "request failed"),
            _ => tracing::debug!(error = %self.0, "request rejected"),
        }

        let body = match &self.0 {
            AnalysisError::ConfigValidation(messages) => serde_json::json!({
                "error": "config validation failed",
                "details": messages,
            }),
            other => serde_json::json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "environment": state.environment,
    }))
}

pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(analyze_routes::analyze_routes())
        .merge(stock_routes::stock_routes())
        .merge(config_routes::config_routes())
        .merge(scheduler_routes::scheduler_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(config.read_timeout))
        .with_state(state)
}

pub async fn run_server() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ServerConfig::from_env()?;
    tracing::info!("Starting market analytics service");
    tracing::info!("  HTTP port: {}", config.http_port);
    tracing::info!("  Vendor: {} ({} req/min)", config.vendor_base_url, config.vendor_rate_limit);
    tracing::info!(
        "  HTTP timeouts: read {}s / write {}s / idle {}s / shutdown {}s",
        config.read_timeout.as_secs(),
        config.write_timeout.as_secs(),
        config.idle_timeout.as_secs(),
        config.shutdown_timeout.as_secs()
    );
    tracing::info!("  Database: {}", config.database_url);
    tracing::info!("  Environment: {}", config.environment);

    let store = Arc::new(MarketStore::connect(&config.database_url).await?);
    let configs: Arc<dyn ConfigRepository> = store.clone();

    let gateway = Arc::new(VietstockClient::new(
        config.vendor_base_url.clone(),
        config.vendor_rate_limit,
        config.vendor_timeout,
    ));

    let cache = Arc::new(ScreenerCache::new());
    match cache.load_from_db(store.as_ref()).await {
        Ok(true) => tracing::info!("screener cache warm-started"),
        Ok(false) => tracing::info!("screener cache cold, waiting for first refresh"),
        Err(error) => tracing::warn!(error = %error, "screener warm-start failed"),
    }

    let refresh = Arc::new(RefreshPipeline::new(
        gateway.clone(),
        store.clone(),
        Arc::clone(&cache),
    ));

    let default_config = bootstrap_default_config(&config, &configs).await?;

    let notifier: Arc<TelegramNotifier> = match &default_config {
        Some(cfg) if cfg.telegram.enabled => {
            Arc::new(TelegramNotifier::from_settings(&cfg.telegram))
        }
        _ => Arc::new(TelegramNotifier::new(
            config.telegram_bot_token.clone(),
            config.telegram_chat_id.clone(),
        )),
    };

    let bullish_analyzer: Arc<dyn SymbolAnalyzer> = Arc::new(DivergenceAnalyzer::new(
        gateway.clone(),
        Arc::clone(&configs),
        DivergenceType::Bullish,
    ));
    let bearish_analyzer: Arc<dyn SymbolAnalyzer> = Arc::new(DivergenceAnalyzer::new(
        gateway.clone(),
        Arc::clone(&configs),
        DivergenceType::Bearish,
    ));

    let scheduler_config_id = config
        .default_config_id
        .clone()
        .unwrap_or_else(|| "default".to_string());
    let (bullish_symbols, bearish_symbols) = match &default_config {
        Some(cfg) => (cfg.bullish_symbols.clone(), cfg.bearish_symbols.clone()),
        None => (config.bullish_symbols.clone(), config.bearish_symbols.clone()),
    };

    let bullish_scheduler = Arc::new(DivergenceScheduler::new(
        DivergenceType::Bullish,
        scheduler_config_id.clone(),
        bullish_symbols,
        config.start_date_offset,
        config.bullish_schedules.clone(),
        Arc::clone(&bullish_analyzer),
        notifier.clone(),
    ));
    let bearish_scheduler = Arc::new(DivergenceScheduler::new(
        DivergenceType::Bearish,
        scheduler_config_id.clone(),
        bearish_symbols,
        config.start_date_offset,
        config.bearish_schedules.clone(),
        Arc::clone(&bearish_analyzer),
        notifier,
    ));

    if config.bullish_auto_start {
        match bullish_scheduler.start().await {
            Ok(count) => tracing::info!(intervals = count, "bullish scheduler auto-started"),
            Err(error) => tracing::warn!(error = %error, "bullish scheduler auto-start skipped"),
        }
    }
    if config.bearish_auto_start {
        match bearish_scheduler.start().await {
            Ok(count) => tracing::info!(intervals = count, "bearish scheduler auto-started"),
            Err(error) => tracing::warn!(error = %error, "bearish scheduler auto-start skipped"),
        }
    }

    let state = AppState {
        cache,
        refresh,
        configs,
        bullish_analyzer,
        bearish_analyzer,
        bullish_scheduler: Arc::clone(&bullish_scheduler),
        bearish_scheduler: Arc::clone(&bearish_scheduler),
        scheduler_config_id,
        default_config_id: config.default_config_id.clone(),
        environment: config.environment.clone(),
    };
    let app = router(state, &config);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .map_err(|e| anyhow::anyhow!("cannot bind port {}: {e}", config.http_port))?;
    tracing::info!("listening on 0.0.0.0:{}", config.http_port);

    let shutdown = Arc::new(tokio::sync::Notify::new());
    let server_shutdown = Arc::clone(&shutdown);
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.notified().await })
            .await
    });

    shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping schedulers");
    for scheduler in [&bullish_scheduler, &bearish_scheduler] {
        if scheduler.is_running() {
            if let Err(error) = scheduler.stop().await {
                tracing::warn!(error = %error, "scheduler stop failed during shutdown");
            }
        }
    }
    shutdown.notify_one();

    match tokio::time::timeout(config.shutdown_timeout, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!(
            "graceful shutdown exceeded {}s, exiting anyway",
            config.shutdown_timeout.as_secs()
        ),
    }
    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing() {
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            tracing_subscriber::EnvFilter::new(
                std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            )
        })
    };

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt().json().with_env_filter(env_filter()).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter()).init();
    }
}

/// Create the scheduler-backing config on first boot when it is missing.
async fn bootstrap_default_config(
    config: &ServerConfig,
    configs: &Arc<dyn ConfigRepository>,
) -> anyhow::Result<Option<TradingConfig>> {
    let Some(id) = &config.default_config_id else {
        return Ok(None);
    };

    match configs.get_config(id).await {
        Ok(existing) => Ok(Some(existing)),
        Err(AnalysisError::ConfigNotFound(_)) => {
            let mut cfg = TradingConfig::new(id.clone());
            cfg.start_date_offset = config.start_date_offset;
            cfg.bearish_symbols = config.bearish_symbols.clone();
            cfg.bullish_symbols = config.bullish_symbols.clone();
            if !config.telegram_bot_token.is_empty() && !config.telegram_chat_id.is_empty() {
                cfg.telegram = TelegramSettings {
                    enabled: true,
                    bot_token: config.telegram_bot_token.clone(),
                    chat_id: config.telegram_chat_id.clone(),
                };
            }

            match cfg.validate() {
                Ok(()) => {
                    configs.create_config(&cfg).await?;
                    tracing::info!(id = %cfg.id, "default trading config created");
                    Ok(Some(cfg))
                }
                Err(error) => {
                    tracing::warn!(error = %error, "default config invalid, bootstrap skipped");
                    Ok(None)
                }
            }
        }
        Err(error) => Err(error.into()),
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => {}
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
