use analysis_core::{
    AnalysisError, DivergenceConfig, ScreenerFilterPreset, Symbol, TelegramSettings,
    TradingConfig, WatchlistKind,
};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::{AppError, AppState};

pub fn config_routes() -> Router<AppState> {
    Router::new()
        .route("/config", post(create_config))
        .route("/config/:id", get(get_config))
        .route("/config/:id", put(update_config))
        .route("/config/:id", delete(delete_config))
        .route("/config/:id/watchlist", get(get_watchlist))
        .route("/config/:id/watchlist", post(add_watchlist_symbols))
        .route("/config/:id/watchlist", delete(remove_watchlist_symbols))
}

/// Body of `POST /config`. Everything except the id and watchlists falls
/// back to library defaults.
#[derive(Debug, Deserialize)]
pub struct CreateConfigRequest {
    pub id: String,
    pub rsi_period: Option<usize>,
    pub start_date_offset: Option<i64>,
    pub divergence: Option<DivergenceConfig>,
    #[serde(default)]
    pub early_detection_enabled: bool,
    #[serde(default)]
    pub bearish_symbols: Vec<String>,
    #[serde(default)]
    pub bullish_symbols: Vec<String>,
    pub telegram: Option<TelegramSettings>,
    #[serde(default)]
    pub screener_filter_presets: Vec<ScreenerFilterPreset>,
}

/// Body of `PUT /config/{id}`: partial update, absent fields keep their
/// stored values.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateConfigRequest {
    pub rsi_period: Option<usize>,
    pub start_date_offset: Option<i64>,
    pub divergence: Option<DivergenceConfig>,
    pub early_detection_enabled: Option<bool>,
    pub bearish_symbols: Option<Vec<String>>,
    pub bullish_symbols: Option<Vec<String>>,
    pub telegram: Option<TelegramSettings>,
    pub screener_filter_presets: Option<Vec<ScreenerFilterPreset>>,
}

#[derive(Debug, Deserialize)]
pub struct WatchlistRequest {
    pub list_type: WatchlistKind,
    pub symbols: Vec<String>,
}

async fn create_config(
    State(state): State<AppState>,
    Json(request): Json<CreateConfigRequest>,
) -> Result<(StatusCode, Json<TradingConfig>), AppError> {
    let mut config = TradingConfig::new(request.id);
    if let Some(rsi_period) = request.rsi_period {
        config.rsi_period = rsi_period;
    }
    if let Some(offset) = request.start_date_offset {
        config.start_date_offset = offset;
    }
    if let Some(divergence) = request.divergence {
        config.divergence = divergence;
    }
    config.early_detection_enabled = request.early_detection_enabled;
    config.bearish_symbols = normalize_symbols(&request.bearish_symbols)?;
    config.bullish_symbols = normalize_symbols(&request.bullish_symbols)?;
    if let Some(telegram) = request.telegram {
        config.telegram = telegram;
    }
    config.screener_filter_presets = request.screener_filter_presets;

    config.validate()?;
    state.configs.create_config(&config).await?;
    Ok((StatusCode::CREATED, Json(config)))
}

async fn get_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TradingConfig>, AppError> {
    Ok(Json(state.configs.get_config(&id).await?))
}

async fn update_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateConfigRequest>,
) -> Result<Json<TradingConfig>, AppError> {
    let mut config = state.configs.get_config(&id).await?;
    apply_update(&mut config, request)?;

    config.validate()?;
    state.configs.update_config(&config).await?;
    sync_schedulers(&state, &config);
    Ok(Json(config))
}

async fn delete_config(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.configs.delete_config(&id).await?;
    Ok(Json(serde_json::json!({
        "message": format!("config '{id}' deleted"),
    })))
}

async fn get_watchlist(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let config = state.configs.get_config(&id).await?;
    Ok(Json(serde_json::json!({
        "bullish_symbols": config.bullish_symbols,
        "bearish_symbols": config.bearish_symbols,
    })))
}

async fn add_watchlist_symbols(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<WatchlistRequest>,
) -> Result<Json<TradingConfig>, AppError> {
    let symbols = parse_symbols(&request.symbols)?;
    let mut config = state.configs.get_config(&id).await?;
    config.add_symbols(request.list_type, &symbols);

    config.validate()?;
    state.configs.update_config(&config).await?;
    sync_schedulers(&state, &config);
    Ok(Json(config))
}

async fn remove_watchlist_symbols(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<WatchlistRequest>,
) -> Result<Json<TradingConfig>, AppError> {
    let symbols = parse_symbols(&request.symbols)?;
    let mut config = state.configs.get_config(&id).await?;
    config.remove_symbols(request.list_type, &symbols);

    config.validate()?;
    state.configs.update_config(&config).await?;
    sync_schedulers(&state, &config);
    Ok(Json(config))
}

fn apply_update(
    config: &mut TradingConfig,
    request: UpdateConfigRequest,
) -> Result<(), AnalysisError> {
    if let Some(rsi_period) = request.rsi_period {
        config.rsi_period = rsi_period;
    }
    if let Some(offset) = request.start_date_offset {
        config.start_date_offset = offset;
    }
    if let Some(divergence) = request.divergence {
        config.divergence = divergence;
    }
    if let Some(early) = request.early_detection_enabled {
        config.early_detection_enabled = early;
    }
    if let Some(ref bearish) = request.bearish_symbols {
        config.bearish_symbols = normalize_symbols(bearish)?;
    }
    if let Some(ref bullish) = request.bullish_symbols {
        config.bullish_symbols = normalize_symbols(bullish)?;
    }
    if let Some(telegram) = request.telegram {
        config.telegram = telegram;
    }
    if let Some(presets) = request.screener_filter_presets {
        config.screener_filter_presets = presets;
    }
    config.updated_at = Utc::now();
    Ok(())
}

fn parse_symbols(raw: &[String]) -> Result<Vec<Symbol>, AnalysisError> {
    raw.iter().map(|s| Symbol::parse(s)).collect()
}

fn normalize_symbols(raw: &[String]) -> Result<Vec<String>, AnalysisError> {
    Ok(parse_symbols(raw)?
        .into_iter()
        .map(|s| s.as_str().to_string())
        .collect())
}

/// Watchlist edits on the schedulers' config become visible to the next
/// firing without a restart.
fn sync_schedulers(state: &AppState, config: &TradingConfig) {
    if config.id != state.scheduler_config_id {
        return;
    }
    state
        .bullish_scheduler
        .update_symbols(config.bullish_symbols.clone());
    state
        .bearish_scheduler
        .update_symbols(config.bearish_symbols.clone());
}
