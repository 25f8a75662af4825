use std::sync::Arc;

use analysis_core::{
    AnalysisError, AnalysisResult, Interval, MarketDataQuery, Symbol, SymbolAnalyzer,
};
use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::{AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct AnalyzeParams {
    pub config_id: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub interval: Option<String>,
}

pub fn analyze_routes() -> Router<AppState> {
    Router::new()
        .route("/analyze/:symbol/divergence/bullish", get(analyze_bullish))
        .route("/analyze/:symbol/divergence/bearish", get(analyze_bearish))
}

async fn analyze_bullish(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<AnalyzeParams>,
) -> Result<Json<AnalysisResult>, AppError> {
    let analyzer = Arc::clone(&state.bullish_analyzer);
    run_analysis(&state, analyzer, symbol, params).await
}

async fn analyze_bearish(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(params): Query<AnalyzeParams>,
) -> Result<Json<AnalysisResult>, AppError> {
    let analyzer = Arc::clone(&state.bearish_analyzer);
    run_analysis(&state, analyzer, symbol, params).await
}

async fn run_analysis(
    state: &AppState,
    analyzer: Arc<dyn SymbolAnalyzer>,
    raw_symbol: String,
    params: AnalyzeParams,
) -> Result<Json<AnalysisResult>, AppError> {
    let symbol = Symbol::parse(&raw_symbol)?;
    let interval = Interval::parse(params.interval.as_deref().unwrap_or(""))?;
    let query = MarketDataQuery::new(
        symbol,
        params.start_date.as_deref().unwrap_or(""),
        params.end_date.as_deref().unwrap_or(""),
        interval,
    )?;

    let config_id = params
        .config_id
        .or_else(|| state.default_config_id.clone())
        .ok_or_else(|| {
            AnalysisError::Validation("config_id query parameter is required".to_string())
        })?;

    let ctx = CancellationToken::new();
    let result = analyzer.execute(&ctx, &query, &config_id).await?;
    Ok(Json(result))
}
