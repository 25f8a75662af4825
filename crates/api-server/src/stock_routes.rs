use analysis_core::ScreenerFilterRequest;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use market_screener::FilterResponse;
use tokio_util::sync::CancellationToken;

use crate::{AppError, AppState};

pub fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/stocks/refresh", post(refresh_stocks))
        .route("/stocks/cache-info", get(cache_info))
        .route("/stocks/filter", post(filter_stocks))
}

async fn refresh_stocks(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    let summary = state.refresh.refresh(&CancellationToken::new()).await?;
    Ok(Json(serde_json::json!({
        "message": "stock universe refreshed",
        "total_stocks": summary.total_stocks,
        "stocks_ranked": summary.stocks_ranked,
        "calculated_at": summary.calculated_at,
    })))
}

async fn cache_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let info = state.cache.cache_info();
    if info.cached {
        Json(serde_json::json!({
            "cached": true,
            "cached_at": info.cached_at,
            "total_stocks": info.total_stocks,
        }))
    } else {
        Json(serde_json::json!({
            "cached": false,
            "message": "cache is empty; run POST /stocks/refresh",
        }))
    }
}

async fn filter_stocks(
    State(state): State<AppState>,
    Json(request): Json<ScreenerFilterRequest>,
) -> Result<Json<FilterResponse>, AppError> {
    Ok(Json(state.cache.filter(&request)?))
}
