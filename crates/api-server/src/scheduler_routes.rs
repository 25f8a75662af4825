use std::sync::Arc;

use analysis_core::AnalysisError;
use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use signal_scheduler::DivergenceScheduler;

use crate::{AppError, AppState};

pub fn scheduler_routes() -> Router<AppState> {
    Router::new()
        .route("/scheduler/status", get(scheduler_status))
        .route("/scheduler/:polarity/start", post(start_scheduler))
        .route("/scheduler/:polarity/stop", post(stop_scheduler))
}

async fn scheduler_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "bullish": describe(&state.bullish_scheduler),
        "bearish": describe(&state.bearish_scheduler),
    }))
}

fn describe(scheduler: &Arc<DivergenceScheduler>) -> serde_json::Value {
    serde_json::json!({
        "running": scheduler.is_running(),
        "intervals": scheduler.schedule_overview(),
    })
}

async fn start_scheduler(
    State(state): State<AppState>,
    Path(polarity): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let scheduler = scheduler_for(&state, &polarity)?;
    let intervals = scheduler.start().await?;
    Ok(Json(serde_json::json!({
        "message": format!("{polarity} scheduler started"),
        "intervals": intervals,
    })))
}

async fn stop_scheduler(
    State(state): State<AppState>,
    Path(polarity): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let scheduler = scheduler_for(&state, &polarity)?;
    scheduler.stop().await?;
    Ok(Json(serde_json::json!({
        "message": format!("{polarity} scheduler stopped"),
    })))
}

fn scheduler_for<'a>(
    state: &'a AppState,
    polarity: &str,
) -> Result<&'a Arc<DivergenceScheduler>, AppError> {
    match polarity {
        "bullish" => Ok(&state.bullish_scheduler),
        "bearish" => Ok(&state.bearish_scheduler),
        other => Err(AnalysisError::Validation(format!(
            "unknown scheduler polarity '{other}'"
        ))
        .into()),
    }
}
