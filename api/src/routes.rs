use crate::error::ApiError;
use crate::models::{
    LeaderboardResponse, MoversResponse, OhlcvResponse, StrategiesResponse, SubmitResponse,
    TokensResponse, TradeReport, WhalesResponse,
};
use crate::services::CandleQuery;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

type SharedState = Arc<AppState>;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// API 라우터
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tokens", get(get_tokens))
        .route("/api/movers", get(get_movers))
        .route("/api/whales", get(get_whales))
        .route("/api/backtest", get(get_backtest))
        .route("/api/leaderboard", get(get_leaderboard).post(post_leaderboard))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_tokens(State(state): State<SharedState>) -> Json<TokensResponse> {
    Json(state.tokens.list(now()).await)
}

async fn get_movers(State(state): State<SharedState>) -> Result<Json<MoversResponse>, ApiError> {
    Ok(Json(state.movers.movers(now()).await?))
}

async fn get_whales(State(state): State<SharedState>) -> Json<WhalesResponse> {
    Json(state.whales.whales(now()).await)
}

async fn get_backtest(
    State(state): State<SharedState>,
    Query(query): Query<CandleQuery>,
) -> Result<Json<OhlcvResponse>, ApiError> {
    Ok(Json(state.ohlcv.candles(&query, now()).await?))
}

#[derive(Debug, Deserialize)]
struct LeaderboardQuery {
    view: Option<String>,
}

async fn get_leaderboard(
    State(state): State<SharedState>,
    Query(query): Query<LeaderboardQuery>,
) -> Response {
    if query.view.as_deref() == Some("strategies") {
        let strategies: StrategiesResponse = state.leaderboard.strategies(now()).await;
        return Json(strategies).into_response();
    }

    let board: LeaderboardResponse = state.leaderboard.leaderboard(now()).await;
    Json(board).into_response()
}

/// 본문은 직접 파싱한다. 형식이 틀려도 항상 같은 400 메시지를 돌려준다
async fn post_leaderboard(
    State(state): State<SharedState>,
    body: String,
) -> Result<Json<SubmitResponse>, ApiError> {
    let report: TradeReport = serde_json::from_str(&body)
        .map_err(|_| ApiError::BadRequest("missing customer_id or event".to_string()))?;

    Ok(Json(state.leaderboard.submit(report, now()).await?))
}
