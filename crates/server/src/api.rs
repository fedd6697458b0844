//! `/api` routes: ranking listings, rank lookup, buy candidates, ticker
//! detail and checklist writes, diagnostics

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::Json,
    routing::get,
    Router,
};
use chrono::Utc;
use persistence::query::ListParams;
use persistence::repository::{RankingRepository, TickerRepository, BUY_CANDIDATES, SAMPLE_ROWS};
use persistence::schema::SNAPSHOT_TABLE;
use persistence::{ColumnCache, Database};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::error::ApiError;
use crate::APP_VERSION;

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub columns: Arc<ColumnCache>,
    pub schema: Arc<str>,
    pub page_size: i64,
}

impl AppState {
    fn ranking(&self) -> RankingRepository<'_> {
        RankingRepository::new(self.db.pool(), &self.columns, &self.schema)
    }

    fn tickers(&self) -> TickerRepository<'_> {
        TickerRepository::new(self.db.pool(), &self.columns, &self.schema)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(api_health))
        .route("/checklist", get(api_checklist))
        .route("/stocks", get(api_stocks))
        .route("/ranks", get(api_ranks))
        .route("/buy", get(api_buy))
        .route(
            "/ticker",
            get(api_get_ticker)
                .patch(api_patch_ticker)
                .fallback(api_ticker_not_allowed),
        )
        .route("/db-test", get(api_db_test))
        .with_state(state)
}

fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    params.get(key).map(|s| s.trim()).filter(|s| !s.is_empty())
}

// ============================================================================
// Listings
// ============================================================================

/// GET /api/checklist: ranked tickers joined with their snapshot
async fn api_checklist(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    let mut list = ListParams::from_query(&params, state.page_size);
    list.filter.tickers.clear();

    let page = state.ranking().list_checklist(&list).await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "page": list.paging.page,
        "pageSize": list.paging.page_size,
        "total": page.total,
        "rows": page.rows,
    })))
}

/// GET /api/stocks: snapshot rows with filters, sort and paging
async fn api_stocks(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    let list = ListParams::from_query(&params, state.page_size);

    let page = state.ranking().list_stocks(&list).await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "page": list.paging.page,
        "pageSize": list.paging.page_size,
        "total": page.total,
        "rows": page.rows,
    })))
}

/// GET /api/ranks?tickers=A,B: final rank per requested ticker
async fn api_ranks(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    let raw = param(&params, "tickers")
        .ok_or_else(|| ApiError::BadRequest("tickers is required (comma-separated)".into()))?;

    let rows = state.ranking().get_ranks_by_tickers(raw).await?;
    Ok(Json(serde_json::json!({ "ok": true, "rows": rows })))
}

/// GET /api/buy: top-ranked tickers with their price
async fn api_buy(State(state): State<AppState>) -> ApiResult {
    let rows = state.ranking().top_buy_candidates(BUY_CANDIDATES).await?;
    Ok(Json(serde_json::json!({ "ok": true, "rows": rows })))
}

// ============================================================================
// Ticker detail and checklist writes
// ============================================================================

#[derive(Debug, Deserialize)]
struct TickerPatch {
    #[serde(default)]
    ticker: Option<String>,
    #[serde(default)]
    in_checklist: Option<bool>,
    #[serde(default)]
    notes: Option<String>,
}

fn required_ticker(raw: Option<&str>) -> Result<String, ApiError> {
    portfolio::normalize_ticker(raw.unwrap_or_default())
        .ok_or_else(|| ApiError::BadRequest("ticker is required".into()))
}

async fn ticker_response(state: &AppState, ticker: &str) -> ApiResult {
    match state.tickers().get_ticker(ticker).await? {
        Some(detail) => Ok(Json(serde_json::json!({ "ok": true, "data": detail }))),
        None => Err(ApiError::NotFound(format!("ticker not found: {}", ticker))),
    }
}

/// GET /api/ticker?ticker=X
async fn api_get_ticker(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult {
    let ticker = required_ticker(param(&params, "ticker"))?;
    ticker_response(&state, &ticker).await
}

/// PATCH /api/ticker: add/remove from the checklist, edit notes; answers
/// with the updated detail
async fn api_patch_ticker(
    State(state): State<AppState>,
    body: Result<Json<TickerPatch>, JsonRejection>,
) -> ApiResult {
    let Json(patch) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let ticker = required_ticker(patch.ticker.as_deref())?;
    debug!(ticker = %ticker, in_checklist = ?patch.in_checklist, "ticker patch");

    state
        .tickers()
        .update_checklist(&ticker, patch.in_checklist, patch.notes.as_deref())
        .await?;
    ticker_response(&state, &ticker).await
}

async fn api_ticker_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed { allow: "GET,PATCH" }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// GET /api/db-test: first raw snapshot rows
async fn api_db_test(State(state): State<AppState>) -> ApiResult {
    let sample = state.tickers().sample_rows(SAMPLE_ROWS).await?;
    Ok(Json(serde_json::json!({
        "ok": true,
        "table": SNAPSHOT_TABLE,
        "sample": sample,
    })))
}

/// GET /api/health
async fn api_health() -> Json<Value> {
    Json(serde_json::json!({
        "ok": true,
        "service": "magic-web",
        "version": APP_VERSION,
        "time": Utc::now().to_rfc3339(),
    }))
}
