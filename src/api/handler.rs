use crate::error::{AppError, AppResult};
use crate::storage::{clicks, deals, stats, users, Db};
use crate::types::{Deal, DealsQueryParams, HealthResponse, User, UsersQueryParams};
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::Redirect;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

/// Shared state for dashboard and redirect endpoints.
pub struct ApiState {
    pub db: Db,
}

/// GET /api/stats - Platform-wide aggregates plus derived rates.
pub async fn get_stats(State(state): State<Arc<ApiState>>) -> AppResult<Json<serde_json::Value>> {
    let stats = stats::get_deal_stats(&state.db).await?;

    Ok(Json(serde_json::json!({
        "total_deals": stats.total_deals,
        "recent_deals": stats.recent_deals,
        "total_clicks": stats.total_clicks,
        "total_conversions": stats.total_conversions,
        "total_earnings": round2(stats.total_earnings),
        "active_users": stats.active_users,
        "conversion_rate": round2(stats.conversion_rate()),
        "avg_earnings_per_deal": round2(stats.avg_earnings_per_deal()),
        "avg_earnings_per_click": round4(stats.avg_earnings_per_click()),
        "category_stats": stats.category_stats,
        "source_stats": stats.source_stats,
        "timestamp": chrono::Utc::now(),
    })))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

/// GET /api/deals - Recent active deals, newest first.
pub async fn list_deals(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<DealsQueryParams>,
) -> AppResult<Json<Vec<Deal>>> {
    let hours = params.hours();
    let limit = params.limit();
    let deals = deals::get_recent_deals(&state.db, hours, limit, params.category).await?;
    Ok(Json(deals))
}

/// GET /api/deals/{id} - Single deal lookup.
pub async fn get_deal(
    State(state): State<Arc<ApiState>>,
    Path(deal_id): Path<i64>,
) -> AppResult<Json<Deal>> {
    let deal = deals::get_deal(&state.db, deal_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("deal {deal_id} not found")))?;
    Ok(Json(deal))
}

/// GET /api/users - Users seen within the window, most recent first.
pub async fn list_users(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<UsersQueryParams>,
) -> AppResult<Json<Vec<User>>> {
    let users = users::get_active_users(&state.db, params.days()).await?;
    Ok(Json(users))
}

#[derive(Debug, Deserialize)]
pub struct RedirectParams {
    /// Clicking user's platform identity, when the bot knows it.
    pub u: Option<i64>,
}

/// GET /r/{deal_id} - Record the click, then bounce to the affiliate link.
pub async fn redirect_deal(
    State(state): State<Arc<ApiState>>,
    Path(deal_id): Path<i64>,
    Query(params): Query<RedirectParams>,
    headers: HeaderMap,
) -> AppResult<Redirect> {
    let deal = deals::get_deal(&state.db, deal_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("deal {deal_id} not found")))?;

    // Stored links are validated at insert; re-check before bouncing anyway.
    if !deal.affiliate_link.starts_with("http://") && !deal.affiliate_link.starts_with("https://") {
        return Err(AppError::Internal(format!(
            "deal {deal_id} has a non-http affiliate link"
        )));
    }

    clicks::record_click(
        &state.db,
        deal_id,
        params.u,
        client_ip(&headers),
        header_value(&headers, "user-agent"),
        header_value(&headers, "referer"),
    )
    .await?;

    Ok(Redirect::temporary(&deal.affiliate_link))
}

/// GET /health - Liveness plus a database round trip.
pub async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    let db_ok = state
        .db
        .run("health", |conn| conn.execute_batch("SELECT 1"))
        .await
        .is_ok();

    Json(HealthResponse {
        status: if db_ok { "healthy" } else { "degraded" }.to_string(),
        database: if db_ok { "connected" } else { "disconnected" }.to_string(),
        timestamp: chrono::Utc::now(),
    })
}

/// Client address from the proxy-forwarded header; first hop wins.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
