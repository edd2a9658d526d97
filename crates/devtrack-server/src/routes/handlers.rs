//! HTTP handlers.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use devtrack_core::models::{
    ActivityStats, ActivitySummary, ApiEnvelope, BatchRequest, BatchResult, CacheHealth, Dashboard, HeatmapDay,
    LogActivityRequest, ResourceKind,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::auth::AuthUser;
use super::error::{ok, ApiResult, ServerError};
use super::AppState;
use crate::activity::DEFAULT_HEATMAP_DAYS;
use crate::cache::keys;
use crate::dashboard;

fn parse_kind(raw: &str) -> Result<ResourceKind, ServerError> {
    raw.parse::<ResourceKind>()
        .map_err(|e| ServerError::BadRequest(e.to_string()))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ServerError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ServerError::BadRequest(rejection.body_text()))
}

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    "OK"
}

/// GET /cache-health
pub async fn cache_health(State(state): State<AppState>) -> Json<ApiEnvelope<CacheHealth>> {
    ok(state.cache.health().await)
}

// === Resources ===

/// GET /resources/:kind
pub async fn list_resources(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(kind): Path<String>,
) -> ApiResult<Vec<Value>> {
    let kind = parse_kind(&kind)?;
    let docs = state
        .cache
        .get_cached(
            &keys::collection(kind, &user),
            keys::COLLECTION_TTL_SECS,
            || state.store.list(kind, &user),
        )
        .await?;
    Ok(ok(docs))
}

/// POST /resources/:kind
pub async fn create_resource(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(kind): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let kind = parse_kind(&kind)?;
    let record = state.store.create(kind, &user, body(payload)?).await?;
    state.invalidator.invalidate_resource(kind, &user).await;
    Ok(ok(record))
}

/// DELETE /resources/:kind/:id
pub async fn delete_resource(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Value> {
    let kind = parse_kind(&kind)?;
    if !state.store.delete(kind, &user, &id).await? {
        return Err(ServerError::NotFound(format!("{} '{}' not found", kind, id)));
    }
    state.invalidator.invalidate_resource(kind, &user).await;
    Ok(ok(json!({ "deleted": id })))
}

/// POST /resources/:kind/batch
pub async fn batch_update(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(kind): Path<String>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> ApiResult<BatchResult> {
    let kind = parse_kind(&kind)?;
    let request = body(payload)?;
    if request.is_empty() {
        return Ok(ok(BatchResult::default()));
    }

    let size = request.len();
    let result = state.store.apply_batch(kind, &user, request.updates).await?;
    if result.updated > 0 {
        state.invalidator.invalidate_resource(kind, &user).await;
    }

    info!(%kind, user = %user, size, updated = result.updated, errors = result.errors.len(), "Batch applied");
    Ok(ok(result))
}

// === Activity ===

/// POST /activity
pub async fn log_activity(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    payload: Result<Json<LogActivityRequest>, JsonRejection>,
) -> ApiResult<ActivitySummary> {
    let request = body(payload)?;
    let activity_type = request.activity_type.trim();
    if activity_type.is_empty() {
        return Err(ServerError::BadRequest("activity type is required".to_string()));
    }

    let summary = state
        .activity
        .log_event(&user, request.date, activity_type, &request.description)
        .await?;
    Ok(ok(summary))
}

#[derive(Debug, Deserialize)]
pub struct HeatmapQuery {
    pub days: Option<u32>,
}

/// GET /activity/heatmap?days=N
pub async fn heatmap(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    query: Result<Query<HeatmapQuery>, QueryRejection>,
) -> ApiResult<Vec<HeatmapDay>> {
    let Query(query) = query.map_err(|rejection| ServerError::BadRequest(rejection.body_text()))?;
    let days = query.days.unwrap_or(DEFAULT_HEATMAP_DAYS);
    let today = Utc::now().date_naive();
    Ok(ok(state.activity.heatmap(&user, days, today).await?))
}

/// GET /activity/stats
pub async fn stats(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<ActivityStats> {
    let today = Utc::now().date_naive();
    Ok(ok(state.activity.stats(&user, today).await?))
}

// === Dashboard & Data ===

/// GET /dashboard
pub async fn get_dashboard(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Dashboard> {
    let today = Utc::now().date_naive();
    Ok(ok(dashboard::load(&state.cache, &state.store, &user, today).await?))
}

/// DELETE /data
pub async fn clear_data(State(state): State<AppState>, AuthUser(user): AuthUser) -> ApiResult<Value> {
    let removed = state.store.clear_user(&user).await?;
    let invalidated = state.invalidator.invalidate_user(&user).await;
    info!(user = %user, removed, invalidated, "Cleared user data");
    Ok(ok(json!({ "deleted": removed })))
}
