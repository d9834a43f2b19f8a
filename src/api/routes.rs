//! HTTP handlers.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{compute_projections, compute_timeline, ApiState};

fn not_found(what: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("{what} not found") })),
    )
}

fn internal(err: impl std::fmt::Display) -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": err.to_string() })),
    )
}

pub async fn get_status(
    State(state): State<ApiState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let snapshot = state
        .status
        .read()
        .map_err(|_| internal("status lock poisoned"))?
        .clone();
    let mut value = serde_json::to_value(&snapshot).map_err(internal)?;
    if let Some(obj) = value.as_object_mut() {
        obj.insert("events_dropped".to_string(), json!(state.bus.dropped_total()));
        obj.insert(
            "subscribers".to_string(),
            json!(state.bus.subscriber_count()),
        );
    }
    Ok(Json(value))
}

pub async fn get_backlog(
    State(state): State<ApiState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let backlog = state.backlog_store.load().map_err(internal)?;
    let counts = backlog.status_counts();
    Ok(Json(json!({
        "backlog": backlog,
        "counts": counts,
    })))
}

pub async fn get_feature(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let backlog = state.backlog_store.load().map_err(internal)?;
    match backlog.feature(&id) {
        Some(feature) => Ok(Json(serde_json::to_value(feature).map_err(internal)?)),
        None => Err(not_found("feature")),
    }
}

#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    pub feature_id: Option<String>,
    pub outcome: Option<String>,
}

fn default_page() -> usize {
    1
}

fn default_page_size() -> usize {
    20
}

pub async fn get_sessions(
    State(state): State<ApiState>,
    Query(query): Query<SessionsQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut records = state.history.load().map_err(internal)?;
    if let Some(feature_id) = &query.feature_id {
        records.retain(|r| r.feature_id.as_deref() == Some(feature_id.as_str()));
    }
    if let Some(outcome) = &query.outcome {
        records.retain(|r| r.outcome.label() == outcome);
    }
    // Newest first.
    records.sort_by(|a, b| b.started_at.cmp(&a.started_at));

    let total = records.len();
    let page = query.page.max(1);
    let page_size = query.page_size.clamp(1, 200);
    let start = (page - 1).saturating_mul(page_size).min(total);
    let end = (start + page_size).min(total);

    let page_records = &records[start..end];
    Ok(Json(json!({
        "sessions": page_records,
        "page": page,
        "page_size": page_size,
        "total": total,
    })))
}

pub async fn get_session(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let records = state.history.load().map_err(internal)?;
    match records.into_iter().find(|r| r.session_id == id) {
        Some(record) => Ok(Json(serde_json::to_value(record).map_err(internal)?)),
        None => Err(not_found("session")),
    }
}

#[derive(Debug, Deserialize)]
pub struct CostsQuery {
    pub days: Option<u32>,
}

pub async fn get_costs(
    State(state): State<ApiState>,
    Query(query): Query<CostsQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let summary = state.history.cost_summary(query.days).map_err(internal)?;
    Ok(Json(serde_json::to_value(summary).map_err(internal)?))
}

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    #[serde(default = "default_lines")]
    pub lines: usize,
    #[serde(default)]
    pub offset: usize,
}

fn default_lines() -> usize {
    50
}

pub async fn get_progress(
    State(state): State<ApiState>,
    Query(query): Query<ProgressQuery>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let content = state
        .progress
        .tail_lines(query.lines.min(5000), query.offset)
        .map_err(internal)?;
    Ok(Json(json!({
        "content": content,
        "lines": query.lines,
        "offset": query.offset,
    })))
}

pub async fn get_progress_full(
    State(state): State<ApiState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let content = state.progress.read_full().map_err(internal)?;
    Ok(Json(json!({ "content": content })))
}

pub async fn get_projections(
    State(state): State<ApiState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let backlog = state.backlog_store.load().map_err(internal)?;
    let sessions = state.history.load().map_err(internal)?;
    let projections = compute_projections(&backlog, &sessions);
    Ok(Json(serde_json::to_value(projections).map_err(internal)?))
}

pub async fn get_timeline(
    State(state): State<ApiState>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let backlog = state.backlog_store.load().map_err(internal)?;
    let sessions = state.history.load().map_err(internal)?;
    let timeline = compute_timeline(&backlog, &sessions);
    Ok(Json(serde_json::to_value(timeline).map_err(internal)?))
}

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    #[serde(default)]
    pub include_dismissed: bool,
}

pub async fn get_alerts(
    State(state): State<ApiState>,
    Query(query): Query<AlertsQuery>,
) -> Json<Value> {
    let alerts = state.alerts.list(query.include_dismissed);
    Json(json!({
        "alerts": alerts,
        "unread_count": state.alerts.unread_count(),
    }))
}

pub async fn get_unread_count(State(state): State<ApiState>) -> Json<Value> {
    Json(json!(state.alerts.unread_count()))
}

pub async fn mark_alert_read(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if state.alerts.mark_read(&id) {
        Ok(Json(json!({ "ok": true })))
    } else {
        Err(not_found("alert"))
    }
}

pub async fn mark_all_alerts_read(State(state): State<ApiState>) -> Json<Value> {
    let count = state.alerts.mark_all_read();
    Json(json!({ "ok": true, "marked": count }))
}

pub async fn dismiss_alert(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if state.alerts.dismiss(&id) {
        Ok(Json(json!({ "ok": true })))
    } else {
        Err(not_found("alert"))
    }
}
