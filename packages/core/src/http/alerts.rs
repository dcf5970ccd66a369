use std::sync::Arc;

use aegis_store::models::{AlertRow, EventRow};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::{require_bearer, AppState};

const ACTIONS_BROADCAST_SUBJECT: &str = "actions.broadcast";

pub async fn list_events(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Vec<EventRow>>, StatusCode> {
    require_bearer(&state, &headers).await?;
    let rows = state.store.list_events().await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(rows))
}

#[derive(Debug, Deserialize)]
pub struct StrikeRequest {
    pub action_type: String,
    pub striker_id: Option<Uuid>,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Operator-initiated single-action dispatch against a specific event,
/// bypassing the correlation/decision pipeline entirely.
pub async fn strike_event(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(event_id): Path<Uuid>,
    Json(req): Json<StrikeRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    require_bearer(&state, &headers).await?;
    let event = state.store.get_event(event_id).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?.ok_or(StatusCode::NOT_FOUND)?;

    let action_id = Uuid::new_v4();
    state
        .store
        .insert_action(action_id, req.striker_id, &req.action_type, req.parameters.clone(), "operator")
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let payload = json!({
        "action_id": action_id,
        "event_id": event.event_id,
        "action_type": req.action_type,
        "parameters": req.parameters,
        "timestamp": chrono::Utc::now(),
    });
    dispatch(&state, &req.action_type, &payload).await;
    audit(&state, "operator", "strike_event", &event_id.to_string(), &payload).await;

    Ok(Json(json!({ "action_id": action_id, "status": "queued" })))
}

pub async fn list_alerts(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Vec<AlertRow>>, StatusCode> {
    require_bearer(&state, &headers).await?;
    let rows = state.store.list_alerts().await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(rows))
}

pub async fn get_alert(State(state): State<Arc<AppState>>, headers: HeaderMap, Path(alert_id): Path<Uuid>) -> Result<Json<AlertRow>, StatusCode> {
    require_bearer(&state, &headers).await?;
    let row = state.store.get_alert(alert_id).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?.ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(row))
}

#[derive(Debug, Deserialize)]
pub struct DispatchRequest {
    pub action_type: String,
    pub striker_id: Option<Uuid>,
    #[serde(default)]
    pub parameters: serde_json::Value,
}

/// Operator override of the decision engine's verdict: dispatch an
/// explicit action list against an already-minted alert.
pub async fn dispatch_alert(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(alert_id): Path<Uuid>,
    Json(req): Json<DispatchRequest>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    require_bearer(&state, &headers).await?;
    let alert = state.store.get_alert(alert_id).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?.ok_or(StatusCode::NOT_FOUND)?;

    let action_id = Uuid::new_v4();
    state
        .store
        .insert_action(action_id, req.striker_id, &req.action_type, req.parameters.clone(), "operator")
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    let payload = json!({
        "action_id": action_id,
        "alert_id": alert.alert_id,
        "action_type": req.action_type,
        "parameters": req.parameters,
        "timestamp": chrono::Utc::now(),
    });
    dispatch(&state, &req.action_type, &payload).await;
    audit(&state, "operator", "dispatch_alert", &alert_id.to_string(), &payload).await;

    Ok(Json(json!({ "action_id": action_id, "status": "queued" })))
}

async fn audit(state: &AppState, actor: &str, action: &str, resource: &str, details: &serde_json::Value) {
    if let Err(err) = state.store.append_audit_entry(actor, action, Some(resource), details.clone()).await {
        tracing::warn!(%err, "failed to append audit log entry");
    }
}

async fn dispatch(state: &AppState, action_type: &str, payload: &serde_json::Value) {
    if let Err(err) = state.bus.publish_json(ACTIONS_BROADCAST_SUBJECT, payload).await {
        tracing::warn!(%err, "failed to broadcast operator-dispatched action");
    }
    if let Err(err) = state.bus.publish_json(format!("actions.{action_type}").as_str(), payload).await {
        tracing::warn!(%err, "failed to dispatch operator action on type-specific subject");
    }
}
