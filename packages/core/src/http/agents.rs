use std::sync::Arc;

use aegis_proto::{AgentHeartbeat, AgentRegister};
use aegis_store::agent_configs::UpdatableConfigFields;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{require_agent_api_key, require_bearer, AppState};

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub id: Uuid,
    pub client_cert: String,
    pub client_key: String,
    pub ca_cert: String,
}

pub async fn register(State(state): State<Arc<AppState>>, Json(req): Json<AgentRegister>) -> Result<Json<RegisterResponse>, StatusCode> {
    let registration = state.registry.register(&req).await.map_err(map_core_error)?;
    Ok(Json(RegisterResponse {
        id: registration.agent.id,
        client_cert: registration.certificate.client_cert_pem,
        client_key: registration.certificate.client_key_pem,
        ca_cert: registration.certificate.ca_cert_pem,
    }))
}

pub async fn heartbeat(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(hb): Json<AgentHeartbeat>) -> Result<StatusCode, StatusCode> {
    let agent = require_agent_api_key(&state, &headers).await?;
    state.registry.apply_http_heartbeat(agent.id, &hb).await.map_err(map_core_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Vec<AgentSummary>>, StatusCode> {
    require_bearer(&state, &headers).await?;
    let agents = state.registry.list().await.map_err(map_core_error)?;
    Ok(Json(agents.into_iter().map(AgentSummary::from).collect()))
}

pub async fn list_strikers(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Vec<AgentSummary>>, StatusCode> {
    require_bearer(&state, &headers).await?;
    let agents = state.registry.list().await.map_err(map_core_error)?;
    Ok(Json(agents.into_iter().filter(|a| a.agent_type == "striker").map(AgentSummary::from).collect()))
}

#[derive(Debug, Serialize)]
pub struct AgentSummary {
    pub id: Uuid,
    pub agent_type: String,
    pub agent_subtype: String,
    pub status: String,
    pub zone: String,
    pub capabilities: Value,
    pub last_heartbeat: chrono::DateTime<chrono::Utc>,
    pub config_version: i32,
}

impl From<aegis_store::models::AgentRow> for AgentSummary {
    fn from(row: aegis_store::models::AgentRow) -> Self {
        Self {
            id: row.id,
            agent_type: row.agent_type,
            agent_subtype: row.agent_subtype,
            status: row.status,
            zone: row.zone,
            capabilities: row.capabilities,
            last_heartbeat: row.last_heartbeat,
            config_version: row.config_version,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub agent_subtype: Option<String>,
    pub zone: Option<String>,
    pub capabilities: Option<Vec<String>>,
}

pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<AgentSummary>, StatusCode> {
    require_bearer(&state, &headers).await?;
    let capabilities = req.capabilities.map(|c| serde_json::to_value(c).unwrap_or_default());
    let updated = state
        .store
        .update_agent_profile(id, req.agent_subtype.as_deref(), req.zone.as_deref(), capabilities.clone())
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    // Cascade the profile change into config, matching "update
    // subtype/zone/capabilities, cascade to config".
    if let (Some(zone), Some(caps)) = (req.zone.clone(), capabilities.clone()) {
        let fields = UpdatableConfigFields { zone: Some(zone), capabilities: Some(caps), ..Default::default() };
        let _ = state.config_sync.upsert(id, fields).await;
    }

    Ok(Json(AgentSummary::from(updated)))
}

pub async fn get_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Option<aegis_store::models::AgentConfigRow>>, StatusCode> {
    require_bearer(&state, &headers).await?;
    let row = state.config_sync.get_public_view(id).await.map_err(map_core_error)?;
    Ok(Json(row))
}

#[derive(Debug, Deserialize, Default)]
pub struct PutConfigRequest {
    pub log_level: Option<String>,
    pub environment: Option<String>,
    pub zone: Option<String>,
    pub probe_interval_seconds: Option<i32>,
    pub detection_thresholds: Option<Value>,
    pub capabilities: Option<Value>,
    pub allowed_actions: Option<Value>,
    pub action_defaults: Option<Value>,
    pub max_concurrent_actions: Option<i32>,
}

pub async fn put_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(req): Json<PutConfigRequest>,
) -> Result<Json<aegis_store::models::AgentConfigRow>, StatusCode> {
    require_bearer(&state, &headers).await?;
    let fields = UpdatableConfigFields {
        nats_url_enc: None,
        core_api_url_enc: None,
        log_level: req.log_level,
        environment: req.environment,
        zone: req.zone,
        probe_interval_seconds: req.probe_interval_seconds,
        detection_thresholds: req.detection_thresholds,
        capabilities: req.capabilities,
        allowed_actions: req.allowed_actions,
        action_defaults: req.action_defaults,
        max_concurrent_actions: req.max_concurrent_actions,
    };
    let row = state.config_sync.upsert(id, fields).await.map_err(map_core_error)?;
    Ok(Json(row))
}

/// Agent-facing config fetch: transport-encrypted sensitive fields,
/// authenticated by the agent's own API key rather than an operator
/// bearer token.
pub async fn get_agent_facing_config(State(state): State<Arc<AppState>>, headers: HeaderMap, Path(id): Path<Uuid>) -> Result<Json<Value>, StatusCode> {
    let agent = require_agent_api_key(&state, &headers).await?;
    if agent.id != id {
        return Err(StatusCode::FORBIDDEN);
    }
    let api_key = headers.get("X-Agent-API-Key").and_then(|v| v.to_str().ok()).ok_or(StatusCode::UNAUTHORIZED)?;
    let view = state.config_sync.get_for_agent(id, api_key).await.map_err(map_core_error)?;
    Ok(Json(view))
}

fn map_core_error(err: crate::error::CoreError) -> StatusCode {
    use crate::error::CoreError::*;
    match err {
        ApiKeyMismatch => StatusCode::BAD_REQUEST,
        HeartbeatIdentityMismatch { .. } => StatusCode::FORBIDDEN,
        AgentNotFound(_) | ConfigNotProvisioned(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
