//! HTTP surface (C10/C11 operator + agent routes), mounted under
//! `/api/v1`. The dashboard UI, ORM migrations and notification adapters
//! that also live behind this surface in the reference deployment are
//! out of scope here; only the routes Core itself serves are implemented.

mod agents;
mod alerts;
mod audit;
mod auth;
mod deployment;
mod health;
mod threat_intel;

use std::sync::Arc;

use aegis_cache::Cache;
use aegis_credentials::RootCa;
use aegis_store::models::{AgentRow, UserRow};
use aegis_store::Store;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::Router;

use crate::config_sync::ConfigSync;
use crate::decision::DecisionEngine;
use crate::llm::LlmEnricher;
use crate::registry::Registry;
use crate::threat_intel::ThreatIntelStore;

pub struct AppState {
    pub store: Store,
    pub bus: Arc<aegis_bus::Bus>,
    pub cache: Arc<dyn Cache>,
    pub registry: Arc<Registry>,
    pub config_sync: Arc<ConfigSync>,
    pub decision: Arc<DecisionEngine>,
    pub threat_intel: Arc<ThreatIntelStore>,
    pub llm: Arc<LlmEnricher>,
    pub ca: Arc<RootCa>,
    pub master_secret: String,
}

pub fn router(state: Arc<AppState>) -> Router {
    let v1 = Router::new()
        .route("/token", post(auth::issue_token))
        .route("/users/", post(auth::create_user))
        .route("/users/me", get(auth::me))
        .route("/agents/register", post(agents::register))
        .route("/agents/heartbeat", post(agents::heartbeat))
        .route("/agents/", get(agents::list))
        .route("/agents/strikers", get(agents::list_strikers))
        .route("/agents/{id}", put(agents::update_profile))
        .route("/agents/{id}/config", get(agents::get_config).put(agents::put_config))
        .route("/agent-config/{id}/config", get(agents::get_agent_facing_config))
        .route("/events/", get(alerts::list_events))
        .route("/events/{id}/strike", post(alerts::strike_event))
        .route("/alerts/", get(alerts::list_alerts))
        .route("/alerts/{id}", get(alerts::get_alert))
        .route("/alerts/{id}/dispatch", post(alerts::dispatch_alert))
        .route("/threat-intel/stats", get(threat_intel::stats))
        .route("/threat-intel/lookup", get(threat_intel::lookup))
        .route("/health", get(health::health))
        .route("/audit/verify", get(audit::verify_chain))
        .route("/deployment/scan", post(deployment::scan))
        .route("/deployment/nodes", get(deployment::list_nodes).post(deployment::register_node))
        .route("/deployment/nodes/{id}/deploy", post(deployment::deploy_node));

    Router::new().nest("/api/v1", v1).with_state(state)
}

/// Validates the `X-Agent-API-Key` header against the stored
/// prefix+hash, returning the matching agent row. This is the same
/// prefix-then-hash lookup registration uses.
pub(crate) async fn require_agent_api_key(state: &AppState, headers: &HeaderMap) -> Result<AgentRow, StatusCode> {
    let api_key = headers.get("X-Agent-API-Key").and_then(|v| v.to_str().ok()).ok_or(StatusCode::UNAUTHORIZED)?;
    let prefix = aegis_credentials::key_prefix(api_key);
    let agent = state.store.find_agent_by_prefix(prefix).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?.ok_or(StatusCode::UNAUTHORIZED)?;
    let ok = aegis_credentials::verify_api_key(api_key, &agent.api_key_hash).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if !ok {
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(agent)
}

/// Validates the `Authorization: Bearer <token>` header against the
/// opaque operator token store, comparing candidates in constant time.
pub(crate) async fn require_bearer(state: &AppState, headers: &HeaderMap) -> Result<UserRow, StatusCode> {
    let header = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok()).ok_or(StatusCode::UNAUTHORIZED)?;
    let token = header.strip_prefix("Bearer ").ok_or(StatusCode::UNAUTHORIZED)?;

    let candidates = state.store.active_bearer_token_candidates().await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    candidates
        .into_iter()
        .find(|u| u.bearer_token.as_deref().is_some_and(|stored| constant_time_eq(stored, token)))
        .ok_or(StatusCode::UNAUTHORIZED)
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
