//! Remote-deployment surface: SSH/WinRM provisioning itself lives in an
//! external orchestrator out of scope here. These routes expose the
//! interface that orchestrator is expected to drive — discovery,
//! registration and a deploy trigger — against the `infra_nodes` table.

use std::sync::Arc;

use aegis_store::models::InfraNodeRow;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::{require_bearer, AppState};

/// Network discovery is performed by the external orchestrator; this
/// endpoint only acknowledges a scan request and reports nodes already on
/// record, matching the "interface only" contract.
pub async fn scan(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    require_bearer(&state, &headers).await?;
    let nodes = state.store.list_infra_nodes().await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(json!({ "scanned": nodes.len(), "nodes": nodes })))
}

pub async fn list_nodes(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Vec<InfraNodeRow>>, StatusCode> {
    require_bearer(&state, &headers).await?;
    let nodes = state.store.list_infra_nodes().await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(nodes))
}

#[derive(Debug, Deserialize)]
pub struct RegisterNodeRequest {
    pub hostname: String,
    pub address: String,
}

pub async fn register_node(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterNodeRequest>,
) -> Result<Json<InfraNodeRow>, StatusCode> {
    require_bearer(&state, &headers).await?;
    let node = state.store.insert_infra_node(&req.hostname, &req.address).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(node))
}

/// Flags a node as deployed. Provisioning itself (pushing the Sentinel
/// binary and bootstrap credentials over SSH/WinRM) happens outside Core;
/// this call only records that the orchestrator reported success.
pub async fn deploy_node(State(state): State<Arc<AppState>>, headers: HeaderMap, Path(id): Path<Uuid>) -> Result<Json<InfraNodeRow>, StatusCode> {
    require_bearer(&state, &headers).await?;
    let node = state.store.mark_infra_node_deployed(id).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?.ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(node))
}
