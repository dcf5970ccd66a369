use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::threat_intel::IocType;

use super::{require_bearer, AppState};

pub async fn stats(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    require_bearer(&state, &headers).await?;
    Ok(Json(state.threat_intel.stats().await))
}

#[derive(Debug, Deserialize)]
pub struct LookupQuery {
    #[serde(rename = "type")]
    pub ioc_type: String,
    pub value: String,
}

pub async fn lookup(State(state): State<Arc<AppState>>, headers: HeaderMap, Query(query): Query<LookupQuery>) -> Result<Json<Value>, StatusCode> {
    require_bearer(&state, &headers).await?;
    let ioc_type: IocType = serde_json::from_value(json!(query.ioc_type)).map_err(|_| StatusCode::BAD_REQUEST)?;
    let entry = state.threat_intel.lookup(ioc_type, &query.value).await;
    Ok(Json(json!({ "match": entry.is_some(), "entry": entry })))
}
