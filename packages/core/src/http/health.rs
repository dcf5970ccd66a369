use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::json;

use super::AppState;

/// Unauthenticated liveness probe: database reachability plus the LLM
/// endpoint's last-known status. Never returns a non-200; degraded
/// subsystems are reported in the body, not the status code.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let db_ok = sqlx::query("SELECT 1").execute(&state.store.pool).await.is_ok();
    let llm = state.llm.check_llm_health().await;

    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "database": db_ok,
        "llm": llm,
    }))
}
