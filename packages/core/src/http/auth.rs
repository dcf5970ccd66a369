//! Minimal operator-login surface: just enough to gate the routes marked
//! `bearer` in the HTTP surface table. An opaque random token stored
//! alongside its owner and an expiry, not a JWT/JWK rotation system.

use std::sync::Arc;

use aegis_credentials::{hash_api_key, verify_api_key};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::{require_bearer, AppState};

const TOKEN_TTL_SECONDS: i64 = 24 * 3600;

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: uuid::Uuid,
    pub username: String,
}

pub async fn create_user(State(state): State<Arc<AppState>>, Json(req): Json<CreateUserRequest>) -> Result<Json<UserResponse>, StatusCode> {
    let hash = hash_api_key(&req.password).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let user = state.store.create_user(&req.username, &hash).await.map_err(|_| StatusCode::CONFLICT)?;
    Ok(Json(UserResponse { id: user.id, username: user.username }))
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
}

pub async fn issue_token(State(state): State<Arc<AppState>>, Json(req): Json<TokenRequest>) -> Result<Json<TokenResponse>, StatusCode> {
    let user = state
        .store
        .get_user_by_username(&req.username)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let ok = verify_api_key(&req.password, &user.password_hash).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if !ok {
        return Err(StatusCode::UNAUTHORIZED);
    }

    let token = random_opaque_token();
    let expires_at = chrono::Utc::now() + chrono::Duration::seconds(TOKEN_TTL_SECONDS);
    state.store.set_bearer_token(user.id, &token, expires_at).await.map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(TokenResponse { access_token: token, token_type: "bearer" }))
}

pub async fn me(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Result<Json<UserResponse>, StatusCode> {
    let user = require_bearer(&state, &headers).await?;
    Ok(Json(UserResponse { id: user.id, username: user.username }))
}

fn random_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::Engine::encode(&base64::engine::general_purpose::URL_SAFE_NO_PAD, bytes)
}
