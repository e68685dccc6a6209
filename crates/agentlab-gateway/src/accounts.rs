//! /auth endpoints: registration, login, logout, and the caller's profile

use crate::auth::bearer_token;
use crate::error::ApiResult;
use crate::extract::Json;
use crate::password;
use crate::server::{AppState, CurrentUser};
use agentlab_core::{Error, NewUser, Result, User};
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const BAD_CREDENTIALS: &str = "Incorrect username or password";

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Either `username` or `email` identifies the account.
#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub user: User,
    pub access_token: String,
    pub token_type: &'static str,
}

impl TokenResponse {
    fn bearer(user: User, access_token: String) -> Self {
        Self { user, access_token, token_type: "bearer" }
    }
}

/// PBKDF2 is CPU bound; keep it off the async workers.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(format!("password task failed: {}", e)))
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<TokenResponse>)> {
    let new = NewUser { username: body.username, email: body.email };
    new.validate()?;
    password::validate(&body.password)?;

    let secret = body.password;
    let hash = blocking(move || password::hash_password(&secret)).await??;
    let user = state.store.insert_user(new, Utc::now()).await?;
    state.store.set_password_hash(user.id, hash).await?;
    let access_token = state.auth.issue(user.id).await?;
    info!("Registered user {} ({})", user.id, user.username);
    Ok((StatusCode::CREATED, Json(TokenResponse::bearer(user, access_token))))
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let Some(login) = body.email.or(body.username).filter(|l| !l.is_empty()) else {
        return Err(Error::validation("username or email is required").into());
    };

    let Some(user) = state.store.find_user(&login).await? else {
        warn!("Login for unknown account {}", login);
        return Err(Error::unauthorized(BAD_CREDENTIALS).into());
    };
    let Some(stored) = state.store.password_hash(user.id).await? else {
        warn!("Login for user {} without a password", user.id);
        return Err(Error::unauthorized(BAD_CREDENTIALS).into());
    };

    let secret = body.password;
    if !blocking(move || password::verify_password(&secret, &stored)).await? {
        warn!("Failed login for user {}", user.id);
        return Err(Error::unauthorized(BAD_CREDENTIALS).into());
    }

    let access_token = state.auth.issue(user.id).await?;
    info!("User {} logged in", user.id);
    Ok(Json(TokenResponse::bearer(user, access_token)))
}

pub async fn logout(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    if let Some(token) = bearer_token(&headers) {
        state.auth.revoke(token).await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<User>> {
    Ok(Json(state.auth.user(user).await?))
}
