//! /agents endpoints: owner-scoped agent configuration CRUD

use crate::error::ApiResult;
use crate::extract::{Json, Path};
use crate::server::{AppState, CurrentUser};
use agentlab_core::{AgentConfig, AgentId, AgentPatch, Error, NewAgent};
use axum::extract::State;
use axum::http::StatusCode;
use chrono::Utc;
use std::sync::Arc;
use tracing::info;

pub async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
) -> ApiResult<Json<Vec<AgentConfig>>> {
    Ok(Json(state.store.list_agents(owner).await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
    Json(new): Json<NewAgent>,
) -> ApiResult<(StatusCode, Json<AgentConfig>)> {
    new.validate()?;
    let agent = state.store.insert_agent(owner, new, Utc::now()).await?;
    info!("Agent {} ({}) created by user {}", agent.id, agent.framework, owner);
    Ok((StatusCode::CREATED, Json(agent)))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
    Path(id): Path<u64>,
) -> ApiResult<Json<AgentConfig>> {
    let id = AgentId(id);
    let agent = state
        .store
        .get_owned_agent(id, owner)
        .await?
        .ok_or(Error::AgentNotFound(id))?;
    Ok(Json(agent))
}

pub async fn update(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
    Path(id): Path<u64>,
    Json(patch): Json<AgentPatch>,
) -> ApiResult<Json<AgentConfig>> {
    patch.validate()?;
    let agent = state.store.update_agent(AgentId(id), owner, patch, Utc::now()).await?;
    Ok(Json(agent))
}

pub async fn delete(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
    Path(id): Path<u64>,
) -> ApiResult<StatusCode> {
    state.store.delete_agent(AgentId(id), owner).await?;
    info!("Agent {} deleted by user {}", id, owner);
    Ok(StatusCode::NO_CONTENT)
}
