//! /experiments endpoints over the lifecycle manager

use crate::error::ApiResult;
use crate::extract::{Json, Path};
use crate::server::{AppState, CurrentUser};
use agentlab_core::{AgentId, Experiment, ExperimentId, ExperimentStatus};
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct CreateExperiment {
    pub agent_id: AgentId,
    #[serde(default)]
    pub input_data: Value,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: ExperimentStatus,
}

pub async fn list(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
) -> ApiResult<Json<Vec<Experiment>>> {
    Ok(Json(state.experiments.list(owner).await?))
}

pub async fn create(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
    Json(body): Json<CreateExperiment>,
) -> ApiResult<(StatusCode, Json<Experiment>)> {
    let experiment = state
        .experiments
        .create(owner, body.agent_id, body.input_data)
        .await?;
    Ok((StatusCode::CREATED, Json(experiment)))
}

pub async fn get(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
    Path(id): Path<u64>,
) -> ApiResult<Json<Experiment>> {
    Ok(Json(state.experiments.get(owner, ExperimentId(id)).await?))
}

pub async fn status(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
    Path(id): Path<u64>,
) -> ApiResult<Json<StatusResponse>> {
    let status = state.experiments.get_status(owner, ExperimentId(id)).await?;
    Ok(Json(StatusResponse { status }))
}

pub async fn results(
    State(state): State<Arc<AppState>>,
    CurrentUser(owner): CurrentUser,
    Path(id): Path<u64>,
) -> ApiResult<Json<Experiment>> {
    Ok(Json(state.experiments.get_result(owner, ExperimentId(id)).await?))
}
