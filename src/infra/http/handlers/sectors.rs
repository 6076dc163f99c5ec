use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::types::Role;

use crate::infra::http::error::ApiError;
use crate::infra::http::middleware::Authenticated;
use crate::infra::http::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct SectorCreateRequest {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Deserialize)]
pub struct SectorUpdateRequest {
    pub name: String,
    pub color: String,
}

pub async fn list(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let sectors = state.sectors.list().await?;
    Ok(Json(sectors))
}

pub async fn get_by_id(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let sector = state.sectors.find_by_id(id).await?;
    Ok(Json(sector))
}

pub async fn stats(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let stats = state.sectors.stats(id).await?;
    Ok(Json(stats))
}

pub async fn create(
    State(state): State<ApiState>,
    auth: Authenticated,
    Json(payload): Json<SectorCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Editor)?;
    let sector = state.sectors.create(&payload.name, &payload.color).await?;
    Ok((StatusCode::CREATED, Json(sector)))
}

pub async fn update(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<Uuid>,
    Json(payload): Json<SectorUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Editor)?;
    let sector = state
        .sectors
        .update(id, &payload.name, &payload.color)
        .await?;
    Ok(Json(sector))
}

pub async fn delete(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Editor)?;
    state.sectors.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
