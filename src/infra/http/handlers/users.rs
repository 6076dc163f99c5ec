//! Back-office user administration. Every route requires the admin role.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use crate::application::repos::UserQueryFilter;
use crate::domain::types::{ApprovalFilter, Role};

use crate::infra::http::error::ApiError;
use crate::infra::http::middleware::Authenticated;
use crate::infra::http::state::ApiState;

#[derive(Debug, Deserialize, Default)]
pub struct UserListQuery {
    #[serde(default)]
    pub status: ApprovalFilter,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RoleChangeRequest {
    pub role: Role,
}

pub async fn list(
    State(state): State<ApiState>,
    auth: Authenticated,
    Query(query): Query<UserListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Admin)?;
    let users = state
        .users
        .list(UserQueryFilter {
            status: query.status,
            search: query.search,
        })
        .await?;
    Ok(Json(users))
}

pub async fn get_by_id(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Admin)?;
    let user = state.users.find_by_id(id).await?;
    Ok(Json(user))
}

pub async fn stats(
    State(state): State<ApiState>,
    auth: Authenticated,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Admin)?;
    let stats = state.users.stats().await?;
    Ok(Json(stats))
}

pub async fn approve(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Admin)?;
    let user = state.users.approve(id).await?;
    Ok(Json(user))
}

pub async fn reject(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Admin)?;
    state.users.reject(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_role(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoleChangeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Admin)?;
    let user = state.users.set_role(id, payload.role).await?;
    Ok(Json(user))
}

pub async fn delete(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Admin)?;
    state.users.remove(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
