use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use crate::application::themes::{CreateThemeCommand, UpdateThemeCommand};
use crate::domain::types::Role;

use crate::infra::http::error::ApiError;
use crate::infra::http::middleware::Authenticated;
use crate::infra::http::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct ThemeCreateRequest {
    pub name: String,
    pub description: Option<String>,
    pub position: Option<i32>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ThemeUpdateRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub position: Option<i32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeExhibitorsRequest {
    pub exhibitor_ids: Vec<Uuid>,
}

pub async fn list(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let themes = state.themes.list().await?;
    Ok(Json(themes))
}

pub async fn get_by_id(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let theme = state.themes.find_by_id(id).await?;
    Ok(Json(theme))
}

pub async fn get_by_slug(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let theme = state.themes.find_by_slug(&slug).await?;
    Ok(Json(theme))
}

pub async fn create(
    State(state): State<ApiState>,
    auth: Authenticated,
    Json(payload): Json<ThemeCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Editor)?;
    let theme = state
        .themes
        .create(CreateThemeCommand {
            name: payload.name,
            description: payload.description,
            position: payload.position,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(theme)))
}

pub async fn update(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<Uuid>,
    Json(payload): Json<ThemeUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Editor)?;
    let theme = state
        .themes
        .update(
            id,
            UpdateThemeCommand {
                name: payload.name,
                description: payload.description,
                position: payload.position,
            },
        )
        .await?;
    Ok(Json(theme))
}

pub async fn delete(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Editor)?;
    state.themes.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_exhibitors(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<Uuid>,
    Json(payload): Json<ThemeExhibitorsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Editor)?;
    let theme = state.themes.set_exhibitors(id, payload.exhibitor_ids).await?;
    Ok(Json(theme))
}
