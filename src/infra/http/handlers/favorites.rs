//! Favorites are anonymous; the caller supplies a session id header.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use crate::infra::http::error::ApiError;
use crate::infra::http::state::ApiState;

const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteRequest {
    pub exhibitor_id: Uuid,
}

fn session_id(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing x-session-id header"))
}

pub async fn list(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session = session_id(&headers)?;
    let favorites = state.favorites.list(session).await?;
    Ok(Json(favorites))
}

pub async fn add(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(payload): Json<FavoriteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let session = session_id(&headers)?;
    let favorite = state.favorites.add(session, payload.exhibitor_id).await?;
    Ok((StatusCode::CREATED, Json(favorite)))
}

pub async fn remove(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Path(exhibitor_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let session = session_id(&headers)?;
    state.favorites.remove(session, exhibitor_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear(
    State(state): State<ApiState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let session = session_id(&headers)?;
    let removed = state.favorites.clear(session).await?;
    Ok(Json(serde_json::json!({ "removed": removed })))
}
