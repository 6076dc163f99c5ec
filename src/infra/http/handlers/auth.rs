use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::types::Role;

use crate::infra::http::error::ApiError;
use crate::infra::http::middleware::Authenticated;
use crate::infra::http::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

pub async fn signup(
    State(state): State<ApiState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.auth.signup(&payload.email, &payload.password).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<ApiState>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.auth.login(&payload.email, &payload.password).await?;
    Ok(Json(outcome))
}

pub async fn me(auth: Authenticated) -> Result<impl IntoResponse, ApiError> {
    let identity = auth.require(Role::Editor)?;
    Ok(Json(CurrentUser {
        id: identity.id,
        email: identity.email.clone(),
        role: identity.role,
    }))
}

pub async fn register(
    State(state): State<ApiState>,
    auth: Authenticated,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Admin)?;
    let user = state
        .auth
        .register(&payload.email, &payload.password, payload.role)
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}
