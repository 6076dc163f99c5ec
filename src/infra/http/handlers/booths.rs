//! Booth handlers

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use uuid::Uuid;

use crate::application::pagination::PageRequest;
use crate::application::repos::{AreaBounds, BoothQueryFilter, CreateBoothParams, UpdateBoothParams};
use crate::domain::types::Role;

use crate::infra::http::error::ApiError;
use crate::infra::http::middleware::Authenticated;
use crate::infra::http::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct BoothListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub skip: Option<u32>,
    pub number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaQuery {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

#[derive(Debug, Deserialize)]
pub struct NearbyParams {
    pub x: f64,
    pub y: f64,
    pub radius: Option<f64>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoothCreateRequest {
    pub number: String,
    pub polygon_id: String,
    pub x: f64,
    pub y: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotation: Option<f64>,
    pub polygon_points: Option<String>,
}

impl From<BoothCreateRequest> for CreateBoothParams {
    fn from(request: BoothCreateRequest) -> Self {
        Self {
            number: request.number,
            polygon_id: request.polygon_id,
            x: request.x,
            y: request.y,
            width: request.width,
            height: request.height,
            rotation: request.rotation.unwrap_or(0.0),
            polygon_points: request.polygon_points,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct BoothUpdateRequest {
    pub number: Option<String>,
    pub polygon_id: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotation: Option<f64>,
    pub polygon_points: Option<String>,
}

pub async fn list(
    State(state): State<ApiState>,
    Query(query): Query<BoothListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = PageRequest::new(query.page, query.limit, query.skip);
    let filter = BoothQueryFilter {
        number: query.number,
    };
    let booths = state.booths.list(filter, page).await?;
    Ok(Json(booths))
}

pub async fn in_area(
    State(state): State<ApiState>,
    Query(query): Query<AreaQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let booths = state
        .booths
        .in_area(AreaBounds {
            min_x: query.min_x,
            max_x: query.max_x,
            min_y: query.min_y,
            max_y: query.max_y,
        })
        .await?;
    Ok(Json(booths))
}

pub async fn nearby(
    State(state): State<ApiState>,
    Query(query): Query<NearbyParams>,
) -> Result<impl IntoResponse, ApiError> {
    let booths = state
        .booths
        .nearby(query.x, query.y, query.radius, query.limit)
        .await?;
    Ok(Json(booths))
}

pub async fn stats(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let stats = state.booths.stats().await?;
    Ok(Json(stats))
}

pub async fn get_by_id(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let booth = state.booths.find_by_id(id).await?;
    Ok(Json(booth))
}

pub async fn get_by_number(
    State(state): State<ApiState>,
    Path(number): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let booth = state.booths.find_by_number(&number).await?;
    Ok(Json(booth))
}

pub async fn get_by_polygon(
    State(state): State<ApiState>,
    Path(polygon_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let booth = state.booths.find_by_polygon_id(&polygon_id).await?;
    Ok(Json(booth))
}

pub async fn create(
    State(state): State<ApiState>,
    auth: Authenticated,
    Json(payload): Json<BoothCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Editor)?;
    let booth = state.booths.create(payload.into()).await?;
    Ok((StatusCode::CREATED, Json(booth)))
}

pub async fn update(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<Uuid>,
    Json(payload): Json<BoothUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Editor)?;
    let params = UpdateBoothParams {
        number: payload.number,
        polygon_id: payload.polygon_id,
        x: payload.x,
        y: payload.y,
        width: payload.width,
        height: payload.height,
        rotation: payload.rotation,
        polygon_points: payload.polygon_points,
    };
    let booth = state.booths.update(id, params).await?;
    Ok(Json(booth))
}

pub async fn delete(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Editor)?;
    state.booths.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn bulk_create(
    State(state): State<ApiState>,
    auth: Authenticated,
    Json(payload): Json<Vec<BoothCreateRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Editor)?;
    let batch = payload.into_iter().map(CreateBoothParams::from).collect();
    let created = state.booths.bulk_create(batch).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "created": created })),
    ))
}
