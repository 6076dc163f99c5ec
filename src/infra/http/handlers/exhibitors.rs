//! Exhibitor handlers, including the CSV import/export endpoints.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::application::exhibitors::{
    ContactInput, CreateExhibitorCommand, UpdateExhibitorCommand,
};
use crate::application::pagination::PageRequest;
use crate::application::repos::ExhibitorSearchFilter;
use crate::domain::types::Role;

use crate::infra::http::error::ApiError;
use crate::infra::http::middleware::Authenticated;
use crate::infra::http::state::ApiState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExhibitorSearchQuery {
    pub q: Option<String>,
    pub sector_id: Option<Uuid>,
    pub booth_number: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub skip: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub email: String,
    pub phone: Option<String>,
}

impl From<ContactRequest> for ContactInput {
    fn from(request: ContactRequest) -> Self {
        Self {
            first_name: request.first_name,
            last_name: request.last_name,
            role: request.role,
            email: request.email,
            phone: request.phone,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExhibitorCreateRequest {
    pub name: String,
    pub logo_url: Option<String>,
    pub description: Option<String>,
    pub website_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub pdf_url: Option<String>,
    pub sector_id: Uuid,
    pub booth_id: Option<Uuid>,
    #[serde(default)]
    pub contacts: Vec<ContactRequest>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExhibitorUpdateRequest {
    pub name: Option<String>,
    pub logo_url: Option<String>,
    pub description: Option<String>,
    pub website_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub pdf_url: Option<String>,
    pub sector_id: Option<Uuid>,
    /// Absent leaves the booth untouched; an explicit `null` disconnects it.
    #[serde(default, deserialize_with = "nullable_booth")]
    pub booth_id: Option<Option<Uuid>>,
    pub contacts: Option<Vec<ContactRequest>>,
}

fn nullable_booth<'de, D>(deserializer: D) -> Result<Option<Option<Uuid>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Uuid>::deserialize(deserializer).map(Some)
}

pub async fn search(
    State(state): State<ApiState>,
    Query(query): Query<ExhibitorSearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = PageRequest::new(query.page, query.limit, query.skip);
    let filter = ExhibitorSearchFilter {
        q: query.q,
        sector_id: query.sector_id,
        booth_number: query.booth_number,
    };
    let exhibitors = state.exhibitors.search(filter, page).await?;
    Ok(Json(exhibitors))
}

pub async fn get_by_id(
    State(state): State<ApiState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let exhibitor = state.exhibitors.find_by_id(id).await?;
    Ok(Json(exhibitor))
}

pub async fn get_by_slug(
    State(state): State<ApiState>,
    Path(slug): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let exhibitor = state.exhibitors.find_by_slug(&slug).await?;
    Ok(Json(exhibitor))
}

pub async fn create(
    State(state): State<ApiState>,
    auth: Authenticated,
    Json(payload): Json<ExhibitorCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Editor)?;
    let command = CreateExhibitorCommand {
        name: payload.name,
        logo_url: payload.logo_url,
        description: payload.description,
        website_url: payload.website_url,
        linkedin_url: payload.linkedin_url,
        pdf_url: payload.pdf_url,
        sector_id: payload.sector_id,
        booth_id: payload.booth_id,
        contacts: payload.contacts.into_iter().map(ContactInput::from).collect(),
    };
    let exhibitor = state.exhibitors.create(command).await?;
    Ok((StatusCode::CREATED, Json(exhibitor)))
}

pub async fn update(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<Uuid>,
    Json(payload): Json<ExhibitorUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Editor)?;
    let command = UpdateExhibitorCommand {
        name: payload.name,
        logo_url: payload.logo_url,
        description: payload.description,
        website_url: payload.website_url,
        linkedin_url: payload.linkedin_url,
        pdf_url: payload.pdf_url,
        sector_id: payload.sector_id,
        booth_id: payload.booth_id,
        contacts: payload
            .contacts
            .map(|contacts| contacts.into_iter().map(ContactInput::from).collect()),
    };
    let exhibitor = state.exhibitors.update(id, command).await?;
    Ok(Json(exhibitor))
}

pub async fn delete(
    State(state): State<ApiState>,
    auth: Authenticated,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Editor)?;
    state.exhibitors.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn import_csv(
    State(state): State<ApiState>,
    auth: Authenticated,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Editor)?;
    let report = state.exhibitors.import_csv(&body).await?;
    Ok(Json(report))
}

pub async fn export_csv(
    State(state): State<ApiState>,
    auth: Authenticated,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Editor)?;
    let csv = state.exhibitors.export_csv().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"exhibitors.csv\"",
            ),
        ],
        csv,
    ))
}
