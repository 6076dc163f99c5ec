use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::application::analytics::TrackEventCommand;
use crate::application::repos::AnalyticsRange;
use crate::domain::types::Role;

use crate::infra::http::error::ApiError;
use crate::infra::http::middleware::Authenticated;
use crate::infra::http::state::ApiState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    pub event_type: String,
    pub session_id: Option<String>,
    pub exhibitor_id: Option<Uuid>,
    pub search_query: Option<String>,
    pub payload: Option<Value>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StatsQuery {
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TopQuery {
    pub limit: Option<u32>,
}

fn parse_timestamp(field: &str, value: Option<&str>) -> Result<Option<OffsetDateTime>, ApiError> {
    match value {
        None => Ok(None),
        Some(raw) => OffsetDateTime::parse(raw, &Rfc3339)
            .map(Some)
            .map_err(|_| ApiError::bad_request(format!("`{field}` is not an RFC 3339 timestamp"))),
    }
}

pub async fn track(
    State(state): State<ApiState>,
    headers: HeaderMap,
    Json(payload): Json<TrackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_agent = payload.user_agent.or_else(|| {
        headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    });
    let event = state
        .analytics
        .track(TrackEventCommand {
            event_type: payload.event_type,
            session_id: payload.session_id,
            exhibitor_id: payload.exhibitor_id,
            search_query: payload.search_query,
            payload: payload.payload,
            user_agent,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn stats(
    State(state): State<ApiState>,
    auth: Authenticated,
    Query(query): Query<StatsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    auth.require(Role::Admin)?;
    let range = AnalyticsRange {
        from: parse_timestamp("from", query.from.as_deref())?,
        to: parse_timestamp("to", query.to.as_deref())?,
    };
    let stats = state.analytics.stats(range).await?;
    Ok(Json(stats))
}

pub async fn top_exhibitors(
    State(state): State<ApiState>,
    Query(query): Query<TopQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let top = state.analytics.top_exhibitors(query.limit).await?;
    Ok(Json(top))
}
