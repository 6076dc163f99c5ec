use std::time::Instant;

use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::{Request, header, request::Parts};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::auth::Identity;
use crate::application::error::ErrorReport;
use crate::domain::types::Role;

use super::error::{ApiError, ClientError, ErrorEnvelope};
use super::state::ApiState;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Resolve a bearer token to an [`Identity`] request extension. Requests
/// without a token pass through; role checks happen per handler.
pub async fn authenticate(
    State(state): State<ApiState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = bearer_token(request.headers().get(header::AUTHORIZATION));

    if let Some(token) = token {
        let identity = match state.auth.identity_for_token(&token).await {
            Ok(identity) => identity,
            Err(err) => return ApiError::from(err).into_response(),
        };
        request.extensions_mut().insert(identity);
    }

    next.run(request).await
}

pub async fn rate_limit(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let key = client_key(&request);

    if !state.rate_limiter.allow(&key) {
        counter!("expohall_http_rate_limited_total").increment(1);
        return ApiError::rate_limited(state.rate_limiter.retry_after_secs());
    }

    next.run(request).await
}

/// Rebuild error bodies with the request path so every failure shares the
/// `{statusCode, path, message}` envelope.
pub async fn render_error_envelope(request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_string();
    let response = next.run(request).await;

    let Some(client_error) = response.extensions().get::<ClientError>().cloned() else {
        return response;
    };

    let envelope = ErrorEnvelope {
        status_code: client_error.status.as_u16(),
        path,
        message: client_error.message,
    };

    let (parts, _) = response.into_parts();
    let mut rebuilt = (client_error.status, axum::Json(envelope)).into_response();
    for (key, value) in parts.headers.iter() {
        if key != header::CONTENT_TYPE && key != header::CONTENT_LENGTH {
            rebuilt.headers_mut().insert(key.clone(), value.clone());
        }
    }
    *rebuilt.extensions_mut() = parts.extensions;
    rebuilt
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();

    let actor = request
        .extensions()
        .get::<Identity>()
        .map(|identity| identity.email.clone());

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "expohall::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                actor = actor.as_deref().unwrap_or(""),
                "request failed",
            );
        } else {
            warn!(
                target = "expohall::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                query = uri.query().unwrap_or(""),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                actor = actor.as_deref().unwrap_or(""),
                "client request error",
            );
        }
    }

    response
}

/// Extractor yielding the authenticated caller; rejects with 401 when the
/// authenticate middleware attached no identity.
pub struct Authenticated(pub Identity);

impl Authenticated {
    pub fn require(&self, required: Role) -> Result<&Identity, ApiError> {
        if self.0.role.satisfies(required) {
            Ok(&self.0)
        } else {
            Err(ApiError::forbidden())
        }
    }
}

impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .map(Authenticated)
            .ok_or_else(ApiError::unauthorized)
    }
}

fn bearer_token(header: Option<&axum::http::HeaderValue>) -> Option<String> {
    let raw = header?.to_str().ok()?;
    let bearer = raw.strip_prefix("Bearer ")?;
    Some(bearer.trim().to_string())
}

fn client_key(request: &Request<Body>) -> String {
    for name in ["x-forwarded-for", "x-real-ip"] {
        if let Some(value) = request.headers().get(name).and_then(|v| v.to_str().ok()) {
            let first = value.split(',').next().unwrap_or(value).trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    "unknown".to_string()
}
