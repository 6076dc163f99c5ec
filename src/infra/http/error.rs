//! Uniform client-facing error envelope: `{statusCode, path, message}`.
//!
//! Handlers return [`ApiError`]; the envelope middleware fills in the
//! request path and the logging middleware reads the attached
//! [`ErrorReport`] for diagnostics that never reach the client.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::application::analytics::AnalyticsError;
use crate::application::auth::AuthError;
use crate::application::booths::BoothError;
use crate::application::error::ErrorReport;
use crate::application::exhibitors::ExhibitorError;
use crate::application::favorites::FavoriteError;
use crate::application::repos::RepoError;
use crate::application::sectors::SectorError;
use crate::application::themes::ThemeError;
use crate::application::users::UserError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub status_code: u16,
    pub path: String,
    pub message: String,
}

/// Client-safe message carried through response extensions so the
/// envelope middleware can rebuild the body with the request path.
#[derive(Debug, Clone)]
pub struct ClientError {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    source: &'static str,
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn new(source: &'static str, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            source,
            status,
            message: message.into(),
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(
            "http::auth",
            StatusCode::UNAUTHORIZED,
            "authentication required",
        )
    }

    pub fn forbidden() -> Self {
        Self::new(
            "http::auth",
            StatusCode::FORBIDDEN,
            "insufficient permissions",
        )
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("http::request", StatusCode::BAD_REQUEST, message)
    }

    pub fn rate_limited(retry_after: u64) -> Response {
        let mut response = ApiError::new(
            "http::rate_limit",
            StatusCode::TOO_MANY_REQUESTS,
            "rate limit exceeded",
        )
        .into_response();
        if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after.to_string()) {
            response
                .headers_mut()
                .insert(axum::http::header::RETRY_AFTER, value);
        }
        response
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn from_repo(source: &'static str, err: RepoError) -> Self {
        match &err {
            RepoError::NotFound => Self::new(source, StatusCode::NOT_FOUND, "resource not found"),
            RepoError::Duplicate { constraint } => Self::new(
                source,
                StatusCode::CONFLICT,
                format!("duplicate record on `{constraint}`"),
            ),
            RepoError::InvalidInput { message } => {
                Self::new(source, StatusCode::BAD_REQUEST, message.clone())
            }
            RepoError::Integrity { message } => {
                Self::new(source, StatusCode::CONFLICT, message.clone())
            }
            RepoError::Timeout => Self::new(
                source,
                StatusCode::SERVICE_UNAVAILABLE,
                "database timed out",
            ),
            // Internal detail stays in the report; the client sees a
            // generic message.
            RepoError::Persistence(_) => Self::new(
                source,
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let envelope = ErrorEnvelope {
            status_code: self.status.as_u16(),
            path: String::new(),
            message: self.message.clone(),
        };
        let mut response = (self.status, Json(envelope)).into_response();
        response.extensions_mut().insert(ClientError {
            status: self.status,
            message: self.message.clone(),
        });
        ErrorReport::from_message(self.source, self.status, self.message).attach(&mut response);
        response
    }
}

impl From<BoothError> for ApiError {
    fn from(err: BoothError) -> Self {
        let source = "application::booths";
        match err {
            BoothError::Validation(message) => Self::new(source, StatusCode::BAD_REQUEST, message),
            BoothError::NotFound => Self::new(source, StatusCode::NOT_FOUND, err.to_string()),
            BoothError::Conflict(message) => Self::new(source, StatusCode::CONFLICT, message),
            BoothError::Repo(repo) => Self::from_repo(source, repo),
        }
    }
}

impl From<ExhibitorError> for ApiError {
    fn from(err: ExhibitorError) -> Self {
        let source = "application::exhibitors";
        match err {
            ExhibitorError::Validation(message) => {
                Self::new(source, StatusCode::BAD_REQUEST, message)
            }
            ExhibitorError::NotFound
            | ExhibitorError::SectorNotFound
            | ExhibitorError::BoothNotFound => {
                Self::new(source, StatusCode::NOT_FOUND, err.to_string())
            }
            ExhibitorError::BoothOccupied => {
                Self::new(source, StatusCode::CONFLICT, err.to_string())
            }
            ExhibitorError::Conflict(message) => Self::new(source, StatusCode::CONFLICT, message),
            ExhibitorError::Repo(repo) => Self::from_repo(source, repo),
        }
    }
}

impl From<SectorError> for ApiError {
    fn from(err: SectorError) -> Self {
        let source = "application::sectors";
        match err {
            SectorError::Validation(message) => Self::new(source, StatusCode::BAD_REQUEST, message),
            SectorError::NotFound => Self::new(source, StatusCode::NOT_FOUND, err.to_string()),
            SectorError::InUse { .. } | SectorError::Conflict(_) => {
                Self::new(source, StatusCode::CONFLICT, err.to_string())
            }
            SectorError::Repo(repo) => Self::from_repo(source, repo),
        }
    }
}

impl From<ThemeError> for ApiError {
    fn from(err: ThemeError) -> Self {
        let source = "application::themes";
        match err {
            ThemeError::Validation(message) => Self::new(source, StatusCode::BAD_REQUEST, message),
            ThemeError::NotFound => Self::new(source, StatusCode::NOT_FOUND, err.to_string()),
            ThemeError::Conflict(message) => Self::new(source, StatusCode::CONFLICT, message),
            ThemeError::Repo(repo) => Self::from_repo(source, repo),
        }
    }
}

impl From<FavoriteError> for ApiError {
    fn from(err: FavoriteError) -> Self {
        let source = "application::favorites";
        match err {
            FavoriteError::Validation(message) => {
                Self::new(source, StatusCode::BAD_REQUEST, message)
            }
            FavoriteError::ExhibitorNotFound | FavoriteError::NotFound => {
                Self::new(source, StatusCode::NOT_FOUND, err.to_string())
            }
            FavoriteError::AlreadyFavorited => {
                Self::new(source, StatusCode::CONFLICT, err.to_string())
            }
            FavoriteError::Repo(repo) => Self::from_repo(source, repo),
        }
    }
}

impl From<UserError> for ApiError {
    fn from(err: UserError) -> Self {
        let source = "application::users";
        match err {
            UserError::NotFound => Self::new(source, StatusCode::NOT_FOUND, err.to_string()),
            UserError::AlreadyApproved | UserError::LastAdmin => {
                Self::new(source, StatusCode::CONFLICT, err.to_string())
            }
            UserError::CannotRejectAdmin => {
                Self::new(source, StatusCode::FORBIDDEN, err.to_string())
            }
            UserError::Repo(repo) => Self::from_repo(source, repo),
        }
    }
}

impl From<AnalyticsError> for ApiError {
    fn from(err: AnalyticsError) -> Self {
        let source = "application::analytics";
        match err {
            AnalyticsError::Validation(message) => {
                Self::new(source, StatusCode::BAD_REQUEST, message)
            }
            AnalyticsError::Repo(repo) => Self::from_repo(source, repo),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        let source = "application::auth";
        match err {
            AuthError::Validation(message) => Self::new(source, StatusCode::BAD_REQUEST, message),
            AuthError::InvalidCredentials | AuthError::Unauthorized => {
                Self::new(source, StatusCode::UNAUTHORIZED, err.to_string())
            }
            AuthError::NotApproved => Self::new(source, StatusCode::FORBIDDEN, err.to_string()),
            AuthError::EmailTaken => Self::new(source, StatusCode::CONFLICT, err.to_string()),
            AuthError::Internal(_) => Self::new(
                source,
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error",
            ),
            AuthError::Repo(repo) => Self::from_repo(source, repo),
        }
    }
}
