//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::pagination::{PageRequest, Paginated};
use crate::domain::entities::{
    AnalyticsEventRecord, BoothRecord, ContactRecord, ExhibitorRecord, FavoriteRecord,
    SectorRecord, ThemeRecord, UserAuthRecord, UserRecord,
};
use crate::domain::types::{ApprovalFilter, Role};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::Integrity {
            message: message.into(),
        }
    }
}

// --- booths -----------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct BoothQueryFilter {
    /// Case-insensitive substring match on the booth number.
    pub number: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct AreaBounds {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct NearbyQuery {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub limit: u32,
}

#[derive(Debug, Clone)]
pub struct CreateBoothParams {
    pub number: String,
    pub polygon_id: String,
    pub x: f64,
    pub y: f64,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotation: f64,
    pub polygon_points: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateBoothParams {
    pub number: Option<String>,
    pub polygon_id: Option<String>,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub rotation: Option<f64>,
    pub polygon_points: Option<String>,
}

/// Booth together with the exhibitor occupying it, if any.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoothWithExhibitor {
    #[serde(flatten)]
    pub booth: BoothRecord,
    pub exhibitor: Option<ExhibitorRecord>,
}

/// Nearby search result carrying the computed distance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyBooth {
    #[serde(flatten)]
    pub booth: BoothWithExhibitor,
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasBounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoothStats {
    pub total: u64,
    pub occupied: u64,
    pub available: u64,
    pub occupancy_rate: f64,
    pub bounds: Option<CanvasBounds>,
}

#[async_trait]
pub trait BoothsRepo: Send + Sync {
    async fn list(
        &self,
        filter: &BoothQueryFilter,
        page: PageRequest,
    ) -> Result<Paginated<BoothWithExhibitor>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<BoothWithExhibitor>, RepoError>;

    async fn find_by_number(&self, number: &str) -> Result<Option<BoothWithExhibitor>, RepoError>;

    async fn find_by_polygon_id(
        &self,
        polygon_id: &str,
    ) -> Result<Option<BoothWithExhibitor>, RepoError>;

    /// Booths whose anchor point falls inside the rectangle, ordered y then x.
    async fn in_area(&self, bounds: AreaBounds) -> Result<Vec<BoothWithExhibitor>, RepoError>;

    /// Booths within `radius` of a point, nearest first. Ties break on the
    /// booth number so the ordering stays deterministic.
    async fn nearby(&self, query: NearbyQuery) -> Result<Vec<NearbyBooth>, RepoError>;

    async fn stats(&self) -> Result<BoothStats, RepoError>;

    async fn create(&self, params: CreateBoothParams) -> Result<BoothRecord, RepoError>;

    async fn update(&self, id: Uuid, params: UpdateBoothParams) -> Result<BoothRecord, RepoError>;

    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;

    /// Best-effort batch insert; rows colliding on number or polygon id are
    /// skipped. Returns the number of rows actually created.
    async fn bulk_create(&self, batch: Vec<CreateBoothParams>) -> Result<u64, RepoError>;
}

// --- exhibitors -------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExhibitorSearchFilter {
    pub q: Option<String>,
    pub sector_id: Option<Uuid>,
    pub booth_number: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContactParams {
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateExhibitorParams {
    pub name: String,
    pub slug: String,
    pub logo_url: Option<String>,
    pub description: Option<String>,
    pub website_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub pdf_url: Option<String>,
    pub sector_id: Uuid,
    pub booth_id: Option<Uuid>,
    pub contacts: Vec<ContactParams>,
}

/// Partial update. `booth_id` distinguishes "leave alone" (`None`) from
/// "disconnect" (`Some(None)`) and "connect" (`Some(Some(id))`).
#[derive(Debug, Clone, Default)]
pub struct UpdateExhibitorParams {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub logo_url: Option<String>,
    pub description: Option<String>,
    pub website_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub pdf_url: Option<String>,
    pub sector_id: Option<Uuid>,
    pub booth_id: Option<Option<Uuid>>,
    pub contacts: Option<Vec<ContactParams>>,
}

/// Exhibitor joined with its sector, booth, contacts and trails.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExhibitorDetail {
    #[serde(flatten)]
    pub exhibitor: ExhibitorRecord,
    pub sector: SectorRecord,
    pub booth: Option<BoothRecord>,
    pub contacts: Vec<ContactRecord>,
    pub themes: Vec<ThemeRecord>,
}

#[async_trait]
pub trait ExhibitorsRepo: Send + Sync {
    async fn search(
        &self,
        filter: &ExhibitorSearchFilter,
        page: PageRequest,
    ) -> Result<Paginated<ExhibitorDetail>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ExhibitorDetail>, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<ExhibitorDetail>, RepoError>;

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError>;

    /// Insert the exhibitor and its contacts in one transaction. The booth,
    /// when given, is locked and checked for an existing occupant first.
    async fn create(&self, params: CreateExhibitorParams) -> Result<ExhibitorDetail, RepoError>;

    /// Partial update in one transaction; a `contacts` replace-set swaps the
    /// whole contact list.
    async fn update(
        &self,
        id: Uuid,
        params: UpdateExhibitorParams,
    ) -> Result<ExhibitorDetail, RepoError>;

    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;

    /// Every exhibitor with relations, ordered by name; feeds the CSV export.
    async fn list_all(&self) -> Result<Vec<ExhibitorDetail>, RepoError>;
}

// --- sectors ----------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SectorParams {
    pub name: String,
    pub color_hex: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorWithCount {
    #[serde(flatten)]
    pub sector: SectorRecord,
    pub exhibitor_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorDetail {
    #[serde(flatten)]
    pub sector: SectorRecord,
    pub exhibitors: Vec<ExhibitorRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorStats {
    pub total_exhibitors: u64,
    pub with_booth: u64,
    pub without_booth: u64,
    pub total_contacts: u64,
    pub avg_contacts_per_exhibitor: f64,
}

#[async_trait]
pub trait SectorsRepo: Send + Sync {
    async fn list_with_counts(&self) -> Result<Vec<SectorWithCount>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SectorDetail>, RepoError>;

    /// Exact-name lookup, used by the CSV importer.
    async fn find_by_name(&self, name: &str) -> Result<Option<SectorRecord>, RepoError>;

    async fn exists(&self, id: Uuid) -> Result<bool, RepoError>;

    async fn stats(&self, id: Uuid) -> Result<Option<SectorStats>, RepoError>;

    async fn count_exhibitors(&self, id: Uuid) -> Result<u64, RepoError>;

    async fn create(&self, params: SectorParams) -> Result<SectorRecord, RepoError>;

    async fn update(&self, id: Uuid, params: SectorParams) -> Result<SectorRecord, RepoError>;

    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;
}

// --- themes -----------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CreateThemeParams {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub position: i32,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateThemeParams {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeWithCount {
    #[serde(flatten)]
    pub theme: ThemeRecord,
    pub exhibitor_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeDetail {
    #[serde(flatten)]
    pub theme: ThemeRecord,
    pub exhibitors: Vec<ExhibitorRecord>,
}

#[async_trait]
pub trait ThemesRepo: Send + Sync {
    async fn list_with_counts(&self) -> Result<Vec<ThemeWithCount>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ThemeDetail>, RepoError>;

    async fn find_by_slug(&self, slug: &str) -> Result<Option<ThemeDetail>, RepoError>;

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError>;

    async fn create(&self, params: CreateThemeParams) -> Result<ThemeRecord, RepoError>;

    async fn update(&self, id: Uuid, params: UpdateThemeParams)
    -> Result<ThemeRecord, RepoError>;

    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;

    /// Replace the theme's exhibitor set in one transaction. Unknown
    /// exhibitor ids fail the whole call with `InvalidInput`.
    async fn set_exhibitors(
        &self,
        theme_id: Uuid,
        exhibitor_ids: Vec<Uuid>,
    ) -> Result<ThemeDetail, RepoError>;

    /// Idempotent single link, used by the CSV importer.
    async fn attach_exhibitor(&self, theme_id: Uuid, exhibitor_id: Uuid)
    -> Result<(), RepoError>;
}

// --- favorites --------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavoriteWithExhibitor {
    pub id: Uuid,
    pub session_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub exhibitor: ExhibitorRecord,
}

#[async_trait]
pub trait FavoritesRepo: Send + Sync {
    async fn list_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<FavoriteWithExhibitor>, RepoError>;

    /// `NotFound` when the exhibitor is unknown, `Duplicate` when the pair
    /// already exists.
    async fn add(&self, session_id: &str, exhibitor_id: Uuid)
    -> Result<FavoriteRecord, RepoError>;

    async fn remove(&self, session_id: &str, exhibitor_id: Uuid) -> Result<(), RepoError>;

    async fn clear_session(&self, session_id: &str) -> Result<u64, RepoError>;
}

// --- users ------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct UserQueryFilter {
    pub status: ApprovalFilter,
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_approved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total: u64,
    pub admins: u64,
    pub editors: u64,
    pub approved: u64,
    pub pending: u64,
    pub recent: Vec<UserRecord>,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    /// Pending accounts first, then newest first.
    async fn list(&self, filter: &UserQueryFilter) -> Result<Vec<UserRecord>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError>;

    async fn find_auth_by_email(&self, email: &str) -> Result<Option<UserAuthRecord>, RepoError>;

    async fn create(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    async fn approve(&self, id: Uuid) -> Result<UserRecord, RepoError>;

    /// Demote/promote inside a transaction; demoting the only remaining
    /// admin fails with `Integrity`.
    async fn set_role(&self, id: Uuid, role: Role) -> Result<UserRecord, RepoError>;

    /// Delete inside a transaction; removing the only remaining admin fails
    /// with `Integrity`.
    async fn delete(&self, id: Uuid) -> Result<(), RepoError>;

    async fn stats(&self) -> Result<UserStats, RepoError>;
}

// --- analytics --------------------------------------------------------

#[derive(Debug, Clone)]
pub struct TrackEventParams {
    pub event_type: String,
    pub session_id: Option<String>,
    pub exhibitor_id: Option<Uuid>,
    pub search_query: Option<String>,
    pub payload: Value,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AnalyticsRange {
    pub from: Option<OffsetDateTime>,
    pub to: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTypeCount {
    pub event_type: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchQueryCount {
    pub query: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsStats {
    pub total_events: u64,
    pub unique_sessions: u64,
    pub events_by_type: Vec<EventTypeCount>,
    pub top_search_queries: Vec<SearchQueryCount>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopExhibitor {
    pub exhibitor_id: Uuid,
    pub name: String,
    pub slug: String,
    pub views: u64,
}

#[async_trait]
pub trait AnalyticsRepo: Send + Sync {
    async fn track(&self, params: TrackEventParams) -> Result<AnalyticsEventRecord, RepoError>;

    async fn stats(&self, range: AnalyticsRange) -> Result<AnalyticsStats, RepoError>;

    async fn top_exhibitors(&self, limit: u32) -> Result<Vec<TopExhibitor>, RepoError>;
}
