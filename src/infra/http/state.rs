use std::sync::Arc;

use crate::application::analytics::AnalyticsService;
use crate::application::auth::AuthService;
use crate::application::booths::BoothService;
use crate::application::cache::TtlCache;
use crate::application::exhibitors::ExhibitorService;
use crate::application::favorites::FavoriteService;
use crate::application::sectors::SectorService;
use crate::application::themes::ThemeService;
use crate::application::users::UserAdminService;
use crate::infra::db::PostgresRepositories;

use super::rate_limit::ApiRateLimiter;

#[derive(Clone)]
pub struct ApiState {
    pub auth: Arc<AuthService>,
    pub booths: Arc<BoothService>,
    pub exhibitors: Arc<ExhibitorService>,
    pub sectors: Arc<SectorService>,
    pub themes: Arc<ThemeService>,
    pub favorites: Arc<FavoriteService>,
    pub users: Arc<UserAdminService>,
    pub analytics: Arc<AnalyticsService>,
    pub cache: Arc<TtlCache>,
    pub db: Arc<PostgresRepositories>,
    pub rate_limiter: Arc<ApiRateLimiter>,
}
