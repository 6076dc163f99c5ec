//! End-to-end router tests over in-memory repositories.
//!
//! The full middleware chain runs: bearer tokens are resolved, role
//! checks apply, and every failure carries the
//! `{statusCode, path, message}` envelope.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use sqlx::postgres::PgPoolOptions;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use expohall::application::analytics::AnalyticsService;
use expohall::application::auth::AuthService;
use expohall::application::booths::BoothService;
use expohall::application::cache::TtlCache;
use expohall::application::exhibitors::ExhibitorService;
use expohall::application::favorites::FavoriteService;
use expohall::application::pagination::{PageRequest, Paginated};
use expohall::application::repos::{
    AnalyticsRange, AnalyticsRepo, AnalyticsStats, AreaBounds, BoothQueryFilter, BoothStats,
    BoothWithExhibitor, BoothsRepo, CreateBoothParams, CreateExhibitorParams, CreateThemeParams,
    CreateUserParams, ExhibitorDetail, ExhibitorSearchFilter, ExhibitorsRepo,
    FavoriteWithExhibitor, FavoritesRepo, NearbyBooth, NearbyQuery, RepoError, SectorDetail,
    SectorParams, SectorStats, SectorWithCount, SectorsRepo, ThemeDetail, ThemeWithCount,
    ThemesRepo, TopExhibitor, TrackEventParams, UpdateBoothParams, UpdateExhibitorParams,
    UpdateThemeParams, UserQueryFilter, UserStats, UsersRepo,
};
use expohall::application::sectors::SectorService;
use expohall::application::themes::ThemeService;
use expohall::application::users::UserAdminService;
use expohall::domain::entities::{
    AnalyticsEventRecord, BoothRecord, ExhibitorRecord, FavoriteRecord, SectorRecord, ThemeRecord,
    UserAuthRecord, UserRecord,
};
use expohall::domain::types::{ApprovalFilter, Role};
use expohall::infra::db::PostgresRepositories;
use expohall::infra::http::rate_limit::ApiRateLimiter;
use expohall::infra::http::{ApiState, build_router};

const JWT_SECRET: &str = "router-test-secret";
const BCRYPT_COST: u32 = 4;

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

fn sample_sector() -> SectorRecord {
    SectorRecord {
        id: Uuid::new_v4(),
        name: "Innovation".into(),
        color_hex: "#4F46E5".into(),
        created_at: now(),
        updated_at: now(),
    }
}

fn sample_booth(number: &str, x: f64, y: f64) -> BoothRecord {
    BoothRecord {
        id: Uuid::new_v4(),
        number: number.to_string(),
        polygon_id: format!("poly-{}", number.to_lowercase()),
        x,
        y,
        width: Some(10.0),
        height: Some(8.0),
        rotation: 0.0,
        polygon_points: None,
        created_at: now(),
        updated_at: now(),
    }
}

fn sample_exhibitor(name: &str, slug: &str, sector: &SectorRecord) -> ExhibitorDetail {
    ExhibitorDetail {
        exhibitor: ExhibitorRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
            logo_url: None,
            description: Some("demo".into()),
            website_url: None,
            linkedin_url: None,
            pdf_url: None,
            sector_id: sector.id,
            booth_id: None,
            created_at: now(),
            updated_at: now(),
        },
        sector: sector.clone(),
        booth: None,
        contacts: Vec::new(),
        themes: Vec::new(),
    }
}

struct StoredUser {
    record: UserRecord,
    password_hash: String,
}

/// In-memory stand-in for every repository trait.
#[derive(Default)]
struct StubRepos {
    sector: Mutex<Option<SectorRecord>>,
    booths: Mutex<Vec<BoothRecord>>,
    exhibitors: Mutex<Vec<ExhibitorDetail>>,
    themes: Mutex<Vec<ThemeRecord>>,
    favorites: Mutex<Vec<FavoriteRecord>>,
    users: Mutex<Vec<StoredUser>>,
    events: Mutex<Vec<AnalyticsEventRecord>>,
}

impl StubRepos {
    async fn seed_user(&self, email: &str, password: &str, role: Role, approved: bool) -> Uuid {
        let record = UserRecord {
            id: Uuid::new_v4(),
            email: email.to_string(),
            role,
            is_approved: approved,
            approved_at: approved.then(now),
            created_at: now(),
        };
        let id = record.id;
        self.users.lock().await.push(StoredUser {
            record,
            password_hash: bcrypt::hash(password, BCRYPT_COST).expect("hash"),
        });
        id
    }

    async fn seed_booth(&self, number: &str, x: f64, y: f64) -> BoothRecord {
        let booth = sample_booth(number, x, y);
        self.booths.lock().await.push(booth.clone());
        booth
    }

    async fn seed_sector(&self) -> SectorRecord {
        let sector = sample_sector();
        *self.sector.lock().await = Some(sector.clone());
        sector
    }

    async fn seed_exhibitor(&self, name: &str, slug: &str) -> ExhibitorDetail {
        let existing = self.sector.lock().await.clone();
        let sector = match existing {
            Some(sector) => sector,
            None => self.seed_sector().await,
        };
        let detail = sample_exhibitor(name, slug, &sector);
        self.exhibitors.lock().await.push(detail.clone());
        detail
    }
}

#[async_trait]
impl BoothsRepo for StubRepos {
    async fn list(
        &self,
        filter: &BoothQueryFilter,
        page: PageRequest,
    ) -> Result<Paginated<BoothWithExhibitor>, RepoError> {
        let booths = self.booths.lock().await;
        let matching: Vec<_> = booths
            .iter()
            .filter(|booth| match filter.number.as_deref() {
                Some(needle) => booth
                    .number
                    .to_lowercase()
                    .contains(&needle.to_lowercase()),
                None => true,
            })
            .cloned()
            .collect();
        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .map(|booth| BoothWithExhibitor {
                booth,
                exhibitor: None,
            })
            .collect();
        Ok(Paginated::new(items, total, &page))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<BoothWithExhibitor>, RepoError> {
        Ok(self
            .booths
            .lock()
            .await
            .iter()
            .find(|booth| booth.id == id)
            .cloned()
            .map(|booth| BoothWithExhibitor {
                booth,
                exhibitor: None,
            }))
    }

    async fn find_by_number(&self, number: &str) -> Result<Option<BoothWithExhibitor>, RepoError> {
        Ok(self
            .booths
            .lock()
            .await
            .iter()
            .find(|booth| booth.number == number)
            .cloned()
            .map(|booth| BoothWithExhibitor {
                booth,
                exhibitor: None,
            }))
    }

    async fn find_by_polygon_id(
        &self,
        polygon_id: &str,
    ) -> Result<Option<BoothWithExhibitor>, RepoError> {
        Ok(self
            .booths
            .lock()
            .await
            .iter()
            .find(|booth| booth.polygon_id == polygon_id)
            .cloned()
            .map(|booth| BoothWithExhibitor {
                booth,
                exhibitor: None,
            }))
    }

    async fn in_area(&self, bounds: AreaBounds) -> Result<Vec<BoothWithExhibitor>, RepoError> {
        Ok(self
            .booths
            .lock()
            .await
            .iter()
            .filter(|booth| {
                booth.x >= bounds.min_x
                    && booth.x <= bounds.max_x
                    && booth.y >= bounds.min_y
                    && booth.y <= bounds.max_y
            })
            .cloned()
            .map(|booth| BoothWithExhibitor {
                booth,
                exhibitor: None,
            })
            .collect())
    }

    async fn nearby(&self, query: NearbyQuery) -> Result<Vec<NearbyBooth>, RepoError> {
        let mut hits: Vec<NearbyBooth> = self
            .booths
            .lock()
            .await
            .iter()
            .filter_map(|booth| {
                let distance = ((booth.x - query.x).powi(2) + (booth.y - query.y).powi(2)).sqrt();
                (distance <= query.radius).then(|| NearbyBooth {
                    booth: BoothWithExhibitor {
                        booth: booth.clone(),
                        exhibitor: None,
                    },
                    distance,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(query.limit as usize);
        Ok(hits)
    }

    async fn stats(&self) -> Result<BoothStats, RepoError> {
        let total = self.booths.lock().await.len() as u64;
        Ok(BoothStats {
            total,
            occupied: 0,
            available: total,
            occupancy_rate: 0.0,
            bounds: None,
        })
    }

    async fn create(&self, params: CreateBoothParams) -> Result<BoothRecord, RepoError> {
        let mut booths = self.booths.lock().await;
        if booths.iter().any(|booth| booth.number == params.number) {
            return Err(RepoError::Duplicate {
                constraint: "booths_number_key".into(),
            });
        }
        let booth = BoothRecord {
            id: Uuid::new_v4(),
            number: params.number,
            polygon_id: params.polygon_id,
            x: params.x,
            y: params.y,
            width: params.width,
            height: params.height,
            rotation: params.rotation,
            polygon_points: params.polygon_points,
            created_at: now(),
            updated_at: now(),
        };
        booths.push(booth.clone());
        Ok(booth)
    }

    async fn update(&self, id: Uuid, params: UpdateBoothParams) -> Result<BoothRecord, RepoError> {
        let mut booths = self.booths.lock().await;
        let booth = booths
            .iter_mut()
            .find(|booth| booth.id == id)
            .ok_or(RepoError::NotFound)?;
        if let Some(number) = params.number {
            booth.number = number;
        }
        if let Some(x) = params.x {
            booth.x = x;
        }
        if let Some(y) = params.y {
            booth.y = y;
        }
        booth.updated_at = now();
        Ok(booth.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let mut booths = self.booths.lock().await;
        let before = booths.len();
        booths.retain(|booth| booth.id != id);
        if booths.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn bulk_create(&self, batch: Vec<CreateBoothParams>) -> Result<u64, RepoError> {
        let mut created = 0;
        for params in batch {
            if BoothsRepo::create(self, params).await.is_ok() {
                created += 1;
            }
        }
        Ok(created)
    }
}

#[async_trait]
impl ExhibitorsRepo for StubRepos {
    async fn search(
        &self,
        _filter: &ExhibitorSearchFilter,
        page: PageRequest,
    ) -> Result<Paginated<ExhibitorDetail>, RepoError> {
        let exhibitors = self.exhibitors.lock().await;
        let total = exhibitors.len() as u64;
        let items = exhibitors
            .iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .cloned()
            .collect();
        Ok(Paginated::new(items, total, &page))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ExhibitorDetail>, RepoError> {
        Ok(self
            .exhibitors
            .lock()
            .await
            .iter()
            .find(|detail| detail.exhibitor.id == id)
            .cloned())
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<ExhibitorDetail>, RepoError> {
        Ok(self
            .exhibitors
            .lock()
            .await
            .iter()
            .find(|detail| detail.exhibitor.slug == slug)
            .cloned())
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        Ok(self
            .exhibitors
            .lock()
            .await
            .iter()
            .any(|detail| detail.exhibitor.slug == slug))
    }

    async fn create(&self, params: CreateExhibitorParams) -> Result<ExhibitorDetail, RepoError> {
        let sector = self
            .sector
            .lock()
            .await
            .clone()
            .ok_or(RepoError::NotFound)?;
        let detail = ExhibitorDetail {
            exhibitor: ExhibitorRecord {
                id: Uuid::new_v4(),
                name: params.name,
                slug: params.slug,
                logo_url: params.logo_url,
                description: params.description,
                website_url: params.website_url,
                linkedin_url: params.linkedin_url,
                pdf_url: params.pdf_url,
                sector_id: params.sector_id,
                booth_id: params.booth_id,
                created_at: now(),
                updated_at: now(),
            },
            sector,
            booth: None,
            contacts: Vec::new(),
            themes: Vec::new(),
        };
        self.exhibitors.lock().await.push(detail.clone());
        Ok(detail)
    }

    async fn update(
        &self,
        id: Uuid,
        params: UpdateExhibitorParams,
    ) -> Result<ExhibitorDetail, RepoError> {
        let mut exhibitors = self.exhibitors.lock().await;
        let detail = exhibitors
            .iter_mut()
            .find(|detail| detail.exhibitor.id == id)
            .ok_or(RepoError::NotFound)?;
        if let Some(name) = params.name {
            detail.exhibitor.name = name;
        }
        if let Some(slug) = params.slug {
            detail.exhibitor.slug = slug;
        }
        detail.exhibitor.updated_at = now();
        Ok(detail.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let mut exhibitors = self.exhibitors.lock().await;
        let before = exhibitors.len();
        exhibitors.retain(|detail| detail.exhibitor.id != id);
        if exhibitors.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<ExhibitorDetail>, RepoError> {
        let mut all = self.exhibitors.lock().await.clone();
        all.sort_by(|a, b| a.exhibitor.name.cmp(&b.exhibitor.name));
        Ok(all)
    }
}

#[async_trait]
impl SectorsRepo for StubRepos {
    async fn list_with_counts(&self) -> Result<Vec<SectorWithCount>, RepoError> {
        Ok(self
            .sector
            .lock()
            .await
            .clone()
            .map(|sector| SectorWithCount {
                sector,
                exhibitor_count: 0,
            })
            .into_iter()
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SectorDetail>, RepoError> {
        Ok(self
            .sector
            .lock()
            .await
            .clone()
            .filter(|sector| sector.id == id)
            .map(|sector| SectorDetail {
                sector,
                exhibitors: Vec::new(),
            }))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<SectorRecord>, RepoError> {
        Ok(self
            .sector
            .lock()
            .await
            .clone()
            .filter(|sector| sector.name.eq_ignore_ascii_case(name)))
    }

    async fn exists(&self, id: Uuid) -> Result<bool, RepoError> {
        Ok(self
            .sector
            .lock()
            .await
            .as_ref()
            .is_some_and(|sector| sector.id == id))
    }

    async fn stats(&self, id: Uuid) -> Result<Option<SectorStats>, RepoError> {
        if !SectorsRepo::exists(self, id).await? {
            return Ok(None);
        }
        Ok(Some(SectorStats {
            total_exhibitors: 0,
            with_booth: 0,
            without_booth: 0,
            total_contacts: 0,
            avg_contacts_per_exhibitor: 0.0,
        }))
    }

    async fn count_exhibitors(&self, _id: Uuid) -> Result<u64, RepoError> {
        Ok(0)
    }

    async fn create(&self, params: SectorParams) -> Result<SectorRecord, RepoError> {
        let sector = SectorRecord {
            id: Uuid::new_v4(),
            name: params.name,
            color_hex: params.color_hex,
            created_at: now(),
            updated_at: now(),
        };
        *self.sector.lock().await = Some(sector.clone());
        Ok(sector)
    }

    async fn update(&self, id: Uuid, params: SectorParams) -> Result<SectorRecord, RepoError> {
        let mut slot = self.sector.lock().await;
        let sector = slot
            .as_mut()
            .filter(|sector| sector.id == id)
            .ok_or(RepoError::NotFound)?;
        sector.name = params.name;
        sector.color_hex = params.color_hex;
        sector.updated_at = now();
        Ok(sector.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let mut slot = self.sector.lock().await;
        if slot.as_ref().is_some_and(|sector| sector.id == id) {
            *slot = None;
            Ok(())
        } else {
            Err(RepoError::NotFound)
        }
    }
}

#[async_trait]
impl ThemesRepo for StubRepos {
    async fn list_with_counts(&self) -> Result<Vec<ThemeWithCount>, RepoError> {
        Ok(self
            .themes
            .lock()
            .await
            .iter()
            .cloned()
            .map(|theme| ThemeWithCount {
                theme,
                exhibitor_count: 0,
            })
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ThemeDetail>, RepoError> {
        Ok(self
            .themes
            .lock()
            .await
            .iter()
            .find(|theme| theme.id == id)
            .cloned()
            .map(|theme| ThemeDetail {
                theme,
                exhibitors: Vec::new(),
            }))
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<ThemeDetail>, RepoError> {
        Ok(self
            .themes
            .lock()
            .await
            .iter()
            .find(|theme| theme.slug == slug)
            .cloned()
            .map(|theme| ThemeDetail {
                theme,
                exhibitors: Vec::new(),
            }))
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        Ok(self
            .themes
            .lock()
            .await
            .iter()
            .any(|theme| theme.slug == slug))
    }

    async fn create(&self, params: CreateThemeParams) -> Result<ThemeRecord, RepoError> {
        let theme = ThemeRecord {
            id: Uuid::new_v4(),
            name: params.name,
            slug: params.slug,
            description: params.description,
            position: params.position,
            created_at: now(),
            updated_at: now(),
        };
        self.themes.lock().await.push(theme.clone());
        Ok(theme)
    }

    async fn update(
        &self,
        id: Uuid,
        params: UpdateThemeParams,
    ) -> Result<ThemeRecord, RepoError> {
        let mut themes = self.themes.lock().await;
        let theme = themes
            .iter_mut()
            .find(|theme| theme.id == id)
            .ok_or(RepoError::NotFound)?;
        if let Some(name) = params.name {
            theme.name = name;
        }
        if let Some(slug) = params.slug {
            theme.slug = slug;
        }
        theme.updated_at = now();
        Ok(theme.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let mut themes = self.themes.lock().await;
        let before = themes.len();
        themes.retain(|theme| theme.id != id);
        if themes.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn set_exhibitors(
        &self,
        theme_id: Uuid,
        _exhibitor_ids: Vec<Uuid>,
    ) -> Result<ThemeDetail, RepoError> {
        ThemesRepo::find_by_id(self, theme_id)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn attach_exhibitor(
        &self,
        _theme_id: Uuid,
        _exhibitor_id: Uuid,
    ) -> Result<(), RepoError> {
        Ok(())
    }
}

#[async_trait]
impl FavoritesRepo for StubRepos {
    async fn list_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<FavoriteWithExhibitor>, RepoError> {
        let favorites = self.favorites.lock().await;
        let exhibitors = self.exhibitors.lock().await;
        Ok(favorites
            .iter()
            .filter(|favorite| favorite.session_id == session_id)
            .filter_map(|favorite| {
                exhibitors
                    .iter()
                    .find(|detail| detail.exhibitor.id == favorite.exhibitor_id)
                    .map(|detail| FavoriteWithExhibitor {
                        id: favorite.id,
                        session_id: favorite.session_id.clone(),
                        created_at: favorite.created_at,
                        exhibitor: detail.exhibitor.clone(),
                    })
            })
            .collect())
    }

    async fn add(
        &self,
        session_id: &str,
        exhibitor_id: Uuid,
    ) -> Result<FavoriteRecord, RepoError> {
        if !self
            .exhibitors
            .lock()
            .await
            .iter()
            .any(|detail| detail.exhibitor.id == exhibitor_id)
        {
            return Err(RepoError::NotFound);
        }
        let mut favorites = self.favorites.lock().await;
        if favorites
            .iter()
            .any(|favorite| favorite.session_id == session_id && favorite.exhibitor_id == exhibitor_id)
        {
            return Err(RepoError::Duplicate {
                constraint: "favorites_session_id_exhibitor_id_key".into(),
            });
        }
        let favorite = FavoriteRecord {
            id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            exhibitor_id,
            created_at: now(),
        };
        favorites.push(favorite.clone());
        Ok(favorite)
    }

    async fn remove(&self, session_id: &str, exhibitor_id: Uuid) -> Result<(), RepoError> {
        let mut favorites = self.favorites.lock().await;
        let before = favorites.len();
        favorites.retain(|favorite| {
            !(favorite.session_id == session_id && favorite.exhibitor_id == exhibitor_id)
        });
        if favorites.len() == before {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn clear_session(&self, session_id: &str) -> Result<u64, RepoError> {
        let mut favorites = self.favorites.lock().await;
        let before = favorites.len();
        favorites.retain(|favorite| favorite.session_id != session_id);
        Ok((before - favorites.len()) as u64)
    }
}

#[async_trait]
impl UsersRepo for StubRepos {
    async fn list(&self, filter: &UserQueryFilter) -> Result<Vec<UserRecord>, RepoError> {
        Ok(self
            .users
            .lock()
            .await
            .iter()
            .map(|stored| stored.record.clone())
            .filter(|user| match filter.status {
                ApprovalFilter::Pending => !user.is_approved,
                ApprovalFilter::Approved => user.is_approved,
                ApprovalFilter::All => true,
            })
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        Ok(self
            .users
            .lock()
            .await
            .iter()
            .find(|stored| stored.record.id == id)
            .map(|stored| stored.record.clone()))
    }

    async fn find_auth_by_email(&self, email: &str) -> Result<Option<UserAuthRecord>, RepoError> {
        Ok(self
            .users
            .lock()
            .await
            .iter()
            .find(|stored| stored.record.email == email)
            .map(|stored| UserAuthRecord {
                id: stored.record.id,
                email: stored.record.email.clone(),
                password_hash: stored.password_hash.clone(),
                role: stored.record.role,
                is_approved: stored.record.is_approved,
            }))
    }

    async fn create(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut users = self.users.lock().await;
        if users.iter().any(|stored| stored.record.email == params.email) {
            return Err(RepoError::Duplicate {
                constraint: "users_email_key".into(),
            });
        }
        let record = UserRecord {
            id: Uuid::new_v4(),
            email: params.email,
            role: params.role,
            is_approved: params.is_approved,
            approved_at: params.is_approved.then(now),
            created_at: now(),
        };
        users.push(StoredUser {
            record: record.clone(),
            password_hash: params.password_hash,
        });
        Ok(record)
    }

    async fn approve(&self, id: Uuid) -> Result<UserRecord, RepoError> {
        let mut users = self.users.lock().await;
        let stored = users
            .iter_mut()
            .find(|stored| stored.record.id == id)
            .ok_or(RepoError::NotFound)?;
        stored.record.is_approved = true;
        stored.record.approved_at = Some(now());
        Ok(stored.record.clone())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<UserRecord, RepoError> {
        let mut users = self.users.lock().await;
        let current = users
            .iter()
            .find(|stored| stored.record.id == id)
            .map(|stored| stored.record.role)
            .ok_or(RepoError::NotFound)?;
        if current == Role::Admin && role != Role::Admin {
            let other_admins = users
                .iter()
                .filter(|stored| stored.record.id != id && stored.record.role == Role::Admin)
                .count();
            if other_admins == 0 {
                return Err(RepoError::integrity("cannot demote the last admin"));
            }
        }
        let stored = users
            .iter_mut()
            .find(|stored| stored.record.id == id)
            .ok_or(RepoError::NotFound)?;
        stored.record.role = role;
        Ok(stored.record.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let mut users = self.users.lock().await;
        let target = users
            .iter()
            .find(|stored| stored.record.id == id)
            .map(|stored| stored.record.role)
            .ok_or(RepoError::NotFound)?;
        if target == Role::Admin {
            let other_admins = users
                .iter()
                .filter(|stored| stored.record.id != id && stored.record.role == Role::Admin)
                .count();
            if other_admins == 0 {
                return Err(RepoError::integrity("cannot remove the last admin"));
            }
        }
        users.retain(|stored| stored.record.id != id);
        Ok(())
    }

    async fn stats(&self) -> Result<UserStats, RepoError> {
        let users = self.users.lock().await;
        Ok(UserStats {
            total: users.len() as u64,
            admins: users
                .iter()
                .filter(|stored| stored.record.role == Role::Admin)
                .count() as u64,
            editors: users
                .iter()
                .filter(|stored| stored.record.role == Role::Editor)
                .count() as u64,
            approved: users
                .iter()
                .filter(|stored| stored.record.is_approved)
                .count() as u64,
            pending: users
                .iter()
                .filter(|stored| !stored.record.is_approved)
                .count() as u64,
            recent: users
                .iter()
                .rev()
                .take(5)
                .map(|stored| stored.record.clone())
                .collect(),
        })
    }
}

#[async_trait]
impl AnalyticsRepo for StubRepos {
    async fn track(&self, params: TrackEventParams) -> Result<AnalyticsEventRecord, RepoError> {
        let event = AnalyticsEventRecord {
            id: Uuid::new_v4(),
            event_type: params.event_type,
            session_id: params.session_id,
            exhibitor_id: params.exhibitor_id,
            search_query: params.search_query,
            payload: params.payload,
            user_agent: params.user_agent,
            created_at: now(),
        };
        self.events.lock().await.push(event.clone());
        Ok(event)
    }

    async fn stats(&self, _range: AnalyticsRange) -> Result<AnalyticsStats, RepoError> {
        let events = self.events.lock().await;
        Ok(AnalyticsStats {
            total_events: events.len() as u64,
            unique_sessions: 0,
            events_by_type: Vec::new(),
            top_search_queries: Vec::new(),
        })
    }

    async fn top_exhibitors(&self, _limit: u32) -> Result<Vec<TopExhibitor>, RepoError> {
        Ok(Vec::new())
    }
}

fn build_state(repos: Arc<StubRepos>, max_requests: u32) -> ApiState {
    let cache = Arc::new(TtlCache::new(Duration::from_secs(300)));

    // Lazy pool: never connected, only present so `/healthz` can exist.
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://localhost/expohall_router_tests")
        .expect("lazy pool");

    let auth = Arc::new(AuthService::new(
        repos.clone(),
        cache.clone(),
        JWT_SECRET,
        Duration::from_secs(3600),
        BCRYPT_COST,
    ));

    ApiState {
        auth,
        booths: Arc::new(BoothService::new(repos.clone(), cache.clone())),
        exhibitors: Arc::new(ExhibitorService::new(
            repos.clone(),
            repos.clone(),
            repos.clone(),
            repos.clone(),
            cache.clone(),
        )),
        sectors: Arc::new(SectorService::new(repos.clone(), cache.clone())),
        themes: Arc::new(ThemeService::new(repos.clone(), cache.clone())),
        favorites: Arc::new(FavoriteService::new(repos.clone())),
        users: Arc::new(UserAdminService::new(repos.clone(), cache.clone())),
        analytics: Arc::new(AnalyticsService::new(repos.clone(), cache.clone())),
        cache,
        db: Arc::new(PostgresRepositories::new(pool)),
        rate_limiter: Arc::new(ApiRateLimiter::new(Duration::from_secs(60), max_requests)),
    }
}

fn router_with(repos: Arc<StubRepos>) -> Router {
    build_router(build_state(repos, 10_000))
}

async fn login(router: &Router, email: &str, password: &str) -> String {
    let response = router
        .clone()
        .oneshot(
            Request::post("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "email": email, "password": password }).to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("login response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    body["token"].as_str().expect("token").to_string()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn booth_listing_is_public_and_paginated() {
    let repos = Arc::new(StubRepos::default());
    repos.seed_booth("A01", 0.0, 0.0).await;
    repos.seed_booth("A02", 50.0, 0.0).await;
    let router = router_with(repos);

    let response = router
        .oneshot(Request::get("/booths?limit=1").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["limit"], 1);
    assert_eq!(body["items"].as_array().expect("items").len(), 1);
    assert_eq!(body["items"][0]["number"], "A01");
}

#[tokio::test]
async fn missing_booth_renders_the_error_envelope_with_the_request_path() {
    let repos = Arc::new(StubRepos::default());
    let router = router_with(repos);
    let id = Uuid::new_v4();

    let response = router
        .oneshot(
            Request::get(format!("/booths/{id}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = read_json(response).await;
    assert_eq!(body["statusCode"], 404);
    assert_eq!(body["path"], format!("/booths/{id}"));
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn writes_require_a_bearer_token() {
    let repos = Arc::new(StubRepos::default());
    let router = router_with(repos);

    let response = router
        .oneshot(
            Request::post("/booths")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "number": "B01", "polygonId": "poly-b01", "x": 1.0, "y": 2.0 })
                        .to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = read_json(response).await;
    assert_eq!(body["statusCode"], 401);
    assert_eq!(body["path"], "/booths");
}

#[tokio::test]
async fn an_editor_can_create_a_booth() {
    let repos = Arc::new(StubRepos::default());
    repos
        .seed_user("editor@expo.test", "pw-editor", Role::Editor, true)
        .await;
    let router = router_with(repos);
    let token = login(&router, "editor@expo.test", "pw-editor").await;

    let response = router
        .oneshot(
            Request::post("/booths")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::from(
                    json!({ "number": "b12", "polygonId": "poly-b12", "x": 4.0, "y": 9.0 })
                        .to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    // Numbers are normalized to upper case.
    assert_eq!(body["number"], "B12");
}

#[tokio::test]
async fn an_editor_cannot_reach_user_administration() {
    let repos = Arc::new(StubRepos::default());
    repos
        .seed_user("editor@expo.test", "pw-editor", Role::Editor, true)
        .await;
    let router = router_with(repos);
    let token = login(&router, "editor@expo.test", "pw-editor").await;

    let response = router
        .oneshot(
            Request::get("/users")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = read_json(response).await;
    assert_eq!(body["statusCode"], 403);
    assert_eq!(body["path"], "/users");
}

#[tokio::test]
async fn demoting_the_only_admin_is_a_conflict() {
    let repos = Arc::new(StubRepos::default());
    let admin_id = repos
        .seed_user("admin@expo.test", "pw-admin", Role::Admin, true)
        .await;
    let router = router_with(repos);
    let token = login(&router, "admin@expo.test", "pw-admin").await;

    let response = router
        .oneshot(
            Request::patch(format!("/users/{admin_id}/role"))
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::from(json!({ "role": "editor" }).to_string()))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn admin_sees_user_listing_and_stats() {
    let repos = Arc::new(StubRepos::default());
    repos
        .seed_user("admin@expo.test", "pw-admin", Role::Admin, true)
        .await;
    repos
        .seed_user("pending@expo.test", "pw-pending", Role::Editor, false)
        .await;
    let router = router_with(repos);
    let token = login(&router, "admin@expo.test", "pw-admin").await;

    let response = router
        .clone()
        .oneshot(
            Request::get("/users?status=pending")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body.as_array().expect("users").len(), 1);
    assert_eq!(body[0]["email"], "pending@expo.test");

    let response = router
        .oneshot(
            Request::get("/users/stats/summary")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["total"], 2);
    assert_eq!(body["pending"], 1);
}

#[tokio::test]
async fn favorites_need_the_session_header() {
    let repos = Arc::new(StubRepos::default());
    let router = router_with(repos);

    let response = router
        .oneshot(Request::get("/favorites").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json(response).await;
    assert_eq!(body["statusCode"], 400);
}

#[tokio::test]
async fn favorite_round_trip_and_duplicate_conflict() {
    let repos = Arc::new(StubRepos::default());
    let exhibitor = repos.seed_exhibitor("Acme", "acme").await;
    let router = router_with(repos);
    let exhibitor_id = exhibitor.exhibitor.id;

    let add = |router: &Router| {
        router.clone().oneshot(
            Request::post("/favorites")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-session-id", "visitor-1")
                .body(Body::from(
                    json!({ "exhibitorId": exhibitor_id }).to_string(),
                ))
                .expect("request"),
        )
    };

    let response = add(&router).await.expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = add(&router).await.expect("response");
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = router
        .clone()
        .oneshot(
            Request::get("/favorites")
                .header("x-session-id", "visitor-1")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body.as_array().expect("favorites").len(), 1);

    let response = router
        .oneshot(
            Request::delete(format!("/favorites/{exhibitor_id}"))
                .header("x-session-id", "visitor-1")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn csv_export_sets_the_download_headers() {
    let repos = Arc::new(StubRepos::default());
    repos
        .seed_user("editor@expo.test", "pw-editor", Role::Editor, true)
        .await;
    repos.seed_exhibitor("Acme", "acme").await;
    let router = router_with(repos);
    let token = login(&router, "editor@expo.test", "pw-editor").await;

    let response = router
        .oneshot(
            Request::get("/exhibitors/export")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.starts_with("text/csv"))
    );
    assert!(
        response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.contains("exhibitors.csv"))
    );
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let text = String::from_utf8(bytes.to_vec()).expect("utf8 csv");
    assert!(text.lines().next().is_some_and(|header| header.starts_with("name,sector")));
    assert!(text.contains("Acme"));
}

#[tokio::test]
async fn tracking_is_public_and_stats_are_admin_only() {
    let repos = Arc::new(StubRepos::default());
    repos
        .seed_user("admin@expo.test", "pw-admin", Role::Admin, true)
        .await;
    let router = router_with(repos);

    let response = router
        .clone()
        .oneshot(
            Request::post("/analytics/track")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::USER_AGENT, "router-test")
                .body(Body::from(
                    json!({ "eventType": "view", "sessionId": "visitor-1" }).to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json(response).await;
    assert_eq!(body["eventType"], "view");
    assert_eq!(body["userAgent"], "router-test");

    let response = router
        .clone()
        .oneshot(Request::get("/analytics/stats").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let token = login(&router, "admin@expo.test", "pw-admin").await;
    let response = router
        .oneshot(
            Request::get("/analytics/stats")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["totalEvents"], 1);
}

#[tokio::test]
async fn bad_stats_range_is_rejected() {
    let repos = Arc::new(StubRepos::default());
    repos
        .seed_user("admin@expo.test", "pw-admin", Role::Admin, true)
        .await;
    let router = router_with(repos);
    let token = login(&router, "admin@expo.test", "pw-admin").await;

    let response = router
        .oneshot(
            Request::get("/analytics/stats?from=yesterday")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn auth_me_reflects_the_token() {
    let repos = Arc::new(StubRepos::default());
    repos
        .seed_user("editor@expo.test", "pw-editor", Role::Editor, true)
        .await;
    let router = router_with(repos);
    let token = login(&router, "editor@expo.test", "pw-editor").await;

    let response = router
        .oneshot(
            Request::get("/auth/me")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["email"], "editor@expo.test");
    assert_eq!(body["role"], "editor");
}

#[tokio::test]
async fn unapproved_accounts_cannot_use_their_token() {
    let repos = Arc::new(StubRepos::default());
    repos
        .seed_user("pending@expo.test", "pw-pending", Role::Editor, false)
        .await;
    let router = router_with(repos);

    let response = router
        .oneshot(
            Request::post("/auth/login")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({ "email": "pending@expo.test", "password": "pw-pending" }).to_string(),
                ))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn the_rate_limit_returns_429_with_retry_after() {
    let repos = Arc::new(StubRepos::default());
    let router = build_router(build_state(repos, 2));

    for _ in 0..2 {
        let response = router
            .clone()
            .oneshot(
                Request::get("/booths")
                    .header("x-forwarded-for", "198.51.100.7")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = router
        .oneshot(
            Request::get("/booths")
                .header("x-forwarded-for", "198.51.100.7")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));
    let body = read_json(response).await;
    assert_eq!(body["statusCode"], 429);
    assert_eq!(body["path"], "/booths");
}
