//! Thematic trails: ordered groupings of exhibitors for guided visits.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::application::cache::TtlCache;
use crate::application::repos::{
    CreateThemeParams, RepoError, ThemeDetail, ThemeWithCount, ThemesRepo, UpdateThemeParams,
};
use crate::domain::entities::ThemeRecord;
use crate::domain::slug::{SlugAsyncError, SlugError, derive_slug, generate_unique_slug_async};

const CACHE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("{0}")]
    Validation(String),
    #[error("theme not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for ThemeError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => ThemeError::NotFound,
            RepoError::Duplicate { constraint } => {
                ThemeError::Conflict(format!("theme conflicts on `{constraint}`"))
            }
            RepoError::InvalidInput { message } => ThemeError::Validation(message),
            other => ThemeError::Repo(other),
        }
    }
}

impl From<SlugAsyncError<RepoError>> for ThemeError {
    fn from(err: SlugAsyncError<RepoError>) -> Self {
        match err {
            SlugAsyncError::Slug(SlugError::EmptyInput | SlugError::Unrepresentable { .. }) => {
                ThemeError::Validation("name cannot be turned into a slug".into())
            }
            SlugAsyncError::Slug(SlugError::Exhausted { base }) => {
                ThemeError::Conflict(format!("no free slug variant left for `{base}`"))
            }
            SlugAsyncError::Predicate(err) => ThemeError::from(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateThemeCommand {
    pub name: String,
    pub description: Option<String>,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateThemeCommand {
    pub name: Option<String>,
    pub description: Option<String>,
    pub position: Option<i32>,
}

#[derive(Clone)]
pub struct ThemeService {
    repo: Arc<dyn ThemesRepo>,
    cache: Arc<TtlCache>,
}

impl ThemeService {
    pub fn new(repo: Arc<dyn ThemesRepo>, cache: Arc<TtlCache>) -> Self {
        Self { repo, cache }
    }

    pub async fn list(&self) -> Result<Vec<ThemeWithCount>, ThemeError> {
        self.cache
            .get_or_set("theme:list", Some(CACHE_TTL), || async {
                self.repo.list_with_counts().await.map_err(ThemeError::from)
            })
            .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<ThemeDetail, ThemeError> {
        let key = format!("theme:id:{id}");
        self.cache
            .get_or_set(&key, Some(CACHE_TTL), || async {
                self.repo
                    .find_by_id(id)
                    .await
                    .map_err(ThemeError::from)?
                    .ok_or(ThemeError::NotFound)
            })
            .await
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<ThemeDetail, ThemeError> {
        let slug = slug.trim().to_lowercase();
        let key = format!("theme:slug:{slug}");
        self.cache
            .get_or_set(&key, Some(CACHE_TTL), || async {
                self.repo
                    .find_by_slug(&slug)
                    .await
                    .map_err(ThemeError::from)?
                    .ok_or(ThemeError::NotFound)
            })
            .await
    }

    pub async fn create(&self, command: CreateThemeCommand) -> Result<ThemeRecord, ThemeError> {
        let name = command.name.trim().to_string();
        if name.is_empty() {
            return Err(ThemeError::Validation("name is required".into()));
        }

        let slug = self.unique_slug(&name).await?;
        let params = CreateThemeParams {
            name,
            slug,
            description: command.description.and_then(non_empty),
            position: command.position.unwrap_or(0),
        };

        let theme = self.repo.create(params).await?;
        self.invalidate();
        Ok(theme)
    }

    pub async fn update(
        &self,
        id: Uuid,
        command: UpdateThemeCommand,
    ) -> Result<ThemeRecord, ThemeError> {
        let existing = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or(ThemeError::NotFound)?;

        let mut params = UpdateThemeParams {
            description: command.description.and_then(non_empty),
            position: command.position,
            ..UpdateThemeParams::default()
        };

        if let Some(name) = command.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ThemeError::Validation("name is required".into()));
            }
            let keeps_slug = derive_slug(&name)
                .map(|base| base == existing.theme.slug)
                .unwrap_or(false);
            if !keeps_slug && name != existing.theme.name {
                params.slug = Some(self.unique_slug(&name).await?);
            }
            params.name = Some(name);
        }

        let theme = self.repo.update(id, params).await?;
        self.invalidate();
        Ok(theme)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ThemeError> {
        self.repo.delete(id).await?;
        self.invalidate();
        Ok(())
    }

    /// Replace the full exhibitor set of a trail.
    pub async fn set_exhibitors(
        &self,
        theme_id: Uuid,
        exhibitor_ids: Vec<Uuid>,
    ) -> Result<ThemeDetail, ThemeError> {
        let detail = self.repo.set_exhibitors(theme_id, exhibitor_ids).await?;
        self.invalidate();
        Ok(detail)
    }

    async fn unique_slug(&self, name: &str) -> Result<String, ThemeError> {
        let repo = self.repo.clone();
        let slug = generate_unique_slug_async(name, move |candidate| {
            let repo = repo.clone();
            let candidate = candidate.to_string();
            async move { repo.slug_exists(&candidate).await.map(|taken| !taken) }
        })
        .await?;
        Ok(slug)
    }

    fn invalidate(&self) {
        self.cache.delete_pattern("theme:*");
        // Exhibitor payloads embed their trails.
        self.cache.delete_pattern("exhibitor:*");
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use time::OffsetDateTime;

    use super::*;

    #[derive(Default)]
    struct StubThemesRepo {
        taken_slugs: HashSet<String>,
        set_calls: Mutex<Vec<(Uuid, Vec<Uuid>)>>,
        reject_set: bool,
    }

    fn sample_theme(name: &str, slug: &str) -> ThemeRecord {
        ThemeRecord {
            id: Uuid::new_v4(),
            name: name.to_string(),
            slug: slug.to_string(),
            description: None,
            position: 0,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[async_trait]
    impl ThemesRepo for StubThemesRepo {
        async fn list_with_counts(&self) -> Result<Vec<ThemeWithCount>, RepoError> {
            Ok(Vec::new())
        }

        async fn find_by_id(&self, _id: Uuid) -> Result<Option<ThemeDetail>, RepoError> {
            Ok(None)
        }

        async fn find_by_slug(&self, _slug: &str) -> Result<Option<ThemeDetail>, RepoError> {
            Ok(None)
        }

        async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
            Ok(self.taken_slugs.contains(slug))
        }

        async fn create(&self, params: CreateThemeParams) -> Result<ThemeRecord, RepoError> {
            Ok(sample_theme(&params.name, &params.slug))
        }

        async fn update(
            &self,
            _id: Uuid,
            _params: UpdateThemeParams,
        ) -> Result<ThemeRecord, RepoError> {
            Err(RepoError::NotFound)
        }

        async fn delete(&self, _id: Uuid) -> Result<(), RepoError> {
            Ok(())
        }

        async fn set_exhibitors(
            &self,
            theme_id: Uuid,
            exhibitor_ids: Vec<Uuid>,
        ) -> Result<ThemeDetail, RepoError> {
            if self.reject_set {
                return Err(RepoError::InvalidInput {
                    message: "unknown exhibitor in set".into(),
                });
            }
            self.set_calls
                .lock()
                .unwrap()
                .push((theme_id, exhibitor_ids.clone()));
            Ok(ThemeDetail {
                theme: sample_theme("Innovation", "innovation"),
                exhibitors: Vec::new(),
            })
        }

        async fn attach_exhibitor(
            &self,
            _theme_id: Uuid,
            _exhibitor_id: Uuid,
        ) -> Result<(), RepoError> {
            Ok(())
        }
    }

    fn service(repo: StubThemesRepo) -> (ThemeService, Arc<TtlCache>) {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(300)));
        (ThemeService::new(Arc::new(repo), cache.clone()), cache)
    }

    #[tokio::test]
    async fn create_disambiguates_taken_slug() {
        let mut repo = StubThemesRepo::default();
        repo.taken_slugs.insert("innovation".into());
        let (service, _cache) = service(repo);

        let theme = service
            .create(CreateThemeCommand {
                name: "Innovation".into(),
                description: None,
                position: None,
            })
            .await
            .expect("created");

        assert_eq!(theme.slug, "innovation-2");
    }

    #[tokio::test]
    async fn set_exhibitors_maps_invalid_ids_to_validation() {
        let repo = StubThemesRepo {
            reject_set: true,
            ..StubThemesRepo::default()
        };
        let (service, _cache) = service(repo);

        let result = service
            .set_exhibitors(Uuid::new_v4(), vec![Uuid::new_v4()])
            .await;
        assert!(matches!(result, Err(ThemeError::Validation(_))));
    }

    #[tokio::test]
    async fn writes_invalidate_theme_and_exhibitor_prefixes() {
        let (service, cache) = service(StubThemesRepo::default());
        cache.set("theme:list", json!([]), None);
        cache.set("exhibitor:id:x", json!({}), None);
        cache.set("booth:stats", json!({}), None);

        service
            .set_exhibitors(Uuid::new_v4(), Vec::new())
            .await
            .expect("set succeeds");

        assert!(!cache.has("theme:list"));
        assert!(!cache.has("exhibitor:id:x"));
        assert!(cache.has("booth:stats"));
    }
}
