//! Sector taxonomy for the exhibitor catalogue.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::application::cache::TtlCache;
use crate::application::repos::{
    RepoError, SectorDetail, SectorParams, SectorStats, SectorWithCount, SectorsRepo,
};
use crate::domain::entities::SectorRecord;

const CACHE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Error)]
pub enum SectorError {
    #[error("{0}")]
    Validation(String),
    #[error("sector not found")]
    NotFound,
    #[error("sector still has {count} exhibitors")]
    InUse { count: u64 },
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for SectorError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => SectorError::NotFound,
            RepoError::Duplicate { constraint } => {
                SectorError::Conflict(format!("sector conflicts on `{constraint}`"))
            }
            other => SectorError::Repo(other),
        }
    }
}

#[derive(Clone)]
pub struct SectorService {
    repo: Arc<dyn SectorsRepo>,
    cache: Arc<TtlCache>,
}

impl SectorService {
    pub fn new(repo: Arc<dyn SectorsRepo>, cache: Arc<TtlCache>) -> Self {
        Self { repo, cache }
    }

    pub async fn list(&self) -> Result<Vec<SectorWithCount>, SectorError> {
        self.cache
            .get_or_set("sector:list", Some(CACHE_TTL), || async {
                self.repo.list_with_counts().await.map_err(SectorError::from)
            })
            .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<SectorDetail, SectorError> {
        let key = format!("sector:id:{id}");
        self.cache
            .get_or_set(&key, Some(CACHE_TTL), || async {
                self.repo
                    .find_by_id(id)
                    .await
                    .map_err(SectorError::from)?
                    .ok_or(SectorError::NotFound)
            })
            .await
    }

    pub async fn stats(&self, id: Uuid) -> Result<SectorStats, SectorError> {
        let key = format!("sector:stats:{id}");
        self.cache
            .get_or_set(&key, Some(CACHE_TTL), || async {
                self.repo
                    .stats(id)
                    .await
                    .map_err(SectorError::from)?
                    .ok_or(SectorError::NotFound)
            })
            .await
    }

    pub async fn create(&self, name: &str, color: &str) -> Result<SectorRecord, SectorError> {
        let params = validate_params(name, color)?;
        let sector = self.repo.create(params).await?;
        self.cache.delete_pattern("sector:*");
        Ok(sector)
    }

    pub async fn update(
        &self,
        id: Uuid,
        name: &str,
        color: &str,
    ) -> Result<SectorRecord, SectorError> {
        let params = validate_params(name, color)?;
        let sector = self.repo.update(id, params).await?;
        // Exhibitor payloads embed the sector name and color.
        self.cache.delete_pattern("sector:*");
        self.cache.delete_pattern("exhibitor:*");
        Ok(sector)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), SectorError> {
        let count = self.repo.count_exhibitors(id).await?;
        if count > 0 {
            return Err(SectorError::InUse { count });
        }
        self.repo.delete(id).await?;
        self.cache.delete_pattern("sector:*");
        Ok(())
    }
}

fn validate_params(name: &str, color: &str) -> Result<SectorParams, SectorError> {
    let name = name.trim().to_string();
    if name.is_empty() {
        return Err(SectorError::Validation("name is required".into()));
    }
    Ok(SectorParams {
        name,
        color_hex: normalize_color(color)?,
    })
}

/// Accept `RRGGBB` with or without the leading `#`; stored uppercased.
fn normalize_color(color: &str) -> Result<String, SectorError> {
    let hex = color.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SectorError::Validation(format!(
            "invalid color `{color}`, expected #RRGGBB"
        )));
    }
    Ok(format!("#{}", hex.to_uppercase()))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use serde_json::json;
    use time::OffsetDateTime;

    use super::*;

    struct StubSectorsRepo {
        exhibitor_count: u64,
    }

    #[async_trait]
    impl SectorsRepo for StubSectorsRepo {
        async fn list_with_counts(&self) -> Result<Vec<SectorWithCount>, RepoError> {
            Ok(Vec::new())
        }

        async fn find_by_id(&self, _id: Uuid) -> Result<Option<SectorDetail>, RepoError> {
            Ok(None)
        }

        async fn find_by_name(&self, _name: &str) -> Result<Option<SectorRecord>, RepoError> {
            Ok(None)
        }

        async fn exists(&self, _id: Uuid) -> Result<bool, RepoError> {
            Ok(true)
        }

        async fn stats(&self, _id: Uuid) -> Result<Option<SectorStats>, RepoError> {
            Ok(None)
        }

        async fn count_exhibitors(&self, _id: Uuid) -> Result<u64, RepoError> {
            Ok(self.exhibitor_count)
        }

        async fn create(&self, params: SectorParams) -> Result<SectorRecord, RepoError> {
            Ok(SectorRecord {
                id: Uuid::new_v4(),
                name: params.name,
                color_hex: params.color_hex,
                created_at: OffsetDateTime::now_utc(),
                updated_at: OffsetDateTime::now_utc(),
            })
        }

        async fn update(&self, _id: Uuid, _params: SectorParams) -> Result<SectorRecord, RepoError> {
            Err(RepoError::NotFound)
        }

        async fn delete(&self, _id: Uuid) -> Result<(), RepoError> {
            Ok(())
        }
    }

    fn service(exhibitor_count: u64) -> (SectorService, Arc<TtlCache>) {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(300)));
        (
            SectorService::new(Arc::new(StubSectorsRepo { exhibitor_count }), cache.clone()),
            cache,
        )
    }

    #[tokio::test]
    async fn create_normalizes_color() {
        let (service, _cache) = service(0);
        let sector = service.create("Tech", "aa00ff").await.expect("created");
        assert_eq!(sector.color_hex, "#AA00FF");
    }

    #[tokio::test]
    async fn create_rejects_malformed_color() {
        let (service, _cache) = service(0);
        let result = service.create("Tech", "#12XYZ9").await;
        assert!(matches!(result, Err(SectorError::Validation(_))));
    }

    #[tokio::test]
    async fn delete_refuses_while_in_use() {
        let (service, _cache) = service(4);
        let result = service.delete(Uuid::new_v4()).await;
        match result {
            Err(SectorError::InUse { count }) => assert_eq!(count, 4),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_invalidates_sector_prefix() {
        let (service, cache) = service(0);
        cache.set("sector:list", json!([]), None);
        service.create("Tech", "#123456").await.expect("created");
        assert!(!cache.has("sector:list"));
    }
}
