//! Floor-plan booth catalogue.
//!
//! Reads are memoized under `booth:*` keys; every write clears the whole
//! prefix because area, nearby and stats queries all depend on the same
//! rows.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::application::cache::TtlCache;
use crate::application::pagination::{PageRequest, Paginated};
use crate::application::repos::{
    AreaBounds, BoothQueryFilter, BoothStats, BoothWithExhibitor, BoothsRepo, CreateBoothParams,
    NearbyBooth, NearbyQuery, RepoError, UpdateBoothParams,
};
use crate::domain::entities::BoothRecord;

const CACHE_TTL: Duration = Duration::from_secs(600);
const STATS_TTL: Duration = Duration::from_secs(1200);
const DEFAULT_NEARBY_RADIUS: f64 = 100.0;
const MAX_NEARBY_RESULTS: u32 = 100;

#[derive(Debug, Error)]
pub enum BoothError {
    #[error("{0}")]
    Validation(String),
    #[error("booth not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for BoothError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => BoothError::NotFound,
            RepoError::Duplicate { constraint } => {
                BoothError::Conflict(format!("booth conflicts on `{constraint}`"))
            }
            other => BoothError::Repo(other),
        }
    }
}

#[derive(Clone)]
pub struct BoothService {
    repo: Arc<dyn BoothsRepo>,
    cache: Arc<TtlCache>,
}

impl BoothService {
    pub fn new(repo: Arc<dyn BoothsRepo>, cache: Arc<TtlCache>) -> Self {
        Self { repo, cache }
    }

    pub async fn list(
        &self,
        filter: BoothQueryFilter,
        page: PageRequest,
    ) -> Result<Paginated<BoothWithExhibitor>, BoothError> {
        let key = format!(
            "booth:list:{}:{}:{}",
            page.limit(),
            page.offset(),
            filter.number.as_deref().unwrap_or("")
        );
        self.cache
            .get_or_set(&key, Some(CACHE_TTL), || async {
                self.repo.list(&filter, page).await.map_err(BoothError::from)
            })
            .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<BoothWithExhibitor, BoothError> {
        let key = format!("booth:id:{id}");
        self.cache
            .get_or_set(&key, Some(CACHE_TTL), || async {
                self.repo
                    .find_by_id(id)
                    .await
                    .map_err(BoothError::from)?
                    .ok_or(BoothError::NotFound)
            })
            .await
    }

    pub async fn find_by_number(&self, number: &str) -> Result<BoothWithExhibitor, BoothError> {
        let number = normalize_number(number)?;
        let key = format!("booth:number:{number}");
        self.cache
            .get_or_set(&key, Some(CACHE_TTL), || async {
                self.repo
                    .find_by_number(&number)
                    .await
                    .map_err(BoothError::from)?
                    .ok_or(BoothError::NotFound)
            })
            .await
    }

    pub async fn find_by_polygon_id(
        &self,
        polygon_id: &str,
    ) -> Result<BoothWithExhibitor, BoothError> {
        let polygon_id = polygon_id.trim();
        if polygon_id.is_empty() {
            return Err(BoothError::Validation("polygon id is required".into()));
        }
        let key = format!("booth:polygon:{polygon_id}");
        let polygon_id = polygon_id.to_string();
        self.cache
            .get_or_set(&key, Some(CACHE_TTL), || async {
                self.repo
                    .find_by_polygon_id(&polygon_id)
                    .await
                    .map_err(BoothError::from)?
                    .ok_or(BoothError::NotFound)
            })
            .await
    }

    pub async fn in_area(&self, bounds: AreaBounds) -> Result<Vec<BoothWithExhibitor>, BoothError> {
        if bounds.min_x > bounds.max_x || bounds.min_y > bounds.max_y {
            return Err(BoothError::Validation(
                "area bounds are inverted".into(),
            ));
        }
        let key = format!(
            "booth:area:{}:{}:{}:{}",
            bounds.min_x, bounds.max_x, bounds.min_y, bounds.max_y
        );
        self.cache
            .get_or_set(&key, Some(CACHE_TTL), || async {
                self.repo.in_area(bounds).await.map_err(BoothError::from)
            })
            .await
    }

    pub async fn nearby(
        &self,
        x: f64,
        y: f64,
        radius: Option<f64>,
        limit: Option<u32>,
    ) -> Result<Vec<NearbyBooth>, BoothError> {
        let radius = radius.unwrap_or(DEFAULT_NEARBY_RADIUS);
        if !radius.is_finite() || radius <= 0.0 {
            return Err(BoothError::Validation("radius must be positive".into()));
        }
        if !x.is_finite() || !y.is_finite() {
            return Err(BoothError::Validation("coordinates must be finite".into()));
        }
        let limit = limit.unwrap_or(20).clamp(1, MAX_NEARBY_RESULTS);
        let query = NearbyQuery { x, y, radius, limit };
        let key = format!("booth:nearby:{x}:{y}:{radius}:{limit}");
        self.cache
            .get_or_set(&key, Some(CACHE_TTL), || async {
                self.repo.nearby(query).await.map_err(BoothError::from)
            })
            .await
    }

    pub async fn stats(&self) -> Result<BoothStats, BoothError> {
        self.cache
            .get_or_set("booth:stats", Some(STATS_TTL), || async {
                self.repo.stats().await.map_err(BoothError::from)
            })
            .await
    }

    pub async fn create(&self, mut params: CreateBoothParams) -> Result<BoothRecord, BoothError> {
        params.number = normalize_number(&params.number)?;
        params.polygon_id = params.polygon_id.trim().to_string();
        if params.polygon_id.is_empty() {
            return Err(BoothError::Validation("polygon id is required".into()));
        }

        let booth = self.repo.create(params).await?;
        self.invalidate();
        Ok(booth)
    }

    pub async fn update(
        &self,
        id: Uuid,
        mut params: UpdateBoothParams,
    ) -> Result<BoothRecord, BoothError> {
        if let Some(number) = params.number.take() {
            params.number = Some(normalize_number(&number)?);
        }

        let booth = self.repo.update(id, params).await?;
        self.invalidate();
        Ok(booth)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), BoothError> {
        self.repo.delete(id).await?;
        self.invalidate();
        Ok(())
    }

    pub async fn bulk_create(&self, batch: Vec<CreateBoothParams>) -> Result<u64, BoothError> {
        if batch.is_empty() {
            return Ok(0);
        }
        let batch = batch
            .into_iter()
            .map(|mut params| {
                params.number = normalize_number(&params.number)?;
                params.polygon_id = params.polygon_id.trim().to_string();
                if params.polygon_id.is_empty() {
                    return Err(BoothError::Validation("polygon id is required".into()));
                }
                Ok(params)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let created = self.repo.bulk_create(batch).await?;
        self.invalidate();
        Ok(created)
    }

    fn invalidate(&self) {
        self.cache.delete_pattern("booth:*");
    }
}

fn normalize_number(number: &str) -> Result<String, BoothError> {
    let number = number.trim().to_uppercase();
    if number.is_empty() {
        return Err(BoothError::Validation("booth number is required".into()));
    }
    Ok(number)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::json;
    use time::OffsetDateTime;

    use super::*;

    #[derive(Default)]
    struct StubBoothsRepo {
        created: Mutex<Vec<CreateBoothParams>>,
        duplicate_on_create: bool,
    }

    fn sample_booth(number: &str) -> BoothRecord {
        BoothRecord {
            id: Uuid::new_v4(),
            number: number.to_string(),
            polygon_id: format!("poly-{number}"),
            x: 10.0,
            y: 20.0,
            width: Some(30.0),
            height: Some(30.0),
            rotation: 0.0,
            polygon_points: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[async_trait]
    impl BoothsRepo for StubBoothsRepo {
        async fn list(
            &self,
            _filter: &BoothQueryFilter,
            page: PageRequest,
        ) -> Result<Paginated<BoothWithExhibitor>, RepoError> {
            Ok(Paginated::empty(&page))
        }

        async fn find_by_id(&self, _id: Uuid) -> Result<Option<BoothWithExhibitor>, RepoError> {
            Ok(None)
        }

        async fn find_by_number(
            &self,
            number: &str,
        ) -> Result<Option<BoothWithExhibitor>, RepoError> {
            Ok(Some(BoothWithExhibitor {
                booth: sample_booth(number),
                exhibitor: None,
            }))
        }

        async fn find_by_polygon_id(
            &self,
            _polygon_id: &str,
        ) -> Result<Option<BoothWithExhibitor>, RepoError> {
            Ok(None)
        }

        async fn in_area(&self, _bounds: AreaBounds) -> Result<Vec<BoothWithExhibitor>, RepoError> {
            Ok(Vec::new())
        }

        async fn nearby(&self, _query: NearbyQuery) -> Result<Vec<NearbyBooth>, RepoError> {
            Ok(Vec::new())
        }

        async fn stats(&self) -> Result<BoothStats, RepoError> {
            Ok(BoothStats {
                total: 0,
                occupied: 0,
                available: 0,
                occupancy_rate: 0.0,
                bounds: None,
            })
        }

        async fn create(&self, params: CreateBoothParams) -> Result<BoothRecord, RepoError> {
            if self.duplicate_on_create {
                return Err(RepoError::Duplicate {
                    constraint: "booths_number_key".into(),
                });
            }
            let booth = sample_booth(&params.number);
            self.created.lock().unwrap().push(params);
            Ok(booth)
        }

        async fn update(
            &self,
            _id: Uuid,
            _params: UpdateBoothParams,
        ) -> Result<BoothRecord, RepoError> {
            Err(RepoError::NotFound)
        }

        async fn delete(&self, _id: Uuid) -> Result<(), RepoError> {
            Ok(())
        }

        async fn bulk_create(&self, batch: Vec<CreateBoothParams>) -> Result<u64, RepoError> {
            Ok(batch.len() as u64)
        }
    }

    fn service(repo: StubBoothsRepo) -> (BoothService, Arc<TtlCache>) {
        let cache = Arc::new(TtlCache::new(Duration::from_secs(300)));
        (BoothService::new(Arc::new(repo), cache.clone()), cache)
    }

    #[tokio::test]
    async fn create_uppercases_and_trims_number() {
        let repo = StubBoothsRepo::default();
        let (service, _cache) = service(repo);

        let booth = service
            .create(CreateBoothParams {
                number: "  a12 ".into(),
                polygon_id: "poly-a12".into(),
                x: 1.0,
                y: 2.0,
                width: None,
                height: None,
                rotation: 0.0,
                polygon_points: None,
            })
            .await
            .expect("create succeeds");

        assert_eq!(booth.number, "A12");
    }

    #[tokio::test]
    async fn create_maps_duplicate_to_conflict() {
        let repo = StubBoothsRepo {
            duplicate_on_create: true,
            ..StubBoothsRepo::default()
        };
        let (service, _cache) = service(repo);

        let result = service
            .create(CreateBoothParams {
                number: "A12".into(),
                polygon_id: "poly".into(),
                x: 0.0,
                y: 0.0,
                width: None,
                height: None,
                rotation: 0.0,
                polygon_points: None,
            })
            .await;

        assert!(matches!(result, Err(BoothError::Conflict(_))));
    }

    #[tokio::test]
    async fn writes_invalidate_booth_prefix() {
        let repo = StubBoothsRepo::default();
        let (service, cache) = service(repo);
        cache.set("booth:stats", json!({"total": 9}), None);
        cache.set("exhibitor:search:all", json!([]), None);

        service
            .create(CreateBoothParams {
                number: "B01".into(),
                polygon_id: "poly-b01".into(),
                x: 0.0,
                y: 0.0,
                width: None,
                height: None,
                rotation: 0.0,
                polygon_points: None,
            })
            .await
            .expect("create succeeds");

        assert!(!cache.has("booth:stats"));
        assert!(cache.has("exhibitor:search:all"));
    }

    #[tokio::test]
    async fn area_rejects_inverted_bounds() {
        let (service, _cache) = service(StubBoothsRepo::default());
        let result = service
            .in_area(AreaBounds {
                min_x: 10.0,
                max_x: 0.0,
                min_y: 0.0,
                max_y: 5.0,
            })
            .await;
        assert!(matches!(result, Err(BoothError::Validation(_))));
    }

    #[tokio::test]
    async fn nearby_rejects_nonpositive_radius() {
        let (service, _cache) = service(StubBoothsRepo::default());
        let result = service.nearby(0.0, 0.0, Some(-5.0), None).await;
        assert!(matches!(result, Err(BoothError::Validation(_))));
    }

    #[tokio::test]
    async fn lookup_by_number_normalizes_before_querying() {
        let (service, _cache) = service(StubBoothsRepo::default());
        let found = service.find_by_number(" b07 ").await.expect("found");
        assert_eq!(found.booth.number, "B07");
    }
}
