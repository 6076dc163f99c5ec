//! Append-only visitor analytics.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

use crate::application::cache::TtlCache;
use crate::application::repos::{
    AnalyticsRange, AnalyticsRepo, AnalyticsStats, RepoError, TopExhibitor, TrackEventParams,
};
use crate::domain::entities::AnalyticsEventRecord;

const STATS_TTL: Duration = Duration::from_secs(600);
const MAX_TOP_EXHIBITORS: u32 = 50;

#[derive(Debug, Error)]
pub enum AnalyticsError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Debug, Clone)]
pub struct TrackEventCommand {
    pub event_type: String,
    pub session_id: Option<String>,
    pub exhibitor_id: Option<Uuid>,
    pub search_query: Option<String>,
    pub payload: Option<Value>,
    pub user_agent: Option<String>,
}

#[derive(Clone)]
pub struct AnalyticsService {
    repo: Arc<dyn AnalyticsRepo>,
    cache: Arc<TtlCache>,
}

impl AnalyticsService {
    pub fn new(repo: Arc<dyn AnalyticsRepo>, cache: Arc<TtlCache>) -> Self {
        Self { repo, cache }
    }

    /// Record one event. Tracking never invalidates stats; those refresh
    /// through their TTL.
    pub async fn track(
        &self,
        command: TrackEventCommand,
    ) -> Result<AnalyticsEventRecord, AnalyticsError> {
        let event_type = command.event_type.trim().to_string();
        if event_type.is_empty() {
            return Err(AnalyticsError::Validation("event type is required".into()));
        }

        let params = TrackEventParams {
            event_type,
            session_id: command.session_id.filter(|s| !s.trim().is_empty()),
            exhibitor_id: command.exhibitor_id,
            search_query: command
                .search_query
                .map(|q| q.trim().to_string())
                .filter(|q| !q.is_empty()),
            payload: command.payload.unwrap_or_else(|| Value::Object(Default::default())),
            user_agent: command.user_agent,
        };

        let event = self.repo.track(params).await?;
        Ok(event)
    }

    pub async fn stats(&self, range: AnalyticsRange) -> Result<AnalyticsStats, AnalyticsError> {
        let key = format!(
            "analytics:stats:{}:{}",
            format_bound(range.from),
            format_bound(range.to)
        );
        self.cache
            .get_or_set(&key, Some(STATS_TTL), || async {
                self.repo.stats(range).await.map_err(AnalyticsError::from)
            })
            .await
    }

    pub async fn top_exhibitors(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<TopExhibitor>, AnalyticsError> {
        let limit = limit.unwrap_or(10).clamp(1, MAX_TOP_EXHIBITORS);
        let key = format!("analytics:top:{limit}");
        self.cache
            .get_or_set(&key, Some(STATS_TTL), || async {
                self.repo
                    .top_exhibitors(limit)
                    .await
                    .map_err(AnalyticsError::from)
            })
            .await
    }
}

fn format_bound(bound: Option<OffsetDateTime>) -> String {
    bound
        .and_then(|ts| ts.format(&Rfc3339).ok())
        .unwrap_or_else(|| "open".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;

    #[derive(Default)]
    struct StubAnalyticsRepo {
        tracked: Mutex<Vec<TrackEventParams>>,
        stats_calls: AtomicUsize,
        top_limits: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl AnalyticsRepo for StubAnalyticsRepo {
        async fn track(
            &self,
            params: TrackEventParams,
        ) -> Result<AnalyticsEventRecord, RepoError> {
            let record = AnalyticsEventRecord {
                id: Uuid::new_v4(),
                event_type: params.event_type.clone(),
                session_id: params.session_id.clone(),
                exhibitor_id: params.exhibitor_id,
                search_query: params.search_query.clone(),
                payload: params.payload.clone(),
                user_agent: params.user_agent.clone(),
                created_at: OffsetDateTime::now_utc(),
            };
            self.tracked.lock().unwrap().push(params);
            Ok(record)
        }

        async fn stats(&self, _range: AnalyticsRange) -> Result<AnalyticsStats, RepoError> {
            self.stats_calls.fetch_add(1, Ordering::SeqCst);
            Ok(AnalyticsStats {
                total_events: 7,
                unique_sessions: 3,
                events_by_type: Vec::new(),
                top_search_queries: Vec::new(),
            })
        }

        async fn top_exhibitors(&self, limit: u32) -> Result<Vec<TopExhibitor>, RepoError> {
            self.top_limits.lock().unwrap().push(limit);
            Ok(Vec::new())
        }
    }

    fn service() -> (AnalyticsService, Arc<StubAnalyticsRepo>) {
        let repo = Arc::new(StubAnalyticsRepo::default());
        let cache = Arc::new(TtlCache::new(Duration::from_secs(300)));
        (AnalyticsService::new(repo.clone(), cache), repo)
    }

    #[tokio::test]
    async fn track_requires_event_type() {
        let (service, _repo) = service();
        let result = service
            .track(TrackEventCommand {
                event_type: "  ".into(),
                session_id: None,
                exhibitor_id: None,
                search_query: None,
                payload: None,
                user_agent: None,
            })
            .await;
        assert!(matches!(result, Err(AnalyticsError::Validation(_))));
    }

    #[tokio::test]
    async fn track_defaults_payload_to_empty_object() {
        let (service, repo) = service();
        service
            .track(TrackEventCommand {
                event_type: "exhibitor_view".into(),
                session_id: Some("visitor-1".into()),
                exhibitor_id: Some(Uuid::new_v4()),
                search_query: None,
                payload: None,
                user_agent: None,
            })
            .await
            .expect("tracked");

        let tracked = repo.tracked.lock().unwrap();
        assert_eq!(tracked[0].payload, json!({}));
    }

    #[tokio::test]
    async fn stats_are_memoized_per_range() {
        let (service, repo) = service();
        let range = AnalyticsRange::default();

        service.stats(range).await.expect("stats");
        service.stats(range).await.expect("stats");
        assert_eq!(repo.stats_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn top_exhibitors_clamps_limit() {
        let (service, repo) = service();
        service.top_exhibitors(Some(500)).await.expect("top");
        assert_eq!(repo.top_limits.lock().unwrap()[0], MAX_TOP_EXHIBITORS);
    }
}
