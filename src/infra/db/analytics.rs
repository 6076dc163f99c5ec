use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{
        AnalyticsRange, AnalyticsRepo, AnalyticsStats, EventTypeCount, RepoError,
        SearchQueryCount, TopExhibitor, TrackEventParams,
    },
    domain::entities::AnalyticsEventRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const TOP_SEARCH_QUERIES: i64 = 10;

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    event_type: String,
    session_id: Option<String>,
    exhibitor_id: Option<Uuid>,
    search_query: Option<String>,
    payload: serde_json::Value,
    user_agent: Option<String>,
    created_at: OffsetDateTime,
}

impl From<EventRow> for AnalyticsEventRecord {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            event_type: row.event_type,
            session_id: row.session_id,
            exhibitor_id: row.exhibitor_id,
            search_query: row.search_query,
            payload: row.payload,
            user_agent: row.user_agent,
            created_at: row.created_at,
        }
    }
}

fn apply_range<'q>(qb: &mut QueryBuilder<'q, Postgres>, range: &AnalyticsRange) {
    if let Some(from) = range.from {
        qb.push(" AND created_at >= ");
        qb.push_bind(from);
    }
    if let Some(to) = range.to {
        qb.push(" AND created_at <= ");
        qb.push_bind(to);
    }
}

#[async_trait]
impl AnalyticsRepo for PostgresRepositories {
    async fn track(&self, params: TrackEventParams) -> Result<AnalyticsEventRecord, RepoError> {
        let row = sqlx::query_as::<_, EventRow>(
            "INSERT INTO analytics_events (id, event_type, session_id, exhibitor_id, \
                                           search_query, payload, user_agent, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, now()) \
             RETURNING id, event_type, session_id, exhibitor_id, search_query, payload, \
                       user_agent, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(&params.event_type)
        .bind(&params.session_id)
        .bind(params.exhibitor_id)
        .bind(&params.search_query)
        .bind(&params.payload)
        .bind(&params.user_agent)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(AnalyticsEventRecord::from(row))
    }

    async fn stats(&self, range: AnalyticsRange) -> Result<AnalyticsStats, RepoError> {
        #[derive(sqlx::FromRow)]
        struct TotalsRow {
            total_events: i64,
            unique_sessions: i64,
        }

        #[derive(sqlx::FromRow)]
        struct TypeRow {
            event_type: String,
            count: i64,
        }

        #[derive(sqlx::FromRow)]
        struct QueryRow {
            query: String,
            count: i64,
        }

        let mut totals_qb = QueryBuilder::new(
            "SELECT COUNT(*) AS total_events, \
                    COUNT(DISTINCT session_id) AS unique_sessions \
             FROM analytics_events WHERE 1=1 ",
        );
        apply_range(&mut totals_qb, &range);
        let totals = totals_qb
            .build_query_as::<TotalsRow>()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut types_qb = QueryBuilder::new(
            "SELECT event_type, COUNT(*) AS count FROM analytics_events WHERE 1=1 ",
        );
        apply_range(&mut types_qb, &range);
        types_qb.push(" GROUP BY event_type ORDER BY count DESC");
        let types = types_qb
            .build_query_as::<TypeRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut queries_qb = QueryBuilder::new(
            "SELECT search_query AS query, COUNT(*) AS count FROM analytics_events \
             WHERE search_query IS NOT NULL AND search_query <> '' ",
        );
        apply_range(&mut queries_qb, &range);
        queries_qb.push(" GROUP BY search_query ORDER BY count DESC LIMIT ");
        queries_qb.push_bind(TOP_SEARCH_QUERIES);
        let queries = queries_qb
            .build_query_as::<QueryRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut events_by_type = Vec::with_capacity(types.len());
        for row in types {
            events_by_type.push(EventTypeCount {
                event_type: row.event_type,
                count: Self::convert_count(row.count)?,
            });
        }

        let mut top_search_queries = Vec::with_capacity(queries.len());
        for row in queries {
            top_search_queries.push(SearchQueryCount {
                query: row.query,
                count: Self::convert_count(row.count)?,
            });
        }

        Ok(AnalyticsStats {
            total_events: Self::convert_count(totals.total_events)?,
            unique_sessions: Self::convert_count(totals.unique_sessions)?,
            events_by_type,
            top_search_queries,
        })
    }

    async fn top_exhibitors(&self, limit: u32) -> Result<Vec<TopExhibitor>, RepoError> {
        #[derive(sqlx::FromRow)]
        struct TopRow {
            exhibitor_id: Uuid,
            name: String,
            slug: String,
            views: i64,
        }

        let rows = sqlx::query_as::<_, TopRow>(
            "SELECT e.id AS exhibitor_id, e.name, e.slug, COUNT(a.id) AS views \
             FROM analytics_events a \
             INNER JOIN exhibitors e ON e.id = a.exhibitor_id \
             WHERE a.event_type = 'view' \
             GROUP BY e.id, e.name, e.slug \
             ORDER BY views DESC, e.name ASC \
             LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(TopExhibitor {
                exhibitor_id: row.exhibitor_id,
                name: row.name,
                slug: row.slug,
                views: Self::convert_count(row.views)?,
            });
        }
        Ok(out)
    }
}
