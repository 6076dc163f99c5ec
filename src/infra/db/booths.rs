use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{PageRequest, Paginated},
    application::repos::{
        AreaBounds, BoothQueryFilter, BoothStats, BoothWithExhibitor, BoothsRepo, CanvasBounds,
        CreateBoothParams, NearbyBooth, NearbyQuery, RepoError, UpdateBoothParams,
    },
    domain::entities::{BoothRecord, ExhibitorRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

/// Padding applied around the extreme booth coordinates so the floor-plan
/// canvas has breathing room.
const CANVAS_MARGIN: f64 = 50.0;

const BOOTH_JOIN_SELECT: &str = "SELECT b.id, b.number, b.polygon_id, b.x, b.y, b.width, \
     b.height, b.rotation, b.polygon_points, b.created_at, b.updated_at, \
     e.id AS exhibitor_id, e.name AS exhibitor_name, e.slug AS exhibitor_slug, \
     e.logo_url AS exhibitor_logo_url, e.description AS exhibitor_description, \
     e.website_url AS exhibitor_website_url, e.linkedin_url AS exhibitor_linkedin_url, \
     e.pdf_url AS exhibitor_pdf_url, e.sector_id AS exhibitor_sector_id, \
     e.created_at AS exhibitor_created_at, e.updated_at AS exhibitor_updated_at \
     FROM booths b LEFT JOIN exhibitors e ON e.booth_id = b.id ";

#[derive(sqlx::FromRow)]
struct BoothRow {
    id: Uuid,
    number: String,
    polygon_id: String,
    x: f64,
    y: f64,
    width: Option<f64>,
    height: Option<f64>,
    rotation: f64,
    polygon_points: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<BoothRow> for BoothRecord {
    fn from(row: BoothRow) -> Self {
        Self {
            id: row.id,
            number: row.number,
            polygon_id: row.polygon_id,
            x: row.x,
            y: row.y,
            width: row.width,
            height: row.height,
            rotation: row.rotation,
            polygon_points: row.polygon_points,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct BoothJoinRow {
    id: Uuid,
    number: String,
    polygon_id: String,
    x: f64,
    y: f64,
    width: Option<f64>,
    height: Option<f64>,
    rotation: f64,
    polygon_points: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    exhibitor_id: Option<Uuid>,
    exhibitor_name: Option<String>,
    exhibitor_slug: Option<String>,
    exhibitor_logo_url: Option<String>,
    exhibitor_description: Option<String>,
    exhibitor_website_url: Option<String>,
    exhibitor_linkedin_url: Option<String>,
    exhibitor_pdf_url: Option<String>,
    exhibitor_sector_id: Option<Uuid>,
    exhibitor_created_at: Option<OffsetDateTime>,
    exhibitor_updated_at: Option<OffsetDateTime>,
}

impl From<BoothJoinRow> for BoothWithExhibitor {
    fn from(row: BoothJoinRow) -> Self {
        let exhibitor = match (
            row.exhibitor_id,
            row.exhibitor_name,
            row.exhibitor_slug,
            row.exhibitor_sector_id,
            row.exhibitor_created_at,
            row.exhibitor_updated_at,
        ) {
            (Some(id), Some(name), Some(slug), Some(sector_id), Some(created), Some(updated)) => {
                Some(ExhibitorRecord {
                    id,
                    name,
                    slug,
                    logo_url: row.exhibitor_logo_url,
                    description: row.exhibitor_description,
                    website_url: row.exhibitor_website_url,
                    linkedin_url: row.exhibitor_linkedin_url,
                    pdf_url: row.exhibitor_pdf_url,
                    sector_id,
                    booth_id: Some(row.id),
                    created_at: created,
                    updated_at: updated,
                })
            }
            _ => None,
        };

        Self {
            booth: BoothRecord {
                id: row.id,
                number: row.number,
                polygon_id: row.polygon_id,
                x: row.x,
                y: row.y,
                width: row.width,
                height: row.height,
                rotation: row.rotation,
                polygon_points: row.polygon_points,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            exhibitor,
        }
    }
}

#[derive(sqlx::FromRow)]
struct NearbyRow {
    #[sqlx(flatten)]
    booth: BoothJoinRow,
    distance: f64,
}

#[derive(sqlx::FromRow)]
struct BoothStatsRow {
    total: i64,
    occupied: i64,
    min_x: Option<f64>,
    max_x: Option<f64>,
    min_y: Option<f64>,
    max_y: Option<f64>,
}

fn apply_number_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q BoothQueryFilter) {
    if let Some(number) = filter.number.as_ref() {
        qb.push(" AND b.number ILIKE ");
        qb.push_bind(format!("%{}%", number));
    }
}

#[async_trait]
impl BoothsRepo for PostgresRepositories {
    async fn list(
        &self,
        filter: &BoothQueryFilter,
        page: PageRequest,
    ) -> Result<Paginated<BoothWithExhibitor>, RepoError> {
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM booths b WHERE 1=1 ");
        apply_number_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::new(BOOTH_JOIN_SELECT);
        qb.push(" WHERE 1=1 ");
        apply_number_filter(&mut qb, filter);
        qb.push(" ORDER BY b.number ASC LIMIT ");
        qb.push_bind(i64::from(page.limit()));
        qb.push(" OFFSET ");
        qb.push_bind(i64::from(page.offset()));

        let rows = qb
            .build_query_as::<BoothJoinRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(Paginated::new(
            rows.into_iter().map(BoothWithExhibitor::from).collect(),
            Self::convert_count(total)?,
            &page,
        ))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<BoothWithExhibitor>, RepoError> {
        let row = sqlx::query_as::<_, BoothJoinRow>(&format!("{BOOTH_JOIN_SELECT} WHERE b.id = $1"))
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(BoothWithExhibitor::from))
    }

    async fn find_by_number(&self, number: &str) -> Result<Option<BoothWithExhibitor>, RepoError> {
        let row =
            sqlx::query_as::<_, BoothJoinRow>(&format!("{BOOTH_JOIN_SELECT} WHERE b.number = $1"))
                .bind(number)
                .fetch_optional(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Ok(row.map(BoothWithExhibitor::from))
    }

    async fn find_by_polygon_id(
        &self,
        polygon_id: &str,
    ) -> Result<Option<BoothWithExhibitor>, RepoError> {
        let row = sqlx::query_as::<_, BoothJoinRow>(&format!(
            "{BOOTH_JOIN_SELECT} WHERE b.polygon_id = $1"
        ))
        .bind(polygon_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(BoothWithExhibitor::from))
    }

    async fn in_area(&self, bounds: AreaBounds) -> Result<Vec<BoothWithExhibitor>, RepoError> {
        let rows = sqlx::query_as::<_, BoothJoinRow>(&format!(
            "{BOOTH_JOIN_SELECT} WHERE b.x BETWEEN $1 AND $2 AND b.y BETWEEN $3 AND $4 \
             ORDER BY b.y ASC, b.x ASC"
        ))
        .bind(bounds.min_x)
        .bind(bounds.max_x)
        .bind(bounds.min_y)
        .bind(bounds.max_y)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(BoothWithExhibitor::from).collect())
    }

    async fn nearby(&self, query: NearbyQuery) -> Result<Vec<NearbyBooth>, RepoError> {
        // Euclidean distance computed in SQL; ties break on booth number so
        // the ordering stays deterministic.
        let sql = BOOTH_JOIN_SELECT.replacen(
            "FROM booths b",
            ", sqrt(power(b.x - $1, 2) + power(b.y - $2, 2)) AS distance FROM booths b",
            1,
        );
        let rows = sqlx::query_as::<_, NearbyRow>(&format!(
            "{sql} WHERE sqrt(power(b.x - $1, 2) + power(b.y - $2, 2)) <= $3 \
             ORDER BY distance ASC, b.number ASC LIMIT $4"
        ))
        .bind(query.x)
        .bind(query.y)
        .bind(query.radius)
        .bind(i64::from(query.limit))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows
            .into_iter()
            .map(|row| NearbyBooth {
                booth: BoothWithExhibitor::from(row.booth),
                distance: row.distance,
            })
            .collect())
    }

    async fn stats(&self) -> Result<BoothStats, RepoError> {
        let row = sqlx::query_as::<_, BoothStatsRow>(
            "SELECT COUNT(*) AS total, COUNT(e.id) AS occupied, \
                    MIN(b.x) AS min_x, MAX(b.x + COALESCE(b.width, 0)) AS max_x, \
                    MIN(b.y) AS min_y, MAX(b.y + COALESCE(b.height, 0)) AS max_y \
             FROM booths b LEFT JOIN exhibitors e ON e.booth_id = b.id",
        )
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let total = Self::convert_count(row.total)?;
        let occupied = Self::convert_count(row.occupied)?;
        let occupancy_rate = if total == 0 {
            0.0
        } else {
            occupied as f64 / total as f64
        };

        let bounds = match (row.min_x, row.max_x, row.min_y, row.max_y) {
            (Some(min_x), Some(max_x), Some(min_y), Some(max_y)) => Some(CanvasBounds {
                min_x: min_x - CANVAS_MARGIN,
                min_y: min_y - CANVAS_MARGIN,
                max_x: max_x + CANVAS_MARGIN,
                max_y: max_y + CANVAS_MARGIN,
            }),
            _ => None,
        };

        Ok(BoothStats {
            total,
            occupied,
            available: total - occupied,
            occupancy_rate,
            bounds,
        })
    }

    async fn create(&self, params: CreateBoothParams) -> Result<BoothRecord, RepoError> {
        let row = sqlx::query_as::<_, BoothRow>(
            "INSERT INTO booths (id, number, polygon_id, x, y, width, height, rotation, \
                                 polygon_points, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, now(), now()) \
             RETURNING id, number, polygon_id, x, y, width, height, rotation, \
                       polygon_points, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(&params.number)
        .bind(&params.polygon_id)
        .bind(params.x)
        .bind(params.y)
        .bind(params.width)
        .bind(params.height)
        .bind(params.rotation)
        .bind(&params.polygon_points)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(BoothRecord::from(row))
    }

    async fn update(&self, id: Uuid, params: UpdateBoothParams) -> Result<BoothRecord, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE booths SET updated_at = now()");
        if let Some(number) = params.number {
            qb.push(", number = ");
            qb.push_bind(number);
        }
        if let Some(polygon_id) = params.polygon_id {
            qb.push(", polygon_id = ");
            qb.push_bind(polygon_id);
        }
        if let Some(x) = params.x {
            qb.push(", x = ");
            qb.push_bind(x);
        }
        if let Some(y) = params.y {
            qb.push(", y = ");
            qb.push_bind(y);
        }
        if let Some(width) = params.width {
            qb.push(", width = ");
            qb.push_bind(width);
        }
        if let Some(height) = params.height {
            qb.push(", height = ");
            qb.push_bind(height);
        }
        if let Some(rotation) = params.rotation {
            qb.push(", rotation = ");
            qb.push_bind(rotation);
        }
        if let Some(polygon_points) = params.polygon_points {
            qb.push(", polygon_points = ");
            qb.push_bind(polygon_points);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(
            " RETURNING id, number, polygon_id, x, y, width, height, rotation, \
              polygon_points, created_at, updated_at",
        );

        let row = qb
            .build_query_as::<BoothRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        Ok(BoothRecord::from(row))
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM booths WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn bulk_create(&self, batch: Vec<CreateBoothParams>) -> Result<u64, RepoError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut qb = QueryBuilder::new(
            "INSERT INTO booths (id, number, polygon_id, x, y, width, height, rotation, \
                                 polygon_points, created_at, updated_at) ",
        );
        qb.push_values(batch, |mut row, params| {
            row.push_bind(Uuid::new_v4())
                .push_bind(params.number)
                .push_bind(params.polygon_id)
                .push_bind(params.x)
                .push_bind(params.y)
                .push_bind(params.width)
                .push_bind(params.height)
                .push_bind(params.rotation)
                .push_bind(params.polygon_points)
                .push("now()")
                .push("now()");
        });
        qb.push(" ON CONFLICT DO NOTHING");

        let result = qb
            .build()
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
