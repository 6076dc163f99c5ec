use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{
        RepoError, SectorDetail, SectorParams, SectorStats, SectorWithCount, SectorsRepo,
    },
    domain::entities::{ExhibitorRecord, SectorRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

const SECTOR_COLUMNS: &str = "id, name, color_hex, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct SectorRow {
    id: Uuid,
    name: String,
    color_hex: String,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<SectorRow> for SectorRecord {
    fn from(row: SectorRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            color_hex: row.color_hex,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SectorCountRow {
    #[sqlx(flatten)]
    sector: SectorRow,
    exhibitor_count: i64,
}

#[derive(sqlx::FromRow)]
struct ExhibitorRow {
    id: Uuid,
    name: String,
    slug: String,
    logo_url: Option<String>,
    description: Option<String>,
    website_url: Option<String>,
    linkedin_url: Option<String>,
    pdf_url: Option<String>,
    sector_id: Uuid,
    booth_id: Option<Uuid>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ExhibitorRow> for ExhibitorRecord {
    fn from(row: ExhibitorRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            logo_url: row.logo_url,
            description: row.description,
            website_url: row.website_url,
            linkedin_url: row.linkedin_url,
            pdf_url: row.pdf_url,
            sector_id: row.sector_id,
            booth_id: row.booth_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SectorStatsRow {
    total_exhibitors: i64,
    with_booth: i64,
    total_contacts: i64,
}

#[async_trait]
impl SectorsRepo for PostgresRepositories {
    async fn list_with_counts(&self) -> Result<Vec<SectorWithCount>, RepoError> {
        let rows = sqlx::query_as::<_, SectorCountRow>(
            "SELECT s.id, s.name, s.color_hex, s.created_at, s.updated_at, \
                    COUNT(e.id) AS exhibitor_count \
             FROM sectors s \
             LEFT JOIN exhibitors e ON e.sector_id = s.id \
             GROUP BY s.id, s.name, s.color_hex, s.created_at, s.updated_at \
             ORDER BY s.name ASC",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(SectorWithCount {
                sector: SectorRecord::from(row.sector),
                exhibitor_count: Self::convert_count(row.exhibitor_count)?,
            });
        }
        Ok(out)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<SectorDetail>, RepoError> {
        let row = sqlx::query_as::<_, SectorRow>(&format!(
            "SELECT {SECTOR_COLUMNS} FROM sectors WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let exhibitors = sqlx::query_as::<_, ExhibitorRow>(
            "SELECT id, name, slug, logo_url, description, website_url, linkedin_url, \
                    pdf_url, sector_id, booth_id, created_at, updated_at \
             FROM exhibitors WHERE sector_id = $1 ORDER BY name ASC",
        )
        .bind(id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(Some(SectorDetail {
            sector: SectorRecord::from(row),
            exhibitors: exhibitors.into_iter().map(ExhibitorRecord::from).collect(),
        }))
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<SectorRecord>, RepoError> {
        let row = sqlx::query_as::<_, SectorRow>(&format!(
            "SELECT {SECTOR_COLUMNS} FROM sectors WHERE LOWER(name) = LOWER($1)"
        ))
        .bind(name)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(SectorRecord::from))
    }

    async fn exists(&self, id: Uuid) -> Result<bool, RepoError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM sectors WHERE id = $1)")
            .bind(id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn stats(&self, id: Uuid) -> Result<Option<SectorStats>, RepoError> {
        if !self.exists(id).await? {
            return Ok(None);
        }

        let row = sqlx::query_as::<_, SectorStatsRow>(
            "SELECT COUNT(DISTINCT e.id) AS total_exhibitors, \
                    COUNT(DISTINCT e.id) FILTER (WHERE e.booth_id IS NOT NULL) AS with_booth, \
                    COUNT(c.id) AS total_contacts \
             FROM exhibitors e \
             LEFT JOIN contacts c ON c.exhibitor_id = e.id \
             WHERE e.sector_id = $1",
        )
        .bind(id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let total = Self::convert_count(row.total_exhibitors)?;
        let with_booth = Self::convert_count(row.with_booth)?;
        let contacts = Self::convert_count(row.total_contacts)?;

        Ok(Some(SectorStats {
            total_exhibitors: total,
            with_booth,
            without_booth: total - with_booth,
            total_contacts: contacts,
            avg_contacts_per_exhibitor: if total == 0 {
                0.0
            } else {
                contacts as f64 / total as f64
            },
        }))
    }

    async fn count_exhibitors(&self, id: Uuid) -> Result<u64, RepoError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM exhibitors WHERE sector_id = $1")
            .bind(id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Self::convert_count(count)
    }

    async fn create(&self, params: SectorParams) -> Result<SectorRecord, RepoError> {
        let row = sqlx::query_as::<_, SectorRow>(&format!(
            "INSERT INTO sectors (id, name, color_hex, created_at, updated_at) \
             VALUES ($1, $2, $3, now(), now()) RETURNING {SECTOR_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&params.name)
        .bind(&params.color_hex)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(SectorRecord::from(row))
    }

    async fn update(&self, id: Uuid, params: SectorParams) -> Result<SectorRecord, RepoError> {
        let row = sqlx::query_as::<_, SectorRow>(&format!(
            "UPDATE sectors SET name = $2, color_hex = $3, updated_at = now() \
             WHERE id = $1 RETURNING {SECTOR_COLUMNS}"
        ))
        .bind(id)
        .bind(&params.name)
        .bind(&params.color_hex)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        Ok(SectorRecord::from(row))
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM sectors WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }
}
