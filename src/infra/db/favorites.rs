use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{FavoriteWithExhibitor, FavoritesRepo, RepoError},
    domain::entities::{ExhibitorRecord, FavoriteRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct FavoriteRow {
    id: Uuid,
    session_id: String,
    exhibitor_id: Uuid,
    created_at: OffsetDateTime,
}

#[derive(sqlx::FromRow)]
struct FavoriteJoinRow {
    id: Uuid,
    session_id: String,
    created_at: OffsetDateTime,
    exhibitor_id: Uuid,
    exhibitor_name: String,
    exhibitor_slug: String,
    exhibitor_logo_url: Option<String>,
    exhibitor_description: Option<String>,
    exhibitor_website_url: Option<String>,
    exhibitor_linkedin_url: Option<String>,
    exhibitor_pdf_url: Option<String>,
    exhibitor_sector_id: Uuid,
    exhibitor_booth_id: Option<Uuid>,
    exhibitor_created_at: OffsetDateTime,
    exhibitor_updated_at: OffsetDateTime,
}

impl From<FavoriteJoinRow> for FavoriteWithExhibitor {
    fn from(row: FavoriteJoinRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            created_at: row.created_at,
            exhibitor: ExhibitorRecord {
                id: row.exhibitor_id,
                name: row.exhibitor_name,
                slug: row.exhibitor_slug,
                logo_url: row.exhibitor_logo_url,
                description: row.exhibitor_description,
                website_url: row.exhibitor_website_url,
                linkedin_url: row.exhibitor_linkedin_url,
                pdf_url: row.exhibitor_pdf_url,
                sector_id: row.exhibitor_sector_id,
                booth_id: row.exhibitor_booth_id,
                created_at: row.exhibitor_created_at,
                updated_at: row.exhibitor_updated_at,
            },
        }
    }
}

#[async_trait]
impl FavoritesRepo for PostgresRepositories {
    async fn list_by_session(
        &self,
        session_id: &str,
    ) -> Result<Vec<FavoriteWithExhibitor>, RepoError> {
        let rows = sqlx::query_as::<_, FavoriteJoinRow>(
            "SELECT f.id, f.session_id, f.created_at, \
                    e.id AS exhibitor_id, e.name AS exhibitor_name, e.slug AS exhibitor_slug, \
                    e.logo_url AS exhibitor_logo_url, e.description AS exhibitor_description, \
                    e.website_url AS exhibitor_website_url, \
                    e.linkedin_url AS exhibitor_linkedin_url, e.pdf_url AS exhibitor_pdf_url, \
                    e.sector_id AS exhibitor_sector_id, e.booth_id AS exhibitor_booth_id, \
                    e.created_at AS exhibitor_created_at, e.updated_at AS exhibitor_updated_at \
             FROM favorites f \
             INNER JOIN exhibitors e ON e.id = f.exhibitor_id \
             WHERE f.session_id = $1 \
             ORDER BY f.created_at DESC",
        )
        .bind(session_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(FavoriteWithExhibitor::from).collect())
    }

    async fn add(
        &self,
        session_id: &str,
        exhibitor_id: Uuid,
    ) -> Result<FavoriteRecord, RepoError> {
        let known: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM exhibitors WHERE id = $1)")
            .bind(exhibitor_id)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;
        if !known {
            return Err(RepoError::NotFound);
        }

        let row = sqlx::query_as::<_, FavoriteRow>(
            "INSERT INTO favorites (id, session_id, exhibitor_id, created_at) \
             VALUES ($1, $2, $3, now()) \
             RETURNING id, session_id, exhibitor_id, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(exhibitor_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(FavoriteRecord {
            id: row.id,
            session_id: row.session_id,
            exhibitor_id: row.exhibitor_id,
            created_at: row.created_at,
        })
    }

    async fn remove(&self, session_id: &str, exhibitor_id: Uuid) -> Result<(), RepoError> {
        let result =
            sqlx::query("DELETE FROM favorites WHERE session_id = $1 AND exhibitor_id = $2")
                .bind(session_id)
                .bind(exhibitor_id)
                .execute(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn clear_session(&self, session_id: &str) -> Result<u64, RepoError> {
        let result = sqlx::query("DELETE FROM favorites WHERE session_id = $1")
            .bind(session_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected())
    }
}
