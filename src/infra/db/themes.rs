use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{
        CreateThemeParams, RepoError, ThemeDetail, ThemeWithCount, ThemesRepo, UpdateThemeParams,
    },
    domain::entities::{ExhibitorRecord, ThemeRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

const THEME_COLUMNS: &str = "id, name, slug, description, position, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct ThemeRow {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    position: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<ThemeRow> for ThemeRecord {
    fn from(row: ThemeRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            position: row.position,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ThemeCountRow {
    #[sqlx(flatten)]
    theme: ThemeRow,
    exhibitor_count: i64,
}

#[derive(sqlx::FromRow)]
struct ThemeExhibitorRow {
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

impl From<ThemeExhibitorRow> for ExhibitorRecord {
    fn from(row: ThemeExhibitorRow) -> Self {
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

impl PostgresRepositories {
    async fn theme_exhibitors(&self, theme_id: Uuid) -> Result<Vec<ExhibitorRecord>, RepoError> {
        let rows = sqlx::query_as::<_, ThemeExhibitorRow>(
            "SELECT e.id, e.name, e.slug, e.logo_url, e.description, e.website_url, \
                    e.linkedin_url, e.pdf_url, e.sector_id, e.booth_id, \
                    e.created_at, e.updated_at \
             FROM theme_exhibitors te \
             INNER JOIN exhibitors e ON e.id = te.exhibitor_id \
             WHERE te.theme_id = $1 ORDER BY e.name ASC",
        )
        .bind(theme_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(ExhibitorRecord::from).collect())
    }

    async fn theme_detail(&self, row: ThemeRow) -> Result<ThemeDetail, RepoError> {
        let exhibitors = self.theme_exhibitors(row.id).await?;
        Ok(ThemeDetail {
            theme: ThemeRecord::from(row),
            exhibitors,
        })
    }
}

#[async_trait]
impl ThemesRepo for PostgresRepositories {
    async fn list_with_counts(&self) -> Result<Vec<ThemeWithCount>, RepoError> {
        let rows = sqlx::query_as::<_, ThemeCountRow>(
            "SELECT t.id, t.name, t.slug, t.description, t.position, \
                    t.created_at, t.updated_at, \
                    COUNT(te.exhibitor_id) AS exhibitor_count \
             FROM themes t \
             LEFT JOIN theme_exhibitors te ON te.theme_id = t.id \
             GROUP BY t.id, t.name, t.slug, t.description, t.position, \
                      t.created_at, t.updated_at \
             ORDER BY t.position ASC, t.name ASC",
        )
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(ThemeWithCount {
                theme: ThemeRecord::from(row.theme),
                exhibitor_count: Self::convert_count(row.exhibitor_count)?,
            });
        }
        Ok(out)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ThemeDetail>, RepoError> {
        let row = sqlx::query_as::<_, ThemeRow>(&format!(
            "SELECT {THEME_COLUMNS} FROM themes WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(Some(self.theme_detail(row).await?)),
            None => Ok(None),
        }
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<ThemeDetail>, RepoError> {
        let row = sqlx::query_as::<_, ThemeRow>(&format!(
            "SELECT {THEME_COLUMNS} FROM themes WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(Some(self.theme_detail(row).await?)),
            None => Ok(None),
        }
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM themes WHERE slug = $1)")
            .bind(slug)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn create(&self, params: CreateThemeParams) -> Result<ThemeRecord, RepoError> {
        let row = sqlx::query_as::<_, ThemeRow>(&format!(
            "INSERT INTO themes (id, name, slug, description, position, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, now(), now()) RETURNING {THEME_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&params.name)
        .bind(&params.slug)
        .bind(&params.description)
        .bind(params.position)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ThemeRecord::from(row))
    }

    async fn update(
        &self,
        id: Uuid,
        params: UpdateThemeParams,
    ) -> Result<ThemeRecord, RepoError> {
        let mut qb = QueryBuilder::new("UPDATE themes SET updated_at = now()");
        if let Some(name) = params.name {
            qb.push(", name = ");
            qb.push_bind(name);
        }
        if let Some(slug) = params.slug {
            qb.push(", slug = ");
            qb.push_bind(slug);
        }
        if let Some(description) = params.description {
            qb.push(", description = ");
            qb.push_bind(description);
        }
        if let Some(position) = params.position {
            qb.push(", position = ");
            qb.push_bind(position);
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);
        qb.push(format!(" RETURNING {THEME_COLUMNS}"));

        let row = qb
            .build_query_as::<ThemeRow>()
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?
            .ok_or(RepoError::NotFound)?;

        Ok(ThemeRecord::from(row))
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM themes WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn set_exhibitors(
        &self,
        theme_id: Uuid,
        exhibitor_ids: Vec<Uuid>,
    ) -> Result<ThemeDetail, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let theme: Option<Uuid> = sqlx::query_scalar("SELECT id FROM themes WHERE id = $1 FOR UPDATE")
            .bind(theme_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        if theme.is_none() {
            return Err(RepoError::NotFound);
        }

        if !exhibitor_ids.is_empty() {
            let known: i64 =
                sqlx::query_scalar("SELECT COUNT(*) FROM exhibitors WHERE id = ANY($1)")
                    .bind(&exhibitor_ids)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(map_sqlx_error)?;
            if known as usize != exhibitor_ids.len() {
                return Err(RepoError::InvalidInput {
                    message: "one or more exhibitor ids do not exist".to_string(),
                });
            }
        }

        sqlx::query("DELETE FROM theme_exhibitors WHERE theme_id = $1")
            .bind(theme_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if !exhibitor_ids.is_empty() {
            let mut qb =
                QueryBuilder::new("INSERT INTO theme_exhibitors (theme_id, exhibitor_id) ");
            qb.push_values(&exhibitor_ids, |mut row, exhibitor_id| {
                row.push_bind(theme_id).push_bind(exhibitor_id);
            });
            qb.build()
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        self.find_by_id(theme_id).await?.ok_or(RepoError::NotFound)
    }

    async fn attach_exhibitor(
        &self,
        theme_id: Uuid,
        exhibitor_id: Uuid,
    ) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO theme_exhibitors (theme_id, exhibitor_id) \
             VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(theme_id)
        .bind(exhibitor_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }
}
