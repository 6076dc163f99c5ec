use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::pagination::{PageRequest, Paginated},
    application::repos::{
        ContactParams, CreateExhibitorParams, ExhibitorDetail, ExhibitorSearchFilter,
        ExhibitorsRepo, RepoError, UpdateExhibitorParams,
    },
    domain::entities::{BoothRecord, ContactRecord, ExhibitorRecord, SectorRecord, ThemeRecord},
};

use super::{PostgresRepositories, map_sqlx_error};

const EXHIBITOR_JOIN_SELECT: &str = "SELECT e.id, e.name, e.slug, e.logo_url, e.description, \
     e.website_url, e.linkedin_url, e.pdf_url, e.sector_id, e.booth_id, \
     e.created_at, e.updated_at, \
     s.name AS sector_name, s.color_hex AS sector_color_hex, \
     s.created_at AS sector_created_at, s.updated_at AS sector_updated_at, \
     b.number AS booth_number, b.polygon_id AS booth_polygon_id, \
     b.x AS booth_x, b.y AS booth_y, b.width AS booth_width, b.height AS booth_height, \
     b.rotation AS booth_rotation, b.polygon_points AS booth_polygon_points, \
     b.created_at AS booth_created_at, b.updated_at AS booth_updated_at \
     FROM exhibitors e \
     INNER JOIN sectors s ON s.id = e.sector_id \
     LEFT JOIN booths b ON b.id = e.booth_id ";

#[derive(sqlx::FromRow)]
struct ExhibitorJoinRow {
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
    sector_name: String,
    sector_color_hex: String,
    sector_created_at: OffsetDateTime,
    sector_updated_at: OffsetDateTime,
    booth_number: Option<String>,
    booth_polygon_id: Option<String>,
    booth_x: Option<f64>,
    booth_y: Option<f64>,
    booth_width: Option<f64>,
    booth_height: Option<f64>,
    booth_rotation: Option<f64>,
    booth_polygon_points: Option<String>,
    booth_created_at: Option<OffsetDateTime>,
    booth_updated_at: Option<OffsetDateTime>,
}

impl ExhibitorJoinRow {
    fn into_detail(self, contacts: Vec<ContactRecord>, themes: Vec<ThemeRecord>) -> ExhibitorDetail {
        let booth = match (
            self.booth_id,
            self.booth_number,
            self.booth_polygon_id,
            self.booth_x,
            self.booth_y,
            self.booth_rotation,
            self.booth_created_at,
            self.booth_updated_at,
        ) {
            (
                Some(id),
                Some(number),
                Some(polygon_id),
                Some(x),
                Some(y),
                Some(rotation),
                Some(created_at),
                Some(updated_at),
            ) => Some(BoothRecord {
                id,
                number,
                polygon_id,
                x,
                y,
                width: self.booth_width,
                height: self.booth_height,
                rotation,
                polygon_points: self.booth_polygon_points,
                created_at,
                updated_at,
            }),
            _ => None,
        };

        ExhibitorDetail {
            exhibitor: ExhibitorRecord {
                id: self.id,
                name: self.name,
                slug: self.slug,
                logo_url: self.logo_url,
                description: self.description,
                website_url: self.website_url,
                linkedin_url: self.linkedin_url,
                pdf_url: self.pdf_url,
                sector_id: self.sector_id,
                booth_id: self.booth_id,
                created_at: self.created_at,
                updated_at: self.updated_at,
            },
            sector: SectorRecord {
                id: self.sector_id,
                name: self.sector_name,
                color_hex: self.sector_color_hex,
                created_at: self.sector_created_at,
                updated_at: self.sector_updated_at,
            },
            booth,
            contacts,
            themes,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ContactRow {
    id: Uuid,
    exhibitor_id: Uuid,
    first_name: String,
    last_name: String,
    role: String,
    email: String,
    phone: Option<String>,
}

impl From<ContactRow> for ContactRecord {
    fn from(row: ContactRow) -> Self {
        Self {
            id: row.id,
            exhibitor_id: row.exhibitor_id,
            first_name: row.first_name,
            last_name: row.last_name,
            role: row.role,
            email: row.email,
            phone: row.phone,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ExhibitorThemeRow {
    exhibitor_id: Uuid,
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    position: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

fn apply_search_filter<'q>(qb: &mut QueryBuilder<'q, Postgres>, filter: &'q ExhibitorSearchFilter) {
    if let Some(q) = filter.q.as_ref() {
        let pattern = format!("%{}%", q);
        qb.push(" AND (e.name ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR e.slug ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR COALESCE(e.description, '') ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" OR COALESCE(b.number, '') ILIKE ");
        qb.push_bind(pattern.clone());
        qb.push(
            " OR EXISTS (SELECT 1 FROM contacts c WHERE c.exhibitor_id = e.id \
             AND (c.first_name ILIKE ",
        );
        qb.push_bind(pattern.clone());
        qb.push(" OR c.last_name ILIKE ");
        qb.push_bind(pattern);
        qb.push(")))");
    }

    if let Some(sector_id) = filter.sector_id {
        qb.push(" AND e.sector_id = ");
        qb.push_bind(sector_id);
    }

    if let Some(booth_number) = filter.booth_number.as_ref() {
        qb.push(" AND UPPER(COALESCE(b.number, '')) = UPPER(");
        qb.push_bind(booth_number);
        qb.push(")");
    }
}

async fn insert_contacts(
    tx: &mut Transaction<'_, Postgres>,
    exhibitor_id: Uuid,
    contacts: &[ContactParams],
) -> Result<(), RepoError> {
    if contacts.is_empty() {
        return Ok(());
    }

    let mut qb = QueryBuilder::new(
        "INSERT INTO contacts (id, exhibitor_id, first_name, last_name, role, email, phone) ",
    );
    qb.push_values(contacts, |mut row, contact| {
        row.push_bind(Uuid::new_v4())
            .push_bind(exhibitor_id)
            .push_bind(&contact.first_name)
            .push_bind(&contact.last_name)
            .push_bind(&contact.role)
            .push_bind(&contact.email)
            .push_bind(&contact.phone);
    });

    qb.build()
        .execute(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    Ok(())
}

/// Lock the booth row and fail with the booth unique-key constraint when a
/// different exhibitor already occupies it.
async fn lock_booth_for_assignment(
    tx: &mut Transaction<'_, Postgres>,
    booth_id: Uuid,
    exclude_exhibitor: Option<Uuid>,
) -> Result<(), RepoError> {
    let booth: Option<Uuid> = sqlx::query_scalar("SELECT id FROM booths WHERE id = $1 FOR UPDATE")
        .bind(booth_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(map_sqlx_error)?;
    if booth.is_none() {
        return Err(RepoError::NotFound);
    }

    let occupied: i64 = match exclude_exhibitor {
        Some(exclude) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM exhibitors WHERE booth_id = $1 AND id <> $2")
                .bind(booth_id)
                .bind(exclude)
                .fetch_one(&mut **tx)
                .await
        }
        None => sqlx::query_scalar("SELECT COUNT(*) FROM exhibitors WHERE booth_id = $1")
            .bind(booth_id)
            .fetch_one(&mut **tx)
            .await,
    }
    .map_err(map_sqlx_error)?;

    if occupied > 0 {
        return Err(RepoError::Duplicate {
            constraint: "exhibitors_booth_id_key".to_string(),
        });
    }
    Ok(())
}

impl PostgresRepositories {
    async fn contacts_for(
        &self,
        ids: &[Uuid],
    ) -> Result<HashMap<Uuid, Vec<ContactRecord>>, RepoError> {
        let rows = sqlx::query_as::<_, ContactRow>(
            "SELECT id, exhibitor_id, first_name, last_name, role, email, phone \
             FROM contacts WHERE exhibitor_id = ANY($1) \
             ORDER BY last_name ASC, first_name ASC",
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut grouped: HashMap<Uuid, Vec<ContactRecord>> = HashMap::new();
        for row in rows {
            grouped
                .entry(row.exhibitor_id)
                .or_default()
                .push(ContactRecord::from(row));
        }
        Ok(grouped)
    }

    async fn themes_for(&self, ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<ThemeRecord>>, RepoError> {
        let rows = sqlx::query_as::<_, ExhibitorThemeRow>(
            "SELECT te.exhibitor_id, t.id, t.name, t.slug, t.description, t.position, \
                    t.created_at, t.updated_at \
             FROM theme_exhibitors te \
             INNER JOIN themes t ON t.id = te.theme_id \
             WHERE te.exhibitor_id = ANY($1) \
             ORDER BY t.position ASC, t.name ASC",
        )
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let mut grouped: HashMap<Uuid, Vec<ThemeRecord>> = HashMap::new();
        for row in rows {
            grouped.entry(row.exhibitor_id).or_default().push(ThemeRecord {
                id: row.id,
                name: row.name,
                slug: row.slug,
                description: row.description,
                position: row.position,
                created_at: row.created_at,
                updated_at: row.updated_at,
            });
        }
        Ok(grouped)
    }

    async fn hydrate_exhibitors(
        &self,
        rows: Vec<ExhibitorJoinRow>,
    ) -> Result<Vec<ExhibitorDetail>, RepoError> {
        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let mut contacts = self.contacts_for(&ids).await?;
        let mut themes = self.themes_for(&ids).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let contacts = contacts.remove(&row.id).unwrap_or_default();
                let themes = themes.remove(&row.id).unwrap_or_default();
                row.into_detail(contacts, themes)
            })
            .collect())
    }

    async fn fetch_exhibitor_detail(
        &self,
        id: Uuid,
    ) -> Result<Option<ExhibitorDetail>, RepoError> {
        let row = sqlx::query_as::<_, ExhibitorJoinRow>(&format!(
            "{EXHIBITOR_JOIN_SELECT} WHERE e.id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(self.hydrate_exhibitors(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ExhibitorsRepo for PostgresRepositories {
    async fn search(
        &self,
        filter: &ExhibitorSearchFilter,
        page: PageRequest,
    ) -> Result<Paginated<ExhibitorDetail>, RepoError> {
        let mut count_qb = QueryBuilder::new(
            "SELECT COUNT(*) FROM exhibitors e \
             INNER JOIN sectors s ON s.id = e.sector_id \
             LEFT JOIN booths b ON b.id = e.booth_id WHERE 1=1 ",
        );
        apply_search_filter(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let mut qb = QueryBuilder::new(EXHIBITOR_JOIN_SELECT);
        qb.push(" WHERE 1=1 ");
        apply_search_filter(&mut qb, filter);
        qb.push(" ORDER BY e.name ASC LIMIT ");
        qb.push_bind(i64::from(page.limit()));
        qb.push(" OFFSET ");
        qb.push_bind(i64::from(page.offset()));

        let rows = qb
            .build_query_as::<ExhibitorJoinRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        let items = self.hydrate_exhibitors(rows).await?;
        Ok(Paginated::new(items, Self::convert_count(total)?, &page))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ExhibitorDetail>, RepoError> {
        self.fetch_exhibitor_detail(id).await
    }

    async fn find_by_slug(&self, slug: &str) -> Result<Option<ExhibitorDetail>, RepoError> {
        let row = sqlx::query_as::<_, ExhibitorJoinRow>(&format!(
            "{EXHIBITOR_JOIN_SELECT} WHERE e.slug = $1"
        ))
        .bind(slug)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(self.hydrate_exhibitors(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM exhibitors WHERE slug = $1)")
            .bind(slug)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    async fn create(&self, params: CreateExhibitorParams) -> Result<ExhibitorDetail, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        if let Some(booth_id) = params.booth_id {
            lock_booth_for_assignment(&mut tx, booth_id, None).await?;
        }

        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO exhibitors (id, name, slug, logo_url, description, website_url, \
                                     linkedin_url, pdf_url, sector_id, booth_id, \
                                     created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, now(), now())",
        )
        .bind(id)
        .bind(&params.name)
        .bind(&params.slug)
        .bind(&params.logo_url)
        .bind(&params.description)
        .bind(&params.website_url)
        .bind(&params.linkedin_url)
        .bind(&params.pdf_url)
        .bind(params.sector_id)
        .bind(params.booth_id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        insert_contacts(&mut tx, id, &params.contacts).await?;
        tx.commit().await.map_err(map_sqlx_error)?;

        self.fetch_exhibitor_detail(id)
            .await?
            .ok_or_else(|| RepoError::from_persistence("created exhibitor vanished"))
    }

    async fn update(
        &self,
        id: Uuid,
        params: UpdateExhibitorParams,
    ) -> Result<ExhibitorDetail, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let existing_booth: Option<Uuid> = sqlx::query_scalar(
            "SELECT booth_id FROM exhibitors WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        if let Some(Some(new_booth)) = params.booth_id {
            if existing_booth != Some(new_booth) {
                lock_booth_for_assignment(&mut tx, new_booth, Some(id)).await?;
            }
        }

        let mut qb = QueryBuilder::new("UPDATE exhibitors SET updated_at = now()");
        if let Some(name) = params.name {
            qb.push(", name = ");
            qb.push_bind(name);
        }
        if let Some(slug) = params.slug {
            qb.push(", slug = ");
            qb.push_bind(slug);
        }
        if let Some(logo_url) = params.logo_url {
            qb.push(", logo_url = ");
            qb.push_bind(logo_url);
        }
        if let Some(description) = params.description {
            qb.push(", description = ");
            qb.push_bind(description);
        }
        if let Some(website_url) = params.website_url {
            qb.push(", website_url = ");
            qb.push_bind(website_url);
        }
        if let Some(linkedin_url) = params.linkedin_url {
            qb.push(", linkedin_url = ");
            qb.push_bind(linkedin_url);
        }
        if let Some(pdf_url) = params.pdf_url {
            qb.push(", pdf_url = ");
            qb.push_bind(pdf_url);
        }
        if let Some(sector_id) = params.sector_id {
            qb.push(", sector_id = ");
            qb.push_bind(sector_id);
        }
        match params.booth_id {
            Some(Some(booth_id)) => {
                qb.push(", booth_id = ");
                qb.push_bind(booth_id);
            }
            Some(None) => {
                qb.push(", booth_id = NULL");
            }
            None => {}
        }
        qb.push(" WHERE id = ");
        qb.push_bind(id);

        qb.build()
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if let Some(contacts) = params.contacts.as_ref() {
            sqlx::query("DELETE FROM contacts WHERE exhibitor_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx_error)?;
            insert_contacts(&mut tx, id, contacts).await?;
        }

        tx.commit().await.map_err(map_sqlx_error)?;

        self.fetch_exhibitor_detail(id)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let result = sqlx::query("DELETE FROM exhibitors WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<ExhibitorDetail>, RepoError> {
        let rows = sqlx::query_as::<_, ExhibitorJoinRow>(&format!(
            "{EXHIBITOR_JOIN_SELECT} ORDER BY e.name ASC"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        self.hydrate_exhibitors(rows).await
    }
}
