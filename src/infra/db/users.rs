use async_trait::async_trait;
use sqlx::QueryBuilder;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CreateUserParams, RepoError, UserQueryFilter, UserStats, UsersRepo},
    domain::entities::{UserAuthRecord, UserRecord},
    domain::types::{ApprovalFilter, Role},
};

use super::{PostgresRepositories, map_sqlx_error};

const USER_COLUMNS: &str = "id, email, role, is_approved, approved_at, created_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    role: String,
    is_approved: bool,
    approved_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
}

impl UserRow {
    fn into_record(self) -> Result<UserRecord, RepoError> {
        Ok(UserRecord {
            id: self.id,
            email: self.email,
            role: parse_role(&self.role)?,
            is_approved: self.is_approved,
            approved_at: self.approved_at,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserAuthRow {
    id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    is_approved: bool,
}

fn parse_role(value: &str) -> Result<Role, RepoError> {
    value.parse::<Role>().map_err(RepoError::from_persistence)
}

fn collect_records(rows: Vec<UserRow>) -> Result<Vec<UserRecord>, RepoError> {
    rows.into_iter().map(UserRow::into_record).collect()
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn list(&self, filter: &UserQueryFilter) -> Result<Vec<UserRecord>, RepoError> {
        let mut qb = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE 1=1 "));

        match filter.status {
            ApprovalFilter::Pending => {
                qb.push(" AND is_approved = FALSE ");
            }
            ApprovalFilter::Approved => {
                qb.push(" AND is_approved = TRUE ");
            }
            ApprovalFilter::All => {}
        }

        if let Some(search) = filter.search.as_ref() {
            qb.push(" AND email ILIKE ");
            qb.push_bind(format!("%{}%", search));
        }

        qb.push(" ORDER BY is_approved ASC, created_at DESC");

        let rows = qb
            .build_query_as::<UserRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        collect_records(rows)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(UserRow::into_record).transpose()
    }

    async fn find_auth_by_email(&self, email: &str) -> Result<Option<UserAuthRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserAuthRow>(
            "SELECT id, email, password_hash, role, is_approved \
             FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        match row {
            Some(row) => Ok(Some(UserAuthRecord {
                id: row.id,
                email: row.email,
                password_hash: row.password_hash,
                role: parse_role(&row.role)?,
                is_approved: row.is_approved,
            })),
            None => Ok(None),
        }
    }

    async fn create(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (id, email, password_hash, role, is_approved, approved_at, \
                                created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, CASE WHEN $5 THEN now() END, now(), now()) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&params.email)
        .bind(&params.password_hash)
        .bind(params.role.as_str())
        .bind(params.is_approved)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.into_record()
    }

    async fn approve(&self, id: Uuid) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET is_approved = TRUE, approved_at = now(), updated_at = now() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .ok_or(RepoError::NotFound)?;

        row.into_record()
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<UserRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let current: String =
            sqlx::query_scalar("SELECT role FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?
                .ok_or(RepoError::NotFound)?;

        // Demoting the only remaining admin would lock everyone out.
        if parse_role(&current)? == Role::Admin && role != Role::Admin {
            let other_admins: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM users WHERE role = 'admin' AND id <> $1",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
            if other_admins == 0 {
                return Err(RepoError::integrity("cannot demote the last admin"));
            }
        }

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE users SET role = $2, updated_at = now() \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(role.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        row.into_record()
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let current: String =
            sqlx::query_scalar("SELECT role FROM users WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?
                .ok_or(RepoError::NotFound)?;

        if parse_role(&current)? == Role::Admin {
            let other_admins: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM users WHERE role = 'admin' AND id <> $1",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
            if other_admins == 0 {
                return Err(RepoError::integrity("cannot remove the last admin"));
            }
        }

        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn stats(&self) -> Result<UserStats, RepoError> {
        #[derive(sqlx::FromRow)]
        struct CountsRow {
            total: i64,
            admins: i64,
            editors: i64,
            approved: i64,
        }

        let counts = sqlx::query_as::<_, CountsRow>(
            "SELECT COUNT(*) AS total, \
                    COUNT(*) FILTER (WHERE role = 'admin') AS admins, \
                    COUNT(*) FILTER (WHERE role = 'editor') AS editors, \
                    COUNT(*) FILTER (WHERE is_approved) AS approved \
             FROM users",
        )
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let recent = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT 5"
        ))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        let total = Self::convert_count(counts.total)?;
        let approved = Self::convert_count(counts.approved)?;

        Ok(UserStats {
            total,
            admins: Self::convert_count(counts.admins)?,
            editors: Self::convert_count(counts.editors)?,
            approved,
            pending: total - approved,
            recent: collect_records(recent)?,
        })
    }
}
