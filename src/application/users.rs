//! Back-office account administration.
//!
//! Role and deletion changes are guarded in the repository so the system
//! can never lose its last admin; this service translates that guard into
//! a domain error and keeps the auth cache coherent by dropping the
//! affected `user:<id>` entry.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::cache::TtlCache;
use crate::application::repos::{RepoError, UserQueryFilter, UserStats, UsersRepo};
use crate::domain::entities::UserRecord;
use crate::domain::types::Role;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("user not found")]
    NotFound,
    #[error("user is already approved")]
    AlreadyApproved,
    #[error("administrators cannot be rejected")]
    CannotRejectAdmin,
    #[error("cannot remove the last administrator")]
    LastAdmin,
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for UserError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => UserError::NotFound,
            RepoError::Integrity { .. } => UserError::LastAdmin,
            other => UserError::Repo(other),
        }
    }
}

#[derive(Clone)]
pub struct UserAdminService {
    repo: Arc<dyn UsersRepo>,
    cache: Arc<TtlCache>,
}

impl UserAdminService {
    pub fn new(repo: Arc<dyn UsersRepo>, cache: Arc<TtlCache>) -> Self {
        Self { repo, cache }
    }

    pub async fn list(&self, filter: UserQueryFilter) -> Result<Vec<UserRecord>, UserError> {
        self.repo.list(&filter).await.map_err(UserError::from)
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<UserRecord, UserError> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(UserError::NotFound)
    }

    pub async fn approve(&self, id: Uuid) -> Result<UserRecord, UserError> {
        let user = self.find_by_id(id).await?;
        if user.is_approved {
            return Err(UserError::AlreadyApproved);
        }
        let user = self.repo.approve(id).await?;
        self.cache.delete(&format!("user:{id}"));
        Ok(user)
    }

    /// Reject deletes the pending account. Admin accounts are never
    /// rejectable; demote them first.
    pub async fn reject(&self, id: Uuid) -> Result<(), UserError> {
        let user = self.find_by_id(id).await?;
        if user.role == Role::Admin {
            return Err(UserError::CannotRejectAdmin);
        }
        self.repo.delete(id).await?;
        self.cache.delete(&format!("user:{id}"));
        Ok(())
    }

    pub async fn set_role(&self, id: Uuid, role: Role) -> Result<UserRecord, UserError> {
        let user = self.repo.set_role(id, role).await?;
        self.cache.delete(&format!("user:{id}"));
        Ok(user)
    }

    pub async fn remove(&self, id: Uuid) -> Result<(), UserError> {
        self.repo.delete(id).await?;
        self.cache.delete(&format!("user:{id}"));
        Ok(())
    }

    pub async fn stats(&self) -> Result<UserStats, UserError> {
        self.repo.stats().await.map_err(UserError::from)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use time::OffsetDateTime;

    use super::*;
    use crate::application::repos::CreateUserParams;
    use crate::domain::entities::UserAuthRecord;

    struct StubUsersRepo {
        user: Mutex<UserRecord>,
        admins: u64,
    }

    fn sample_user(role: Role, is_approved: bool) -> UserRecord {
        UserRecord {
            id: Uuid::new_v4(),
            email: "user@expo.test".into(),
            role,
            is_approved,
            approved_at: is_approved.then(OffsetDateTime::now_utc),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[async_trait]
    impl UsersRepo for StubUsersRepo {
        async fn list(&self, _filter: &UserQueryFilter) -> Result<Vec<UserRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
            let user = self.user.lock().unwrap().clone();
            Ok((user.id == id).then_some(user))
        }

        async fn find_auth_by_email(
            &self,
            _email: &str,
        ) -> Result<Option<UserAuthRecord>, RepoError> {
            Ok(None)
        }

        async fn create(&self, _params: CreateUserParams) -> Result<UserRecord, RepoError> {
            Err(RepoError::NotFound)
        }

        async fn approve(&self, _id: Uuid) -> Result<UserRecord, RepoError> {
            let mut user = self.user.lock().unwrap();
            user.is_approved = true;
            user.approved_at = Some(OffsetDateTime::now_utc());
            Ok(user.clone())
        }

        async fn set_role(&self, _id: Uuid, role: Role) -> Result<UserRecord, RepoError> {
            let mut user = self.user.lock().unwrap();
            if user.role == Role::Admin && role == Role::Editor && self.admins <= 1 {
                return Err(RepoError::integrity("cannot demote the last admin"));
            }
            user.role = role;
            Ok(user.clone())
        }

        async fn delete(&self, _id: Uuid) -> Result<(), RepoError> {
            let user = self.user.lock().unwrap();
            if user.role == Role::Admin && self.admins <= 1 {
                return Err(RepoError::integrity("cannot delete the last admin"));
            }
            Ok(())
        }

        async fn stats(&self) -> Result<UserStats, RepoError> {
            Ok(UserStats {
                total: 1,
                admins: self.admins,
                editors: 0,
                approved: 1,
                pending: 0,
                recent: Vec::new(),
            })
        }
    }

    fn service(user: UserRecord, admins: u64) -> (UserAdminService, Arc<TtlCache>, Uuid) {
        let id = user.id;
        let cache = Arc::new(TtlCache::new(Duration::from_secs(300)));
        let repo = StubUsersRepo {
            user: Mutex::new(user),
            admins,
        };
        (
            UserAdminService::new(Arc::new(repo), cache.clone()),
            cache,
            id,
        )
    }

    #[tokio::test]
    async fn approving_twice_is_a_conflict() {
        let (service, _cache, id) = service(sample_user(Role::Editor, true), 1);
        let result = service.approve(id).await;
        assert!(matches!(result, Err(UserError::AlreadyApproved)));
    }

    #[tokio::test]
    async fn rejecting_an_admin_is_forbidden() {
        let (service, _cache, id) = service(sample_user(Role::Admin, true), 2);
        let result = service.reject(id).await;
        assert!(matches!(result, Err(UserError::CannotRejectAdmin)));
    }

    #[tokio::test]
    async fn demoting_the_last_admin_is_blocked() {
        let (service, _cache, id) = service(sample_user(Role::Admin, true), 1);
        let result = service.set_role(id, Role::Editor).await;
        assert!(matches!(result, Err(UserError::LastAdmin)));
    }

    #[tokio::test]
    async fn demoting_works_once_a_second_admin_exists() {
        let (service, _cache, id) = service(sample_user(Role::Admin, true), 2);
        let user = service.set_role(id, Role::Editor).await.expect("demoted");
        assert_eq!(user.role, Role::Editor);
    }

    #[tokio::test]
    async fn deleting_the_last_admin_is_blocked() {
        let (service, _cache, id) = service(sample_user(Role::Admin, true), 1);
        let result = service.remove(id).await;
        assert!(matches!(result, Err(UserError::LastAdmin)));
    }

    #[tokio::test]
    async fn role_change_drops_cached_identity() {
        let (service, cache, id) = service(sample_user(Role::Admin, true), 2);
        cache.set(&format!("user:{id}"), json!({"role": "admin"}), None);

        service.set_role(id, Role::Editor).await.expect("demoted");
        assert!(!cache.has(&format!("user:{id}")));
    }
}
