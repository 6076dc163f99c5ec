//! Accounts and bearer-token authentication.
//!
//! Signup creates an unapproved editor account that an admin must approve
//! before login succeeds. Tokens are HS256 JWTs carrying the user id,
//! email and role; the resolved user payload is cached under `user:<id>`
//! so request authentication rarely touches the database. Role changes
//! and approvals drop that key (see the user administration service).

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::application::cache::TtlCache;
use crate::application::repos::{CreateUserParams, RepoError, UsersRepo};
use crate::domain::entities::UserRecord;
use crate::domain::types::Role;

const USER_CACHE_TTL: Duration = Duration::from_secs(3600);
const MIN_PASSWORD_LENGTH: usize = 8;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("account is awaiting approval")]
    NotApproved,
    #[error("email is already registered")]
    EmailTaken,
    #[error("invalid or expired token")]
    Unauthorized,
    #[error("internal auth failure: {0}")]
    Internal(String),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for AuthError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Duplicate { .. } => AuthError::EmailTaken,
            other => AuthError::Repo(other),
        }
    }
}

impl From<bcrypt::BcryptError> for AuthError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

/// JWT payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated caller attached to requests as an extension.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub token: String,
    pub user: UserRecord,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UsersRepo>,
    cache: Arc<TtlCache>,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_ttl: Duration,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        cache: Arc<TtlCache>,
        jwt_secret: &str,
        token_ttl: Duration,
        bcrypt_cost: u32,
    ) -> Self {
        Self {
            users,
            cache,
            encoding_key: EncodingKey::from_secret(jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            token_ttl,
            bcrypt_cost,
        }
    }

    /// Self-service signup; the account stays unusable until approved.
    pub async fn signup(&self, email: &str, password: &str) -> Result<UserRecord, AuthError> {
        self.create_account(email, password, Role::Editor, false).await
    }

    /// Admin-driven creation of a pre-approved account.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<UserRecord, AuthError> {
        self.create_account(email, password, role, true).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email)?;

        let auth = self
            .users
            .find_auth_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !bcrypt::verify(password, &auth.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }
        if !auth.is_approved {
            return Err(AuthError::NotApproved);
        }

        let user = self
            .users
            .find_by_id(auth.id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if let Ok(payload) = serde_json::to_value(&user) {
            self.cache
                .set(&format!("user:{}", user.id), payload, Some(USER_CACHE_TTL));
        }

        let token = self.issue_token(&user)?;
        Ok(LoginOutcome { token, user })
    }

    /// Resolve a bearer token to a live identity. The user row is loaded
    /// through the cache so the role reflects at most one hour of drift,
    /// except where an admin action dropped the key explicitly.
    pub async fn identity_for_token(&self, token: &str) -> Result<Identity, AuthError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|_| AuthError::Unauthorized)?
            .claims;

        let user_id = claims.sub;
        let key = format!("user:{user_id}");
        let user: UserRecord = self
            .cache
            .get_or_set(&key, Some(USER_CACHE_TTL), || async {
                self.users
                    .find_by_id(user_id)
                    .await
                    .map_err(AuthError::from)?
                    .ok_or(AuthError::Unauthorized)
            })
            .await?;

        if !user.is_approved {
            return Err(AuthError::NotApproved);
        }

        Ok(Identity {
            id: user.id,
            email: user.email,
            role: user.role,
        })
    }

    fn issue_token(&self, user: &UserRecord) -> Result<String, AuthError> {
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat: now,
            exp: now + self.token_ttl.as_secs() as i64,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|err| AuthError::Internal(err.to_string()))
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
        role: Role,
        is_approved: bool,
    ) -> Result<UserRecord, AuthError> {
        let email = normalize_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(AuthError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }

        let password_hash = bcrypt::hash(password, self.bcrypt_cost)?;
        let user = self
            .users
            .create(CreateUserParams {
                email,
                password_hash,
                role,
                is_approved,
            })
            .await?;
        Ok(user)
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        return Err(AuthError::Validation("a valid email is required".into()));
    }
    Ok(email)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use time::OffsetDateTime;

    use super::*;
    use crate::application::repos::{UserQueryFilter, UserStats};
    use crate::domain::entities::UserAuthRecord;

    const TEST_COST: u32 = 4;

    struct StubUsersRepo {
        auth: Option<UserAuthRecord>,
        user: Option<UserRecord>,
        created: Mutex<Vec<CreateUserParams>>,
        lookups: AtomicUsize,
    }

    impl StubUsersRepo {
        fn with_user(password: &str, is_approved: bool) -> Self {
            let id = Uuid::new_v4();
            let email = "ada@expo.test".to_string();
            let hash = bcrypt::hash(password, TEST_COST).expect("hash");
            Self {
                auth: Some(UserAuthRecord {
                    id,
                    email: email.clone(),
                    password_hash: hash,
                    role: Role::Editor,
                    is_approved,
                }),
                user: Some(UserRecord {
                    id,
                    email,
                    role: Role::Editor,
                    is_approved,
                    approved_at: is_approved.then(OffsetDateTime::now_utc),
                    created_at: OffsetDateTime::now_utc(),
                }),
                created: Mutex::new(Vec::new()),
                lookups: AtomicUsize::new(0),
            }
        }

        fn empty() -> Self {
            Self {
                auth: None,
                user: None,
                created: Mutex::new(Vec::new()),
                lookups: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl UsersRepo for StubUsersRepo {
        async fn list(&self, _filter: &UserQueryFilter) -> Result<Vec<UserRecord>, RepoError> {
            Ok(Vec::new())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, RepoError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            Ok(self.user.clone().filter(|u| u.id == id))
        }

        async fn find_auth_by_email(
            &self,
            email: &str,
        ) -> Result<Option<UserAuthRecord>, RepoError> {
            Ok(self.auth.clone().filter(|a| a.email == email))
        }

        async fn create(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
            let record = UserRecord {
                id: Uuid::new_v4(),
                email: params.email.clone(),
                role: params.role,
                is_approved: params.is_approved,
                approved_at: None,
                created_at: OffsetDateTime::now_utc(),
            };
            self.created.lock().unwrap().push(params);
            Ok(record)
        }

        async fn approve(&self, _id: Uuid) -> Result<UserRecord, RepoError> {
            Err(RepoError::NotFound)
        }

        async fn set_role(&self, _id: Uuid, _role: Role) -> Result<UserRecord, RepoError> {
            Err(RepoError::NotFound)
        }

        async fn delete(&self, _id: Uuid) -> Result<(), RepoError> {
            Ok(())
        }

        async fn stats(&self) -> Result<UserStats, RepoError> {
            Ok(UserStats {
                total: 0,
                admins: 0,
                editors: 0,
                approved: 0,
                pending: 0,
                recent: Vec::new(),
            })
        }
    }

    fn service(repo: StubUsersRepo) -> (AuthService, Arc<StubUsersRepo>) {
        let repo = Arc::new(repo);
        let cache = Arc::new(TtlCache::new(Duration::from_secs(300)));
        (
            AuthService::new(
                repo.clone(),
                cache,
                "test-secret",
                Duration::from_secs(3600),
                TEST_COST,
            ),
            repo,
        )
    }

    #[tokio::test]
    async fn signup_rejects_short_passwords() {
        let (service, _repo) = service(StubUsersRepo::empty());
        let result = service.signup("ada@expo.test", "short").await;
        assert!(matches!(result, Err(AuthError::Validation(_))));
    }

    #[tokio::test]
    async fn signup_creates_unapproved_editor() {
        let (service, repo) = service(StubUsersRepo::empty());
        service
            .signup(" Ada@Expo.TEST ", "hunter2hunter2")
            .await
            .expect("signup");

        let created = repo.created.lock().unwrap();
        assert_eq!(created[0].email, "ada@expo.test");
        assert_eq!(created[0].role, Role::Editor);
        assert!(!created[0].is_approved);
    }

    #[tokio::test]
    async fn login_with_wrong_password_is_generic() {
        let (service, _repo) = service(StubUsersRepo::with_user("hunter2hunter2", true));
        let result = service.login("ada@expo.test", "not-the-password").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn login_with_unknown_email_is_generic() {
        let (service, _repo) = service(StubUsersRepo::empty());
        let result = service.login("ghost@expo.test", "whatever123").await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn unapproved_account_cannot_login() {
        let (service, _repo) = service(StubUsersRepo::with_user("hunter2hunter2", false));
        let result = service.login("ada@expo.test", "hunter2hunter2").await;
        assert!(matches!(result, Err(AuthError::NotApproved)));
    }

    #[tokio::test]
    async fn token_round_trips_to_identity() {
        let (service, _repo) = service(StubUsersRepo::with_user("hunter2hunter2", true));
        let outcome = service
            .login("ada@expo.test", "hunter2hunter2")
            .await
            .expect("login");

        let identity = service
            .identity_for_token(&outcome.token)
            .await
            .expect("identity");
        assert_eq!(identity.id, outcome.user.id);
        assert_eq!(identity.role, Role::Editor);
    }

    #[tokio::test]
    async fn identity_resolution_hits_the_cache_after_login() {
        let (service, repo) = service(StubUsersRepo::with_user("hunter2hunter2", true));
        let outcome = service
            .login("ada@expo.test", "hunter2hunter2")
            .await
            .expect("login");
        let after_login = repo.lookups.load(Ordering::SeqCst);

        service
            .identity_for_token(&outcome.token)
            .await
            .expect("identity");
        service
            .identity_for_token(&outcome.token)
            .await
            .expect("identity");

        assert_eq!(repo.lookups.load(Ordering::SeqCst), after_login);
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let (service, repo) = service(StubUsersRepo::with_user("hunter2hunter2", true));
        let user = repo.user.clone().expect("user");

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = Claims {
            sub: user.id,
            email: user.email,
            role: user.role,
            iat: now - 7200,
            exp: now - 3600,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret("test-secret".as_bytes()),
        )
        .expect("encode");

        let result = service.identity_for_token(&token).await;
        assert!(matches!(result, Err(AuthError::Unauthorized)));
    }

    #[tokio::test]
    async fn tampered_token_is_rejected() {
        let (service, _repo) = service(StubUsersRepo::with_user("hunter2hunter2", true));
        let result = service.identity_for_token("not.a.token").await;
        assert!(matches!(result, Err(AuthError::Unauthorized)));
    }
}
