//! Visitor favorites, keyed by an anonymous session id.
//!
//! Deliberately uncached: lists are per visitor and writes dominate.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{FavoriteWithExhibitor, FavoritesRepo, RepoError};
use crate::domain::entities::FavoriteRecord;

#[derive(Debug, Error)]
pub enum FavoriteError {
    #[error("{0}")]
    Validation(String),
    #[error("exhibitor not found")]
    ExhibitorNotFound,
    #[error("exhibitor is already in favorites")]
    AlreadyFavorited,
    #[error("favorite not found")]
    NotFound,
    #[error(transparent)]
    Repo(RepoError),
}

#[derive(Clone)]
pub struct FavoriteService {
    repo: Arc<dyn FavoritesRepo>,
}

impl FavoriteService {
    pub fn new(repo: Arc<dyn FavoritesRepo>) -> Self {
        Self { repo }
    }

    pub async fn list(&self, session_id: &str) -> Result<Vec<FavoriteWithExhibitor>, FavoriteError> {
        let session_id = validate_session(session_id)?;
        self.repo
            .list_by_session(session_id)
            .await
            .map_err(FavoriteError::Repo)
    }

    pub async fn add(
        &self,
        session_id: &str,
        exhibitor_id: Uuid,
    ) -> Result<FavoriteRecord, FavoriteError> {
        let session_id = validate_session(session_id)?;
        self.repo
            .add(session_id, exhibitor_id)
            .await
            .map_err(|err| match err {
                RepoError::NotFound => FavoriteError::ExhibitorNotFound,
                RepoError::Duplicate { .. } => FavoriteError::AlreadyFavorited,
                other => FavoriteError::Repo(other),
            })
    }

    pub async fn remove(&self, session_id: &str, exhibitor_id: Uuid) -> Result<(), FavoriteError> {
        let session_id = validate_session(session_id)?;
        self.repo
            .remove(session_id, exhibitor_id)
            .await
            .map_err(|err| match err {
                RepoError::NotFound => FavoriteError::NotFound,
                other => FavoriteError::Repo(other),
            })
    }

    pub async fn clear(&self, session_id: &str) -> Result<u64, FavoriteError> {
        let session_id = validate_session(session_id)?;
        self.repo
            .clear_session(session_id)
            .await
            .map_err(FavoriteError::Repo)
    }
}

fn validate_session(session_id: &str) -> Result<&str, FavoriteError> {
    let trimmed = session_id.trim();
    if trimmed.is_empty() {
        return Err(FavoriteError::Validation("session id is required".into()));
    }
    Ok(trimmed)
}
