//! Deterministic, human-friendly slugs for exhibitors and trails.
//!
//! Accented input such as "Café Central" becomes `cafe-central` (the
//! `slug` crate strips diacritics and lowercases). Callers provide a
//! uniqueness predicate so the disambiguation suffix (`-2`, `-3`, …)
//! stays decoupled from persistence.

use std::future::Future;

use slug::slugify;
use thiserror::Error;

const MAX_SUFFIX_ATTEMPTS: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
    #[error("exhausted attempts to find a unique slug for `{base}`")]
    Exhausted { base: String },
}

/// Errors from [`generate_unique_slug_async`], where the uniqueness
/// predicate itself can fail.
#[derive(Debug, Error)]
pub enum SlugAsyncError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[error(transparent)]
    Slug(#[from] SlugError),
    #[error(transparent)]
    Predicate(E),
}

/// Derive a base slug from the provided display name.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(input);
    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

/// Produce a slug that does not collide according to the supplied predicate.
///
/// `is_unique` must return `true` when the candidate is free. Collisions
/// retry with a monotonic counter starting at `-2`.
pub fn generate_unique_slug<F>(input: &str, mut is_unique: F) -> Result<String, SlugError>
where
    F: FnMut(&str) -> bool,
{
    let base = derive_slug(input)?;

    if is_unique(&base) {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let candidate = format!("{base}-{attempt}");
        if is_unique(&candidate) {
            return Ok(candidate);
        }
    }

    Err(SlugError::Exhausted { base })
}

/// Async variant of [`generate_unique_slug`] that awaits the uniqueness
/// predicate, typically a repository lookup.
pub async fn generate_unique_slug_async<F, Fut, E>(
    input: &str,
    mut is_unique: F,
) -> Result<String, SlugAsyncError<E>>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<bool, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    let base = derive_slug(input)?;

    if is_unique(&base).await.map_err(SlugAsyncError::Predicate)? {
        return Ok(base);
    }

    for attempt in 2..=MAX_SUFFIX_ATTEMPTS + 1 {
        let candidate = format!("{base}-{attempt}");
        if is_unique(&candidate)
            .await
            .map_err(SlugAsyncError::Predicate)?
        {
            return Ok(candidate);
        }
    }

    Err(SlugAsyncError::Slug(SlugError::Exhausted { base }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_slug_strips_accents() {
        assert_eq!(derive_slug("Café Central").expect("slug"), "cafe-central");
        assert_eq!(derive_slug("Énergie & Co").expect("slug"), "energie-co");
    }

    #[test]
    fn derive_slug_rejects_empty_input() {
        assert_eq!(derive_slug("   "), Err(SlugError::EmptyInput));
    }

    #[test]
    fn generate_unique_slug_appends_counter() {
        let existing = ["cafe-central".to_string()];
        let slug = generate_unique_slug("Café Central", |candidate| {
            !existing.contains(&candidate.to_string())
        })
        .expect("unique slug");

        assert_eq!(slug, "cafe-central-2");
    }

    #[test]
    fn generate_unique_slug_skips_taken_suffixes() {
        let existing = ["hall-nine".to_string(), "hall-nine-2".to_string()];
        let slug = generate_unique_slug("Hall Nine", |candidate| {
            !existing.contains(&candidate.to_string())
        })
        .expect("unique slug");

        assert_eq!(slug, "hall-nine-3");
    }

    #[tokio::test]
    async fn generate_unique_slug_async_consults_predicate() {
        use std::sync::Arc;
        use tokio::sync::Mutex;

        let existing = Arc::new(Mutex::new(vec!["cafe-central".to_string()]));

        let slug = generate_unique_slug_async("Café Central", |candidate| {
            let existing = existing.clone();
            let candidate = candidate.to_string();
            async move {
                let mut guard = existing.lock().await;
                if guard.contains(&candidate) {
                    Ok::<bool, std::convert::Infallible>(false)
                } else {
                    guard.push(candidate);
                    Ok(true)
                }
            }
        })
        .await
        .expect("unique slug");

        assert_eq!(slug, "cafe-central-2");
    }

    #[test]
    fn generate_unique_slug_exhausted() {
        let result = generate_unique_slug("Example", |_| false).expect_err("should exhaust");
        assert_eq!(
            result,
            SlugError::Exhausted {
                base: "example".to_string()
            }
        );
    }
}
