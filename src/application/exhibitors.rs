//! Exhibitor catalogue: search, CRUD, and spreadsheet import/export.
//!
//! Slugs are derived from the display name and disambiguated with a
//! numeric suffix. Booth assignment is exclusive; the repository enforces
//! it transactionally and the service pre-checks to produce a friendly
//! conflict message. Every write clears both the `exhibitor:*` and
//! `booth:*` cache prefixes since booth listings embed their occupant.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::application::cache::TtlCache;
use crate::application::csv::{self, ParsedCsv};
use crate::application::pagination::{PageRequest, Paginated};
use crate::application::repos::{
    BoothsRepo, ContactParams, CreateExhibitorParams, ExhibitorDetail, ExhibitorSearchFilter,
    ExhibitorsRepo, RepoError, SectorParams, SectorsRepo, ThemesRepo, UpdateExhibitorParams,
};
use crate::domain::slug::{SlugAsyncError, SlugError, derive_slug, generate_unique_slug_async};

const CACHE_TTL: Duration = Duration::from_secs(300);
const IMPORT_SECTOR_COLOR: &str = "#999999";

/// Column layout shared by export and import.
pub const EXPORT_HEADERS: [&str; 14] = [
    "name",
    "sector",
    "booth_number",
    "description",
    "logo_url",
    "website_url",
    "linkedin_url",
    "pdf_url",
    "theme",
    "contacts_phone",
    "contacts_first_name",
    "contacts_last_name",
    "contacts_role",
    "contacts_email",
];

#[derive(Debug, Error)]
pub enum ExhibitorError {
    #[error("{0}")]
    Validation(String),
    #[error("exhibitor not found")]
    NotFound,
    #[error("sector not found")]
    SectorNotFound,
    #[error("booth not found")]
    BoothNotFound,
    #[error("booth is already occupied")]
    BoothOccupied,
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<RepoError> for ExhibitorError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => ExhibitorError::NotFound,
            RepoError::Duplicate { constraint } if constraint.contains("booth") => {
                ExhibitorError::BoothOccupied
            }
            RepoError::Duplicate { constraint } => {
                ExhibitorError::Conflict(format!("exhibitor conflicts on `{constraint}`"))
            }
            RepoError::InvalidInput { message } => ExhibitorError::Validation(message),
            other => ExhibitorError::Repo(other),
        }
    }
}

impl From<SlugAsyncError<RepoError>> for ExhibitorError {
    fn from(err: SlugAsyncError<RepoError>) -> Self {
        match err {
            SlugAsyncError::Slug(SlugError::EmptyInput | SlugError::Unrepresentable { .. }) => {
                ExhibitorError::Validation("name cannot be turned into a slug".into())
            }
            SlugAsyncError::Slug(SlugError::Exhausted { base }) => {
                ExhibitorError::Conflict(format!("no free slug variant left for `{base}`"))
            }
            SlugAsyncError::Predicate(err) => ExhibitorError::from(err),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContactInput {
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CreateExhibitorCommand {
    pub name: String,
    pub logo_url: Option<String>,
    pub description: Option<String>,
    pub website_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub pdf_url: Option<String>,
    pub sector_id: Uuid,
    pub booth_id: Option<Uuid>,
    pub contacts: Vec<ContactInput>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateExhibitorCommand {
    pub name: Option<String>,
    pub logo_url: Option<String>,
    pub description: Option<String>,
    pub website_url: Option<String>,
    pub linkedin_url: Option<String>,
    pub pdf_url: Option<String>,
    pub sector_id: Option<Uuid>,
    /// `Some(None)` disconnects the booth, `Some(Some(id))` reassigns it.
    pub booth_id: Option<Option<Uuid>>,
    pub contacts: Option<Vec<ContactInput>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportFailure {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub created: usize,
    pub failures: Vec<ImportFailure>,
    pub warnings: Vec<String>,
}

#[derive(Clone)]
pub struct ExhibitorService {
    repo: Arc<dyn ExhibitorsRepo>,
    sectors: Arc<dyn SectorsRepo>,
    booths: Arc<dyn BoothsRepo>,
    themes: Arc<dyn ThemesRepo>,
    cache: Arc<TtlCache>,
}

impl ExhibitorService {
    pub fn new(
        repo: Arc<dyn ExhibitorsRepo>,
        sectors: Arc<dyn SectorsRepo>,
        booths: Arc<dyn BoothsRepo>,
        themes: Arc<dyn ThemesRepo>,
        cache: Arc<TtlCache>,
    ) -> Self {
        Self {
            repo,
            sectors,
            booths,
            themes,
            cache,
        }
    }

    pub async fn search(
        &self,
        filter: ExhibitorSearchFilter,
        page: PageRequest,
    ) -> Result<Paginated<ExhibitorDetail>, ExhibitorError> {
        let filter_key = serde_json::to_string(&filter).unwrap_or_default();
        let key = format!(
            "exhibitor:search:{filter_key}:{}:{}",
            page.limit(),
            page.offset()
        );
        self.cache
            .get_or_set(&key, Some(CACHE_TTL), || async {
                self.repo
                    .search(&filter, page)
                    .await
                    .map_err(ExhibitorError::from)
            })
            .await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<ExhibitorDetail, ExhibitorError> {
        let key = format!("exhibitor:id:{id}");
        self.cache
            .get_or_set(&key, Some(CACHE_TTL), || async {
                self.repo
                    .find_by_id(id)
                    .await
                    .map_err(ExhibitorError::from)?
                    .ok_or(ExhibitorError::NotFound)
            })
            .await
    }

    pub async fn find_by_slug(&self, slug: &str) -> Result<ExhibitorDetail, ExhibitorError> {
        let slug = slug.trim().to_lowercase();
        let key = format!("exhibitor:slug:{slug}");
        self.cache
            .get_or_set(&key, Some(CACHE_TTL), || async {
                self.repo
                    .find_by_slug(&slug)
                    .await
                    .map_err(ExhibitorError::from)?
                    .ok_or(ExhibitorError::NotFound)
            })
            .await
    }

    pub async fn create(
        &self,
        command: CreateExhibitorCommand,
    ) -> Result<ExhibitorDetail, ExhibitorError> {
        let name = command.name.trim().to_string();
        if name.is_empty() {
            return Err(ExhibitorError::Validation("name is required".into()));
        }

        if !self.sectors.exists(command.sector_id).await? {
            return Err(ExhibitorError::SectorNotFound);
        }
        if let Some(booth_id) = command.booth_id {
            self.ensure_booth_free(booth_id, None).await?;
        }

        let slug = self.unique_slug(&name).await?;
        let contacts = normalize_contacts(command.contacts)?;

        let params = CreateExhibitorParams {
            name,
            slug,
            logo_url: clean_opt(command.logo_url),
            description: clean_opt(command.description),
            website_url: clean_opt(command.website_url),
            linkedin_url: clean_opt(command.linkedin_url),
            pdf_url: clean_opt(command.pdf_url),
            sector_id: command.sector_id,
            booth_id: command.booth_id,
            contacts,
        };

        let detail = self.repo.create(params).await?;
        self.invalidate();
        Ok(detail)
    }

    pub async fn update(
        &self,
        id: Uuid,
        command: UpdateExhibitorCommand,
    ) -> Result<ExhibitorDetail, ExhibitorError> {
        let existing = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or(ExhibitorError::NotFound)?;

        let mut params = UpdateExhibitorParams::default();

        if let Some(name) = command.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ExhibitorError::Validation("name is required".into()));
            }
            // Only re-slug when the name actually produces a different base.
            let keeps_slug = derive_slug(&name)
                .map(|base| base == existing.exhibitor.slug)
                .unwrap_or(false);
            if !keeps_slug && name != existing.exhibitor.name {
                params.slug = Some(self.unique_slug(&name).await?);
            }
            params.name = Some(name);
        }

        if let Some(sector_id) = command.sector_id {
            if !self.sectors.exists(sector_id).await? {
                return Err(ExhibitorError::SectorNotFound);
            }
            params.sector_id = Some(sector_id);
        }

        if let Some(assignment) = command.booth_id {
            if let Some(booth_id) = assignment {
                self.ensure_booth_free(booth_id, Some(id)).await?;
            }
            params.booth_id = Some(assignment);
        }

        if let Some(contacts) = command.contacts {
            params.contacts = Some(normalize_contacts(contacts)?);
        }

        params.logo_url = clean_opt(command.logo_url);
        params.description = clean_opt(command.description);
        params.website_url = clean_opt(command.website_url);
        params.linkedin_url = clean_opt(command.linkedin_url);
        params.pdf_url = clean_opt(command.pdf_url);

        let detail = self.repo.update(id, params).await?;
        self.invalidate();
        Ok(detail)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ExhibitorError> {
        self.repo.delete(id).await?;
        self.invalidate();
        Ok(())
    }

    /// Full catalogue as CSV, one row per exhibitor with its first theme
    /// and first contact.
    pub async fn export_csv(&self) -> Result<String, ExhibitorError> {
        let details = self.repo.list_all().await?;

        let rows: Vec<Vec<String>> = details
            .iter()
            .map(|detail| {
                let contact = detail.contacts.first();
                vec![
                    detail.exhibitor.name.clone(),
                    detail.sector.name.clone(),
                    detail
                        .booth
                        .as_ref()
                        .map(|b| b.number.clone())
                        .unwrap_or_default(),
                    detail.exhibitor.description.clone().unwrap_or_default(),
                    detail.exhibitor.logo_url.clone().unwrap_or_default(),
                    detail.exhibitor.website_url.clone().unwrap_or_default(),
                    detail.exhibitor.linkedin_url.clone().unwrap_or_default(),
                    detail.exhibitor.pdf_url.clone().unwrap_or_default(),
                    detail
                        .themes
                        .first()
                        .map(|t| t.name.clone())
                        .unwrap_or_default(),
                    contact.and_then(|c| c.phone.clone()).unwrap_or_default(),
                    contact.map(|c| c.first_name.clone()).unwrap_or_default(),
                    contact.map(|c| c.last_name.clone()).unwrap_or_default(),
                    contact.map(|c| c.role.clone()).unwrap_or_default(),
                    contact.map(|c| c.email.clone()).unwrap_or_default(),
                ]
            })
            .collect();

        Ok(csv::to_csv(&EXPORT_HEADERS, &rows))
    }

    /// Create exhibitors row by row from an uploaded CSV. Row failures are
    /// collected in the report instead of aborting the batch.
    pub async fn import_csv(&self, text: &str) -> Result<ImportReport, ExhibitorError> {
        let parsed = csv::parse_csv(text);
        let mut report = ImportReport {
            warnings: parsed.warnings.clone(),
            ..ImportReport::default()
        };

        if parsed.headers.is_empty() {
            return Ok(report);
        }
        if parsed.index_of("name").is_none() {
            return Err(ExhibitorError::Validation(
                "CSV is missing the `name` column".into(),
            ));
        }

        for (idx, row) in parsed.rows.iter().enumerate() {
            let line = idx + 2; // header occupies line 1
            match self.import_row(&parsed, row, &mut report.warnings).await {
                Ok(()) => report.created += 1,
                Err(err) => report.failures.push(ImportFailure {
                    line,
                    message: err.to_string(),
                }),
            }
        }

        Ok(report)
    }

    async fn import_row(
        &self,
        parsed: &ParsedCsv,
        row: &[String],
        warnings: &mut Vec<String>,
    ) -> Result<(), ExhibitorError> {
        let name = parsed
            .value(row, "name")
            .ok_or_else(|| ExhibitorError::Validation("name is required".into()))?;

        let sector_name = parsed.value(row, "sector").unwrap_or("Uncategorized");
        let sector = match self.sectors.find_by_name(sector_name).await? {
            Some(sector) => sector,
            None => {
                self.sectors
                    .create(SectorParams {
                        name: sector_name.to_string(),
                        color_hex: IMPORT_SECTOR_COLOR.to_string(),
                    })
                    .await?
            }
        };

        let booth_id = match parsed.value(row, "booth_number") {
            Some(number) => {
                let number = number.trim().to_uppercase();
                match self.booths.find_by_number(&number).await? {
                    Some(found) => Some(found.booth.id),
                    None => {
                        warnings.push(format!("unknown booth `{number}`, left unassigned"));
                        None
                    }
                }
            }
            None => None,
        };

        let contacts = match parsed.value(row, "contacts_email") {
            Some(email) => vec![ContactInput {
                first_name: parsed
                    .value(row, "contacts_first_name")
                    .unwrap_or_default()
                    .to_string(),
                last_name: parsed
                    .value(row, "contacts_last_name")
                    .unwrap_or_default()
                    .to_string(),
                role: parsed
                    .value(row, "contacts_role")
                    .unwrap_or_default()
                    .to_string(),
                email: email.to_string(),
                phone: parsed.value(row, "contacts_phone").map(str::to_string),
            }],
            None => Vec::new(),
        };

        let detail = self
            .create(CreateExhibitorCommand {
                name: name.to_string(),
                logo_url: parsed.value(row, "logo_url").map(str::to_string),
                description: parsed.value(row, "description").map(str::to_string),
                website_url: parsed.value(row, "website_url").map(str::to_string),
                linkedin_url: parsed.value(row, "linkedin_url").map(str::to_string),
                pdf_url: parsed.value(row, "pdf_url").map(str::to_string),
                sector_id: sector.id,
                booth_id,
                contacts,
            })
            .await?;

        if let Some(theme_name) = parsed.value(row, "theme") {
            match derive_slug(theme_name) {
                Ok(theme_slug) => match self.themes.find_by_slug(&theme_slug).await? {
                    Some(theme) => {
                        self.themes
                            .attach_exhibitor(theme.theme.id, detail.exhibitor.id)
                            .await?;
                    }
                    None => warnings.push(format!("unknown theme `{theme_name}`, not linked")),
                },
                Err(_) => warnings.push(format!("theme `{theme_name}` is not sluggable")),
            }
        }

        Ok(())
    }

    async fn unique_slug(&self, name: &str) -> Result<String, ExhibitorError> {
        let repo = self.repo.clone();
        let slug = generate_unique_slug_async(name, move |candidate| {
            let repo = repo.clone();
            let candidate = candidate.to_string();
            async move { repo.slug_exists(&candidate).await.map(|taken| !taken) }
        })
        .await?;
        Ok(slug)
    }

    async fn ensure_booth_free(
        &self,
        booth_id: Uuid,
        allow_occupant: Option<Uuid>,
    ) -> Result<(), ExhibitorError> {
        let booth = self
            .booths
            .find_by_id(booth_id)
            .await?
            .ok_or(ExhibitorError::BoothNotFound)?;
        if let Some(occupant) = booth.exhibitor {
            if allow_occupant != Some(occupant.id) {
                return Err(ExhibitorError::BoothOccupied);
            }
        }
        Ok(())
    }

    fn invalidate(&self) {
        self.cache.delete_pattern("exhibitor:*");
        self.cache.delete_pattern("booth:*");
    }
}

fn clean_opt(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn normalize_contacts(contacts: Vec<ContactInput>) -> Result<Vec<ContactParams>, ExhibitorError> {
    contacts
        .into_iter()
        .map(|contact| {
            let email = contact.email.trim().to_lowercase();
            if !email.contains('@') {
                return Err(ExhibitorError::Validation(format!(
                    "invalid contact email `{email}`"
                )));
            }
            Ok(ContactParams {
                first_name: contact.first_name.trim().to_string(),
                last_name: contact.last_name.trim().to_string(),
                role: contact.role.trim().to_string(),
                email,
                phone: clean_opt(contact.phone),
            })
        })
        .collect()
}
