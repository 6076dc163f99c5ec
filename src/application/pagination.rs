//! Offset pagination shared by the listing endpoints.
//!
//! Clients send `page`/`limit` (or a raw `skip`); responses echo the page
//! shape back together with the unfiltered total so the SPA can render
//! page controls.

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
    skip: Option<u32>,
}

impl PageRequest {
    /// Normalize raw query values: page floors at 1, limit is clamped to
    /// `1..=MAX_PAGE_LIMIT`, and an explicit `skip` overrides the
    /// page-derived offset.
    pub fn new(page: Option<u32>, limit: Option<u32>, skip: Option<u32>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        Self { page, limit, skip }
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u32 {
        match self.skip {
            Some(skip) => skip,
            None => (self.page - 1).saturating_mul(self.limit),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None, None)
    }
}

/// One page of results plus the total matching-row count.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, total: u64, request: &PageRequest) -> Self {
        Self {
            items,
            total,
            page: request.page(),
            limit: request.limit(),
        }
    }

    pub fn empty(request: &PageRequest) -> Self {
        Self::new(Vec::new(), 0, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_unset() {
        let page = PageRequest::new(None, None, None);
        assert_eq!(page.page(), 1);
        assert_eq!(page.limit(), DEFAULT_PAGE_LIMIT);
        assert_eq!(page.offset(), 0);
    }

    #[test]
    fn limit_is_clamped() {
        assert_eq!(PageRequest::new(None, Some(0), None).limit(), 1);
        assert_eq!(
            PageRequest::new(None, Some(500), None).limit(),
            MAX_PAGE_LIMIT
        );
    }

    #[test]
    fn offset_derives_from_page_unless_skip_given() {
        assert_eq!(PageRequest::new(Some(3), Some(25), None).offset(), 50);
        assert_eq!(PageRequest::new(Some(3), Some(25), Some(7)).offset(), 7);
    }

    #[test]
    fn page_zero_floors_to_one() {
        let page = PageRequest::new(Some(0), None, None);
        assert_eq!(page.page(), 1);
        assert_eq!(page.offset(), 0);
    }
}
