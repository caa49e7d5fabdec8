//! Offset/limit pagination.
//!
//! [`Paginator::collect_all`] keeps requesting pages of a fixed size until the
//! server returns a page shorter than that size.

use std::future::Future;

use serde::Deserialize;

use crate::{CloudApiError, Result};

/// One page of a listing.
#[derive(Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Total number of items reported by the server, if any.
    pub total: Option<u64>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items, total: None }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Number of items on this page.
    pub fn count(&self) -> usize {
        self.items.len()
    }
}

/// Drives repeated single-page fetches until exhaustion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Paginator {
    page_size: usize,
    max_pages: Option<usize>,
}

impl Paginator {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            max_pages: None,
        }
    }

    /// Fails with [`CloudApiError::PaginationLimit`] once `max_pages` full
    /// pages were fetched without reaching a short one.
    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = Some(max_pages);
        self
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Calls `fetch(offset, limit)` from offset zero, advancing by the page
    /// size, and returns every item in order.
    ///
    /// A page holding fewer than `page_size` items ends the listing. Any
    /// fetch error is returned as is and discards the items gathered so far.
    pub async fn collect_all<T, F, Fut>(&self, mut fetch: F) -> Result<Vec<T>>
    where
        F: FnMut(usize, usize) -> Fut,
        Fut: Future<Output = Result<Page<T>>>,
    {
        if self.page_size == 0 {
            return Err(CloudApiError::RequestConstruction(
                "page size must be at least 1".to_owned(),
            ));
        }

        let mut items = Vec::new();
        let mut offset = 0usize;
        let mut pages = 0usize;

        loop {
            let page = fetch(offset, self.page_size).await?;
            pages += 1;

            let count = page.count();
            #[cfg(feature = "tracing")]
            tracing::debug!(offset, count, total = ?page.total, "fetched page");

            items.extend(page.items);
            if count < self.page_size {
                return Ok(items);
            }
            if self.max_pages.is_some_and(|max_pages| pages >= max_pages) {
                return Err(CloudApiError::PaginationLimit { pages });
            }
            offset += self.page_size;
        }
    }
}

/// Collects every item using `page_size` items per request.
pub async fn collect_all<T, F, Fut>(fetch: F, page_size: usize) -> Result<Vec<T>>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<Page<T>>>,
{
    Paginator::new(page_size).collect_all(fetch).await
}

/// Counters reported alongside a page of results.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct PageInfo {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub total: u64,
}

/// Listing metadata, either `{"page": {...}}` or the counters inline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PageMeta {
    Nested { page: PageInfo },
    Flat(PageInfo),
}

impl PageMeta {
    pub fn info(&self) -> &PageInfo {
        match self {
            Self::Nested { page } => page,
            Self::Flat(info) => info,
        }
    }
}

/// Envelope of a paginated listing response.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct PaginatedResponse<T> {
    #[serde(default)]
    pub meta: Option<PageMeta>,
    pub results: Vec<T>,
}

impl<T> PaginatedResponse<T> {
    pub fn into_page(self) -> Page<T> {
        let page = Page::new(self.results);
        match self.meta {
            Some(meta) => page.with_total(meta.info().total),
            None => page,
        }
    }
}
