//! Pagination types

use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Zero-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 0,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Create a page request, clamping size into `1..=MAX_PAGE_SIZE`
    pub fn new(page: usize, size: usize) -> Self {
        Self {
            page,
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }
}

/// One page of results plus totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, request: PageRequest, total_items: usize) -> Self {
        let size = request.size.max(1);
        Self {
            items,
            page: request.page,
            size,
            total_items,
            total_pages: total_items.div_ceil(size),
        }
    }

    /// Slice an already ordered, fully materialized result set
    pub fn from_sorted(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len();
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(request.size)
            .collect();
        Self::new(items, request, total)
    }

    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            size: self.size,
            total_items: self.total_items,
            total_pages: self.total_pages,
        }
    }

    /// Like [`Page::map`] but stops at the first error
    pub fn try_map<U, E, F: FnMut(T) -> Result<U, E>>(self, f: F) -> Result<Page<U>, E> {
        let items = self.items.into_iter().map(f).collect::<Result<Vec<_>, E>>()?;
        Ok(Page {
            items,
            page: self.page,
            size: self.size,
            total_items: self.total_items,
            total_pages: self.total_pages,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
