//! Page-number pagination shared by the feeds.

use serde::Serialize;

use crate::domain::error::DomainError;

/// 1-based page number plus page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Result<Self, DomainError> {
        if page == 0 || page_size == 0 {
            return Err(DomainError::InvalidPage { page, page_size });
        }
        Ok(Self { page, page_size })
    }

    pub fn first(page_size: u32) -> Result<Self, DomainError> {
        Self::new(1, page_size)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Index of the first item in the window.
    pub fn start(&self) -> u32 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    /// Index one past the last item in the window.
    pub fn end(&self) -> u32 {
        self.start().saturating_add(self.page_size)
    }

    pub fn next(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            page_size: self.page_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub has_next: bool,
}

impl<T> Page<T> {
    pub fn new(request: PageRequest, items: Vec<T>, total: u64) -> Self {
        Self {
            items,
            page: request.page,
            page_size: request.page_size,
            has_next: total > u64::from(request.end()),
        }
    }

    /// Slice `all` to the request's window.
    #[cfg(test)]
    pub(crate) fn from_window(request: PageRequest, all: Vec<T>) -> Self {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(request.start() as usize)
            .take(request.page_size as usize)
            .collect();
        Self::new(request, items, total)
    }
}
