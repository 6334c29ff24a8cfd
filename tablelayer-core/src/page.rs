//! Pagination and result types for filter queries.
//!
//! A filter call either returns every matching record or, when [`Pagination`]
//! is requested, one [`Page`] of them along with the total match count. The two
//! shapes are kept apart by [`Filtered`] so callers can tell which one they got.

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// A single page of paginated results.
///
/// `count` is the number of records matching the whole criteria, not the number
/// of records in this page.
///
/// # Example
///
/// ```ignore
/// use tablelayer_core::page::Page;
///
/// let page: Page<String> = Page::builder(vec!["item1".to_string()])
///     .with_count(100)
///     .with_next_page(Some(1))
///     .build();
///
/// assert_eq!(page.data.len(), 1);
/// assert_eq!(page.count, 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// The items contained in this page.
    pub data: Vec<T>,
    /// Total count of items across all pages.
    pub count: usize,
    /// The next page number (if more pages exist).
    pub next_page: Option<usize>,
    /// The previous page number (if this is not the first page).
    pub previous_page: Option<usize>,
}

impl<T> Page<T> {
    /// Creates a new builder for constructing a page with custom settings.
    pub fn builder(data: Vec<T>) -> PageBuilder<T> {
        PageBuilder::new(data)
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            data: Vec::new(),
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }
}

/// Builder for constructing [`Page`] instances with fluent API.
pub struct PageBuilder<T> {
    data: Vec<T>,
    count: usize,
    next_page: Option<usize>,
    previous_page: Option<usize>,
}

impl<T> PageBuilder<T> {
    pub fn new(data: Vec<T>) -> Self {
        Self {
            data,
            count: 0,
            next_page: None,
            previous_page: None,
        }
    }

    /// Sets the total count of items across all pages.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Sets the next page number (or `None` if this is the last page).
    pub fn with_next_page(mut self, next_page: Option<usize>) -> Self {
        self.next_page = next_page;
        self
    }

    /// Sets the previous page number (or `None` if this is the first page).
    pub fn with_previous_page(mut self, previous_page: Option<usize>) -> Self {
        self.previous_page = previous_page;
        self
    }

    pub fn build(self) -> Page<T> {
        Page {
            data: self.data,
            count: self.count,
            next_page: self.next_page,
            previous_page: self.previous_page,
        }
    }
}

/// Which window of a result set to return.
///
/// Pages are zero-indexed: page 0 is the first page.
///
/// ```ignore
/// let params = Pagination::new(2, 50);
/// assert_eq!(params.offset(), 100);
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// The page number (0-indexed).
    pub page: usize,
    /// Number of items per page.
    pub size: usize,
}

impl Pagination {
    pub fn new(page: usize, size: usize) -> Self {
        Self { page, size }
    }

    /// Number of records to skip to reach this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.size)
    }

    /// Wraps one window of records into a [`Page`] given the total match count.
    pub fn page<T>(&self, data: Vec<T>, count: usize) -> Page<T> {
        let end = self.offset().saturating_add(self.size);

        Page::builder(data)
            .with_count(count)
            .with_next_page((self.size > 0 && end < count).then_some(self.page + 1))
            .with_previous_page(self.page.checked_sub(1))
            .build()
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 0, size: 10 }
    }
}

/// Result of a filter call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Filtered {
    /// Every matching record; returned when no pagination was requested.
    All(Vec<Record>),
    /// One page of matching records plus the total count.
    Paged(Page<Record>),
}

impl Filtered {
    /// The records carried by either shape.
    pub fn records(&self) -> &[Record] {
        match self {
            Filtered::All(records) => records,
            Filtered::Paged(page) => &page.data,
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            Filtered::All(records) => records,
            Filtered::Paged(page) => page.data,
        }
    }

    pub fn as_page(&self) -> Option<&Page<Record>> {
        match self {
            Filtered::All(_) => None,
            Filtered::Paged(page) => Some(page),
        }
    }
}
