//! Offset pagination primitives.
//!
//! A [`PageRequest`] names a zero-based window over an ordered result set;
//! a [`Page`] carries the fetched slice together with the total element count
//! materialized by a separate count query. All derived values (`total_pages`,
//! `is_first`, `has_next`, ...) are computed from `(index, size, total)` —
//! never from the slice length.

use crate::{Error, OrderBy};

/// Zero-based page window request with a sort specification.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct PageRequest {
    pub index: u64,
    pub size: u64,
    pub sort: OrderBy,
}

impl PageRequest {
    /// Build a request for page `index` of `size` rows.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPageSize`] if `size == 0`.
    pub fn of(index: u64, size: u64) -> Result<Self, Error> {
        if size == 0 {
            return Err(Error::InvalidPageSize);
        }
        Ok(Self {
            index,
            size,
            sort: OrderBy::empty(),
        })
    }

    pub fn sorted_by(mut self, sort: OrderBy) -> Self {
        self.sort = sort;
        self
    }

    /// Row offset of the first item in the window.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.index * self.size
    }
}

/// One page of results plus the totals needed for page navigation.
#[derive(Clone, Debug)]
#[must_use]
pub struct Page<T> {
    items: Vec<T>,
    index: u64,
    size: u64,
    total_elements: u64,
}

impl<T> Page<T> {
    /// Assemble a page from a fetched slice and a separately-counted total.
    pub fn new(items: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        Self {
            items,
            index: request.index,
            size: request.size,
            total_elements,
        }
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    #[must_use]
    pub fn index(&self) -> u64 {
        self.index
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    /// `ceil(total_elements / size)`; zero when the result set is empty.
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        if self.total_elements == 0 {
            return 0;
        }
        self.total_elements.div_ceil(self.size)
    }

    /// True for page zero, and for an empty result set on any index.
    #[must_use]
    pub fn is_first(&self) -> bool {
        self.index == 0 || self.total_elements == 0
    }

    /// True on the final page, and always true for an empty result set.
    #[must_use]
    pub fn is_last(&self) -> bool {
        !self.has_next()
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        self.index + 1 < self.total_pages()
    }

    #[must_use]
    pub fn has_previous(&self) -> bool {
        self.index > 0 && self.total_elements > 0
    }

    /// Convert the item type while keeping the window metadata.
    pub fn map<U, F: FnMut(T) -> U>(self, f: F) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            index: self.index,
            size: self.size,
            total_elements: self.total_elements,
        }
    }
}
