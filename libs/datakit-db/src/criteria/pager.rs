//! Offset pagination with an independently-executed count query.
//!
//! The data query and the count query are kept separate on purpose: the data
//! query may carry prefetch joins (which can multiply rows before grouping),
//! while the count runs over a bare entity select with the same filter so the
//! total always reflects distinct root entities. Callers needing a different
//! total semantic (e.g. a hand-written native count) replace the count select
//! via [`Paginator::count_with`].

use datakit_criteria::page::{Page, PageRequest};
use datakit_criteria::Criteria;
use sea_orm::{ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect, Select};

use crate::config::AccessConfig;
use crate::criteria::{expr_to_condition, FieldMap, OrderExt};
use crate::error::AccessError;

/// Clamp the requested window size to the configured bounds, keeping the
/// index and sort untouched.
#[must_use]
pub fn clamp_request(config: &AccessConfig, request: PageRequest) -> PageRequest {
    PageRequest {
        size: config.clamp_page_size(request.size),
        ..request
    }
}

/// Builder pairing a data select with the count select used for totals.
#[must_use]
pub struct Paginator<'m, E: EntityTrait> {
    data: Select<E>,
    count: Select<E>,
    fmap: &'m FieldMap<E>,
}

impl<'m, E> Paginator<'m, E>
where
    E: EntityTrait,
    E::Column: Copy,
    E::Model: Send + Sync,
{
    /// Start from a data select (joins and prefetches welcome); the count
    /// defaults to a bare `E::find()` carrying the same filter.
    pub fn new(data: Select<E>, fmap: &'m FieldMap<E>) -> Self {
        Self {
            data,
            count: E::find(),
            fmap,
        }
    }

    /// Replace the count select. The criteria filter is still applied to it.
    pub fn count_with(mut self, count: Select<E>) -> Self {
        self.count = count;
        self
    }

    /// Execute both queries and assemble the page.
    ///
    /// The count query runs first; the window math (`total_pages`,
    /// `has_next`, ...) is derived from its result, never from the fetched
    /// slice length.
    ///
    /// # Errors
    /// Criteria compilation failures surface before any store round-trip;
    /// store errors are tagged with the issuing operation.
    pub async fn fetch<C: ConnectionTrait>(
        self,
        conn: &C,
        criteria: &Criteria,
        request: &PageRequest,
    ) -> Result<Page<E::Model>, AccessError> {
        let (mut data, mut count) = (self.data, self.count);

        if let Some(ast) = criteria.filter() {
            let cond = expr_to_condition::<E>(ast, self.fmap)?;
            data = data.filter(cond.clone());
            count = count.filter(cond);
        }

        let total = count
            .count(conn)
            .await
            .map_err(|e| AccessError::from_db("page.count", e))?;

        data = data.apply_order(&request.sort, self.fmap)?;

        let items = data
            .offset(request.offset())
            .limit(request.size)
            .all(conn)
            .await
            .map_err(|e| AccessError::from_db("page.fetch", e))?;

        tracing::debug!(
            index = request.index,
            size = request.size,
            total,
            fetched = items.len(),
            "page window resolved"
        );

        Ok(Page::new(items, request, total))
    }
}

/// One-shot pagination over a bare entity select.
///
/// # Errors
/// See [`Paginator::fetch`].
pub async fn paginate_with_count<E, C>(
    conn: &C,
    criteria: &Criteria,
    request: &PageRequest,
    fmap: &FieldMap<E>,
) -> Result<Page<E::Model>, AccessError>
where
    E: EntityTrait,
    E::Column: Copy,
    E::Model: Send + Sync,
    C: ConnectionTrait,
{
    Paginator::new(E::find(), fmap)
        .fetch(conn, criteria, request)
        .await
}
