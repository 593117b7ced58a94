//! Criteria integration for `SeaORM`.
//!
//! This module provides:
//! - Criteria AST compilation to `sea_orm::Condition` via a per-entity
//!   [`FieldMap`]
//! - Ordering application from [`datakit_criteria::OrderBy`]
//! - Offset pagination with an independently-executed count query
//!
//! # Modules
//!
//! - `kind`: logical field types used for value coercion
//! - `core`: criteria to `SeaORM` translation (filters, ordering)
//! - `pager`: offset pagination builder and combiner

pub mod kind;

mod core;

pub mod pager;

pub use kind::FieldKind;

pub use core::{
    expr_to_condition, CriteriaBuildError, CriteriaBuildResult, CriteriaExt, Field, FieldMap,
    OrderExt,
};

pub(crate) use core::coerce_value;

pub use pager::{clamp_request, paginate_with_count, Paginator};
