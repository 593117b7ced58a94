//! Error taxonomy for the execution layer.
//!
//! Construction-time errors (unknown field, missing join under strict mode)
//! are raised before any store round-trip. Store-level errors pass through
//! unmodified as the `#[source]`, tagged with the originating operation, and
//! are never silently retried.

use thiserror::Error;

use crate::criteria::CriteriaBuildError;

/// Unified error for query, projection, pagination and bulk operations.
#[derive(Debug, Error)]
pub enum AccessError {
    /// A filter or sort referenced a field the entity schema does not expose.
    #[error("unknown query field: {0}")]
    InvalidQueryField(String),

    /// An order key referenced a field the entity schema does not expose.
    #[error("unsupported sort field: {0}")]
    InvalidSortField(String),

    /// A flat projection was requested without selecting any fields.
    #[error("projection '{shape}' selects no fields")]
    EmptySelection { shape: &'static str },

    /// A projection view was asked for a field outside its requested set.
    #[error("projection '{shape}' did not request field '{field}'")]
    ProjectionFieldNotRequested {
        shape: &'static str,
        field: String,
    },

    /// A requested projection field held a value of an unexpected kind.
    #[error("projection '{shape}' field '{field}' is not a {expected}")]
    ProjectionFieldType {
        shape: &'static str,
        field: String,
        expected: &'static str,
    },

    /// A nested projection needed a relation the originating query never
    /// joined, and strict projections are enabled.
    #[error("projection '{shape}' requires a join on relation '{relation}'")]
    MissingJoin {
        shape: &'static str,
        relation: &'static str,
    },

    /// The page window itself was malformed (zero size).
    #[error("page size must be positive")]
    InvalidPageSize,

    /// A single-result query matched zero rows.
    #[error("{entity} not found for predicate: {predicate}")]
    NotFound {
        entity: &'static str,
        predicate: String,
    },

    /// Store-level uniqueness or foreign-key violation, surfaced unchanged.
    #[error("constraint violation during {operation}")]
    ConstraintViolation {
        operation: &'static str,
        #[source]
        source: sea_orm::DbErr,
    },

    /// Any other store-level failure, tagged with the operation that issued it.
    #[error("database error during {operation}")]
    Db {
        operation: &'static str,
        #[source]
        source: sea_orm::DbErr,
    },

    /// Criteria compilation failure (type mismatch, unsupported form, ...).
    #[error(transparent)]
    Build(#[from] CriteriaBuildError),
}

impl AccessError {
    /// Wrap a `SeaORM` error, classifying uniqueness/FK violations so callers
    /// can react to them without string matching.
    #[must_use]
    pub fn from_db(operation: &'static str, source: sea_orm::DbErr) -> Self {
        use sea_orm::SqlErr;

        match source.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_) | SqlErr::ForeignKeyConstraintViolation(_)) => {
                AccessError::ConstraintViolation { operation, source }
            }
            _ => AccessError::Db { operation, source },
        }
    }
}

impl From<datakit_criteria::Error> for AccessError {
    fn from(err: datakit_criteria::Error) -> Self {
        match err {
            datakit_criteria::Error::InvalidQueryField(f) => AccessError::InvalidQueryField(f),
            datakit_criteria::Error::InvalidSortField(f) => AccessError::InvalidSortField(f),
            datakit_criteria::Error::InvalidPageSize => AccessError::InvalidPageSize,
        }
    }
}
