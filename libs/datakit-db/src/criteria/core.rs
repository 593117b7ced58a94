//! Criteria AST → `sea_orm::Condition` compiler (AST in, SQL out).
//!
//! Construction belongs to callers via `datakit_criteria`; this module only
//! consumes `datakit_criteria::ast::Expr` and never issues a store round-trip.

use std::collections::HashMap;

use datakit_criteria::ast::{self, CompareOperator, MatchKind};
use datakit_criteria::{Criteria, OrderBy, SortDir};
use sea_orm::sea_query::{Expr as SeaExpr, Order};
use sea_orm::{ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder};
use thiserror::Error;

use crate::criteria::FieldKind;

/// One mapped entity field: column handle plus its logical kind.
#[derive(Clone)]
pub struct Field<E: EntityTrait> {
    pub col: E::Column,
    pub kind: FieldKind,
}

/// Public-field-name → entity-column mapping for one entity.
///
/// Field names are matched case-insensitively, the way callers spell them in
/// criteria and sort keys.
#[derive(Clone)]
#[must_use]
pub struct FieldMap<E: EntityTrait> {
    map: HashMap<String, Field<E>>,
}

impl<E: EntityTrait> Default for FieldMap<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EntityTrait> FieldMap<E> {
    pub fn new() -> Self {
        Self {
            map: HashMap::new(),
        }
    }

    pub fn insert(mut self, api_name: impl Into<String>, col: E::Column, kind: FieldKind) -> Self {
        self.map
            .insert(api_name.into().to_lowercase(), Field { col, kind });
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field<E>> {
        self.map.get(&name.to_lowercase())
    }
}

#[derive(Debug, Error, Clone)]
pub enum CriteriaBuildError {
    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("type mismatch on field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: FieldKind,
        got: &'static str,
    },

    #[error("unsupported operator for null comparison: {0:?}")]
    UnsupportedNullOp(CompareOperator),

    #[error("string match on non-string field: {0}")]
    NonStringMatch(String),
}

pub type CriteriaBuildResult<T> = Result<T, CriteriaBuildError>;

/* ---------- coercion helpers ---------- */

pub(crate) fn coerce_value(
    field: &str,
    kind: FieldKind,
    v: &ast::Value,
) -> CriteriaBuildResult<sea_orm::Value> {
    use ast::Value as V;

    let mismatch = |got: &'static str| CriteriaBuildError::TypeMismatch {
        field: field.to_owned(),
        expected: kind,
        got,
    };

    Ok(match (kind, v) {
        (FieldKind::String, V::String(s)) => sea_orm::Value::String(Some(Box::new(s.clone()))),

        (FieldKind::I32, V::Int(n)) => {
            let i = i32::try_from(*n).map_err(|_| mismatch("int (out of i32 range)"))?;
            sea_orm::Value::Int(Some(i))
        }

        (FieldKind::I64, V::Int(n)) => sea_orm::Value::BigInt(Some(*n)),

        (FieldKind::F64, V::Float(f)) => sea_orm::Value::Double(Some(*f)),
        (FieldKind::F64, V::Int(n)) => {
            // Integer literals are acceptable for float columns.
            #[allow(clippy::cast_precision_loss)]
            sea_orm::Value::Double(Some(*n as f64))
        }

        (FieldKind::Bool, V::Bool(b)) => sea_orm::Value::Bool(Some(*b)),

        (FieldKind::Uuid, V::Uuid(u)) => sea_orm::Value::Uuid(Some(Box::new(*u))),

        (FieldKind::DateTimeUtc, V::DateTime(dt)) => {
            sea_orm::Value::ChronoDateTimeUtc(Some(Box::new(*dt)))
        }

        (_, V::Null) => return Err(mismatch("null")),
        (_, V::String(_)) => return Err(mismatch("string")),
        (_, V::Int(_)) => return Err(mismatch("int")),
        (_, V::Float(_)) => return Err(mismatch("float")),
        (_, V::Bool(_)) => return Err(mismatch("bool")),
        (_, V::Uuid(_)) => return Err(mismatch("uuid")),
        (_, V::DateTime(_)) => return Err(mismatch("datetime")),
    })
}

fn coerce_many(
    field: &str,
    kind: FieldKind,
    items: &[ast::Value],
) -> CriteriaBuildResult<Vec<sea_orm::Value>> {
    items.iter().map(|v| coerce_value(field, kind, v)).collect()
}

/* ---------- LIKE helpers ---------- */

fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '%' | '_' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            c => out.push(c),
        }
    }
    out
}

fn like_pattern(kind: MatchKind, s: &str) -> String {
    match kind {
        MatchKind::Contains => format!("%{}%", like_escape(s)),
        MatchKind::StartsWith => format!("{}%", like_escape(s)),
        MatchKind::EndsWith => format!("%{}", like_escape(s)),
    }
}

/* ---------- Expr (AST) -> Condition ---------- */

/// Convert a criteria filter expression AST to a `SeaORM` Condition.
///
/// Pure translation: no store round-trip, no side effects.
///
/// # Errors
/// Returns `CriteriaBuildError` if the expression references unknown fields or
/// carries values of the wrong kind.
pub fn expr_to_condition<E: EntityTrait>(
    expr: &ast::Expr,
    fmap: &FieldMap<E>,
) -> CriteriaBuildResult<Condition>
where
    E::Column: ColumnTrait + Copy,
{
    use ast::Expr as X;

    Ok(match expr {
        X::And(a, b) => {
            let left = expr_to_condition::<E>(a, fmap)?;
            let right = expr_to_condition::<E>(b, fmap)?;
            Condition::all().add(left).add(right) // AND
        }
        X::Or(a, b) => {
            let left = expr_to_condition::<E>(a, fmap)?;
            let right = expr_to_condition::<E>(b, fmap)?;
            Condition::any().add(left).add(right) // OR
        }
        X::Not(x) => {
            let inner = expr_to_condition::<E>(x, fmap)?;
            Condition::all().add(inner).not()
        }

        X::Compare(name, op, value) => {
            let field = fmap
                .get(name)
                .ok_or_else(|| CriteriaBuildError::UnknownField(name.clone()))?;
            let col = field.col;

            // null handling
            if matches!(value, ast::Value::Null) {
                return Ok(match op {
                    CompareOperator::Eq => Condition::all().add(SeaExpr::col(col).is_null()),
                    CompareOperator::Ne => Condition::all().add(SeaExpr::col(col).is_not_null()),
                    _ => return Err(CriteriaBuildError::UnsupportedNullOp(*op)),
                });
            }

            let value = coerce_value(name, field.kind, value)?;
            let expr = match op {
                CompareOperator::Eq => SeaExpr::col(col).eq(value),
                CompareOperator::Ne => SeaExpr::col(col).ne(value),
                CompareOperator::Gt => SeaExpr::col(col).gt(value),
                CompareOperator::Ge => SeaExpr::col(col).gte(value),
                CompareOperator::Lt => SeaExpr::col(col).lt(value),
                CompareOperator::Le => SeaExpr::col(col).lte(value),
            };
            Condition::all().add(expr)
        }

        X::In(name, list) => {
            let f = fmap
                .get(name)
                .ok_or_else(|| CriteriaBuildError::UnknownField(name.clone()))?;
            let col = f.col;
            let vals = coerce_many(name, f.kind, list)?;
            if vals.is_empty() {
                // IN () → always false, deterministically zero rows
                Condition::all().add(SeaExpr::cust("1=0"))
            } else {
                Condition::all().add(SeaExpr::col(col).is_in(vals))
            }
        }

        X::Like(name, kind, s) => {
            let f = fmap
                .get(name)
                .ok_or_else(|| CriteriaBuildError::UnknownField(name.clone()))?;
            if f.kind != FieldKind::String {
                return Err(CriteriaBuildError::NonStringMatch(name.clone()));
            }
            Condition::all().add(SeaExpr::col(f.col).like(like_pattern(*kind, s)))
        }
    })
}

/// Apply an optional criteria filter to a plain `SeaORM` Select<E>.
pub trait CriteriaExt<E: EntityTrait>: Sized {
    /// Apply the criteria filter to the query.
    ///
    /// # Errors
    /// Returns `CriteriaBuildError` if the filter contains unknown fields or
    /// invalid expressions.
    fn apply_criteria_filter(
        self,
        criteria: &Criteria,
        fld_map: &FieldMap<E>,
    ) -> CriteriaBuildResult<Self>;
}

impl<E> CriteriaExt<E> for sea_orm::Select<E>
where
    E: EntityTrait,
    E::Column: ColumnTrait + Copy,
{
    fn apply_criteria_filter(
        self,
        criteria: &Criteria,
        fld_map: &FieldMap<E>,
    ) -> CriteriaBuildResult<Self> {
        match criteria.filter() {
            Some(ast) => {
                let cond = expr_to_condition::<E>(ast, fld_map)?;
                Ok(self.filter(cond))
            }
            None => Ok(self),
        }
    }
}

/// Extension trait for applying ordering from an [`OrderBy`].
pub trait OrderExt<E: EntityTrait>: Sized {
    /// Apply ordering to the query.
    ///
    /// # Errors
    /// Returns `datakit_criteria::Error::InvalidSortField` if an unknown field
    /// is referenced.
    fn apply_order(
        self,
        order: &OrderBy,
        fld_map: &FieldMap<E>,
    ) -> Result<Self, datakit_criteria::Error>;
}

impl<E> OrderExt<E> for sea_orm::Select<E>
where
    E: EntityTrait,
    E::Column: ColumnTrait + Copy,
{
    fn apply_order(
        self,
        order: &OrderBy,
        fld_map: &FieldMap<E>,
    ) -> Result<Self, datakit_criteria::Error> {
        let mut query = self;

        for order_key in &order.0 {
            let field = fld_map
                .get(&order_key.field)
                .ok_or_else(|| datakit_criteria::Error::InvalidSortField(order_key.field.clone()))?;

            let sea_order = match order_key.dir {
                SortDir::Asc => Order::Asc,
                SortDir::Desc => Order::Desc,
            };

            query = query.order_by(field.col, sea_order);
        }

        Ok(query)
    }
}
