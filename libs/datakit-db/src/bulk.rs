//! Bulk mutation executor.
//!
//! A [`BulkUpdate`] compiles to a single set-oriented UPDATE that bypasses
//! per-entity state. Because the statement never touches loaded snapshots,
//! [`BulkUpdate::execute`] always evicts the target entity type from the
//! session's identity map after the statement runs. Failed statements are
//! reported once and never retried.

use datakit_criteria::ast;
use sea_orm::sea_query::{Expr as SeaExpr, SimpleExpr};
use sea_orm::{ConnectionTrait, EntityTrait, QueryFilter};

use crate::criteria::{expr_to_condition, CriteriaBuildError, FieldKind, FieldMap};
use crate::error::AccessError;
use crate::session::Session;

/// One column assignment inside a bulk update.
#[derive(Clone, Debug)]
pub enum Assignment {
    /// `field = value`
    Set(String, ast::Value),
    /// `field = field + delta` (integer fields only)
    Add(String, i64),
}

impl Assignment {
    pub fn set(field: impl Into<String>, value: ast::Value) -> Self {
        Assignment::Set(field.into(), value)
    }

    pub fn add(field: impl Into<String>, delta: i64) -> Self {
        Assignment::Add(field.into(), delta)
    }

    fn field(&self) -> &str {
        match self {
            Assignment::Set(f, _) | Assignment::Add(f, _) => f,
        }
    }
}

/// Builder for a set-oriented UPDATE over entity `E`.
#[must_use]
pub struct BulkUpdate<'m, E: EntityTrait> {
    predicate: Option<ast::Expr>,
    assignments: Vec<Assignment>,
    fmap: &'m FieldMap<E>,
}

impl<'m, E> BulkUpdate<'m, E>
where
    E: EntityTrait,
    E::Column: Copy,
{
    pub fn new(fmap: &'m FieldMap<E>) -> Self {
        Self {
            predicate: None,
            assignments: Vec::new(),
            fmap,
        }
    }

    /// Restrict the update to rows matching the expression. Without a
    /// predicate the statement touches every row.
    pub fn filter(mut self, predicate: ast::Expr) -> Self {
        self.predicate = Some(predicate);
        self
    }

    pub fn assign(mut self, assignment: Assignment) -> Self {
        self.assignments.push(assignment);
        self
    }

    fn compile_assignment(
        &self,
        assignment: &Assignment,
    ) -> Result<(E::Column, SimpleExpr), CriteriaBuildError> {
        let name = assignment.field();
        let field = self
            .fmap
            .get(name)
            .ok_or_else(|| CriteriaBuildError::UnknownField(name.to_owned()))?;

        let expr = match assignment {
            Assignment::Set(_, value) => SeaExpr::value(crate::criteria::coerce_value(
                name, field.kind, value,
            )?),
            Assignment::Add(_, delta) => {
                if !matches!(field.kind, FieldKind::I32 | FieldKind::I64) {
                    return Err(CriteriaBuildError::TypeMismatch {
                        field: name.to_owned(),
                        expected: field.kind,
                        got: "int delta",
                    });
                }
                SeaExpr::col(field.col).add(*delta)
            }
        };

        Ok((field.col, expr))
    }

    /// Run the UPDATE through the session's connection and report the number
    /// of rows the store says it touched.
    ///
    /// The identity map entries for `E` are evicted whether or not any row
    /// matched; stale snapshots must not survive a bulk statement.
    ///
    /// # Errors
    /// Compilation failures (unknown field, bad value kind) surface before
    /// the round-trip; store failures are tagged with `bulk.update`.
    pub async fn execute<C: ConnectionTrait>(
        self,
        session: &Session<C>,
    ) -> Result<u64, AccessError> {
        let mut stmt = E::update_many();

        if let Some(predicate) = &self.predicate {
            stmt = stmt.filter(expr_to_condition::<E>(predicate, self.fmap)?);
        }

        for assignment in &self.assignments {
            let (col, expr) = self.compile_assignment(assignment)?;
            stmt = stmt.col_expr(col, expr);
        }

        let result = stmt
            .exec(session.conn())
            .await
            .map_err(|e| AccessError::from_db("bulk.update", e));

        session.evict_all::<E>();

        let result = result?;
        tracing::info!(
            entity = std::any::type_name::<E>(),
            rows_affected = result.rows_affected,
            "bulk update executed"
        );

        Ok(result.rows_affected)
    }
}
