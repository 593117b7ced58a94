//! Typed field references for criteria construction.
//!
//! - `Schema` trait: maps field enums to public field names
//! - `FieldRef`: type-safe field references with compile-time type checking
//!
//! These types are description-level abstractions independent of any store.

use crate::ast::{CompareOperator, Expr, MatchKind, Value};
use crate::{OrderBy, SortDir};
use std::marker::PhantomData;

/// Schema trait defining field enums and their string mappings.
///
/// Implement this trait for your entity schemas to enable type-safe criteria
/// building.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Copy, Clone, Eq, PartialEq)]
/// enum MemberField {
///     Username,
///     Age,
/// }
///
/// struct MemberSchema;
///
/// impl Schema for MemberSchema {
///     type Field = MemberField;
///
///     fn field_name(field: Self::Field) -> &'static str {
///         match field {
///             MemberField::Username => "username",
///             MemberField::Age => "age",
///         }
///     }
/// }
/// ```
pub trait Schema {
    /// The field enum type (must be Copy + Eq)
    type Field: Copy + Eq;

    /// Map a field enum to its string name
    fn field_name(field: Self::Field) -> &'static str;
}

/// Type-safe field reference holding schema and Rust type information.
///
/// The generic type parameter `T` is a phantom type used only for
/// compile-time validation of operations and is not part of the field
/// identity.
pub struct FieldRef<S: Schema, T> {
    field: S::Field,
    _phantom: PhantomData<(S, T)>,
}

impl<S: Schema, T> FieldRef<S, T> {
    /// Create a new typed field reference.
    ///
    /// ```rust,ignore
    /// const USERNAME: FieldRef<MemberSchema, String> = FieldRef::new(MemberField::Username);
    /// ```
    #[must_use]
    pub const fn new(field: S::Field) -> Self {
        Self {
            field,
            _phantom: PhantomData,
        }
    }

    /// Get the field name as a string.
    #[must_use]
    pub fn name(&self) -> &'static str {
        S::field_name(self.field)
    }
}

impl<S: Schema, T> Clone for FieldRef<S, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<S: Schema, T> Copy for FieldRef<S, T> {}

impl<S: Schema, T> std::fmt::Debug for FieldRef<S, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRef")
            .field("field", &self.name())
            .finish()
    }
}

impl<S: Schema, T> PartialEq for FieldRef<S, T> {
    fn eq(&self, other: &Self) -> bool {
        self.field == other.field
    }
}

impl<S: Schema, T> Eq for FieldRef<S, T> {}

/// Trait for types that can be converted to criteria AST values.
pub trait IntoCriteriaValue {
    /// Convert this value into a criteria AST value.
    fn into_criteria_value(self) -> Value;
}

impl IntoCriteriaValue for bool {
    fn into_criteria_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoCriteriaValue for uuid::Uuid {
    fn into_criteria_value(self) -> Value {
        Value::Uuid(self)
    }
}

impl IntoCriteriaValue for String {
    fn into_criteria_value(self) -> Value {
        Value::String(self)
    }
}

impl IntoCriteriaValue for &str {
    fn into_criteria_value(self) -> Value {
        Value::String(self.to_owned())
    }
}

impl IntoCriteriaValue for i32 {
    fn into_criteria_value(self) -> Value {
        Value::Int(self.into())
    }
}

impl IntoCriteriaValue for i64 {
    fn into_criteria_value(self) -> Value {
        Value::Int(self)
    }
}

impl IntoCriteriaValue for f64 {
    fn into_criteria_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoCriteriaValue for chrono::DateTime<chrono::Utc> {
    fn into_criteria_value(self) -> Value {
        Value::DateTime(self)
    }
}

/// Comparison operations for any field type.
impl<S: Schema, T> FieldRef<S, T> {
    fn compare<V: IntoCriteriaValue>(self, op: CompareOperator, value: V) -> Expr {
        Expr::Compare(self.name().to_owned(), op, value.into_criteria_value())
    }

    /// Equality comparison: `field = value`
    #[must_use]
    pub fn eq<V: IntoCriteriaValue>(self, value: V) -> Expr {
        self.compare(CompareOperator::Eq, value)
    }

    /// Not-equal comparison: `field <> value`
    #[must_use]
    pub fn ne<V: IntoCriteriaValue>(self, value: V) -> Expr {
        self.compare(CompareOperator::Ne, value)
    }

    /// Greater-than comparison: `field > value`
    #[must_use]
    pub fn gt<V: IntoCriteriaValue>(self, value: V) -> Expr {
        self.compare(CompareOperator::Gt, value)
    }

    /// Greater-than-or-equal comparison: `field >= value`
    #[must_use]
    pub fn ge<V: IntoCriteriaValue>(self, value: V) -> Expr {
        self.compare(CompareOperator::Ge, value)
    }

    /// Less-than comparison: `field < value`
    #[must_use]
    pub fn lt<V: IntoCriteriaValue>(self, value: V) -> Expr {
        self.compare(CompareOperator::Lt, value)
    }

    /// Less-than-or-equal comparison: `field <= value`
    #[must_use]
    pub fn le<V: IntoCriteriaValue>(self, value: V) -> Expr {
        self.compare(CompareOperator::Le, value)
    }

    /// Set membership: `field IN (values...)`. An empty list is legal and
    /// compiles to a predicate matching zero rows.
    #[must_use]
    pub fn is_in<V, I>(self, values: I) -> Expr
    where
        V: IntoCriteriaValue,
        I: IntoIterator<Item = V>,
    {
        Expr::In(
            self.name().to_owned(),
            values
                .into_iter()
                .map(IntoCriteriaValue::into_criteria_value)
                .collect(),
        )
    }

    /// Null check: `field IS NULL`
    #[must_use]
    pub fn is_null(self) -> Expr {
        Expr::Compare(self.name().to_owned(), CompareOperator::Eq, Value::Null)
    }

    /// Not-null check: `field IS NOT NULL`
    #[must_use]
    pub fn is_not_null(self) -> Expr {
        Expr::Compare(self.name().to_owned(), CompareOperator::Ne, Value::Null)
    }

    /// Ascending sort key for this field.
    #[must_use]
    pub fn asc(self) -> OrderBy {
        OrderBy::by(self.name(), SortDir::Asc)
    }

    /// Descending sort key for this field.
    #[must_use]
    pub fn desc(self) -> OrderBy {
        OrderBy::by(self.name(), SortDir::Desc)
    }
}

/// String-specific operations (only available for String fields).
impl<S: Schema> FieldRef<S, String> {
    /// Substring match: `field LIKE %value%`
    #[must_use]
    pub fn contains(self, substring: &str) -> Expr {
        Expr::Like(
            self.name().to_owned(),
            MatchKind::Contains,
            substring.to_owned(),
        )
    }

    /// Prefix match: `field LIKE value%`
    #[must_use]
    pub fn starts_with(self, prefix: &str) -> Expr {
        Expr::Like(
            self.name().to_owned(),
            MatchKind::StartsWith,
            prefix.to_owned(),
        )
    }

    /// Suffix match: `field LIKE %value`
    #[must_use]
    pub fn ends_with(self, suffix: &str) -> Expr {
        Expr::Like(
            self.name().to_owned(),
            MatchKind::EndsWith,
            suffix.to_owned(),
        )
    }
}
