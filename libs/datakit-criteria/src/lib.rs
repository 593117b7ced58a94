pub mod page;
pub mod schema;

pub use page::{Page, PageRequest};
pub use schema::{FieldRef, Schema};

pub mod ast {
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    /// Structured filter expression over named fields.
    ///
    /// Built by callers (usually through [`crate::FieldRef`]) and compiled to
    /// a store-specific predicate by the execution layer. Comparison and
    /// membership forms always pair a field name with literal values; the
    /// translation layer validates the field against an entity schema.
    #[derive(Clone, Debug, PartialEq)]
    pub enum Expr {
        And(Box<Expr>, Box<Expr>),
        Or(Box<Expr>, Box<Expr>),
        Not(Box<Expr>),
        Compare(String, CompareOperator, Value),
        In(String, Vec<Value>),
        Like(String, MatchKind, String),
    }

    /// Substring match positions for [`Expr::Like`]; only valid on string
    /// fields.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum MatchKind {
        Contains,
        StartsWith,
        EndsWith,
    }

    impl Expr {
        /// Combine two expressions with AND: `expr1 and expr2`
        #[must_use]
        pub fn and(self, other: Expr) -> Expr {
            Expr::And(Box::new(self), Box::new(other))
        }

        /// Combine two expressions with OR: `expr1 or expr2`
        #[must_use]
        pub fn or(self, other: Expr) -> Expr {
            Expr::Or(Box::new(self), Box::new(other))
        }
    }

    impl std::ops::Not for Expr {
        type Output = Expr;

        fn not(self) -> Self::Output {
            Expr::Not(Box::new(self))
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum CompareOperator {
        Eq,
        Ne,
        Gt,
        Ge,
        Lt,
        Le,
    }

    #[derive(Clone, Debug, PartialEq)]
    pub enum Value {
        Null,
        Bool(bool),
        Int(i64),
        Float(f64),
        String(String),
        Uuid(Uuid),
        DateTime(DateTime<Utc>),
    }

    impl std::fmt::Display for Value {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Value::Null => write!(f, "null"),
                Value::Bool(_) => write!(f, "bool"),
                Value::Int(_) => write!(f, "int"),
                Value::Float(_) => write!(f, "float"),
                Value::String(_) => write!(f, "string"),
                Value::Uuid(_) => write!(f, "uuid"),
                Value::DateTime(_) => write!(f, "datetime"),
            }
        }
    }
}

// Ordering primitives
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SortDir {
    #[serde(rename = "asc")]
    Asc,
    #[serde(rename = "desc")]
    Desc,
}

impl SortDir {
    /// Reverse the sort direction (Asc <-> Desc)
    #[must_use]
    pub fn reverse(self) -> Self {
        match self {
            SortDir::Asc => SortDir::Desc,
            SortDir::Desc => SortDir::Asc,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderKey {
    pub field: String,
    pub dir: SortDir,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[must_use]
pub struct OrderBy(pub Vec<OrderKey>);

impl OrderBy {
    pub fn empty() -> Self {
        Self(vec![])
    }

    /// Single-key order: `OrderBy::by("username", SortDir::Desc)`
    pub fn by(field: impl Into<String>, dir: SortDir) -> Self {
        Self(vec![OrderKey {
            field: field.into(),
            dir,
        }])
    }

    /// Append another sort key with lower priority.
    pub fn then(mut self, field: impl Into<String>, dir: SortDir) -> Self {
        self.0.push(OrderKey {
            field: field.into(),
            dir,
        });
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append tiebreaker if missing
    pub fn ensure_tiebreaker(mut self, tiebreaker: &str, dir: SortDir) -> Self {
        if !self.0.iter().any(|k| k.field == tiebreaker) {
            self.0.push(OrderKey {
                field: tiebreaker.to_owned(),
                dir,
            });
        }
        self
    }
}

impl std::fmt::Display for OrderBy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.0.is_empty() {
            return write!(f, "(none)");
        }

        let formatted: Vec<String> = self
            .0
            .iter()
            .map(|key| {
                let dir_str = match key.dir {
                    SortDir::Asc => "asc",
                    SortDir::Desc => "desc",
                };
                format!("{} {}", key.field, dir_str)
            })
            .collect();

        write!(f, "{}", formatted.join(", "))
    }
}

/// Construction-time errors raised before any store round-trip.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("unknown query field: {0}")]
    InvalidQueryField(String),

    #[error("unsupported sort field: {0}")]
    InvalidSortField(String),

    #[error("page size must be positive")]
    InvalidPageSize,
}

/// The unified criteria value: optional filter, ordering and an optional
/// column selection, carried as one request object through the query API.
#[derive(Clone, Debug, Default)]
#[must_use]
pub struct Criteria {
    pub filter: Option<Box<ast::Expr>>,
    pub order: OrderBy,
    pub select: Option<Vec<String>>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, expr: ast::Expr) -> Self {
        self.filter = Some(Box::new(expr));
        self
    }

    pub fn with_order(mut self, order: OrderBy) -> Self {
        self.order = order;
        self
    }

    pub fn with_select(mut self, fields: Vec<String>) -> Self {
        self.select = Some(fields);
        self
    }

    /// Get filter as AST
    #[must_use]
    pub fn filter(&self) -> Option<&ast::Expr> {
        self.filter.as_deref()
    }

    /// Check if filter is present
    #[must_use]
    pub fn has_filter(&self) -> bool {
        self.filter.is_some()
    }

    /// Get selected fields
    #[must_use]
    pub fn selected_fields(&self) -> Option<&[String]> {
        self.select.as_deref()
    }
}

impl From<Option<ast::Expr>> for Criteria {
    fn from(opt: Option<ast::Expr>) -> Self {
        match opt {
            Some(e) => Self::default().with_filter(e),
            None => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ast::{CompareOperator, Expr, Value};
    use super::{Criteria, OrderBy, SortDir};

    #[test]
    fn expr_combinators_nest_as_written() {
        let a = Expr::Compare("age".into(), CompareOperator::Gt, Value::Int(20));
        let b = Expr::Compare(
            "username".into(),
            CompareOperator::Eq,
            Value::String("m1".into()),
        );

        let combined = a.clone().and(b.clone());
        assert_eq!(combined, Expr::And(Box::new(a), Box::new(b)));
    }

    #[test]
    fn order_by_ensure_tiebreaker_appends_when_missing() {
        let order = OrderBy::by("username", SortDir::Desc).ensure_tiebreaker("id", SortDir::Asc);

        assert_eq!(order.0.len(), 2);
        assert_eq!(order.0[1].field, "id");
        assert_eq!(order.0[1].dir, SortDir::Asc);
    }

    #[test]
    fn order_by_ensure_tiebreaker_does_not_duplicate() {
        let order = OrderBy::by("id", SortDir::Desc).ensure_tiebreaker("id", SortDir::Asc);

        assert_eq!(order.0.len(), 1);
        assert_eq!(order.0[0].dir, SortDir::Desc);
    }

    #[test]
    fn criteria_from_optional_expr() {
        let c = Criteria::from(None);
        assert!(!c.has_filter());

        let c = Criteria::from(Some(Expr::Compare(
            "age".into(),
            CompareOperator::Ge,
            Value::Int(0),
        )));
        assert!(c.has_filter());
    }
}
