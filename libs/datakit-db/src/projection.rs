//! Projection mapper: closed views over entity queries.
//!
//! A projection names the fields it wants up front; the generated query
//! selects only those columns and the resulting [`SparseRow`] refuses access
//! to anything outside the requested set. Rows travel as alias-keyed JSON
//! objects, so native statements stay correct when a query reorders its
//! columns.

use std::collections::BTreeSet;

use datakit_criteria::page::{Page, PageRequest};
use datakit_criteria::Criteria;
use sea_orm::{
    ConnectionTrait, EntityTrait, FromQueryResult, JsonValue, QuerySelect, Select, Statement,
};
use serde_json::Map as JsonMap;
use tokio::sync::OnceCell;

use crate::config::AccessConfig;
use crate::criteria::{CriteriaExt, FieldMap};
use crate::error::AccessError;

static JSON_NULL: JsonValue = JsonValue::Null;

/// One materialized projection row, restricted to its requested fields.
///
/// Lookups are case-insensitive on the alias. Asking for a field the
/// projection never requested is a programming error and fails with
/// [`AccessError::ProjectionFieldNotRequested`] instead of returning a
/// default.
#[derive(Clone, Debug)]
pub struct SparseRow {
    shape: &'static str,
    requested: BTreeSet<String>,
    values: JsonMap<String, JsonValue>,
}

impl SparseRow {
    pub(crate) fn new<S: AsRef<str>>(shape: &'static str, requested: &[S], source: JsonValue) -> Self {
        let requested: BTreeSet<String> =
            requested.iter().map(|f| f.as_ref().to_lowercase()).collect();

        let mut values = JsonMap::new();
        if let JsonValue::Object(obj) = source {
            for (key, value) in obj {
                let key = key.to_lowercase();
                if requested.contains(&key) {
                    values.insert(key, value);
                }
            }
        }

        Self {
            shape,
            requested,
            values,
        }
    }

    #[must_use]
    pub fn shape(&self) -> &'static str {
        self.shape
    }

    /// Raw JSON value of a requested field; `Null` when the store returned
    /// no value under that alias.
    ///
    /// # Errors
    /// [`AccessError::ProjectionFieldNotRequested`] for fields outside the
    /// projection's requested set.
    pub fn value(&self, field: &str) -> Result<&JsonValue, AccessError> {
        let key = field.to_lowercase();
        if !self.requested.contains(&key) {
            return Err(AccessError::ProjectionFieldNotRequested {
                shape: self.shape,
                field: field.to_owned(),
            });
        }
        Ok(self.values.get(&key).unwrap_or(&JSON_NULL))
    }

    /// # Errors
    /// See [`SparseRow::value`]; additionally fails when the value is not a
    /// string.
    pub fn str_field(&self, field: &str) -> Result<&str, AccessError> {
        self.value(field)?
            .as_str()
            .ok_or_else(|| AccessError::ProjectionFieldType {
                shape: self.shape,
                field: field.to_owned(),
                expected: "string",
            })
    }

    /// # Errors
    /// See [`SparseRow::value`]; additionally fails when the value is not an
    /// integer.
    pub fn i64_field(&self, field: &str) -> Result<i64, AccessError> {
        self.value(field)?
            .as_i64()
            .ok_or_else(|| AccessError::ProjectionFieldType {
                shape: self.shape,
                field: field.to_owned(),
                expected: "integer",
            })
    }
}

/// Run a flat (single-entity) projection driven by a [`Criteria`] value: its
/// filter restricts the rows and its selection names the columns, aliased by
/// their public field names.
///
/// # Errors
/// A missing or empty selection and unknown fields fail before the
/// round-trip; store failures are tagged with `projection.fetch`.
pub async fn fetch_flat<E, C>(
    conn: &C,
    select: Select<E>,
    shape: &'static str,
    criteria: &Criteria,
    fmap: &FieldMap<E>,
) -> Result<Vec<SparseRow>, AccessError>
where
    E: EntityTrait,
    E::Column: Copy,
    C: ConnectionTrait,
{
    let fields = match criteria.selected_fields() {
        Some(fields) if !fields.is_empty() => fields,
        _ => return Err(AccessError::EmptySelection { shape }),
    };

    let mut query = select.apply_criteria_filter(criteria, fmap)?.select_only();
    for name in fields {
        let field = fmap
            .get(name)
            .ok_or_else(|| AccessError::InvalidQueryField(name.clone()))?;
        query = query.column_as(field.col, name.to_lowercase());
    }

    tracing::trace!(shape, ?fields, "flat projection query built");

    let rows = query
        .into_json()
        .all(conn)
        .await
        .map_err(|e| AccessError::from_db("projection.fetch", e))?;

    Ok(rows
        .into_iter()
        .map(|row| SparseRow::new(shape, fields, row))
        .collect())
}

/// Flat projection materialized straight into a caller-owned DTO via an
/// explicit constructor.
///
/// # Errors
/// See [`fetch_flat`]; constructor failures propagate as-is.
pub async fn fetch_dto<E, C, T, F>(
    conn: &C,
    select: Select<E>,
    shape: &'static str,
    criteria: &Criteria,
    fmap: &FieldMap<E>,
    ctor: F,
) -> Result<Vec<T>, AccessError>
where
    E: EntityTrait,
    E::Column: Copy,
    C: ConnectionTrait,
    F: Fn(&SparseRow) -> Result<T, AccessError>,
{
    let rows = fetch_flat(conn, select, shape, criteria, fmap).await?;
    rows.iter().map(|row| ctor(row)).collect()
}

/// Run a hand-written native statement and bind its result rows by column
/// alias, so the projection survives column reordering in the SQL text.
///
/// # Errors
/// Store failures are tagged with `projection.native`.
pub async fn fetch_native<C>(
    conn: &C,
    stmt: Statement,
    shape: &'static str,
    fields: &[&str],
) -> Result<Vec<SparseRow>, AccessError>
where
    C: ConnectionTrait,
{
    let rows = JsonValue::find_by_statement(stmt)
        .all(conn)
        .await
        .map_err(|e| AccessError::from_db("projection.native", e))?;

    Ok(rows
        .into_iter()
        .map(|row| SparseRow::new(shape, fields, row))
        .collect())
}

/// Native projection with totals: the caller supplies the windowed data
/// statement and a separate count statement whose first column is the total.
///
/// # Errors
/// Store failures are tagged with `projection.native` / `native.count`.
pub async fn paginate_native<C>(
    conn: &C,
    data: Statement,
    count: Statement,
    shape: &'static str,
    fields: &[&str],
    request: &PageRequest,
) -> Result<Page<SparseRow>, AccessError>
where
    C: ConnectionTrait,
{
    let total = match conn
        .query_one(count)
        .await
        .map_err(|e| AccessError::from_db("native.count", e))?
    {
        Some(row) => {
            let n: i64 = row
                .try_get_by_index(0)
                .map_err(|e| AccessError::from_db("native.count", e))?;
            u64::try_from(n).unwrap_or_default()
        }
        None => 0,
    };

    let items = fetch_native(conn, data, shape, fields).await?;
    Ok(Page::new(items, request, total))
}

/// A nested relation slot inside a projection view.
///
/// Holds the related value when the originating query joined it, or defers to
/// a follow-up fetch on first access. The fetched value is cached per view
/// instance.
pub struct LazyRef<V> {
    cell: OnceCell<V>,
}

impl<V> LazyRef<V> {
    /// Slot populated eagerly, usually from a joined query.
    #[must_use]
    pub fn loaded(value: V) -> Self {
        Self {
            cell: OnceCell::new_with(Some(value)),
        }
    }

    /// Empty slot; the first [`LazyRef::get_or_fetch`] pays the extra query.
    #[must_use]
    pub fn deferred() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// The value, if already resolved.
    #[must_use]
    pub fn get(&self) -> Option<&V> {
        self.cell.get()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }

    /// Resolve the slot, running `fetch` at most once per view instance.
    ///
    /// # Errors
    /// Whatever the fetch future reports.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<&V, AccessError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, AccessError>>,
    {
        self.cell.get_or_try_init(fetch).await
    }
}

impl<V: std::fmt::Debug> std::fmt::Debug for LazyRef<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.cell.get() {
            Some(v) => f.debug_tuple("LazyRef").field(v).finish(),
            None => f.write_str("LazyRef(<deferred>)"),
        }
    }
}

/// Build the nested slot for a view from an optionally-joined relation value.
///
/// Under `strict_projections` a missing join is a construction-time error;
/// otherwise the slot defers to a lazy fetch.
///
/// # Errors
/// [`AccessError::MissingJoin`] when strict and the relation was not joined.
pub fn nested_source<V>(
    config: &AccessConfig,
    shape: &'static str,
    relation: &'static str,
    joined: Option<V>,
) -> Result<LazyRef<V>, AccessError> {
    match joined {
        Some(value) => Ok(LazyRef::loaded(value)),
        None if config.strict_projections => Err(AccessError::MissingJoin { shape, relation }),
        None => Ok(LazyRef::deferred()),
    }
}

#[cfg(test)]
#[cfg(feature = "sqlite")]
mod tests {
    use super::{fetch_flat, fetch_native, nested_source, paginate_native, LazyRef, SparseRow};
    use crate::config::AccessConfig;
    use crate::criteria::{FieldKind, FieldMap};
    use crate::error::AccessError;
    use datakit_criteria::ast::{CompareOperator, Expr, Value};
    use datakit_criteria::page::PageRequest;
    use datakit_criteria::Criteria;
    use sea_orm::entity::prelude::*;
    use sea_orm::{Database, DatabaseBackend, Set, Statement};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "projection_tests")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i64,
        pub username: String,
        pub age: i32,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}

    fn field_map() -> FieldMap<Entity> {
        FieldMap::<Entity>::new()
            .insert("id", Column::Id, FieldKind::I64)
            .insert("username", Column::Username, FieldKind::String)
            .insert("age", Column::Age, FieldKind::I32)
    }

    async fn seeded_db() -> anyhow::Result<DatabaseConnection> {
        let db = Database::connect("sqlite::memory:").await?;
        db.execute_unprepared(
            "CREATE TABLE projection_tests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT NOT NULL,
                age INTEGER NOT NULL
            )",
        )
        .await?;

        for (name, age) in [("member1", 10), ("member2", 20)] {
            ActiveModel {
                username: Set(name.to_owned()),
                age: Set(age),
                ..Default::default()
            }
            .insert(&db)
            .await?;
        }

        Ok(db)
    }

    #[test]
    fn sparse_row_denies_unrequested_fields() {
        let row = SparseRow::new(
            "UsernameOnly",
            &["username"],
            json!({"username": "m1", "age": 10}),
        );

        assert_eq!(row.str_field("username").unwrap(), "m1");
        let err = row.value("age").unwrap_err();
        assert!(matches!(
            err,
            AccessError::ProjectionFieldNotRequested { shape: "UsernameOnly", field } if field == "age"
        ));
    }

    #[test]
    fn sparse_row_lookups_are_case_insensitive() {
        let row = SparseRow::new("V", &["Username"], json!({"USERNAME": "m1"}));
        assert_eq!(row.str_field("username").unwrap(), "m1");
    }

    #[test]
    fn requested_but_absent_field_reads_as_null() {
        let row = SparseRow::new("V", &["username"], json!({}));
        assert!(row.value("username").unwrap().is_null());
        assert!(row.str_field("username").is_err());
    }

    #[tokio::test]
    async fn flat_projection_selects_only_requested_columns() -> anyhow::Result<()> {
        let db = seeded_db().await?;
        let criteria = Criteria::new().with_select(vec!["username".to_owned()]);

        let rows = fetch_flat(&db, Entity::find(), "UsernameOnly", &criteria, &field_map()).await?;

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].str_field("username")?, "member1");
        assert!(rows[0].value("age").is_err());
        Ok(())
    }

    #[tokio::test]
    async fn flat_projection_honors_the_criteria_filter() -> anyhow::Result<()> {
        let db = seeded_db().await?;
        let criteria = Criteria::new()
            .with_filter(Expr::Compare(
                "age".to_owned(),
                CompareOperator::Ge,
                Value::Int(20),
            ))
            .with_select(vec!["username".to_owned()]);

        let rows = fetch_flat(&db, Entity::find(), "UsernameOnly", &criteria, &field_map()).await?;

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].str_field("username")?, "member2");
        Ok(())
    }

    #[tokio::test]
    async fn flat_projection_without_a_selection_is_an_error() -> anyhow::Result<()> {
        let db = seeded_db().await?;

        let err = fetch_flat(&db, Entity::find(), "V", &Criteria::new(), &field_map())
            .await
            .unwrap_err();

        assert!(matches!(err, AccessError::EmptySelection { shape: "V" }));
        Ok(())
    }

    #[tokio::test]
    async fn flat_projection_rejects_unknown_fields_up_front() -> anyhow::Result<()> {
        let db = seeded_db().await?;
        let criteria = Criteria::new().with_select(vec!["nope".to_owned()]);

        let err = fetch_flat(&db, Entity::find(), "V", &criteria, &field_map())
            .await
            .unwrap_err();

        assert!(matches!(err, AccessError::InvalidQueryField(f) if f == "nope"));
        Ok(())
    }

    #[tokio::test]
    async fn native_rows_bind_by_alias_not_position() -> anyhow::Result<()> {
        let db = seeded_db().await?;

        // Columns deliberately listed age-first; binding stays alias-driven.
        let stmt = Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "SELECT age AS age, username AS username FROM projection_tests WHERE username = ?",
            ["member2".into()],
        );

        let rows = fetch_native(&db, stmt, "MemberRow", &["username", "age"]).await?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].str_field("username")?, "member2");
        assert_eq!(rows[0].i64_field("age")?, 20);
        Ok(())
    }

    #[tokio::test]
    async fn native_pagination_uses_the_count_statement() -> anyhow::Result<()> {
        let db = seeded_db().await?;
        let request = PageRequest::of(0, 1)?;

        let data = Statement::from_sql_and_values(
            DatabaseBackend::Sqlite,
            "SELECT username AS username FROM projection_tests ORDER BY username LIMIT ? OFFSET ?",
            [
                i64::try_from(request.size).unwrap_or(i64::MAX).into(),
                i64::try_from(request.offset()).unwrap_or(i64::MAX).into(),
            ],
        );
        let count = Statement::from_string(
            DatabaseBackend::Sqlite,
            "SELECT COUNT(*) FROM projection_tests",
        );

        let page = paginate_native(&db, data, count, "MemberRow", &["username"], &request).await?;

        assert_eq!(page.items().len(), 1);
        assert_eq!(page.total_elements(), 2);
        assert_eq!(page.total_pages(), 2);
        assert!(page.has_next());
        Ok(())
    }

    #[tokio::test]
    async fn lazy_ref_fetches_once() -> anyhow::Result<()> {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let slot: LazyRef<String> = LazyRef::deferred();
        assert!(!slot.is_loaded());

        let calls = AtomicUsize::new(0);
        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok("team-a".to_owned())
        };

        assert_eq!(slot.get_or_fetch(fetch).await?, "team-a");
        assert_eq!(slot.get_or_fetch(fetch).await?, "team-a");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(slot.is_loaded());
        Ok(())
    }

    #[test]
    fn strict_mode_turns_a_missing_join_into_an_error() {
        let lenient = AccessConfig::default();
        let strict = AccessConfig {
            strict_projections: true,
            ..AccessConfig::default()
        };

        assert!(nested_source::<()>(&lenient, "Nested", "team", None).is_ok());

        let err = nested_source::<()>(&strict, "Nested", "team", None).unwrap_err();
        assert!(matches!(
            err,
            AccessError::MissingJoin {
                shape: "Nested",
                relation: "team"
            }
        ));
    }
}
