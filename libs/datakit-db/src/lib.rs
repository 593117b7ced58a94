//! Datakit database execution layer.
//!
//! This crate executes [`datakit_criteria`] requests against a relational
//! store through `SeaORM` (`SQLite`, `PostgreSQL`, `MySQL` behind features):
//! criteria compilation to `sea_orm::Condition`, offset pagination with an
//! independent count query, partial-column projections, set-based bulk
//! mutations, and a per-unit-of-work session with an identity map.
//!
//! # Features
//! - `pg`, `mysql`, `sqlite`: enable the corresponding backend

#![cfg_attr(
    not(any(feature = "pg", feature = "mysql", feature = "sqlite")),
    allow(
        unused_imports,
        unused_variables,
        dead_code,
        unreachable_code,
        unused_lifetimes,
        clippy::unused_async,
    )
)]

pub use sea_orm::ConnectionTrait as DbConnTrait;

// Core modules
pub mod bulk;
pub mod config;
pub mod criteria;
pub mod error;
pub mod projection;
pub mod session;

// Internal modules
mod pool_opts;

pub use bulk::{Assignment, BulkUpdate};
pub use config::{AccessConfig, FetchPolicy};
pub use criteria::{CriteriaBuildError, FieldKind, FieldMap};
pub use error::AccessError;
pub use projection::{LazyRef, SparseRow};
pub use session::Session;

use std::time::Duration;

#[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
use pool_opts::ApplyPoolOpts;

#[cfg(feature = "mysql")]
use sea_orm::sqlx::mysql::MySqlPoolOptions;
#[cfg(feature = "pg")]
use sea_orm::sqlx::postgres::PgPoolOptions;
#[cfg(feature = "sqlite")]
use sea_orm::sqlx::sqlite::SqlitePoolOptions;

use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
#[cfg(feature = "mysql")]
use sea_orm::SqlxMySqlConnector;
#[cfg(feature = "pg")]
use sea_orm::SqlxPostgresConnector;
#[cfg(feature = "sqlite")]
use sea_orm::SqlxSqliteConnector;

use thiserror::Error;

/// Library-local result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Typed error for the DB handle and helpers.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Unknown DSN: {0}")]
    UnknownDsn(String),

    #[error("Feature not enabled: {0}")]
    FeatureDisabled(&'static str),

    #[cfg(any(feature = "pg", feature = "mysql", feature = "sqlite"))]
    #[error(transparent)]
    Sqlx(#[from] sea_orm::sqlx::Error),

    #[error(transparent)]
    Sea(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Supported engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DbEngine {
    Postgres,
    MySql,
    Sqlite,
}

/// Connection options.
/// Covers the common sqlx pool knobs; each driver applies the subset it supports.
#[derive(Clone, Debug)]
pub struct ConnectOpts {
    /// Maximum number of connections in the pool.
    pub max_conns: Option<u32>,
    /// Minimum number of connections in the pool.
    pub min_conns: Option<u32>,
    /// Timeout to acquire a connection from the pool.
    pub acquire_timeout: Option<Duration>,
    /// Idle timeout before a connection is closed.
    pub idle_timeout: Option<Duration>,
    /// Maximum lifetime for a connection.
    pub max_lifetime: Option<Duration>,
    /// Test connection health before acquire.
    pub test_before_acquire: bool,
}

impl Default for ConnectOpts {
    fn default() -> Self {
        Self {
            max_conns: Some(10),
            min_conns: None,
            acquire_timeout: Some(Duration::from_secs(30)),
            idle_timeout: None,
            max_lifetime: None,
            test_before_acquire: false,
        }
    }
}

#[cfg(feature = "sqlite")]
const DEFAULT_SQLITE_BUSY_TIMEOUT_MS: i64 = 5000;

#[cfg(feature = "sqlite")]
fn is_memory_dsn(dsn: &str) -> bool {
    dsn.contains(":memory:") || dsn.contains("mode=memory")
}

#[cfg(feature = "pg")]
async fn connect_pg(dsn: &str, opts: &ConnectOpts) -> Result<DatabaseConnection> {
    let pool = PgPoolOptions::new().apply(opts).connect(dsn).await?;
    Ok(SqlxPostgresConnector::from_sqlx_postgres_pool(pool))
}

#[cfg(feature = "mysql")]
async fn connect_mysql(dsn: &str, opts: &ConnectOpts) -> Result<DatabaseConnection> {
    let pool = MySqlPoolOptions::new().apply(opts).connect(dsn).await?;
    Ok(SqlxMySqlConnector::from_sqlx_mysql_pool(pool))
}

#[cfg(feature = "sqlite")]
async fn connect_sqlite(dsn: &str, opts: &ConnectOpts) -> Result<DatabaseConnection> {
    let is_memory = is_memory_dsn(dsn);

    // Journal defaults: DELETE for memory databases, WAL for files.
    let pool = SqlitePoolOptions::new()
        .apply(opts)
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                let journal_mode = if is_memory { "DELETE" } else { "WAL" };
                let stmt = format!("PRAGMA journal_mode = {journal_mode}");
                sea_orm::sqlx::query(&stmt).execute(&mut *conn).await?;

                sea_orm::sqlx::query("PRAGMA synchronous = NORMAL")
                    .execute(&mut *conn)
                    .await?;

                if !is_memory {
                    // PRAGMA statements do not accept bound parameters.
                    let stmt = format!("PRAGMA busy_timeout = {DEFAULT_SQLITE_BUSY_TIMEOUT_MS}");
                    sea_orm::sqlx::query(&stmt).execute(&mut *conn).await?;
                }

                Ok(())
            })
        })
        .connect(dsn)
        .await?;

    Ok(SqlxSqliteConnector::from_sqlx_sqlite_pool(pool))
}

/// Main handle: engine tag, original DSN and the pooled `SeaORM` connection.
///
/// Cloning is cheap; clones share the underlying pool.
#[derive(Debug, Clone)]
pub struct DbHandle {
    engine: DbEngine,
    dsn: String,
    sea: DatabaseConnection,
}

impl DbHandle {
    /// Detect engine by DSN.
    ///
    /// Note: we only check scheme prefixes and don't mutate the tail
    /// (credentials etc.).
    ///
    /// # Errors
    /// Returns `DbError::UnknownDsn` if the DSN scheme is not recognized.
    pub fn detect(dsn: &str) -> Result<DbEngine> {
        let s = dsn.trim_start();

        if s.starts_with("postgres://") || s.starts_with("postgresql://") {
            Ok(DbEngine::Postgres)
        } else if s.starts_with("mysql://") {
            Ok(DbEngine::MySql)
        } else if s.starts_with("sqlite:") || s.starts_with("sqlite://") {
            Ok(DbEngine::Sqlite)
        } else {
            Err(DbError::UnknownDsn(dsn.to_owned()))
        }
    }

    /// Connect and build handle.
    ///
    /// # Errors
    /// Returns an error if the connection fails or the DSN is invalid.
    pub async fn connect(dsn: &str, opts: ConnectOpts) -> Result<Self> {
        let engine = Self::detect(dsn)?;
        let sea = match engine {
            #[cfg(feature = "pg")]
            DbEngine::Postgres => connect_pg(dsn, &opts).await?,
            #[cfg(not(feature = "pg"))]
            DbEngine::Postgres => {
                return Err(DbError::FeatureDisabled("PostgreSQL feature not enabled"))
            }
            #[cfg(feature = "mysql")]
            DbEngine::MySql => connect_mysql(dsn, &opts).await?,
            #[cfg(not(feature = "mysql"))]
            DbEngine::MySql => return Err(DbError::FeatureDisabled("MySQL feature not enabled")),
            #[cfg(feature = "sqlite")]
            DbEngine::Sqlite => connect_sqlite(dsn, &opts).await?,
            #[cfg(not(feature = "sqlite"))]
            DbEngine::Sqlite => return Err(DbError::FeatureDisabled("SQLite feature not enabled")),
        };

        Ok(Self {
            engine,
            dsn: dsn.to_owned(),
            sea,
        })
    }

    /// Graceful pool close. (Dropping the last clone also closes it; this
    /// just makes it explicit.)
    ///
    /// # Errors
    /// Returns an error if the close operation fails.
    pub async fn close(self) -> Result<()> {
        self.sea.close().await.map_err(Into::into)
    }

    /// Get the backend.
    #[must_use]
    pub fn engine(&self) -> DbEngine {
        self.engine
    }

    /// Get the DSN used for this connection.
    #[must_use]
    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    /// Get the `SeaORM` connection.
    #[must_use]
    pub fn sea(&self) -> &DatabaseConnection {
        &self.sea
    }

    /// Open a unit of work over this handle's connection.
    ///
    /// Reads through the session go via its identity map; see
    /// [`session::Session`].
    #[must_use]
    pub fn session(&self) -> Session<DatabaseConnection> {
        Session::new(self.sea.clone())
    }

    /// Begin a transaction.
    ///
    /// The returned transaction is itself a connection, so repositories and
    /// sessions run inside it unchanged; nothing outside observes its effects
    /// until `commit`, and `rollback` discards them.
    ///
    /// # Errors
    /// Returns an error if the transaction cannot be started.
    pub async fn begin(&self) -> Result<DatabaseTransaction> {
        self.sea.begin().await.map_err(Into::into)
    }
}

// ===================== tests =====================
