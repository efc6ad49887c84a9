//! Relational resource catalog.
//!
//! A thin, typed row API over SQLite via sqlx. One `Catalog` wraps a small
//! connection pool (WAL journaling, 5 s busy timeout, foreign keys on) and
//! exposes per-entity operations as `impl Catalog` blocks in the entity
//! modules. Mutating engine paths run inside a single transaction owned by
//! the caller; read paths borrow a pooled connection internally.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

/// Connection type entity helpers take, so callers outside this crate can
/// name it without depending on sqlx directly.
pub type DbConn = sqlx::SqliteConnection;
/// A catalog write transaction (deref to [`DbConn`] for the helpers).
pub type DbTransaction = Transaction<'static, Sqlite>;

pub mod audit;
pub mod backends;
pub mod domains;
pub mod environments;
pub mod keepset;
pub mod migrations;
pub mod model;
pub mod releases;
pub mod resources;
pub mod websites;

pub use model::*;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("unique constraint violated")]
    UniqueViolation,

    #[error("identifier not allow-listed: {0}")]
    DisallowedIdentifier(String),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for CatalogError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return CatalogError::UniqueViolation;
            }
        }
        CatalogError::Database(err)
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Catalog
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Open handle to the catalog database.
#[derive(Clone)]
pub struct Catalog {
    pool: SqlitePool,
}

/// Default open-connection budget. Writers are further serialized by the
/// stripe locks at the engine level; WAL lets readers proceed alongside.
const MAX_CONNECTIONS: u32 = 5;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl Catalog {
    /// Open (creating if missing) the database at `db_path` and run pending
    /// migrations.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        let catalog = Self { pool };
        let applied = migrations::run_pending(&catalog.pool).await?;
        tracing::info!(
            path = %db_path.display(),
            migrations_applied = applied,
            "catalog ready"
        );
        Ok(catalog)
    }

    /// Begin a write transaction. Entity helpers take the transaction's
    /// connection, so a whole engine operation commits or rolls back as one.
    pub async fn begin(&self) -> Result<DbTransaction> {
        Ok(self.pool.begin().await?)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Liveness probe used by `/readyz`.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Close the pool, waiting for checked-out connections to return.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
