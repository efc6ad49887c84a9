//! Forward migration runner.
//!
//! Each migration is a numbered SQL script applied inside its own
//! transaction and recorded in `schema_migrations`. There is no rollback:
//! the schema only moves forward, and a version gap or out-of-order record
//! is a startup error.

use sqlx::{Connection, SqlitePool};

use crate::Result;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "core tables",
        sql: r#"
CREATE TABLE websites (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    name                 TEXT NOT NULL UNIQUE,
    default_style_bundle TEXT,
    base_template        TEXT,
    head_json            TEXT,
    content_hash         TEXT,
    created_at           TEXT NOT NULL,
    updated_at           TEXT NOT NULL
);

CREATE TABLE environments (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    website_id        INTEGER NOT NULL REFERENCES websites(id),
    name              TEXT NOT NULL,
    active_release_id TEXT REFERENCES releases(id),
    created_at        TEXT NOT NULL,
    updated_at        TEXT NOT NULL,
    UNIQUE (website_id, name)
);

CREATE TABLE releases (
    id                 TEXT PRIMARY KEY,
    environment_id     INTEGER NOT NULL REFERENCES environments(id),
    manifest_json      TEXT NOT NULL,
    output_hashes_json TEXT NOT NULL,
    build_log          TEXT NOT NULL,
    status             TEXT NOT NULL CHECK (status IN ('building', 'active', 'failed', 'superseded')),
    created_at         TEXT NOT NULL
);

CREATE TABLE pages (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    website_id   INTEGER NOT NULL REFERENCES websites(id),
    name         TEXT NOT NULL,
    route        TEXT NOT NULL,
    head_json    TEXT,
    content_hash TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    UNIQUE (website_id, name)
);

CREATE TABLE components (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    website_id   INTEGER NOT NULL REFERENCES websites(id),
    name         TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    UNIQUE (website_id, name)
);

CREATE TABLE style_bundles (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    website_id   INTEGER NOT NULL REFERENCES websites(id),
    name         TEXT NOT NULL,
    files_json   TEXT NOT NULL,
    content_hash TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    UNIQUE (website_id, name)
);

CREATE TABLE assets (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    website_id   INTEGER NOT NULL REFERENCES websites(id),
    filename     TEXT NOT NULL,
    content_type TEXT,
    content_hash TEXT NOT NULL,
    created_at   TEXT NOT NULL,
    updated_at   TEXT NOT NULL,
    UNIQUE (website_id, filename)
);

CREATE TABLE audit_log (
    id               INTEGER PRIMARY KEY AUTOINCREMENT,
    actor            TEXT NOT NULL,
    ts               TEXT NOT NULL,
    environment_id   INTEGER REFERENCES environments(id),
    operation        TEXT NOT NULL,
    resource_summary TEXT NOT NULL,
    release_id       TEXT REFERENCES releases(id),
    metadata_json    TEXT NOT NULL
);
"#,
    },
    Migration {
        version: 2,
        name: "domain bindings and backends",
        sql: r#"
CREATE TABLE domain_bindings (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    domain         TEXT NOT NULL UNIQUE,
    environment_id INTEGER NOT NULL REFERENCES environments(id),
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE TABLE backends (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    environment_id INTEGER NOT NULL REFERENCES environments(id),
    path_prefix    TEXT NOT NULL,
    upstream_url   TEXT NOT NULL,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    UNIQUE (environment_id, path_prefix)
);
"#,
    },
    Migration {
        version: 3,
        name: "query indexes",
        sql: r#"
CREATE INDEX idx_releases_env_created ON releases(environment_id, created_at DESC, id DESC);
CREATE INDEX idx_audit_env_ts ON audit_log(environment_id, ts DESC, id DESC);
CREATE INDEX idx_audit_release ON audit_log(release_id);
"#,
    },
];

/// Apply pending migrations in ascending version order. Returns how many
/// were applied.
pub(crate) async fn run_pending(pool: &SqlitePool) -> Result<usize> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version    INTEGER PRIMARY KEY,
            name       TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    let current: Option<i64> =
        sqlx::query_scalar("SELECT MAX(version) FROM schema_migrations")
            .fetch_one(pool)
            .await?;
    let current = current.unwrap_or(0);

    let mut applied = 0;
    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        let mut conn = pool.acquire().await?;
        let mut tx = conn.begin().await?;

        // sqlx executes one statement per call; migration scripts contain
        // no literal `;` outside statement boundaries.
        for statement in migration
            .sql
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query("INSERT INTO schema_migrations (version, name, applied_at) VALUES (?, ?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .bind(chrono::Utc::now())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "migration applied"
        );
        applied += 1;
    }

    Ok(applied)
}
