//! Backend rows — path-prefix → upstream mappings that feed proxy config
//! generation (the generation itself lives outside the core).

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::model::BackendRow;
use crate::{Catalog, Result};

impl Catalog {
    pub async fn list_backends(&self, environment_id: i64) -> Result<Vec<BackendRow>> {
        Ok(sqlx::query_as::<_, BackendRow>(
            "SELECT * FROM backends WHERE environment_id = ? ORDER BY path_prefix",
        )
        .bind(environment_id)
        .fetch_all(self.pool())
        .await?)
    }

    pub async fn upsert_backend(
        &self,
        conn: &mut SqliteConnection,
        environment_id: i64,
        path_prefix: &str,
        upstream_url: &str,
    ) -> Result<BackendRow> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO backends (environment_id, path_prefix, upstream_url,
                                   created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (environment_id, path_prefix) DO UPDATE SET
                 upstream_url = excluded.upstream_url,
                 updated_at   = excluded.updated_at",
        )
        .bind(environment_id)
        .bind(path_prefix)
        .bind(upstream_url)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        Ok(sqlx::query_as::<_, BackendRow>(
            "SELECT * FROM backends WHERE environment_id = ? AND path_prefix = ?",
        )
        .bind(environment_id)
        .bind(path_prefix)
        .fetch_one(conn)
        .await?)
    }

    pub async fn delete_backend(
        &self,
        conn: &mut SqliteConnection,
        environment_id: i64,
        path_prefix: &str,
    ) -> Result<bool> {
        let deleted =
            sqlx::query("DELETE FROM backends WHERE environment_id = ? AND path_prefix = ?")
                .bind(environment_id)
                .bind(path_prefix)
                .execute(conn)
                .await?
                .rows_affected();
        Ok(deleted > 0)
    }
}
