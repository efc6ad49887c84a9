//! Environment rows.

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::model::EnvironmentRow;
use crate::{Catalog, CatalogError, Result};

impl Catalog {
    pub async fn get_environment(
        &self,
        website_id: i64,
        name: &str,
    ) -> Result<Option<EnvironmentRow>> {
        Ok(sqlx::query_as::<_, EnvironmentRow>(
            "SELECT * FROM environments WHERE website_id = ? AND name = ?",
        )
        .bind(website_id)
        .bind(name)
        .fetch_optional(self.pool())
        .await?)
    }

    pub async fn get_environment_by_id(&self, id: i64) -> Result<Option<EnvironmentRow>> {
        Ok(
            sqlx::query_as::<_, EnvironmentRow>("SELECT * FROM environments WHERE id = ?")
                .bind(id)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    pub async fn list_environments(&self, website_id: i64) -> Result<Vec<EnvironmentRow>> {
        Ok(sqlx::query_as::<_, EnvironmentRow>(
            "SELECT * FROM environments WHERE website_id = ? ORDER BY name",
        )
        .bind(website_id)
        .fetch_all(self.pool())
        .await?)
    }

    /// Fetch-or-create inside the caller's transaction.
    pub async fn ensure_environment(
        &self,
        conn: &mut SqliteConnection,
        website_id: i64,
        name: &str,
    ) -> Result<EnvironmentRow> {
        if let Some(row) = sqlx::query_as::<_, EnvironmentRow>(
            "SELECT * FROM environments WHERE website_id = ? AND name = ?",
        )
        .bind(website_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?
        {
            return Ok(row);
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO environments (website_id, name, created_at, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(website_id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let row = sqlx::query_as::<_, EnvironmentRow>(
            "SELECT * FROM environments WHERE website_id = ? AND name = ?",
        )
        .bind(website_id)
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
        tracing::debug!(environment = %name, id = row.id, "environment auto-created");
        Ok(row)
    }

    /// Point the environment at a new active release.
    pub async fn set_active_release(
        &self,
        conn: &mut SqliteConnection,
        environment_id: i64,
        release_id: &str,
    ) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE environments SET active_release_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(release_id)
        .bind(Utc::now())
        .bind(environment_id)
        .execute(conn)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(CatalogError::NotFound("environment"));
        }
        Ok(())
    }
}
