//! Website rows.

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::model::WebsiteRow;
use crate::{Catalog, Result};

/// Fields settable on create / update. `None` leaves a column NULL.
#[derive(Debug, Clone, Default)]
pub struct WebsiteFields {
    pub default_style_bundle: Option<String>,
    pub base_template: Option<String>,
    pub head_json: Option<String>,
    pub content_hash: Option<String>,
}

impl Catalog {
    pub async fn get_website(&self, name: &str) -> Result<Option<WebsiteRow>> {
        Ok(
            sqlx::query_as::<_, WebsiteRow>("SELECT * FROM websites WHERE name = ?")
                .bind(name)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    pub async fn get_website_by_id(&self, id: i64) -> Result<Option<WebsiteRow>> {
        Ok(
            sqlx::query_as::<_, WebsiteRow>("SELECT * FROM websites WHERE id = ?")
                .bind(id)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    pub async fn list_websites(&self) -> Result<Vec<WebsiteRow>> {
        Ok(
            sqlx::query_as::<_, WebsiteRow>("SELECT * FROM websites ORDER BY name")
                .fetch_all(self.pool())
                .await?,
        )
    }

    /// Fetch-or-create inside the caller's transaction. An existing website
    /// keeps its stored defaults; a new one takes the provided fields.
    pub async fn ensure_website(
        &self,
        conn: &mut SqliteConnection,
        name: &str,
        fields: &WebsiteFields,
    ) -> Result<WebsiteRow> {
        if let Some(row) =
            sqlx::query_as::<_, WebsiteRow>("SELECT * FROM websites WHERE name = ?")
                .bind(name)
                .fetch_optional(&mut *conn)
                .await?
        {
            return Ok(row);
        }

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO websites
                 (name, default_style_bundle, base_template, head_json, content_hash,
                  created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(&fields.default_style_bundle)
        .bind(&fields.base_template)
        .bind(&fields.head_json)
        .bind(&fields.content_hash)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        let row = sqlx::query_as::<_, WebsiteRow>("SELECT * FROM websites WHERE name = ?")
            .bind(name)
            .fetch_one(&mut *conn)
            .await?;
        tracing::debug!(website = %name, id = row.id, "website auto-created");
        Ok(row)
    }

    /// Refresh website defaults/head from a newly applied bundle.
    pub async fn update_website_fields(
        &self,
        conn: &mut SqliteConnection,
        website_id: i64,
        fields: &WebsiteFields,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE websites
             SET default_style_bundle = COALESCE(?, default_style_bundle),
                 base_template        = COALESCE(?, base_template),
                 head_json            = COALESCE(?, head_json),
                 content_hash         = COALESCE(?, content_hash),
                 updated_at           = ?
             WHERE id = ?",
        )
        .bind(&fields.default_style_bundle)
        .bind(&fields.base_template)
        .bind(&fields.head_json)
        .bind(&fields.content_hash)
        .bind(Utc::now())
        .bind(website_id)
        .execute(conn)
        .await?;
        Ok(())
    }
}
