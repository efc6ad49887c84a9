//! Page / Component / StyleBundle / Asset rows.
//!
//! All four kinds share the same upsert shape: keyed on
//! `(website_id, name-or-filename)`, content hash stored canonically,
//! `updated_at` bumped on every write.

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::model::{AssetRow, ComponentRow, PageRow, StyleBundleRow, UpsertOutcome};
use crate::{Catalog, Result};

impl Catalog {
    // ── Pages ────────────────────────────────────────────────────────

    pub async fn upsert_page(
        &self,
        conn: &mut SqliteConnection,
        website_id: i64,
        name: &str,
        route: &str,
        head_json: Option<&str>,
        content_hash: &str,
    ) -> Result<UpsertOutcome> {
        let outcome = existing_outcome(
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM pages WHERE website_id = ? AND name = ?",
            )
            .bind(website_id)
            .bind(name)
            .fetch_one(&mut *conn)
            .await?,
        );

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO pages (website_id, name, route, head_json, content_hash,
                                created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (website_id, name) DO UPDATE SET
                 route        = excluded.route,
                 head_json    = excluded.head_json,
                 content_hash = excluded.content_hash,
                 updated_at   = excluded.updated_at",
        )
        .bind(website_id)
        .bind(name)
        .bind(route)
        .bind(head_json)
        .bind(content_hash)
        .bind(now)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(outcome)
    }

    pub async fn delete_page(
        &self,
        conn: &mut SqliteConnection,
        website_id: i64,
        name: &str,
    ) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM pages WHERE website_id = ? AND name = ?")
            .bind(website_id)
            .bind(name)
            .execute(conn)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    pub async fn list_pages(&self, website_id: i64) -> Result<Vec<PageRow>> {
        Ok(sqlx::query_as::<_, PageRow>(
            "SELECT * FROM pages WHERE website_id = ? ORDER BY name",
        )
        .bind(website_id)
        .fetch_all(self.pool())
        .await?)
    }

    // ── Components ───────────────────────────────────────────────────

    pub async fn upsert_component(
        &self,
        conn: &mut SqliteConnection,
        website_id: i64,
        name: &str,
        content_hash: &str,
    ) -> Result<UpsertOutcome> {
        let outcome = existing_outcome(
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM components WHERE website_id = ? AND name = ?",
            )
            .bind(website_id)
            .bind(name)
            .fetch_one(&mut *conn)
            .await?,
        );

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO components (website_id, name, content_hash, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (website_id, name) DO UPDATE SET
                 content_hash = excluded.content_hash,
                 updated_at   = excluded.updated_at",
        )
        .bind(website_id)
        .bind(name)
        .bind(content_hash)
        .bind(now)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(outcome)
    }

    pub async fn delete_component(
        &self,
        conn: &mut SqliteConnection,
        website_id: i64,
        name: &str,
    ) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM components WHERE website_id = ? AND name = ?")
            .bind(website_id)
            .bind(name)
            .execute(conn)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    pub async fn list_components(&self, website_id: i64) -> Result<Vec<ComponentRow>> {
        Ok(sqlx::query_as::<_, ComponentRow>(
            "SELECT * FROM components WHERE website_id = ? ORDER BY name",
        )
        .bind(website_id)
        .fetch_all(self.pool())
        .await?)
    }

    // ── Style bundles ────────────────────────────────────────────────

    pub async fn upsert_style_bundle(
        &self,
        conn: &mut SqliteConnection,
        website_id: i64,
        name: &str,
        files_json: &str,
        content_hash: &str,
    ) -> Result<UpsertOutcome> {
        let outcome = existing_outcome(
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM style_bundles WHERE website_id = ? AND name = ?",
            )
            .bind(website_id)
            .bind(name)
            .fetch_one(&mut *conn)
            .await?,
        );

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO style_bundles (website_id, name, files_json, content_hash,
                                        created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (website_id, name) DO UPDATE SET
                 files_json   = excluded.files_json,
                 content_hash = excluded.content_hash,
                 updated_at   = excluded.updated_at",
        )
        .bind(website_id)
        .bind(name)
        .bind(files_json)
        .bind(content_hash)
        .bind(now)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(outcome)
    }

    pub async fn delete_style_bundle(
        &self,
        conn: &mut SqliteConnection,
        website_id: i64,
        name: &str,
    ) -> Result<bool> {
        let deleted =
            sqlx::query("DELETE FROM style_bundles WHERE website_id = ? AND name = ?")
                .bind(website_id)
                .bind(name)
                .execute(conn)
                .await?
                .rows_affected();
        Ok(deleted > 0)
    }

    pub async fn list_style_bundles(&self, website_id: i64) -> Result<Vec<StyleBundleRow>> {
        Ok(sqlx::query_as::<_, StyleBundleRow>(
            "SELECT * FROM style_bundles WHERE website_id = ? ORDER BY name",
        )
        .bind(website_id)
        .fetch_all(self.pool())
        .await?)
    }

    // ── Assets ───────────────────────────────────────────────────────

    pub async fn upsert_asset(
        &self,
        conn: &mut SqliteConnection,
        website_id: i64,
        filename: &str,
        content_type: Option<&str>,
        content_hash: &str,
    ) -> Result<UpsertOutcome> {
        let outcome = existing_outcome(
            sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM assets WHERE website_id = ? AND filename = ?",
            )
            .bind(website_id)
            .bind(filename)
            .fetch_one(&mut *conn)
            .await?,
        );

        let now = Utc::now();
        sqlx::query(
            "INSERT INTO assets (website_id, filename, content_type, content_hash,
                                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT (website_id, filename) DO UPDATE SET
                 content_type = excluded.content_type,
                 content_hash = excluded.content_hash,
                 updated_at   = excluded.updated_at",
        )
        .bind(website_id)
        .bind(filename)
        .bind(content_type)
        .bind(content_hash)
        .bind(now)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(outcome)
    }

    pub async fn delete_asset(
        &self,
        conn: &mut SqliteConnection,
        website_id: i64,
        filename: &str,
    ) -> Result<bool> {
        let deleted = sqlx::query("DELETE FROM assets WHERE website_id = ? AND filename = ?")
            .bind(website_id)
            .bind(filename)
            .execute(conn)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    pub async fn list_assets(&self, website_id: i64) -> Result<Vec<AssetRow>> {
        Ok(sqlx::query_as::<_, AssetRow>(
            "SELECT * FROM assets WHERE website_id = ? ORDER BY filename",
        )
        .bind(website_id)
        .fetch_all(self.pool())
        .await?)
    }
}

fn existing_outcome(count: i64) -> UpsertOutcome {
    if count > 0 {
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Inserted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websites::WebsiteFields;
    use crate::Catalog;

    async fn seeded() -> (tempfile::TempDir, Catalog, i64) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(&dir.path().join("db.sqlite")).await.unwrap();
        let mut tx = catalog.begin().await.unwrap();
        let website = catalog
            .ensure_website(&mut *tx, "blog", &WebsiteFields::default())
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (dir, catalog, website.id)
    }

    #[tokio::test]
    async fn page_upsert_reports_insert_then_update() {
        let (_dir, catalog, website_id) = seeded().await;

        let mut tx = catalog.begin().await.unwrap();
        let first = catalog
            .upsert_page(&mut *tx, website_id, "index", "/", None, "sha256:aa")
            .await
            .unwrap();
        let second = catalog
            .upsert_page(
                &mut *tx,
                website_id,
                "index",
                "/",
                Some(r#"{"title":"Home"}"#),
                "sha256:bb",
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first, UpsertOutcome::Inserted);
        assert_eq!(second, UpsertOutcome::Updated);

        let pages = catalog.list_pages(website_id).await.unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].content_hash, "sha256:bb");
        assert_eq!(pages[0].head_json.as_deref(), Some(r#"{"title":"Home"}"#));
    }

    #[tokio::test]
    async fn names_are_case_sensitive_keys() {
        let (_dir, catalog, website_id) = seeded().await;

        let mut tx = catalog.begin().await.unwrap();
        catalog
            .upsert_component(&mut *tx, website_id, "Header", "sha256:aa")
            .await
            .unwrap();
        catalog
            .upsert_component(&mut *tx, website_id, "header", "sha256:bb")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(catalog.list_components(website_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn deletes_report_whether_a_row_was_hit() {
        let (_dir, catalog, website_id) = seeded().await;

        let mut tx = catalog.begin().await.unwrap();
        catalog
            .upsert_asset(
                &mut *tx,
                website_id,
                "assets/logo.svg",
                Some("image/svg+xml"),
                "sha256:aa",
            )
            .await
            .unwrap();
        assert!(catalog
            .delete_asset(&mut *tx, website_id, "assets/logo.svg")
            .await
            .unwrap());
        assert!(!catalog
            .delete_asset(&mut *tx, website_id, "assets/logo.svg")
            .await
            .unwrap());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn style_bundles_round_trip_their_file_list() {
        let (_dir, catalog, website_id) = seeded().await;
        let files_json = r#"[{"file":"styles/a.css","hash":"sha256:aa"}]"#;

        let mut tx = catalog.begin().await.unwrap();
        catalog
            .upsert_style_bundle(&mut *tx, website_id, "default", files_json, "sha256:cc")
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let bundles = catalog.list_style_bundles(website_id).await.unwrap();
        assert_eq!(bundles.len(), 1);
        assert_eq!(bundles[0].files_json, files_json);
    }
}
