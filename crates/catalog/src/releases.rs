//! Release rows.

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::model::{ReleaseRow, ReleaseStatus};
use crate::{Catalog, CatalogError, Result};

impl Catalog {
    /// Insert a new release in `building` state.
    pub async fn insert_release(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        environment_id: i64,
        manifest_json: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO releases (id, environment_id, manifest_json, output_hashes_json,
                                   build_log, status, created_at)
             VALUES (?, ?, ?, '{}', '', ?, ?)",
        )
        .bind(id)
        .bind(environment_id)
        .bind(manifest_json)
        .bind(ReleaseStatus::Building.as_str())
        .bind(Utc::now())
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn get_release(&self, id: &str) -> Result<Option<ReleaseRow>> {
        Ok(
            sqlx::query_as::<_, ReleaseRow>("SELECT * FROM releases WHERE id = ?")
                .bind(id)
                .fetch_optional(self.pool())
                .await?,
        )
    }

    /// Store build results on the release row.
    pub async fn set_release_outputs(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        output_hashes_json: &str,
        build_log: &str,
    ) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE releases SET output_hashes_json = ?, build_log = ? WHERE id = ?",
        )
        .bind(output_hashes_json)
        .bind(build_log)
        .bind(id)
        .execute(conn)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(CatalogError::NotFound("release"));
        }
        Ok(())
    }

    pub async fn set_release_status(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        status: ReleaseStatus,
    ) -> Result<()> {
        let updated = sqlx::query("UPDATE releases SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(conn)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(CatalogError::NotFound("release"));
        }
        Ok(())
    }

    /// Release history for an environment, most recent first.
    pub async fn list_releases(
        &self,
        environment_id: i64,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ReleaseRow>> {
        Ok(sqlx::query_as::<_, ReleaseRow>(
            "SELECT * FROM releases
             WHERE environment_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(environment_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(self.pool())
        .await?)
    }

    /// The most recent release in the environment's history that is not
    /// `exclude_id` — the rollback target.
    pub async fn previous_release(
        &self,
        environment_id: i64,
        exclude_id: &str,
    ) -> Result<Option<ReleaseRow>> {
        Ok(sqlx::query_as::<_, ReleaseRow>(
            "SELECT * FROM releases
             WHERE environment_id = ? AND id != ?
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(environment_id)
        .bind(exclude_id)
        .fetch_optional(self.pool())
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websites::WebsiteFields;

    async fn catalog_with_env() -> (tempfile::TempDir, Catalog, i64) {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::open(&dir.path().join("db.sqlite")).await.unwrap();
        let mut tx = catalog.begin().await.unwrap();
        let website = catalog
            .ensure_website(&mut *tx, "blog", &WebsiteFields::default())
            .await
            .unwrap();
        let env = catalog
            .ensure_environment(&mut *tx, website.id, "prod")
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (dir, catalog, env.id)
    }

    async fn insert(catalog: &Catalog, env_id: i64, id: &str) {
        let mut tx = catalog.begin().await.unwrap();
        catalog
            .insert_release(&mut *tx, id, env_id, "{}")
            .await
            .unwrap();
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn history_is_newest_first_with_id_tiebreak() {
        let (_dir, catalog, env_id) = catalog_with_env().await;
        // Same created_at resolution is possible; ids break the tie.
        insert(&catalog, env_id, "01AAAAAAAAAAAAAAAAAAAAAAAA").await;
        insert(&catalog, env_id, "01BBBBBBBBBBBBBBBBBBBBBBBB").await;
        insert(&catalog, env_id, "01CCCCCCCCCCCCCCCCCCCCCCCC").await;

        let rows = catalog.list_releases(env_id, 10, 0).await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "01CCCCCCCCCCCCCCCCCCCCCCCC",
                "01BBBBBBBBBBBBBBBBBBBBBBBB",
                "01AAAAAAAAAAAAAAAAAAAAAAAA",
            ]
        );

        let page = catalog.list_releases(env_id, 1, 1).await.unwrap();
        assert_eq!(page[0].id, "01BBBBBBBBBBBBBBBBBBBBBBBB");
    }

    #[tokio::test]
    async fn previous_release_skips_the_excluded_id() {
        let (_dir, catalog, env_id) = catalog_with_env().await;
        insert(&catalog, env_id, "01AAAAAAAAAAAAAAAAAAAAAAAA").await;
        insert(&catalog, env_id, "01BBBBBBBBBBBBBBBBBBBBBBBB").await;

        let target = catalog
            .previous_release(env_id, "01BBBBBBBBBBBBBBBBBBBBBBBB")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target.id, "01AAAAAAAAAAAAAAAAAAAAAAAA");

        assert!(catalog
            .previous_release(env_id, "01AAAAAAAAAAAAAAAAAAAAAAAA")
            .await
            .unwrap()
            .map(|r| r.id)
            == Some("01BBBBBBBBBBBBBBBBBBBBBBBB".to_owned()));
    }

    #[tokio::test]
    async fn status_transitions_and_outputs_persist() {
        let (_dir, catalog, env_id) = catalog_with_env().await;
        insert(&catalog, env_id, "01AAAAAAAAAAAAAAAAAAAAAAAA").await;

        let row = catalog
            .get_release("01AAAAAAAAAAAAAAAAAAAAAAAA")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status(), Some(ReleaseStatus::Building));
        assert_eq!(row.output_hashes_json, "{}");

        let mut tx = catalog.begin().await.unwrap();
        catalog
            .set_release_outputs(
                &mut *tx,
                "01AAAAAAAAAAAAAAAAAAAAAAAA",
                r#"{"index.html":"sha256:00"}"#,
                "wrote index.html\n",
            )
            .await
            .unwrap();
        catalog
            .set_release_status(&mut *tx, "01AAAAAAAAAAAAAAAAAAAAAAAA", ReleaseStatus::Active)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let row = catalog
            .get_release("01AAAAAAAAAAAAAAAAAAAAAAAA")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.status(), Some(ReleaseStatus::Active));
        assert!(row.build_log.contains("index.html"));
    }

    #[tokio::test]
    async fn unknown_release_updates_are_not_found() {
        let (_dir, catalog, _env_id) = catalog_with_env().await;
        let mut tx = catalog.begin().await.unwrap();
        let err = catalog
            .set_release_status(&mut *tx, "01ZZZZZZZZZZZZZZZZZZZZZZZZ", ReleaseStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound("release")));
    }
}
