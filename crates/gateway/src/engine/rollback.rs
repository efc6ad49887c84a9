//! Rollback engine: re-point `current` at the release preceding the active
//! one.
//!
//! The walkback is purely history-ordered (`created_at DESC, id DESC`); a
//! missing target directory is a conflict, never an excuse to skip further
//! back. Client-facing failure bodies are fixed strings — internal paths and
//! release ids go to the log only.

use serde::Serialize;
use serde_json::json;

use hsd_catalog::{CatalogError, ReleaseStatus};

use super::Deployer;

#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    #[error("website not found")]
    WebsiteNotFound,

    #[error("environment not found")]
    EnvironmentNotFound,

    #[error("no previous release to roll back to")]
    NoPreviousRelease,

    #[error("rollback target release directory is missing")]
    MissingReleaseDir,

    #[error("catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutcome {
    pub website: String,
    pub environment: String,
    pub from_release_id: String,
    pub to_release_id: String,
}

impl Deployer {
    pub async fn rollback(
        &self,
        website: &str,
        environment: &str,
        actor: &str,
    ) -> Result<RollbackOutcome, RollbackError> {
        let website_row = self
            .catalog
            .get_website(website)
            .await?
            .ok_or(RollbackError::WebsiteNotFound)?;

        let _guard = self.locks.lock_env(website, environment).await;

        let env_row = self
            .catalog
            .get_environment(website_row.id, environment)
            .await?
            .ok_or(RollbackError::EnvironmentNotFound)?;

        let active_id = env_row
            .active_release_id
            .clone()
            .ok_or(RollbackError::NoPreviousRelease)?;

        let target = self
            .catalog
            .previous_release(env_row.id, &active_id)
            .await?
            .ok_or(RollbackError::NoPreviousRelease)?;

        let paths = self.env_paths(website, environment);
        let target_dir = paths.release_dir(&target.id);
        if !tokio::fs::try_exists(&target_dir).await? {
            tracing::error!(
                website,
                environment,
                release = %target.id,
                dir = %target_dir.display(),
                "rollback target directory missing"
            );
            return Err(RollbackError::MissingReleaseDir);
        }

        paths.swap_current(&target.id).await?;

        let mut tx = self.catalog.begin().await?;
        self.catalog
            .set_active_release(&mut *tx, env_row.id, &target.id)
            .await?;
        self.catalog
            .set_release_status(&mut *tx, &target.id, ReleaseStatus::Active)
            .await?;
        self.catalog
            .set_release_status(&mut *tx, &active_id, ReleaseStatus::Superseded)
            .await?;
        tx.commit().await.map_err(CatalogError::from)?;

        tracing::info!(
            website,
            environment,
            from = %active_id,
            to = %target.id,
            "rollback complete"
        );

        self.record_audit(
            actor,
            env_row.id,
            "rollback",
            format!("{website}/{environment}"),
            Some(target.id.clone()),
            json!({ "fromReleaseId": active_id, "toReleaseId": target.id }),
        );
        self.flush_audit().await;

        Ok(RollbackOutcome {
            website: website.to_owned(),
            environment: environment.to_owned(),
            from_release_id: active_id,
            to_release_id: target.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport;
    use hsd_bundle::testutil::BundleBuilder;
    use hsd_bundle::ApplyMode;

    async fn two_releases() -> (
        tempfile::TempDir,
        crate::engine::Deployer,
        String,
        String,
    ) {
        let (dir, deployer, _reloader) = testsupport::deployer().await;

        let v1 = testsupport::decode(
            &BundleBuilder::new("blog", ApplyMode::Partial).page("index", "/", b"v1"),
        );
        deployer.apply("blog", "prod", &v1, false, "alice").await.unwrap();
        let first = deployer
            .build_release("blog", "prod", "alice")
            .await
            .unwrap();

        let v2 = testsupport::decode(
            &BundleBuilder::new("blog", ApplyMode::Partial).page("index", "/", b"v2"),
        );
        deployer.apply("blog", "prod", &v2, false, "bob").await.unwrap();
        let second = deployer.build_release("blog", "prod", "bob").await.unwrap();

        (dir, deployer, first.release_id, second.release_id)
    }

    #[tokio::test]
    async fn rollback_repoints_current_and_audits() {
        let (_dir, deployer, first, second) = two_releases().await;

        let outcome = deployer.rollback("blog", "prod", "carol").await.unwrap();
        assert_eq!(outcome.from_release_id, second);
        assert_eq!(outcome.to_release_id, first);

        let paths = deployer.env_paths("blog", "prod");
        assert_eq!(
            paths.current_target().await.unwrap().unwrap(),
            format!("releases/{first}")
        );

        let website = deployer.catalog.get_website("blog").await.unwrap().unwrap();
        let env = deployer
            .catalog
            .get_environment(website.id, "prod")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(env.active_release_id.as_deref(), Some(first.as_str()));

        let rolled_back = deployer.catalog.get_release(&second).await.unwrap().unwrap();
        assert_eq!(rolled_back.status(), Some(ReleaseStatus::Superseded));

        // Audit entry with both ids lands within the flush window.
        assert!(deployer.audit.wait_idle(std::time::Duration::from_secs(2)).await);
        let entries = deployer
            .catalog
            .list_audit_entries(&hsd_catalog::audit::AuditFilter {
                operation: Some("rollback".into()),
                limit: 10,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        let metadata: serde_json::Value =
            serde_json::from_str(&entries[0].metadata_json).unwrap();
        assert_eq!(metadata["fromReleaseId"], second.as_str());
        assert_eq!(metadata["toReleaseId"], first.as_str());
    }

    #[tokio::test]
    async fn rollback_with_single_release_conflicts() {
        let (_dir, deployer, _reloader) = testsupport::deployer().await;
        let bundle = testsupport::decode(
            &BundleBuilder::new("blog", ApplyMode::Partial).page("index", "/", b"v1"),
        );
        deployer
            .apply("blog", "prod", &bundle, false, "alice")
            .await
            .unwrap();
        deployer.build_release("blog", "prod", "alice").await.unwrap();

        assert!(matches!(
            deployer.rollback("blog", "prod", "alice").await,
            Err(RollbackError::NoPreviousRelease)
        ));
    }

    #[tokio::test]
    async fn rollback_without_active_release_conflicts() {
        let (_dir, deployer, _reloader) = testsupport::deployer().await;
        let bundle = testsupport::decode(
            &BundleBuilder::new("blog", ApplyMode::Partial).page("index", "/", b"v1"),
        );
        deployer
            .apply("blog", "prod", &bundle, false, "alice")
            .await
            .unwrap();

        assert!(matches!(
            deployer.rollback("blog", "prod", "alice").await,
            Err(RollbackError::NoPreviousRelease)
        ));
    }

    #[tokio::test]
    async fn missing_target_directory_keeps_current() {
        let (_dir, deployer, first, second) = two_releases().await;

        let paths = deployer.env_paths("blog", "prod");
        tokio::fs::remove_dir_all(paths.release_dir(&first))
            .await
            .unwrap();

        assert!(matches!(
            deployer.rollback("blog", "prod", "alice").await,
            Err(RollbackError::MissingReleaseDir)
        ));
        assert_eq!(
            paths.current_target().await.unwrap().unwrap(),
            format!("releases/{second}")
        );
    }
}
