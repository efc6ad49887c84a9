//! Release builder: materialize the desired state into an immutable release
//! directory and switch the environment's `current` pointer.
//!
//! The release row is committed in `building` state before any file is
//! written, so a crash or build failure always leaves an inspectable
//! `failed` row behind and never moves `current`. Output order is the
//! sorted entry list, which makes the output path/hash set reproducible for
//! a fixed desired state.

use std::collections::BTreeMap;
use std::path::Component;

use serde::Serialize;
use serde_json::json;

use hsd_blobstore::BlobError;
use hsd_catalog::{CatalogError, ReleaseStatus};
use hsd_domain::{ContentHash, ReleaseId};

use super::snapshot::{self, EntrySource, ReleaseManifest};
use super::{Deployer, EnvPaths};

pub const MANIFEST_SIDECAR: &str = ".manifest.json";
pub const BUILD_LOG_SIDECAR: &str = ".build-log.txt";
pub const OUTPUT_HASHES_SIDECAR: &str = ".output-hashes.json";

/// Root-level sidecar files every release directory carries.
pub const SIDECARS: [&str; 3] = [MANIFEST_SIDECAR, BUILD_LOG_SIDECAR, OUTPUT_HASHES_SIDECAR];

#[derive(Debug, thiserror::Error)]
pub enum ReleaseError {
    #[error("website not found")]
    WebsiteNotFound,

    #[error("environment not found")]
    EnvironmentNotFound,

    #[error("duplicate output path {0:?}")]
    DuplicateOutputPath(String),

    #[error("unsafe output path {0:?}")]
    UnsafeOutputPath(String),

    #[error("invalid stored hash for {0:?}")]
    InvalidStoredHash(String),

    #[error("catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("blob store: {0}")]
    Blob(#[from] BlobError),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseOutcome {
    pub release_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_release_id: Option<String>,
    pub environment_id: i64,
}

impl Deployer {
    /// Build and activate a new release for `(website, environment)`.
    pub async fn build_release(
        &self,
        website: &str,
        environment: &str,
        actor: &str,
    ) -> Result<ReleaseOutcome, ReleaseError> {
        let website_row = self
            .catalog
            .get_website(website)
            .await?
            .ok_or(ReleaseError::WebsiteNotFound)?;

        let _guard = self.locks.lock_env(website, environment).await;

        let env_row = self
            .catalog
            .get_environment(website_row.id, environment)
            .await?
            .ok_or(ReleaseError::EnvironmentNotFound)?;

        let manifest = snapshot::desired_state(&self.catalog, &website_row, &env_row).await?;
        let release_id = ReleaseId::generate();
        let manifest_json = serde_json::to_string_pretty(&manifest)?;

        // Commit the building row first: failures below leave a `failed`
        // release behind rather than nothing.
        let mut tx = self.catalog.begin().await?;
        self.catalog
            .insert_release(&mut *tx, release_id.as_str(), env_row.id, &manifest_json)
            .await?;
        tx.commit().await.map_err(CatalogError::from)?;

        let paths = self.env_paths(website, environment);
        let previous_release_id = env_row.active_release_id.clone();

        let built = self
            .materialize_and_activate(&paths, &manifest, &release_id, &manifest_json)
            .await;

        let output_count = match built {
            Ok(count) => count,
            Err(e) => {
                self.mark_release_failed(&release_id, &e).await;
                return Err(e);
            }
        };

        let mut tx = self.catalog.begin().await?;
        self.catalog
            .set_release_status(&mut *tx, release_id.as_str(), ReleaseStatus::Active)
            .await?;
        if let Some(previous) = &previous_release_id {
            self.catalog
                .set_release_status(&mut *tx, previous, ReleaseStatus::Superseded)
                .await?;
        }
        self.catalog
            .set_active_release(&mut *tx, env_row.id, release_id.as_str())
            .await?;
        tx.commit().await.map_err(CatalogError::from)?;

        tracing::info!(
            website,
            environment,
            release = %release_id,
            files = output_count,
            "release activated"
        );

        self.record_audit(
            actor,
            env_row.id,
            "release.build",
            format!("{website}/{environment}"),
            Some(release_id.as_str().to_owned()),
            json!({ "fileCount": output_count }),
        );
        self.record_audit(
            actor,
            env_row.id,
            "release.activate",
            format!("{website}/{environment}"),
            Some(release_id.as_str().to_owned()),
            json!({ "previousReleaseId": previous_release_id }),
        );
        self.flush_audit().await;

        Ok(ReleaseOutcome {
            release_id: release_id.as_str().to_owned(),
            previous_release_id,
            environment_id: env_row.id,
        })
    }

    /// Write every output file plus sidecars, store the build results on the
    /// release row, and swap `current`. Returns the output file count.
    async fn materialize_and_activate(
        &self,
        paths: &EnvPaths,
        manifest: &ReleaseManifest,
        release_id: &ReleaseId,
        manifest_json: &str,
    ) -> Result<usize, ReleaseError> {
        let release_dir = paths.release_dir(release_id.as_str());
        tokio::fs::create_dir_all(&release_dir).await?;

        let mut output_hashes: BTreeMap<String, String> = BTreeMap::new();
        let mut build_log = String::new();

        for entry in manifest.entries() {
            check_output_path(&entry.path)?;
            if output_hashes.contains_key(&entry.path) {
                return Err(ReleaseError::DuplicateOutputPath(entry.path));
            }

            let bytes = match &entry.source {
                EntrySource::Blob(hash) => {
                    let hash = ContentHash::parse(hash)
                        .map_err(|_| ReleaseError::InvalidStoredHash(entry.path.clone()))?;
                    self.blobs.read(&hash).await?
                }
                EntrySource::Inline(bytes) => bytes.clone(),
            };

            let target = release_dir.join(&entry.path);
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, &bytes).await?;

            let written = ContentHash::of_bytes(&bytes);
            build_log.push_str(&format!(
                "wrote {} {} ({} bytes)\n",
                entry.path,
                written,
                bytes.len()
            ));
            output_hashes.insert(entry.path, written.as_str().to_owned());
        }

        let output_count = output_hashes.len();
        tokio::fs::write(release_dir.join(MANIFEST_SIDECAR), manifest_json).await?;
        tokio::fs::write(release_dir.join(BUILD_LOG_SIDECAR), &build_log).await?;
        tokio::fs::write(
            release_dir.join(OUTPUT_HASHES_SIDECAR),
            serde_json::to_string_pretty(&output_hashes)?,
        )
        .await?;

        let mut tx = self.catalog.begin().await?;
        self.catalog
            .set_release_outputs(
                &mut *tx,
                release_id.as_str(),
                &serde_json::to_string(&output_hashes)?,
                &build_log,
            )
            .await?;
        tx.commit().await.map_err(CatalogError::from)?;

        paths.swap_current(release_id.as_str()).await?;

        Ok(output_count)
    }

    async fn mark_release_failed(&self, release_id: &ReleaseId, error: &ReleaseError) {
        tracing::error!(release = %release_id, error = %error, "release build failed");
        let marked = async {
            let mut tx = self.catalog.begin().await?;
            self.catalog
                .set_release_status(&mut *tx, release_id.as_str(), ReleaseStatus::Failed)
                .await?;
            tx.commit().await.map_err(CatalogError::from)
        }
        .await;
        if let Err(e) = marked {
            tracing::error!(release = %release_id, error = %e, "failed to mark release failed");
        }
    }
}

/// Output paths come from validated names and normalized routes; reject
/// anything that still looks like traversal before touching the disk.
fn check_output_path(path: &str) -> Result<(), ReleaseError> {
    let as_path = std::path::Path::new(path);
    let safe = !path.is_empty()
        && as_path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if safe {
        Ok(())
    } else {
        Err(ReleaseError::UnsafeOutputPath(path.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport;
    use hsd_bundle::testutil::BundleBuilder;
    use hsd_bundle::ApplyMode;

    async fn seeded() -> (tempfile::TempDir, crate::engine::Deployer) {
        let (dir, deployer, _reloader) = testsupport::deployer().await;
        let bundle = testsupport::decode(
            &BundleBuilder::new("blog", ApplyMode::Partial)
                .page("index", "/", b"<html>home</html>")
                .component("header", b"<header/>")
                .style_file("default", "styles/tokens.css", b":root{}")
                .style_file("default", "styles/default.css", b"body{}")
                .asset("assets/logo.svg", "image/svg+xml", b"<svg/>"),
        );
        deployer
            .apply("blog", "prod", &bundle, false, "alice")
            .await
            .unwrap();
        (dir, deployer)
    }

    #[tokio::test]
    async fn build_materializes_and_activates() {
        let (_dir, deployer) = seeded().await;

        let outcome = deployer
            .build_release("blog", "prod", "alice")
            .await
            .unwrap();
        assert!(outcome.previous_release_id.is_none());

        let paths = deployer.env_paths("blog", "prod");
        let release_dir = paths.release_dir(&outcome.release_id);
        for file in [
            "index.html",
            "styles/tokens.css",
            "styles/default.css",
            "assets/logo.svg",
            "components/header.html",
            MANIFEST_SIDECAR,
            BUILD_LOG_SIDECAR,
            OUTPUT_HASHES_SIDECAR,
        ] {
            assert!(release_dir.join(file).exists(), "missing {file}");
        }

        assert_eq!(
            paths.current_target().await.unwrap().unwrap(),
            format!("releases/{}", outcome.release_id)
        );

        let website = deployer.catalog.get_website("blog").await.unwrap().unwrap();
        let env = deployer
            .catalog
            .get_environment(website.id, "prod")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(env.active_release_id.as_deref(), Some(outcome.release_id.as_str()));

        let release = deployer
            .catalog
            .get_release(&outcome.release_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(release.status(), Some(ReleaseStatus::Active));

        // Output hashes cover exactly the content files.
        let hashes: BTreeMap<String, String> =
            serde_json::from_str(&release.output_hashes_json).unwrap();
        assert_eq!(hashes.len(), 5);
        assert!(hashes.contains_key("index.html"));
    }

    #[tokio::test]
    async fn rebuild_supersedes_the_previous_release() {
        let (_dir, deployer) = seeded().await;

        let first = deployer
            .build_release("blog", "prod", "alice")
            .await
            .unwrap();
        let second = deployer.build_release("blog", "prod", "bob").await.unwrap();
        assert_eq!(
            second.previous_release_id.as_deref(),
            Some(first.release_id.as_str())
        );
        // Release ids sort chronologically.
        assert!(second.release_id > first.release_id);

        let previous = deployer
            .catalog
            .get_release(&first.release_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(previous.status(), Some(ReleaseStatus::Superseded));
    }

    #[tokio::test]
    async fn identical_state_builds_identical_outputs() {
        let (_dir, deployer) = seeded().await;

        let first = deployer
            .build_release("blog", "prod", "alice")
            .await
            .unwrap();
        let second = deployer
            .build_release("blog", "prod", "alice")
            .await
            .unwrap();

        let load = |id: &str| {
            let catalog = deployer.catalog.clone();
            let id = id.to_owned();
            async move {
                let row = catalog.get_release(&id).await.unwrap().unwrap();
                serde_json::from_str::<BTreeMap<String, String>>(&row.output_hashes_json)
                    .unwrap()
            }
        };
        assert_eq!(load(&first.release_id).await, load(&second.release_id).await);
    }

    #[tokio::test]
    async fn missing_website_or_environment_is_reported() {
        let (_dir, deployer, _reloader) = testsupport::deployer().await;
        assert!(matches!(
            deployer.build_release("ghost", "prod", "alice").await,
            Err(ReleaseError::WebsiteNotFound)
        ));

        let bundle = testsupport::decode(
            &BundleBuilder::new("blog", ApplyMode::Partial).component("header", b"<header/>"),
        );
        deployer
            .apply("blog", "prod", &bundle, false, "alice")
            .await
            .unwrap();
        assert!(matches!(
            deployer.build_release("blog", "ghost", "alice").await,
            Err(ReleaseError::EnvironmentNotFound)
        ));
    }

    #[tokio::test]
    async fn missing_blob_fails_the_release_and_keeps_current() {
        let (_dir, deployer) = seeded().await;
        let first = deployer
            .build_release("blog", "prod", "alice")
            .await
            .unwrap();

        // Corrupt the store: remove the page blob.
        let hash = hsd_domain::ContentHash::of_bytes(b"<html>home</html>");
        tokio::fs::remove_file(deployer.blobs.path_for(&hash))
            .await
            .unwrap();

        let err = deployer.build_release("blog", "prod", "bob").await.unwrap_err();
        assert!(matches!(err, ReleaseError::Blob(BlobError::NotFound(_))));

        // current still points at the first release.
        let paths = deployer.env_paths("blog", "prod");
        assert_eq!(
            paths.current_target().await.unwrap().unwrap(),
            format!("releases/{}", first.release_id)
        );

        // Exactly one failed release row exists.
        let website = deployer.catalog.get_website("blog").await.unwrap().unwrap();
        let env = deployer
            .catalog
            .get_environment(website.id, "prod")
            .await
            .unwrap()
            .unwrap();
        let releases = deployer.catalog.list_releases(env.id, 10, 0).await.unwrap();
        let failed: Vec<_> = releases
            .iter()
            .filter(|r| r.status() == Some(ReleaseStatus::Failed))
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(env.active_release_id.as_deref(), Some(first.release_id.as_str()));
    }
}
