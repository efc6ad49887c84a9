//! Promote engine: duplicate an active release across environments.
//!
//! The source release directory is re-hashed in full against its recorded
//! output hashes before a single byte lands in the target environment; any
//! disagreement aborts with a sanitized error (detail is logged, never
//! returned). Content files are hard-linked when the filesystem allows it
//! and copied otherwise.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::json;

use hsd_catalog::{CatalogError, EnvironmentRow, ReleaseStatus};
use hsd_domain::{ContentHash, ReleaseId};

use super::release::{
    BUILD_LOG_SIDECAR, MANIFEST_SIDECAR, OUTPUT_HASHES_SIDECAR,
};
use super::snapshot::ReleaseManifest;
use super::Deployer;

/// Warning cap for the prod-target metadata host scan.
const MAX_HOST_WARNINGS: usize = 20;

#[derive(Debug, thiserror::Error)]
pub enum PromoteError {
    #[error("source and target environment are the same")]
    SameEnvironment,

    #[error("website not found")]
    WebsiteNotFound,

    #[error("source environment not found")]
    SourceEnvironmentNotFound,

    #[error("target environment not found")]
    TargetEnvironmentNotFound,

    #[error("source environment has no active release")]
    SourceNoActiveRelease,

    #[error("promotion hash verification failed")]
    HashVerificationFailed,

    #[error("catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromoteOutcome {
    pub source_release_id: String,
    pub release_id: String,
    pub file_count: usize,
    /// Stable digest of the sorted `{path: hash}` map.
    pub hash: String,
    pub hash_verified: bool,
    /// `"hardlink"` when every content file was linked, `"copy"` otherwise.
    pub strategy: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Deployer {
    pub async fn promote(
        &self,
        website: &str,
        from_env: &str,
        to_env: &str,
        actor: &str,
    ) -> Result<PromoteOutcome, PromoteError> {
        if from_env == to_env {
            return Err(PromoteError::SameEnvironment);
        }

        let website_row = self
            .catalog
            .get_website(website)
            .await?
            .ok_or(PromoteError::WebsiteNotFound)?;

        let _guards = self.locks.lock_env_pair(website, from_env, to_env).await;

        let source_env = self
            .catalog
            .get_environment(website_row.id, from_env)
            .await?
            .ok_or(PromoteError::SourceEnvironmentNotFound)?;
        let target_env = self
            .catalog
            .get_environment(website_row.id, to_env)
            .await?
            .ok_or(PromoteError::TargetEnvironmentNotFound)?;

        let source_release_id = source_env
            .active_release_id
            .clone()
            .ok_or(PromoteError::SourceNoActiveRelease)?;
        let source_release = self
            .catalog
            .get_release(&source_release_id)
            .await?
            .ok_or(PromoteError::SourceNoActiveRelease)?;

        // ── Verify the source directory against its recorded hashes ─────
        let source_dir = self
            .env_paths(website, from_env)
            .release_dir(&source_release_id);
        let recorded: BTreeMap<String, String> =
            serde_json::from_str(&source_release.output_hashes_json)?;

        let files = collect_content_files(&source_dir).await?;
        let mut verified: BTreeMap<String, ContentHash> = BTreeMap::new();
        for rel_path in &files {
            let bytes = tokio::fs::read(source_dir.join(rel_path)).await?;
            let actual = ContentHash::of_bytes(&bytes);
            match recorded.get(rel_path) {
                Some(declared) if declared == actual.as_str() => {
                    verified.insert(rel_path.clone(), actual);
                }
                Some(declared) => {
                    tracing::error!(
                        website,
                        source = from_env,
                        release = %source_release_id,
                        file = %rel_path,
                        declared = %declared,
                        actual = %actual,
                        "promotion hash verification failed"
                    );
                    return Err(PromoteError::HashVerificationFailed);
                }
                None => {
                    tracing::error!(
                        website,
                        source = from_env,
                        release = %source_release_id,
                        file = %rel_path,
                        "file present on disk but absent from output hashes"
                    );
                    return Err(PromoteError::HashVerificationFailed);
                }
            }
        }
        if verified.len() != recorded.len() {
            tracing::error!(
                website,
                source = from_env,
                release = %source_release_id,
                on_disk = verified.len(),
                recorded = recorded.len(),
                "recorded outputs missing from release directory"
            );
            return Err(PromoteError::HashVerificationFailed);
        }

        // ── Create the target release ────────────────────────────────────
        let mut manifest: ReleaseManifest =
            serde_json::from_str(&source_release.manifest_json)?;
        manifest.environment = to_env.to_owned();
        let manifest_json = serde_json::to_string_pretty(&manifest)?;

        let release_id = ReleaseId::generate();
        let mut tx = self.catalog.begin().await?;
        self.catalog
            .insert_release(&mut *tx, release_id.as_str(), target_env.id, &manifest_json)
            .await?;
        tx.commit().await.map_err(CatalogError::from)?;

        let duplicated = self
            .duplicate_release(
                website,
                to_env,
                &target_env,
                &source_dir,
                &files,
                &verified,
                &release_id,
                &manifest_json,
            )
            .await;
        let strategy = match duplicated {
            Ok(strategy) => strategy,
            Err(e) => {
                self.mark_promotion_failed(&release_id, &e).await;
                return Err(e);
            }
        };

        // ── Warnings (prod target only) ─────────────────────────────────
        let warnings = if to_env == "prod" {
            let source_domains = self
                .catalog
                .list_domain_bindings_for_environment(source_env.id)
                .await?
                .into_iter()
                .map(|b| b.domain)
                .collect::<Vec<_>>();
            let target_domains = self
                .catalog
                .list_domain_bindings_for_environment(target_env.id)
                .await?
                .into_iter()
                .map(|b| b.domain)
                .collect::<Vec<_>>();
            metadata_host_warnings(&manifest, &source_domains, &target_domains)
        } else {
            Vec::new()
        };

        let digest =
            ContentHash::of_sorted_map(verified.iter().map(|(path, hash)| (path.as_str(), hash)));

        tracing::info!(
            website,
            from = from_env,
            to = to_env,
            source_release = %source_release_id,
            release = %release_id,
            files = files.len(),
            strategy = %strategy,
            "promotion complete"
        );

        self.record_audit(
            actor,
            target_env.id,
            "promote",
            format!("{website}/{from_env}->{to_env}"),
            Some(release_id.as_str().to_owned()),
            json!({
                "sourceReleaseId": source_release_id,
                "fileCount": files.len(),
                "strategy": strategy,
            }),
        );
        self.flush_audit().await;

        Ok(PromoteOutcome {
            source_release_id,
            release_id: release_id.as_str().to_owned(),
            file_count: files.len(),
            hash: digest.as_str().to_owned(),
            hash_verified: true,
            strategy,
            warnings,
        })
    }

    /// Copy (or link) verified content into the target release directory,
    /// write sidecars, store outputs, swap `current`, and update statuses.
    /// Returns the strategy used.
    #[allow(clippy::too_many_arguments)]
    async fn duplicate_release(
        &self,
        website: &str,
        to_env: &str,
        target_env: &EnvironmentRow,
        source_dir: &Path,
        files: &[String],
        verified: &BTreeMap<String, ContentHash>,
        release_id: &ReleaseId,
        manifest_json: &str,
    ) -> Result<String, PromoteError> {
        let target_paths = self.env_paths(website, to_env);
        let target_dir = target_paths.release_dir(release_id.as_str());
        tokio::fs::create_dir_all(&target_dir).await?;

        let mut strategy = "hardlink";
        let mut build_log = String::new();
        for rel_path in files {
            let from = source_dir.join(rel_path);
            let to = target_dir.join(rel_path);
            if let Some(parent) = to.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            match tokio::fs::hard_link(&from, &to).await {
                Ok(()) => {}
                Err(_) => {
                    strategy = "copy";
                    tokio::fs::copy(&from, &to).await?;
                }
            }
            build_log.push_str(&format!("{strategy} {rel_path}\n"));
        }

        let output_hashes: BTreeMap<&str, &str> = verified
            .iter()
            .map(|(path, hash)| (path.as_str(), hash.as_str()))
            .collect();
        tokio::fs::write(target_dir.join(MANIFEST_SIDECAR), manifest_json).await?;
        tokio::fs::write(target_dir.join(BUILD_LOG_SIDECAR), &build_log).await?;
        tokio::fs::write(
            target_dir.join(OUTPUT_HASHES_SIDECAR),
            serde_json::to_string_pretty(&output_hashes)?,
        )
        .await?;

        let previous_active = target_env.active_release_id.clone();
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

        target_paths.swap_current(release_id.as_str()).await?;

        let mut tx = self.catalog.begin().await?;
        self.catalog
            .set_release_status(&mut *tx, release_id.as_str(), ReleaseStatus::Active)
            .await?;
        if let Some(previous) = &previous_active {
            self.catalog
                .set_release_status(&mut *tx, previous, ReleaseStatus::Superseded)
                .await?;
        }
        self.catalog
            .set_active_release(&mut *tx, target_env.id, release_id.as_str())
            .await?;
        tx.commit().await.map_err(CatalogError::from)?;

        Ok(strategy.to_owned())
    }

    async fn mark_promotion_failed(&self, release_id: &ReleaseId, error: &PromoteError) {
        tracing::error!(release = %release_id, error = %error, "promotion failed");
        let marked = async {
            let mut tx = self.catalog.begin().await?;
            self.catalog
                .set_release_status(&mut *tx, release_id.as_str(), ReleaseStatus::Failed)
                .await?;
            tx.commit().await.map_err(CatalogError::from)
        }
        .await;
        if let Err(e) = marked {
            tracing::error!(release = %release_id, error = %e, "failed to mark promotion failed");
        }
    }
}

/// Relative paths of all content files under a release directory, sorted.
/// Root-level dotfiles (the sidecars) are excluded.
async fn collect_content_files(root: &Path) -> std::io::Result<Vec<String>> {
    let mut files = Vec::new();
    let mut stack: Vec<PathBuf> = vec![PathBuf::new()];

    while let Some(rel_dir) = stack.pop() {
        let mut entries = tokio::fs::read_dir(root.join(&rel_dir)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let at_root = rel_dir.as_os_str().is_empty();
            let rel = rel_dir.join(&name);

            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(rel);
            } else if file_type.is_file() {
                if at_root && name.starts_with('.') {
                    continue;
                }
                files.push(rel.to_string_lossy().into_owned());
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Absolute URLs in head metadata; capture group 1 is the host. Compiled
/// once, on first use.
static ABSOLUTE_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://([A-Za-z0-9.-]+)").expect("absolute-URL pattern is valid")
});

/// Scan page/website head metadata for absolute URLs whose host is not bound
/// to the target environment but looks like it belongs to the source (bound
/// there, or carrying a staging-like label).
fn metadata_host_warnings(
    manifest: &ReleaseManifest,
    source_domains: &[String],
    target_domains: &[String],
) -> Vec<String> {
    let mut hosts: Vec<(String, String)> = Vec::new(); // (page, host)
    let mut scan = |page: &str, value: &serde_json::Value| {
        for text in json_strings(value) {
            for captures in ABSOLUTE_URL_RE.captures_iter(&text) {
                let host = captures[1].to_ascii_lowercase();
                hosts.push((page.to_owned(), host));
            }
        }
    };

    if let Some(head) = &manifest.head {
        scan("website", head);
    }
    for page in &manifest.pages {
        if let Some(head) = &page.head {
            scan(&page.name, head);
        }
    }

    let staging_like = |host: &str| {
        host.split('.').any(|label| {
            ["staging", "stage", "dev", "preview", "test"]
                .iter()
                .any(|marker| label.contains(marker))
        })
    };

    let mut warnings = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for (page, host) in hosts {
        if target_domains.iter().any(|d| d == &host) {
            continue;
        }
        let suspicious =
            source_domains.iter().any(|d| d == &host) || staging_like(&host);
        if !suspicious || !seen.insert((page.clone(), host.clone())) {
            continue;
        }
        warnings.push(format!(
            "page {page:?} head references host {host:?} not bound to the target environment"
        ));
    }

    if warnings.len() > MAX_HOST_WARNINGS {
        let omitted = warnings.len() - MAX_HOST_WARNINGS;
        warnings.truncate(MAX_HOST_WARNINGS);
        warnings.push(format!("additional metadata host warnings omitted: {omitted}"));
    }
    warnings
}

/// All string leaves of a JSON value.
fn json_strings(value: &serde_json::Value) -> Vec<String> {
    match value {
        serde_json::Value::String(s) => vec![s.clone()],
        serde_json::Value::Array(items) => items.iter().flat_map(json_strings).collect(),
        serde_json::Value::Object(map) => map.values().flat_map(json_strings).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testsupport;
    use hsd_bundle::testutil::BundleBuilder;
    use hsd_bundle::ApplyMode;
    use serde_json::json;

    async fn staging_release() -> (tempfile::TempDir, crate::engine::Deployer, String) {
        let (dir, deployer, _reloader) = testsupport::deployer().await;
        let bundle = testsupport::decode(
            &BundleBuilder::new("blog", ApplyMode::Partial)
                .page("index", "/", b"<html>home</html>")
                .asset("assets/logo.svg", "image/svg+xml", b"<svg/>"),
        );
        deployer
            .apply("blog", "staging", &bundle, false, "alice")
            .await
            .unwrap();
        // The target environment must exist; a cheap way is an apply.
        deployer
            .apply("blog", "prod", &bundle, false, "alice")
            .await
            .unwrap();
        let release = deployer
            .build_release("blog", "staging", "alice")
            .await
            .unwrap();
        (dir, deployer, release.release_id)
    }

    #[tokio::test]
    async fn promotion_duplicates_content_byte_for_byte() {
        let (_dir, deployer, source_release) = staging_release().await;

        let outcome = deployer
            .promote("blog", "staging", "prod", "alice")
            .await
            .unwrap();
        assert_eq!(outcome.source_release_id, source_release);
        assert!(outcome.hash_verified);
        assert_eq!(outcome.file_count, 2);
        assert!(outcome.strategy == "hardlink" || outcome.strategy == "copy");

        let source_dir = deployer
            .env_paths("blog", "staging")
            .release_dir(&source_release);
        let target_dir = deployer
            .env_paths("blog", "prod")
            .release_dir(&outcome.release_id);

        for rel in ["index.html", "assets/logo.svg"] {
            let source_bytes = tokio::fs::read(source_dir.join(rel)).await.unwrap();
            let target_bytes = tokio::fs::read(target_dir.join(rel)).await.unwrap();
            assert_eq!(source_bytes, target_bytes, "{rel}");
        }
        for sidecar in super::super::release::SIDECARS {
            assert!(target_dir.join(sidecar).exists(), "missing {sidecar}");
        }

        let paths = deployer.env_paths("blog", "prod");
        assert_eq!(
            paths.current_target().await.unwrap().unwrap(),
            format!("releases/{}", outcome.release_id)
        );
    }

    #[tokio::test]
    async fn same_environment_is_rejected() {
        let (_dir, deployer, _release) = staging_release().await;
        assert!(matches!(
            deployer.promote("blog", "prod", "prod", "alice").await,
            Err(PromoteError::SameEnvironment)
        ));
    }

    #[tokio::test]
    async fn source_without_active_release_conflicts() {
        let (_dir, deployer, _release) = staging_release().await;
        // prod exists but has no active release; promote prod -> staging.
        assert!(matches!(
            deployer.promote("blog", "prod", "staging", "alice").await,
            Err(PromoteError::SourceNoActiveRelease)
        ));
    }

    #[tokio::test]
    async fn tampered_output_hash_aborts_without_touching_target() {
        let (_dir, deployer, source_release) = staging_release().await;

        // Corrupt one recorded hash on the source release row.
        let release = deployer
            .catalog
            .get_release(&source_release)
            .await
            .unwrap()
            .unwrap();
        let mut hashes: BTreeMap<String, String> =
            serde_json::from_str(&release.output_hashes_json).unwrap();
        hashes.insert(
            "index.html".into(),
            format!("sha256:{}", "a".repeat(64)),
        );
        let mut tx = deployer.catalog.begin().await.unwrap();
        deployer
            .catalog
            .set_release_outputs(
                &mut *tx,
                &source_release,
                &serde_json::to_string(&hashes).unwrap(),
                &release.build_log,
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let err = deployer
            .promote("blog", "staging", "prod", "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, PromoteError::HashVerificationFailed));
        // The sanitized message carries no paths or hashes.
        assert_eq!(err.to_string(), "promotion hash verification failed");

        let paths = deployer.env_paths("blog", "prod");
        assert_eq!(paths.current_target().await.unwrap(), None);
    }

    #[tokio::test]
    async fn prod_target_scans_head_metadata_hosts() {
        let (_dir, deployer, _reloader) = testsupport::deployer().await;
        let bundle = testsupport::decode(
            &BundleBuilder::new("blog", ApplyMode::Partial).page_with_head(
                "index",
                "/",
                b"<html/>",
                Some(json!({"canonical": "https://staging.example.com/"})),
            ),
        );
        deployer
            .apply("blog", "staging", &bundle, false, "alice")
            .await
            .unwrap();
        deployer
            .apply("blog", "prod", &bundle, false, "alice")
            .await
            .unwrap();
        deployer
            .build_release("blog", "staging", "alice")
            .await
            .unwrap();

        let outcome = deployer
            .promote("blog", "staging", "prod", "alice")
            .await
            .unwrap();
        assert_eq!(outcome.warnings.len(), 1);
        assert!(outcome.warnings[0].contains("staging.example.com"));
    }

    #[test]
    fn warnings_are_capped_with_an_overflow_entry() {
        let pages = (0..30)
            .map(|i| super::super::snapshot::PageSnapshot {
                name: format!("p{i}"),
                route: format!("/p{i}"),
                head: Some(json!({"url": format!("https://dev-{i}.example.com/")})),
                hash: "sha256:00".into(),
            })
            .collect();
        let manifest = ReleaseManifest {
            website: "blog".into(),
            environment: "prod".into(),
            defaults: None,
            head: None,
            pages,
            components: vec![],
            style_bundles: vec![],
            assets: vec![],
        };

        let warnings = metadata_host_warnings(&manifest, &[], &[]);
        assert_eq!(warnings.len(), MAX_HOST_WARNINGS + 1);
        assert!(warnings
            .last()
            .unwrap()
            .starts_with("additional metadata host warnings omitted:"));
    }
}
