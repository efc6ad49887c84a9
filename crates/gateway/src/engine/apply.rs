//! Apply engine: project a validated bundle into the catalog and blob store.
//!
//! Runs under the environment's stripe lock inside a single write
//! transaction. Partial mode upserts listed resources (and honors explicit
//! `deleted: true` markers); full mode additionally deletes, per kind, every
//! row whose key the bundle does not list. Dry-run executes the whole
//! projection and then rolls the transaction back, leaving the blob store
//! untouched as well.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::json;

use hsd_blobstore::BlobError;
use hsd_bundle::manifest::{FileRef, Resource, ResourceKind};
use hsd_bundle::{ApplyMode, Bundle};
use hsd_catalog::websites::WebsiteFields;
use hsd_catalog::{CatalogError, DbConn, UpsertOutcome};
use hsd_domain::ContentHash;

use super::Deployer;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outcome & error types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("bundle website {bundle:?} does not match request website {requested:?}")]
    WebsiteMismatch { requested: String, bundle: String },

    #[error("bundle file {0:?} missing after validation")]
    MissingValidatedFile(String),

    #[error("page {name:?}: {source}")]
    InvalidRoute {
        name: String,
        source: hsd_domain::Error,
    },

    #[error("{kind} {name:?}: {source}")]
    InvalidResourceName {
        kind: &'static str,
        name: String,
        source: hsd_domain::Error,
    },

    #[error("hash: {0}")]
    Hash(#[from] hsd_domain::Error),

    #[error("catalog: {0}")]
    Catalog(#[from] CatalogError),

    #[error("blob store: {0}")]
    Blob(#[from] BlobError),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub website: String,
    pub environment: String,
    pub mode: String,
    pub dry_run: bool,
    pub accepted_resources: Vec<AcceptedResource>,
    pub warnings: Vec<ApplyWarning>,
    pub changes: BTreeMap<String, KindChanges>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AcceptedResource {
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApplyWarning {
    #[serde(rename = "type")]
    pub warning_type: String,
    pub file: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct KindChanges {
    pub added: u64,
    pub updated: u64,
    pub deleted: u64,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl Deployer {
    pub async fn apply(
        &self,
        website: &str,
        environment: &str,
        bundle: &Bundle,
        dry_run: bool,
        actor: &str,
    ) -> Result<ApplyOutcome, ApplyError> {
        let manifest = &bundle.manifest;
        if manifest.website != website {
            return Err(ApplyError::WebsiteMismatch {
                requested: website.to_owned(),
                bundle: manifest.website.clone(),
            });
        }

        let _guard = self.locks.lock_env(website, environment).await;
        let mut tx = self.catalog.begin().await?;

        let fields = website_fields(bundle)?;
        let website_row = self
            .catalog
            .ensure_website(&mut *tx, website, &fields)
            .await?;
        self.catalog
            .update_website_fields(&mut *tx, website_row.id, &fields)
            .await?;
        let env_row = self
            .catalog
            .ensure_environment(&mut *tx, website_row.id, environment)
            .await?;

        let mut changes: BTreeMap<String, KindChanges> = BTreeMap::new();
        let mut accepted = Vec::new();

        for resource in &manifest.resources {
            let kind = resource.kind();
            let entry = changes.entry(kind.as_str().to_owned()).or_default();

            if resource.deleted() {
                let deleted = self
                    .delete_resource(&mut *tx, website_row.id, resource)
                    .await?;
                if deleted {
                    entry.deleted += 1;
                }
            } else {
                let outcome = self
                    .upsert_resource(&mut *tx, website_row.id, bundle, resource, dry_run)
                    .await?;
                match outcome {
                    UpsertOutcome::Inserted => entry.added += 1,
                    UpsertOutcome::Updated => entry.updated += 1,
                }
            }
            accepted.push(AcceptedResource {
                kind: kind.as_str().to_owned(),
                name: resource.name().to_owned(),
            });
        }

        if manifest.mode == ApplyMode::Full {
            for kind in ResourceKind::ALL {
                let keep: Vec<String> = manifest
                    .resources
                    .iter()
                    .filter(|r| r.kind() == kind && !r.deleted())
                    .map(|r| r.name().to_owned())
                    .collect();
                let (table, key_col) = kind_table(kind);
                let deleted = self
                    .catalog
                    .delete_by_key_not_in(&mut *tx, table, key_col, website_row.id, &keep)
                    .await?;
                if deleted > 0 {
                    changes.entry(kind.as_str().to_owned()).or_default().deleted += deleted;
                }
            }
        }

        let warnings: Vec<ApplyWarning> = bundle
            .extra_files
            .iter()
            .map(|file| ApplyWarning {
                warning_type: "ExtraFiles".to_owned(),
                file: file.clone(),
            })
            .collect();

        let outcome = ApplyOutcome {
            website: website.to_owned(),
            environment: environment.to_owned(),
            mode: manifest.mode.as_str().to_owned(),
            dry_run,
            accepted_resources: accepted,
            warnings,
            changes,
        };

        if dry_run {
            tx.rollback().await.map_err(CatalogError::from)?;
            tracing::info!(website, environment, "apply dry-run rolled back");
            return Ok(outcome);
        }

        tx.commit().await.map_err(CatalogError::from)?;
        tracing::info!(
            website,
            environment,
            mode = %outcome.mode,
            accepted = outcome.accepted_resources.len(),
            "apply committed"
        );

        self.record_audit(
            actor,
            env_row.id,
            "apply",
            format!("{website}/{environment}"),
            None,
            json!({
                "mode": outcome.mode,
                "acceptedCount": outcome.accepted_resources.len(),
                "changes": outcome.changes,
            }),
        );
        self.flush_audit().await;

        Ok(outcome)
    }

    async fn delete_resource(
        &self,
        conn: &mut DbConn,
        website_id: i64,
        resource: &Resource,
    ) -> Result<bool, ApplyError> {
        let name = resource.name();
        Ok(match resource.kind() {
            ResourceKind::Page => self.catalog.delete_page(conn, website_id, name).await?,
            ResourceKind::Component => {
                self.catalog.delete_component(conn, website_id, name).await?
            }
            ResourceKind::StyleBundle => {
                self.catalog
                    .delete_style_bundle(conn, website_id, name)
                    .await?
            }
            ResourceKind::Asset => self.catalog.delete_asset(conn, website_id, name).await?,
        })
    }

    async fn upsert_resource(
        &self,
        conn: &mut DbConn,
        website_id: i64,
        bundle: &Bundle,
        resource: &Resource,
        dry_run: bool,
    ) -> Result<UpsertOutcome, ApplyError> {
        check_resource_name(resource)?;

        // Normalize declared hashes first; the decoder already verified they
        // match the file contents.
        let refs = resource.file_refs();
        let mut canonical: Vec<(String, ContentHash)> = Vec::with_capacity(refs.len());
        for file_ref in &refs {
            canonical.push((file_ref.file.clone(), ContentHash::parse(&file_ref.hash)?));
        }

        // Persist blobs (idempotent; orphans from a later rollback are
        // allowed, but dry-run must leave the store untouched).
        if !dry_run {
            for (file, _) in &canonical {
                let bytes = bundle
                    .file(file)
                    .ok_or_else(|| ApplyError::MissingValidatedFile(file.clone()))?;
                self.blobs.put(bytes).await?;
            }
        }

        let first_hash = || {
            canonical
                .first()
                .map(|(_, hash)| hash)
                .ok_or_else(|| ApplyError::MissingValidatedFile(resource.name().to_owned()))
        };

        Ok(match resource {
            Resource::Page(page) => {
                let route = page
                    .route
                    .clone()
                    .unwrap_or_else(|| format!("/{}", page.name));
                hsd_domain::name::validate_route(&route).map_err(|source| {
                    ApplyError::InvalidRoute {
                        name: page.name.clone(),
                        source,
                    }
                })?;
                let head_json = page.head.as_ref().map(serde_json::to_string).transpose()?;
                self.catalog
                    .upsert_page(
                        conn,
                        website_id,
                        &page.name,
                        &route,
                        head_json.as_deref(),
                        first_hash()?.as_str(),
                    )
                    .await?
            }
            Resource::Component(component) => {
                self.catalog
                    .upsert_component(conn, website_id, &component.name, first_hash()?.as_str())
                    .await?
            }
            Resource::StyleBundle(bundle_spec) => {
                // files_json stores the declared array, hashes canonicalized.
                let canonical_refs: Vec<FileRef> = canonical
                    .iter()
                    .map(|(file, hash)| FileRef {
                        file: file.clone(),
                        hash: hash.as_str().to_owned(),
                    })
                    .collect();
                let files_json = serde_json::to_string(&canonical_refs)?;
                let combined = ContentHash::of_sorted_map(
                    canonical.iter().map(|(file, hash)| (file.as_str(), hash)),
                );
                self.catalog
                    .upsert_style_bundle(
                        conn,
                        website_id,
                        &bundle_spec.name,
                        &files_json,
                        combined.as_str(),
                    )
                    .await?
            }
            Resource::Asset(asset) => {
                self.catalog
                    .upsert_asset(
                        conn,
                        website_id,
                        &asset.name,
                        asset.content_type.as_deref(),
                        first_hash()?.as_str(),
                    )
                    .await?
            }
        })
    }
}

/// Resource names become catalog keys and release output paths, so they are
/// validated before any row is written. Assets (and style files below) use
/// the relative-path grammar; everything else uses the name grammar.
fn check_resource_name(resource: &Resource) -> Result<(), ApplyError> {
    let fail = |source| ApplyError::InvalidResourceName {
        kind: resource.kind().as_str(),
        name: resource.name().to_owned(),
        source,
    };

    match resource {
        Resource::Asset(_) => {
            hsd_domain::name::validate_relative_path(resource.name()).map_err(fail)?;
        }
        Resource::StyleBundle(bundle_spec) => {
            hsd_domain::name::validate_resource_name(resource.name()).map_err(fail)?;
            for file_ref in &bundle_spec.files {
                hsd_domain::name::validate_relative_path(&file_ref.file)
                    .map_err(fail)?;
            }
        }
        _ => {
            hsd_domain::name::validate_resource_name(resource.name()).map_err(fail)?;
        }
    }
    Ok(())
}

/// Keep-set table/column per resource kind (all allow-listed in the
/// catalog).
fn kind_table(kind: ResourceKind) -> (&'static str, &'static str) {
    match kind {
        ResourceKind::Page => ("pages", "name"),
        ResourceKind::Component => ("components", "name"),
        ResourceKind::StyleBundle => ("style_bundles", "name"),
        ResourceKind::Asset => ("assets", "filename"),
    }
}

/// Website defaults / head metadata carried by the bundle manifest.
fn website_fields(bundle: &Bundle) -> Result<WebsiteFields, ApplyError> {
    let manifest = &bundle.manifest;
    let head_json = manifest
        .head
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    let content_hash = head_json
        .as_deref()
        .map(|raw| ContentHash::of_bytes(raw.as_bytes()).as_str().to_owned());

    Ok(WebsiteFields {
        default_style_bundle: manifest
            .defaults
            .as_ref()
            .and_then(|d| d.style_bundle.clone()),
        base_template: manifest
            .defaults
            .as_ref()
            .and_then(|d| d.base_template.clone()),
        head_json,
        content_hash,
    })
}
