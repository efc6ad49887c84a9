//! Mutating engines: apply, release build, rollback, promote, and domain
//! reconciliation. One `Deployer` owns the shared capabilities (catalog,
//! blob store, stripe locks, audit pipeline, proxy reloader) and each engine
//! lives in its own module as an `impl Deployer` block.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use hsd_blobstore::BlobStore;
use hsd_catalog::{Catalog, NewAuditEntry};

use crate::proxy::Reloader;
use crate::runtime::audit::{AuditPipeline, HANDLER_FLUSH};
use crate::runtime::locks::StripeLocks;

pub mod apply;
pub mod domains;
pub mod promote;
pub mod release;
pub mod rollback;
pub mod snapshot;

pub struct Deployer {
    pub catalog: Catalog,
    pub blobs: BlobStore,
    pub locks: Arc<StripeLocks>,
    pub audit: Arc<AuditPipeline>,
    pub reloader: Arc<dyn Reloader>,
    pub data_dir: PathBuf,
}

impl Deployer {
    /// Filesystem layout for one environment.
    pub fn env_paths(&self, website: &str, environment: &str) -> EnvPaths {
        EnvPaths::new(&self.data_dir, website, environment)
    }

    /// Enqueue an audit entry; a full or closed queue is a warning, never an
    /// operation failure.
    pub(crate) fn record_audit(
        &self,
        actor: &str,
        environment_id: i64,
        operation: &str,
        resource_summary: String,
        release_id: Option<String>,
        metadata: serde_json::Value,
    ) {
        let entry = NewAuditEntry {
            actor: actor.to_owned(),
            ts: Utc::now(),
            environment_id,
            operation: operation.to_owned(),
            resource_summary,
            release_id,
            metadata,
        };
        if let Err(e) = self.audit.log(entry) {
            tracing::warn!(operation = %operation, error = %e, "audit entry dropped");
        }
    }

    /// Best-effort flush so an immediate `GET /logs` observes the entry.
    pub(crate) async fn flush_audit(&self) {
        self.audit.wait_idle(HANDLER_FLUSH).await;
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Environment filesystem layout
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Paths under `<data_dir>/websites/<w>/envs/<e>/`.
///
/// The `current` symlink is the activation pointer: it always holds the
/// relative target `releases/<id>`, and swapping it is a temp-symlink +
/// rename so readers never observe a missing or torn pointer.
#[derive(Debug, Clone)]
pub struct EnvPaths {
    root: PathBuf,
}

impl EnvPaths {
    pub fn new(data_dir: &Path, website: &str, environment: &str) -> Self {
        Self {
            root: data_dir
                .join("websites")
                .join(website)
                .join("envs")
                .join(environment),
        }
    }

    pub fn releases_dir(&self) -> PathBuf {
        self.root.join("releases")
    }

    pub fn release_dir(&self, release_id: &str) -> PathBuf {
        self.releases_dir().join(release_id)
    }

    pub fn current_link(&self) -> PathBuf {
        self.root.join("current")
    }

    /// The relative target `current` points at, if the link exists.
    pub async fn current_target(&self) -> std::io::Result<Option<String>> {
        match tokio::fs::read_link(self.current_link()).await {
            Ok(target) => Ok(Some(target.to_string_lossy().into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Atomically point `current` at `releases/<release_id>`. Returns the
    /// previous target.
    pub async fn swap_current(&self, release_id: &str) -> std::io::Result<Option<String>> {
        let previous = self.current_target().await?;

        let staged = self.root.join(format!(".current.{release_id}"));
        // A stale staging link can only exist after a crash mid-swap.
        match tokio::fs::remove_file(&staged).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        tokio::fs::symlink(format!("releases/{release_id}"), &staged).await?;
        tokio::fs::rename(&staged, self.current_link()).await?;

        Ok(previous)
    }
}
